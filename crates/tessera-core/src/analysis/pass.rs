use super::Analysis;
use crate::config::{CompilerOptions, VerificationLevel};
use crate::graph::Graph;
use crate::verify::GraphVerifier;
use std::any::Any;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// An optimization or analysis step that can be scheduled in a pipeline.
pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        "No description provided"
    }

    /// Whether the options allow this pass to run.
    fn is_enable(&self, options: &CompilerOptions) -> bool {
        options.is_pass_enabled(self.name())
    }

    /// Runs the pass. Returns `false` when it failed and the pipeline should stop.
    fn run_impl(&mut self, graph: &mut Graph) -> bool;

    fn modifies_ir(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Schedules a cached analysis as a pipeline step.
#[derive(Debug)]
pub struct AnalysisPass<A> {
    _analysis: PhantomData<fn() -> A>,
}

impl<A> AnalysisPass<A> {
    pub fn new() -> Self {
        Self {
            _analysis: PhantomData,
        }
    }
}

impl<A> Default for AnalysisPass<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Analysis> Pass for AnalysisPass<A> {
    fn name(&self) -> &'static str {
        A::default().name()
    }

    fn description(&self) -> &'static str {
        "Computes a cached analysis"
    }

    fn is_enable(&self, _options: &CompilerOptions) -> bool {
        true
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        graph.run_analysis::<A>()
    }

    fn modifies_ir(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct PassStatistics {
    pub name: String,
    pub duration: Duration,
    /// Peak local arena usage of the pass, in bytes.
    pub memory_usage: Option<usize>,
}

/// Pass records of a graph and every child graph created from it.
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    passes: Vec<PassStatistics>,
}

impl Statistics {
    pub fn passes(&self) -> &[PassStatistics] {
        &self.passes
    }

    pub fn push(&mut self, record: PassStatistics) {
        self.passes.push(record);
    }

    pub fn total_duration(&self) -> Duration {
        self.passes.iter().map(|p| p.duration).sum()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

pub struct PassTimer {
    name: String,
    start: Instant,
}

impl PassTimer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }

    pub fn stop(self, memory_usage: Option<usize>) -> PassStatistics {
        PassStatistics {
            name: self.name,
            duration: self.start.elapsed(),
            memory_usage,
        }
    }
}

impl Graph {
    /// Runs `pass` if the options enable it.
    ///
    /// Local arena allocations made by the pass are released when it returns. Under full
    /// verification a pass that modifies the graph is followed by a complete structural check and
    /// any violation is fatal.
    pub fn run_pass(&mut self, pass: &mut dyn Pass) -> bool {
        if !pass.is_enable(self.options()) {
            debug!(pass = pass.name(), "pass disabled");
            return false;
        }
        debug!(pass = pass.name(), "running pass");

        let timer = PassTimer::start(pass.name());
        let mark = self.local_arena.mark();
        self.local_arena.reset_peak();
        let base = self.local_arena.allocated_size();
        let result = pass.run_impl(self);
        let memory_usage = self.local_arena.peak_size().saturating_sub(base);
        self.local_arena.reset_to(mark);
        let record = timer.stop(Some(memory_usage));
        debug!(pass = pass.name(), result, duration = ?record.duration, "pass finished");
        self.record_statistics(record);

        if result && pass.modifies_ir() && self.options().verification == VerificationLevel::Full {
            if let Err(errors) = GraphVerifier::new(VerificationLevel::Full).verify(self) {
                let report: Vec<String> = errors.iter().map(ToString::to_string).collect();
                panic!(
                    "graph verification failed after {}:\n  {}",
                    pass.name(),
                    report.join("\n  ")
                );
            }
        }
        result
    }
}

/// An ordered pipeline of passes.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    statistics: Vec<PassStatistics>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pass<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every enabled pass in order. Stops at the first pass that fails or when the graph
    /// outgrows the instruction budget.
    pub fn run_all(&mut self, graph: &mut Graph) -> bool {
        for pass in &mut self.passes {
            if !pass.is_enable(graph.options()) {
                debug!(pass = pass.name(), "skipping disabled pass");
                continue;
            }
            let recorded = graph.statistics().len();
            let result = graph.run_pass(pass.as_mut());
            self.statistics
                .extend(graph.statistics().into_iter().skip(recorded));
            if !result {
                warn!(pass = pass.name(), "pass failed, stopping pipeline");
                return false;
            }
            let count = graph.insts_count();
            let limit = graph.options().max_insts_count;
            if count > limit {
                warn!(pass = pass.name(), count, limit, "instruction budget exceeded");
                return false;
            }
        }
        true
    }

    /// Records of the passes this manager has run.
    pub fn statistics(&self) -> &[PassStatistics] {
        &self.statistics
    }

    pub fn get_pass<P: Pass + 'static>(&self) -> Option<&P> {
        self.passes
            .iter()
            .find_map(|p| p.as_any().downcast_ref::<P>())
    }

    pub fn get_pass_mut<P: Pass + 'static>(&mut self) -> Option<&mut P> {
        self.passes
            .iter_mut()
            .find_map(|p| p.as_any_mut().downcast_mut::<P>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DominatorsTree, Rpo};
    use crate::inst::{DataType, Opcode};
    use pretty_assertions::assert_eq;

    struct Counting {
        runs: usize,
        succeed: bool,
    }

    impl Pass for Counting {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn run_impl(&mut self, graph: &mut Graph) -> bool {
            self.runs += 1;
            graph.with_local_arena(|_, arena| {
                arena.alloc(16, 0);
            });
            self.succeed
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Appends one instruction per run to the start block.
    struct Grow;

    impl Pass for Grow {
        fn name(&self) -> &'static str {
            "Grow"
        }

        fn run_impl(&mut self, graph: &mut Graph) -> bool {
            let start = graph.start_block().unwrap();
            let inst = graph.create_inst(Opcode::SafePoint, DataType::NoType);
            graph.append_inst(start, inst);
            true
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn simple_graph(options: CompilerOptions) -> Graph {
        let mut graph = Graph::new(options);
        let start = graph.create_start_block();
        let end = graph.create_end_block(None);
        graph.add_succ(start, end);
        graph
    }

    #[test]
    fn test_pass_registration() {
        let mut manager = PassManager::new();
        manager.register_pass(Counting {
            runs: 0,
            succeed: true,
        });
        manager.register_pass(AnalysisPass::<Rpo>::new());
        assert_eq!(manager.pass_names(), vec!["Counting", "RPO"]);
        assert!(manager.get_pass::<Counting>().is_some());
    }

    #[test]
    fn test_disabled_pass_is_skipped() {
        let mut options = CompilerOptions::default();
        options.set_pass_enabled("Counting", false);
        let mut graph = simple_graph(options);
        let mut pass = Counting {
            runs: 0,
            succeed: true,
        };
        assert!(!graph.run_pass(&mut pass));
        assert_eq!(pass.runs, 0);
        assert!(graph.statistics().is_empty());
    }

    #[test]
    fn test_pipeline_stops_on_failure() {
        let mut graph = simple_graph(CompilerOptions::default());
        let mut manager = PassManager::new();
        manager.register_pass(Counting {
            runs: 0,
            succeed: false,
        });
        manager.register_pass(AnalysisPass::<DominatorsTree>::new());

        assert!(!manager.run_all(&mut graph));
        assert_eq!(manager.get_pass::<Counting>().map(|p| p.runs), Some(1));
        assert!(!graph.is_analysis_valid::<DominatorsTree>());
        assert_eq!(manager.statistics().len(), 1);
    }

    #[test]
    fn test_arena_released_between_passes() {
        let mut graph = simple_graph(CompilerOptions::default());
        let mut pass = Counting {
            runs: 0,
            succeed: true,
        };
        assert!(graph.run_pass(&mut pass));
        assert_eq!(graph.local_arena().allocated_size(), 0);
        let stats = graph.statistics();
        assert_eq!(stats[0].name, "Counting");
        assert_eq!(stats[0].memory_usage, Some(16 * 4));
    }

    #[test]
    fn test_instruction_budget() {
        let options = CompilerOptions {
            max_insts_count: 1,
            ..CompilerOptions::default()
        };
        let mut graph = simple_graph(options);
        let mut manager = PassManager::new();
        manager.register_pass(Grow);
        manager.register_pass(Grow);
        assert!(!manager.run_all(&mut graph));
        assert_eq!(graph.insts_count(), 2);
    }

    #[test]
    fn test_child_graph_shares_statistics() {
        let mut parent = simple_graph(CompilerOptions::default());
        let mut child = parent.new_child();
        let start = child.create_start_block();
        let end = child.create_end_block(None);
        child.add_succ(start, end);

        assert!(child.run_pass(&mut AnalysisPass::<Rpo>::new()));
        assert!(parent.run_pass(&mut AnalysisPass::<Rpo>::new()));
        let names: Vec<String> = parent.statistics().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["RPO".to_string(), "RPO".to_string()]);
    }
}
