use anyhow::Result;
use serde::{Deserialize, Serialize};
use tessera_core::{DominatorsTree, Graph, LinearOrder, Loop, LoopAnalyzer, Rpo};

/// Machine-readable summary of every structural analysis of one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub blocks: usize,
    pub insts: usize,
    pub rpo: Vec<String>,
    pub dominators: Vec<DominatorEntry>,
    pub linear_order: Vec<String>,
    pub needs_jump: Vec<String>,
    pub loops: Vec<LoopReport>,
    /// Instruction order of each block, after scheduling if a scheduler ran.
    pub schedule: Vec<BlockSchedule>,
    pub passes: Vec<PassReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominatorEntry {
    pub block: String,
    pub dominator: Option<String>,
    pub dominated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub id: String,
    pub header: Option<String>,
    pub pre_header: Option<String>,
    pub back_edges: Vec<String>,
    pub blocks: Vec<String>,
    pub inner_loops: Vec<String>,
    pub depth: u32,
    pub root: bool,
    pub irreducible: bool,
    pub infinite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSchedule {
    pub block: String,
    pub insts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub name: String,
    pub micros: u64,
    pub memory: Option<usize>,
}

fn names<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl From<&Loop> for LoopReport {
    fn from(data: &Loop) -> Self {
        Self {
            id: data.id().to_string(),
            header: data.header().map(|b| b.to_string()),
            pre_header: data.pre_header().map(|b| b.to_string()),
            back_edges: names(data.back_edges()),
            blocks: names(data.blocks()),
            inner_loops: names(data.inner_loops()),
            depth: data.depth(),
            root: data.is_root(),
            irreducible: data.is_irreducible(),
            infinite: data.is_infinite(),
        }
    }
}

impl AnalysisReport {
    /// Brings every analysis up to date and snapshots the results.
    pub fn collect(graph: &mut Graph) -> Self {
        graph.run_analysis::<Rpo>();
        graph.run_analysis::<DominatorsTree>();
        graph.run_analysis::<LoopAnalyzer>();
        graph.run_analysis::<LinearOrder>();

        let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
        let dominators = rpo
            .iter()
            .map(|&id| {
                let bb = graph.block(id);
                DominatorEntry {
                    block: id.to_string(),
                    dominator: bb.dominator().map(|d| d.to_string()),
                    dominated: names(bb.dominated_blocks()),
                }
            })
            .collect();

        let linear = graph.get_analysis::<LinearOrder>().blocks();
        let needs_jump = linear
            .iter()
            .filter(|&&id| graph.block(id).needs_jump())
            .map(ToString::to_string)
            .collect();

        let loops = graph
            .get_analysis::<LoopAnalyzer>()
            .loops()
            .map(LoopReport::from)
            .collect();

        let schedule = graph
            .blocks()
            .map(|bb| BlockSchedule {
                block: bb.id.to_string(),
                insts: bb.all_insts().map(|i| i.to_string()).collect(),
            })
            .collect();

        let passes = graph
            .statistics()
            .into_iter()
            .map(|record| PassReport {
                micros: u64::try_from(record.duration.as_micros()).unwrap_or(u64::MAX),
                name: record.name,
                memory: record.memory_usage,
            })
            .collect();

        Self {
            blocks: graph.alive_blocks_count(),
            insts: graph.insts_count(),
            rpo: names(&rpo),
            dominators,
            linear_order: names(linear),
            needs_jump,
            loops,
            schedule,
            passes,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
