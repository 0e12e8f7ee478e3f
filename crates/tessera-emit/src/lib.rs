/*! Render graphs and their analyses for people and for tools.
 *
 * A layout decision is easiest to review next to the graph it was made for. The dumper prints
 * blocks in id, RPO or linear order together with the per-block facts the analyses computed,
 * and the report collects the same facts as JSON for scripts and regression checks.
 */

pub mod config;
pub mod dumper;
pub mod emitter;
pub mod report;

pub use config::{BlockOrder, EmitterConfig, IndentStyle, VerbosityLevel};
pub use dumper::GraphDumper;
pub use emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tone};
pub use report::{AnalysisReport, BlockSchedule, DominatorEntry, LoopReport, PassReport};
