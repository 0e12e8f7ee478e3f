use crate::config::{BlockOrder, EmitterConfig};
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tone};
use anyhow::{ensure, Result};
use std::io::Write;
use tessera_core::{
    BasicBlock, BlockId, Graph, Inst, LinearOrder, LoopAnalyzer, Opcode, Rpo, INVALID_PC,
};

/// Textual dump of a graph, one block after another.
///
/// ```text
/// bb1  preds: [bb0]
///     v2.b compare v0, v1 cc=lt -> (v3)
///     v3.b if_imm v2 cc=ne -> ()
///     succs: [bb2, bb3]
/// ```
pub struct GraphDumper {
    config: EmitterConfig,
}

impl GraphDumper {
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Computes the order the dump needs, then renders the graph.
    pub fn dump(&self, graph: &mut Graph) -> Result<String> {
        match self.config.order {
            BlockOrder::Id => {}
            BlockOrder::Rpo => {
                graph.run_analysis::<Rpo>();
            }
            BlockOrder::Linear => {
                graph.run_analysis::<LinearOrder>();
            }
        }
        self.emit_to_string(graph)
    }

    fn block_order(&self, graph: &Graph) -> Result<Vec<BlockId>> {
        match self.config.order {
            BlockOrder::Id => Ok(graph.block_ids()),
            BlockOrder::Rpo => {
                ensure!(graph.is_analysis_valid::<Rpo>(), "RPO is not computed for this graph");
                Ok(graph.get_analysis::<Rpo>().blocks().to_vec())
            }
            BlockOrder::Linear => {
                ensure!(
                    graph.is_analysis_valid::<LinearOrder>(),
                    "linear order is not computed for this graph"
                );
                Ok(graph.get_analysis::<LinearOrder>().blocks().to_vec())
            }
        }
    }

    fn properties(&self, graph: &Graph, bb: &BasicBlock) -> Vec<String> {
        let mut props = Vec::new();
        if graph.is_start_block(bb.id) {
            props.push("start".to_string());
        }
        if graph.is_end_block(bb.id) {
            props.push("end".to_string());
        }
        if graph.is_analysis_valid::<LoopAnalyzer>() {
            if let Some(id) = bb.loop_id() {
                let data = graph.get_analysis::<LoopAnalyzer>().loop_data(id);
                if !data.is_root() {
                    props.push(format!("{} depth {}", id, data.depth()));
                }
                if data.header() == Some(bb.id) {
                    props.push("header".to_string());
                }
            }
        }
        if bb.osr_entry {
            props.push("osr_entry".to_string());
        }
        if bb.try_begin {
            props.push(format!("try_begin {}", bb.try_id.unwrap_or_default()));
        }
        if bb.try_end {
            props.push(format!("try_end {}", bb.try_id.unwrap_or_default()));
        }
        if bb.catch {
            props.push("catch".to_string());
        }
        if graph.is_analysis_valid::<LinearOrder>() && bb.needs_jump() {
            props.push("needs_jump".to_string());
        }
        if bb.is_inverted() {
            props.push("inverted".to_string());
        }
        if self.config.verbosity.should_print_pcs() && bb.guest_pc != INVALID_PC {
            props.push(format!("pc {}", bb.guest_pc));
        }
        props
    }

    fn inst_line(&self, inst: &Inst, use_colors: bool) -> String {
        let mut line = format!(
            "{}.{} {}",
            inst.id,
            inst.ty,
            Tone::Opcode.paint(inst.opcode.name(), use_colors)
        );

        let operands: Vec<String> = if inst.is_phi() {
            inst.inputs()
                .iter()
                .zip(inst.input_blocks())
                .map(|(value, pred)| format!("{}({})", value, pred))
                .collect()
        } else {
            inst.inputs().iter().map(ToString::to_string).collect()
        };
        if !operands.is_empty() {
            line.push(' ');
            line.push_str(&operands.join(", "));
        }

        if inst.opcode.has_condition_code() {
            line.push_str(&format!(" cc={}", inst.cc));
        }
        if inst.imm != 0 || matches!(inst.opcode, Opcode::Constant | Opcode::Parameter) {
            line.push_str(&format!(" imm={}", inst.imm));
        }
        if inst.volatile {
            line.push_str(&format!(" {}", Tone::Flag.paint("volatile", use_colors)));
        }
        if self.config.verbosity.should_print_pcs() && inst.pc != INVALID_PC {
            line.push_str(&format!(" pc={}", inst.pc));
        }

        let users: Vec<String> = inst.users().iter().map(|user| user.inst.to_string()).collect();
        line.push_str(&format!(" -> ({})", users.join(", ")));
        line
    }

    fn emit_block<W: Write>(
        &self,
        graph: &Graph,
        bb: &BasicBlock,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let preds: Vec<String> = bb.preds().iter().map(ToString::to_string).collect();
        let header = format!(
            "{}  preds: [{}]",
            Tone::Header.paint(&bb.id.to_string(), context.use_colors),
            preds.join(", ")
        );
        EmitHelper::write_line(writer, context, &header)?;

        context.indent();
        let props = self.properties(graph, bb);
        if !props.is_empty() {
            EmitHelper::write_colored_line(
                writer,
                context,
                &format!("prop: {}", props.join(", ")),
                Tone::Flag,
            )?;
        }
        if self.config.verbosity.should_print_insts() {
            for id in bb.all_insts() {
                let line = self.inst_line(graph.inst(id), context.use_colors);
                EmitHelper::write_line(writer, context, &line)?;
            }
        }
        let succs: Vec<String> = bb.succs().iter().map(ToString::to_string).collect();
        EmitHelper::write_colored_line(
            writer,
            context,
            &format!("succs: [{}]", succs.join(", ")),
            Tone::Muted,
        )?;
        context.dedent();
        Ok(())
    }
}

impl Default for GraphDumper {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

impl Emitter for GraphDumper {
    type Item = Graph;

    fn emit<W: Write>(&self, graph: &Graph, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        for (index, block) in self.block_order(graph)?.into_iter().enumerate() {
            if index > 0 {
                writeln!(writer)?;
            }
            self.emit_block(graph, graph.block(block), writer, context)?;
        }
        Ok(())
    }

    fn context(&self) -> EmitContext {
        EmitContext::from_config(&self.config)
    }
}
