use crate::config::EmitterConfig;
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

pub type EmitResult = Result<()>;

#[derive(Debug, Clone)]
pub struct EmitContext {
    pub indent_level: usize,
    pub indent_chars: String,
    pub use_colors: bool,
}

impl EmitContext {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_chars: "    ".to_string(),
            use_colors: true,
        }
    }

    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            indent_level: 0,
            indent_chars: config.indent_style.unit(),
            use_colors: config.use_colors,
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn get_indent(&self) -> String {
        self.indent_chars.repeat(self.indent_level)
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Emitter {
    type Item;

    fn emit<W: Write>(
        &self,
        item: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult;

    fn context(&self) -> EmitContext {
        EmitContext::new()
    }

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = self.context();
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Highlighting classes used by the dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Header,
    Opcode,
    Flag,
    Muted,
    Plain,
}

impl Tone {
    pub fn paint(self, text: &str, use_colors: bool) -> String {
        if !use_colors {
            return text.to_string();
        }
        match self {
            Tone::Header => text.cyan().bold().to_string(),
            Tone::Opcode => text.blue().to_string(),
            Tone::Flag => text.yellow().to_string(),
            Tone::Muted => text.bright_black().to_string(),
            Tone::Plain => text.to_string(),
        }
    }
}

pub struct EmitHelper;

impl EmitHelper {
    pub fn write_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        writeln!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn write_colored_line<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        text: &str,
        tone: Tone,
    ) -> EmitResult {
        let painted = tone.paint(text, context.use_colors);
        Self::write_line(writer, context, &painted)
    }

    pub fn write_section<W: Write>(writer: &mut W, context: &EmitContext, title: &str) -> EmitResult {
        writeln!(writer)?;
        Self::write_colored_line(writer, context, &format!("=== {} ===", title), Tone::Header)
    }
}
