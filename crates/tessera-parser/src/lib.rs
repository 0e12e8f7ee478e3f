/*! Parse `.tir` text into graphs.
 *
 * Hand-written builder chains are fine for a unit test, but scenarios worth keeping around (the
 * graphs a layout regression was found on, inputs for the command line) read better as text. The
 * parser turns a `.tir` file into a `GraphBuilder`, so text and code describe graphs the same way.
 */

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::path::{Path, PathBuf};
use tessera_core::{
    BuiltGraph, CompilerOptions, ConditionCode, DataType, GraphBuilder, IrError, Opcode,
    OptionsError, END,
};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct TirParser;

/// File extension of the textual graph format.
pub const EXTENSION: &str = "tir";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: {message}")]
    Invalid { line: usize, message: String },
    #[error("Line {line}: {source}")]
    Setting {
        line: usize,
        #[source]
        source: OptionsError,
    },
    #[error("Invalid graph: {0}")]
    Build(#[from] IrError),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Raw parse tree of `input`.
pub fn parse(input: &str) -> Result<Pairs<'_, Rule>> {
    TirParser::parse(Rule::file, input).map_err(|e| ParseError::Syntax(Box::new(e)))
}

pub fn check(input: &str) -> bool {
    parse(input).is_ok()
}

/// Reads `input` into a builder; options and mode can still be adjusted before building.
pub fn parse_builder(input: &str) -> Result<GraphBuilder> {
    parse_builder_with(input, CompilerOptions::default())
}

/// Like [`parse_builder`], with `set` lines applied on top of `options`.
pub fn parse_builder_with(input: &str, options: CompilerOptions) -> Result<GraphBuilder> {
    let mut builder = GraphBuilder::with_options(options);
    let Some(file) = parse(input)?.next() else {
        return Ok(builder);
    };
    for item in file.into_inner() {
        match item.as_rule() {
            Rule::setting => apply_setting(&mut builder, item)?,
            Rule::profile => {
                let line = line_of(&item);
                let mut numbers = item.into_inner();
                let pc = next_int(&mut numbers, line)?;
                let taken = next_int(&mut numbers, line)?;
                let not_taken = next_int(&mut numbers, line)?;
                builder.profile(pc, u64::from(taken), u64::from(not_taken));
            }
            Rule::start_block => {
                builder.start();
                for inst in item.into_inner() {
                    add_inst(&mut builder, inst)?;
                }
            }
            Rule::block => add_block(&mut builder, item)?,
            Rule::EOI => {}
            rule => {
                return Err(ParseError::Invalid {
                    line: line_of(&item),
                    message: format!("unexpected {:?}", rule),
                })
            }
        }
    }
    Ok(builder)
}

pub fn parse_graph(input: &str) -> Result<BuiltGraph> {
    Ok(parse_builder(input)?.build()?)
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<BuiltGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_graph(&text)
}

/// Parses every `.tir` file under `dir`, in path order.
pub fn parse_dir<P: AsRef<Path>>(dir: P) -> Vec<(PathBuf, Result<BuiltGraph>)> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
        .collect();
    files.sort();
    files
        .into_iter()
        .map(|path| {
            let graph = parse_file(&path);
            (path, graph)
        })
        .collect()
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn int_of(pair: &Pair<'_, Rule>) -> Result<u32> {
    pair.as_str().parse().map_err(|_| ParseError::Invalid {
        line: line_of(pair),
        message: format!("number out of range: {}", pair.as_str()),
    })
}

fn next_int(pairs: &mut Pairs<'_, Rule>, line: usize) -> Result<u32> {
    match pairs.next() {
        Some(pair) => int_of(&pair),
        None => Err(ParseError::Invalid {
            line,
            message: "missing number".to_string(),
        }),
    }
}

fn invalid<T>(pair: &Pair<'_, Rule>, message: String) -> Result<T> {
    Err(ParseError::Invalid {
        line: line_of(pair),
        message,
    })
}

fn apply_setting(builder: &mut GraphBuilder, item: Pair<'_, Rule>) -> Result<()> {
    let line = line_of(&item);
    let mut parts = item.into_inner();
    let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
        return Err(ParseError::Invalid {
            line,
            message: "incomplete setting".to_string(),
        });
    };
    let flag = || match value.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => invalid(&value, format!("expected true or false, found `{}`", other)),
    };
    match key.as_str() {
        "bytecode_optimizer" => {
            builder.bytecode_optimizer(flag()?);
        }
        "osr" => {
            builder.osr(flag()?);
        }
        name => builder
            .options_mut()
            .set_option(name, value.as_str())
            .map_err(|source| ParseError::Setting { line, source })?,
    }
    Ok(())
}

fn add_block(builder: &mut GraphBuilder, item: Pair<'_, Rule>) -> Result<()> {
    let line = line_of(&item);
    let mut parts = item.into_inner().peekable();
    let number = match parts.next() {
        Some(pair) => int_of(&pair)?,
        None => {
            return Err(ParseError::Invalid {
                line,
                message: "block without a number".to_string(),
            })
        }
    };
    let mut succs = Vec::new();
    if let Some(pair) = parts.next_if(|pair| pair.as_rule() == Rule::succs) {
        for succ in pair.into_inner() {
            match succ.into_inner().next() {
                Some(target) if target.as_rule() == Rule::end_kw => succs.push(END),
                Some(target) => succs.push(int_of(&target)?),
                None => {}
            }
        }
    }
    builder.block(number, &succs);

    for part in parts {
        match part.as_rule() {
            Rule::pc_attr => {
                let pc = attr_int(&part)?;
                builder.block_pc(pc);
            }
            Rule::try_begin_attr => {
                let id = attr_int(&part)?;
                builder.try_begin(id);
            }
            Rule::try_end_attr => {
                let id = attr_int(&part)?;
                builder.try_end(id);
            }
            Rule::catch_attr => {
                builder.catch_block();
            }
            Rule::inst => add_inst(builder, part)?,
            rule => return invalid(&part, format!("unexpected {:?} in block {}", rule, number)),
        }
    }
    Ok(())
}

fn attr_int(pair: &Pair<'_, Rule>) -> Result<u32> {
    match pair.clone().into_inner().next() {
        Some(value) => int_of(&value),
        None => invalid(pair, "attribute without a value".to_string()),
    }
}

fn add_inst(builder: &mut GraphBuilder, item: Pair<'_, Rule>) -> Result<()> {
    let mut parts = item.clone().into_inner().peekable();
    let Some(number) = parts.next() else {
        return invalid(&item, "instruction without a number".to_string());
    };
    let number = int_of(&number)?;
    let Some(opcode) = parts.next() else {
        return invalid(&item, format!("instruction {} without an opcode", number));
    };
    let opcode_pair = opcode.clone();
    let opcode: Opcode = opcode.as_str().parse().or_else(|e| invalid(&opcode_pair, e))?;

    let ty = match parts.next_if(|pair| pair.as_rule() == Rule::ty) {
        Some(ty) => ty.as_str().parse().or_else(|e| invalid(&ty, e))?,
        None => DataType::NoType,
    };

    let mut values = Vec::new();
    let mut phi_inputs = Vec::new();
    if let Some(operands) = parts.next_if(|pair| pair.as_rule() == Rule::operands) {
        for operand in operands.into_inner() {
            let mut numbers = operand.clone().into_inner();
            let line = line_of(&operand);
            match operand.as_rule() {
                Rule::value_ref => values.push(next_int(&mut numbers, line)?),
                Rule::phi_input => {
                    let value = next_int(&mut numbers, line)?;
                    let pred = next_int(&mut numbers, line)?;
                    phi_inputs.push((value, pred));
                }
                rule => return invalid(&operand, format!("unexpected {:?}", rule)),
            }
        }
    }

    match (opcode, values.is_empty(), phi_inputs.is_empty()) {
        (Opcode::Phi, true, _) => builder.phi(number, ty, &phi_inputs),
        (Opcode::Phi, false, _) => {
            return invalid(&item, format!("phi {} inputs need a predecessor (`value@block`)", number))
        }
        (_, _, true) => builder.inst(number, opcode, ty, &values),
        (_, _, false) => {
            return invalid(&item, format!("`value@block` inputs are only allowed on phis ({})", number))
        }
    };

    for attr in parts {
        match attr.as_rule() {
            Rule::cc_attr => {
                let Some(name) = attr.clone().into_inner().next() else {
                    return invalid(&attr, "cc without a value".to_string());
                };
                let cc: ConditionCode = name.as_str().parse().or_else(|e| invalid(&name, e))?;
                builder.cc(cc);
            }
            Rule::imm_attr => {
                let Some(value) = attr.clone().into_inner().next() else {
                    return invalid(&attr, "imm without a value".to_string());
                };
                let imm: i64 = value
                    .as_str()
                    .parse()
                    .or_else(|_| invalid(&value, format!("immediate out of range: {}", value.as_str())))?;
                builder.imm(imm);
            }
            Rule::pc_attr => {
                let pc = attr_int(&attr)?;
                builder.pc(pc);
            }
            Rule::volatile_attr => {
                builder.volatile();
            }
            rule => return invalid(&attr, format!("unexpected {:?} on instruction {}", rule, number)),
        }
    }
    Ok(())
}
