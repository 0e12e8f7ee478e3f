use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tessera_core::analysis::AnalysisPass;
use tessera_core::{
    BuiltGraph, CompilerOptions, DominatorsTree, GraphVerifier, LinearOrder, LoopAnalyzer,
    PassManager, Rpo, Scheduler, VerificationLevel,
};
use tessera_emit::{AnalysisReport, BlockOrder, EmitterConfig, GraphDumper, VerbosityLevel};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - CFG analysis and block layout for SSA graphs")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis pipeline on a `.tir` graph and print the result.
    Analyze {
        input: PathBuf,

        #[arg(long, value_enum, default_value = "linear")]
        order: Order,

        /// Also run the instruction scheduler.
        #[arg(long)]
        schedule: bool,

        /// Print the analysis report as JSON instead of a dump.
        #[arg(long)]
        json: bool,

        /// Run full verification after the pipeline.
        #[arg(long)]
        verify: bool,

        /// Compiler options as JSON.
        #[arg(long)]
        options: Option<PathBuf>,

        /// Override an option, e.g. `--set freq_based_branch_reorder=false`.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse and verify a `.tir` file or every `.tir` file under a directory.
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a graph as parsed, without running any pass.
    Dump {
        input: PathBuf,

        #[arg(long, value_enum, default_value = "id")]
        order: Order,

        #[arg(long)]
        no_color: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Id,
    Rpo,
    Linear,
}

impl From<Order> for BlockOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Id => BlockOrder::Id,
            Order::Rpo => BlockOrder::Rpo,
            Order::Linear => BlockOrder::Linear,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            order,
            schedule,
            json,
            verify,
            options,
            overrides,
            verbose,
        } => cmd_analyze(
            &input,
            order.into(),
            schedule,
            json,
            verify,
            options.as_deref(),
            &overrides,
            verbose,
        ),
        Commands::Validate { input, verbose } => cmd_validate(&input, verbose),
        Commands::Dump {
            input,
            order,
            no_color,
        } => cmd_dump(&input, order.into(), no_color),
    }
}

fn load_options(file: Option<&Path>, overrides: &[String]) -> Result<CompilerOptions> {
    let mut options = match file {
        Some(path) => CompilerOptions::from_file(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => CompilerOptions::default(),
    };
    for entry in overrides {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("expected KEY=VALUE, got `{}`", entry);
        };
        options.set_option(key.trim(), value.trim())?;
    }
    Ok(options)
}

/// Parses `input`; `set` lines in the file apply on top of `options`.
fn build_graph(input: &Path, options: CompilerOptions) -> Result<BuiltGraph> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let builder = tessera_parser::parse_builder_with(&text, options)
        .with_context(|| format!("failed to parse {}", input.display()))?;
    Ok(builder.build()?)
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &Path,
    order: BlockOrder,
    schedule: bool,
    json: bool,
    verify: bool,
    options: Option<&Path>,
    overrides: &[String],
    verbose: bool,
) -> Result<()> {
    if verbose {
        println!("{}", " Tessera Analyzer".bright_blue().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!(" Input: {}", input.display());
        println!(" Order: {}", order);
        println!();
    }

    let options = load_options(options, overrides)?;
    let mut graph = build_graph(input, options)?.into_graph();

    let mut manager = PassManager::new();
    manager.register_pass(AnalysisPass::<Rpo>::new());
    manager.register_pass(AnalysisPass::<DominatorsTree>::new());
    manager.register_pass(AnalysisPass::<LoopAnalyzer>::new());
    if schedule {
        manager.register_pass(Scheduler::new());
    }
    manager.register_pass(AnalysisPass::<LinearOrder>::new());

    let start = Instant::now();
    if !manager.run_all(&mut graph) {
        bail!("pass pipeline stopped early on {}", input.display());
    }
    let elapsed = start.elapsed();

    if verify {
        if let Err(errors) = GraphVerifier::new(VerificationLevel::Full).verify(&mut graph) {
            for error in &errors {
                eprintln!("{} {}", "error:".bright_red().bold(), error);
            }
            bail!("verification failed with {} error(s)", errors.len());
        }
        // Full verification recomputes the trees; bring the layout back up to date.
        graph.run_analysis::<LinearOrder>();
    }

    if json {
        println!("{}", AnalysisReport::collect(&mut graph).to_json()?);
        return Ok(());
    }

    let dumper = GraphDumper::new(EmitterConfig {
        order,
        verbosity: if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        },
        ..EmitterConfig::default()
    });
    println!("{}", dumper.dump(&mut graph)?);

    if verbose {
        println!();
        println!("{}", " Passes".bright_blue().bold());
        for record in manager.statistics() {
            println!(
                "   {:<16} {:>8}us  {} bytes",
                record.name,
                record.duration.as_micros(),
                record.memory_usage.unwrap_or_default()
            );
        }
        if let Some(scheduler) = manager.get_pass::<Scheduler>() {
            println!("   scheduled blocks: {}", scheduler.changed_blocks().len());
        }
        println!(
            "\n {} Analysis finished in {:.3}s",
            "SUCCESS:".bright_green().bold(),
            elapsed.as_secs_f64()
        );
    }
    Ok(())
}

fn validate_one(path: &Path, result: tessera_parser::Result<BuiltGraph>, verbose: bool) -> bool {
    let mut built = match result {
        Ok(built) => built,
        Err(e) => {
            println!("{} {}", " INVALID".bright_red().bold(), path.display());
            println!("   {}", e);
            return false;
        }
    };
    match GraphVerifier::new(VerificationLevel::Full).verify(&mut built.graph) {
        Ok(()) => {
            println!("{} {}", " VALID".bright_green().bold(), path.display());
            if verbose {
                println!(
                    "   {} blocks, {} instructions",
                    built.graph.alive_blocks_count(),
                    built.graph.insts_count()
                );
            }
            true
        }
        Err(errors) => {
            println!("{} {}", " INVALID".bright_red().bold(), path.display());
            for error in errors {
                println!("   {}", error);
            }
            false
        }
    }
}

fn cmd_validate(input: &Path, verbose: bool) -> Result<()> {
    if verbose {
        println!("{}", " Validating graphs".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_cyan());
        println!(" Input: {}", input.display());
        println!();
    }

    let results = if input.is_dir() {
        tessera_parser::parse_dir(input)
    } else {
        vec![(input.to_path_buf(), tessera_parser::parse_file(input))]
    };
    if results.is_empty() {
        println!("{}", "  No .tir files found".yellow());
        return Ok(());
    }

    let total = results.len();
    let failed = results
        .into_iter()
        .map(|(path, result)| validate_one(&path, result, verbose))
        .filter(|ok| !ok)
        .count();
    if failed > 0 {
        bail!("{} of {} graph(s) failed validation", failed, total);
    }
    Ok(())
}

fn cmd_dump(input: &Path, order: BlockOrder, no_color: bool) -> Result<()> {
    let mut graph = build_graph(input, CompilerOptions::default())?.into_graph();
    let config = EmitterConfig {
        order,
        ..if no_color {
            EmitterConfig::plain()
        } else {
            EmitterConfig::default()
        }
    };
    println!("{}", GraphDumper::new(config).dump(&mut graph)?);
    Ok(())
}
