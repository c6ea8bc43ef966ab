// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use nxu8_cli::test_runner::{run_test, TestOptions};
use nxu8_cli::{
    assemble_lines, disasm, parse_u32_addr, EXIT_CONFIG_ERROR, EXIT_PASS, EXIT_RUNTIME_ERROR,
};
use nxu8_core::metrics::PerformanceMetrics;
use nxu8_core::peripherals::ram::Ram;
use nxu8_core::runner::Emulator;
use nxu8_core::snapshot::MachineSnapshot;
use nxu8_core::system::builder::MachineBuilder;
use nxu8_core::{DebugControl, Machine, StopReason};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "nX-U8/100 calculator emulator", long_about = None)]
struct Cli {
    /// Enable instruction-level execution tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a model interactively until a limit or breakpoint.
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),

    /// Assemble instruction lines into code words.
    Asm(AsmArgs),

    /// Disassemble the ROM of a model.
    Disasm(DisasmArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the model descriptor (YAML)
    #[arg(short, long)]
    model: PathBuf,

    /// Maximum number of steps to execute
    #[arg(long, default_value = "20000")]
    max_steps: u64,

    /// Breakpoint PC address (repeatable). Stops simulation when PC matches.
    #[arg(long, value_parser = parse_u32_addr)]
    breakpoint: Vec<u32>,

    /// Resume from a state snapshot (JSON) written by an earlier run.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write a state snapshot (JSON) when the run ends.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Load a raw RAM image before running.
    #[arg(long)]
    ram: Option<PathBuf>,

    /// Save the raw RAM image when the run ends.
    #[arg(long)]
    save_ram: Option<PathBuf>,

    /// Run on the background clock for this many milliseconds instead of stepping.
    #[arg(long, conflicts_with = "breakpoint")]
    realtime_ms: Option<u64>,

    /// Track CALL/RT nesting (reported by the metrics observer).
    #[arg(long)]
    call_stack: bool,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Override max steps (takes precedence over script)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Override max cycles (takes precedence over script)
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Override the no-progress limit (takes precedence over script)
    #[arg(long)]
    no_progress: Option<u64>,

    /// Breakpoint PC address (repeatable). Stops simulation when PC matches.
    #[arg(long, value_parser = parse_u32_addr)]
    breakpoint: Vec<u32>,

    /// Output directory for result.json and snapshot.json
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct AsmArgs {
    /// Instruction lines, e.g. "add r0, 5"
    #[arg(required = true)]
    lines: Vec<String>,
}

#[derive(Parser, Debug)]
struct DisasmArgs {
    /// Path to the model descriptor (YAML)
    #[arg(short, long)]
    model: PathBuf,

    /// First code address
    #[arg(long, value_parser = parse_u32_addr, default_value = "0")]
    start: u32,

    /// Number of instructions
    #[arg(long, default_value = "32")]
    count: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_interactive(args),
        Commands::Test(args) => {
            let outcome = run_test(&TestOptions {
                script: args.script,
                max_steps: args.max_steps,
                max_cycles: args.max_cycles,
                no_progress_steps: args.no_progress,
                breakpoints: args.breakpoint,
                output_dir: args.output_dir,
            });
            ExitCode::from(outcome.exit_code)
        }
        Commands::Asm(args) => match assemble_lines(&args.lines) {
            Ok(out) => {
                for (line, words) in args.lines.iter().zip(out) {
                    println!("{:<24} {}", words, line);
                }
                ExitCode::from(EXIT_PASS)
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        },
        Commands::Disasm(args) => match MachineBuilder::from_file(&args.model)
            .and_then(MachineBuilder::build)
        {
            Ok(machine) => {
                for line in disasm::listing(&machine.mmu, args.start, args.count) {
                    println!("{}", line);
                }
                ExitCode::from(EXIT_PASS)
            }
            Err(e) => {
                error!("{:#}", e);
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        },
    }
}

fn prepare_machine(args: &RunArgs) -> anyhow::Result<Machine> {
    let mut machine = MachineBuilder::from_file(&args.model)?
        .with_call_stack(args.call_stack)
        .build()?;

    if let Some(path) = &args.resume {
        let f = std::fs::File::open(path)
            .with_context(|| format!("Failed to open snapshot {:?}", path))?;
        let snapshot: MachineSnapshot =
            serde_json::from_reader(f).context("Failed to parse snapshot JSON")?;
        machine.apply_snapshot(snapshot)?;
        info!("Resumed from snapshot {:?}", path);
    }
    if let Some(path) = &args.ram {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read RAM image {:?}", path))?;
        machine
            .peripheral_mut::<Ram>()
            .context("Model has no RAM")?
            .load_image(&bytes)?;
    }
    for addr in &args.breakpoint {
        machine.add_breakpoint(*addr);
    }
    Ok(machine)
}

fn run_interactive(args: RunArgs) -> ExitCode {
    let mut machine = match prepare_machine(&args) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let metrics = Arc::new(PerformanceMetrics::new());
    machine.add_observer(metrics.clone());

    let machine = match args.realtime_ms {
        Some(ms) => {
            let mut emulator = Emulator::new(machine);
            info!(
                "Running on the background clock for {} ms at {} Hz...",
                ms,
                emulator.cycles_per_second()
            );
            emulator.start();
            std::thread::sleep(Duration::from_millis(ms));
            emulator.shutdown();
            if let Some(e) = emulator.last_error() {
                error!("Simulation error: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
            let shared = emulator.machine();
            drop(emulator);
            match Arc::try_unwrap(shared) {
                Ok(m) => m.into_inner().unwrap_or_else(|e| e.into_inner()),
                Err(_) => {
                    error!("Runner still holds the machine");
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
        }
        None => {
            info!("Running for {} steps...", args.max_steps);
            match machine.run(Some(args.max_steps.min(u32::MAX as u64) as u32)) {
                Ok(StopReason::Breakpoint(pc)) => info!("Breakpoint hit at PC={:#x}", pc),
                Ok(reason) => info!("Stopped: {:?}", reason),
                Err(e) => {
                    error!("Simulation error: {}", e);
                    report_metrics(&machine, &metrics);
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
            machine
        }
    };

    report_metrics(&machine, &metrics);
    match write_artifacts(&args, &machine) {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn write_artifacts(args: &RunArgs, machine: &Machine) -> anyhow::Result<()> {
    if let Some(path) = &args.snapshot {
        write_snapshot(path, machine)?;
        info!("Snapshot written to {:?}", path);
    }
    if let Some(path) = &args.save_ram {
        let ram = machine.peripheral::<Ram>().context("Model has no RAM")?;
        std::fs::write(path, ram.image())
            .with_context(|| format!("Failed to write RAM image {:?}", path))?;
        info!("RAM image written to {:?}", path);
    }
    Ok(())
}

fn write_snapshot(path: &Path, machine: &Machine) -> anyhow::Result<()> {
    let f = std::fs::File::create(path)
        .with_context(|| format!("Failed to create snapshot {:?}", path))?;
    serde_json::to_writer_pretty(f, &machine.snapshot()).context("Failed to write snapshot")?;
    Ok(())
}

fn report_metrics(machine: &Machine, metrics: &PerformanceMetrics) {
    info!("Simulation loop finished.");
    info!("Final PC: {:#x}", machine.get_pc());
    info!("Total Instructions: {}", metrics.get_instructions());
    info!("Total Cycles: {}", metrics.get_cycles());
    info!("Calls: {}, Resets: {}", metrics.get_calls(), metrics.get_resets());
    info!("Average IPS: {:.2}", metrics.get_ips());
}
