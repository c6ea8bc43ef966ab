// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Deterministic, CI-friendly runner driven by a YAML test script.

use crate::{EXIT_ASSERT_FAIL, EXIT_CONFIG_ERROR, EXIT_PASS, EXIT_RUNTIME_ERROR};
use anyhow::Context;
use nxu8_config::{StopReason, TestAssertion, TestLimits, TestScript};
use nxu8_core::metrics::PerformanceMetrics;
use nxu8_core::peripherals::ram::Ram;
use nxu8_core::system::builder::MachineBuilder;
use nxu8_core::{DebugControl, Machine, SimulationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub const RESULT_SCHEMA_VERSION: &str = "1.0";

/// Guard against accidentally huge runs from CI misconfiguration.
pub const MAX_ALLOWED_STEPS: u64 = 50_000_000;

#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub script: PathBuf,
    /// Overrides the script's `max_steps`.
    pub max_steps: Option<u64>,
    pub max_cycles: Option<u64>,
    pub no_progress_steps: Option<u64>,
    /// Added to the script's breakpoints.
    pub breakpoints: Vec<u32>,
    /// Directory for result.json and snapshot.json.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TestResult {
    pub result_schema_version: String,
    pub status: String,
    pub steps_executed: u64,
    pub cycles: u64,
    pub instructions: u64,
    pub stop_reason: StopReason,
    pub stop_reason_details: StopReasonDetails,
    pub limits: TestLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub assertions: Vec<AssertionResult>,
    pub rom_hash: String,
    pub config: TestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StopReasonDetails {
    pub triggered_stop_condition: StopReason,
    pub triggered_limit: Option<NamedU64>,
    pub observed: Option<NamedU64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NamedU64 {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssertionResult {
    pub assertion: TestAssertion,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TestConfig {
    pub model: Option<PathBuf>,
    pub script: PathBuf,
}

#[derive(Debug)]
pub struct TestOutcome {
    pub exit_code: u8,
    pub result: TestResult,
}

fn named(name: &str, value: u64) -> NamedU64 {
    NamedU64 {
        name: name.to_string(),
        value,
    }
}

fn resolve_script_path(script: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        p
    } else {
        script.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn hash_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
        Err(_) => String::new(),
    }
}

fn build_stop_reason_details(
    stop_reason: StopReason,
    limits: &TestLimits,
    steps_executed: u64,
    cycles: u64,
    stuck_steps: u64,
    duration: Duration,
) -> StopReasonDetails {
    let (triggered_limit, observed) = match stop_reason {
        StopReason::MaxSteps => (
            Some(named("max_steps", limits.max_steps)),
            Some(named("steps_executed", steps_executed)),
        ),
        StopReason::MaxCycles => (
            limits.max_cycles.map(|v| named("max_cycles", v)),
            Some(named("cycles", cycles)),
        ),
        StopReason::NoProgress => (
            limits.no_progress_steps.map(|v| named("no_progress_steps", v)),
            Some(named("stuck_steps", stuck_steps)),
        ),
        StopReason::WallTime => (
            limits.wall_time_ms.map(|v| named("wall_time_ms", v)),
            Some(named(
                "elapsed_wall_time_ms",
                duration.as_millis().min(u128::from(u64::MAX)) as u64,
            )),
        ),
        StopReason::ConfigError
        | StopReason::DecodeError
        | StopReason::Breakpoint
        | StopReason::Halt => (None, None),
    };

    StopReasonDetails {
        triggered_stop_condition: stop_reason,
        triggered_limit,
        observed,
    }
}

struct Prepared {
    script: TestScript,
    limits: TestLimits,
    model_path: PathBuf,
    rom_path: PathBuf,
    machine: Machine,
}

fn prepare(opts: &TestOptions) -> anyhow::Result<Prepared> {
    let script = TestScript::from_file(&opts.script)?;
    let limits = TestLimits {
        max_steps: opts.max_steps.unwrap_or(script.limits.max_steps),
        max_cycles: opts.max_cycles.or(script.limits.max_cycles),
        no_progress_steps: opts.no_progress_steps.or(script.limits.no_progress_steps),
        wall_time_ms: script.limits.wall_time_ms,
    };
    if limits.max_steps > MAX_ALLOWED_STEPS {
        anyhow::bail!(
            "max_steps {} exceeds MAX_ALLOWED_STEPS {}",
            limits.max_steps,
            MAX_ALLOWED_STEPS
        );
    }

    let model_path = resolve_script_path(&opts.script, &script.inputs.model);
    let builder = MachineBuilder::from_file(&model_path)?;
    let rom_path = PathBuf::from(&builder.model().rom);
    let mut machine = builder.build()?;

    if let Some(image) = &script.inputs.ram_image {
        let path = resolve_script_path(&opts.script, image);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read RAM image {:?}", path))?;
        machine
            .peripheral_mut::<Ram>()
            .context("Model has no RAM")?
            .load_image(&bytes)?;
    }

    Ok(Prepared {
        script,
        limits,
        model_path,
        rom_path,
        machine,
    })
}

fn evaluate(
    machine: &mut Machine,
    assertion: &TestAssertion,
    stop_reason: StopReason,
) -> (bool, Option<u64>) {
    match assertion {
        TestAssertion::ExpectedStopReason(a) => (a.expected_stop_reason == stop_reason, None),
        TestAssertion::MemoryValue(a) => {
            let m = &a.memory_value;
            let size = m.size.unwrap_or(1) as usize;
            let actual = machine
                .read_memory(m.address, size)
                .iter()
                .rev()
                .fold(0u64, |acc, b| acc << 8 | *b as u64);
            let mask = m.mask.unwrap_or(u64::MAX);
            (actual & mask == m.expected_value & mask, Some(actual))
        }
        TestAssertion::RegisterValue(a) => {
            let r = &a.register_value;
            match machine.read_register(&r.register) {
                Ok(actual) => {
                    let mask = r.mask.unwrap_or(u64::MAX);
                    (actual & mask == r.expected_value & mask, Some(actual))
                }
                Err(e) => {
                    error!("Assertion on register: {}", e);
                    (false, None)
                }
            }
        }
    }
}

/// Run a test script end to end. Writes artifacts when `output_dir` is set.
pub fn run_test(opts: &TestOptions) -> TestOutcome {
    let Prepared {
        script,
        limits,
        model_path,
        rom_path,
        mut machine,
    } = match prepare(opts) {
        Ok(p) => p,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            return config_error_outcome(opts, msg);
        }
    };

    let metrics = Arc::new(PerformanceMetrics::new());
    machine.add_observer(metrics.clone());
    for addr in script.breakpoints.iter().chain(&opts.breakpoints) {
        machine.add_breakpoint(*addr);
    }

    let start = Instant::now();
    let mut stop_reason = StopReason::MaxSteps;
    let mut steps_executed: u64 = 0;
    let mut message = None;
    let mut sim_error_happened = false;
    let mut prev_pc = machine.get_pc();
    let mut stuck_counter: u64 = 0;

    for step in 0..limits.max_steps {
        if step > 0 && machine.breakpoints.contains(&machine.get_pc()) {
            info!("Breakpoint hit at PC={:#x} (step={})", machine.get_pc(), step);
            stop_reason = StopReason::Breakpoint;
            break;
        }
        if let Some(wall_time_ms) = limits.wall_time_ms {
            if start.elapsed().as_millis() >= wall_time_ms as u128 {
                stop_reason = StopReason::WallTime;
                break;
            }
        }
        if let Some(limit) = limits.max_cycles {
            if machine.get_cycle_count() >= limit {
                stop_reason = StopReason::MaxCycles;
                break;
            }
        }

        match machine.step() {
            Ok(Some(_)) => steps_executed = step + 1,
            Ok(None) => {
                info!("CPU idle with nothing to wake it at PC={:#x}", machine.get_pc());
                stop_reason = StopReason::Halt;
                break;
            }
            Err(e) => {
                error!("Simulation error at step {}: {}", step, e);
                sim_error_happened = true;
                stop_reason = if matches!(e, SimulationError::UnknownOpcode { .. }) {
                    StopReason::DecodeError
                } else {
                    StopReason::Halt
                };
                message = Some(e.to_string());
                break;
            }
        }

        if let Some(limit) = limits.no_progress_steps {
            let current_pc = machine.get_pc();
            if current_pc == prev_pc {
                stuck_counter += 1;
                if stuck_counter >= limit {
                    error!("No progress (PC stuck at {:#x}) for {} steps", prev_pc, limit);
                    stop_reason = StopReason::NoProgress;
                    break;
                }
            } else {
                stuck_counter = 0;
                prev_pc = current_pc;
            }
        }
    }
    let duration = start.elapsed();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;
    for assertion in &script.assertions {
        let (passed, actual) = evaluate(&mut machine, assertion, stop_reason);
        if matches!(assertion, TestAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }
        if !passed {
            all_passed = false;
            error!("Assertion failed: {:?} (actual {:?})", assertion, actual);
        }
        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
            actual,
        });
    }

    let stop_requires_assertion =
        matches!(stop_reason, StopReason::WallTime | StopReason::NoProgress);
    let (status, exit_code) =
        if !all_passed || (stop_requires_assertion && !expected_stop_reason_matched) {
            ("fail", EXIT_ASSERT_FAIL)
        } else if sim_error_happened && !expected_stop_reason_matched {
            ("error", EXIT_RUNTIME_ERROR)
        } else {
            ("pass", EXIT_PASS)
        };

    let cycles = machine.get_cycle_count();
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        steps_executed,
        cycles,
        instructions: metrics.get_instructions(),
        stop_reason,
        stop_reason_details: build_stop_reason_details(
            stop_reason,
            &limits,
            steps_executed,
            cycles,
            stuck_counter,
            duration,
        ),
        limits,
        message,
        assertions: assertion_results,
        rom_hash: hash_file(&rom_path),
        config: TestConfig {
            model: Some(model_path),
            script: opts.script.clone(),
        },
    };

    info!(
        "Test {}: {} steps, {} cycles, stop reason {:?}, {:.2} IPS",
        result.status,
        result.steps_executed,
        result.cycles,
        result.stop_reason,
        metrics.get_ips()
    );
    write_outputs(opts, &result, Some(&machine));
    TestOutcome { exit_code, result }
}

fn config_error_outcome(opts: &TestOptions, message: String) -> TestOutcome {
    let limits = TestLimits {
        max_steps: opts.max_steps.unwrap_or(0),
        max_cycles: opts.max_cycles,
        no_progress_steps: opts.no_progress_steps,
        wall_time_ms: None,
    };
    let stop_reason = StopReason::ConfigError;
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        cycles: 0,
        instructions: 0,
        stop_reason,
        stop_reason_details: build_stop_reason_details(
            stop_reason,
            &limits,
            0,
            0,
            0,
            Duration::from_secs(0),
        ),
        limits,
        message: Some(message),
        assertions: Vec::new(),
        rom_hash: String::new(),
        config: TestConfig {
            model: None,
            script: opts.script.clone(),
        },
    };
    write_outputs(opts, &result, None);
    TestOutcome {
        exit_code: EXIT_CONFIG_ERROR,
        result,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

fn write_outputs(opts: &TestOptions, result: &TestResult, machine: Option<&Machine>) {
    let Some(output_dir) = &opts.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }
    write_json(&output_dir.join("result.json"), result);
    if let Some(machine) = machine {
        write_json(&output_dir.join("snapshot.json"), &machine.snapshot());
    }
}
