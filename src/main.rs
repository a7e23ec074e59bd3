// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::{Context, Result};
use clap::Parser;
use flowtest_harness::config::HarnessConfig;
use flowtest_harness::logging::{Facility, Logger, Severity};
use flowtest_harness::scenario::{run_scenario, Scenario};
use flowtest_harness::sim::SimSwitch;
use flowtest_harness::{log_info, log_notice};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug, PartialEq)]
enum Command {
    /// Run a scenario against the simulated switch and print a JSON report
    Run {
        #[arg(long)]
        scenario: PathBuf,
        /// Harness config (JSON5); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured log level
        #[arg(long)]
        log_level: Option<Severity>,
        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,
    },
    /// Validate a harness config file
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    config.validate().context("invalid harness config")?;
    Ok(config)
}

/// Returns whether the scenario passed
fn run(
    scenario_path: &PathBuf,
    config_path: Option<&PathBuf>,
    log_level: Option<Severity>,
    json_logs: bool,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let level = log_level.unwrap_or(config.log_level);
    let logger = if json_logs {
        Logger::stderr_json(level)
    } else {
        Logger::stderr(level)
    };

    let scenario = Scenario::load_from_file(scenario_path)?;
    log_info!(
        logger,
        Facility::Harness,
        "run on bridge {} (table {}, classifier {})",
        config.ephemeral_bridge_name(),
        config.table.0,
        config.classifier_table.0
    );

    let runtime = SimSwitch::start(config.classifier_table, logger.clone())?;
    let switch = runtime.handle().with_logger(logger.clone());
    let report = run_scenario(&scenario, &config, &switch, &logger)
        .with_context(|| format!("running scenario {}", scenario_path.display()))?;
    runtime.stop();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.passed)
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            scenario,
            config,
            log_level,
            json_logs,
        } => {
            if !run(&scenario, config.as_ref(), log_level, json_logs)? {
                std::process::exit(1);
            }
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            let logger = Logger::stderr(Severity::Notice);
            log_notice!(logger, Facility::Harness, "config ok: table {}", config.table.0);
            println!("{}", config.to_json5());
        }
    }

    Ok(())
}
