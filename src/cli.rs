//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::config::ScenarioConfig;
use crate::error::ConfigError;

/// wifi-link-simulator - discrete-event simulation of small WiFi networks
#[derive(Parser, Debug)]
#[command(
    name = "wifi-link-simulator",
    version,
    about = "Simulate an ad hoc echo link or an access point under UDP load",
    long_about = r#"
Runs one scenario to its stop time and prints per-flow statistics.

Scenarios come from a built-in preset or a TOML file:

  wifi-link-simulator --preset echo-link
  wifi-link-simulator --preset ap-throughput --flow-json flows.json
  wifi-link-simulator --scenario my-scenario.toml --seed 7
"#
)]
pub struct Cli {
    /// Built-in scenario
    #[arg(long, value_enum, default_value = "echo-link", conflicts_with = "scenario")]
    pub preset: Preset,

    /// Scenario file (TOML)
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,

    /// Override the number of stations
    #[arg(short = 'n', long)]
    pub station_count: Option<usize>,

    /// Log application events at info level (overrides the scenario)
    #[arg(long, action = clap::ArgAction::Set)]
    pub verbose: Option<bool>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the stop time, in seconds
    #[arg(long)]
    pub stop_time: Option<f64>,

    /// Write flow statistics as JSON to this file
    #[arg(long)]
    pub flow_json: Option<PathBuf>,

    /// Log every transmitted and received frame (trace level)
    #[arg(long)]
    pub capture: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info", value_parser = parse_level_filter)]
    pub log_level: LevelFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Two ad hoc stations exchanging UDP echo packets
    EchoLink,
    /// Two stations and an access point receiving a 20 Mb/s stream
    ApThroughput,
}

fn parse_level_filter(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level '{value}' (expected off, error, warn, info, debug or trace)"))
}

impl Cli {
    /// Scenario selected on the command line with overrides applied.
    pub fn scenario_config(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut config = match &self.scenario {
            Some(path) => ScenarioConfig::load(path)?,
            None => match self.preset {
                Preset::EchoLink => ScenarioConfig::echo_link(),
                Preset::ApThroughput => ScenarioConfig::ap_throughput(),
            },
        };
        if let Some(count) = self.station_count {
            config.station_count = count;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(stop) = self.stop_time {
            config.stop_time_s = stop;
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        Ok(config)
    }
}
