use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, error, info};

mod cli;
mod config;
mod error;
mod report;
mod simulation;

use cli::Cli;
use simulation::{LogTap, Simulator};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level;
    // Frame capture lines are logged at trace.
    let crate_level = if cli.capture { LevelFilter::Trace } else { level };
    Builder::new()
        .filter_level(level)
        .filter(Some("wifi_link_simulator"), crate_level)
        .parse_default_env()
        .init();

    let config = match cli.scenario_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let mut simulator = match Simulator::build(&config) {
        Ok(simulator) => simulator,
        Err(e) => {
            error!("Scenario '{}' rejected", config.name);
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if cli.capture {
        simulator.add_tap(Box::new(LogTap));
    }

    let antenna_z = config.station_positions.position(0).z;
    let range = simulation::propagation::estimate_range(&config.propagation, config.phy.tx_power_dbm, config.phy.rx_sensitivity_dbm, antenna_z);
    info!("Estimated radio range: {range:.1} m");
    let registry = simulator.network().registry();
    for &interface in simulator.access_points().iter().chain(simulator.stations()) {
        info!("{}", report::address_line(registry.interface(interface)));
    }
    if let [first, .., last] = simulator.stations() {
        let budget = simulator.link_budget(*first, *last);
        info!("{}", report::link_line(&budget));
    }

    let summary = simulator.run();
    print!("{}", report::render(&summary));

    if let Some(path) = &cli.flow_json {
        report::write_json(&summary, path)?;
        info!("Flow statistics written to {}", path.display());
    }
    Ok(())
}
