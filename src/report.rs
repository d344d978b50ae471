//! Text and JSON reporting of a finished run.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::simulation::network::{EchoSummary, InterfaceSummary, SinkSummary};
use crate::simulation::registry::Interface;
use crate::simulation::types::Role;
use crate::simulation::{FlowStats, LinkBudget, SimulationSummary};

/// JSON export document.
#[derive(Serialize)]
struct FlowExport<'a> {
    generated_at: DateTime<Utc>,
    scenario: &'a str,
    end_time_s: f64,
    events_processed: u64,
    flows: &'a [FlowStats],
    echo: &'a [EchoSummary],
    sinks: &'a [SinkSummary],
    interfaces: &'a [InterfaceSummary],
}

pub fn link_line(budget: &LinkBudget) -> String {
    format!(
        "Rx power: {:.3} dBm at distance {:.2} m (propagation delay {})",
        budget.rx_power_dbm, budget.distance_m, budget.delay
    )
}

pub fn address_line(interface: &Interface) -> String {
    let role = match interface.role {
        Role::AccessPoint => "Access point",
        Role::Station => "Station",
    };
    match interface.address {
        Some(address) => format!("{role} {} ({}) address: {address}", interface.id, interface.node),
        None => format!("{role} {} ({}) has no address", interface.id, interface.node),
    }
}

/// Per-flow block plus echo and sink totals.
pub fn render(summary: &SimulationSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scenario '{}' ended at {:.6}s after {} events",
        summary.scenario, summary.end_time_s, summary.events_processed
    );

    for flow in &summary.flows {
        let _ = writeln!(
            out,
            "Flow {} ({} -> {})",
            flow.flow_id,
            address_or_id(flow.source_address, &flow.source.to_string()),
            address_or_id(flow.destination_address, &flow.destination.to_string())
        );
        let _ = writeln!(out, "  Tx Packets: {}", flow.tx_packets);
        let _ = writeln!(out, "  Tx Bytes:   {}", flow.tx_bytes);
        let _ = writeln!(out, "  TxOffered:  {:.6} Mbps", flow.tx_offered_mbps);
        let _ = writeln!(out, "  Rx Packets: {}", flow.rx_packets);
        let _ = writeln!(out, "  Rx Bytes:   {}", flow.rx_bytes);
        let _ = writeln!(out, "  Throughput: {:.6} Mbps", flow.throughput_mbps);
        if flow.lost_packets > 0 {
            let _ = writeln!(out, "  Lost:       {}", flow.lost_packets);
        }
        if let Some(delay) = flow.mean_delay_s {
            let _ = writeln!(out, "  Mean delay: {:.9} s", delay);
        }
    }

    for echo in &summary.echo {
        let rtt = echo.mean_rtt_s.map(|s| format!("{:.3} us", s * 1e6)).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "Echo {}: {} sent, {} replies, {} lost, mean RTT {}",
            echo.application, echo.sent, echo.replies, echo.lost, rtt
        );
    }
    for sink in &summary.sinks {
        let _ = writeln!(out, "Sink {}: {} packets, {} bytes", sink.application, sink.packets, sink.bytes);
    }
    out
}

fn address_or_id(address: Option<std::net::Ipv4Addr>, id: &str) -> String {
    address.map(|a| a.to_string()).unwrap_or_else(|| id.to_string())
}

/// Write the flow statistics of `summary` as pretty-printed JSON.
pub fn write_json(summary: &SimulationSummary, path: &Path) -> anyhow::Result<()> {
    let export = FlowExport {
        generated_at: Utc::now(),
        scenario: &summary.scenario,
        end_time_s: summary.end_time_s,
        events_processed: summary.events_processed,
        flows: &summary.flows,
        echo: &summary.echo,
        sinks: &summary.sinks,
        interfaces: &summary.interfaces,
    };
    let json = serde_json::to_string_pretty(&export).context("Failed to serialize flow statistics")?;
    fs::write(path, json).with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::simulation::Simulator;

    #[test]
    fn report_lists_both_echo_flows() {
        let mut simulator = Simulator::build(&ScenarioConfig::echo_link()).unwrap();
        let summary = simulator.run();
        let text = render(&summary);
        assert!(text.contains("Flow 1 (10.1.1.1 -> 10.1.1.2)"));
        assert!(text.contains("Flow 2 (10.1.1.2 -> 10.1.1.1)"));
        assert!(text.contains("  Tx Packets: 15"));
        assert!(text.contains("15 sent, 15 replies, 0 lost"));
    }

    #[test]
    fn json_export_round_trips_through_serde_json() {
        let mut simulator = Simulator::build(&ScenarioConfig::echo_link()).unwrap();
        let summary = simulator.run();
        let path = std::env::temp_dir().join(format!("wifi-link-simulator-{}.json", std::process::id()));
        write_json(&summary, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(value["scenario"], "echo-link");
        assert_eq!(value["flows"].as_array().unwrap().len(), 2);
        assert_eq!(value["flows"][0]["rx_packets"], 15);
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn address_lines_name_role_and_address() {
        let simulator = Simulator::build(&ScenarioConfig::ap_throughput()).unwrap();
        let registry = simulator.network().registry();
        let ap = address_line(registry.interface(simulator.access_points()[0]));
        let station = address_line(registry.interface(simulator.stations()[0]));
        assert_eq!(ap, "Access point if0 (n0) address: 10.1.1.1");
        assert_eq!(station, "Station if1 (n1) address: 10.1.1.2");
    }

    #[test]
    fn link_line_shows_power_and_distance() {
        let budget = LinkBudget {
            distance_m: 251.1,
            rx_power_dbm: -79.994,
            delay: crate::simulation::SimDuration::from_nanos(838),
        };
        let line = link_line(&budget);
        assert!(line.contains("-79.994 dBm"));
        assert!(line.contains("251.10 m"));
    }
}
