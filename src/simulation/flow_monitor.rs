//! Per-flow packet and byte counters.
//!
//! A flow is the ordered pair (source interface, destination interface).
//! Transmit counters are updated when an application hands a packet down,
//! receive counters when the packet is delivered at the destination
//! interface. A packet sent but never delivered shows up only as a
//! difference between the two.

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use super::time::{SimDuration, SimTime};
use super::types::InterfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlowKey {
    pub source: InterfaceId,
    pub destination: InterfaceId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowRecord {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// Packets declared lost by an application timeout.
    pub lost_packets: u64,
    pub delay_sum: SimDuration,
    pub first_tx: Option<SimTime>,
    pub last_tx: Option<SimTime>,
    pub first_rx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
}

impl FlowRecord {
    pub fn mean_delay(&self) -> Option<SimDuration> {
        if self.rx_packets == 0 {
            None
        } else {
            Some(SimDuration::from_nanos(self.delay_sum.as_nanos() / self.rx_packets))
        }
    }
}

#[derive(Default)]
pub struct FlowMonitor {
    records: BTreeMap<FlowKey, FlowRecord>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tx(&mut self, key: FlowKey, bytes: u32, now: SimTime) {
        let record = self.records.entry(key).or_default();
        record.tx_packets += 1;
        record.tx_bytes += bytes as u64;
        record.first_tx.get_or_insert(now);
        record.last_tx = Some(now);
    }

    pub fn record_rx(&mut self, key: FlowKey, bytes: u32, delay: SimDuration, now: SimTime) {
        let record = self.records.entry(key).or_default();
        record.rx_packets += 1;
        record.rx_bytes += bytes as u64;
        record.delay_sum += delay;
        record.first_rx.get_or_insert(now);
        record.last_rx = Some(now);
    }

    pub fn record_lost(&mut self, key: FlowKey) {
        self.records.entry(key).or_default().lost_packets += 1;
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &FlowRecord)> {
        self.records.iter()
    }
}

/// Read-only view of one flow, with addresses resolved, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStats {
    pub flow_id: u32,
    pub source: InterfaceId,
    pub destination: InterfaceId,
    pub source_address: Option<Ipv4Addr>,
    pub destination_address: Option<Ipv4Addr>,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub mean_delay_s: Option<f64>,
    pub first_tx_s: Option<f64>,
    pub last_rx_s: Option<f64>,
    /// Offered load over the measurement window, Mb/s.
    pub tx_offered_mbps: f64,
    /// Received payload over the measurement window, Mb/s.
    pub throughput_mbps: f64,
}

impl FlowStats {
    /// Build the snapshot entry. The measurement window runs from the first
    /// transmitted packet to `end`.
    pub fn from_record(flow_id: u32, key: &FlowKey, record: &FlowRecord, addresses: (Option<Ipv4Addr>, Option<Ipv4Addr>), end: SimTime) -> Self {
        let window = record.first_tx.map(|first| end.saturating_duration_since(first).as_secs_f64()).unwrap_or(0.0);
        let mbps = |bytes: u64| if window > 0.0 { bytes as f64 * 8.0 / window / 1e6 } else { 0.0 };
        Self {
            flow_id,
            source: key.source,
            destination: key.destination,
            source_address: addresses.0,
            destination_address: addresses.1,
            tx_packets: record.tx_packets,
            tx_bytes: record.tx_bytes,
            rx_packets: record.rx_packets,
            rx_bytes: record.rx_bytes,
            lost_packets: record.lost_packets,
            mean_delay_s: record.mean_delay().map(|d| d.as_secs_f64()),
            first_tx_s: record.first_tx.map(|t| t.as_secs_f64()),
            last_rx_s: record.last_rx.map(|t| t.as_secs_f64()),
            tx_offered_mbps: mbps(record.tx_bytes),
            throughput_mbps: mbps(record.rx_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> FlowKey {
        FlowKey {
            source: InterfaceId(0),
            destination: InterfaceId(1),
        }
    }

    #[test]
    fn counters_accumulate_per_flow() {
        let mut monitor = FlowMonitor::new();
        monitor.record_tx(key(), 1000, SimTime::from_secs_f64(1.0));
        monitor.record_tx(key(), 1000, SimTime::from_secs_f64(2.0));
        monitor.record_rx(key(), 1000, SimDuration::from_micros(10), SimTime::from_secs_f64(1.00001));
        monitor.record_lost(key());

        let record = monitor.get(&key()).unwrap();
        assert_eq!(record.tx_packets, 2);
        assert_eq!(record.tx_bytes, 2000);
        assert_eq!(record.rx_packets, 1);
        assert_eq!(record.lost_packets, 1);
        assert_eq!(record.first_tx, Some(SimTime::from_secs_f64(1.0)));
        assert_eq!(record.last_tx, Some(SimTime::from_secs_f64(2.0)));
        assert_eq!(record.mean_delay(), Some(SimDuration::from_micros(10)));
        assert_eq!(monitor.iter().count(), 1);
    }

    #[test]
    fn stats_compute_rates_over_window() {
        let mut monitor = FlowMonitor::new();
        for i in 0..10 {
            let t = SimTime::from_secs_f64(1.0 + i as f64 * 0.1);
            monitor.record_tx(key(), 125_000, t);
            if i % 2 == 0 {
                monitor.record_rx(key(), 125_000, SimDuration::ZERO, t);
            }
        }
        let record = monitor.get(&key()).unwrap();
        let stats = FlowStats::from_record(1, &key(), record, (None, None), SimTime::from_secs_f64(11.0));
        // 10 Mbit offered and 5 Mbit delivered over a 10 s window.
        assert!((stats.tx_offered_mbps - 1.0).abs() < 1e-9);
        assert!((stats.throughput_mbps - 0.5).abs() < 1e-9);
        assert_eq!(stats.rx_packets, 5);
    }
}
