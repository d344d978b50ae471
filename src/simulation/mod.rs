//! Discrete-event WiFi network simulation core.
//!
//! A single-threaded event loop advances virtual time from one scheduled
//! event to the next. Stations and access points share one wireless channel;
//! the MAC handles association, queueing, contention and collisions, and
//! UDP applications generate the traffic that the flow monitor accounts for.
//!
//! ## Module Organization
//!
//! - `time`, `scheduler`: virtual clock and cancellable event queue
//! - `types`: identifiers, frames, packets and the event enum
//! - `geometry`, `propagation`: positions, path loss and propagation delay
//! - `registry`: nodes and the interfaces they own
//! - `channel`: fan-out of transmissions to receivers in range
//! - `mac`: association, transmit queue, contention, fragmentation
//! - `application`: echo client/server, on/off source, packet sink
//! - `flow_monitor`, `capture`: per-flow statistics and frame taps
//! - `network`: scenario building and the event dispatch loop
//!
//! ## Public API
//!
//! `Simulator::build` turns a validated `ScenarioConfig` into a runnable
//! simulation; `Simulator::run` drives it to the stop time and returns a
//! `SimulationSummary`.

pub mod application;
pub mod capture;
pub mod channel;
pub mod flow_monitor;
pub mod geometry;
pub mod mac;
pub mod network;
pub mod propagation;
pub mod registry;
pub mod scheduler;
pub mod time;
pub mod types;

pub use capture::{FrameTap, LogTap};
pub use flow_monitor::FlowStats;
pub use network::{LinkBudget, SimulationSummary, Simulator};
pub use time::{SimDuration, SimTime};
