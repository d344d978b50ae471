//! Frame capture hooks.
//!
//! Every frame put on the air and every frame arriving at an interface is
//! offered to the registered taps. Serializing captures into a file format
//! is left to the tap implementation; `LogTap` writes one trace line per
//! frame.

use log::trace;

use super::time::SimTime;
use super::types::{Destination, Frame, FrameKind, InterfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// One observed frame.
#[derive(Debug)]
pub struct CaptureEvent<'a> {
    pub time: SimTime,
    pub interface: InterfaceId,
    pub direction: Direction,
    pub frame: &'a Frame,
    /// Set on receptions.
    pub rx_power_dbm: Option<f64>,
    /// The reception overlapped an earlier frame and was lost.
    pub collided: bool,
}

pub trait FrameTap {
    fn on_frame(&mut self, event: &CaptureEvent<'_>);
}

/// Tap writing every frame to the `trace` log.
pub struct LogTap;

impl FrameTap for LogTap {
    fn on_frame(&mut self, event: &CaptureEvent<'_>) {
        let kind = match event.frame.kind {
            FrameKind::ProbeRequest => "probe-req",
            FrameKind::AssociationResponse => "assoc-resp",
            FrameKind::Data => "data",
        };
        let destination = match event.frame.destination {
            Destination::Broadcast => "broadcast".to_string(),
            Destination::Unicast(target) => target.to_string(),
        };
        let direction = match event.direction {
            Direction::Transmit => "TX",
            Direction::Receive => "RX",
        };
        let power = event.rx_power_dbm.map(|p| format!(" {p:.2}dBm")).unwrap_or_default();
        trace!(
            "{} {} {} {} {}->{} {}B frag {}/{}{}{}",
            event.time,
            event.interface,
            direction,
            kind,
            event.frame.source,
            destination,
            event.frame.size_bytes,
            event.frame.fragment_index + 1,
            event.frame.fragment_count,
            power,
            if event.collided { " COLLISION" } else { "" }
        );
    }
}
