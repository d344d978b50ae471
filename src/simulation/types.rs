//! Type definitions shared across the simulation.
//!
//! Contains:
//! - Entity identifiers (nodes, interfaces, channels, applications)
//! - Frame and packet structures carried over the channel
//! - The event payload enum dispatched by the simulator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use super::time::SimTime;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a simulated node.
    NodeId,
    "n"
);
id_type!(
    /// Identifier of a network interface, unique across the scenario.
    InterfaceId,
    "if"
);
id_type!(
    /// Identifier of a shared channel.
    ChannelId,
    "ch"
);
id_type!(
    /// Identifier of an installed application.
    ApplicationId,
    "app"
);

/// Role of an interface on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AccessPoint,
    Station,
}

/// Link-layer destination of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    Unicast(InterfaceId),
}

impl Destination {
    pub fn accepts(&self, interface: InterfaceId) -> bool {
        match self {
            Destination::Broadcast => true,
            Destination::Unicast(target) => *target == interface,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ProbeRequest,
    AssociationResponse,
    Data,
}

/// Frame as seen by the channel: one transmission on the medium.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub source: InterfaceId,
    pub destination: Destination,
    /// Size on the air in bytes, including MAC overhead.
    pub size_bytes: u32,
    /// Zero-based fragment index and total fragment count.
    pub fragment_index: u16,
    pub fragment_count: u16,
    /// Upper-layer payload; present on data frames only.
    pub packet: Option<Packet>,
}

impl Frame {
    /// Management frame without payload.
    pub fn management(kind: FrameKind, source: InterfaceId, destination: Destination, size_bytes: u32) -> Self {
        Self {
            kind,
            source,
            destination,
            size_bytes,
            fragment_index: 0,
            fragment_count: 1,
            packet: None,
        }
    }

    pub fn is_management(&self) -> bool {
        self.kind != FrameKind::Data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    EchoRequest,
    EchoReply,
    Datagram,
}

/// UDP datagram exchanged between applications.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Unique across the scenario; used for fragment reassembly.
    pub uid: u64,
    pub kind: PacketKind,
    pub source_address: Ipv4Addr,
    pub source_port: u16,
    pub destination_address: Ipv4Addr,
    pub destination_port: u16,
    /// Application sequence number (echo pairing).
    pub sequence: u32,
    /// Application payload size in bytes.
    pub payload_bytes: u32,
    pub sent_at: SimTime,
}

/// Event payloads understood by the simulator. Each names its target.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Station leaves `Unassociated` and starts probing.
    StartProbing { interface: InterfaceId },
    /// No association response arrived in time.
    ProbeTimeout { interface: InterfaceId },
    /// Contention deferral elapsed; put the head of the queue on the air.
    MacTransmit { interface: InterfaceId },
    /// A frame arrives at an interface.
    Receive { interface: InterfaceId, frame: Frame, rx_power_dbm: f64 },
    ApplicationStart { application: ApplicationId },
    ApplicationStop { application: ApplicationId },
    ApplicationSend { application: ApplicationId },
    /// On/off generator switches state.
    ApplicationToggle { application: ApplicationId },
    /// Echo request `sequence` got no reply in time.
    EchoTimeout { application: ApplicationId, sequence: u32 },
    /// Terminal event: halts the run.
    Stop,
}
