//! Error types for scenario configuration and setup.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

use crate::simulation::types::{InterfaceId, Role};

/// Rejected scenario configuration. Nothing is simulated when one of these
/// is returned.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Number of wifi nodes {requested} specified exceeds the mobility bounding box (at most {bound})")]
    TooManyStations { requested: usize, bound: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("traffic endpoint {role:?} #{index} does not exist ({available} configured)")]
    UnknownEndpoint { role: Role, index: usize, available: usize },

    #[error("failed to read scenario file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario file: {0}")]
    Parse(String),

    #[error("address assignment failed: {0}")]
    Address(#[from] AddressError),
}

/// Failure to hand out an IPv4 address to an interface.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("{0} is not a contiguous network mask")]
    InvalidMask(Ipv4Addr),

    #[error("interface {interface} already has address {address}")]
    AlreadyAssigned { interface: InterfaceId, address: Ipv4Addr },

    #[error("no free host address left in {network}/{mask}")]
    PoolExhausted { network: Ipv4Addr, mask: Ipv4Addr },

    #[error("unknown interface {0}")]
    UnknownInterface(InterfaceId),
}
