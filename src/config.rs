//! Scenario configuration: loading, presets and validation.
//!
//! A scenario is described by strongly typed structs deserialized from TOML.
//! Two presets reproduce the reference scenarios: a two-station ad hoc echo
//! link and an access point receiving a constant-rate UDP stream.

use rand::Rng;
use rand_distr::{Distribution, Exp, Uniform};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::ConfigError;
use crate::simulation::geometry::Vector3;
use crate::simulation::propagation::PropagationModel;
use crate::simulation::time::SimDuration;
use crate::simulation::types::Role;

/// Bytes added by UDP (8) and IPv4 (20) headers.
pub const UDP_IP_OVERHEAD_BYTES: u32 = 28;
/// Bytes added by the 802.11 MAC header, LLC/SNAP and FCS.
pub const MAC_OVERHEAD_BYTES: u32 = 36;
/// On-air size of a probe request.
pub const PROBE_REQUEST_BYTES: u32 = 40;
/// On-air size of an association response.
pub const ASSOCIATION_RESPONSE_BYTES: u32 = 36;
const RTS_BYTES: u32 = 20;
const CTS_BYTES: u32 = 14;
/// Upper bound for every time parameter, in seconds. Keeps any event time
/// (now plus a delay) well inside `u64` nanoseconds.
pub const MAX_TIME_S: f64 = 1.0e9;

fn default_true() -> bool {
    true
}

fn default_stop_time() -> f64 {
    30.0
}

fn default_topology_bound() -> usize {
    18
}

/// Physical layer settings shared by all interfaces.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PhyConfig {
    pub tx_power_dbm: f64,
    /// Frames received below this power are dropped.
    pub rx_sensitivity_dbm: f64,
    pub tx_gain_db: f64,
    pub rx_gain_db: f64,
    /// Data rate used to compute frame airtime.
    pub data_rate_mbps: f64,
    /// PLCP preamble and header duration prepended to every frame.
    pub preamble_us: f64,
    /// Short interframe space, used for RTS/CTS exchange overhead.
    pub sifs_us: f64,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 16.0,
            rx_sensitivity_dbm: -80.0,
            tx_gain_db: 0.0,
            rx_gain_db: 0.0,
            data_rate_mbps: 6.0,
            preamble_us: 20.0,
            sifs_us: 16.0,
        }
    }
}

impl PhyConfig {
    /// Time a frame of `size_bytes` occupies the medium.
    pub fn airtime(&self, size_bytes: u32) -> SimDuration {
        let payload_us = size_bytes as f64 * 8.0 / self.data_rate_mbps;
        SimDuration::from_micros_f64(self.preamble_us + payload_us)
    }

    /// Extra deferral for an RTS/CTS handshake before a long frame.
    pub fn rts_cts_overhead(&self) -> SimDuration {
        self.airtime(RTS_BYTES) + self.airtime(CTS_BYTES) + SimDuration::from_micros_f64(2.0 * self.sifs_us)
    }
}

/// Whether stations associate with an access point or talk directly.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// Independent BSS: no access point, stations are associated from the start.
    AdHoc,
    /// Stations probe and associate with an access point.
    Infrastructure,
}

/// Channel access policy applied before every transmission.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentionPolicy {
    /// Transmit as soon as the local transmitter is idle.
    None,
    /// Constant deferral before every frame.
    Fixed { deferral_us: f64 },
    /// Carrier sense with random backoff: wait for an idle medium, then
    /// DIFS plus a uniform number of slots in `0..=cw_min`.
    Csma { difs_us: f64, slot_us: f64, cw_min: u32 },
}

impl Default for ContentionPolicy {
    fn default() -> Self {
        ContentionPolicy::None
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MacConfig {
    pub association: AssociationMode,
    /// Access points refuse stations beyond this count.
    pub max_associated_stations: usize,
    /// Data frames larger than this (bytes on air) are fragmented.
    pub fragmentation_threshold: u32,
    /// Data frames larger than this are preceded by RTS/CTS.
    pub rts_cts_threshold: u32,
    /// Transmit queue depth per interface; overflow drops frames.
    pub queue_capacity: usize,
    /// How long a probing station waits for an association response.
    pub probe_timeout_ms: u64,
    pub contention: ContentionPolicy,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            association: AssociationMode::AdHoc,
            max_associated_stations: 18,
            fragmentation_threshold: 2200,
            rts_cts_threshold: 2200,
            queue_capacity: 500,
            probe_timeout_ms: 100,
            contention: ContentionPolicy::None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AddressingConfig {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 1, 1, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }
    }
}

/// How station positions are chosen.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionAllocator {
    /// Explicit positions; reused cyclically when there are more stations.
    List { positions: Vec<Vector3> },
    /// Row-major grid `grid_width` columns wide.
    Grid {
        min_x: f64,
        min_y: f64,
        delta_x: f64,
        delta_y: f64,
        grid_width: usize,
        #[serde(default)]
        z: f64,
    },
}

impl PositionAllocator {
    pub fn position(&self, index: usize) -> Vector3 {
        match self {
            PositionAllocator::List { positions } => positions[index % positions.len()],
            PositionAllocator::Grid {
                min_x,
                min_y,
                delta_x,
                delta_y,
                grid_width,
                z,
            } => {
                let column = (index % grid_width) as f64;
                let row = (index / grid_width) as f64;
                Vector3::new(min_x + column * delta_x, min_y + row * delta_y, *z)
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PositionAllocator::List { positions } if positions.is_empty() => {
                Err(ConfigError::InvalidParameter("station position list is empty".to_string()))
            }
            PositionAllocator::Grid { grid_width: 0, .. } => Err(ConfigError::InvalidParameter("grid width must be positive".to_string())),
            _ => Ok(()),
        }
    }
}

/// Random variable for on/off period lengths, in seconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeDistribution {
    Constant { seconds: f64 },
    Exponential { mean_s: f64 },
    Uniform { min_s: f64, max_s: f64 },
}

impl TimeDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimDuration {
        let seconds = match self {
            TimeDistribution::Constant { seconds } => *seconds,
            TimeDistribution::Exponential { mean_s } => match Exp::new(1.0 / mean_s) {
                Ok(exp) => exp.sample(rng),
                Err(_) => *mean_s,
            },
            TimeDistribution::Uniform { min_s, max_s } => {
                if max_s > min_s {
                    Uniform::new(*min_s, *max_s).sample(rng)
                } else {
                    *min_s
                }
            }
        };
        SimDuration::from_secs_f64(seconds.clamp(0.0, MAX_TIME_S))
    }

    /// Mean period length in seconds.
    pub fn mean(&self) -> f64 {
        match self {
            TimeDistribution::Constant { seconds } => *seconds,
            TimeDistribution::Exponential { mean_s } => *mean_s,
            TimeDistribution::Uniform { min_s, max_s } => (min_s + max_s) / 2.0,
        }
    }

    fn validate(&self, what: &str) -> Result<(), ConfigError> {
        let in_range = |s: f64| (0.0..=MAX_TIME_S).contains(&s);
        let ok = match self {
            TimeDistribution::Constant { seconds } => in_range(*seconds),
            TimeDistribution::Exponential { mean_s } => *mean_s > 0.0 && in_range(*mean_s),
            TimeDistribution::Uniform { min_s, max_s } => in_range(*min_s) && in_range(*max_s) && max_s >= min_s,
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidParameter(format!("invalid {what} distribution {self:?}")))
        }
    }
}

/// Reference to a node taking part in a traffic flow. Without an index the
/// last node of that role is used.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub role: Role,
    #[serde(default)]
    pub index: Option<usize>,
}

impl Endpoint {
    pub const fn station(index: usize) -> Self {
        Self {
            role: Role::Station,
            index: Some(index),
        }
    }

    pub const fn last_station() -> Self {
        Self {
            role: Role::Station,
            index: None,
        }
    }

    pub const fn access_point(index: usize) -> Self {
        Self {
            role: Role::AccessPoint,
            index: Some(index),
        }
    }

    /// Resolve to an index among the `available` nodes of this role.
    pub fn resolve(&self, available: usize) -> Result<usize, ConfigError> {
        let index = self.index.unwrap_or(available.saturating_sub(1));
        if index < available {
            Ok(index)
        } else {
            Err(ConfigError::UnknownEndpoint {
                role: self.role,
                index,
                available,
            })
        }
    }
}

fn default_echo_port() -> u16 {
    9
}

fn default_echo_timeout() -> f64 {
    2.0
}

/// UDP echo client/server pair.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EchoTrafficConfig {
    pub client: Endpoint,
    pub server: Endpoint,
    #[serde(default = "default_echo_port")]
    pub port: u16,
    pub max_packets: u32,
    pub interval_s: f64,
    pub packet_size: u32,
    pub client_start_s: f64,
    pub client_stop_s: f64,
    pub server_start_s: f64,
    pub server_stop_s: f64,
    /// A request without reply after this long counts as lost.
    #[serde(default = "default_echo_timeout")]
    pub timeout_s: f64,
}

/// Constant-rate on/off UDP source with a packet sink at the destination.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OnOffTrafficConfig {
    pub source: Endpoint,
    pub sink: Endpoint,
    pub port: u16,
    pub data_rate_mbps: f64,
    pub packet_size: u32,
    pub on_time: TimeDistribution,
    pub off_time: TimeDistribution,
    pub start_s: f64,
    #[serde(default)]
    pub stop_s: Option<f64>,
    /// Stop sending after this many payload bytes.
    #[serde(default)]
    pub max_bytes: Option<u64>,
    #[serde(default = "default_true")]
    pub install_sink: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrafficConfig {
    Echo(EchoTrafficConfig),
    OnOff(OnOffTrafficConfig),
}

/// Complete description of one simulation run.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default = "default_stop_time")]
    pub stop_time_s: f64,
    #[serde(default)]
    pub seed: u64,
    /// Upper bound on the number of stations the layout can hold.
    #[serde(default = "default_topology_bound")]
    pub topology_bound: usize,
    pub station_count: usize,
    /// Log application events at info level instead of debug.
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default)]
    pub propagation: PropagationModel,
    #[serde(default)]
    pub phy: PhyConfig,
    #[serde(default)]
    pub mac: MacConfig,
    #[serde(default)]
    pub addressing: AddressingConfig,
    #[serde(default)]
    pub access_points: Vec<Vector3>,
    pub station_positions: PositionAllocator,
    #[serde(default)]
    pub traffic: Vec<TrafficConfig>,
}

impl ScenarioConfig {
    /// Two ad hoc stations 251.1 m apart exchanging 15 UDP echo requests.
    pub fn echo_link() -> Self {
        Self {
            name: "echo-link".to_string(),
            stop_time_s: 30.0,
            seed: 1,
            topology_bound: default_topology_bound(),
            station_count: 2,
            verbose: true,
            propagation: PropagationModel::default(),
            phy: PhyConfig::default(),
            mac: MacConfig::default(),
            addressing: AddressingConfig::default(),
            access_points: Vec::new(),
            station_positions: PositionAllocator::List {
                positions: vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(251.1, 0.0, 1.0)],
            },
            traffic: vec![TrafficConfig::Echo(EchoTrafficConfig {
                client: Endpoint::station(0),
                server: Endpoint::last_station(),
                port: 9,
                max_packets: 15,
                interval_s: 1.0,
                packet_size: 1000,
                client_start_s: 2.0,
                client_stop_s: 20.0,
                server_start_s: 1.0,
                server_stop_s: 30.0,
                timeout_s: default_echo_timeout(),
            })],
        }
    }

    /// One access point between two stations 251.1 m away on each side;
    /// station 0 streams 20 Mb/s of UDP to the access point over a 1 Mb/s
    /// DSSS link.
    pub fn ap_throughput() -> Self {
        Self {
            name: "ap-throughput".to_string(),
            stop_time_s: 100.0,
            seed: 1,
            topology_bound: default_topology_bound(),
            station_count: 2,
            verbose: true,
            propagation: PropagationModel::default(),
            phy: PhyConfig {
                data_rate_mbps: 1.0,
                preamble_us: 192.0,
                sifs_us: 10.0,
                ..PhyConfig::default()
            },
            mac: MacConfig {
                association: AssociationMode::Infrastructure,
                contention: ContentionPolicy::Csma {
                    difs_us: 50.0,
                    slot_us: 20.0,
                    cw_min: 31,
                },
                ..MacConfig::default()
            },
            addressing: AddressingConfig::default(),
            access_points: vec![Vector3::new(251.1, 0.0, 1.0)],
            station_positions: PositionAllocator::List {
                positions: vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(502.2, 0.0, 1.0)],
            },
            traffic: vec![TrafficConfig::OnOff(OnOffTrafficConfig {
                source: Endpoint::station(0),
                sink: Endpoint::access_point(0),
                port: 1000,
                data_rate_mbps: 20.0,
                packet_size: 1000,
                on_time: TimeDistribution::Constant { seconds: 5000.0 },
                off_time: TimeDistribution::Constant { seconds: 0.0 },
                start_s: 1.0,
                stop_s: None,
                max_bytes: None,
                install_sink: true,
            })],
        }
    }

    /// Load a scenario from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject configurations that cannot be simulated.
    ///
    /// Checks, in order:
    /// - station count against the topology bound
    /// - timing, propagation, PHY and MAC parameters
    /// - that access points match the association mode
    /// - that the address pool can hold every interface
    /// - that every traffic endpoint exists and traffic parameters are sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.station_count > self.topology_bound {
            return Err(ConfigError::TooManyStations {
                requested: self.station_count,
                bound: self.topology_bound,
            });
        }
        if self.station_count == 0 {
            return Err(ConfigError::InvalidParameter("scenario needs at least one station".to_string()));
        }
        if !(self.stop_time_s > 0.0) {
            return Err(ConfigError::InvalidParameter(format!("stop time {} must be positive", self.stop_time_s)));
        }
        check_seconds("stop time", self.stop_time_s)?;

        self.propagation.validate().map_err(ConfigError::InvalidParameter)?;
        self.station_positions.validate()?;

        if !(self.phy.data_rate_mbps > 0.0) {
            return Err(ConfigError::InvalidParameter("PHY data rate must be positive".to_string()));
        }
        check_seconds("PHY preamble", self.phy.preamble_us / 1e6)?;
        check_seconds("PHY SIFS", self.phy.sifs_us / 1e6)?;
        let longest_frame = self.mac.fragmentation_threshold.max(PROBE_REQUEST_BYTES) as f64;
        check_seconds("frame airtime", (self.phy.preamble_us + longest_frame * 8.0 / self.phy.data_rate_mbps) / 1e6)?;

        if self.mac.fragmentation_threshold == 0 {
            return Err(ConfigError::InvalidParameter("fragmentation threshold must be positive".to_string()));
        }
        if self.mac.queue_capacity == 0 {
            return Err(ConfigError::InvalidParameter("queue capacity must be positive".to_string()));
        }
        if self.mac.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidParameter("probe timeout must be positive".to_string()));
        }
        check_seconds("probe timeout", self.mac.probe_timeout_ms as f64 / 1e3)?;
        match &self.mac.contention {
            ContentionPolicy::None => {}
            ContentionPolicy::Fixed { deferral_us } => check_seconds("contention deferral", deferral_us / 1e6)?,
            ContentionPolicy::Csma { difs_us, slot_us, cw_min } => {
                check_seconds("CSMA DIFS", difs_us / 1e6)?;
                check_seconds("CSMA slot", slot_us / 1e6)?;
                check_seconds("CSMA backoff window", slot_us * *cw_min as f64 / 1e6)?;
            }
        }

        match self.mac.association {
            AssociationMode::AdHoc if !self.access_points.is_empty() => {
                return Err(ConfigError::InvalidParameter("access points are not allowed in ad hoc mode".to_string()));
            }
            AssociationMode::Infrastructure if self.access_points.is_empty() => {
                return Err(ConfigError::InvalidParameter("infrastructure mode needs at least one access point".to_string()));
            }
            _ => {}
        }

        let host_bits = (!u32::from(self.addressing.mask)).count_ones();
        let hosts = if host_bits >= 2 { (1u64 << host_bits) - 2 } else { 0 };
        let interfaces = (self.station_count + self.access_points.len()) as u64;
        if interfaces > hosts {
            return Err(ConfigError::InvalidParameter(format!(
                "{}/{} holds {} hosts but {} interfaces need addresses",
                self.addressing.network, self.addressing.mask, hosts, interfaces
            )));
        }

        for traffic in &self.traffic {
            match traffic {
                TrafficConfig::Echo(echo) => {
                    self.resolve_endpoint(&echo.client)?;
                    self.resolve_endpoint(&echo.server)?;
                    if echo.packet_size == 0 {
                        return Err(ConfigError::InvalidParameter("echo packet size must be positive".to_string()));
                    }
                    if echo.max_packets > 1 && !(echo.interval_s > 0.0) {
                        return Err(ConfigError::InvalidParameter("echo interval must be positive".to_string()));
                    }
                    check_seconds("echo interval", echo.interval_s.max(0.0))?;
                    if !(echo.timeout_s > 0.0) {
                        return Err(ConfigError::InvalidParameter("echo timeout must be positive".to_string()));
                    }
                    check_seconds("echo timeout", echo.timeout_s)?;
                    check_window("echo client", echo.client_start_s, Some(echo.client_stop_s))?;
                    check_window("echo server", echo.server_start_s, Some(echo.server_stop_s))?;
                }
                TrafficConfig::OnOff(on_off) => {
                    self.resolve_endpoint(&on_off.source)?;
                    self.resolve_endpoint(&on_off.sink)?;
                    if !(on_off.data_rate_mbps > 0.0) || on_off.packet_size == 0 {
                        return Err(ConfigError::InvalidParameter("on/off data rate and packet size must be positive".to_string()));
                    }
                    check_seconds("on/off packet interval", on_off.packet_size as f64 * 8.0 / (on_off.data_rate_mbps * 1e6))?;
                    on_off.on_time.validate("on time")?;
                    on_off.off_time.validate("off time")?;
                    if on_off.on_time.mean() <= 0.0 {
                        return Err(ConfigError::InvalidParameter("on time must have a positive mean".to_string()));
                    }
                    check_window("on/off source", on_off.start_s, on_off.stop_s)?;
                }
            }
        }
        Ok(())
    }

    /// Index of the endpoint among the nodes of its role.
    pub fn resolve_endpoint(&self, endpoint: &Endpoint) -> Result<usize, ConfigError> {
        let available = match endpoint.role {
            Role::Station => self.station_count,
            Role::AccessPoint => self.access_points.len(),
        };
        endpoint.resolve(available)
    }
}

/// Reject negative, non-finite and out-of-range time values (seconds).
fn check_seconds(what: &str, seconds: f64) -> Result<(), ConfigError> {
    if (0.0..=MAX_TIME_S).contains(&seconds) {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter(format!("{what} of {seconds}s is outside 0..={MAX_TIME_S}s")))
    }
}

fn check_window(what: &str, start: f64, stop: Option<f64>) -> Result<(), ConfigError> {
    check_seconds(&format!("{what} start time"), start)?;
    if let Some(stop) = stop {
        check_seconds(&format!("{what} stop time"), stop)?;
        if stop < start {
            return Err(ConfigError::InvalidParameter(format!("{what} stops ({stop}) before it starts ({start})")));
        }
    }
    Ok(())
}
