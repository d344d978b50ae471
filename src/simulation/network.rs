//! Simulation driver: builds a scenario and runs its event loop.
//!
//! `Network` holds everything the MAC and applications act on (registry,
//! channels, flow statistics, random source, capture taps). `Simulator` adds
//! the scheduler and the installed applications, builds all of it from a
//! validated `ScenarioConfig` and dispatches events until the stop event.
//!
//! Build order is fixed so runs are reproducible for a given seed:
//! 1) validate the configuration; nothing is created on error
//! 2) access points, then stations, each on a new node
//! 3) addresses, access points first
//! 4) association start, applications, and the terminal stop event

use log::{Level, debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::application::{Application, ApplicationKind, EPHEMERAL_PORT_BASE, EchoClient, EchoServer, OnOffSource, PacketSink};
use super::capture::{CaptureEvent, FrameTap};
use super::channel::{Channel, ChannelStats};
use super::flow_monitor::{FlowKey, FlowMonitor, FlowStats};
use super::geometry::{Vector3, distance};
use super::mac::{self, MacCounters, MacState, StationState};
use super::propagation::PropagationModel;
use super::registry::Registry;
use super::scheduler::Scheduler;
use super::time::{SimDuration, SimTime};
use super::types::{ApplicationId, ChannelId, InterfaceId, NodeId, Packet, PacketKind, Role, SimEvent};
use crate::config::{AssociationMode, Endpoint, MacConfig, PhyConfig, ScenarioConfig, TrafficConfig};
use crate::error::{AddressError, ConfigError};

/// UDP datagram handed down by an application.
#[derive(Debug, Clone, Copy)]
pub struct Datagram {
    pub kind: PacketKind,
    pub source_port: u16,
    pub destination: SocketAddrV4,
    pub sequence: u32,
    pub payload_bytes: u32,
}

/// Path characteristics between two interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkBudget {
    pub distance_m: f64,
    pub rx_power_dbm: f64,
    pub delay: SimDuration,
}

pub struct Network {
    pub(crate) registry: Registry,
    pub(crate) channels: Vec<Channel>,
    pub(crate) mac_config: MacConfig,
    pub(crate) flows: FlowMonitor,
    pub(crate) rng: StdRng,
    taps: Vec<Box<dyn FrameTap>>,
    next_packet_uid: u64,
    verbose: bool,
}

impl Network {
    /// Empty network with a single channel using `propagation`.
    pub fn new(propagation: PropagationModel, mac_config: MacConfig, seed: u64, verbose: bool) -> Self {
        Self {
            registry: Registry::new(),
            channels: vec![Channel::new(ChannelId(0), propagation)],
            mac_config,
            flows: FlowMonitor::new(),
            rng: StdRng::seed_from_u64(seed),
            taps: Vec::new(),
            next_packet_uid: 0,
            verbose,
        }
    }

    /// Create a node at `position` with one interface attached to the channel.
    pub fn add_interface(&mut self, position: Vector3, role: Role, phy: PhyConfig) -> InterfaceId {
        let channel = ChannelId(0);
        let node = self.registry.create_node(position);
        let interface = self.registry.install_interface(node, channel, role, phy);
        self.channels[channel.index()].attach(interface);
        interface
    }

    /// Give `interface` the lowest host address of `network`/`mask` not yet
    /// used on its channel.
    pub fn assign_address(&mut self, interface: InterfaceId, network: Ipv4Addr, mask: Ipv4Addr) -> Result<Ipv4Addr, AddressError> {
        let mask_bits = u32::from(mask);
        if mask_bits.leading_ones() + mask_bits.trailing_zeros() != 32 {
            return Err(AddressError::InvalidMask(mask));
        }
        if !self.registry.contains_interface(interface) {
            return Err(AddressError::UnknownInterface(interface));
        }
        let iface = self.registry.interface(interface);
        if let Some(address) = iface.address {
            return Err(AddressError::AlreadyAssigned { interface, address });
        }

        let channel = iface.channel;
        let used: HashSet<u32> = self
            .registry
            .interfaces()
            .filter(|i| i.channel == channel)
            .filter_map(|i| i.address)
            .map(u32::from)
            .collect();
        let base = u32::from(network) & mask_bits;
        let broadcast = base | !mask_bits;
        let address = (base.saturating_add(1)..broadcast)
            .find(|candidate| !used.contains(candidate))
            .map(Ipv4Addr::from)
            .ok_or(AddressError::PoolExhausted { network, mask })?;

        self.registry.interface_mut(interface).address = Some(address);
        debug!("{interface} assigned {address}");
        Ok(address)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn add_tap(&mut self, tap: Box<dyn FrameTap>) {
        self.taps.push(tap);
    }

    pub fn link_budget(&self, a: InterfaceId, b: InterfaceId) -> LinkBudget {
        let sender = self.registry.interface(a);
        let receiver = self.registry.interface(b);
        let (pa, pb) = (self.registry.position_of(a), self.registry.position_of(b));
        let model = self.channel(sender.channel).model();
        LinkBudget {
            distance_m: distance(&pa, &pb),
            rx_power_dbm: model.received_power(sender.phy.tx_power_dbm + sender.phy.tx_gain_db, &pa, &pb) + receiver.phy.rx_gain_db,
            delay: model.delay(&pa, &pb),
        }
    }

    pub(crate) fn capture(&mut self, event: &CaptureEvent<'_>) {
        for tap in &mut self.taps {
            tap.on_frame(event);
        }
    }

    /// Level for application event lines.
    pub(crate) fn app_log_level(&self) -> Level {
        if self.verbose { Level::Info } else { Level::Debug }
    }

    fn flow_key(&self, from: InterfaceId, destination: Ipv4Addr) -> Option<FlowKey> {
        let channel = self.registry.interface(from).channel;
        self.registry
            .interface_by_address(channel, destination)
            .map(|destination| FlowKey { source: from, destination })
    }

    /// Wrap `datagram` into a packet and hand it to the MAC of `from`.
    /// Returns `None` when it cannot be addressed; a packet dropped by a full
    /// queue is still returned and counted as sent.
    pub(crate) fn send_udp(&mut self, scheduler: &mut Scheduler<SimEvent>, from: InterfaceId, datagram: Datagram) -> Option<Packet> {
        let now = scheduler.now();
        let Some(source_address) = self.registry.interface(from).address else {
            warn!("{now} {from} has no address, datagram dropped");
            return None;
        };
        let Some(key) = self.flow_key(from, *datagram.destination.ip()) else {
            debug!("{now} {from}: no interface holds {}, datagram dropped", datagram.destination.ip());
            return None;
        };

        let packet = Packet {
            uid: self.next_packet_uid,
            kind: datagram.kind,
            source_address,
            source_port: datagram.source_port,
            destination_address: *datagram.destination.ip(),
            destination_port: datagram.destination.port(),
            sequence: datagram.sequence,
            payload_bytes: datagram.payload_bytes,
            sent_at: now,
        };
        self.next_packet_uid += 1;
        self.flows.record_tx(key, datagram.payload_bytes, now);
        mac::send_packet(self, scheduler, from, key.destination, packet.clone());
        Some(packet)
    }

    pub(crate) fn record_lost(&mut self, from: InterfaceId, remote: SocketAddrV4) {
        if let Some(key) = self.flow_key(from, *remote.ip()) {
            self.flows.record_lost(key);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    pub interface: InterfaceId,
    pub node: NodeId,
    pub role: Role,
    pub address: Option<Ipv4Addr>,
    pub association: String,
    pub counters: MacCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct EchoSummary {
    pub application: ApplicationId,
    pub sent: u32,
    pub replies: usize,
    pub lost: u32,
    pub mean_rtt_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkSummary {
    pub application: ApplicationId,
    pub packets: u64,
    pub bytes: u64,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub scenario: String,
    pub end_time_s: f64,
    pub events_processed: u64,
    pub channel: ChannelStats,
    pub interfaces: Vec<InterfaceSummary>,
    pub echo: Vec<EchoSummary>,
    pub sinks: Vec<SinkSummary>,
    pub flows: Vec<FlowStats>,
}

pub struct Simulator {
    name: String,
    scheduler: Scheduler<SimEvent>,
    network: Network,
    applications: Vec<Application>,
    access_points: Vec<InterfaceId>,
    stations: Vec<InterfaceId>,
    stop_time: SimTime,
    finished: bool,
}

impl Simulator {
    /// Validate `config` and build the scenario, ready to run.
    pub fn build(config: &ScenarioConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut network = Network::new(config.propagation.clone(), config.mac.clone(), config.seed, config.verbose);
        let access_points: Vec<InterfaceId> = config
            .access_points
            .iter()
            .map(|position| network.add_interface(*position, Role::AccessPoint, config.phy.clone()))
            .collect();
        let stations: Vec<InterfaceId> = (0..config.station_count)
            .map(|i| network.add_interface(config.station_positions.position(i), Role::Station, config.phy.clone()))
            .collect();
        for &interface in access_points.iter().chain(&stations) {
            network.assign_address(interface, config.addressing.network, config.addressing.mask)?;
        }

        let mut simulator = Self {
            name: config.name.clone(),
            scheduler: Scheduler::new(),
            network,
            applications: Vec::new(),
            access_points,
            stations,
            stop_time: SimTime::from_secs_f64(config.stop_time_s),
            finished: false,
        };

        match config.mac.association {
            AssociationMode::AdHoc => {
                for &station in &simulator.stations {
                    simulator.network.registry.interface_mut(station).mac.join_ad_hoc();
                }
            }
            AssociationMode::Infrastructure => {
                for &station in &simulator.stations {
                    simulator.scheduler.schedule_at(SimTime::ZERO, SimEvent::StartProbing { interface: station });
                }
            }
        }
        for traffic in &config.traffic {
            simulator.install_traffic(config, traffic)?;
        }
        simulator.scheduler.schedule_at(simulator.stop_time, SimEvent::Stop);

        info!(
            "Scenario '{}': {} access point(s), {} station(s), {} application(s), stop at {}",
            simulator.name,
            simulator.access_points.len(),
            simulator.stations.len(),
            simulator.applications.len(),
            simulator.stop_time
        );
        Ok(simulator)
    }

    fn endpoint_interface(&self, config: &ScenarioConfig, endpoint: &Endpoint) -> Result<InterfaceId, ConfigError> {
        let index = config.resolve_endpoint(endpoint)?;
        Ok(match endpoint.role {
            Role::Station => self.stations[index],
            Role::AccessPoint => self.access_points[index],
        })
    }

    fn address_of(&self, interface: InterfaceId) -> Result<Ipv4Addr, ConfigError> {
        self.network
            .registry
            .interface(interface)
            .address
            .ok_or_else(|| ConfigError::InvalidParameter(format!("{interface} has no address")))
    }

    fn next_ephemeral_port(&self) -> u16 {
        EPHEMERAL_PORT_BASE.wrapping_add(self.applications.len() as u16)
    }

    fn install_application(&mut self, interface: InterfaceId, start: SimTime, stop: Option<SimTime>, kind: ApplicationKind) -> ApplicationId {
        let id = ApplicationId(self.applications.len() as u32);
        self.scheduler.schedule_at(start, SimEvent::ApplicationStart { application: id });
        if let Some(stop) = stop {
            self.scheduler.schedule_at(stop, SimEvent::ApplicationStop { application: id });
        }
        self.applications.push(Application::new(id, interface, start, stop, kind));
        id
    }

    fn install_traffic(&mut self, config: &ScenarioConfig, traffic: &TrafficConfig) -> Result<(), ConfigError> {
        match traffic {
            TrafficConfig::Echo(echo) => {
                let server = self.endpoint_interface(config, &echo.server)?;
                let client = self.endpoint_interface(config, &echo.client)?;
                let remote = SocketAddrV4::new(self.address_of(server)?, echo.port);
                self.install_application(
                    server,
                    SimTime::from_secs_f64(echo.server_start_s),
                    Some(SimTime::from_secs_f64(echo.server_stop_s)),
                    ApplicationKind::EchoServer(EchoServer::new(echo.port)),
                );
                let echo_client = EchoClient::new(
                    remote,
                    self.next_ephemeral_port(),
                    echo.max_packets,
                    SimDuration::from_secs_f64(echo.interval_s.max(0.0)),
                    echo.packet_size,
                    SimDuration::from_secs_f64(echo.timeout_s),
                );
                self.install_application(
                    client,
                    SimTime::from_secs_f64(echo.client_start_s),
                    Some(SimTime::from_secs_f64(echo.client_stop_s)),
                    ApplicationKind::EchoClient(echo_client),
                );
            }
            TrafficConfig::OnOff(on_off) => {
                let sink = self.endpoint_interface(config, &on_off.sink)?;
                let source = self.endpoint_interface(config, &on_off.source)?;
                let remote = SocketAddrV4::new(self.address_of(sink)?, on_off.port);
                if on_off.install_sink {
                    self.install_application(sink, SimTime::ZERO, None, ApplicationKind::PacketSink(PacketSink::new(on_off.port)));
                }
                let generator = OnOffSource::new(
                    remote,
                    self.next_ephemeral_port(),
                    on_off.data_rate_mbps * 1e6,
                    on_off.packet_size,
                    on_off.on_time.clone(),
                    on_off.off_time.clone(),
                    on_off.max_bytes,
                );
                self.install_application(
                    source,
                    SimTime::from_secs_f64(on_off.start_s),
                    on_off.stop_s.map(SimTime::from_secs_f64),
                    ApplicationKind::OnOff(generator),
                );
            }
        }
        Ok(())
    }

    pub fn assign_address(&mut self, interface: InterfaceId, network: Ipv4Addr, mask: Ipv4Addr) -> Result<Ipv4Addr, AddressError> {
        self.network.assign_address(interface, network, mask)
    }

    pub fn add_tap(&mut self, tap: Box<dyn FrameTap>) {
        self.network.add_tap(tap);
    }

    pub fn link_budget(&self, a: InterfaceId, b: InterfaceId) -> LinkBudget {
        self.network.link_budget(a, b)
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn stations(&self) -> &[InterfaceId] {
        &self.stations
    }

    pub fn access_points(&self) -> &[InterfaceId] {
        &self.access_points
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// Run until the stop event, then shut the scheduler down. Calling it
    /// again only rebuilds the summary.
    pub fn run(&mut self) -> SimulationSummary {
        if !self.finished {
            let Self {
                scheduler,
                network,
                applications,
                stop_time,
                ..
            } = self;
            scheduler.run(Some(*stop_time), |scheduler, _, event| dispatch(network, applications, scheduler, event));
            info!(
                "Simulation '{}' finished at {} after {} events",
                self.name,
                self.scheduler.now(),
                self.scheduler.events_processed()
            );
            self.scheduler.shutdown();
            self.finished = true;
        }
        self.summary()
    }

    /// Per-flow statistics at the current simulated time.
    pub fn flow_snapshot(&self) -> Vec<FlowStats> {
        let registry = &self.network.registry;
        self.network
            .flows
            .iter()
            .enumerate()
            .map(|(i, (key, record))| {
                let addresses = (registry.interface(key.source).address, registry.interface(key.destination).address);
                FlowStats::from_record(i as u32 + 1, key, record, addresses, self.scheduler.now())
            })
            .collect()
    }

    pub fn summary(&self) -> SimulationSummary {
        let interfaces = self
            .network
            .registry
            .interfaces()
            .map(|iface| InterfaceSummary {
                interface: iface.id,
                node: iface.node,
                role: iface.role,
                address: iface.address,
                association: describe_association(iface.mac.state()),
                counters: iface.mac.counters(),
            })
            .collect();

        let mut echo = Vec::new();
        let mut sinks = Vec::new();
        for app in &self.applications {
            match &app.kind {
                ApplicationKind::EchoClient(client) => {
                    let rtts = client.round_trips();
                    let mean_rtt_s = if rtts.is_empty() {
                        None
                    } else {
                        Some(rtts.iter().map(|d| d.as_secs_f64()).sum::<f64>() / rtts.len() as f64)
                    };
                    echo.push(EchoSummary {
                        application: app.id,
                        sent: client.sent(),
                        replies: client.replies(),
                        lost: client.lost(),
                        mean_rtt_s,
                    });
                }
                ApplicationKind::PacketSink(sink) => sinks.push(SinkSummary {
                    application: app.id,
                    packets: sink.packets,
                    bytes: sink.bytes,
                }),
                ApplicationKind::EchoServer(_) | ApplicationKind::OnOff(_) => {}
            }
        }

        SimulationSummary {
            scenario: self.name.clone(),
            end_time_s: self.scheduler.now().as_secs_f64(),
            events_processed: self.scheduler.events_processed(),
            channel: self.network.channels[0].stats(),
            interfaces,
            echo,
            sinks,
            flows: self.flow_snapshot(),
        }
    }
}

fn describe_association(state: &MacState) -> String {
    match state {
        MacState::AccessPoint { associated } => format!("access point, {} associated", associated.len()),
        MacState::Station(StationState::Unassociated) => "unassociated".to_string(),
        MacState::Station(StationState::Probing) => "probing".to_string(),
        MacState::Station(StationState::Associated { access_point: Some(ap) }) => format!("associated with {ap}"),
        MacState::Station(StationState::Associated { access_point: None }) => "ad hoc".to_string(),
    }
}

fn dispatch(network: &mut Network, applications: &mut [Application], scheduler: &mut Scheduler<SimEvent>, event: SimEvent) {
    match event {
        SimEvent::StartProbing { interface } => mac::start_probing(network, scheduler, interface),
        SimEvent::ProbeTimeout { interface } => mac::on_probe_timeout(network, scheduler, interface),
        SimEvent::MacTransmit { interface } => mac::on_transmit(network, scheduler, interface),
        SimEvent::Receive {
            interface,
            frame,
            rx_power_dbm,
        } => {
            if let Some(packet) = mac::on_receive(network, scheduler, interface, frame, rx_power_dbm) {
                deliver(network, applications, scheduler, interface, packet);
            }
        }
        SimEvent::ApplicationStart { application } => applications[application.index()].on_start(network, scheduler),
        SimEvent::ApplicationStop { application } => applications[application.index()].on_stop(scheduler),
        SimEvent::ApplicationSend { application } => applications[application.index()].on_send(network, scheduler),
        SimEvent::ApplicationToggle { application } => applications[application.index()].on_toggle(network, scheduler),
        SimEvent::EchoTimeout { application, sequence } => applications[application.index()].on_echo_timeout(network, scheduler, sequence),
        SimEvent::Stop => {
            debug!("{} stop event", scheduler.now());
            scheduler.halt();
        }
    }
}

/// Record the delivery and hand the packet to the application bound to its
/// destination port.
fn deliver(network: &mut Network, applications: &mut [Application], scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId, packet: Packet) {
    let now = scheduler.now();
    let channel = network.registry.interface(interface).channel;
    if let Some(source) = network.registry.interface_by_address(channel, packet.source_address) {
        let key = FlowKey {
            source,
            destination: interface,
        };
        network.flows.record_rx(key, packet.payload_bytes, now - packet.sent_at, now);
    }

    match applications
        .iter_mut()
        .find(|app| app.interface == interface && app.local_port() == packet.destination_port)
    {
        Some(app) => app.on_packet(network, scheduler, &packet),
        None => debug!("{now} {interface}: nothing listening on port {}, packet dropped", packet.destination_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_of(simulator: &Simulator) -> &EchoClient {
        simulator
            .applications()
            .iter()
            .find_map(|app| match &app.kind {
                ApplicationKind::EchoClient(client) => Some(client),
                _ => None,
            })
            .expect("echo client installed")
    }

    #[test]
    fn echo_link_completes_all_pairs_with_round_trip_propagation_delay() {
        let mut simulator = Simulator::build(&ScenarioConfig::echo_link()).unwrap();
        let (a, b) = (simulator.stations()[0], simulator.stations()[1]);
        let budget = simulator.link_budget(a, b);
        assert!((budget.distance_m - 251.1).abs() < 1e-9);
        assert!(budget.rx_power_dbm >= -80.0);

        let summary = simulator.run();
        let client = client_of(&simulator);
        assert_eq!(client.sent(), 15);
        assert_eq!(client.replies(), 15);
        assert_eq!(client.lost(), 0);
        for rtt in client.round_trips() {
            assert_eq!(*rtt, budget.delay + budget.delay);
        }

        assert_eq!(summary.flows.len(), 2);
        for flow in &summary.flows {
            assert_eq!(flow.tx_packets, 15);
            assert_eq!(flow.rx_packets, 15);
            assert_eq!(flow.rx_bytes, 15_000);
        }
        assert_eq!(simulator.now(), SimTime::from_secs_f64(30.0));
    }

    #[test]
    fn station_count_above_bound_is_rejected() {
        let config = ScenarioConfig {
            station_count: 19,
            ..ScenarioConfig::echo_link()
        };
        match Simulator::build(&config) {
            Err(ConfigError::TooManyStations { requested, bound }) => {
                assert_eq!((requested, bound), (19, 18));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("19 stations accepted"),
        }

        let config = ScenarioConfig {
            station_count: 18,
            ..ScenarioConfig::echo_link()
        };
        assert!(Simulator::build(&config).is_ok());
    }

    #[test]
    fn oversized_echo_timeout_is_rejected_at_build() {
        let mut config = ScenarioConfig::echo_link();
        if let TrafficConfig::Echo(echo) = &mut config.traffic[0] {
            echo.timeout_s = 1e11;
        }
        assert!(matches!(Simulator::build(&config), Err(ConfigError::InvalidParameter(_))));
    }

    #[test]
    fn stations_associate_and_stream_reaches_access_point() {
        let config = ScenarioConfig {
            stop_time_s: 3.0,
            verbose: false,
            ..ScenarioConfig::ap_throughput()
        };
        let mut simulator = Simulator::build(&config).unwrap();
        let summary = simulator.run();

        let ap = simulator.access_points()[0];
        for &station in simulator.stations() {
            assert_eq!(
                simulator.network().registry().interface(station).mac.station_state(),
                Some(StationState::Associated { access_point: Some(ap) })
            );
        }
        assert_eq!(simulator.network().registry().interface(ap).mac.associated_stations(), 2);

        assert_eq!(summary.sinks.len(), 1);
        assert!(summary.sinks[0].packets > 0);
        let flow = &summary.flows[0];
        assert!(flow.rx_packets < flow.tx_packets);
        // Offered 20 Mb/s over a 1 Mb/s link.
        assert!(flow.tx_offered_mbps > 15.0);
        assert!(flow.throughput_mbps > 0.5 && flow.throughput_mbps < 1.0);
    }

    #[test]
    fn addresses_are_sequential_unique_and_assigned_once() {
        let mut network = Network::new(PropagationModel::default(), MacConfig::default(), 0, false);
        let ifaces: Vec<_> = (0..3)
            .map(|i| network.add_interface(Vector3::new(i as f64, 0.0, 1.0), Role::Station, PhyConfig::default()))
            .collect();
        let base = Ipv4Addr::new(10, 1, 1, 0);
        let mask = Ipv4Addr::new(255, 255, 255, 252);

        assert_eq!(network.assign_address(ifaces[0], base, mask), Ok(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(network.assign_address(ifaces[1], base, mask), Ok(Ipv4Addr::new(10, 1, 1, 2)));
        assert_eq!(
            network.assign_address(ifaces[0], base, mask),
            Err(AddressError::AlreadyAssigned {
                interface: ifaces[0],
                address: Ipv4Addr::new(10, 1, 1, 1)
            })
        );
        assert_eq!(network.assign_address(ifaces[2], base, mask), Err(AddressError::PoolExhausted { network: base, mask }));
        assert_eq!(
            network.assign_address(ifaces[2], base, Ipv4Addr::new(255, 0, 255, 0)),
            Err(AddressError::InvalidMask(Ipv4Addr::new(255, 0, 255, 0)))
        );
        assert_eq!(
            network.assign_address(InterfaceId(7), base, mask),
            Err(AddressError::UnknownInterface(InterfaceId(7)))
        );
    }

    #[test]
    fn access_points_get_addresses_first() {
        let simulator = Simulator::build(&ScenarioConfig::ap_throughput()).unwrap();
        let registry = simulator.network().registry();
        assert_eq!(registry.interface(simulator.access_points()[0]).address, Some(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(registry.interface(simulator.stations()[0]).address, Some(Ipv4Addr::new(10, 1, 1, 2)));
        assert_eq!(registry.interface(simulator.stations()[1]).address, Some(Ipv4Addr::new(10, 1, 1, 3)));
    }

    #[test]
    fn second_run_returns_same_summary() {
        let mut simulator = Simulator::build(&ScenarioConfig::echo_link()).unwrap();
        let first = simulator.run();
        let second = simulator.run();
        assert_eq!(first.events_processed, second.events_processed);
        assert_eq!(first.end_time_s, 30.0);
    }

    struct CountingTap(std::rc::Rc<std::cell::Cell<usize>>);

    impl FrameTap for CountingTap {
        fn on_frame(&mut self, _: &CaptureEvent<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn taps_see_every_transmitted_and_received_frame() {
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut simulator = Simulator::build(&ScenarioConfig::echo_link()).unwrap();
        simulator.add_tap(Box::new(CountingTap(seen.clone())));
        simulator.run();
        // 15 requests and 15 replies, each sent once and received once.
        assert_eq!(seen.get(), 60);
    }
}
