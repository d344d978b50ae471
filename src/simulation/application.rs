//! UDP traffic generators and consumers installed on interfaces.
//!
//! Applications are driven entirely by simulator events: start/stop at their
//! configured times, their own send and toggle timers, and packets demuxed
//! to them by destination port.

use log::debug;
use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use super::network::{Datagram, Network};
use super::scheduler::{EventId, Scheduler};
use super::time::{SimDuration, SimTime};
use super::types::{ApplicationId, InterfaceId, Packet, PacketKind, SimEvent};
use crate::config::TimeDistribution;

/// First port handed out to client sockets.
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

pub struct EchoClient {
    pub remote: SocketAddrV4,
    pub local_port: u16,
    pub max_packets: u32,
    pub interval: SimDuration,
    pub packet_size: u32,
    pub timeout: SimDuration,
    sent: u32,
    next_send: Option<EventId>,
    // sequence -> (sent at, timeout event)
    outstanding: BTreeMap<u32, (SimTime, EventId)>,
    round_trips: Vec<SimDuration>,
    lost: u32,
}

impl EchoClient {
    pub fn new(remote: SocketAddrV4, local_port: u16, max_packets: u32, interval: SimDuration, packet_size: u32, timeout: SimDuration) -> Self {
        Self {
            remote,
            local_port,
            max_packets,
            interval,
            packet_size,
            timeout,
            sent: 0,
            next_send: None,
            outstanding: BTreeMap::new(),
            round_trips: Vec::new(),
            lost: 0,
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn replies(&self) -> usize {
        self.round_trips.len()
    }

    pub fn lost(&self) -> u32 {
        self.lost
    }

    /// Requests still waiting for a reply or a timeout.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn round_trips(&self) -> &[SimDuration] {
        &self.round_trips
    }
}

pub struct EchoServer {
    pub port: u16,
}

impl EchoServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Constant bit rate source alternating between on and off periods.
pub struct OnOffSource {
    pub remote: SocketAddrV4,
    pub local_port: u16,
    pub data_rate_bps: f64,
    pub packet_size: u32,
    pub on_time: TimeDistribution,
    pub off_time: TimeDistribution,
    pub max_bytes: Option<u64>,
    is_on: bool,
    packets_sent: u64,
    bytes_sent: u64,
    next_send: Option<EventId>,
    next_toggle: Option<EventId>,
}

impl OnOffSource {
    pub fn new(
        remote: SocketAddrV4,
        local_port: u16,
        data_rate_bps: f64,
        packet_size: u32,
        on_time: TimeDistribution,
        off_time: TimeDistribution,
        max_bytes: Option<u64>,
    ) -> Self {
        Self {
            remote,
            local_port,
            data_rate_bps,
            packet_size,
            on_time,
            off_time,
            max_bytes,
            is_on: false,
            packets_sent: 0,
            bytes_sent: 0,
            next_send: None,
            next_toggle: None,
        }
    }

    /// Time between packets while on.
    pub fn packet_interval(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.packet_size as f64 * 8.0 / self.data_rate_bps)
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    fn budget_exhausted(&self) -> bool {
        self.max_bytes.is_some_and(|max| self.bytes_sent >= max)
    }
}

#[derive(Default)]
pub struct PacketSink {
    pub port: u16,
    pub packets: u64,
    pub bytes: u64,
}

impl PacketSink {
    pub fn new(port: u16) -> Self {
        Self { port, ..Self::default() }
    }
}

pub enum ApplicationKind {
    EchoClient(EchoClient),
    EchoServer(EchoServer),
    OnOff(OnOffSource),
    PacketSink(PacketSink),
}

pub struct Application {
    pub id: ApplicationId,
    pub interface: InterfaceId,
    pub start: SimTime,
    pub stop: Option<SimTime>,
    active: bool,
    pub kind: ApplicationKind,
}

impl Application {
    pub fn new(id: ApplicationId, interface: InterfaceId, start: SimTime, stop: Option<SimTime>, kind: ApplicationKind) -> Self {
        Self {
            id,
            interface,
            start,
            stop,
            active: false,
            kind,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ApplicationKind::EchoClient(_) => "client",
            ApplicationKind::EchoServer(_) => "server",
            ApplicationKind::OnOff(_) => "onoff",
            ApplicationKind::PacketSink(_) => "sink",
        }
    }

    /// UDP port this application receives on.
    pub fn local_port(&self) -> u16 {
        match &self.kind {
            ApplicationKind::EchoClient(client) => client.local_port,
            ApplicationKind::EchoServer(server) => server.port,
            ApplicationKind::OnOff(source) => source.local_port,
            ApplicationKind::PacketSink(sink) => sink.port,
        }
    }

    pub fn on_start(&mut self, net: &mut Network, scheduler: &mut Scheduler<SimEvent>) {
        self.active = true;
        debug!("{} {} {} started on {}", scheduler.now(), self.id, self.name(), self.interface);
        let id = self.id;
        match &mut self.kind {
            ApplicationKind::EchoClient(client) => {
                client.next_send = Some(scheduler.schedule(SimDuration::ZERO, SimEvent::ApplicationSend { application: id }));
            }
            ApplicationKind::OnOff(source) => switch_on(id, source, net, scheduler),
            ApplicationKind::EchoServer(_) | ApplicationKind::PacketSink(_) => {}
        }
    }

    /// Stop generating traffic. Requests already in flight still complete.
    pub fn on_stop(&mut self, scheduler: &mut Scheduler<SimEvent>) {
        self.active = false;
        debug!("{} {} {} stopped", scheduler.now(), self.id, self.name());
        match &mut self.kind {
            ApplicationKind::EchoClient(client) => cancel(scheduler, &mut client.next_send),
            ApplicationKind::OnOff(source) => {
                source.is_on = false;
                cancel(scheduler, &mut source.next_send);
                cancel(scheduler, &mut source.next_toggle);
            }
            ApplicationKind::EchoServer(_) | ApplicationKind::PacketSink(_) => {}
        }
    }

    pub fn on_send(&mut self, net: &mut Network, scheduler: &mut Scheduler<SimEvent>) {
        if !self.active {
            return;
        }
        let (id, interface) = (self.id, self.interface);
        match &mut self.kind {
            ApplicationKind::EchoClient(client) => {
                client.next_send = None;
                if client.sent >= client.max_packets {
                    return;
                }
                let sequence = client.sent;
                net.send_udp(
                    scheduler,
                    interface,
                    Datagram {
                        kind: PacketKind::EchoRequest,
                        source_port: client.local_port,
                        destination: client.remote,
                        sequence,
                        payload_bytes: client.packet_size,
                    },
                );
                log::log!(
                    net.app_log_level(),
                    "At time {} client sent {} bytes to {} port {}",
                    scheduler.now(),
                    client.packet_size,
                    client.remote.ip(),
                    client.remote.port()
                );
                client.sent += 1;
                let timeout = scheduler.schedule(client.timeout, SimEvent::EchoTimeout { application: id, sequence });
                client.outstanding.insert(sequence, (scheduler.now(), timeout));
                if client.sent < client.max_packets {
                    client.next_send = Some(scheduler.schedule(client.interval, SimEvent::ApplicationSend { application: id }));
                }
            }
            ApplicationKind::OnOff(source) => {
                source.next_send = None;
                if !source.is_on || source.budget_exhausted() {
                    return;
                }
                net.send_udp(
                    scheduler,
                    interface,
                    Datagram {
                        kind: PacketKind::Datagram,
                        source_port: source.local_port,
                        destination: source.remote,
                        sequence: source.packets_sent as u32,
                        payload_bytes: source.packet_size,
                    },
                );
                source.packets_sent += 1;
                source.bytes_sent += source.packet_size as u64;
                if source.budget_exhausted() {
                    log::log!(net.app_log_level(), "At time {} onoff reached {} bytes, done", scheduler.now(), source.bytes_sent);
                    cancel(scheduler, &mut source.next_toggle);
                    source.is_on = false;
                    return;
                }
                source.next_send = Some(scheduler.schedule(source.packet_interval(), SimEvent::ApplicationSend { application: id }));
            }
            ApplicationKind::EchoServer(_) | ApplicationKind::PacketSink(_) => {}
        }
    }

    pub fn on_toggle(&mut self, net: &mut Network, scheduler: &mut Scheduler<SimEvent>) {
        if !self.active {
            return;
        }
        let id = self.id;
        let ApplicationKind::OnOff(source) = &mut self.kind else {
            return;
        };
        source.next_toggle = None;
        if source.is_on {
            source.is_on = false;
            cancel(scheduler, &mut source.next_send);
            let off = source.off_time.sample(&mut net.rng);
            debug!("{} {id} off for {off}", scheduler.now());
            source.next_toggle = Some(scheduler.schedule(off, SimEvent::ApplicationToggle { application: id }));
        } else {
            switch_on(id, source, net, scheduler);
        }
    }

    pub fn on_echo_timeout(&mut self, net: &mut Network, scheduler: &mut Scheduler<SimEvent>, sequence: u32) {
        let interface = self.interface;
        let ApplicationKind::EchoClient(client) = &mut self.kind else {
            return;
        };
        if client.outstanding.remove(&sequence).is_some() {
            client.lost += 1;
            net.record_lost(interface, client.remote);
            log::log!(net.app_log_level(), "At time {} client request {} to {} timed out", scheduler.now(), sequence, client.remote.ip());
        }
    }

    /// Packet delivered to this application's port.
    pub fn on_packet(&mut self, net: &mut Network, scheduler: &mut Scheduler<SimEvent>, packet: &Packet) {
        let now = scheduler.now();
        let interface = self.interface;
        match &mut self.kind {
            ApplicationKind::EchoServer(server) => {
                if !self.active || packet.kind != PacketKind::EchoRequest {
                    return;
                }
                log::log!(
                    net.app_log_level(),
                    "At time {} server received {} bytes from {} port {}",
                    now,
                    packet.payload_bytes,
                    packet.source_address,
                    packet.source_port
                );
                net.send_udp(
                    scheduler,
                    interface,
                    Datagram {
                        kind: PacketKind::EchoReply,
                        source_port: server.port,
                        destination: SocketAddrV4::new(packet.source_address, packet.source_port),
                        sequence: packet.sequence,
                        payload_bytes: packet.payload_bytes,
                    },
                );
                log::log!(
                    net.app_log_level(),
                    "At time {} server sent {} bytes to {} port {}",
                    now,
                    packet.payload_bytes,
                    packet.source_address,
                    packet.source_port
                );
            }
            ApplicationKind::EchoClient(client) => {
                if packet.kind != PacketKind::EchoReply {
                    return;
                }
                let Some((sent_at, timeout)) = client.outstanding.remove(&packet.sequence) else {
                    debug!("{now} client: late or duplicate reply {}", packet.sequence);
                    return;
                };
                scheduler.cancel(timeout);
                client.round_trips.push(now - sent_at);
                log::log!(
                    net.app_log_level(),
                    "At time {} client received {} bytes from {} port {}",
                    now,
                    packet.payload_bytes,
                    packet.source_address,
                    packet.source_port
                );
            }
            ApplicationKind::PacketSink(sink) => {
                if !self.active {
                    return;
                }
                sink.packets += 1;
                sink.bytes += packet.payload_bytes as u64;
                debug!("{now} sink received {} bytes from {}", packet.payload_bytes, packet.source_address);
            }
            ApplicationKind::OnOff(_) => {}
        }
    }
}

fn switch_on(id: ApplicationId, source: &mut OnOffSource, net: &mut Network, scheduler: &mut Scheduler<SimEvent>) {
    if source.budget_exhausted() {
        return;
    }
    source.is_on = true;
    let on = source.on_time.sample(&mut net.rng);
    debug!("{} {id} on for {on}", scheduler.now());
    source.next_toggle = Some(scheduler.schedule(on, SimEvent::ApplicationToggle { application: id }));
    cancel(scheduler, &mut source.next_send);
    source.next_send = Some(scheduler.schedule(source.packet_interval(), SimEvent::ApplicationSend { application: id }));
}

fn cancel(scheduler: &mut Scheduler<SimEvent>, event: &mut Option<EventId>) {
    if let Some(id) = event.take() {
        scheduler.cancel(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MacConfig, PhyConfig};
    use crate::simulation::geometry::Vector3;
    use crate::simulation::propagation::PropagationModel;
    use crate::simulation::types::Role;
    use std::net::Ipv4Addr;

    struct Fixture {
        net: Network,
        scheduler: Scheduler<SimEvent>,
        client_iface: InterfaceId,
        server_address: Ipv4Addr,
    }

    fn fixture() -> Fixture {
        let mut net = Network::new(PropagationModel::default(), MacConfig::default(), 3, false);
        let client_iface = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let server_iface = net.add_interface(Vector3::new(100.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let network = Ipv4Addr::new(10, 1, 1, 0);
        let mask = Ipv4Addr::new(255, 255, 255, 0);
        net.assign_address(client_iface, network, mask).unwrap();
        let server_address = net.assign_address(server_iface, network, mask).unwrap();
        Fixture {
            net,
            scheduler: Scheduler::new(),
            client_iface,
            server_address,
        }
    }

    fn echo_client(f: &Fixture, max_packets: u32) -> Application {
        let client = EchoClient::new(
            SocketAddrV4::new(f.server_address, 9),
            EPHEMERAL_PORT_BASE,
            max_packets,
            SimDuration::from_secs(1),
            100,
            SimDuration::from_secs(2),
        );
        Application::new(ApplicationId(0), f.client_iface, SimTime::ZERO, None, ApplicationKind::EchoClient(client))
    }

    fn client(app: &Application) -> &EchoClient {
        match &app.kind {
            ApplicationKind::EchoClient(client) => client,
            _ => panic!("not an echo client"),
        }
    }

    #[test]
    fn echo_client_sends_up_to_max_packets() {
        let mut f = fixture();
        let mut app = echo_client(&f, 2);
        app.on_start(&mut f.net, &mut f.scheduler);
        // First send fires at start time.
        assert_eq!(f.scheduler.peek_time(), Some(SimTime::ZERO));

        for _ in 0..3 {
            app.on_send(&mut f.net, &mut f.scheduler);
        }
        assert_eq!(client(&app).sent(), 2);
        assert_eq!(client(&app).outstanding(), 2);
    }

    #[test]
    fn stop_cancels_next_send_but_keeps_outstanding() {
        let mut f = fixture();
        let mut app = echo_client(&f, 5);
        app.on_start(&mut f.net, &mut f.scheduler);
        app.on_send(&mut f.net, &mut f.scheduler);
        let next_send = client(&app).next_send.unwrap();

        app.on_stop(&mut f.scheduler);
        assert!(!app.is_active());
        assert!(!f.scheduler.is_pending(next_send));
        assert_eq!(client(&app).outstanding(), 1);

        app.on_send(&mut f.net, &mut f.scheduler);
        assert_eq!(client(&app).sent(), 1);
    }

    #[test]
    fn timeout_records_loss_and_late_reply_is_ignored() {
        let mut f = fixture();
        let mut app = echo_client(&f, 1);
        app.on_start(&mut f.net, &mut f.scheduler);
        app.on_send(&mut f.net, &mut f.scheduler);

        app.on_echo_timeout(&mut f.net, &mut f.scheduler, 0);
        assert_eq!(client(&app).lost(), 1);
        assert_eq!(client(&app).outstanding(), 0);

        let reply = Packet {
            uid: 99,
            kind: PacketKind::EchoReply,
            source_address: f.server_address,
            source_port: 9,
            destination_address: Ipv4Addr::new(10, 1, 1, 1),
            destination_port: EPHEMERAL_PORT_BASE,
            sequence: 0,
            payload_bytes: 100,
            sent_at: SimTime::ZERO,
        };
        app.on_packet(&mut f.net, &mut f.scheduler, &reply);
        assert_eq!(client(&app).replies(), 0);

        let flow = f.net.flows.iter().next().map(|(_, record)| record.clone()).unwrap();
        assert_eq!(flow.tx_packets, 1);
        assert_eq!(flow.lost_packets, 1);
    }

    #[test]
    fn on_off_interval_follows_rate() {
        let source = OnOffSource::new(
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 1000),
            EPHEMERAL_PORT_BASE,
            20e6,
            1000,
            TimeDistribution::Constant { seconds: 1.0 },
            TimeDistribution::Constant { seconds: 0.0 },
            None,
        );
        assert_eq!(source.packet_interval(), SimDuration::from_micros(400));
    }

    #[test]
    fn on_off_stops_at_byte_budget() {
        let mut f = fixture();
        let source = OnOffSource::new(
            SocketAddrV4::new(f.server_address, 1000),
            EPHEMERAL_PORT_BASE,
            8e6,
            1000,
            TimeDistribution::Constant { seconds: 10.0 },
            TimeDistribution::Constant { seconds: 1.0 },
            Some(2500),
        );
        let mut app = Application::new(ApplicationId(0), f.client_iface, SimTime::ZERO, None, ApplicationKind::OnOff(source));
        app.on_start(&mut f.net, &mut f.scheduler);
        for _ in 0..5 {
            app.on_send(&mut f.net, &mut f.scheduler);
        }
        let ApplicationKind::OnOff(source) = &app.kind else { unreachable!() };
        assert_eq!(source.packets_sent(), 3);
        assert!(!source.is_on());
    }

    #[test]
    fn on_off_toggle_alternates_periods() {
        let mut f = fixture();
        let source = OnOffSource::new(
            SocketAddrV4::new(f.server_address, 1000),
            EPHEMERAL_PORT_BASE,
            8e6,
            1000,
            TimeDistribution::Constant { seconds: 1.0 },
            TimeDistribution::Constant { seconds: 2.0 },
            None,
        );
        let mut app = Application::new(ApplicationId(0), f.client_iface, SimTime::ZERO, None, ApplicationKind::OnOff(source));
        app.on_start(&mut f.net, &mut f.scheduler);
        app.on_toggle(&mut f.net, &mut f.scheduler);
        let ApplicationKind::OnOff(source) = &app.kind else { unreachable!() };
        assert!(!source.is_on());
        assert!(source.next_send.is_none());
        app.on_toggle(&mut f.net, &mut f.scheduler);
        let ApplicationKind::OnOff(source) = &app.kind else { unreachable!() };
        assert!(source.is_on());
    }
}
