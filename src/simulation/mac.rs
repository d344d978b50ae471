//! Medium access control.
//!
//! Each interface carries a `Mac`: its association state, a bounded transmit
//! queue and the timing state used for contention and collision detection.
//! The functions in this module drive a MAC from simulator events and are the
//! only place frames enter the channel.
//!
//! Station lifecycle in infrastructure mode:
//!
//! ```text
//! Unassociated --StartProbing--> Probing --AssociationResponse--> Associated
//!                                  ^   |
//!                                  +---+ ProbeTimeout (probe again)
//! ```
//!
//! In ad hoc mode stations are associated (without an access point) from the
//! start. Data frames wait in the queue until the station is associated;
//! management frames are always sent.
//!
//! Collision model: a frame arriving while an earlier reception is still in
//! progress is lost. The earlier frame is unaffected.

use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};

use super::capture::{CaptureEvent, Direction};
use super::network::Network;
use super::scheduler::{EventId, Scheduler};
use super::time::{SimDuration, SimTime};
use super::types::{Destination, Frame, FrameKind, InterfaceId, Packet, Role, SimEvent};
use crate::config::{ASSOCIATION_RESPONSE_BYTES, ContentionPolicy, MAC_OVERHEAD_BYTES, PROBE_REQUEST_BYTES, UDP_IP_OVERHEAD_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    Unassociated,
    Probing,
    /// `access_point` is `None` in ad hoc mode.
    Associated { access_point: Option<InterfaceId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacState {
    Station(StationState),
    AccessPoint { associated: BTreeSet<InterfaceId> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MacCounters {
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Frames sent as part of a fragmented packet.
    pub fragments_sent: u64,
    pub collisions: u64,
    /// Frames (or whole packets) refused because the queue was full.
    pub queue_drops: u64,
    pub probes_sent: u64,
    /// Probe requests an access point refused because it was full.
    pub rejected_associations: u64,
}

pub struct Mac {
    state: MacState,
    queue: VecDeque<Frame>,
    tx_busy_until: SimTime,
    rx_busy_until: SimTime,
    // Carrier sense: end of the latest activity heard or sent.
    medium_busy_until: SimTime,
    transmit_event: Option<EventId>,
    probe_timeout: Option<EventId>,
    // (source, packet uid) -> next expected fragment index
    reassembly: HashMap<(InterfaceId, u64), u16>,
    counters: MacCounters,
}

impl Mac {
    pub fn new(role: Role) -> Self {
        let state = match role {
            Role::AccessPoint => MacState::AccessPoint { associated: BTreeSet::new() },
            Role::Station => MacState::Station(StationState::Unassociated),
        };
        Self {
            state,
            queue: VecDeque::new(),
            tx_busy_until: SimTime::ZERO,
            rx_busy_until: SimTime::ZERO,
            medium_busy_until: SimTime::ZERO,
            transmit_event: None,
            probe_timeout: None,
            reassembly: HashMap::new(),
            counters: MacCounters::default(),
        }
    }

    pub fn state(&self) -> &MacState {
        &self.state
    }

    pub fn station_state(&self) -> Option<StationState> {
        match self.state {
            MacState::Station(state) => Some(state),
            MacState::AccessPoint { .. } => None,
        }
    }

    /// Access points are always able to send data.
    pub fn is_associated(&self) -> bool {
        match self.state {
            MacState::Station(StationState::Associated { .. }) | MacState::AccessPoint { .. } => true,
            MacState::Station(_) => false,
        }
    }

    pub fn associated_stations(&self) -> usize {
        match &self.state {
            MacState::AccessPoint { associated } => associated.len(),
            MacState::Station(_) => 0,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn counters(&self) -> MacCounters {
        self.counters
    }

    /// Join an independent BSS. Only valid for an unassociated station.
    pub(crate) fn join_ad_hoc(&mut self) {
        if let MacState::Station(StationState::Unassociated) = self.state {
            self.state = MacState::Station(StationState::Associated { access_point: None });
        }
    }

    fn may_send(&self, frame: &Frame) -> bool {
        frame.is_management() || self.is_associated()
    }
}

/// Move an unassociated station to `Probing` and send the first probe.
pub(crate) fn start_probing(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId) {
    let mac = &mut net.registry.interface_mut(interface).mac;
    if mac.station_state() != Some(StationState::Unassociated) {
        debug!("{interface}: probing requested in state {:?}, ignored", mac.state);
        return;
    }
    mac.state = MacState::Station(StationState::Probing);
    send_probe(net, scheduler, interface);
}

fn send_probe(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId) {
    let timeout = SimDuration::from_millis(net.mac_config.probe_timeout_ms);
    let mac = &mut net.registry.interface_mut(interface).mac;
    if let Some(previous) = mac.probe_timeout.take() {
        scheduler.cancel(previous);
    }
    mac.probe_timeout = Some(scheduler.schedule(timeout, SimEvent::ProbeTimeout { interface }));

    // A probe still waiting in the queue will do.
    if mac.queue.iter().any(|f| f.kind == FrameKind::ProbeRequest) {
        return;
    }
    mac.counters.probes_sent += 1;
    debug!("{} {interface}: sending probe request", scheduler.now());
    let probe = Frame::management(FrameKind::ProbeRequest, interface, Destination::Broadcast, PROBE_REQUEST_BYTES);
    enqueue(net, scheduler, interface, probe);
}

pub(crate) fn on_probe_timeout(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId) {
    let mac = &mut net.registry.interface_mut(interface).mac;
    mac.probe_timeout = None;
    if mac.station_state() == Some(StationState::Probing) {
        debug!("{} {interface}: no association response, probing again", scheduler.now());
        send_probe(net, scheduler, interface);
    }
}

/// Queue a single frame. Returns `false` if the queue was full and the frame
/// was dropped.
pub(crate) fn enqueue(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId, frame: Frame) -> bool {
    let capacity = net.mac_config.queue_capacity;
    let mac = &mut net.registry.interface_mut(interface).mac;
    if mac.queue.len() >= capacity {
        mac.counters.queue_drops += 1;
        debug!("{} {interface}: transmit queue full, {:?} frame dropped", scheduler.now(), frame.kind);
        return false;
    }
    if frame.is_management() {
        // Ahead of data frames that may be blocked on association.
        let position = mac.queue.iter().position(|f| !f.is_management()).unwrap_or(mac.queue.len());
        mac.queue.insert(position, frame);
    } else {
        mac.queue.push_back(frame);
    }
    schedule_attempt(net, scheduler, interface);
    true
}

/// Queue `packet` for `destination`, split into fragments if the frame would
/// exceed the fragmentation threshold. The packet is refused as a whole when
/// its fragments do not fit in the queue.
pub(crate) fn send_packet(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId, destination: InterfaceId, packet: Packet) -> bool {
    let threshold = net.mac_config.fragmentation_threshold;
    let capacity = net.mac_config.queue_capacity;
    let size = packet.payload_bytes + UDP_IP_OVERHEAD_BYTES + MAC_OVERHEAD_BYTES;
    let count = size.div_ceil(threshold).max(1);

    let mac = &mut net.registry.interface_mut(interface).mac;
    if mac.queue.len() + count as usize > capacity {
        mac.counters.queue_drops += 1;
        debug!("{} {interface}: transmit queue full, packet {} dropped", scheduler.now(), packet.uid);
        return false;
    }
    for index in 0..count {
        mac.queue.push_back(Frame {
            kind: FrameKind::Data,
            source: interface,
            destination: Destination::Unicast(destination),
            size_bytes: (size - index * threshold).min(threshold),
            fragment_index: index as u16,
            fragment_count: count as u16,
            packet: Some(packet.clone()),
        });
    }
    schedule_attempt(net, scheduler, interface);
    true
}

/// Arm a `MacTransmit` for the head of the queue unless one is pending or the
/// head cannot be sent yet.
fn schedule_attempt(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId) {
    let now = scheduler.now();
    let rts_cts_threshold = net.mac_config.rts_cts_threshold;
    let iface = net.registry.interface_mut(interface);
    let rts_cts_overhead = iface.phy.rts_cts_overhead();
    let mac = &mut iface.mac;
    if mac.transmit_event.is_some() {
        return;
    }
    let Some(head) = mac.queue.front() else {
        return;
    };
    if !mac.may_send(head) {
        return;
    }

    let idle = now.max(mac.tx_busy_until);
    let mut start = match &net.mac_config.contention {
        ContentionPolicy::None => idle,
        ContentionPolicy::Fixed { deferral_us } => idle + SimDuration::from_micros_f64(*deferral_us),
        ContentionPolicy::Csma { difs_us, slot_us, cw_min } => {
            let slots = net.rng.gen_range(0..=*cw_min);
            idle.max(mac.medium_busy_until) + SimDuration::from_micros_f64(difs_us + slot_us * slots as f64)
        }
    };
    if head.kind == FrameKind::Data && head.size_bytes > rts_cts_threshold {
        start += rts_cts_overhead;
    }
    mac.transmit_event = Some(scheduler.schedule_at(start, SimEvent::MacTransmit { interface }));
}

/// Put the head of the queue on the air.
pub(crate) fn on_transmit(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId) {
    let now = scheduler.now();
    let carrier_sense = matches!(net.mac_config.contention, ContentionPolicy::Csma { .. });
    let iface = net.registry.interface_mut(interface);
    let channel = iface.channel;
    let tx_power_dbm = iface.phy.tx_power_dbm;
    let mac = &mut iface.mac;
    mac.transmit_event = None;

    if carrier_sense && mac.medium_busy_until > now {
        // Medium became busy during the backoff; contend again.
        schedule_attempt(net, scheduler, interface);
        return;
    }
    if !mac.queue.front().is_some_and(|head| mac.may_send(head)) {
        return;
    }
    let Some(frame) = mac.queue.pop_front() else {
        return;
    };

    mac.tx_busy_until = now + iface.phy.airtime(frame.size_bytes);
    mac.medium_busy_until = mac.medium_busy_until.max(mac.tx_busy_until);
    mac.counters.frames_sent += 1;
    if frame.fragment_count > 1 {
        mac.counters.fragments_sent += 1;
    }

    net.capture(&CaptureEvent {
        time: now,
        interface,
        direction: Direction::Transmit,
        frame: &frame,
        rx_power_dbm: None,
        collided: false,
    });
    net.channels[channel.index()].transmit(interface, &frame, tx_power_dbm, &net.registry, scheduler);
    schedule_attempt(net, scheduler, interface);
}

/// Handle a frame arriving at `interface`. Returns a packet when a complete
/// data packet addressed to this interface has been received.
pub(crate) fn on_receive(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, interface: InterfaceId, frame: Frame, rx_power_dbm: f64) -> Option<Packet> {
    let now = scheduler.now();
    let iface = net.registry.interface_mut(interface);
    let end = now + iface.phy.airtime(frame.size_bytes);
    let mac = &mut iface.mac;
    mac.medium_busy_until = mac.medium_busy_until.max(end);

    let collided = now < mac.rx_busy_until;
    if collided {
        mac.counters.collisions += 1;
    } else {
        mac.rx_busy_until = end;
    }
    let addressed = frame.destination.accepts(interface);
    if addressed && !collided {
        mac.counters.frames_received += 1;
    }

    net.capture(&CaptureEvent {
        time: now,
        interface,
        direction: Direction::Receive,
        frame: &frame,
        rx_power_dbm: Some(rx_power_dbm),
        collided,
    });
    if collided {
        debug!("{now} {interface}: {:?} frame from {} lost in collision", frame.kind, frame.source);
        return None;
    }
    if !addressed {
        return None;
    }

    match frame.kind {
        FrameKind::ProbeRequest => {
            on_probe_request(net, scheduler, interface, frame.source);
            None
        }
        FrameKind::AssociationResponse => {
            on_association_response(net, scheduler, interface, frame.source);
            None
        }
        FrameKind::Data => reassemble(&mut net.registry.interface_mut(interface).mac, frame),
    }
}

fn on_probe_request(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, access_point: InterfaceId, station: InterfaceId) {
    let limit = net.mac_config.max_associated_stations;
    let mac = &mut net.registry.interface_mut(access_point).mac;
    let MacState::AccessPoint { associated } = &mut mac.state else {
        return;
    };
    if !associated.contains(&station) {
        if associated.len() >= limit {
            mac.counters.rejected_associations += 1;
            warn!("{} {access_point}: refusing {station}, {limit} stations already associated", scheduler.now());
            return;
        }
        associated.insert(station);
        debug!("{} {access_point}: accepted {station}", scheduler.now());
    }
    let response = Frame::management(FrameKind::AssociationResponse, access_point, Destination::Unicast(station), ASSOCIATION_RESPONSE_BYTES);
    enqueue(net, scheduler, access_point, response);
}

fn on_association_response(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, station: InterfaceId, access_point: InterfaceId) {
    let mac = &mut net.registry.interface_mut(station).mac;
    if mac.station_state() != Some(StationState::Probing) {
        return;
    }
    mac.state = MacState::Station(StationState::Associated {
        access_point: Some(access_point),
    });
    if let Some(timeout) = mac.probe_timeout.take() {
        scheduler.cancel(timeout);
    }
    info!("{} {station} associated with {access_point}", scheduler.now());
    // Data queued while probing can go now.
    schedule_attempt(net, scheduler, station);
}

/// Fragments of a packet leave the sender back to back and in order, so a
/// gap means one was lost and the packet is discarded. The first frame of a
/// new packet also ends any incomplete one from the same source.
fn reassemble(mac: &mut Mac, frame: Frame) -> Option<Packet> {
    let packet = frame.packet?;
    let source = frame.source;
    if frame.fragment_index == 0 {
        mac.reassembly.retain(|(from, _), _| *from != source);
    }
    if frame.fragment_count <= 1 {
        return Some(packet);
    }

    let key = (source, packet.uid);
    let next = if frame.fragment_index == 0 {
        1
    } else {
        match mac.reassembly.get(&key) {
            Some(&expected) if expected == frame.fragment_index => expected + 1,
            _ => {
                mac.reassembly.remove(&key);
                debug!("fragment {} of packet {} from {source} out of sequence, packet discarded", frame.fragment_index, packet.uid);
                return None;
            }
        }
    };
    if next < frame.fragment_count {
        mac.reassembly.insert(key, next);
        return None;
    }
    mac.reassembly.remove(&key);
    Some(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssociationMode, MacConfig, PhyConfig};
    use crate::simulation::geometry::Vector3;
    use crate::simulation::propagation::PropagationModel;
    use crate::simulation::types::PacketKind;
    use std::net::Ipv4Addr;

    fn network(mac_config: MacConfig) -> Network {
        Network::new(PropagationModel::default(), mac_config, 7, false)
    }

    fn packet(uid: u64, payload_bytes: u32) -> Packet {
        Packet {
            uid,
            kind: PacketKind::Datagram,
            source_address: Ipv4Addr::new(10, 1, 1, 1),
            source_port: 49153,
            destination_address: Ipv4Addr::new(10, 1, 1, 2),
            destination_port: 9,
            sequence: 0,
            payload_bytes,
            sent_at: SimTime::ZERO,
        }
    }

    /// Drive MAC events until `stop`, collecting delivered packets.
    fn run_mac(net: &mut Network, scheduler: &mut Scheduler<SimEvent>, stop: SimTime) -> Vec<(InterfaceId, Packet)> {
        let mut delivered = Vec::new();
        while scheduler.peek_time().is_some_and(|t| t <= stop) {
            let Some((_, event)) = scheduler.pop_next() else { break };
            match event {
                SimEvent::StartProbing { interface } => start_probing(net, scheduler, interface),
                SimEvent::ProbeTimeout { interface } => on_probe_timeout(net, scheduler, interface),
                SimEvent::MacTransmit { interface } => on_transmit(net, scheduler, interface),
                SimEvent::Receive { interface, frame, rx_power_dbm } => {
                    if let Some(packet) = on_receive(net, scheduler, interface, frame, rx_power_dbm) {
                        delivered.push((interface, packet));
                    }
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        delivered
    }

    #[test]
    fn access_point_refuses_stations_beyond_limit() {
        let mut net = network(MacConfig {
            association: AssociationMode::Infrastructure,
            max_associated_stations: 1,
            ..MacConfig::default()
        });
        let ap = net.add_interface(Vector3::new(50.0, 0.0, 1.0), Role::AccessPoint, PhyConfig::default());
        let first = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let second = net.add_interface(Vector3::new(100.0, 0.0, 1.0), Role::Station, PhyConfig::default());

        let mut scheduler = Scheduler::new();
        scheduler.schedule(SimDuration::ZERO, SimEvent::StartProbing { interface: first });
        scheduler.schedule(SimDuration::from_millis(50), SimEvent::StartProbing { interface: second });
        run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));

        let ap_mac = &net.registry.interface(ap).mac;
        assert_eq!(ap_mac.associated_stations(), 1);
        assert!(ap_mac.counters().rejected_associations >= 1);
        assert_eq!(
            net.registry.interface(first).mac.station_state(),
            Some(StationState::Associated { access_point: Some(ap) })
        );
        assert_eq!(net.registry.interface(second).mac.station_state(), Some(StationState::Probing));
        // Rejected station keeps probing on timeout.
        assert!(net.registry.interface(second).mac.counters().probes_sent > 1);
    }

    #[test]
    fn data_waits_for_association() {
        let mut net = network(MacConfig {
            association: AssociationMode::Infrastructure,
            ..MacConfig::default()
        });
        let ap = net.add_interface(Vector3::new(50.0, 0.0, 1.0), Role::AccessPoint, PhyConfig::default());
        let station = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let mut scheduler = Scheduler::new();

        assert!(send_packet(&mut net, &mut scheduler, station, ap, packet(1, 100)));
        assert_eq!(net.registry.interface(station).mac.queue_len(), 1);
        assert_eq!(scheduler.pending(), 0);

        scheduler.schedule(SimDuration::from_millis(1), SimEvent::StartProbing { interface: station });
        let delivered = run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, ap);
        assert_eq!(net.registry.interface(station).mac.queue_len(), 0);
    }

    #[test]
    fn large_packet_is_fragmented_and_reassembled() {
        let mut net = network(MacConfig {
            fragmentation_threshold: 500,
            ..MacConfig::default()
        });
        let a = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let b = net.add_interface(Vector3::new(100.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        net.registry.interface_mut(a).mac.join_ad_hoc();
        net.registry.interface_mut(b).mac.join_ad_hoc();

        let mut scheduler = Scheduler::new();
        // 1000 + 28 + 36 = 1064 bytes -> 500 + 500 + 64
        assert!(send_packet(&mut net, &mut scheduler, a, b, packet(1, 1000)));
        let delivered = run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1.uid, 1);
        let sent = net.registry.interface(a).mac.counters();
        assert_eq!(sent.frames_sent, 3);
        assert_eq!(sent.fragments_sent, 3);
        assert_eq!(net.registry.interface(b).mac.counters().frames_received, 3);
    }

    #[test]
    fn simultaneous_arrivals_collide_and_earlier_frame_wins() {
        let mut net = network(MacConfig::default());
        let left = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let middle = net.add_interface(Vector3::new(100.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let right = net.add_interface(Vector3::new(200.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        for iface in [left, middle, right] {
            net.registry.interface_mut(iface).mac.join_ad_hoc();
        }

        let mut scheduler = Scheduler::new();
        send_packet(&mut net, &mut scheduler, left, middle, packet(1, 200));
        send_packet(&mut net, &mut scheduler, right, middle, packet(2, 200));
        let delivered = run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));

        let at_middle: Vec<_> = delivered.iter().filter(|(iface, _)| *iface == middle).collect();
        assert_eq!(at_middle.len(), 1);
        assert_eq!(at_middle[0].1.uid, 1);
        assert_eq!(net.registry.interface(middle).mac.counters().collisions, 1);
    }

    fn fragment(source: InterfaceId, destination: InterfaceId, packet: Packet, index: u16, count: u16) -> Frame {
        Frame {
            kind: FrameKind::Data,
            source,
            destination: Destination::Unicast(destination),
            size_bytes: 500,
            fragment_index: index,
            fragment_count: count,
            packet: Some(packet),
        }
    }

    fn arrive(scheduler: &mut Scheduler<SimEvent>, at_us: u64, interface: InterfaceId, frame: Frame) {
        let rx_power_dbm = -60.0;
        scheduler.schedule_at(SimTime::ZERO + SimDuration::from_micros(at_us), SimEvent::Receive { interface, frame, rx_power_dbm });
    }

    #[test]
    fn fragment_lost_in_collision_discards_partial_packet() {
        let mut net = network(MacConfig::default());
        let left = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let middle = net.add_interface(Vector3::new(100.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let right = net.add_interface(Vector3::new(200.0, 0.0, 1.0), Role::Station, PhyConfig::default());

        // A 500 byte frame occupies the receiver for ~687 us.
        let mut scheduler = Scheduler::new();
        arrive(&mut scheduler, 0, middle, fragment(left, middle, packet(1, 1000), 0, 3));
        arrive(&mut scheduler, 900, middle, fragment(right, middle, packet(2, 100), 0, 1));
        arrive(&mut scheduler, 1000, middle, fragment(left, middle, packet(1, 1000), 1, 3));
        arrive(&mut scheduler, 2000, middle, fragment(left, middle, packet(1, 1000), 2, 3));
        let delivered = run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));

        let uids: Vec<u64> = delivered.iter().map(|(_, p)| p.uid).collect();
        assert_eq!(uids, vec![2]);
        let mac = &net.registry.interface(middle).mac;
        assert_eq!(mac.counters().collisions, 1);
        assert!(mac.reassembly.is_empty());
    }

    #[test]
    fn new_packet_from_source_drops_incomplete_one() {
        let mut net = network(MacConfig::default());
        let a = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let b = net.add_interface(Vector3::new(10.0, 0.0, 1.0), Role::Station, PhyConfig::default());

        // Last fragment of packet 1 never arrives.
        let mut scheduler = Scheduler::new();
        arrive(&mut scheduler, 0, b, fragment(a, b, packet(1, 1000), 0, 3));
        arrive(&mut scheduler, 1000, b, fragment(a, b, packet(1, 1000), 1, 3));
        arrive(&mut scheduler, 2000, b, fragment(a, b, packet(2, 1000), 0, 2));
        run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));

        let pending: Vec<_> = net.registry.interface(b).mac.reassembly.keys().copied().collect();
        assert_eq!(pending, vec![(a, 2)]);

        arrive(&mut scheduler, 3000, b, fragment(a, b, packet(2, 1000), 1, 2));
        let delivered = run_mac(&mut net, &mut scheduler, SimTime::from_secs_f64(1.0));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1.uid, 2);
        assert!(net.registry.interface(b).mac.reassembly.is_empty());
    }

    #[test]
    fn fixed_contention_defers_by_configured_time() {
        let mut net = network(MacConfig {
            contention: ContentionPolicy::Fixed { deferral_us: 250.0 },
            ..MacConfig::default()
        });
        let a = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let b = net.add_interface(Vector3::new(10.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        net.registry.interface_mut(a).mac.join_ad_hoc();

        let mut scheduler = Scheduler::new();
        assert!(send_packet(&mut net, &mut scheduler, a, b, packet(1, 100)));
        let pending: Vec<_> = scheduler.iter_pending().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, SimTime::ZERO + SimDuration::from_micros(250));
        assert!(matches!(pending[0].1, SimEvent::MacTransmit { interface } if *interface == a));
    }

    #[test]
    fn rts_cts_exchange_delays_long_data_frames() {
        let phy = PhyConfig::default();
        let mut net = network(MacConfig {
            rts_cts_threshold: 500,
            ..MacConfig::default()
        });
        let a = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, phy.clone());
        let b = net.add_interface(Vector3::new(10.0, 0.0, 1.0), Role::Station, phy.clone());
        let c = net.add_interface(Vector3::new(20.0, 0.0, 1.0), Role::Station, phy.clone());
        for iface in [a, c] {
            net.registry.interface_mut(iface).mac.join_ad_hoc();
        }

        let mut scheduler = Scheduler::new();
        // 1000 + 64 bytes on air: above the RTS threshold, below fragmentation.
        send_packet(&mut net, &mut scheduler, a, b, packet(1, 1000));
        // 100 + 64 bytes: sent without RTS/CTS.
        send_packet(&mut net, &mut scheduler, c, b, packet(2, 100));

        let expected = phy.airtime(20) + phy.airtime(14) + SimDuration::from_micros(32);
        assert_eq!(phy.rts_cts_overhead(), expected);
        let times: Vec<(SimTime, InterfaceId)> = scheduler
            .iter_pending()
            .filter_map(|(time, event)| match event {
                SimEvent::MacTransmit { interface } => Some((time, *interface)),
                _ => None,
            })
            .collect();
        assert_eq!(times, vec![(SimTime::ZERO, c), (SimTime::ZERO + expected, a)]);
    }

    #[test]
    fn full_queue_drops_packets() {
        let mut net = network(MacConfig {
            queue_capacity: 2,
            ..MacConfig::default()
        });
        let a = net.add_interface(Vector3::new(0.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        let b = net.add_interface(Vector3::new(10.0, 0.0, 1.0), Role::Station, PhyConfig::default());
        net.registry.interface_mut(a).mac.join_ad_hoc();

        let mut scheduler = Scheduler::new();
        let accepted = (0..5).filter(|uid| send_packet(&mut net, &mut scheduler, a, b, packet(*uid, 100))).count();
        assert_eq!(accepted, 2);
        assert_eq!(net.registry.interface(a).mac.counters().queue_drops, 3);
    }

    #[test]
    fn ad_hoc_join_only_from_unassociated() {
        let mut mac = Mac::new(Role::Station);
        assert!(!mac.is_associated());
        mac.join_ad_hoc();
        assert_eq!(mac.station_state(), Some(StationState::Associated { access_point: None }));

        let mut ap = Mac::new(Role::AccessPoint);
        ap.join_ad_hoc();
        assert!(matches!(ap.state(), MacState::AccessPoint { .. }));
    }
}
