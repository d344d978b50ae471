//! Shared wireless medium.
//!
//! A channel owns its propagation model and knows which interfaces are
//! attached to it. A transmission is fanned out to every other attached
//! interface: each receiver whose received power clears its sensitivity gets
//! a `Receive` event after the propagation delay; the rest silently miss the
//! frame. Overlapping transmissions are not serialized here; contention and
//! collisions are the MAC's business.

use log::trace;
use serde::Serialize;

use super::propagation::PropagationModel;
use super::registry::Registry;
use super::scheduler::Scheduler;
use super::types::{ChannelId, Frame, InterfaceId, SimEvent};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub frames_transmitted: u64,
    pub deliveries_scheduled: u64,
    /// Receiver/frame pairs dropped because the signal was too weak.
    pub below_sensitivity: u64,
}

pub struct Channel {
    pub id: ChannelId,
    model: PropagationModel,
    attached: Vec<InterfaceId>,
    stats: ChannelStats,
}

impl Channel {
    pub fn new(id: ChannelId, model: PropagationModel) -> Self {
        Self {
            id,
            model,
            attached: Vec::new(),
            stats: ChannelStats::default(),
        }
    }

    pub fn attach(&mut self, interface: InterfaceId) {
        if !self.attached.contains(&interface) {
            self.attached.push(interface);
        }
    }

    pub fn model(&self) -> &PropagationModel {
        &self.model
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Put `frame` on the medium from `from` at the current simulated time.
    ///
    /// Returns the number of receive events scheduled.
    pub fn transmit(&mut self, from: InterfaceId, frame: &Frame, tx_power_dbm: f64, registry: &Registry, scheduler: &mut Scheduler<SimEvent>) -> usize {
        let sender = registry.interface(from);
        let sender_position = registry.position_of(from);
        let radiated_dbm = tx_power_dbm + sender.phy.tx_gain_db;
        self.stats.frames_transmitted += 1;

        let mut scheduled = 0;
        for &other in &self.attached {
            if other == from {
                continue;
            }
            let receiver = registry.interface(other);
            let receiver_position = registry.position_of(other);
            let rx_power_dbm = self.model.received_power(radiated_dbm, &sender_position, &receiver_position) + receiver.phy.rx_gain_db;

            if rx_power_dbm < receiver.phy.rx_sensitivity_dbm {
                trace!(
                    "{} -> {}: {:.2} dBm below sensitivity {:.2} dBm, frame dropped",
                    from, other, rx_power_dbm, receiver.phy.rx_sensitivity_dbm
                );
                self.stats.below_sensitivity += 1;
                continue;
            }

            let delay = self.model.delay(&sender_position, &receiver_position);
            scheduler.schedule(
                delay,
                SimEvent::Receive {
                    interface: other,
                    frame: frame.clone(),
                    rx_power_dbm,
                },
            );
            scheduled += 1;
        }
        self.stats.deliveries_scheduled += scheduled as u64;
        scheduled
    }
}
