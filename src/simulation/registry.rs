//! Entity registry: nodes and the interfaces they own.
//!
//! Nodes own their interfaces exclusively. Everything else (channels,
//! applications, events) refers to interfaces by `InterfaceId`, resolved
//! through the registry's index.

use std::net::Ipv4Addr;

use super::geometry::Vector3;
use super::mac::Mac;
use super::types::{ChannelId, InterfaceId, NodeId, Role};
use crate::config::PhyConfig;

pub struct Node {
    pub id: NodeId,
    pub position: Vector3,
    pub interfaces: Vec<Interface>,
}

pub struct Interface {
    pub id: InterfaceId,
    /// Owning node (back-reference by id).
    pub node: NodeId,
    pub channel: ChannelId,
    pub address: Option<Ipv4Addr>,
    pub role: Role,
    pub phy: PhyConfig,
    pub mac: Mac,
}

#[derive(Default)]
pub struct Registry {
    nodes: Vec<Node>,
    // InterfaceId -> (owning node, slot in its interface list)
    interface_index: Vec<(NodeId, usize)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(&mut self, position: Vector3) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            position,
            interfaces: Vec::new(),
        });
        id
    }

    /// Install a new interface on `node`. The MAC starts in its initial state
    /// for `role`.
    pub fn install_interface(&mut self, node: NodeId, channel: ChannelId, role: Role, phy: PhyConfig) -> InterfaceId {
        let id = InterfaceId(self.interface_index.len() as u32);
        let owner = &mut self.nodes[node.index()];
        owner.interfaces.push(Interface {
            id,
            node,
            channel,
            address: None,
            role,
            phy,
            mac: Mac::new(role),
        });
        self.interface_index.push((node, owner.interfaces.len() - 1));
        id
    }

    pub fn contains_interface(&self, id: InterfaceId) -> bool {
        id.index() < self.interface_index.len()
    }

    pub fn interface(&self, id: InterfaceId) -> &Interface {
        let (node, slot) = self.interface_index[id.index()];
        &self.nodes[node.index()].interfaces[slot]
    }

    pub fn interface_mut(&mut self, id: InterfaceId) -> &mut Interface {
        let (node, slot) = self.interface_index[id.index()];
        &mut self.nodes[node.index()].interfaces[slot]
    }

    /// Position of the node owning `interface`.
    pub fn position_of(&self, interface: InterfaceId) -> Vector3 {
        let (node, _) = self.interface_index[interface.index()];
        self.nodes[node.index()].position
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.nodes.iter().flat_map(|n| n.interfaces.iter())
    }

    /// Interface on `channel` holding `address`.
    pub fn interface_by_address(&self, channel: ChannelId, address: Ipv4Addr) -> Option<InterfaceId> {
        self.interfaces()
            .find(|i| i.channel == channel && i.address == Some(address))
            .map(|i| i.id)
    }
}
