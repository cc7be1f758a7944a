// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Collaborator interfaces of the mailbox engine.
//!
//! The engine owns the mailbox protocol and its resource bookkeeping. Every
//! effect on the switch itself goes through one of the traits below, so the
//! engine can be driven against real hardware or an in-memory model.

use crate::MailboxError;
use bitflags::bitflags;
use switch_mailbox_protocol::messages::FlowTableType;
use switch_mailbox_protocol::messages::HostConfigAttribute;
use switch_mailbox_protocol::messages::MacAddress;
use switch_mailbox_protocol::messages::PacketTimestamp;
use switch_mailbox_protocol::messages::PortMap;
use switch_mailbox_protocol::messages::TimestampMode;
use switch_mailbox_protocol::messages::TunnelType;
use switch_mailbox_protocol::messages::XcastMode;

/// Raw access to a PEP's mailbox register block.
pub trait PepRegisters {
    /// Reads the register at word address `addr`.
    fn read_pep(&self, pep: u32, addr: u32) -> anyhow::Result<u32>;
    /// Writes the register at word address `addr`.
    fn write_pep(&self, pep: u32, addr: u32, value: u32) -> anyhow::Result<()>;
    /// Returns true while the PEP's PCIe link is held in reset.
    fn pep_in_reset(&self, pep: u32) -> anyhow::Result<bool>;
}

/// Logical port and glort management.
pub trait LogicalPorts {
    /// Returns the glort range owned by `pep`.
    fn pep_port_map(&self, pep: u32) -> Result<PortMap, MailboxError>;
    /// Returns the logical port of the physical function behind `pep`.
    fn pf_port(&self, pep: u32) -> Result<u32, MailboxError>;
    /// Translates a glort into a logical port.
    fn glort_to_port(&self, glort: u16) -> Result<u32, MailboxError>;
    /// Translates a logical port into its glort.
    fn port_to_glort(&self, port: u32) -> Result<u16, MailboxError>;
    /// Allocates `count` virtual ports starting at `first_glort`.
    fn create_logical_ports(&self, pep: u32, first_glort: u16, count: u16)
    -> Result<(), MailboxError>;
    /// Frees a virtual port.
    fn free_logical_port(&self, port: u32) -> Result<(), MailboxError>;
}

/// Per-port and per-host switch services.
pub trait HostServices {
    /// Programs the port's flooding mode.
    fn set_xcast_mode(&self, port: u32, mode: XcastMode) -> Result<(), MailboxError>;
    /// Sets the port's default VLAN.
    fn set_pvid(&self, port: u32, pvid: u16) -> Result<(), MailboxError>;
    /// Applies a host configuration attribute.
    fn apply_host_config(
        &self,
        pep: u32,
        attribute: HostConfigAttribute,
        value: u32,
    ) -> Result<(), MailboxError>;
    /// Returns the hardware platform identifier.
    fn hardware_platform(&self) -> Result<u32, MailboxError>;
    /// Forwards a packet timestamp and returns the timestamp to report back.
    fn deliver_packet_timestamp(
        &self,
        pep: u32,
        timestamp: &PacketTimestamp,
    ) -> Result<PacketTimestamp, MailboxError>;
    /// Requests a timestamp mode and returns the most capable mode the port
    /// supports.
    fn set_timestamp_mode(
        &self,
        port: u32,
        mode: TimestampMode,
    ) -> Result<TimestampMode, MailboxError>;
    /// Returns the master clock offset in nanoseconds, or
    /// [`MailboxError::Unsupported`] if the switch has no master clock.
    fn master_clock_offset(&self) -> Result<u64, MailboxError>;
    /// Sets the number of virtual functions enabled on `pep`.
    fn set_vf_count(&self, pep: u32, count: u16) -> Result<(), MailboxError>;
}

/// Kind of traffic flooded to listening ports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FloodKind {
    /// Unknown unicast.
    Unicast,
    /// Unknown multicast.
    Multicast,
    /// Broadcast.
    Broadcast,
}

bitflags! {
    /// A set of [`FloodKind`]s.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct FloodKinds: u8 {
        /// Unknown unicast.
        const UNICAST = 1 << 0;
        /// Unknown multicast.
        const MULTICAST = 1 << 1;
        /// Broadcast.
        const BROADCAST = 1 << 2;
    }
}

impl FloodKinds {
    /// Returns the flood kinds a port in `mode` listens to, or `None` for an
    /// unknown mode.
    pub fn for_mode(mode: XcastMode) -> Option<Self> {
        let kinds = match mode {
            XcastMode::NONE => Self::empty(),
            XcastMode::MULTI => Self::BROADCAST,
            XcastMode::ALLMULTI => Self::MULTICAST | Self::BROADCAST,
            XcastMode::PROMISC => Self::all(),
            _ => return None,
        };
        Some(kinds)
    }

    /// Iterates over the kinds in the set.
    pub fn kinds(self) -> impl Iterator<Item = FloodKind> {
        [
            (Self::UNICAST, FloodKind::Unicast),
            (Self::MULTICAST, FloodKind::Multicast),
            (Self::BROADCAST, FloodKind::Broadcast),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, kind)| kind)
    }
}

impl From<FloodKind> for FloodKinds {
    fn from(kind: FloodKind) -> Self {
        match kind {
            FloodKind::Unicast => Self::UNICAST,
            FloodKind::Multicast => Self::MULTICAST,
            FloodKind::Broadcast => Self::BROADCAST,
        }
    }
}

/// A MAC address on a VLAN.
///
/// Ordered by address bytes, then VLAN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacVlanKey {
    /// The address.
    pub mac: MacAddress,
    /// The VLAN.
    pub vlan: u16,
}

/// Flooding and multicast group membership.
pub trait MulticastGroups {
    /// Adds `port` to the flood listeners of `kind`.
    fn add_flood_listener(&self, kind: FloodKind, port: u32) -> Result<(), MailboxError>;
    /// Removes `port` from the flood listeners of `kind`.
    fn remove_flood_listener(&self, kind: FloodKind, port: u32) -> Result<(), MailboxError>;
    /// Adds or removes `pep` in the port mask used to flood `kind`.
    fn set_pep_flood_membership(
        &self,
        pep: u32,
        kind: FloodKind,
        member: bool,
    ) -> Result<(), MailboxError>;
    /// Subscribes `port` to a multicast group.
    fn add_listener(&self, group: MacVlanKey, port: u32) -> Result<(), MailboxError>;
    /// Unsubscribes `port` from a multicast group.
    fn delete_listener(&self, group: MacVlanKey, port: u32) -> Result<(), MailboxError>;
}

/// The unicast MAC address table.
pub trait MacTable {
    /// Directs traffic for `key` to `port`.
    fn add_mac_entry(&self, key: MacVlanKey, port: u32) -> Result<(), MailboxError>;
    /// Removes the entry for `key`.
    fn delete_mac_entry(&self, key: MacVlanKey) -> Result<(), MailboxError>;
}

/// Parameters of a flow table to create.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowTableConfig {
    /// Backing engine.
    pub table_type: FlowTableType,
    /// Table flags.
    pub flags: u8,
    /// Capacity of the table.
    pub num_entries: u32,
    /// Conditions rules may match on.
    pub condition_mask: u64,
    /// Actions rules may take.
    pub action_mask: u32,
}

/// Description of an existing flow table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowTableInfo {
    /// Switch-wide table index.
    pub table_index: u32,
    /// Backing engine.
    pub table_type: FlowTableType,
    /// Table flags.
    pub flags: u8,
    /// Capacity of the table.
    pub num_entries: u32,
    /// Actions rules may take.
    pub action_mask: u32,
}

/// A flow rule as programmed into a table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowRule {
    /// Rule priority.
    pub priority: u16,
    /// Conditions matched.
    pub condition: u64,
    /// Values matched for those conditions.
    pub condition_value: [u8; 16],
    /// Actions taken.
    pub action: u32,
    /// Action parameter.
    pub action_param: u32,
    /// Logical port owning the rule.
    pub port: u32,
}

/// Flow table management.
pub trait FlowTables {
    /// Creates flow table `table`.
    fn create_table(&self, table: u32, config: &FlowTableConfig) -> Result<(), MailboxError>;
    /// Deletes flow table `table` and every rule in it.
    fn delete_table(&self, table: u32) -> Result<(), MailboxError>;
    /// Describes flow table `table`.
    fn table_info(&self, table: u32) -> Result<FlowTableInfo, MailboxError>;
    /// Lists the tables created by the switch itself rather than a host.
    fn source_tables(&self) -> Result<Vec<FlowTableInfo>, MailboxError>;
    /// Adds a rule and returns its internal flow id.
    fn add_flow(&self, table: u32, rule: &FlowRule) -> Result<u32, MailboxError>;
    /// Replaces the rule with internal flow id `flow`.
    fn modify_flow(&self, table: u32, flow: u32, rule: &FlowRule) -> Result<(), MailboxError>;
    /// Deletes the rule with internal flow id `flow`.
    fn delete_flow(&self, table: u32, flow: u32) -> Result<(), MailboxError>;
    /// Reads back the rule with internal flow id `flow`.
    fn get_flow(&self, table: u32, flow: u32) -> Result<FlowRule, MailboxError>;
}

/// A tunnel filter rule steering traffic to a port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InnerOuterMacRule {
    /// Outer (tunnel) destination MAC.
    pub outer_mac: MacAddress,
    /// Inner (tenant) destination MAC.
    pub inner_mac: MacAddress,
    /// Tunnel network identifier.
    pub vni: u32,
    /// Outer L4 destination port.
    pub outer_l4_port: u16,
    /// Tunnel encapsulation.
    pub tunnel_type: TunnelType,
    /// Destination logical port.
    pub port: u32,
}

/// The ACL compiler.
pub trait AclCompiler {
    /// Creates an empty ACL.
    fn create_acl(&self, acl: u32) -> Result<(), MailboxError>;
    /// Adds rule `rule` to `acl`.
    fn add_rule(&self, acl: u32, rule: u32, filter: &InnerOuterMacRule) -> Result<(), MailboxError>;
    /// Removes rule `rule` from `acl`.
    fn delete_rule(&self, acl: u32, rule: u32) -> Result<(), MailboxError>;
    /// Removes `acl` entirely.
    fn delete_acl(&self, acl: u32) -> Result<(), MailboxError>;
    /// Compiles the ACLs and applies them without disturbing traffic.
    fn compile_and_apply(&self) -> Result<(), MailboxError>;
}

/// Everything the engine needs from the switch.
pub trait SwitchBackend:
    PepRegisters
    + LogicalPorts
    + HostServices
    + MulticastGroups
    + MacTable
    + FlowTables
    + AclCompiler
    + Send
    + Sync
{
}

impl<T> SwitchBackend for T where
    T: PepRegisters
        + LogicalPorts
        + HostServices
        + MulticastGroups
        + MacTable
        + FlowTables
        + AclCompiler
        + Send
        + Sync
{
}
