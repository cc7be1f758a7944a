// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bookkeeping of the switch resources created on behalf of each virtual
//! port, so that they can be released when the port goes away.

use crate::MailboxConfig;
use crate::MailboxError;
use crate::backend::FloodKind;
use crate::backend::FloodKinds;
use crate::backend::MacVlanKey;
use std::collections::BTreeMap;
use switch_mailbox_protocol::messages::MacAddress;
use switch_mailbox_protocol::messages::TunnelType;

/// Whether a logical port is a physical or a virtual function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// The PEP's physical function.
    Pf,
    /// A virtual function.
    Vf,
}

/// How a MAC address was programmed for a port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MacResource {
    /// A unicast MAC table entry.
    Address,
    /// A multicast group subscription.
    MulticastListener,
}

/// Identifies a flow by table and host-visible flow id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    /// The table index.
    pub table: u32,
    /// The flow id chosen by the host.
    pub flow: u32,
}

/// A VF's record of a flow it owns in its PF's table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowMapEntry {
    /// The PF port owning the table.
    pub pf_port: u32,
    /// The flow id assigned by the switch.
    pub internal: u32,
}

/// Owner and switch id of a flow in a [`MailboxFlowTable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlowOwner {
    /// The flow id assigned by the switch.
    pub internal: u32,
    /// The port that created the flow.
    pub port: u32,
}

/// A flow table created by a PF, with the flows of the PF and its VFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxFlowTable {
    /// Switch-wide table index.
    pub table_index: u32,
    /// Table flags as requested by the host.
    pub flags: u8,
    /// Actions rules may take.
    pub action_mask: u32,
    by_match: BTreeMap<u32, FlowOwner>,
    by_internal: BTreeMap<u32, u32>,
}

impl MailboxFlowTable {
    /// Creates an empty table record.
    pub fn new(table_index: u32, flags: u8, action_mask: u32) -> Self {
        Self {
            table_index,
            flags,
            action_mask,
            by_match: BTreeMap::new(),
            by_internal: BTreeMap::new(),
        }
    }

    /// Records a flow.
    pub fn insert(&mut self, match_id: u32, owner: FlowOwner) {
        if let Some(old) = self.by_match.insert(match_id, owner) {
            self.by_internal.remove(&old.internal);
        }
        self.by_internal.insert(owner.internal, match_id);
    }

    /// Forgets a flow, returning its owner.
    pub fn remove(&mut self, match_id: u32) -> Option<FlowOwner> {
        let owner = self.by_match.remove(&match_id)?;
        self.by_internal.remove(&owner.internal);
        Some(owner)
    }

    /// Looks up a flow by its host-visible id.
    pub fn get(&self, match_id: u32) -> Option<&FlowOwner> {
        self.by_match.get(&match_id)
    }

    /// Translates a switch flow id back into the host-visible id.
    pub fn match_id(&self, internal: u32) -> Option<u32> {
        self.by_internal.get(&internal).copied()
    }

    /// Iterates over `(match id, owner)` in host-visible id order.
    pub fn flows(&self) -> impl Iterator<Item = (u32, FlowOwner)> + '_ {
        self.by_match.iter().map(|(&id, &owner)| (id, owner))
    }

    /// Number of flows in the table.
    pub fn len(&self) -> usize {
        self.by_match.len()
    }

    /// Returns true if the table holds no flows.
    pub fn is_empty(&self) -> bool {
        self.by_match.is_empty()
    }
}

/// Identifies an inner/outer MAC filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InnerOuterMacKey {
    /// Outer destination MAC.
    pub outer_mac: MacAddress,
    /// Inner destination MAC.
    pub inner_mac: MacAddress,
    /// Tunnel network identifier.
    pub vni: u32,
    /// Outer L4 destination port.
    pub outer_l4_port: u16,
    /// Tunnel encapsulation.
    pub tunnel_type: TunnelType,
}

/// What was programmed for an inner/outer MAC filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InnerOuterMacResource {
    /// The ACL rule id.
    pub rule: u32,
    /// The multicast group joined for a multicast inner MAC.
    pub listener: Option<MacVlanKey>,
}

/// Resources created on behalf of one logical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxResources {
    /// The PEP the port belongs to.
    pub pep: u32,
    /// PF or VF.
    pub kind: PortKind,
    /// The PF port of the same PEP.
    pub pf_port: u32,
    /// Flood lists the port is a member of.
    pub flood: FloodKinds,
    /// MAC table entries and multicast subscriptions.
    pub mac: BTreeMap<MacVlanKey, MacResource>,
    /// Flow tables, only ever populated for a PF.
    pub flow_tables: BTreeMap<u32, MailboxFlowTable>,
    /// Flows a VF owns in its PF's tables.
    pub flow_map: BTreeMap<FlowKey, FlowMapEntry>,
    /// Inner/outer MAC filters.
    pub inner_outer_mac: BTreeMap<InnerOuterMacKey, InnerOuterMacResource>,
}

impl MailboxResources {
    /// Creates an empty record.
    pub fn new(pep: u32, kind: PortKind, pf_port: u32) -> Self {
        Self {
            pep,
            kind,
            pf_port,
            flood: FloodKinds::empty(),
            mac: BTreeMap::new(),
            flow_tables: BTreeMap::new(),
            flow_map: BTreeMap::new(),
            inner_outer_mac: BTreeMap::new(),
        }
    }

    /// Returns true if nothing needs releasing.
    pub fn is_empty(&self) -> bool {
        self.flood.is_empty()
            && self.mac.is_empty()
            && self.flow_tables.is_empty()
            && self.flow_map.is_empty()
            && self.inner_outer_mac.is_empty()
    }
}

/// Per-PEP reference counts of ports listening to each flood kind.
///
/// A PEP is added to the flood port mask when its count goes from 0 to 1 and
/// removed when it drops back to 0.
#[derive(Debug, Clone)]
pub struct FloodCounters {
    counts: Vec<[u32; 3]>,
}

fn slot(kind: FloodKind) -> usize {
    match kind {
        FloodKind::Unicast => 0,
        FloodKind::Multicast => 1,
        FloodKind::Broadcast => 2,
    }
}

impl FloodCounters {
    /// Creates zeroed counters for `num_peps` PEPs.
    pub fn new(num_peps: usize) -> Self {
        Self {
            counts: vec![[0; 3]; num_peps],
        }
    }

    /// Returns the number of listening ports.
    pub fn get(&self, pep: u32, kind: FloodKind) -> u32 {
        self.counts
            .get(pep as usize)
            .map_or(0, |counts| counts[slot(kind)])
    }

    /// Counts a new listener. Returns true if it is the first.
    pub fn acquire(&mut self, pep: u32, kind: FloodKind) -> Result<bool, MailboxError> {
        let count = self
            .counts
            .get_mut(pep as usize)
            .ok_or(MailboxError::InvalidArgument("pep out of range"))?;
        let count = &mut count[slot(kind)];
        *count += 1;
        Ok(*count == 1)
    }

    /// Uncounts a listener. Returns true if it was the last.
    pub fn release(&mut self, pep: u32, kind: FloodKind) -> Result<bool, MailboxError> {
        let count = self
            .counts
            .get_mut(pep as usize)
            .ok_or(MailboxError::InvalidArgument("pep out of range"))?;
        let count = &mut count[slot(kind)];
        if *count == 0 {
            tracing::warn!(pep, ?kind, "flood listener count underflow");
            return Ok(false);
        }
        *count -= 1;
        Ok(*count == 0)
    }
}

/// Allocator of ACL rule ids.
#[derive(Debug, Clone)]
pub struct RuleIdAllocator {
    words: Vec<u64>,
    capacity: u32,
    used: u32,
}

impl RuleIdAllocator {
    /// Creates an allocator of ids `0..capacity`.
    pub fn new(capacity: u32) -> Self {
        Self {
            words: vec![0; (capacity as usize).div_ceil(64)],
            capacity,
            used: 0,
        }
    }

    /// Allocates the lowest free id.
    pub fn allocate(&mut self) -> Option<u32> {
        let (index, word) = self
            .words
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;
        let bit = word.trailing_ones();
        let id = index as u32 * 64 + bit;
        if id >= self.capacity {
            return None;
        }
        *word |= 1 << bit;
        self.used += 1;
        Some(id)
    }

    /// Frees `id`. Returns false if it was not allocated.
    pub fn release(&mut self, id: u32) -> bool {
        let Some(word) = self.words.get_mut(id as usize / 64) else {
            return false;
        };
        let mask = 1 << (id % 64);
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        self.used -= 1;
        true
    }

    /// Returns true if no id is allocated.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

/// All mailbox state of a switch, guarded by the mailbox lock.
#[derive(Debug)]
pub struct MailboxInfo {
    pub(crate) resources: BTreeMap<u32, MailboxResources>,
    pub(crate) flood: FloodCounters,
    pub(crate) acl_rules: RuleIdAllocator,
    pub(crate) vf_counts: Vec<u16>,
}

impl MailboxInfo {
    /// Creates empty state for a switch.
    pub fn new(config: &MailboxConfig) -> Self {
        Self {
            resources: BTreeMap::new(),
            flood: FloodCounters::new(config.num_peps),
            acl_rules: RuleIdAllocator::new(config.acl_rule_capacity),
            vf_counts: vec![0; config.num_peps],
        }
    }

    /// Returns the resources tracked for `port`.
    pub fn resources(&self, port: u32) -> Option<&MailboxResources> {
        self.resources.get(&port)
    }

    /// Returns the number of ports on `pep` listening to `kind` floods.
    pub fn flood_listeners(&self, pep: u32, kind: FloodKind) -> u32 {
        self.flood.get(pep, kind)
    }

    /// Returns the number of VFs the host enabled on `pep`.
    pub fn vf_count(&self, pep: u32) -> u16 {
        self.vf_counts.get(pep as usize).copied().unwrap_or(0)
    }

    /// Returns the resource record of `port`, creating it if needed.
    pub(crate) fn resources_mut(
        &mut self,
        port: u32,
        pep: u32,
        kind: PortKind,
        pf_port: u32,
    ) -> &mut MailboxResources {
        self.resources
            .entry(port)
            .or_insert_with(|| MailboxResources::new(pep, kind, pf_port))
    }
}
