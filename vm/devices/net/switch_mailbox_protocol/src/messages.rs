// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Argument and response payloads.
//!
//! Each request message carries exactly one of these payloads directly after
//! its message header. Responses carry one after an [`ArgumentHeader`].
//!
//! [`ArgumentHeader`]: crate::ArgumentHeader

#![expect(missing_docs)] // fields are self-explanatory

use crate::ENTRY_BYTES;
use crate::MailboxStatus;
use crate::MessageType;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// A MAC address in wire byte order.
pub type MacAddress = [u8; 6];

/// Returns true if `mac` is a multicast (or broadcast) address.
pub fn is_multicast(mac: &MacAddress) -> bool {
    mac[0] & 1 != 0
}

wire_enum! {
    /// Flooding behavior requested for a virtual port.
    pub enum XcastMode: u8 {
        NONE = 0,
        MULTI = 1,
        ALLMULTI = 2,
        PROMISC = 3,
    }
}

wire_enum! {
    /// Add or remove a table entry.
    pub enum RuleAction: u8 {
        ADD = 1,
        DELETE = 2,
    }
}

wire_enum! {
    pub enum TunnelType: u8 {
        NONE = 0,
        VXLAN = 1,
        NGE = 2,
    }
}

wire_enum! {
    pub enum TimestampMode: u16 {
        NONE = 0,
        EGRESS = 1,
        ALL = 2,
    }
}

wire_enum! {
    /// Hardware engine backing a flow table.
    pub enum FlowTableType: u8 {
        TCAM = 0,
        TE = 1,
        BST = 2,
    }
}

wire_enum! {
    pub enum HostConfigAttribute: u32 {
        MAX_FRAME_SIZE = 1,
        DEFAULT_VLAN_PRIORITY = 2,
        RX_TRUNCATION = 3,
    }
}

/// `XCAST_MODES` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct XcastModes {
    pub glort: u16,
    pub mode: XcastMode,
    pub reserved: u8,
}

/// `UPDATE_MAC_FWD_RULE` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MacForwardRule {
    pub mac: MacAddress,
    pub vlan: u16,
    pub glort: u16,
    pub action: RuleAction,
    pub flags: u8,
}

/// `LPORT_MAP` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PortMap {
    pub glort_value: u16,
    pub glort_mask: u16,
}

impl PortMap {
    /// Returns true if `glort` lies inside the mapped range.
    pub fn contains(&self, glort: u16) -> bool {
        glort & self.glort_mask == self.glort_value & self.glort_mask
    }
}

/// `LPORT_CREATE` and `LPORT_DELETE` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LportRange {
    pub first_glort: u16,
    pub count: u16,
}

/// `UPDATE_PVID` request and response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PvidUpdate {
    pub glort: u16,
    pub pvid: u16,
}

/// `CONFIG` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct HostConfig {
    pub attribute: HostConfigAttribute,
    pub value: u32,
}

/// `GET_HW_PLATFORM` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct HwPlatform {
    pub platform: u32,
}

/// `DELIVER_PACKET_TIMESTAMP` request and response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PacketTimestamp {
    pub sglort: u16,
    pub dglort: u16,
    pub reserved: u32,
    pub egress_time: u64,
    pub ingress_time: u64,
}

/// `SET_TIMESTAMP_MODE` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TimestampModeRequest {
    pub glort: u16,
    pub mode: TimestampMode,
}

/// `SET_TIMESTAMP_MODE` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TimestampModeResponse {
    pub glort: u16,
    pub max_mode: TimestampMode,
    pub status: MailboxStatus,
}

/// `MASTER_CLK_OFFSET` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MasterClockOffset {
    pub offset: u64,
}

/// `FILTER_INNER_OUTER_MAC` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InnerOuterMacFilter {
    pub outer_mac: MacAddress,
    pub inner_mac: MacAddress,
    pub vni: u32,
    pub glort: u16,
    pub outer_l4_port: u16,
    pub tunnel_type: TunnelType,
    pub action: RuleAction,
    pub reserved: u16,
}

/// `CREATE_FLOW_TABLE` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FlowTableCreate {
    pub table_index: u16,
    pub table_type: FlowTableType,
    pub flags: u8,
    pub num_entries: u32,
    pub condition_mask: u64,
    pub action_mask: u32,
    pub reserved: u32,
}

/// `DELETE_FLOW_TABLE` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FlowTableIndex {
    pub table_index: u16,
    pub reserved: u16,
}

/// One entry of a `GET_TABLES` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TableListEntry {
    pub table_index: u16,
    pub table_type: FlowTableType,
    pub flags: u8,
    pub num_entries: u32,
    pub action_mask: u32,
    pub reserved: u32,
}

/// `SET_FLOW` request, and one entry of a `GET_RULES` response.
///
/// `flow_id` is the identifier chosen by the host.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FlowEntry {
    pub table_index: u16,
    pub priority: u16,
    pub flow_id: u32,
    pub glort: u16,
    pub reserved: u16,
    pub action: u32,
    pub condition: u64,
    pub condition_value: [u8; 16],
    pub action_param: u32,
    pub reserved2: u32,
}

/// `GET_RULES` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FlowQuery {
    pub table_index: u16,
    pub glort: u16,
}

/// `DELETE_FLOW` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FlowDelete {
    pub table_index: u16,
    pub glort: u16,
    pub flow_id: u32,
}

/// `SET_NO_OF_VFS` request.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VfCount {
    pub count: u16,
    pub reserved: u16,
}

/// `ERROR` response.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ErrorResponse {
    pub status: MailboxStatus,
    pub request_type: MessageType,
    pub reserved: u16,
}

/// Queue entries per `GET_TABLES` response entry.
pub const TABLE_ENTRY_WORDS: usize = size_of::<TableListEntry>() / ENTRY_BYTES;
/// Queue entries per `GET_RULES` response entry.
pub const FLOW_ENTRY_WORDS: usize = size_of::<FlowEntry>() / ENTRY_BYTES;

const_assert_eq!(size_of::<XcastModes>(), 4);
const_assert_eq!(size_of::<MacForwardRule>(), 12);
const_assert_eq!(size_of::<PacketTimestamp>(), 24);
const_assert_eq!(size_of::<TimestampModeResponse>(), 8);
const_assert_eq!(size_of::<InnerOuterMacFilter>(), 24);
const_assert_eq!(size_of::<FlowTableCreate>(), 24);
const_assert_eq!(size_of::<TableListEntry>(), 16);
const_assert_eq!(size_of::<FlowEntry>(), 48);
const_assert_eq!(size_of::<ErrorResponse>(), 8);
