// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Response builders.
//!
//! Each builder produces the argument type and payload entries of one
//! response; framing and fragmentation happen when it is sent.

use crate::MailboxError;
use crate::backend::FlowTableInfo;
use crate::backend::FlowTables;
use crate::backend::LogicalPorts;
use crate::resources::MailboxFlowTable;
use switch_mailbox_protocol::ArgumentType;
use switch_mailbox_protocol::MailboxStatus;
use switch_mailbox_protocol::MessageType;
use switch_mailbox_protocol::messages::ErrorResponse;
use switch_mailbox_protocol::messages::FLOW_ENTRY_WORDS;
use switch_mailbox_protocol::messages::FlowEntry;
use switch_mailbox_protocol::messages::HwPlatform;
use switch_mailbox_protocol::messages::MasterClockOffset;
use switch_mailbox_protocol::messages::PacketTimestamp;
use switch_mailbox_protocol::messages::PortMap;
use switch_mailbox_protocol::messages::PvidUpdate;
use switch_mailbox_protocol::messages::TABLE_ENTRY_WORDS;
use switch_mailbox_protocol::messages::TableListEntry;
use switch_mailbox_protocol::messages::TimestampMode;
use switch_mailbox_protocol::messages::TimestampModeResponse;
use switch_mailbox_protocol::payload_words;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

/// A response ready to be sent to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxResponse {
    /// The message type, normally that of the request.
    pub message_type: MessageType,
    /// The argument type announced by the argument header.
    pub argument_type: ArgumentType,
    /// The argument payload.
    pub words: Vec<u32>,
}

impl MailboxResponse {
    fn new<T: IntoBytes + Immutable>(
        message_type: MessageType,
        argument_type: ArgumentType,
        payload: &T,
    ) -> Self {
        Self {
            message_type,
            argument_type,
            words: payload_words(payload),
        }
    }
}

/// Reports that a request of type `request_type` failed.
pub fn build_error_response(request_type: MessageType, status: MailboxStatus) -> MailboxResponse {
    let mut payload = ErrorResponse::new_zeroed();
    payload.status = status;
    payload.request_type = request_type;
    MailboxResponse::new(MessageType::ERROR, ArgumentType::ERROR, &payload)
}

/// Echoes a test message.
pub fn build_test_response(words: &[u32]) -> MailboxResponse {
    MailboxResponse {
        message_type: MessageType::TEST,
        argument_type: ArgumentType::TEST_MESSAGE,
        words: words.to_vec(),
    }
}

/// Reports the glort range of the requesting PEP.
pub fn build_port_map_response(map: PortMap) -> MailboxResponse {
    MailboxResponse::new(MessageType::LPORT_MAP, ArgumentType::PORT_MAP, &map)
}

/// Reports the default VLAN now in effect for a port.
pub fn build_pvid_update_response(glort: u16, pvid: u16) -> MailboxResponse {
    MailboxResponse::new(
        MessageType::UPDATE_PVID,
        ArgumentType::PVID_UPDATE,
        &PvidUpdate { glort, pvid },
    )
}

/// Reports the hardware platform.
pub fn build_hw_platform_response(platform: u32) -> MailboxResponse {
    MailboxResponse::new(
        MessageType::GET_HW_PLATFORM,
        ArgumentType::HW_PLATFORM,
        &HwPlatform { platform },
    )
}

/// Returns a delivered packet timestamp.
pub fn build_packet_timestamp_response(timestamp: &PacketTimestamp) -> MailboxResponse {
    MailboxResponse::new(
        MessageType::DELIVER_PACKET_TIMESTAMP,
        ArgumentType::PACKET_TIMESTAMP,
        timestamp,
    )
}

/// Reports the timestamp mode granted to a port.
pub fn build_timestamp_mode_response(
    glort: u16,
    max_mode: TimestampMode,
    status: MailboxStatus,
) -> MailboxResponse {
    MailboxResponse::new(
        MessageType::SET_TIMESTAMP_MODE,
        ArgumentType::TIMESTAMP_MODE_RESP,
        &TimestampModeResponse {
            glort,
            max_mode,
            status,
        },
    )
}

/// Reports the master clock offset.
pub fn build_master_clock_offset_response(offset: u64) -> MailboxResponse {
    MailboxResponse::new(
        MessageType::MASTER_CLK_OFFSET,
        ArgumentType::MASTER_CLK_OFFSET,
        &MasterClockOffset { offset },
    )
}

fn reserve_words(count: usize, what: &'static str) -> Result<Vec<u32>, MailboxError> {
    let mut words = Vec::new();
    words
        .try_reserve_exact(count)
        .map_err(|_| MailboxError::NoMemory(what))?;
    Ok(words)
}

fn table_list_entry(info: &FlowTableInfo, flags: u8, action_mask: u32) -> TableListEntry {
    let mut entry = TableListEntry::new_zeroed();
    entry.table_index = info.table_index as u16;
    entry.table_type = info.table_type;
    entry.flags = flags;
    entry.num_entries = info.num_entries;
    entry.action_mask = action_mask;
    entry
}

/// Lists the flow tables created by a PF, followed by `source_tables`.
pub fn build_table_list_response<'a>(
    tables: impl Iterator<Item = &'a MailboxFlowTable> + Clone,
    source_tables: &[FlowTableInfo],
    backend: &impl FlowTables,
) -> Result<MailboxResponse, MailboxError> {
    let count = tables.clone().count() + source_tables.len();
    let mut words = reserve_words(count * TABLE_ENTRY_WORDS, "table list")?;
    for table in tables {
        let info = backend.table_info(table.table_index)?;
        let entry = table_list_entry(&info, table.flags, table.action_mask);
        words.extend_from_slice(&payload_words(&entry));
    }
    for info in source_tables {
        let entry = table_list_entry(info, info.flags, info.action_mask);
        words.extend_from_slice(&payload_words(&entry));
    }
    Ok(MailboxResponse {
        message_type: MessageType::GET_TABLES,
        argument_type: ArgumentType::TABLE_LIST,
        words,
    })
}

/// Lists the flows of `table` visible to `viewer`, or every flow if
/// `viewer` is `None`. Flows are reported under their host-visible ids.
pub fn build_flow_list_response(
    table: &MailboxFlowTable,
    viewer: Option<u32>,
    backend: &(impl FlowTables + LogicalPorts),
) -> Result<MailboxResponse, MailboxError> {
    let visible = |port: u32| viewer.is_none_or(|viewer| viewer == port);
    let count = table.flows().filter(|(_, owner)| visible(owner.port)).count();
    let mut words = reserve_words(count * FLOW_ENTRY_WORDS, "flow list")?;
    for (_, owner) in table.flows().filter(|(_, owner)| visible(owner.port)) {
        let rule = backend.get_flow(table.table_index, owner.internal)?;
        let Some(flow_id) = table.match_id(owner.internal) else {
            continue;
        };
        let mut entry = FlowEntry::new_zeroed();
        entry.table_index = table.table_index as u16;
        entry.priority = rule.priority;
        entry.flow_id = flow_id;
        entry.glort = backend.port_to_glort(rule.port)?;
        entry.action = rule.action;
        entry.condition = rule.condition;
        entry.condition_value = rule.condition_value;
        entry.action_param = rule.action_param;
        words.extend_from_slice(&payload_words(&entry));
    }
    Ok(MailboxResponse {
        message_type: MessageType::GET_RULES,
        argument_type: ArgumentType::FLOW_ENTRY,
        words,
    })
}
