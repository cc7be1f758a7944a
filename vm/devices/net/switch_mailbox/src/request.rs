// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request decoding.

use crate::MailboxError;
use switch_mailbox_protocol::MessageHeader;
use switch_mailbox_protocol::MessageType;
use switch_mailbox_protocol::messages::FlowDelete;
use switch_mailbox_protocol::messages::FlowEntry;
use switch_mailbox_protocol::messages::FlowQuery;
use switch_mailbox_protocol::messages::FlowTableCreate;
use switch_mailbox_protocol::messages::FlowTableIndex;
use switch_mailbox_protocol::messages::HostConfig;
use switch_mailbox_protocol::messages::InnerOuterMacFilter;
use switch_mailbox_protocol::messages::LportRange;
use switch_mailbox_protocol::messages::MacForwardRule;
use switch_mailbox_protocol::messages::PacketTimestamp;
use switch_mailbox_protocol::messages::PvidUpdate;
use switch_mailbox_protocol::messages::TimestampModeRequest;
use switch_mailbox_protocol::messages::VfCount;
use switch_mailbox_protocol::messages::XcastModes;
use switch_mailbox_protocol::read_payload;
use zerocopy::FromBytes;

/// A decoded request.
#[expect(missing_docs)] // variants are named after their message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxRequest {
    /// Echo the body back.
    Test(Vec<u32>),
    XcastModes(XcastModes),
    UpdateMacForwardRule(MacForwardRule),
    LportMap,
    LportCreate(LportRange),
    LportDelete(LportRange),
    UpdatePvid(PvidUpdate),
    Config(HostConfig),
    GetHwPlatform,
    DeliverPacketTimestamp(PacketTimestamp),
    SetTimestampMode(TimestampModeRequest),
    MasterClockOffset,
    FilterInnerOuterMac(InnerOuterMacFilter),
    CreateFlowTable(FlowTableCreate),
    DeleteFlowTable(FlowTableIndex),
    GetTables,
    SetFlow(FlowEntry),
    GetRules(FlowQuery),
    DeleteFlow(FlowDelete),
    SetVfCount(VfCount),
    /// A message type this switch does not implement.
    Unknown(MessageType),
}

/// Reads the single argument of a request.
fn argument<T: FromBytes>(message: MessageHeader, body: &[u32]) -> Result<T, MailboxError> {
    if usize::from(message.length()) < size_of::<T>() {
        return Err(MailboxError::InvalidArgument("request argument too short"));
    }
    read_payload(body).ok_or(MailboxError::InvalidArgument("request argument too short"))
}

impl MailboxRequest {
    /// Decodes the request framed by `message`, whose body is `body`.
    pub fn decode(message: MessageHeader, body: &[u32]) -> Result<Self, MailboxError> {
        let request = match message.message_type() {
            MessageType::TEST => Self::Test(body.to_vec()),
            MessageType::XCAST_MODES => Self::XcastModes(argument(message, body)?),
            MessageType::UPDATE_MAC_FWD_RULE => {
                Self::UpdateMacForwardRule(argument(message, body)?)
            }
            MessageType::LPORT_MAP => Self::LportMap,
            MessageType::LPORT_CREATE => Self::LportCreate(argument(message, body)?),
            MessageType::LPORT_DELETE => Self::LportDelete(argument(message, body)?),
            MessageType::UPDATE_PVID => Self::UpdatePvid(argument(message, body)?),
            MessageType::CONFIG => Self::Config(argument(message, body)?),
            MessageType::GET_HW_PLATFORM => Self::GetHwPlatform,
            MessageType::DELIVER_PACKET_TIMESTAMP => {
                Self::DeliverPacketTimestamp(argument(message, body)?)
            }
            MessageType::SET_TIMESTAMP_MODE => Self::SetTimestampMode(argument(message, body)?),
            MessageType::MASTER_CLK_OFFSET => Self::MasterClockOffset,
            MessageType::FILTER_INNER_OUTER_MAC => {
                Self::FilterInnerOuterMac(argument(message, body)?)
            }
            MessageType::CREATE_FLOW_TABLE => Self::CreateFlowTable(argument(message, body)?),
            MessageType::DELETE_FLOW_TABLE => Self::DeleteFlowTable(argument(message, body)?),
            MessageType::GET_TABLES => Self::GetTables,
            MessageType::SET_FLOW => Self::SetFlow(argument(message, body)?),
            MessageType::GET_RULES => Self::GetRules(argument(message, body)?),
            MessageType::DELETE_FLOW => Self::DeleteFlow(argument(message, body)?),
            MessageType::SET_NO_OF_VFS => Self::SetVfCount(argument(message, body)?),
            other => Self::Unknown(other),
        };
        Ok(request)
    }
}
