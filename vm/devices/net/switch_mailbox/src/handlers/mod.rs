// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request handlers.
//!
//! Each handler applies one request to the switch through the backend,
//! records what it created in the resource tracker, and returns the
//! response to send, if the request has one.

mod filter;
mod flow;
mod lport;
mod mac;
mod misc;

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::request::MailboxRequest;
use crate::resources::MailboxResources;
use crate::resources::PortKind;
use crate::response::MailboxResponse;
use crate::response::build_test_response;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Applies `request`.
    pub fn handle_request(
        &mut self,
        request: MailboxRequest,
    ) -> Result<Option<MailboxResponse>, MailboxError> {
        let response = match request {
            MailboxRequest::Test(words) => Some(build_test_response(&words)),
            MailboxRequest::XcastModes(arg) => {
                self.set_xcast_modes(&arg)?;
                None
            }
            MailboxRequest::UpdateMacForwardRule(arg) => {
                self.update_mac_forwarding_rule(&arg)?;
                None
            }
            MailboxRequest::LportMap => Some(self.map_logical_ports()?),
            MailboxRequest::LportCreate(arg) => {
                self.create_logical_ports(&arg)?;
                None
            }
            MailboxRequest::LportDelete(arg) => {
                self.delete_logical_ports(&arg)?;
                None
            }
            MailboxRequest::UpdatePvid(arg) => Some(self.update_pvid(&arg)?),
            MailboxRequest::Config(arg) => {
                self.apply_host_config(&arg)?;
                None
            }
            MailboxRequest::GetHwPlatform => Some(self.get_hw_platform()?),
            MailboxRequest::DeliverPacketTimestamp(arg) => {
                Some(self.deliver_packet_timestamp(&arg)?)
            }
            MailboxRequest::SetTimestampMode(arg) => Some(self.set_timestamp_mode(&arg)?),
            MailboxRequest::MasterClockOffset => Some(self.master_clock_offset()?),
            MailboxRequest::FilterInnerOuterMac(arg) => {
                self.filter_inner_outer_mac(&arg)?;
                None
            }
            MailboxRequest::CreateFlowTable(arg) => {
                self.create_flow_table(&arg)?;
                None
            }
            MailboxRequest::DeleteFlowTable(arg) => {
                self.delete_flow_table(&arg)?;
                None
            }
            MailboxRequest::GetTables => Some(self.get_tables()?),
            MailboxRequest::SetFlow(arg) => {
                self.set_flow(&arg)?;
                None
            }
            MailboxRequest::GetRules(arg) => Some(self.get_rules(&arg)?),
            MailboxRequest::DeleteFlow(arg) => {
                self.delete_flow(&arg)?;
                None
            }
            MailboxRequest::SetVfCount(arg) => {
                self.set_vf_count(&arg)?;
                None
            }
            MailboxRequest::Unknown(message_type) => {
                tracing::debug!(pep = self.pep, ?message_type, "unknown mailbox request");
                return Err(MailboxError::InvalidArgument("unknown message type"));
            }
        };
        Ok(response)
    }

    /// Translates a glort supplied by the host, which must belong to the
    /// requesting PEP.
    fn port_for_glort(&self, glort: u16) -> Result<u32, MailboxError> {
        let map = self.backend.pep_port_map(self.pep)?;
        if !map.contains(glort) {
            tracing::debug!(pep = self.pep, glort, "glort outside of pep range");
            return Err(MailboxError::InvalidArgument("glort outside of pep range"));
        }
        self.backend.glort_to_port(glort)
    }

    /// Returns the resource record of `port` on this PEP, creating it if
    /// needed.
    fn port_resources(&mut self, port: u32) -> Result<&mut MailboxResources, MailboxError> {
        let pf_port = self.backend.pf_port(self.pep)?;
        let kind = if port == pf_port {
            PortKind::Pf
        } else {
            PortKind::Vf
        };
        Ok(self.info.resources_mut(port, self.pep, kind, pf_port))
    }
}
