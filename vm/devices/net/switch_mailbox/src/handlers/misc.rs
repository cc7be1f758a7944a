// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Port, host and clock settings.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::response::MailboxResponse;
use crate::response::build_hw_platform_response;
use crate::response::build_master_clock_offset_response;
use crate::response::build_packet_timestamp_response;
use crate::response::build_pvid_update_response;
use crate::response::build_timestamp_mode_response;
use switch_mailbox_protocol::MailboxStatus;
use switch_mailbox_protocol::messages::HostConfig;
use switch_mailbox_protocol::messages::PacketTimestamp;
use switch_mailbox_protocol::messages::PvidUpdate;
use switch_mailbox_protocol::messages::TimestampModeRequest;
use switch_mailbox_protocol::messages::VfCount;

/// Largest valid VLAN id.
const MAX_VLAN: u16 = 4095;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub(crate) fn update_pvid(&self, arg: &PvidUpdate) -> Result<MailboxResponse, MailboxError> {
        if arg.pvid > MAX_VLAN {
            return Err(MailboxError::InvalidArgument("pvid"));
        }
        let port = self.port_for_glort(arg.glort)?;
        self.backend.set_pvid(port, arg.pvid)?;
        Ok(build_pvid_update_response(arg.glort, arg.pvid))
    }

    pub(crate) fn apply_host_config(&self, arg: &HostConfig) -> Result<(), MailboxError> {
        if arg.attribute.name().is_none() {
            return Err(MailboxError::InvalidArgument("host config attribute"));
        }
        self.backend
            .apply_host_config(self.pep, arg.attribute, arg.value)
    }

    pub(crate) fn get_hw_platform(&self) -> Result<MailboxResponse, MailboxError> {
        Ok(build_hw_platform_response(self.backend.hardware_platform()?))
    }

    pub(crate) fn deliver_packet_timestamp(
        &self,
        arg: &PacketTimestamp,
    ) -> Result<MailboxResponse, MailboxError> {
        self.port_for_glort(arg.sglort)?;
        let timestamp = self.backend.deliver_packet_timestamp(self.pep, arg)?;
        Ok(build_packet_timestamp_response(&timestamp))
    }

    pub(crate) fn set_timestamp_mode(
        &self,
        arg: &TimestampModeRequest,
    ) -> Result<MailboxResponse, MailboxError> {
        if arg.mode.name().is_none() {
            return Err(MailboxError::InvalidArgument("timestamp mode"));
        }
        let port = self.port_for_glort(arg.glort)?;
        let max_mode = self.backend.set_timestamp_mode(port, arg.mode)?;
        Ok(build_timestamp_mode_response(
            arg.glort,
            max_mode,
            MailboxStatus::SUCCESS,
        ))
    }

    pub(crate) fn master_clock_offset(&self) -> Result<MailboxResponse, MailboxError> {
        Ok(build_master_clock_offset_response(
            self.backend.master_clock_offset()?,
        ))
    }

    pub(crate) fn set_vf_count(&mut self, arg: &VfCount) -> Result<(), MailboxError> {
        self.backend.set_vf_count(self.pep, arg.count)?;
        if let Some(count) = self.info.vf_counts.get_mut(self.pep as usize) {
            *count = arg.count;
        }
        tracing::info!(pep = self.pep, count = arg.count, "vf count changed");
        Ok(())
    }
}
