// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::response::MailboxResponse;
use crate::response::build_port_map_response;
use switch_mailbox_protocol::messages::LportRange;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub(crate) fn map_logical_ports(&self) -> Result<MailboxResponse, MailboxError> {
        let map = self.backend.pep_port_map(self.pep)?;
        Ok(build_port_map_response(map))
    }

    /// Checks that every glort of `range` belongs to this PEP.
    fn check_range(&self, range: &LportRange) -> Result<(), MailboxError> {
        let map = self.backend.pep_port_map(self.pep)?;
        let end = range
            .first_glort
            .checked_add(range.count)
            .ok_or(MailboxError::InvalidArgument("glort range overflows"))?;
        if !(range.first_glort..end).all(|glort| map.contains(glort)) {
            return Err(MailboxError::InvalidArgument("glort outside of pep range"));
        }
        Ok(())
    }

    pub(crate) fn create_logical_ports(&mut self, range: &LportRange) -> Result<(), MailboxError> {
        self.check_range(range)?;
        self.backend
            .create_logical_ports(self.pep, range.first_glort, range.count)?;
        for glort in range.first_glort..range.first_glort + range.count {
            let port = self.backend.glort_to_port(glort)?;
            self.port_resources(port)?;
        }
        tracing::debug!(
            pep = self.pep,
            first_glort = range.first_glort,
            count = range.count,
            "created logical ports"
        );
        Ok(())
    }

    pub(crate) fn delete_logical_ports(&mut self, range: &LportRange) -> Result<(), MailboxError> {
        self.check_range(range)?;
        for glort in range.first_glort..range.first_glort + range.count {
            let port = self.backend.glort_to_port(glort)?;
            self.delete_virtual_port(port);
            self.backend.free_logical_port(port)?;
        }
        tracing::debug!(
            pep = self.pep,
            first_glort = range.first_glort,
            count = range.count,
            "deleted logical ports"
        );
        Ok(())
    }
}
