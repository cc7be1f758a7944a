// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-pass mailbox state.

use crate::MailboxConfig;
use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::resources::MailboxInfo;
use switch_mailbox_protocol::GLOBAL_MAILBOX;
use switch_mailbox_protocol::GlobalMailbox;

/// A doorbell raised to the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Doorbell {
    /// The SM consumed requests or changed its control word.
    RequestRead,
    /// The SM published response data.
    ResponseSent,
}

/// Everything a mailbox pass for one PEP operates on.
///
/// Constructed while holding the switch state lock and the mailbox info
/// lock; borrowing both guarantees a pass cannot outlive them.
pub(crate) struct MailboxContext<'a, B> {
    pub backend: &'a B,
    pub config: &'a MailboxConfig,
    pub info: &'a mut MailboxInfo,
    pub pep: u32,
}

impl<'a, B: SwitchBackend> MailboxContext<'a, B> {
    pub fn new(
        backend: &'a B,
        config: &'a MailboxConfig,
        info: &'a mut MailboxInfo,
        pep: u32,
    ) -> Self {
        Self {
            backend,
            config,
            info,
            pep,
        }
    }

    pub fn read_register(&self, addr: u32) -> Result<u32, MailboxError> {
        self.backend
            .read_pep(self.pep, addr)
            .map_err(|source| MailboxError::Register {
                pep: self.pep,
                addr,
                source,
            })
    }

    pub fn write_register(&self, addr: u32, value: u32) -> Result<(), MailboxError> {
        tracing::trace!(pep = self.pep, addr, value, "mailbox write");
        self.backend
            .write_pep(self.pep, addr, value)
            .map_err(|source| MailboxError::Register {
                pep: self.pep,
                addr,
                source,
            })
    }

    pub fn read_doorbell(&self) -> Result<GlobalMailbox, MailboxError> {
        Ok(self.read_register(GLOBAL_MAILBOX)?.into())
    }

    pub fn write_doorbell(&self, value: GlobalMailbox) -> Result<(), MailboxError> {
        self.write_register(GLOBAL_MAILBOX, value.into())
    }

    /// Raises the PF ack doorbell.
    ///
    /// Both doorbells share the one PF ack bit; the host tells them apart by
    /// rereading the SM control word.
    pub fn signal(&self, doorbell: Doorbell) -> Result<(), MailboxError> {
        tracing::trace!(pep = self.pep, ?doorbell, "raising doorbell");
        let value = self.read_doorbell()?.with_pf_ack(true);
        self.write_doorbell(value)
    }

    /// Consumes a pending ack interrupt, returning whether there was one.
    pub fn take_ack(&self) -> Result<bool, MailboxError> {
        let value = self.read_doorbell()?;
        if !value.ack_interrupt() {
            return Ok(false);
        }
        self.write_doorbell(value.with_ack_interrupt(false))?;
        Ok(true)
    }

    /// Polls for an ack from the host, within the configured retry budget.
    pub fn wait_for_ack(&self) -> Result<bool, MailboxError> {
        for attempt in 0..self.config.ack_retries {
            if self.take_ack()? {
                return Ok(true);
            }
            if attempt + 1 < self.config.ack_retries {
                std::thread::sleep(self.config.ack_poll_delay);
            }
        }
        Ok(false)
    }
}
