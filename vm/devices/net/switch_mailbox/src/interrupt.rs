// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mailbox interrupt servicing.

use crate::MailboxEngine;
use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;

impl<B: SwitchBackend> MailboxEngine<B> {
    /// Services a mailbox interrupt from `pep`.
    ///
    /// Interrupts that arrive while the switch is not up are dropped; the
    /// host retries once the switch comes up.
    pub fn handle_interrupt(&self, pep: u32) -> Result<(), MailboxError> {
        match self.with_context(pep, |ctx| ctx.service_interrupt()) {
            Err(MailboxError::SwitchNotUp) => {
                tracing::debug!(pep, "dropping mailbox interrupt, switch is not up");
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    pep,
                    error = &err as &dyn std::error::Error,
                    "mailbox interrupt failed"
                );
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }
}

impl<B: SwitchBackend> MailboxContext<'_, B> {
    fn service_interrupt(&mut self) -> Result<(), MailboxError> {
        let doorbell = self.read_doorbell()?;
        let request = doorbell.request_interrupt();
        if doorbell.ack_interrupt() && !request {
            tracing::trace!(pep = self.pep, "stray fragment ack");
        }
        self.write_doorbell(
            doorbell
                .with_interrupt_enable(false)
                .with_request_interrupt(false)
                .with_ack_interrupt(false),
        )?;

        let result = if request {
            self.process_requests()
        } else {
            Ok(())
        };
        self.rearm_interrupts()?;
        result
    }

    /// Re-enables mailbox interrupts once the PEP link is out of reset.
    ///
    /// A link that stays in reset is left with interrupts disabled; the PEP
    /// is reinitialized when the link comes back.
    fn rearm_interrupts(&self) -> Result<(), MailboxError> {
        for attempt in 0..=self.config.reset_retries {
            let in_reset = self
                .backend
                .pep_in_reset(self.pep)
                .map_err(MailboxError::Backend)?;
            if !in_reset {
                let doorbell = self.read_doorbell()?;
                return self.write_doorbell(doorbell.with_interrupt_enable(true));
            }
            if attempt < self.config.reset_retries {
                std::thread::sleep(self.config.reset_poll_delay);
            }
        }
        tracing::warn!(pep = self.pep, "pep link still in reset, leaving mailbox interrupts disabled");
        Ok(())
    }
}
