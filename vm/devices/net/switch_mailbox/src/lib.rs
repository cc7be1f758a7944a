// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The switch manager side of the PEP mailbox.
//!
//! Hosts attached to the switch's PCIe endpoints (PEPs) configure their
//! virtual ports by posting requests to a per-PEP mailbox. [`MailboxEngine`]
//! services those mailboxes: it negotiates the protocol version, drains and
//! decodes requests, applies them to the switch through a
//! [`SwitchBackend`](backend::SwitchBackend), tracks what it created on each
//! port's behalf, and sends (possibly fragmented) responses.
//!
//! All mailbox state of a switch is guarded by a single lock, taken after
//! the switch state lock. Requests are serviced only while the switch is up.

#![forbid(unsafe_code)]

pub mod backend;
mod config;
mod context;
mod dispatch;
mod error;
mod fragment;
mod handlers;
pub mod header;
mod interrupt;
pub mod queue;
pub mod request;
pub mod resources;
pub mod response;
mod teardown;
#[cfg(test)]
mod test_helpers;
mod validate;

pub use config::MailboxConfig;
pub use error::MailboxError;

use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::resources::MailboxInfo;
use parking_lot::Mutex;
use parking_lot::RwLock;
use switch_mailbox_protocol::ArgumentType;
use switch_mailbox_protocol::MessageFlags;
use switch_mailbox_protocol::MessageType;

/// Lifecycle state of the switch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SwitchState {
    /// Not initialized.
    #[default]
    Down,
    /// Initializing.
    Booting,
    /// Fully operational.
    Up,
    /// Shutting down.
    GoingDown,
}

/// Services the mailboxes of every PEP of one switch.
pub struct MailboxEngine<B> {
    backend: B,
    config: MailboxConfig,
    state: RwLock<SwitchState>,
    info: Mutex<MailboxInfo>,
}

impl<B: SwitchBackend> MailboxEngine<B> {
    /// Creates an engine for a switch that is not yet up.
    pub fn new(backend: B, config: MailboxConfig) -> Self {
        let info = MailboxInfo::new(&config);
        Self {
            backend,
            config,
            state: RwLock::new(SwitchState::Down),
            info: Mutex::new(info),
        }
    }

    /// Returns the switch backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Returns the switch state.
    pub fn switch_state(&self) -> SwitchState {
        *self.state.read()
    }

    /// Updates the switch state.
    pub fn set_switch_state(&self, state: SwitchState) {
        let mut current = self.state.write();
        tracing::info!(from = ?*current, to = ?state, "switch state change");
        *current = state;
    }

    /// Runs `f` on the mailbox state while holding both locks.
    pub fn with_info<R>(&self, f: impl FnOnce(&MailboxInfo) -> R) -> R {
        let _state = self.state.read();
        f(&*self.info.lock())
    }

    /// Runs `f` with a mailbox context for `pep`, failing if the switch is
    /// not up.
    fn with_context<R>(
        &self,
        pep: u32,
        f: impl FnOnce(&mut MailboxContext<'_, B>) -> Result<R, MailboxError>,
    ) -> Result<R, MailboxError> {
        if pep as usize >= self.config.num_peps {
            return Err(MailboxError::InvalidArgument("pep out of range"));
        }
        let state = self.state.read();
        if *state != SwitchState::Up {
            return Err(MailboxError::SwitchNotUp);
        }
        let mut info = self.info.lock();
        let mut ctx = MailboxContext::new(&self.backend, &self.config, &mut info, pep);
        f(&mut ctx)
    }

    /// Runs one mailbox pass for `pep`: negotiates the protocol version,
    /// then handles every queued request.
    pub fn process_requests(&self, pep: u32) -> Result<(), MailboxError> {
        self.with_context(pep, |ctx| ctx.process_requests())
    }

    /// Sends an unsolicited message to the host on `pep`.
    ///
    /// Returns the number of payload entries delivered, which is short of
    /// `payload.len()` if the host stopped acking fragments.
    pub fn build_and_send_response(
        &self,
        pep: u32,
        message_type: MessageType,
        argument_type: ArgumentType,
        payload: &[u32],
    ) -> Result<usize, MailboxError> {
        self.with_context(pep, |ctx| {
            let mut header = ctx.read_control_header()?;
            ctx.write_response_data(
                &mut header,
                message_type,
                argument_type,
                payload,
                MessageFlags::TRANSACTION,
            )
        })
    }

    /// Releases every switch resource created on behalf of logical `port`.
    ///
    /// Individual cleanup failures are logged and skipped.
    pub fn delete_virtual_port(&self, port: u32) -> Result<(), MailboxError> {
        let state = self.state.read();
        if *state != SwitchState::Up {
            return Err(MailboxError::SwitchNotUp);
        }
        let mut info = self.info.lock();
        let Some(pep) = info.resources(port).map(|resources| resources.pep) else {
            return Ok(());
        };
        MailboxContext::new(&self.backend, &self.config, &mut info, pep).delete_virtual_port(port);
        Ok(())
    }
}
