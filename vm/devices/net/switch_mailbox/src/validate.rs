// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Version negotiation and index validation.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::Doorbell;
use crate::context::MailboxContext;
use crate::header::ControlHeader;
use crate::header::HeaderUpdate;
use crate::queue::is_valid_index;
use switch_mailbox_protocol::MIN_INDEX;
use switch_mailbox_protocol::MailboxErrorType;
use switch_mailbox_protocol::MailboxVersion;

/// Whether the two sides agree on a protocol version.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SyncState {
    Unsynchronized,
    Synchronized,
}

/// Decides the outcome of version negotiation without touching hardware.
///
/// May update `header` in place. Returns the resulting state and, when
/// unsynchronized, the error to signal to the host.
pub(crate) fn negotiate_versions(header: &mut ControlHeader) -> (SyncState, MailboxErrorType) {
    match (header.pf_version, header.sm_version) {
        (MailboxVersion::RESET, _) => {
            header.sm_version = MailboxVersion::RESET;
            (SyncState::Unsynchronized, MailboxErrorType::NONE)
        }
        (MailboxVersion::DEFAULT, MailboxVersion::RESET) => {
            header.sm_version = header.pf_version;
            header.sm_error = MailboxErrorType::NONE;
            header.req_head = MIN_INDEX;
            header.resp_tail = MIN_INDEX;
            (SyncState::Synchronized, MailboxErrorType::NONE)
        }
        (pf, sm) if pf == sm => (SyncState::Synchronized, MailboxErrorType::NONE),
        _ => {
            header.sm_version = MailboxVersion::RESET;
            (SyncState::Unsynchronized, MailboxErrorType::INVALID_VERSION)
        }
    }
}

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Negotiates the protocol version with the host.
    ///
    /// An unsynchronized outcome is published to the host, which is expected
    /// to reset its side and try again.
    pub fn negotiate(&self, header: &mut ControlHeader) -> Result<SyncState, MailboxError> {
        let previous = header.sm_version;
        let (state, error) = negotiate_versions(header);
        match state {
            SyncState::Unsynchronized => {
                tracing::debug!(
                    pep = self.pep,
                    pf_version = ?header.pf_version,
                    ?error,
                    "mailbox versions not synchronized"
                );
                header.sm_error = error;
                self.write_control_header(header, HeaderUpdate::VERSION | HeaderUpdate::ERROR)?;
                self.signal(Doorbell::RequestRead)?;
            }
            SyncState::Synchronized if previous == MailboxVersion::RESET => {
                tracing::info!(
                    pep = self.pep,
                    version = ?header.sm_version,
                    "mailbox version negotiated"
                );
                self.write_control_header(header, HeaderUpdate::all())?;
            }
            SyncState::Synchronized => {}
        }
        Ok(state)
    }

    /// Verifies that every queue index in `header` is in range.
    ///
    /// On failure the SM falls back to the reset version and reports an
    /// invalid index, forcing the host to renegotiate. The request head is
    /// written back either way.
    pub fn validate_bounds(&self, header: &mut ControlHeader) -> Result<(), MailboxError> {
        let valid = [
            header.req_head,
            header.req_tail,
            header.resp_head,
            header.resp_tail,
        ]
        .into_iter()
        .all(is_valid_index);

        let result = if valid {
            Ok(())
        } else {
            tracing::warn!(
                pep = self.pep,
                req_head = header.req_head,
                req_tail = header.req_tail,
                resp_head = header.resp_head,
                resp_tail = header.resp_tail,
                "mailbox queue index out of range"
            );
            header.sm_version = MailboxVersion::RESET;
            header.sm_error = MailboxErrorType::INVALID_INDEX;
            self.write_control_header(header, HeaderUpdate::VERSION | HeaderUpdate::ERROR)
                .and(Err(MailboxError::InvalidValue("queue index out of range")))
        };

        if let Err(err) = self.write_control_header(header, HeaderUpdate::REQUEST_HEAD) {
            tracing::debug!(
                pep = self.pep,
                error = &err as &dyn std::error::Error,
                "failed to publish request head"
            );
        }
        result
    }
}
