// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use switch_mailbox_protocol::MailboxStatus;
use thiserror::Error;

/// Errors returned by the mailbox engine and its collaborators.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// Malformed or out-of-range queue state or argument.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    /// Unrecognized message or argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An allocation failed while building a response.
    #[error("out of memory building {0}")]
    NoMemory(&'static str),
    /// A tracked resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A resource pool is exhausted.
    #[error("no more {0} available")]
    NoMore(&'static str),
    /// The feature is not present on this hardware.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    /// The switch is transitioning between states.
    #[error("switch is not up")]
    SwitchNotUp,
    /// A mailbox register access failed.
    #[error("register access failed, pep {pep} address {addr:#x}")]
    Register {
        /// The endpoint being accessed.
        pep: u32,
        /// The register address.
        addr: u32,
        /// The failure reported by the register primitive.
        #[source]
        source: anyhow::Error,
    },
    /// A collaborator failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl MailboxError {
    /// Returns the status reported to the host in an error response.
    pub fn status(&self) -> MailboxStatus {
        match self {
            MailboxError::InvalidValue(_) => MailboxStatus::INVALID_VALUE,
            MailboxError::InvalidArgument(_) => MailboxStatus::INVALID_ARGUMENT,
            MailboxError::NoMemory(_) => MailboxStatus::NO_MEMORY,
            MailboxError::NotFound(_) => MailboxStatus::NOT_FOUND,
            MailboxError::NoMore(_) => MailboxStatus::NO_MORE,
            MailboxError::Unsupported(_) => MailboxStatus::UNSUPPORTED,
            MailboxError::SwitchNotUp => MailboxStatus::SWITCH_NOT_UP,
            MailboxError::Register { .. } | MailboxError::Backend(_) => MailboxStatus::FAILED,
        }
    }
}
