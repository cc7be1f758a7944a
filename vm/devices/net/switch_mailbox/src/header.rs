// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The mailbox control header.
//!
//! The control header is split over two registers: the SM word in response
//! queue row 0, written only by the SM, and the PF word in request queue
//! row 0, written only by the host. The SM updates fields of its word
//! selectively so that it never publishes a field it has not finished
//! changing.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::queue::is_valid_index;
use bitflags::bitflags;
use switch_mailbox_protocol::MailboxErrorType;
use switch_mailbox_protocol::MailboxVersion;
use switch_mailbox_protocol::PF_CONTROL_HEADER;
use switch_mailbox_protocol::PfHeader;
use switch_mailbox_protocol::SM_CONTROL_HEADER;
use switch_mailbox_protocol::SmHeader;

bitflags! {
    /// Fields of the SM control word to publish.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct HeaderUpdate: u8 {
        /// The SM version.
        const VERSION = 1 << 0;
        /// The SM error type.
        const ERROR = 1 << 1;
        /// The request queue head.
        const REQUEST_HEAD = 1 << 2;
        /// The response queue tail.
        const RESPONSE_TAIL = 1 << 3;
    }
}

/// Both halves of the control header, decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlHeader {
    /// Version advertised by the SM.
    pub sm_version: MailboxVersion,
    /// Error advertised by the SM.
    pub sm_error: MailboxErrorType,
    /// Version advertised by the host.
    pub pf_version: MailboxVersion,
    /// Error advertised by the host.
    pub pf_error: MailboxErrorType,
    /// Request queue consumer index.
    pub req_head: u16,
    /// Request queue producer index.
    pub req_tail: u16,
    /// Response queue consumer index.
    pub resp_head: u16,
    /// Response queue producer index.
    pub resp_tail: u16,
}

impl ControlHeader {
    /// Decodes the two control words.
    pub fn parse(sm: SmHeader, pf: PfHeader) -> Self {
        Self {
            sm_version: sm.version(),
            sm_error: sm.error(),
            pf_version: pf.version(),
            pf_error: pf.error(),
            req_head: sm.request_head(),
            req_tail: pf.request_tail(),
            resp_head: pf.response_head(),
            resp_tail: sm.response_tail(),
        }
    }

    /// Reloads the host-owned fields from a fresh PF word.
    pub fn refresh_host_fields(&mut self, pf: PfHeader) {
        self.pf_version = pf.version();
        self.pf_error = pf.error();
        self.req_tail = pf.request_tail();
        self.resp_head = pf.response_head();
    }

    /// Builds a new SM word from `base`, replacing the fields in `update`.
    ///
    /// Fails if an index being published is out of range.
    pub fn build(&self, update: HeaderUpdate, base: SmHeader) -> Result<SmHeader, MailboxError> {
        let mut sm = base;
        if update.contains(HeaderUpdate::VERSION) {
            sm.set_version(self.sm_version);
        }
        if update.contains(HeaderUpdate::ERROR) {
            sm.set_error(self.sm_error);
        }
        if update.contains(HeaderUpdate::REQUEST_HEAD) {
            if !is_valid_index(self.req_head) {
                return Err(MailboxError::InvalidValue("request head out of range"));
            }
            sm.set_request_head(self.req_head);
        }
        if update.contains(HeaderUpdate::RESPONSE_TAIL) {
            if !is_valid_index(self.resp_tail) {
                return Err(MailboxError::InvalidValue("response tail out of range"));
            }
            sm.set_response_tail(self.resp_tail);
        }
        Ok(sm)
    }

    /// Encodes the host-owned fields as a PF word.
    pub fn pf_word(&self) -> PfHeader {
        PfHeader::new()
            .with_version(self.pf_version)
            .with_error(self.pf_error)
            .with_request_tail(self.req_tail)
            .with_response_head(self.resp_head)
    }
}

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub fn read_control_header(&self) -> Result<ControlHeader, MailboxError> {
        let sm = SmHeader::from(self.read_register(SM_CONTROL_HEADER)?);
        let pf = PfHeader::from(self.read_register(PF_CONTROL_HEADER)?);
        Ok(ControlHeader::parse(sm, pf))
    }

    /// Rereads the PF word to pick up host progress.
    pub fn refresh_host_header(&self, header: &mut ControlHeader) -> Result<(), MailboxError> {
        let pf = PfHeader::from(self.read_register(PF_CONTROL_HEADER)?);
        header.refresh_host_fields(pf);
        Ok(())
    }

    /// Publishes the fields of `header` named by `update`.
    pub fn write_control_header(
        &self,
        header: &ControlHeader,
        update: HeaderUpdate,
    ) -> Result<(), MailboxError> {
        let base = SmHeader::from(self.read_register(SM_CONTROL_HEADER)?);
        let sm = header.build(update, base)?;
        self.write_register(SM_CONTROL_HEADER, sm.into())
    }
}
