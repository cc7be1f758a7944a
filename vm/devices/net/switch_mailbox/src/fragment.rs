// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Response framing and fragmentation.
//!
//! A response is sent as one or more fragments. Every fragment carries a
//! message header and an argument header followed by a chunk of the
//! payload. The first fragment is flagged `START` and the last `END`. When
//! the response queue cannot hold the rest of the payload, the SM publishes
//! what it has written and waits for the host to ack the fragment before
//! continuing. If the host never acks, the response is truncated.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::Doorbell;
use crate::context::MailboxContext;
use crate::header::ControlHeader;
use crate::header::HeaderUpdate;
use crate::queue::empty_elements;
use crate::queue::is_valid_index;
use crate::response::MailboxResponse;
use switch_mailbox_protocol::ArgumentHeader;
use switch_mailbox_protocol::ArgumentType;
use switch_mailbox_protocol::ENTRY_BYTES;
use switch_mailbox_protocol::MAX_MESSAGE_LENGTH;
use switch_mailbox_protocol::MessageFlags;
use switch_mailbox_protocol::MessageHeader;
use switch_mailbox_protocol::MessageType;

/// Queue entries taken by the message and argument headers of a fragment.
pub const FRAGMENT_HEADER_ENTRIES: usize = 2;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Sends `response`, returning the number of payload entries delivered.
    pub fn send_response(
        &self,
        header: &mut ControlHeader,
        response: &MailboxResponse,
    ) -> Result<usize, MailboxError> {
        self.write_response_data(
            header,
            response.message_type,
            response.argument_type,
            &response.words,
            MessageFlags::TRANSACTION,
        )
    }

    /// Writes `entries` to the response queue, fragmenting as needed.
    ///
    /// Returns the number of entries delivered, which is short of
    /// `entries.len()` only if the host stopped acking fragments.
    pub fn write_response_data(
        &self,
        header: &mut ControlHeader,
        message_type: MessageType,
        argument_type: ArgumentType,
        entries: &[u32],
        flags: MessageFlags,
    ) -> Result<usize, MailboxError> {
        self.check_response_indices(header)?;
        let total = entries.len();
        let mut written = 0;
        loop {
            let remaining = total - written;
            // One slot always stays free so a full queue is not mistaken
            // for an empty one.
            let free = usize::from(empty_elements(header.resp_head, header.resp_tail)) - 1;
            if free < FRAGMENT_HEADER_ENTRIES + remaining.min(1) {
                if !self.wait_for_host(header)? {
                    tracing::warn!(
                        pep = self.pep,
                        ?message_type,
                        written,
                        total,
                        "response queue full, truncating response"
                    );
                    break;
                }
                continue;
            }

            let chunk = remaining.min(free - FRAGMENT_HEADER_ENTRIES);
            let mut fragment_flags = flags;
            if written == 0 {
                fragment_flags |= MessageFlags::START;
            }
            if chunk == remaining {
                fragment_flags |= MessageFlags::END;
            }
            self.write_fragment(
                header,
                message_type,
                argument_type,
                &entries[written..written + chunk],
                fragment_flags,
            )?;
            written += chunk;
            if written == total {
                break;
            }

            tracing::trace!(pep = self.pep, ?message_type, written, total, "fragment sent");
            self.write_control_header(header, HeaderUpdate::RESPONSE_TAIL)?;
            self.signal(Doorbell::ResponseSent)?;
            if !self.wait_for_host(header)? {
                tracing::warn!(
                    pep = self.pep,
                    ?message_type,
                    written,
                    total,
                    "no fragment ack from host, truncating response"
                );
                break;
            }
        }

        self.write_control_header(
            header,
            HeaderUpdate::RESPONSE_TAIL | HeaderUpdate::REQUEST_HEAD,
        )?;
        self.signal(Doorbell::ResponseSent)?;
        Ok(written)
    }

    fn write_fragment(
        &self,
        header: &mut ControlHeader,
        message_type: MessageType,
        argument_type: ArgumentType,
        chunk: &[u32],
        flags: MessageFlags,
    ) -> Result<(), MailboxError> {
        let payload_bytes = u16::try_from(chunk.len() * ENTRY_BYTES)
            .ok()
            .filter(|&bytes| bytes <= MAX_MESSAGE_LENGTH - ENTRY_BYTES as u16)
            .ok_or(MailboxError::InvalidValue("fragment too long"))?;
        let message = MessageHeader::new()
            .with_message_type(message_type)
            .with_flags(flags)
            .with_length(payload_bytes + ENTRY_BYTES as u16);
        let argument = ArgumentHeader::new()
            .with_argument_type(argument_type)
            .with_length(payload_bytes);
        self.write_response(header, message.into())?;
        self.write_response(header, argument.into())?;
        for &entry in chunk {
            self.write_response(header, entry)?;
        }
        Ok(())
    }

    /// Waits for the host to ack, then picks up how far it has read.
    fn wait_for_host(&self, header: &mut ControlHeader) -> Result<bool, MailboxError> {
        if !self.wait_for_ack()? {
            return Ok(false);
        }
        self.refresh_host_header(header)?;
        self.check_response_indices(header)?;
        Ok(true)
    }

    fn check_response_indices(&self, header: &ControlHeader) -> Result<(), MailboxError> {
        if is_valid_index(header.resp_head) && is_valid_index(header.resp_tail) {
            return Ok(());
        }
        tracing::warn!(
            pep = self.pep,
            head = header.resp_head,
            tail = header.resp_tail,
            "response queue index out of range"
        );
        Err(MailboxError::InvalidValue("response queue index out of range"))
    }
}
