// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Circular queue index arithmetic and queue entry I/O.
//!
//! Both queues hold `MAILBOX_QUEUE_SIZE - MIN_INDEX` usable slots at indices
//! `MIN_INDEX..MAILBOX_QUEUE_SIZE`. Indices wrap from the last slot back to
//! `MIN_INDEX`, never to the control row. A queue with `head == tail` is
//! empty.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::header::ControlHeader;
use switch_mailbox_protocol::ENTRY_BYTES;
use switch_mailbox_protocol::MAILBOX_QUEUE_SIZE;
use switch_mailbox_protocol::MIN_INDEX;
use switch_mailbox_protocol::MessageHeader;
use switch_mailbox_protocol::request_queue_addr;
use switch_mailbox_protocol::response_queue_addr;

const SLOTS: u16 = MAILBOX_QUEUE_SIZE - MIN_INDEX;

/// Returns true if `index` addresses a data slot.
pub fn is_valid_index(index: u16) -> bool {
    (MIN_INDEX..MAILBOX_QUEUE_SIZE).contains(&index)
}

/// Returns the slot after `index`.
pub fn increment(index: u16) -> u16 {
    if index + 1 >= MAILBOX_QUEUE_SIZE {
        MIN_INDEX
    } else {
        index + 1
    }
}

/// Returns the slot before `index`.
pub fn decrement(index: u16) -> u16 {
    if index <= MIN_INDEX {
        MAILBOX_QUEUE_SIZE - 1
    } else {
        index - 1
    }
}

/// Number of occupied slots between `head` and `tail`.
///
/// Stays below `SLOTS` even for out-of-range indices, which callers reject
/// separately.
pub fn used_elements(head: u16, tail: u16) -> u16 {
    (i32::from(tail) - i32::from(head)).rem_euclid(i32::from(SLOTS)) as u16
}

/// Number of free slots between `tail` and `head`.
///
/// Always `SLOTS - used_elements(head, tail)`, so a queue can never be
/// distinguished from full when every slot is written. Producers keep one
/// slot unused.
pub fn empty_elements(head: u16, tail: u16) -> u16 {
    SLOTS - used_elements(head, tail)
}

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Reads the request entry at the head and advances the head.
    pub fn read_request(&self, header: &mut ControlHeader) -> Result<u32, MailboxError> {
        if header.req_head == header.req_tail {
            return Err(MailboxError::InvalidValue("request queue is empty"));
        }
        let value = self.read_register(request_queue_addr(header.req_head))?;
        header.req_head = increment(header.req_head);
        Ok(value)
    }

    /// Writes a response entry at the tail and advances the tail.
    pub fn write_response(&self, header: &mut ControlHeader, value: u32) -> Result<(), MailboxError> {
        self.write_register(response_queue_addr(header.resp_tail), value)?;
        header.resp_tail = increment(header.resp_tail);
        Ok(())
    }

    /// Reads the body of the message whose header was just consumed.
    pub fn read_message_body(
        &self,
        header: &mut ControlHeader,
        message: MessageHeader,
    ) -> Result<Vec<u32>, MailboxError> {
        let queued = usize::from(used_elements(header.req_head, header.req_tail)) * ENTRY_BYTES;
        if usize::from(message.length()) > queued {
            tracing::warn!(
                pep = self.pep,
                message_type = ?message.message_type(),
                length = message.length(),
                queued,
                "message length exceeds queued data"
            );
            return Err(MailboxError::InvalidValue("message length exceeds queued data"));
        }
        (0..message.body_entries())
            .map(|_| self.read_request(header))
            .collect()
    }
}
