// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire definitions for the switch manager PEP mailbox.
//!
//! Every PCIe endpoint (PEP) owns a block of mailbox registers: a request
//! queue written by the host, a response queue written by the switch manager
//! (SM), and a doorbell register. Row 0 of each queue holds that side's
//! control word; data entries start at [`MIN_INDEX`].
//!
//! All multi-byte payload fields are little endian. Payloads are carried as
//! a sequence of 32-bit queue entries; a payload whose length is not a
//! multiple of four bytes is zero padded in its last entry.

#![forbid(unsafe_code)]

#[macro_use]
mod macros;
pub mod messages;

use bitfield_struct::bitfield;
use bitflags::bitflags;
use static_assertions::const_assert;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Number of entries in each queue, including the control row.
pub const MAILBOX_QUEUE_SIZE: u16 = 128;
/// The first index usable for data. Index 0 holds the control word.
pub const MIN_INDEX: u16 = 1;
/// Size of one queue entry in bytes.
pub const ENTRY_BYTES: usize = 4;
/// Largest value of the `length` field of a message or argument header.
pub const MAX_MESSAGE_LENGTH: u16 = (1 << 12) - 1;

// A fragment filling the whole queue must still be describable.
const_assert!((MAILBOX_QUEUE_SIZE - MIN_INDEX) as usize * ENTRY_BYTES <= MAX_MESSAGE_LENGTH as usize);

/// Word address of request queue entry 0 (the host control word).
pub const REQUEST_QUEUE_BASE: u32 = 0x000;
/// Word address of response queue entry 0 (the SM control word).
pub const RESPONSE_QUEUE_BASE: u32 = 0x080;
/// Word address of the doorbell register.
pub const GLOBAL_MAILBOX: u32 = 0x100;

/// Returns the register address of request queue entry `index`.
pub const fn request_queue_addr(index: u16) -> u32 {
    REQUEST_QUEUE_BASE + index as u32
}

/// Returns the register address of response queue entry `index`.
pub const fn response_queue_addr(index: u16) -> u32 {
    RESPONSE_QUEUE_BASE + index as u32
}

/// Register holding the host control word.
pub const PF_CONTROL_HEADER: u32 = request_queue_addr(0);
/// Register holding the SM control word.
pub const SM_CONTROL_HEADER: u32 = response_queue_addr(0);

wire_enum! {
    /// Protocol version advertised in a control word.
    pub enum MailboxVersion: u8 {
        /// Not yet negotiated.
        RESET = 0,
        DEFAULT = 1,
    }
}

impl MailboxVersion {
    const fn from_bits(bits: u32) -> Self {
        Self(bits as u8)
    }

    const fn into_bits(self) -> u32 {
        self.0 as u32
    }
}

wire_enum! {
    /// Error condition signaled to the peer in a control word.
    pub enum MailboxErrorType: u8 {
        NONE = 0,
        INVALID_VERSION = 1,
        INVALID_INDEX = 2,
    }
}

impl MailboxErrorType {
    const fn from_bits(bits: u32) -> Self {
        Self(bits as u8)
    }

    const fn into_bits(self) -> u32 {
        self.0 as u32
    }
}

/// The SM half of the control header, stored in response queue row 0.
#[bitfield(u32)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SmHeader {
    #[bits(8)]
    pub version: MailboxVersion,
    #[bits(8)]
    pub error: MailboxErrorType,
    /// Request queue consumer index, advanced by the SM.
    #[bits(8)]
    pub request_head: u16,
    /// Response queue producer index, advanced by the SM.
    #[bits(8)]
    pub response_tail: u16,
}

/// The host half of the control header, stored in request queue row 0.
#[bitfield(u32)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PfHeader {
    #[bits(8)]
    pub version: MailboxVersion,
    #[bits(8)]
    pub error: MailboxErrorType,
    /// Request queue producer index, advanced by the host.
    #[bits(8)]
    pub request_tail: u16,
    /// Response queue consumer index, advanced by the host.
    #[bits(8)]
    pub response_head: u16,
}

/// The doorbell register shared by both sides.
#[bitfield(u32)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct GlobalMailbox {
    /// Host to SM: a message was posted to the request queue.
    pub request_interrupt: bool,
    /// A response fragment was consumed by the peer.
    pub ack_interrupt: bool,
    /// SM to host: the SM control word changed.
    pub pf_ack: bool,
    /// Mailbox interrupts are armed.
    pub interrupt_enable: bool,
    #[bits(28)]
    _reserved: u32,
}

bitflags! {
    /// Framing flags of a message header.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MessageFlags: u8 {
        /// The header starts a valid transaction.
        const TRANSACTION = 1 << 0;
        /// First fragment of a message.
        const START = 1 << 1;
        /// Last fragment of a message.
        const END = 1 << 2;
    }
}

wire_enum! {
    /// Identifies a request or response message.
    pub enum MessageType: u16 {
        TEST = 0x01,
        XCAST_MODES = 0x02,
        UPDATE_MAC_FWD_RULE = 0x03,
        LPORT_MAP = 0x04,
        LPORT_CREATE = 0x05,
        LPORT_DELETE = 0x06,
        UPDATE_PVID = 0x07,
        CONFIG = 0x08,
        GET_HW_PLATFORM = 0x09,
        DELIVER_PACKET_TIMESTAMP = 0x0a,
        SET_TIMESTAMP_MODE = 0x0b,
        MASTER_CLK_OFFSET = 0x0c,
        FILTER_INNER_OUTER_MAC = 0x0d,
        CREATE_FLOW_TABLE = 0x0e,
        DELETE_FLOW_TABLE = 0x0f,
        GET_TABLES = 0x10,
        SET_FLOW = 0x11,
        GET_RULES = 0x12,
        DELETE_FLOW = 0x13,
        SET_NO_OF_VFS = 0x14,
        ERROR = 0x20,
    }
}

impl MessageType {
    const fn from_bits(bits: u32) -> Self {
        Self(bits as u16)
    }

    const fn into_bits(self) -> u32 {
        self.0 as u32
    }
}

wire_enum! {
    /// Identifies the payload announced by an argument header.
    pub enum ArgumentType: u16 {
        TEST_MESSAGE = 0x01,
        PORT_MAP = 0x02,
        PVID_UPDATE = 0x03,
        HW_PLATFORM = 0x04,
        PACKET_TIMESTAMP = 0x05,
        TIMESTAMP_MODE_RESP = 0x06,
        MASTER_CLK_OFFSET = 0x07,
        TABLE_LIST = 0x08,
        FLOW_ENTRY = 0x09,
        ERROR = 0x0a,
    }
}

impl ArgumentType {
    const fn from_bits(bits: u32) -> Self {
        Self(bits as u16)
    }

    const fn into_bits(self) -> u32 {
        self.0 as u32
    }
}

/// Header word preceding every message.
#[bitfield(u32)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MessageHeader {
    #[bits(16)]
    pub message_type: MessageType,
    #[bits(4)]
    raw_flags: u8,
    /// Byte length of the message body, excluding this header.
    #[bits(12)]
    pub length: u16,
}

impl MessageHeader {
    /// Returns the framing flags. Unknown bits are dropped.
    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_truncate(self.raw_flags())
    }

    /// Returns the header with `flags` set.
    pub fn with_flags(self, flags: MessageFlags) -> Self {
        self.with_raw_flags(flags.bits())
    }

    /// Number of queue entries occupied by the body.
    pub fn body_entries(&self) -> u16 {
        self.length().div_ceil(ENTRY_BYTES as u16)
    }
}

/// Header word announcing one argument payload of a response.
///
/// Shares the message header layout; the flags nibble is unused.
#[bitfield(u32)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ArgumentHeader {
    #[bits(16)]
    pub argument_type: ArgumentType,
    #[bits(4)]
    _reserved: u8,
    /// Byte length of the argument payload, excluding this header.
    #[bits(12)]
    pub length: u16,
}

wire_enum! {
    /// Status carried in an error response.
    pub enum MailboxStatus: u32 {
        SUCCESS = 0,
        INVALID_VALUE = 1,
        INVALID_ARGUMENT = 2,
        NO_MEMORY = 3,
        NOT_FOUND = 4,
        NO_MORE = 5,
        UNSUPPORTED = 6,
        SWITCH_NOT_UP = 7,
        FAILED = 8,
    }
}

/// Packs a payload struct into queue entries, zero padding the last one.
pub fn payload_words<T: IntoBytes + Immutable + ?Sized>(value: &T) -> Vec<u32> {
    bytes_to_words(value.as_bytes())
}

/// Packs a byte string into queue entries, zero padding the last one.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(ENTRY_BYTES)
        .map(|chunk| {
            let mut word = [0; ENTRY_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Unpacks queue entries into their byte representation.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Reads a payload struct from the front of `words`.
///
/// Returns `None` if `words` is too short to hold a `T`.
pub fn read_payload<T: FromBytes>(words: &[u32]) -> Option<T> {
    let bytes = words_to_bytes(words);
    T::read_from_prefix(&bytes).ok().map(|(value, _)| value)
}
