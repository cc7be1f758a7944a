// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Number of PEPs on a switch, including the management PEP.
pub const DEFAULT_NUM_PEPS: usize = 9;
/// Polls of the doorbell register while waiting for a fragment ack.
pub const DEFAULT_ACK_RETRIES: u32 = 100;
/// Polls of the link state before giving up on re-arming interrupts.
pub const DEFAULT_RESET_RETRIES: u32 = 10;

/// Configuration of a switch's mailbox engine.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Number of PEPs serviced by this switch.
    pub num_peps: usize,
    /// The PEP of the management host, which also sees the switch's
    /// source flow tables.
    pub management_pep: u32,
    /// Echo requests back verbatim instead of interpreting them.
    pub loopback: bool,
    /// Number of times to poll for a fragment ack.
    pub ack_retries: u32,
    /// Delay between fragment ack polls.
    pub ack_poll_delay: Duration,
    /// Number of times to poll for the PEP link to leave reset.
    pub reset_retries: u32,
    /// Delay between link reset polls.
    pub reset_poll_delay: Duration,
    /// ACL shared by all inner/outer MAC filters.
    pub inner_outer_mac_acl: u32,
    /// Number of rule ids available in that ACL.
    pub acl_rule_capacity: u32,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            num_peps: DEFAULT_NUM_PEPS,
            management_pep: DEFAULT_NUM_PEPS as u32 - 1,
            loopback: false,
            ack_retries: DEFAULT_ACK_RETRIES,
            ack_poll_delay: Duration::from_millis(1),
            reset_retries: DEFAULT_RESET_RETRIES,
            reset_poll_delay: Duration::from_millis(10),
            inner_outer_mac_acl: 20000,
            acl_rule_capacity: 1024,
        }
    }
}
