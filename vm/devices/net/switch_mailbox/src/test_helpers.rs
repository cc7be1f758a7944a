// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-memory switch and host for unit tests.
//!
//! The switch keeps a register file per PEP and records every call that
//! changes switch state. The host side can post requests, consume
//! responses, and optionally ack fragments as they are sent.
//!
//! PEP `n` owns glorts `(n + 1) << 8` through `((n + 1) << 8) + 0xff`, the
//! first of which is its PF. Logical port numbers equal glorts.

use crate::MailboxConfig;
use crate::MailboxError;
use crate::backend::AclCompiler;
use crate::backend::FloodKind;
use crate::backend::FlowRule;
use crate::backend::FlowTableConfig;
use crate::backend::FlowTableInfo;
use crate::backend::FlowTables;
use crate::backend::HostServices;
use crate::backend::InnerOuterMacRule;
use crate::backend::LogicalPorts;
use crate::backend::MacTable;
use crate::backend::MacVlanKey;
use crate::backend::MulticastGroups;
use crate::backend::PepRegisters;
use crate::context::MailboxContext;
use crate::queue::increment;
use crate::queue::is_valid_index;
use crate::resources::MailboxInfo;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;
use switch_mailbox_protocol::ArgumentHeader;
use switch_mailbox_protocol::GLOBAL_MAILBOX;
use switch_mailbox_protocol::GlobalMailbox;
use switch_mailbox_protocol::MIN_INDEX;
use switch_mailbox_protocol::MailboxVersion;
use switch_mailbox_protocol::MessageFlags;
use switch_mailbox_protocol::MessageHeader;
use switch_mailbox_protocol::MessageType;
use switch_mailbox_protocol::PF_CONTROL_HEADER;
use switch_mailbox_protocol::PfHeader;
use switch_mailbox_protocol::SM_CONTROL_HEADER;
use switch_mailbox_protocol::SmHeader;
use switch_mailbox_protocol::messages::HostConfigAttribute;
use switch_mailbox_protocol::messages::PacketTimestamp;
use switch_mailbox_protocol::messages::PortMap;
use switch_mailbox_protocol::messages::TimestampMode;
use switch_mailbox_protocol::messages::XcastMode;
use switch_mailbox_protocol::request_queue_addr;
use switch_mailbox_protocol::response_queue_addr;

pub(crate) const HW_PLATFORM: u32 = 0x6000;
pub(crate) const CLOCK_OFFSET: u64 = 0x1234_5678_9abc;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub(crate) fn test_config() -> MailboxConfig {
    MailboxConfig {
        ack_retries: 3,
        ack_poll_delay: Duration::ZERO,
        reset_retries: 3,
        reset_poll_delay: Duration::ZERO,
        ..Default::default()
    }
}

pub(crate) fn pf_glort(pep: u32) -> u16 {
    ((pep + 1) << 8) as u16
}

pub(crate) fn vf_glort(pep: u32, vf: u16) -> u16 {
    pf_glort(pep) + vf
}

/// Frames a complete request.
pub(crate) fn message(message_type: MessageType, length: u16, body: &[u32]) -> Vec<u32> {
    let header = MessageHeader::new()
        .with_message_type(message_type)
        .with_flags(MessageFlags::TRANSACTION | MessageFlags::START | MessageFlags::END)
        .with_length(length);
    std::iter::once(header.into())
        .chain(body.iter().copied())
        .collect()
}

/// A state-changing backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SetXcastMode(u32, XcastMode),
    AddFloodListener(FloodKind, u32),
    RemoveFloodListener(FloodKind, u32),
    SetPepFlood(u32, FloodKind, bool),
    AddListener(MacVlanKey, u32),
    DeleteListener(MacVlanKey, u32),
    AddMac(MacVlanKey, u32),
    DeleteMac(MacVlanKey),
    CreatePorts(u32, u16, u16),
    FreePort(u32),
    SetPvid(u32, u16),
    HostConfig(u32, HostConfigAttribute, u32),
    DeliverTimestamp(u32),
    SetTimestampMode(u32, TimestampMode),
    SetVfCount(u32, u16),
    CreateTable(u32),
    DeleteTable(u32),
    AddFlow(u32, u32),
    ModifyFlow(u32, u32),
    DeleteFlow(u32, u32),
    CreateAcl(u32),
    AddRule(u32, u32),
    DeleteRule(u32, u32),
    DeleteAcl(u32),
    CompileAcl,
}

/// One response fragment as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseMessage {
    pub header: MessageHeader,
    pub argument: ArgumentHeader,
    pub payload: Vec<u32>,
}

fn parse_responses(words: &[u32]) -> Vec<ResponseMessage> {
    let mut messages = Vec::new();
    let mut words = words.iter().copied();
    while let (Some(header), Some(argument)) = (words.next(), words.next()) {
        let header = MessageHeader::from(header);
        let argument = ArgumentHeader::from(argument);
        let entries = usize::from(argument.length()).div_ceil(4);
        let payload: Vec<u32> = words.by_ref().take(entries).collect();
        messages.push(ResponseMessage {
            header,
            argument,
            payload,
        });
    }
    messages
}

#[derive(Default)]
struct TestState {
    registers: HashMap<(u32, u32), u32>,
    calls: Vec<Call>,
    failures: HashSet<&'static str>,
    /// Hosts that consume responses on every doorbell, with the number of
    /// fragment acks they will still send (`None` for unlimited).
    auto_ack: HashMap<u32, Option<u32>>,
    received: HashMap<u32, Vec<ResponseMessage>>,
    reset_polls: HashMap<u32, u32>,
    tables: BTreeMap<u32, FlowTableInfo>,
    source_tables: Vec<FlowTableInfo>,
    flows: BTreeMap<(u32, u32), FlowRule>,
    next_flow: u32,
    max_timestamp_mode: TimestampMode,
    no_master_clock: bool,
}

impl TestState {
    fn read(&self, pep: u32, addr: u32) -> u32 {
        self.registers.get(&(pep, addr)).copied().unwrap_or(0)
    }

    fn write(&mut self, pep: u32, addr: u32, value: u32) {
        self.registers.insert((pep, addr), value);
    }

    fn check(&self, op: &'static str) -> Result<(), MailboxError> {
        if self.failures.contains(op) {
            return Err(anyhow::anyhow!("injected {op} failure").into());
        }
        Ok(())
    }

    fn record(&mut self, call: Call, op: &'static str) -> Result<(), MailboxError> {
        self.calls.push(call);
        self.check(op)
    }

    fn pending_response_words(&self, pep: u32) -> Vec<u32> {
        let sm = SmHeader::from(self.read(pep, SM_CONTROL_HEADER));
        let pf = PfHeader::from(self.read(pep, PF_CONTROL_HEADER));
        let mut words = Vec::new();
        if !is_valid_index(pf.response_head()) || !is_valid_index(sm.response_tail()) {
            return words;
        }
        let mut index = pf.response_head();
        while index != sm.response_tail() {
            words.push(self.read(pep, response_queue_addr(index)));
            index = increment(index);
        }
        words
    }

    fn consume(&mut self, pep: u32) -> Vec<ResponseMessage> {
        let words = self.pending_response_words(pep);
        if words.is_empty() {
            return Vec::new();
        }
        let sm = SmHeader::from(self.read(pep, SM_CONTROL_HEADER));
        let pf = PfHeader::from(self.read(pep, PF_CONTROL_HEADER));
        self.write(
            pep,
            PF_CONTROL_HEADER,
            pf.with_response_head(sm.response_tail()).into(),
        );
        parse_responses(&words)
    }

    /// The host's reaction to a doorbell write.
    fn host_doorbell(&mut self, pep: u32, mut value: GlobalMailbox) -> GlobalMailbox {
        let Some(&credits) = self.auto_ack.get(&pep) else {
            return value;
        };
        if !value.pf_ack() {
            return value;
        }
        value.set_pf_ack(false);
        let messages = self.consume(pep);
        let wants_more = messages
            .last()
            .is_some_and(|m| !m.header.flags().contains(MessageFlags::END));
        self.received.entry(pep).or_default().extend(messages);
        if wants_more && credits != Some(0) {
            value.set_ack_interrupt(true);
            self.auto_ack.insert(pep, credits.map(|c| c - 1));
        }
        value
    }
}

pub(crate) struct TestSwitch {
    state: Mutex<TestState>,
}

impl TestSwitch {
    pub fn new() -> Self {
        init_tracing();
        Self {
            state: Mutex::new(TestState {
                next_flow: 1000,
                max_timestamp_mode: TimestampMode::ALL,
                ..Default::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Makes every later call of backend method `op` fail.
    pub fn fail(&self, op: &'static str) {
        self.state.lock().failures.insert(op);
    }

    /// Brings the host side up with fresh indices, leaving the SM word
    /// untouched.
    pub fn host_reset(&self, pep: u32) {
        let pf = PfHeader::new()
            .with_version(MailboxVersion::DEFAULT)
            .with_request_tail(MIN_INDEX)
            .with_response_head(MIN_INDEX);
        self.state.lock().write(pep, PF_CONTROL_HEADER, pf.into());
    }

    /// Puts both sides in the negotiated state with empty queues.
    pub fn synchronize(&self, pep: u32) {
        self.synchronize_at(pep, MIN_INDEX, MIN_INDEX);
    }

    /// Puts both sides in the negotiated state with empty queues at the
    /// given positions.
    pub fn synchronize_at(&self, pep: u32, request_index: u16, response_index: u16) {
        let sm = SmHeader::new()
            .with_version(MailboxVersion::DEFAULT)
            .with_request_head(request_index)
            .with_response_tail(response_index);
        let pf = PfHeader::new()
            .with_version(MailboxVersion::DEFAULT)
            .with_request_tail(request_index)
            .with_response_head(response_index);
        let mut state = self.state.lock();
        state.write(pep, SM_CONTROL_HEADER, sm.into());
        state.write(pep, PF_CONTROL_HEADER, pf.into());
    }

    pub fn set_pf_header(&self, pep: u32, f: impl FnOnce(PfHeader) -> PfHeader) {
        let mut state = self.state.lock();
        let pf = f(PfHeader::from(state.read(pep, PF_CONTROL_HEADER)));
        state.write(pep, PF_CONTROL_HEADER, pf.into());
    }

    pub fn sm_header(&self, pep: u32) -> SmHeader {
        SmHeader::from(self.state.lock().read(pep, SM_CONTROL_HEADER))
    }

    pub fn doorbell(&self, pep: u32) -> GlobalMailbox {
        GlobalMailbox::from(self.state.lock().read(pep, GLOBAL_MAILBOX))
    }

    pub fn set_doorbell(&self, pep: u32, value: GlobalMailbox) {
        self.state.lock().write(pep, GLOBAL_MAILBOX, value.into());
    }

    /// Queues request entries and rings the request doorbell.
    pub fn post_request(&self, pep: u32, words: &[u32]) {
        let mut state = self.state.lock();
        let pf = PfHeader::from(state.read(pep, PF_CONTROL_HEADER));
        let mut tail = pf.request_tail();
        for &word in words {
            state.write(pep, request_queue_addr(tail), word);
            tail = increment(tail);
        }
        state.write(pep, PF_CONTROL_HEADER, pf.with_request_tail(tail).into());
        let doorbell = GlobalMailbox::from(state.read(pep, GLOBAL_MAILBOX));
        state.write(
            pep,
            GLOBAL_MAILBOX,
            doorbell.with_request_interrupt(true).into(),
        );
    }

    pub fn raise_ack(&self, pep: u32) {
        let mut state = self.state.lock();
        let doorbell = GlobalMailbox::from(state.read(pep, GLOBAL_MAILBOX));
        state.write(pep, GLOBAL_MAILBOX, doorbell.with_ack_interrupt(true).into());
    }

    /// Has the host consume responses whenever the SM rings, acking up to
    /// `credits` fragments.
    pub fn auto_ack(&self, pep: u32, credits: Option<u32>) {
        self.state.lock().auto_ack.insert(pep, credits);
    }

    /// Responses consumed by an auto-acking host.
    pub fn received(&self, pep: u32) -> Vec<ResponseMessage> {
        self.state
            .lock()
            .received
            .get(&pep)
            .cloned()
            .unwrap_or_default()
    }

    /// Consumes every published response.
    pub fn consume_responses(&self, pep: u32) -> Vec<ResponseMessage> {
        self.state.lock().consume(pep)
    }

    /// Returns the published response entries without consuming them.
    pub fn response_words(&self, pep: u32) -> Vec<u32> {
        self.state.lock().pending_response_words(pep)
    }

    /// Holds the PEP's link in reset for the next `polls` polls.
    pub fn set_in_reset(&self, pep: u32, polls: u32) {
        self.state.lock().reset_polls.insert(pep, polls);
    }

    pub fn add_table(&self, info: FlowTableInfo) {
        self.state.lock().tables.insert(info.table_index, info);
    }

    pub fn add_source_table(&self, info: FlowTableInfo) {
        self.state.lock().source_tables.push(info);
    }

    /// Adds a flow directly to the switch, returning its switch id.
    pub fn seed_flow(&self, table: u32, port: u32) -> u32 {
        let mut state = self.state.lock();
        let flow = state.next_flow;
        state.next_flow += 1;
        state.flows.insert(
            (table, flow),
            FlowRule {
                priority: 0,
                condition: 0,
                condition_value: [0; 16],
                action: 0,
                action_param: 0,
                port,
            },
        );
        flow
    }

    pub fn set_max_timestamp_mode(&self, mode: TimestampMode) {
        self.state.lock().max_timestamp_mode = mode;
    }

    /// Models a switch without a master clock.
    pub fn remove_master_clock(&self) {
        self.state.lock().no_master_clock = true;
    }
}

impl PepRegisters for TestSwitch {
    fn read_pep(&self, pep: u32, addr: u32) -> anyhow::Result<u32> {
        let state = self.state.lock();
        if state.failures.contains("read_pep") {
            anyhow::bail!("injected read failure");
        }
        Ok(state.read(pep, addr))
    }

    fn write_pep(&self, pep: u32, addr: u32, value: u32) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if state.failures.contains("write_pep") {
            anyhow::bail!("injected write failure");
        }
        let value = if addr == GLOBAL_MAILBOX {
            state.host_doorbell(pep, value.into()).into()
        } else {
            value
        };
        state.write(pep, addr, value);
        Ok(())
    }

    fn pep_in_reset(&self, pep: u32) -> anyhow::Result<bool> {
        let mut state = self.state.lock();
        let Some(polls) = state.reset_polls.get_mut(&pep) else {
            return Ok(false);
        };
        match *polls {
            0 => Ok(false),
            u32::MAX => Ok(true),
            _ => {
                *polls -= 1;
                Ok(true)
            }
        }
    }
}

impl LogicalPorts for TestSwitch {
    fn pep_port_map(&self, pep: u32) -> Result<PortMap, MailboxError> {
        Ok(PortMap {
            glort_value: pf_glort(pep),
            glort_mask: 0xff00,
        })
    }

    fn pf_port(&self, pep: u32) -> Result<u32, MailboxError> {
        Ok(u32::from(pf_glort(pep)))
    }

    fn glort_to_port(&self, glort: u16) -> Result<u32, MailboxError> {
        Ok(u32::from(glort))
    }

    fn port_to_glort(&self, port: u32) -> Result<u16, MailboxError> {
        u16::try_from(port).map_err(|_| MailboxError::NotFound("logical port"))
    }

    fn create_logical_ports(
        &self,
        pep: u32,
        first_glort: u16,
        count: u16,
    ) -> Result<(), MailboxError> {
        self.state.lock().record(
            Call::CreatePorts(pep, first_glort, count),
            "create_logical_ports",
        )
    }

    fn free_logical_port(&self, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::FreePort(port), "free_logical_port")
    }
}

impl HostServices for TestSwitch {
    fn set_xcast_mode(&self, port: u32, mode: XcastMode) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::SetXcastMode(port, mode), "set_xcast_mode")
    }

    fn set_pvid(&self, port: u32, pvid: u16) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::SetPvid(port, pvid), "set_pvid")
    }

    fn apply_host_config(
        &self,
        pep: u32,
        attribute: HostConfigAttribute,
        value: u32,
    ) -> Result<(), MailboxError> {
        self.state.lock().record(
            Call::HostConfig(pep, attribute, value),
            "apply_host_config",
        )
    }

    fn hardware_platform(&self) -> Result<u32, MailboxError> {
        self.state.lock().check("hardware_platform")?;
        Ok(HW_PLATFORM)
    }

    fn deliver_packet_timestamp(
        &self,
        pep: u32,
        timestamp: &PacketTimestamp,
    ) -> Result<PacketTimestamp, MailboxError> {
        self.state
            .lock()
            .record(Call::DeliverTimestamp(pep), "deliver_packet_timestamp")?;
        Ok(*timestamp)
    }

    fn set_timestamp_mode(
        &self,
        port: u32,
        mode: TimestampMode,
    ) -> Result<TimestampMode, MailboxError> {
        let mut state = self.state.lock();
        state.record(Call::SetTimestampMode(port, mode), "set_timestamp_mode")?;
        Ok(mode.min(state.max_timestamp_mode))
    }

    fn master_clock_offset(&self) -> Result<u64, MailboxError> {
        let state = self.state.lock();
        state.check("master_clock_offset")?;
        if state.no_master_clock {
            return Err(MailboxError::Unsupported("master clock"));
        }
        Ok(CLOCK_OFFSET)
    }

    fn set_vf_count(&self, pep: u32, count: u16) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::SetVfCount(pep, count), "set_vf_count")
    }
}

impl MulticastGroups for TestSwitch {
    fn add_flood_listener(&self, kind: FloodKind, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::AddFloodListener(kind, port), "add_flood_listener")
    }

    fn remove_flood_listener(&self, kind: FloodKind, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::RemoveFloodListener(kind, port), "remove_flood_listener")
    }

    fn set_pep_flood_membership(
        &self,
        pep: u32,
        kind: FloodKind,
        member: bool,
    ) -> Result<(), MailboxError> {
        self.state.lock().record(
            Call::SetPepFlood(pep, kind, member),
            "set_pep_flood_membership",
        )
    }

    fn add_listener(&self, group: MacVlanKey, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::AddListener(group, port), "add_listener")
    }

    fn delete_listener(&self, group: MacVlanKey, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::DeleteListener(group, port), "delete_listener")
    }
}

impl MacTable for TestSwitch {
    fn add_mac_entry(&self, key: MacVlanKey, port: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::AddMac(key, port), "add_mac_entry")
    }

    fn delete_mac_entry(&self, key: MacVlanKey) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::DeleteMac(key), "delete_mac_entry")
    }
}

impl FlowTables for TestSwitch {
    fn create_table(&self, table: u32, config: &FlowTableConfig) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        state.record(Call::CreateTable(table), "create_table")?;
        state.tables.insert(
            table,
            FlowTableInfo {
                table_index: table,
                table_type: config.table_type,
                flags: config.flags,
                num_entries: config.num_entries,
                action_mask: config.action_mask,
            },
        );
        Ok(())
    }

    fn delete_table(&self, table: u32) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        state.record(Call::DeleteTable(table), "delete_table")?;
        state.tables.remove(&table);
        state.flows.retain(|&(t, _), _| t != table);
        Ok(())
    }

    fn table_info(&self, table: u32) -> Result<FlowTableInfo, MailboxError> {
        self.state
            .lock()
            .tables
            .get(&table)
            .copied()
            .ok_or(MailboxError::NotFound("flow table"))
    }

    fn source_tables(&self) -> Result<Vec<FlowTableInfo>, MailboxError> {
        Ok(self.state.lock().source_tables.clone())
    }

    fn add_flow(&self, table: u32, rule: &FlowRule) -> Result<u32, MailboxError> {
        let mut state = self.state.lock();
        let flow = state.next_flow;
        state.record(Call::AddFlow(table, flow), "add_flow")?;
        state.next_flow += 1;
        state.flows.insert((table, flow), *rule);
        Ok(flow)
    }

    fn modify_flow(&self, table: u32, flow: u32, rule: &FlowRule) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        state.record(Call::ModifyFlow(table, flow), "modify_flow")?;
        let entry = state
            .flows
            .get_mut(&(table, flow))
            .ok_or(MailboxError::NotFound("flow"))?;
        *entry = *rule;
        Ok(())
    }

    fn delete_flow(&self, table: u32, flow: u32) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        state.record(Call::DeleteFlow(table, flow), "delete_flow")?;
        state.flows.remove(&(table, flow));
        Ok(())
    }

    fn get_flow(&self, table: u32, flow: u32) -> Result<FlowRule, MailboxError> {
        self.state
            .lock()
            .flows
            .get(&(table, flow))
            .copied()
            .ok_or(MailboxError::NotFound("flow"))
    }
}

impl AclCompiler for TestSwitch {
    fn create_acl(&self, acl: u32) -> Result<(), MailboxError> {
        self.state.lock().record(Call::CreateAcl(acl), "create_acl")
    }

    fn add_rule(&self, acl: u32, rule: u32, _filter: &InnerOuterMacRule) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::AddRule(acl, rule), "add_rule")
    }

    fn delete_rule(&self, acl: u32, rule: u32) -> Result<(), MailboxError> {
        self.state
            .lock()
            .record(Call::DeleteRule(acl, rule), "delete_rule")
    }

    fn delete_acl(&self, acl: u32) -> Result<(), MailboxError> {
        self.state.lock().record(Call::DeleteAcl(acl), "delete_acl")
    }

    fn compile_and_apply(&self) -> Result<(), MailboxError> {
        self.state.lock().record(Call::CompileAcl, "compile_and_apply")
    }
}

/// A switch plus the mailbox state of one PEP, for driving handlers
/// directly.
pub(crate) struct TestHarness {
    pub switch: TestSwitch,
    pub config: MailboxConfig,
    pub info: MailboxInfo,
    pub pep: u32,
}

impl TestHarness {
    pub fn new(pep: u32) -> Self {
        let config = test_config();
        Self {
            switch: TestSwitch::new(),
            info: MailboxInfo::new(&config),
            config,
            pep,
        }
    }

    pub fn ctx(&mut self) -> MailboxContext<'_, TestSwitch> {
        MailboxContext::new(&self.switch, &self.config, &mut self.info, self.pep)
    }
}
