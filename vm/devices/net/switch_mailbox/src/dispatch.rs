// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Draining the request queue.

use crate::MailboxError;
use crate::backend::SwitchBackend;
use crate::context::Doorbell;
use crate::context::MailboxContext;
use crate::header::ControlHeader;
use crate::header::HeaderUpdate;
use crate::queue::decrement;
use crate::queue::empty_elements;
use crate::queue::is_valid_index;
use crate::queue::used_elements;
use crate::request::MailboxRequest;
use crate::response::build_error_response;
use crate::validate::SyncState;
use switch_mailbox_protocol::MIN_INDEX;
use switch_mailbox_protocol::MailboxVersion;
use switch_mailbox_protocol::MessageFlags;
use switch_mailbox_protocol::MessageHeader;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Runs one pass over the PEP's mailbox: negotiates, validates, and
    /// handles every queued request.
    pub fn process_requests(&mut self) -> Result<(), MailboxError> {
        let mut header = self.read_control_header()?;
        if self.config.loopback {
            return self.loopback(&mut header);
        }
        if self.negotiate(&mut header)? == SyncState::Unsynchronized {
            return Ok(());
        }
        self.validate_bounds(&mut header)?;

        if let Err(err) = self.drain_requests(&mut header) {
            tracing::error!(
                pep = self.pep,
                error = &err as &dyn std::error::Error,
                "mailbox pass failed, resetting mailbox"
            );
            header.sm_version = MailboxVersion::RESET;
            if let Err(err) = self.write_control_header(&header, HeaderUpdate::VERSION) {
                tracing::debug!(
                    pep = self.pep,
                    error = &err as &dyn std::error::Error,
                    "failed to publish mailbox reset"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    fn drain_requests(&mut self, header: &mut ControlHeader) -> Result<(), MailboxError> {
        while header.req_head != header.req_tail {
            let message = MessageHeader::from(self.read_request(header)?);
            if !message.flags().contains(MessageFlags::TRANSACTION) {
                tracing::trace!(pep = self.pep, ?message, "skipping non-transaction entry");
                continue;
            }
            let body = self.read_message_body(header, message)?;
            let message_type = message.message_type();
            tracing::debug!(pep = self.pep, ?message_type, length = message.length(), "mailbox request");

            let result = MailboxRequest::decode(message, &body)
                .and_then(|request| self.handle_request(request));
            match result {
                Ok(Some(response)) => {
                    self.send_response(header, &response)?;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        pep = self.pep,
                        ?message_type,
                        error = &err as &dyn std::error::Error,
                        "mailbox request failed"
                    );
                    let response = build_error_response(message_type, err.status());
                    self.send_response(header, &response)?;
                }
            }
        }

        self.write_control_header(header, HeaderUpdate::REQUEST_HEAD)?;
        self.signal(Doorbell::RequestRead)
    }

    /// Echoes every queued message back to the host unchanged.
    fn loopback(&self, header: &mut ControlHeader) -> Result<(), MailboxError> {
        if !is_valid_index(header.req_tail) || !is_valid_index(header.resp_head) {
            tracing::warn!(
                pep = self.pep,
                req_tail = header.req_tail,
                resp_head = header.resp_head,
                "host queue index out of range"
            );
            return Err(MailboxError::InvalidValue("host queue index out of range"));
        }
        // Loopback skips negotiation, so the SM indices may never have been
        // initialized.
        if !is_valid_index(header.req_head) || !is_valid_index(header.resp_tail) {
            tracing::debug!(
                pep = self.pep,
                req_head = header.req_head,
                resp_tail = header.resp_tail,
                "initializing loopback queue indices"
            );
            if !is_valid_index(header.req_head) {
                header.req_head = MIN_INDEX;
            }
            if !is_valid_index(header.resp_tail) {
                header.resp_tail = MIN_INDEX;
            }
            self.write_control_header(
                header,
                HeaderUpdate::REQUEST_HEAD | HeaderUpdate::RESPONSE_TAIL,
            )?;
        }

        while header.req_head != header.req_tail {
            let message = MessageHeader::from(self.read_request(header)?);
            // Step back so the header is copied along with the body.
            header.req_head = decrement(header.req_head);

            let entries = 1 + usize::from(message.body_entries());
            if entries > usize::from(used_elements(header.req_head, header.req_tail)) {
                return Err(MailboxError::InvalidValue("message length exceeds queued data"));
            }
            let free = usize::from(empty_elements(header.resp_head, header.resp_tail)) - 1;
            if entries > free {
                tracing::debug!(pep = self.pep, entries, free, "response queue full, deferring echo");
                break;
            }
            for _ in 0..entries {
                let value = self.read_request(header)?;
                self.write_response(header, value)?;
            }
        }

        self.write_control_header(
            header,
            HeaderUpdate::RESPONSE_TAIL | HeaderUpdate::REQUEST_HEAD,
        )?;
        self.signal(Doorbell::ResponseSent)
    }
}

#[cfg(test)]
mod tests {
    use crate::MailboxError;
    use crate::context::MailboxContext;
    use crate::resources::MailboxInfo;
    use crate::test_helpers::Call;
    use crate::test_helpers::TestSwitch;
    use crate::test_helpers::message;
    use crate::test_helpers::test_config;
    use crate::test_helpers::vf_glort;
    use switch_mailbox_protocol::ArgumentType;
    use switch_mailbox_protocol::MIN_INDEX;
    use switch_mailbox_protocol::MailboxStatus;
    use switch_mailbox_protocol::MailboxVersion;
    use switch_mailbox_protocol::MessageType;
    use switch_mailbox_protocol::messages::ErrorResponse;
    use switch_mailbox_protocol::messages::XcastMode;
    use switch_mailbox_protocol::read_payload;

    const PEP: u32 = 1;

    fn xcast_word(glort: u16, mode: XcastMode) -> u32 {
        u32::from(glort) | u32::from(mode.0) << 16
    }

    #[test]
    fn xcast_request_advances_head_by_two() {
        let switch = TestSwitch::new();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        let glort = vf_glort(PEP, 1);
        switch.post_request(
            PEP,
            &message(MessageType::XCAST_MODES, 4, &[xcast_word(glort, XcastMode::PROMISC)]),
        );

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        assert_eq!(switch.sm_header(PEP).request_head(), MIN_INDEX + 2);
        let calls = switch.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|call| matches!(call, Call::SetXcastMode(..)))
                .count(),
            1
        );
        assert!(calls.contains(&Call::SetXcastMode(u32::from(glort), XcastMode::PROMISC)));
        // No response for this request.
        assert!(switch.consume_responses(PEP).is_empty());
        assert!(switch.doorbell(PEP).pf_ack());
    }

    #[test]
    fn stray_entries_are_skipped() {
        let switch = TestSwitch::new();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        // Type 3 with no flags set.
        let mut words = vec![0x0000_0003];
        words.extend(message(MessageType::GET_HW_PLATFORM, 0, &[]));
        switch.post_request(PEP, &words);

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        assert_eq!(switch.sm_header(PEP).request_head(), MIN_INDEX + 2);
        let responses = switch.consume_responses(PEP);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].argument.argument_type(), ArgumentType::HW_PLATFORM);
    }

    #[test]
    fn failed_request_gets_error_response() {
        let switch = TestSwitch::new();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        let mut words = message(MessageType(0x55), 4, &[0]);
        words.extend(message(MessageType::GET_HW_PLATFORM, 0, &[]));
        switch.post_request(PEP, &words);

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        let responses = switch.consume_responses(PEP);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].header.message_type(), MessageType::ERROR);
        let error: ErrorResponse = read_payload(&responses[0].payload).unwrap();
        assert_eq!(error.status, MailboxStatus::INVALID_ARGUMENT);
        assert_eq!(error.request_type, MessageType(0x55));
        assert_eq!(responses[1].header.message_type(), MessageType::GET_HW_PLATFORM);
        assert_eq!(switch.sm_header(PEP).request_head(), MIN_INDEX + 3);
    }

    #[test]
    fn missing_feature_reports_unsupported() {
        let switch = TestSwitch::new();
        switch.remove_master_clock();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        switch.post_request(PEP, &message(MessageType::MASTER_CLK_OFFSET, 0, &[]));

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        let responses = switch.consume_responses(PEP);
        assert_eq!(responses.len(), 1);
        let error: ErrorResponse = read_payload(&responses[0].payload).unwrap();
        assert_eq!(error.status, MailboxStatus::UNSUPPORTED);
        assert_eq!(error.request_type, MessageType::MASTER_CLK_OFFSET);
    }

    #[test]
    fn truncated_message_resets_mailbox() {
        let switch = TestSwitch::new();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        switch.post_request(PEP, &message(MessageType::SET_FLOW, 48, &[1, 2]));

        assert!(
            MailboxContext::new(&switch, &config, &mut info, PEP)
                .process_requests()
                .is_err()
        );
        assert_eq!(switch.sm_header(PEP).version(), MailboxVersion::RESET);
        assert!(switch.calls().is_empty());
    }

    #[test]
    fn unsynchronized_pass_touches_nothing_else() {
        let switch = TestSwitch::new();
        let config = test_config();
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        switch.set_pf_header(PEP, |pf| pf.with_version(MailboxVersion(9)));
        switch.post_request(PEP, &message(MessageType::GET_HW_PLATFORM, 0, &[]));

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        assert_eq!(switch.sm_header(PEP).request_head(), MIN_INDEX);
        assert!(switch.calls().is_empty());
    }

    #[test]
    fn loopback_echoes_verbatim() {
        let switch = TestSwitch::new();
        let mut config = test_config();
        config.loopback = true;
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        let mut words = message(MessageType::TEST, 5, &[0x0403_0201, 0x05]);
        words.extend(message(MessageType(0x77), 0, &[]));
        switch.post_request(PEP, &words);

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        assert_eq!(switch.response_words(PEP), words);
        assert_eq!(
            switch.sm_header(PEP).request_head(),
            MIN_INDEX + words.len() as u16
        );
        assert!(switch.calls().is_empty());
    }

    #[test]
    fn loopback_starts_from_fresh_sm_word() {
        let switch = TestSwitch::new();
        let mut config = test_config();
        config.loopback = true;
        let mut info = MailboxInfo::new(&config);
        // Host side is up; the SM word is still all zeroes.
        switch.host_reset(PEP);
        let words = message(MessageType::TEST, 8, &[0x1111_1111, 0x2222_2222]);
        switch.post_request(PEP, &words);

        MailboxContext::new(&switch, &config, &mut info, PEP)
            .process_requests()
            .unwrap();
        assert_eq!(switch.response_words(PEP), words);
        let sm = switch.sm_header(PEP);
        assert_eq!(sm.request_head(), MIN_INDEX + words.len() as u16);
        assert_eq!(sm.response_tail(), MIN_INDEX + words.len() as u16);
    }

    #[test]
    fn loopback_rejects_bad_host_index() {
        let switch = TestSwitch::new();
        let mut config = test_config();
        config.loopback = true;
        let mut info = MailboxInfo::new(&config);
        switch.synchronize(PEP);
        switch.set_pf_header(PEP, |pf| pf.with_response_head(0));

        assert!(matches!(
            MailboxContext::new(&switch, &config, &mut info, PEP).process_requests(),
            Err(MailboxError::InvalidValue(_))
        ));
        assert_eq!(switch.sm_header(PEP).response_tail(), MIN_INDEX);
    }
}
