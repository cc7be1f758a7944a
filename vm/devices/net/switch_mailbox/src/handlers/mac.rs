// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Flooding modes and MAC forwarding rules.

use crate::MailboxError;
use crate::backend::FloodKind;
use crate::backend::FloodKinds;
use crate::backend::MacVlanKey;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::resources::MacResource;
use switch_mailbox_protocol::messages::MacForwardRule;
use switch_mailbox_protocol::messages::RuleAction;
use switch_mailbox_protocol::messages::XcastModes;
use switch_mailbox_protocol::messages::is_multicast;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub(crate) fn set_xcast_modes(&mut self, arg: &XcastModes) -> Result<(), MailboxError> {
        let port = self.port_for_glort(arg.glort)?;
        let wanted =
            FloodKinds::for_mode(arg.mode).ok_or(MailboxError::InvalidArgument("xcast mode"))?;
        self.backend.set_xcast_mode(port, arg.mode)?;

        let current = self.port_resources(port)?.flood;
        tracing::debug!(pep = self.pep, port, mode = ?arg.mode, ?current, ?wanted, "xcast mode");
        for kind in (wanted - current).kinds() {
            self.join_flood(port, kind)?;
        }
        for kind in (current - wanted).kinds() {
            self.leave_flood(port, kind)?;
        }
        Ok(())
    }

    fn join_flood(&mut self, port: u32, kind: FloodKind) -> Result<(), MailboxError> {
        self.backend.add_flood_listener(kind, port)?;
        self.port_resources(port)?.flood.insert(kind.into());
        if self.info.flood.acquire(self.pep, kind)? {
            self.backend
                .set_pep_flood_membership(self.pep, kind, true)?;
        }
        Ok(())
    }

    fn leave_flood(&mut self, port: u32, kind: FloodKind) -> Result<(), MailboxError> {
        self.backend.remove_flood_listener(kind, port)?;
        self.port_resources(port)?.flood.remove(kind.into());
        if self.info.flood.release(self.pep, kind)? {
            self.backend
                .set_pep_flood_membership(self.pep, kind, false)?;
        }
        Ok(())
    }

    pub(crate) fn update_mac_forwarding_rule(
        &mut self,
        rule: &MacForwardRule,
    ) -> Result<(), MailboxError> {
        let port = self.port_for_glort(rule.glort)?;
        let key = MacVlanKey {
            mac: rule.mac,
            vlan: rule.vlan,
        };
        match rule.action {
            RuleAction::ADD => {
                let resource = if is_multicast(&key.mac) {
                    self.backend.add_listener(key, port)?;
                    MacResource::MulticastListener
                } else {
                    self.backend.add_mac_entry(key, port)?;
                    MacResource::Address
                };
                self.port_resources(port)?.mac.insert(key, resource);
            }
            RuleAction::DELETE => {
                let resource = self
                    .info
                    .resources
                    .get(&port)
                    .and_then(|resources| resources.mac.get(&key).copied())
                    .ok_or(MailboxError::NotFound("mac entry"))?;
                match resource {
                    MacResource::Address => self.backend.delete_mac_entry(key)?,
                    MacResource::MulticastListener => self.backend.delete_listener(key, port)?,
                }
                self.port_resources(port)?.mac.remove(&key);
            }
            _ => return Err(MailboxError::InvalidArgument("mac rule action")),
        }
        Ok(())
    }
}
