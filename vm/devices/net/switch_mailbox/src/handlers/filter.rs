// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Inner/outer MAC tunnel filters.
//!
//! All filters share one ACL. A filter on a multicast inner MAC also
//! subscribes its port to that group.

use crate::MailboxError;
use crate::backend::InnerOuterMacRule;
use crate::backend::MacVlanKey;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::resources::InnerOuterMacKey;
use crate::resources::InnerOuterMacResource;
use switch_mailbox_protocol::messages::InnerOuterMacFilter;
use switch_mailbox_protocol::messages::RuleAction;
use switch_mailbox_protocol::messages::is_multicast;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub(crate) fn filter_inner_outer_mac(
        &mut self,
        arg: &InnerOuterMacFilter,
    ) -> Result<(), MailboxError> {
        let port = self.port_for_glort(arg.glort)?;
        let key = InnerOuterMacKey {
            outer_mac: arg.outer_mac,
            inner_mac: arg.inner_mac,
            vni: arg.vni,
            outer_l4_port: arg.outer_l4_port,
            tunnel_type: arg.tunnel_type,
        };
        match arg.action {
            RuleAction::ADD => self.add_inner_outer_mac_filter(port, key),
            RuleAction::DELETE => self.delete_inner_outer_mac_filter(port, key),
            _ => Err(MailboxError::InvalidArgument("filter action")),
        }
    }

    fn add_inner_outer_mac_filter(
        &mut self,
        port: u32,
        key: InnerOuterMacKey,
    ) -> Result<(), MailboxError> {
        if self
            .info
            .resources
            .get(&port)
            .is_some_and(|resources| resources.inner_outer_mac.contains_key(&key))
        {
            return Ok(());
        }

        let acl = self.config.inner_outer_mac_acl;
        if self.info.acl_rules.is_empty() {
            self.backend.create_acl(acl)?;
        }
        let rule = self
            .info
            .acl_rules
            .allocate()
            .ok_or(MailboxError::NoMore("acl rule ids"))?;
        let filter = InnerOuterMacRule {
            outer_mac: key.outer_mac,
            inner_mac: key.inner_mac,
            vni: key.vni,
            outer_l4_port: key.outer_l4_port,
            tunnel_type: key.tunnel_type,
            port,
        };
        if let Err(err) = self.backend.add_rule(acl, rule, &filter) {
            self.back_out_acl_rule(rule, false);
            return Err(err);
        }

        let listener = if is_multicast(&key.inner_mac) {
            let group = MacVlanKey {
                mac: key.inner_mac,
                vlan: 0,
            };
            if let Err(err) = self.backend.add_listener(group, port) {
                self.back_out_acl_rule(rule, true);
                return Err(err);
            }
            Some(group)
        } else {
            None
        };

        self.port_resources(port)?
            .inner_outer_mac
            .insert(key, InnerOuterMacResource { rule, listener });
        tracing::debug!(pep = self.pep, port, rule, "added inner/outer mac filter");
        self.backend.compile_and_apply()
    }

    fn delete_inner_outer_mac_filter(
        &mut self,
        port: u32,
        key: InnerOuterMacKey,
    ) -> Result<(), MailboxError> {
        let resource = self
            .info
            .resources
            .get_mut(&port)
            .and_then(|resources| resources.inner_outer_mac.remove(&key))
            .ok_or(MailboxError::NotFound("inner/outer mac filter"))?;
        let result = self.remove_inner_outer_mac_filter(port, resource);
        result.and(self.reapply_inner_outer_mac_acl())
    }

    /// Removes a filter's rule and listener without recompiling the ACL.
    ///
    /// The rule id is released even if the switch refuses to delete the
    /// rule; a listener failure is returned.
    pub(crate) fn remove_inner_outer_mac_filter(
        &mut self,
        port: u32,
        resource: InnerOuterMacResource,
    ) -> Result<(), MailboxError> {
        let acl = self.config.inner_outer_mac_acl;
        if let Err(err) = self.backend.delete_rule(acl, resource.rule) {
            tracing::warn!(
                acl,
                rule = resource.rule,
                error = &err as &dyn std::error::Error,
                "failed to delete acl rule"
            );
        }
        self.info.acl_rules.release(resource.rule);
        tracing::debug!(pep = self.pep, port, rule = resource.rule, "removed inner/outer mac filter");
        match resource.listener {
            Some(group) => self.backend.delete_listener(group, port),
            None => Ok(()),
        }
    }

    /// Compiles and applies the shared ACL after rules were removed, then
    /// deletes it if no rules are left.
    pub(crate) fn reapply_inner_outer_mac_acl(&mut self) -> Result<(), MailboxError> {
        let result = self.backend.compile_and_apply();
        if self.info.acl_rules.is_empty() {
            self.delete_empty_acl();
        }
        result
    }

    /// Undoes a partially added filter. Nothing was compiled for `rule`, so
    /// the ACL is not reapplied.
    fn back_out_acl_rule(&mut self, rule: u32, added: bool) {
        let acl = self.config.inner_outer_mac_acl;
        if added {
            if let Err(err) = self.backend.delete_rule(acl, rule) {
                tracing::warn!(
                    acl,
                    rule,
                    error = &err as &dyn std::error::Error,
                    "failed to delete acl rule"
                );
            }
        }
        self.info.acl_rules.release(rule);
        if self.info.acl_rules.is_empty() {
            self.delete_empty_acl();
        }
    }

    fn delete_empty_acl(&self) {
        let acl = self.config.inner_outer_mac_acl;
        if let Err(err) = self.backend.delete_acl(acl) {
            tracing::warn!(
                acl,
                error = &err as &dyn std::error::Error,
                "failed to delete acl"
            );
        }
    }
}
