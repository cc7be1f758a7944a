// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Releasing the resources of a deleted port.
//!
//! Cleanup failures are logged and skipped so that one stuck resource does
//! not leak all the others.

use crate::MailboxError;
use crate::backend::FloodKind;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::resources::MacResource;
use crate::resources::MailboxResources;
use crate::resources::PortKind;

fn log_failure(port: u32, what: &'static str, result: Result<(), MailboxError>) {
    if let Err(err) = result {
        tracing::warn!(
            port,
            what,
            error = &err as &dyn std::error::Error,
            "failed to release port resource"
        );
    }
}

impl<B: SwitchBackend> MailboxContext<'_, B> {
    /// Releases everything the mailbox created on behalf of `port`.
    pub fn delete_virtual_port(&mut self, port: u32) {
        let Some(resources) = self.info.resources.remove(&port) else {
            return;
        };
        tracing::debug!(port, pep = resources.pep, kind = ?resources.kind, "releasing port resources");
        self.release_floods(port, &resources);
        self.release_mac_entries(port, &resources);
        self.release_flows(port, &resources);
        self.release_filters(port, resources);
    }

    fn release_floods(&mut self, port: u32, resources: &MailboxResources) {
        for kind in resources.flood.kinds() {
            log_failure(
                port,
                "flood listener",
                self.backend.remove_flood_listener(kind, port),
            );
            self.release_flood_count(port, resources.pep, kind);
        }
    }

    fn release_flood_count(&mut self, port: u32, pep: u32, kind: FloodKind) {
        match self.info.flood.release(pep, kind) {
            Ok(true) => log_failure(
                port,
                "flood port mask",
                self.backend.set_pep_flood_membership(pep, kind, false),
            ),
            Ok(false) => {}
            Err(err) => log_failure(port, "flood count", Err(err)),
        }
    }

    fn release_mac_entries(&mut self, port: u32, resources: &MailboxResources) {
        for (&key, resource) in &resources.mac {
            let result = match resource {
                MacResource::Address => self.backend.delete_mac_entry(key),
                MacResource::MulticastListener => self.backend.delete_listener(key, port),
            };
            log_failure(port, "mac entry", result);
        }
    }

    fn release_flows(&mut self, port: u32, resources: &MailboxResources) {
        if resources.kind == PortKind::Vf && !resources.flow_tables.is_empty() {
            tracing::error!(port, "virtual function owns flow tables");
        }
        for table in resources.flow_tables.values() {
            log_failure(
                port,
                "flow table",
                self.backend.delete_table(table.table_index),
            );
            self.forget_vf_flows(port, table);
        }

        for (key, entry) in &resources.flow_map {
            log_failure(
                port,
                "flow",
                self.backend.delete_flow(key.table, entry.internal),
            );
            if let Some(table) = self
                .info
                .resources
                .get_mut(&entry.pf_port)
                .and_then(|pf| pf.flow_tables.get_mut(&key.table))
            {
                table.remove(key.flow);
            }
        }
    }

    fn release_filters(&mut self, port: u32, resources: MailboxResources) {
        if resources.inner_outer_mac.is_empty() {
            return;
        }
        for resource in resources.inner_outer_mac.into_values() {
            let result = self.remove_inner_outer_mac_filter(port, resource);
            log_failure(port, "inner/outer mac filter", result);
        }
        log_failure(
            port,
            "inner/outer mac acl",
            self.reapply_inner_outer_mac_acl(),
        );
    }
}
