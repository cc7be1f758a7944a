// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Flow tables and flow rules.
//!
//! Tables belong to a PEP's PF. The PF and its VFs add flows to them under
//! ids of their choosing; the switch assigns its own ids, and the tracker
//! translates between the two. A VF only sees and changes its own flows.

use crate::MailboxError;
use crate::backend::FlowRule;
use crate::backend::FlowTableConfig;
use crate::backend::SwitchBackend;
use crate::context::MailboxContext;
use crate::resources::FlowKey;
use crate::resources::FlowMapEntry;
use crate::resources::FlowOwner;
use crate::resources::MailboxFlowTable;
use crate::response::MailboxResponse;
use crate::response::build_flow_list_response;
use crate::response::build_table_list_response;
use switch_mailbox_protocol::messages::FlowDelete;
use switch_mailbox_protocol::messages::FlowEntry;
use switch_mailbox_protocol::messages::FlowQuery;
use switch_mailbox_protocol::messages::FlowTableCreate;
use switch_mailbox_protocol::messages::FlowTableIndex;

impl<B: SwitchBackend> MailboxContext<'_, B> {
    pub(crate) fn create_flow_table(&mut self, arg: &FlowTableCreate) -> Result<(), MailboxError> {
        let pf_port = self.backend.pf_port(self.pep)?;
        let table_index = u32::from(arg.table_index);
        if self
            .info
            .resources
            .get(&pf_port)
            .is_some_and(|resources| resources.flow_tables.contains_key(&table_index))
        {
            return Err(MailboxError::InvalidArgument("flow table already exists"));
        }
        let config = FlowTableConfig {
            table_type: arg.table_type,
            flags: arg.flags,
            num_entries: arg.num_entries,
            condition_mask: arg.condition_mask,
            action_mask: arg.action_mask,
        };
        self.backend.create_table(table_index, &config)?;
        self.port_resources(pf_port)?.flow_tables.insert(
            table_index,
            MailboxFlowTable::new(table_index, arg.flags, arg.action_mask),
        );
        tracing::debug!(pep = self.pep, table_index, "created flow table");
        Ok(())
    }

    pub(crate) fn delete_flow_table(&mut self, arg: &FlowTableIndex) -> Result<(), MailboxError> {
        let pf_port = self.backend.pf_port(self.pep)?;
        let table_index = u32::from(arg.table_index);
        let table = self
            .info
            .resources
            .get_mut(&pf_port)
            .and_then(|resources| resources.flow_tables.remove(&table_index))
            .ok_or(MailboxError::NotFound("flow table"))?;
        if let Err(err) = self.backend.delete_table(table_index) {
            self.port_resources(pf_port)?
                .flow_tables
                .insert(table_index, table);
            return Err(err);
        }
        self.forget_vf_flows(pf_port, &table);
        tracing::debug!(pep = self.pep, table_index, "deleted flow table");
        Ok(())
    }

    /// Drops the records VFs keep of their flows in a deleted table.
    pub(crate) fn forget_vf_flows(&mut self, pf_port: u32, table: &MailboxFlowTable) {
        for (flow, owner) in table.flows() {
            if owner.port == pf_port {
                continue;
            }
            if let Some(resources) = self.info.resources.get_mut(&owner.port) {
                resources.flow_map.remove(&FlowKey {
                    table: table.table_index,
                    flow,
                });
            }
        }
    }

    pub(crate) fn get_tables(&self) -> Result<MailboxResponse, MailboxError> {
        let pf_port = self.backend.pf_port(self.pep)?;
        let source_tables = if self.pep == self.config.management_pep {
            self.backend.source_tables()?
        } else {
            Vec::new()
        };
        let tables = self
            .info
            .resources
            .get(&pf_port)
            .into_iter()
            .flat_map(|resources| resources.flow_tables.values());
        build_table_list_response(tables, &source_tables, self.backend)
    }

    pub(crate) fn set_flow(&mut self, entry: &FlowEntry) -> Result<(), MailboxError> {
        let port = self.port_for_glort(entry.glort)?;
        let pf_port = self.backend.pf_port(self.pep)?;
        let table_index = u32::from(entry.table_index);
        let table = self
            .info
            .resources
            .get_mut(&pf_port)
            .and_then(|resources| resources.flow_tables.get_mut(&table_index))
            .ok_or(MailboxError::NotFound("flow table"))?;
        if entry.action & !table.action_mask != 0 {
            return Err(MailboxError::InvalidArgument("flow action not allowed by table"));
        }

        let rule = FlowRule {
            priority: entry.priority,
            condition: entry.condition,
            condition_value: entry.condition_value,
            action: entry.action,
            action_param: entry.action_param,
            port,
        };
        if let Some(owner) = table.get(entry.flow_id).copied() {
            if owner.port != port {
                return Err(MailboxError::InvalidArgument("flow owned by another port"));
            }
            return self.backend.modify_flow(table_index, owner.internal, &rule);
        }

        let internal = self.backend.add_flow(table_index, &rule)?;
        table.insert(entry.flow_id, FlowOwner { internal, port });
        if port != pf_port {
            self.port_resources(port)?.flow_map.insert(
                FlowKey {
                    table: table_index,
                    flow: entry.flow_id,
                },
                FlowMapEntry { pf_port, internal },
            );
        }
        tracing::trace!(
            pep = self.pep,
            port,
            table_index,
            flow_id = entry.flow_id,
            internal,
            "added flow"
        );
        Ok(())
    }

    pub(crate) fn get_rules(&self, query: &FlowQuery) -> Result<MailboxResponse, MailboxError> {
        let port = self.port_for_glort(query.glort)?;
        let pf_port = self.backend.pf_port(self.pep)?;
        let table = self
            .info
            .resources
            .get(&pf_port)
            .and_then(|resources| resources.flow_tables.get(&u32::from(query.table_index)))
            .ok_or(MailboxError::NotFound("flow table"))?;
        let viewer = (port != pf_port).then_some(port);
        build_flow_list_response(table, viewer, self.backend)
    }

    pub(crate) fn delete_flow(&mut self, arg: &FlowDelete) -> Result<(), MailboxError> {
        let port = self.port_for_glort(arg.glort)?;
        let pf_port = self.backend.pf_port(self.pep)?;
        let table_index = u32::from(arg.table_index);
        let table = self
            .info
            .resources
            .get_mut(&pf_port)
            .and_then(|resources| resources.flow_tables.get_mut(&table_index))
            .ok_or(MailboxError::NotFound("flow table"))?;
        let owner = table
            .get(arg.flow_id)
            .copied()
            .ok_or(MailboxError::NotFound("flow"))?;
        if port != pf_port && owner.port != port {
            return Err(MailboxError::InvalidArgument("flow owned by another port"));
        }
        self.backend.delete_flow(table_index, owner.internal)?;
        table.remove(arg.flow_id);
        if owner.port != pf_port {
            if let Some(resources) = self.info.resources.get_mut(&owner.port) {
                resources.flow_map.remove(&FlowKey {
                    table: table_index,
                    flow: arg.flow_id,
                });
            }
        }
        Ok(())
    }
}
