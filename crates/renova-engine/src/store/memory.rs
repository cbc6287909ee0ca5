//! In-memory graph store.
//!
//! Backs the engine's integration tests and doubles as a reference
//! implementation of the read contract: missing entities answer `None`
//! or empty collections, never errors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use renova_core::contract::Contract;
use renova_core::error::EngineResult;
use renova_core::opportunity::RenewalOpportunity;
use renova_core::sli::ServiceLineItem;

use super::GraphStore;

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    contracts: HashMap<Key, Contract>,
    slis: HashMap<Key, Vec<ServiceLineItem>>,
    opportunities: HashMap<Key, Vec<RenewalOpportunity>>,
    invoice_counts: HashMap<Key, i64>,
}

/// A process-local graph store keyed by `(tenant, contract_id)`.
///
/// Guards are never held across an await, so a plain sync lock is safe
/// under the async trait methods.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<State>,
}

impl InMemoryGraphStore {
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(tenant: &str, contract_id: &str) -> Key {
    (tenant.to_string(), contract_id.to_string())
}

impl InMemoryGraphStore {
    /// Inserts or replaces a contract.
    pub fn put_contract(&self, contract: Contract) {
        let k = key(&contract.tenant, &contract.id);
        self.write().contracts.insert(k, contract);
    }

    /// Removes a contract node, cascading its line items, opportunities,
    /// and invoice counts the way the graph store cascades ownership.
    pub fn remove_contract(&self, tenant: &str, contract_id: &str) {
        let k = key(tenant, contract_id);
        let mut state = self.write();
        state.contracts.remove(&k);
        state.slis.remove(&k);
        state.opportunities.remove(&k);
        state.invoice_counts.remove(&k);
    }

    /// Replaces the line items of a contract.
    pub fn put_slis(&self, tenant: &str, contract_id: &str, slis: Vec<ServiceLineItem>) {
        let k = key(tenant, contract_id);
        self.write().slis.insert(k, slis);
    }

    /// Appends an opportunity to a contract.
    pub fn insert_opportunity(&self, tenant: &str, opportunity: RenewalOpportunity) {
        let k = key(tenant, &opportunity.contract_id);
        self.write()
            .opportunities
            .entry(k)
            .or_default()
            .push(opportunity);
    }

    /// Mutates one opportunity in place; no-op when absent.
    pub fn mutate_opportunity(
        &self,
        tenant: &str,
        contract_id: &str,
        opportunity_id: &str,
        mutate: impl FnOnce(&mut RenewalOpportunity),
    ) {
        let k = key(tenant, contract_id);
        let mut state = self.write();
        if let Some(found) = state
            .opportunities
            .get_mut(&k)
            .and_then(|all| all.iter_mut().find(|o| o.id == opportunity_id))
        {
            mutate(found);
        }
    }

    /// Mutates one opportunity located by id alone; no-op when absent.
    pub fn mutate_opportunity_by_id(
        &self,
        tenant: &str,
        opportunity_id: &str,
        mutate: impl FnOnce(&mut RenewalOpportunity),
    ) {
        let mut state = self.write();
        if let Some(found) = state
            .opportunities
            .iter_mut()
            .filter(|((entry_tenant, _), _)| entry_tenant == tenant)
            .flat_map(|(_, all)| all.iter_mut())
            .find(|o| o.id == opportunity_id)
        {
            mutate(found);
        }
    }

    /// Looks an opportunity up by id alone.
    #[must_use]
    pub fn find_opportunity(
        &self,
        tenant: &str,
        opportunity_id: &str,
    ) -> Option<RenewalOpportunity> {
        self.read()
            .opportunities
            .iter()
            .filter(|((entry_tenant, _), _)| entry_tenant == tenant)
            .flat_map(|(_, all)| all.iter())
            .find(|o| o.id == opportunity_id)
            .cloned()
    }

    /// Sets the non-preview invoice count for a contract.
    pub fn set_invoice_count(&self, tenant: &str, contract_id: &str, count: i64) {
        let k = key(tenant, contract_id);
        self.write().invoice_counts.insert(k, count);
    }

    /// Snapshot of every opportunity of a contract, open and closed.
    #[must_use]
    pub fn all_opportunities(&self, tenant: &str, contract_id: &str) -> Vec<RenewalOpportunity> {
        let k = key(tenant, contract_id);
        self.read()
            .opportunities
            .get(&k)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Option<Contract>> {
        let k = key(tenant, contract_id);
        Ok(self.read().contracts.get(&k).cloned())
    }

    async fn get_slis_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Vec<ServiceLineItem>> {
        let k = key(tenant, contract_id);
        Ok(self
            .read()
            .slis
            .get(&k)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_open_renewal_opportunities_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Vec<RenewalOpportunity>> {
        let k = key(tenant, contract_id);
        Ok(self
            .read()
            .opportunities
            .get(&k)
            .map(|all| all.iter().filter(|o| o.is_open()).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_open_renewal_opportunities_for_organization(
        &self,
        tenant: &str,
        organization_id: &str,
    ) -> EngineResult<Vec<RenewalOpportunity>> {
        let state = self.read();
        let mut found = Vec::new();
        for ((contract_tenant, contract_id), contract) in &state.contracts {
            if contract_tenant != tenant || contract.organization_id != organization_id {
                continue;
            }
            if let Some(all) = state
                .opportunities
                .get(&(contract_tenant.clone(), contract_id.clone()))
            {
                found.extend(all.iter().filter(|o| o.is_open()).cloned());
            }
        }
        Ok(found)
    }

    async fn exists_contract(&self, tenant: &str, contract_id: &str) -> EngineResult<bool> {
        let k = key(tenant, contract_id);
        Ok(self.read().contracts.contains_key(&k))
    }

    async fn count_non_dry_run_invoices_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<i64> {
        let k = key(tenant, contract_id);
        Ok(self
            .read()
            .invoice_counts
            .get(&k)
            .copied()
            .unwrap_or(0))
    }
}
