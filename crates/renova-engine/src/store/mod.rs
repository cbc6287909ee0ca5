//! Graph store read adapter.
//!
//! The engine consumes the graph store behind this trait; it never owns
//! the storage format. Missing entities come back as `Ok(None)`, never as
//! errors — absence is a normal answer during reconcile races.
//!
//! The at-most-one-open-opportunity invariant is enforced here, at the
//! single point every reconcile reads through: observing more than one
//! open renewal opportunity for a contract aborts the operation with an
//! inconsistent-state error and leaves the surface unchanged.

pub mod memory;

use async_trait::async_trait;
use renova_core::contract::Contract;
use renova_core::error::{EngineError, EngineResult};
use renova_core::opportunity::RenewalOpportunity;
use renova_core::sli::ServiceLineItem;

pub use memory::InMemoryGraphStore;

/// Read operations the engine consumes from the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Loads a contract, `None` when absent.
    async fn get_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Option<Contract>>;

    /// Loads all service line items attached to a contract.
    async fn get_slis_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Vec<ServiceLineItem>>;

    /// Loads the open renewal opportunities of a contract, unfiltered.
    ///
    /// Callers wanting *the* active opportunity go through
    /// [`load_active_renewal_opportunity`], which enforces uniqueness.
    async fn get_open_renewal_opportunities_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<Vec<RenewalOpportunity>>;

    /// Loads the open renewal opportunities across an organization.
    async fn get_open_renewal_opportunities_for_organization(
        &self,
        tenant: &str,
        organization_id: &str,
    ) -> EngineResult<Vec<RenewalOpportunity>>;

    /// Returns `true` while the contract node exists.
    async fn exists_contract(&self, tenant: &str, contract_id: &str) -> EngineResult<bool>;

    /// Counts invoices that are not dry-run previews.
    async fn count_non_dry_run_invoices_for_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<i64>;
}

/// Loads the unique active renewal opportunity for a contract.
///
/// # Errors
///
/// Propagates store read errors, and returns
/// [`EngineError::InconsistentState`] when more than one open opportunity
/// is observed.
pub async fn load_active_renewal_opportunity(
    store: &dyn GraphStore,
    tenant: &str,
    contract_id: &str,
) -> EngineResult<Option<RenewalOpportunity>> {
    let mut open = store
        .get_open_renewal_opportunities_for_contract(tenant, contract_id)
        .await?;
    match open.len() {
        0 => Ok(None),
        1 => Ok(open.pop()),
        observed => Err(EngineError::inconsistent(format!(
            "{observed} open renewal opportunities for contract {contract_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use renova_core::opportunity::{OpportunityStage, OpportunityType, RenewalLikelihood};

    use super::*;

    fn open_opportunity(id: &str) -> RenewalOpportunity {
        RenewalOpportunity {
            id: id.to_string(),
            contract_id: "c-1".to_string(),
            internal_type: OpportunityType::Renewal,
            internal_stage: OpportunityStage::Open,
            amount: 0.0,
            max_amount: 0.0,
            renewal_likelihood: RenewalLikelihood::High,
            renewal_adjusted_rate: 100,
            renewed_at: None,
            renewal_approved: false,
            owner_user_id: None,
        }
    }

    #[tokio::test]
    async fn active_lookup_enforces_uniqueness() {
        let store = InMemoryGraphStore::default();
        assert_eq!(
            load_active_renewal_opportunity(&store, "acme", "c-1")
                .await
                .expect("empty store reads cleanly"),
            None
        );

        store.insert_opportunity("acme", open_opportunity("op-1"));
        let found = load_active_renewal_opportunity(&store, "acme", "c-1")
            .await
            .expect("single open opportunity")
            .expect("present");
        assert_eq!(found.id, "op-1");

        store.insert_opportunity("acme", open_opportunity("op-2"));
        assert!(matches!(
            load_active_renewal_opportunity(&store, "acme", "c-1").await,
            Err(EngineError::InconsistentState { .. })
        ));
    }
}
