//! Contract command surface.
//!
//! Validates caller-supplied models, resolves tenant defaults, and
//! translates into aggregate commands. After each write the surface
//! waits for the read-your-write fence so UIs observe their own change
//! on the next query.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use renova_core::contract::RenewalCycle;
use renova_core::error::{EngineError, EngineResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::commands::{
    derive_length_in_months, ContractField, CreateContract, SoftDeleteContract, UpdateContract,
};
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::orchestrator::{EngineDeps, ReconcileOutcome, RenewalOrchestrator};
use crate::settings::TenantSettingsProvider;
use crate::store::GraphStore;

/// Caller-supplied model for contract creation.
#[derive(Debug, Clone, Default)]
pub struct CreateContractInput {
    /// Owning customer organization, required.
    pub organization_id: String,
    /// Display name.
    pub name: String,
    /// Currency; defaults to the tenant's base currency when absent.
    pub currency: Option<String>,
    /// Billing country; defaults to the tenant billing profile's country.
    pub billing_country: Option<String>,
    /// Invoicing cadence; defaults to the configured cycle.
    pub billing_cycle_in_months: Option<u32>,
    /// Renewal cycle length in months; wins over the legacy pair.
    pub length_in_months: Option<u32>,
    /// Legacy renewal cycle name.
    pub renewal_cycle: Option<RenewalCycle>,
    /// Legacy periods multiplier, applied to annual cycles only.
    pub renewal_periods: Option<u32>,
    /// Auto-renew flag.
    pub auto_renew: bool,
    /// Approval flag.
    pub approved: bool,
    /// Service start, when already known.
    pub service_started_at: Option<DateTime<Utc>>,
    /// Signature timestamp, when already known.
    pub signed_at: Option<DateTime<Utc>>,
    /// Invoicing start, when already known.
    pub invoicing_start_date: Option<DateTime<Utc>>,
}

/// Caller-supplied model for contract update. Every field is optional;
/// each provided date field updates its own target and nothing else.
#[derive(Debug, Clone, Default)]
pub struct UpdateContractInput {
    /// New display name.
    pub name: Option<String>,
    /// Explicit renewal cycle length.
    pub length_in_months: Option<u32>,
    /// Legacy renewal cycle name, used when no explicit length came in.
    pub renewal_cycle: Option<RenewalCycle>,
    /// Legacy periods multiplier.
    pub renewal_periods: Option<u32>,
    /// New invoicing cadence.
    pub billing_cycle_in_months: Option<u32>,
    /// New auto-renew flag.
    pub auto_renew: Option<bool>,
    /// New currency.
    pub currency: Option<String>,
    /// New signature timestamp.
    pub signed_at: Option<DateTime<Utc>>,
    /// New service start.
    pub service_started_at: Option<DateTime<Utc>>,
    /// New termination timestamp.
    pub ended_at: Option<DateTime<Utc>>,
    /// New invoicing start.
    pub invoicing_start_date: Option<DateTime<Utc>>,
    /// New approval flag.
    pub approved: Option<bool>,
    /// New invoicing switch.
    pub invoicing_enabled: Option<bool>,
}

impl UpdateContractInput {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.length_in_months.is_none()
            && self.renewal_cycle.is_none()
            && self.billing_cycle_in_months.is_none()
            && self.auto_renew.is_none()
            && self.currency.is_none()
            && self.signed_at.is_none()
            && self.service_started_at.is_none()
            && self.ended_at.is_none()
            && self.invoicing_start_date.is_none()
            && self.approved.is_none()
            && self.invoicing_enabled.is_none()
    }
}

/// Create/update/soft-delete/renew operations over contract aggregates.
pub struct ContractCommandSurface {
    store: Arc<dyn GraphStore>,
    settings: Arc<dyn TenantSettingsProvider>,
    dispatcher: Dispatcher,
    orchestrator: Arc<RenewalOrchestrator>,
    default_billing_cycle_months: u32,
}

impl ContractCommandSurface {
    /// Builds the surface over shared collaborators.
    #[must_use]
    pub fn new(
        deps: &EngineDeps,
        config: &EngineConfig,
        orchestrator: Arc<RenewalOrchestrator>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            deps.bus.clone(),
            deps.store.clone(),
            config.retry.clone(),
            config.fence.clone(),
        );
        Self {
            store: deps.store.clone(),
            settings: deps.settings.clone(),
            dispatcher,
            orchestrator,
            default_billing_cycle_months: config.default_billing_cycle_months,
        }
    }

    /// Creates a contract and waits until the node is readable.
    ///
    /// Currency falls back to the tenant's base currency, billing country
    /// to the tenant's default billing profile, the billing cycle to one
    /// month.
    ///
    /// # Errors
    ///
    /// Surfaces settings/store reads, command validation (a tenant with
    /// no resolvable currency cannot create contracts), dispatch
    /// failures, and fence expiry.
    pub async fn create_contract(
        &self,
        tenant: &str,
        actor_user_id: &str,
        input: CreateContractInput,
    ) -> EngineResult<String> {
        let currency = match input.currency {
            Some(currency) if !currency.is_empty() => currency,
            _ => self
                .settings
                .get_tenant_settings(tenant)
                .await?
                .map(|settings| settings.base_currency)
                .unwrap_or_default(),
        };
        let billing_country = match input.billing_country {
            Some(country) if !country.is_empty() => country,
            _ => self
                .settings
                .get_default_billing_profile(tenant)
                .await?
                .map(|profile| profile.country)
                .unwrap_or_default(),
        };
        let length_in_months = derive_length_in_months(
            input.length_in_months,
            input.renewal_cycle,
            input.renewal_periods,
        )
        .unwrap_or(0);

        let cmd = CreateContract {
            tenant: tenant.to_string(),
            contract_id: Uuid::new_v4().to_string(),
            actor_user_id: actor_user_id.to_string(),
            organization_id: input.organization_id,
            name: input.name,
            currency,
            billing_country,
            billing_cycle_in_months: input
                .billing_cycle_in_months
                .unwrap_or(self.default_billing_cycle_months),
            length_in_months,
            auto_renew: input.auto_renew,
            approved: input.approved,
            service_started_at: input.service_started_at,
            signed_at: input.signed_at,
            invoicing_start_date: input.invoicing_start_date,
        };
        let contract_id = self.dispatcher.create_contract(&cmd).await?;
        self.dispatcher
            .await_contract_visible(tenant, &contract_id)
            .await?;
        info!(tenant, contract_id = %contract_id, "contract created");
        Ok(contract_id)
    }

    /// Applies a masked contract update and waits for visibility.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the contract is absent,
    /// and surfaces dispatch failures and fence expiry. An input with
    /// nothing to change is a no-op.
    pub async fn update_contract(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
        input: UpdateContractInput,
    ) -> EngineResult<()> {
        if self.store.get_contract(tenant, contract_id).await?.is_none() {
            return Err(EngineError::not_found("contract", contract_id));
        }
        if input.is_empty() {
            debug!(tenant, contract_id, "empty contract update, nothing to do");
            return Ok(());
        }

        let length_in_months = derive_length_in_months(
            input.length_in_months,
            input.renewal_cycle,
            input.renewal_periods,
        );

        let mut mask = Vec::new();
        if input.name.is_some() {
            mask.push(ContractField::Name);
        }
        if length_in_months.is_some() {
            mask.push(ContractField::LengthInMonths);
        }
        if input.billing_cycle_in_months.is_some() {
            mask.push(ContractField::BillingCycleInMonths);
        }
        if input.auto_renew.is_some() {
            mask.push(ContractField::AutoRenew);
        }
        if input.currency.is_some() {
            mask.push(ContractField::Currency);
        }
        if input.signed_at.is_some() {
            mask.push(ContractField::SignedAt);
        }
        if input.service_started_at.is_some() {
            mask.push(ContractField::ServiceStartedAt);
        }
        if input.ended_at.is_some() {
            mask.push(ContractField::EndedAt);
        }
        if input.invoicing_start_date.is_some() {
            mask.push(ContractField::InvoicingStartDate);
        }
        if input.approved.is_some() {
            mask.push(ContractField::Approved);
        }
        if input.invoicing_enabled.is_some() {
            mask.push(ContractField::InvoicingEnabled);
        }

        let cmd = UpdateContract {
            tenant: tenant.to_string(),
            contract_id: contract_id.to_string(),
            actor_user_id: actor_user_id.to_string(),
            mask,
            name: input.name,
            length_in_months,
            billing_cycle_in_months: input.billing_cycle_in_months,
            auto_renew: input.auto_renew,
            currency: input.currency,
            signed_at: input.signed_at,
            service_started_at: input.service_started_at,
            ended_at: input.ended_at,
            invoicing_start_date: input.invoicing_start_date,
            approved: input.approved,
            invoicing_enabled: input.invoicing_enabled,
        };
        self.dispatcher.update_contract(&cmd).await?;
        self.dispatcher
            .await_contract_visible(tenant, contract_id)
            .await?;
        info!(tenant, contract_id, "contract updated");
        Ok(())
    }

    /// Soft-deletes a contract, refusing when real invoices exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OperationNotAllowed`] when the contract
    /// has any non-preview invoice; surfaces dispatch failures and the
    /// disappearance fence.
    pub async fn soft_delete_contract(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<()> {
        let invoices = self
            .store
            .count_non_dry_run_invoices_for_contract(tenant, contract_id)
            .await?;
        if invoices > 0 {
            return Err(EngineError::not_allowed(format!(
                "contract {contract_id} has {invoices} invoices"
            )));
        }

        let cmd = SoftDeleteContract {
            tenant: tenant.to_string(),
            contract_id: contract_id.to_string(),
            actor_user_id: actor_user_id.to_string(),
        };
        self.dispatcher.soft_delete_contract(&cmd).await?;
        info!(tenant, contract_id, "contract soft-deleted");
        Ok(())
    }

    /// User-initiated renewal, delegated to the orchestrator.
    ///
    /// # Errors
    ///
    /// See [`RenewalOrchestrator::renew_contract`].
    pub async fn renew_contract(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
        renewal_date: Option<DateTime<Utc>>,
    ) -> EngineResult<ReconcileOutcome> {
        self.orchestrator
            .renew_contract(tenant, contract_id, actor_user_id, renewal_date)
            .await
    }
}
