// AGENT-AUTHORED (TCK-00701, TCK-00708)
//! Reconciliation orchestrator for the contract renewal lifecycle.
//!
//! Upstream events (contract saved, line item saved, contract ended,
//! manual renew request) land here. Each entry point reads the contract,
//! its line items, and the active renewal opportunity, computes the
//! desired state with the pure functions in `renova-core`, and issues at
//! most one mutation per concern through the dispatcher.
//!
//! # Ordering
//!
//! Entry points for one `(tenant, contract_id)` are mutually exclusive
//! within the process. When one upstream event touches several concerns,
//! [`RenewalOrchestrator::reconcile_all`] runs them in fixed order —
//! renewal date, then ARR, then likelihood — so the forecast is never
//! computed against a stale renewal date.
//!
//! # Convergence
//!
//! A reconcile that fails halfway performs no compensating writes. Every
//! reconcile is deterministic from its inputs, so the next event triggers
//! a fresh run that converges on the desired state.

use std::future::Future;
use std::sync::Arc;

use renova_core::arr::{evaluate as evaluate_arr, ArrQuery};
use renova_core::contract::{Contract, ContractStatus};
use renova_core::error::{EngineError, EngineResult};
use renova_core::likelihood::derive_transition;
use renova_core::opportunity::{RenewalLikelihood, RenewalOpportunity};
use renova_core::renewal::compute_renewal_date;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::commands::{
    CreateRenewalOpportunity, OpportunityField, RolloutRenewalOpportunityOnExpiration,
    UpdateOpportunity, UpdateRenewalOpportunity, UpdateRenewalOpportunityNextCycleDate,
};
use crate::config::EngineConfig;
use crate::dispatch::{CommandBus, Dispatcher};
use crate::lock::ContractLocks;
use crate::settings::TenantSettingsProvider;
use crate::store::{load_active_renewal_opportunity, GraphStore};

/// The engine's collaborators, one value per external system.
#[derive(Clone)]
pub struct EngineDeps {
    /// Graph store reads.
    pub store: Arc<dyn GraphStore>,
    /// Aggregate command bus.
    pub bus: Arc<dyn CommandBus>,
    /// Tenant configuration reads.
    pub settings: Arc<dyn TenantSettingsProvider>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
}

/// What a reconcile entry point did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Desired state already held; no command issued.
    Noop,
    /// A renewal opportunity was created.
    Created {
        /// Id of the new opportunity.
        opportunity_id: String,
    },
    /// An existing opportunity was updated.
    Updated,
    /// The expired opportunity was rolled over.
    RolledOver {
        /// Id of the replacement opportunity.
        opportunity_id: String,
    },
}

/// Outcomes of one full reconcile pass, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Renewal date concern.
    pub renewal_date: ReconcileOutcome,
    /// ARR forecast concern.
    pub arr: ReconcileOutcome,
    /// Likelihood concern.
    pub likelihood: ReconcileOutcome,
}

/// Top-level reconcile entry points, serialized per contract.
pub struct RenewalOrchestrator {
    store: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    locks: ContractLocks,
    config: EngineConfig,
}

impl RenewalOrchestrator {
    /// Builds an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(deps: &EngineDeps, config: EngineConfig) -> Self {
        let dispatcher = Dispatcher::new(
            deps.bus.clone(),
            deps.store.clone(),
            config.retry.clone(),
            config.fence.clone(),
        );
        Self {
            store: deps.store.clone(),
            clock: deps.clock.clone(),
            dispatcher,
            locks: ContractLocks::new(),
            config,
        }
    }

    /// The dispatcher, shared with the contract command surface.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match timeout(self.config.call_deadline(), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::canceled(operation)),
        }
    }

    /// Reconciles the renewal date concern for one contract.
    ///
    /// Creates the opportunity on first touch, rolls it over when it
    /// expired on an auto-renewing (or explicitly approved) contract, and
    /// otherwise converges the stored date onto the computed one.
    ///
    /// # Errors
    ///
    /// Surfaces store reads, command dispatch failures, invariant
    /// violations, and deadline expiry. A missing contract is a no-op,
    /// not an error.
    pub async fn reconcile_renewal_date(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        self.with_deadline("reconcile_renewal_date", async {
            let _guard = self.locks.acquire(tenant, contract_id).await;
            self.renewal_date_locked(tenant, contract_id, actor_user_id)
                .await
        })
        .await
    }

    /// Reconciles the ARR forecast concern for one contract.
    ///
    /// # Errors
    ///
    /// Surfaces store reads, command dispatch failures, invariant
    /// violations, and deadline expiry. A missing contract or missing
    /// opportunity is a no-op.
    pub async fn reconcile_arr(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        self.with_deadline("reconcile_arr", async {
            let _guard = self.locks.acquire(tenant, contract_id).await;
            self.arr_locked(tenant, contract_id, actor_user_id).await
        })
        .await
    }

    /// Reconciles the likelihood concern for one contract.
    ///
    /// # Errors
    ///
    /// Surfaces store reads, command dispatch failures, invariant
    /// violations, and deadline expiry. A missing contract or missing
    /// opportunity is a no-op.
    pub async fn reconcile_likelihood(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        self.with_deadline("reconcile_likelihood", async {
            let _guard = self.locks.acquire(tenant, contract_id).await;
            self.likelihood_locked(tenant, contract_id, actor_user_id)
                .await
        })
        .await
    }

    /// Runs all three reconciles under one lock acquisition, in fixed
    /// order: renewal date, ARR, likelihood.
    ///
    /// # Errors
    ///
    /// Stops at the first failing concern; completed concerns stay
    /// applied and the next event converges the rest.
    pub async fn reconcile_all(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileReport> {
        self.with_deadline("reconcile_all", async {
            let _guard = self.locks.acquire(tenant, contract_id).await;
            let renewal_date = self
                .renewal_date_locked(tenant, contract_id, actor_user_id)
                .await?;
            let arr = self.arr_locked(tenant, contract_id, actor_user_id).await?;
            let likelihood = self
                .likelihood_locked(tenant, contract_id, actor_user_id)
                .await?;
            Ok(ReconcileReport {
                renewal_date,
                arr,
                likelihood,
            })
        })
        .await
    }

    /// Idempotent user-initiated renewal.
    ///
    /// Creates the opportunity when none exists; approves (and optionally
    /// re-dates) a future renewal; rolls over an expired one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the contract is absent —
    /// unlike event-triggered reconciles, a user command on a missing
    /// contract is an error the caller should see.
    pub async fn renew_contract(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
        renewal_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> EngineResult<ReconcileOutcome> {
        self.with_deadline("renew_contract", async {
            let _guard = self.locks.acquire(tenant, contract_id).await;
            self.renew_locked(tenant, contract_id, actor_user_id, renewal_date)
                .await
        })
        .await
    }

    async fn load_contract(&self, tenant: &str, contract_id: &str) -> EngineResult<Option<Contract>> {
        let Some(contract) = self.store.get_contract(tenant, contract_id).await? else {
            debug!(tenant, contract_id, "contract absent, nothing to reconcile");
            return Ok(None);
        };
        contract
            .validate()
            .map_err(|err| EngineError::inconsistent(err.to_string()))?;
        Ok(Some(contract))
    }

    async fn renewal_date_locked(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        let Some(contract) = self.load_contract(tenant, contract_id).await? else {
            return Ok(ReconcileOutcome::Noop);
        };
        if !contract.is_renewable() {
            debug!(tenant, contract_id, "one-shot contract, no renewal");
            return Ok(ReconcileOutcome::Noop);
        }
        if contract.service_started_at.is_none() {
            debug!(tenant, contract_id, "service not started, no renewal yet");
            return Ok(ReconcileOutcome::Noop);
        }

        let opportunity = load_active_renewal_opportunity(&*self.store, tenant, contract_id).await?;
        let now = self.clock.now();

        let Some(opportunity) = opportunity else {
            let Some(renewed_at) = compute_renewal_date(&contract, now, None) else {
                return Ok(ReconcileOutcome::Noop);
            };
            let cmd = CreateRenewalOpportunity {
                tenant: tenant.to_string(),
                contract_id: contract_id.to_string(),
                actor_user_id: actor_user_id.to_string(),
                renewed_at: Some(renewed_at),
                likelihood: RenewalLikelihood::High,
                adjusted_rate: RenewalLikelihood::High.default_adjusted_rate(),
            };
            let opportunity_id = self.dispatcher.create_renewal_opportunity(&cmd).await?;
            info!(
                tenant,
                contract_id,
                opportunity_id = %opportunity_id,
                renewed_at = %renewed_at,
                "renewal opportunity created"
            );
            return Ok(ReconcileOutcome::Created { opportunity_id });
        };

        if opportunity.is_expired(now) && self.rollover_eligible(&contract, &opportunity, now) {
            let cmd = RolloutRenewalOpportunityOnExpiration {
                tenant: tenant.to_string(),
                contract_id: contract_id.to_string(),
                actor_user_id: actor_user_id.to_string(),
            };
            let opportunity_id = self
                .dispatcher
                .rollout_renewal_opportunity_on_expiration(&cmd)
                .await?;
            info!(
                tenant,
                contract_id,
                opportunity_id = %opportunity_id,
                "expired renewal opportunity rolled over"
            );
            return Ok(ReconcileOutcome::RolledOver { opportunity_id });
        }

        let desired = compute_renewal_date(&contract, now, Some(&opportunity));
        match desired {
            Some(renewed_at) if opportunity.renewed_at != Some(renewed_at) => {
                let cmd = UpdateRenewalOpportunityNextCycleDate {
                    tenant: tenant.to_string(),
                    opportunity_id: opportunity.id.clone(),
                    actor_user_id: actor_user_id.to_string(),
                    renewed_at,
                };
                self.dispatcher
                    .update_renewal_opportunity_next_cycle_date(&cmd)
                    .await?;
                info!(
                    tenant,
                    contract_id,
                    opportunity_id = %opportunity.id,
                    renewed_at = %renewed_at,
                    "renewal date moved"
                );
                Ok(ReconcileOutcome::Updated)
            }
            _ => {
                debug!(tenant, contract_id, "renewal date already converged");
                Ok(ReconcileOutcome::Noop)
            }
        }
    }

    /// An expired opportunity rolls over only when the renewal actually
    /// proceeds: the contract auto-renews or a user approved it, the
    /// contract is past drafting, and it has not terminated. Rolling over
    /// a draft or an ended contract would open an opportunity that can
    /// never close.
    fn rollover_eligible(
        &self,
        contract: &Contract,
        opportunity: &RenewalOpportunity,
        now: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        if contract.status == ContractStatus::Draft {
            return false;
        }
        if contract.is_ended(now) {
            return false;
        }
        contract.auto_renew || opportunity.renewal_approved
    }

    async fn arr_locked(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        let Some(contract) = self.load_contract(tenant, contract_id).await? else {
            return Ok(ReconcileOutcome::Noop);
        };
        let Some(opportunity) =
            load_active_renewal_opportunity(&*self.store, tenant, contract_id).await?
        else {
            // Another reconcile creates the opportunity; the next event
            // brings the forecast with it.
            debug!(tenant, contract_id, "no active opportunity, skipping forecast");
            return Ok(ReconcileOutcome::Noop);
        };

        let slis = self.store.get_slis_for_contract(tenant, contract_id).await?;
        for sli in &slis {
            sli.validate()
                .map_err(|err| EngineError::inconsistent(err.to_string()))?;
        }

        let now = self.clock.now();
        let query = ArrQuery {
            valuation: opportunity.renewed_at.unwrap_or(now),
            as_of: now,
            horizon_end: contract.ended_at,
            adjusted_rate: opportunity.renewal_adjusted_rate,
        };
        let forecast = evaluate_arr(&slis, &query);
        if forecast.matches(opportunity.amount, opportunity.max_amount) {
            debug!(tenant, contract_id, "forecast already converged");
            return Ok(ReconcileOutcome::Noop);
        }

        let cmd = UpdateOpportunity {
            tenant: tenant.to_string(),
            opportunity_id: opportunity.id.clone(),
            actor_user_id: actor_user_id.to_string(),
            mask: vec![OpportunityField::Amount, OpportunityField::MaxAmount],
            amount: Some(forecast.amount),
            max_amount: Some(forecast.max_amount),
        };
        self.dispatcher.update_opportunity(&cmd).await?;
        info!(
            tenant,
            contract_id,
            opportunity_id = %opportunity.id,
            amount = forecast.amount,
            max_amount = forecast.max_amount,
            "forecast updated"
        );
        Ok(ReconcileOutcome::Updated)
    }

    async fn likelihood_locked(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        let Some(contract) = self.load_contract(tenant, contract_id).await? else {
            return Ok(ReconcileOutcome::Noop);
        };
        let Some(opportunity) =
            load_active_renewal_opportunity(&*self.store, tenant, contract_id).await?
        else {
            debug!(tenant, contract_id, "no active opportunity, no likelihood to derive");
            return Ok(ReconcileOutcome::Noop);
        };

        let now = self.clock.now();
        let Some(change) = derive_transition(&contract, &opportunity, now) else {
            debug!(tenant, contract_id, "likelihood already converged");
            return Ok(ReconcileOutcome::Noop);
        };

        let cmd = UpdateRenewalOpportunity {
            tenant: tenant.to_string(),
            opportunity_id: opportunity.id.clone(),
            actor_user_id: actor_user_id.to_string(),
            mask: vec![
                OpportunityField::Likelihood,
                OpportunityField::AdjustedRate,
            ],
            likelihood: Some(change.likelihood),
            adjusted_rate: Some(change.adjusted_rate),
            renewed_at: None,
            renewal_approved: None,
        };
        self.dispatcher.update_renewal_opportunity(&cmd).await?;
        info!(
            tenant,
            contract_id,
            opportunity_id = %opportunity.id,
            likelihood = ?change.likelihood,
            adjusted_rate = change.adjusted_rate,
            "likelihood transitioned"
        );
        Ok(ReconcileOutcome::Updated)
    }

    async fn renew_locked(
        &self,
        tenant: &str,
        contract_id: &str,
        actor_user_id: &str,
        renewal_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> EngineResult<ReconcileOutcome> {
        let Some(contract) = self.load_contract(tenant, contract_id).await? else {
            return Err(EngineError::not_found("contract", contract_id));
        };
        if !contract.is_renewable() {
            return Err(EngineError::not_allowed(
                "one-shot contract cannot be renewed",
            ));
        }

        let opportunity = load_active_renewal_opportunity(&*self.store, tenant, contract_id).await?;
        let now = self.clock.now();

        let Some(opportunity) = opportunity else {
            let cmd = CreateRenewalOpportunity {
                tenant: tenant.to_string(),
                contract_id: contract_id.to_string(),
                actor_user_id: actor_user_id.to_string(),
                renewed_at: renewal_date,
                likelihood: RenewalLikelihood::High,
                adjusted_rate: RenewalLikelihood::High.default_adjusted_rate(),
            };
            let opportunity_id = self.dispatcher.create_renewal_opportunity(&cmd).await?;
            info!(
                tenant,
                contract_id,
                opportunity_id = %opportunity_id,
                "renewal opportunity created on demand"
            );
            return Ok(ReconcileOutcome::Created { opportunity_id });
        };

        let renewal_still_ahead = opportunity
            .renewed_at
            .map_or(false, |renewed_at| renewed_at > now);
        if renewal_still_ahead {
            let mut mask = vec![OpportunityField::RenewalApproved];
            if renewal_date.is_some() {
                mask.push(OpportunityField::RenewedAt);
            }
            let cmd = UpdateRenewalOpportunity {
                tenant: tenant.to_string(),
                opportunity_id: opportunity.id.clone(),
                actor_user_id: actor_user_id.to_string(),
                mask,
                likelihood: None,
                adjusted_rate: None,
                renewed_at: renewal_date,
                renewal_approved: Some(true),
            };
            self.dispatcher.update_renewal_opportunity(&cmd).await?;
            info!(
                tenant,
                contract_id,
                opportunity_id = %opportunity.id,
                "renewal approved"
            );
            return Ok(ReconcileOutcome::Updated);
        }

        if let Some(renewed_at) = renewal_date {
            let cmd = UpdateRenewalOpportunity {
                tenant: tenant.to_string(),
                opportunity_id: opportunity.id.clone(),
                actor_user_id: actor_user_id.to_string(),
                mask: vec![OpportunityField::RenewedAt],
                likelihood: None,
                adjusted_rate: None,
                renewed_at: Some(renewed_at),
                renewal_approved: None,
            };
            self.dispatcher.update_renewal_opportunity(&cmd).await?;
        }
        let cmd = RolloutRenewalOpportunityOnExpiration {
            tenant: tenant.to_string(),
            contract_id: contract_id.to_string(),
            actor_user_id: actor_user_id.to_string(),
        };
        let opportunity_id = self
            .dispatcher
            .rollout_renewal_opportunity_on_expiration(&cmd)
            .await?;
        info!(
            tenant,
            contract_id,
            opportunity_id = %opportunity_id,
            "manual renewal rolled over"
        );
        Ok(ReconcileOutcome::RolledOver { opportunity_id })
    }
}
