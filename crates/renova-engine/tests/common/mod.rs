//! Shared fixtures for engine integration tests: entity builders, a
//! pinned clock, and a command bus that records every command and
//! applies its effect to the in-memory graph store, the way the real
//! aggregate bus is eventually reflected by the graph projection.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use renova_core::contract::{Contract, ContractStatus};
use renova_core::error::EngineResult;
use renova_core::opportunity::{
    OpportunityStage, OpportunityType, RenewalLikelihood, RenewalOpportunity,
};
use renova_core::sli::{BilledType, ServiceLineItem};
use renova_engine::commands::{
    ContractField, CreateContract, CreateRenewalOpportunity, OpportunityField,
    RolloutRenewalOpportunityOnExpiration, SoftDeleteContract, UpdateContract, UpdateOpportunity,
    UpdateRenewalOpportunity, UpdateRenewalOpportunityNextCycleDate,
};
use renova_engine::{
    CommandBus, EngineConfig, EngineDeps, FixedClock, GraphStore, InMemoryGraphStore,
    StaticTenantSettings, RenewalOrchestrator, TenantBillingProfile, TenantSettings,
};

pub const TENANT: &str = "acme";
pub const ACTOR: &str = "user-1";

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .expect("valid test instant")
}

/// Every command the bus accepted, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    CreateRenewalOpportunity(CreateRenewalOpportunity),
    UpdateNextCycleDate(UpdateRenewalOpportunityNextCycleDate),
    UpdateOpportunity(UpdateOpportunity),
    UpdateRenewalOpportunity(UpdateRenewalOpportunity),
    Rollout(RolloutRenewalOpportunityOnExpiration),
    SoftDeleteContract(SoftDeleteContract),
    CreateContract(CreateContract),
    UpdateContract(UpdateContract),
}

/// Command bus double: records commands and projects their effect onto
/// the shared in-memory graph store.
pub struct ApplyingBus {
    store: Arc<InMemoryGraphStore>,
    recorded: Mutex<Vec<Recorded>>,
    next_id: AtomicU64,
}

impl ApplyingBus {
    pub fn new(store: Arc<InMemoryGraphStore>) -> Self {
        Self {
            store,
            recorded: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, command: Recorded) {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl CommandBus for ApplyingBus {
    async fn create_renewal_opportunity(
        &self,
        cmd: &CreateRenewalOpportunity,
    ) -> EngineResult<String> {
        self.record(Recorded::CreateRenewalOpportunity(cmd.clone()));
        let id = self.fresh_id("op");
        self.store.insert_opportunity(
            &cmd.tenant,
            RenewalOpportunity {
                id: id.clone(),
                contract_id: cmd.contract_id.clone(),
                internal_type: OpportunityType::Renewal,
                internal_stage: OpportunityStage::Open,
                amount: 0.0,
                max_amount: 0.0,
                renewal_likelihood: cmd.likelihood,
                renewal_adjusted_rate: cmd.adjusted_rate,
                renewed_at: cmd.renewed_at,
                renewal_approved: false,
                owner_user_id: None,
            },
        );
        Ok(id)
    }

    async fn update_renewal_opportunity_next_cycle_date(
        &self,
        cmd: &UpdateRenewalOpportunityNextCycleDate,
    ) -> EngineResult<()> {
        self.record(Recorded::UpdateNextCycleDate(cmd.clone()));
        self.store
            .mutate_opportunity_by_id(&cmd.tenant, &cmd.opportunity_id, |opportunity| {
                opportunity.renewed_at = Some(cmd.renewed_at);
            });
        Ok(())
    }

    async fn update_opportunity(&self, cmd: &UpdateOpportunity) -> EngineResult<()> {
        self.record(Recorded::UpdateOpportunity(cmd.clone()));
        self.store
            .mutate_opportunity_by_id(&cmd.tenant, &cmd.opportunity_id, |opportunity| {
                if cmd.mask.contains(&OpportunityField::Amount) {
                    if let Some(amount) = cmd.amount {
                        opportunity.amount = amount;
                    }
                }
                if cmd.mask.contains(&OpportunityField::MaxAmount) {
                    if let Some(max_amount) = cmd.max_amount {
                        opportunity.max_amount = max_amount;
                    }
                }
            });
        Ok(())
    }

    async fn update_renewal_opportunity(
        &self,
        cmd: &UpdateRenewalOpportunity,
    ) -> EngineResult<()> {
        self.record(Recorded::UpdateRenewalOpportunity(cmd.clone()));
        self.store
            .mutate_opportunity_by_id(&cmd.tenant, &cmd.opportunity_id, |opportunity| {
                if cmd.mask.contains(&OpportunityField::Likelihood) {
                    if let Some(likelihood) = cmd.likelihood {
                        opportunity.renewal_likelihood = likelihood;
                    }
                }
                if cmd.mask.contains(&OpportunityField::AdjustedRate) {
                    if let Some(rate) = cmd.adjusted_rate {
                        opportunity.renewal_adjusted_rate = rate;
                    }
                }
                if cmd.mask.contains(&OpportunityField::RenewedAt) {
                    if cmd.renewed_at.is_some() {
                        opportunity.renewed_at = cmd.renewed_at;
                    }
                }
                if cmd.mask.contains(&OpportunityField::RenewalApproved) {
                    if let Some(approved) = cmd.renewal_approved {
                        opportunity.renewal_approved = approved;
                    }
                }
            });
        Ok(())
    }

    async fn rollout_renewal_opportunity_on_expiration(
        &self,
        cmd: &RolloutRenewalOpportunityOnExpiration,
    ) -> EngineResult<String> {
        self.record(Recorded::Rollout(cmd.clone()));
        for open in self
            .store
            .all_opportunities(&cmd.tenant, &cmd.contract_id)
            .into_iter()
            .filter(RenewalOpportunity::is_open)
        {
            self.store
                .mutate_opportunity(&cmd.tenant, &cmd.contract_id, &open.id, |o| {
                    o.internal_stage = OpportunityStage::Closed;
                });
        }
        let id = self.fresh_id("op");
        self.store.insert_opportunity(
            &cmd.tenant,
            RenewalOpportunity {
                id: id.clone(),
                contract_id: cmd.contract_id.clone(),
                internal_type: OpportunityType::Renewal,
                internal_stage: OpportunityStage::Open,
                amount: 0.0,
                max_amount: 0.0,
                renewal_likelihood: RenewalLikelihood::High,
                renewal_adjusted_rate: 100,
                renewed_at: None,
                renewal_approved: false,
                owner_user_id: None,
            },
        );
        Ok(id)
    }

    async fn soft_delete_contract(&self, cmd: &SoftDeleteContract) -> EngineResult<()> {
        self.record(Recorded::SoftDeleteContract(cmd.clone()));
        self.store.remove_contract(&cmd.tenant, &cmd.contract_id);
        Ok(())
    }

    async fn create_contract(&self, cmd: &CreateContract) -> EngineResult<String> {
        self.record(Recorded::CreateContract(cmd.clone()));
        self.store.put_contract(Contract {
            id: cmd.contract_id.clone(),
            tenant: cmd.tenant.clone(),
            organization_id: cmd.organization_id.clone(),
            name: cmd.name.clone(),
            service_started_at: cmd.service_started_at,
            signed_at: cmd.signed_at,
            ended_at: None,
            invoicing_start_date: cmd.invoicing_start_date,
            length_in_months: cmd.length_in_months,
            billing_cycle_in_months: cmd.billing_cycle_in_months,
            invoicing_enabled: false,
            auto_renew: cmd.auto_renew,
            status: ContractStatus::Draft,
            currency: cmd.currency.clone(),
            approved: cmd.approved,
        });
        Ok(cmd.contract_id.clone())
    }

    async fn update_contract(&self, cmd: &UpdateContract) -> EngineResult<()> {
        self.record(Recorded::UpdateContract(cmd.clone()));
        let existing = self
            .store
            .get_contract(&cmd.tenant, &cmd.contract_id)
            .await?;
        if let Some(mut contract) = existing {
            if cmd.mask.contains(&ContractField::Name) {
                if let Some(name) = &cmd.name {
                    contract.name = name.clone();
                }
            }
            if cmd.mask.contains(&ContractField::LengthInMonths) {
                if let Some(length) = cmd.length_in_months {
                    contract.length_in_months = length;
                }
            }
            if cmd.mask.contains(&ContractField::BillingCycleInMonths) {
                if let Some(cycle) = cmd.billing_cycle_in_months {
                    contract.billing_cycle_in_months = cycle;
                }
            }
            if cmd.mask.contains(&ContractField::AutoRenew) {
                if let Some(auto_renew) = cmd.auto_renew {
                    contract.auto_renew = auto_renew;
                }
            }
            if cmd.mask.contains(&ContractField::Currency) {
                if let Some(currency) = &cmd.currency {
                    contract.currency = currency.clone();
                }
            }
            if cmd.mask.contains(&ContractField::SignedAt) {
                contract.signed_at = cmd.signed_at;
            }
            if cmd.mask.contains(&ContractField::ServiceStartedAt) {
                contract.service_started_at = cmd.service_started_at;
            }
            if cmd.mask.contains(&ContractField::EndedAt) {
                contract.ended_at = cmd.ended_at;
            }
            if cmd.mask.contains(&ContractField::InvoicingStartDate) {
                contract.invoicing_start_date = cmd.invoicing_start_date;
            }
            if cmd.mask.contains(&ContractField::Approved) {
                if let Some(approved) = cmd.approved {
                    contract.approved = approved;
                }
            }
            if cmd.mask.contains(&ContractField::InvoicingEnabled) {
                if let Some(enabled) = cmd.invoicing_enabled {
                    contract.invoicing_enabled = enabled;
                }
            }
            self.store.put_contract(contract);
        }
        Ok(())
    }
}

/// One assembled engine over shared fakes.
pub struct Harness {
    pub store: Arc<InMemoryGraphStore>,
    pub bus: Arc<ApplyingBus>,
    pub clock: Arc<FixedClock>,
    pub deps: EngineDeps,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        let store = Arc::new(InMemoryGraphStore::default());
        let bus = Arc::new(ApplyingBus::new(store.clone()));
        let clock = Arc::new(FixedClock::new(now));
        let settings = Arc::new(StaticTenantSettings {
            settings: Some(TenantSettings {
                base_currency: "USD".to_string(),
            }),
            billing_profile: Some(TenantBillingProfile {
                country: "US".to_string(),
            }),
        });
        let deps = EngineDeps {
            store: store.clone(),
            bus: bus.clone(),
            settings,
            clock: clock.clone(),
        };
        Self {
            store,
            bus,
            clock,
            deps,
        }
    }

    pub fn orchestrator(&self) -> RenewalOrchestrator {
        RenewalOrchestrator::new(&self.deps, EngineConfig::default())
    }

    /// The single open opportunity of a contract, when exactly one exists.
    pub fn open_opportunity(&self, contract_id: &str) -> Option<RenewalOpportunity> {
        let mut open: Vec<_> = self
            .store
            .all_opportunities(TENANT, contract_id)
            .into_iter()
            .filter(RenewalOpportunity::is_open)
            .collect();
        match open.len() {
            1 => open.pop(),
            _ => None,
        }
    }

    pub fn open_count(&self, contract_id: &str) -> usize {
        self.store
            .all_opportunities(TENANT, contract_id)
            .into_iter()
            .filter(RenewalOpportunity::is_open)
            .count()
    }
}

pub fn contract(id: &str, length_in_months: u32) -> Contract {
    Contract {
        id: id.to_string(),
        tenant: TENANT.to_string(),
        organization_id: "org-1".to_string(),
        name: format!("contract {id}"),
        service_started_at: Some(utc(2021, 1, 1)),
        signed_at: Some(utc(2020, 12, 15)),
        ended_at: None,
        invoicing_start_date: None,
        length_in_months,
        billing_cycle_in_months: 1,
        invoicing_enabled: true,
        auto_renew: false,
        status: ContractStatus::Live,
        currency: "USD".to_string(),
        approved: true,
    }
}

pub fn open_opportunity(
    id: &str,
    contract_id: &str,
    renewed_at: Option<DateTime<Utc>>,
) -> RenewalOpportunity {
    RenewalOpportunity {
        id: id.to_string(),
        contract_id: contract_id.to_string(),
        internal_type: OpportunityType::Renewal,
        internal_stage: OpportunityStage::Open,
        amount: 0.0,
        max_amount: 0.0,
        renewal_likelihood: RenewalLikelihood::High,
        renewal_adjusted_rate: 100,
        renewed_at,
        renewal_approved: false,
        owner_user_id: None,
    }
}

pub fn annual_sli(id: &str, price: f64, quantity: u64) -> ServiceLineItem {
    ServiceLineItem {
        id: id.to_string(),
        parent_id: None,
        name: format!("line {id}"),
        price,
        quantity,
        billed: BilledType::Annually,
        started_at: utc(2020, 1, 1),
        ended_at: None,
        paused: false,
        canceled: false,
        comments: String::new(),
    }
}
