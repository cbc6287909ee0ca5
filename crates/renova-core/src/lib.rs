//! # renova-core
//!
//! Domain model and pure computation for the contract & renewal
//! opportunity lifecycle engine.
//!
//! This crate holds everything that can be computed without I/O: entity
//! records, UTC calendar arithmetic, the ARR forecast evaluator, the
//! next-renewal-date computation, and the lifecycle-derived likelihood
//! policy. The async engine in `renova-engine` composes these under the
//! ordering and serialization rules of the reconcile loop.
//!
//! ## Determinism
//!
//! Every function here is deterministic from its inputs; the current
//! instant is always a parameter, never an ambient read. That property is
//! what makes a reconcile safe to rerun: equal inputs produce equal
//! desired state, and the second run issues nothing.

pub mod arr;
pub mod calendar;
pub mod contract;
pub mod error;
pub mod likelihood;
pub mod opportunity;
pub mod renewal;
pub mod sli;

pub use arr::{evaluate as evaluate_arr, ArrForecast, ArrQuery};
pub use contract::{Contract, ContractStatus, ContractValidationError, RenewalCycle};
pub use error::{EngineError, EngineResult, ErrorClass};
pub use likelihood::{derive_transition, LikelihoodChange};
pub use opportunity::{
    OpportunityStage, OpportunityType, RenewalLikelihood, RenewalOpportunity,
};
pub use renewal::compute_renewal_date;
pub use sli::{BilledType, ServiceLineItem, SliValidationError};
