//! # renova-engine
//!
//! Async engine keeping contracts, their service line items, and the
//! active renewal opportunity mutually consistent under external
//! mutations.
//!
//! The engine consumes four collaborators behind traits — graph store
//! reads, the aggregate command bus, tenant settings, and the wall
//! clock — and exposes two public types:
//!
//! - [`RenewalOrchestrator`]: event-triggered reconciles
//!   (renewal date, ARR forecast, likelihood) plus manual renewal.
//! - [`ContractCommandSurface`]: create/update/soft-delete contract
//!   commands with tenant defaulting and read-your-write fences.
//!
//! ## Correctness model
//!
//! Every reconcile reads current state, computes desired state with the
//! pure functions of `renova-core`, and issues at most one mutation per
//! concern. Reconciles are serialized per contract in-process, and the
//! command bus orders mutations per aggregate across processes. A failed
//! reconcile leaves no compensating writes behind; the next event
//! converges the surface again.

pub mod clock;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod lock;
pub mod orchestrator;
pub mod settings;
pub mod store;
pub mod surface;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, FenceConfig, RetryConfig};
pub use dispatch::{CommandBus, Dispatcher};
pub use orchestrator::{EngineDeps, ReconcileOutcome, ReconcileReport, RenewalOrchestrator};
pub use settings::{
    StaticTenantSettings, TenantBillingProfile, TenantSettings, TenantSettingsProvider,
};
pub use store::{load_active_renewal_opportunity, GraphStore, InMemoryGraphStore};
pub use surface::{ContractCommandSurface, CreateContractInput, UpdateContractInput};
