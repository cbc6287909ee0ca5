// AGENT-AUTHORED (TCK-00701)
//! Command bus adapter and retrying dispatcher.
//!
//! Retry lives here and nowhere else: every other component treats the
//! command bus as synchronous and either succeeds or returns a
//! classified error. Transient failures back off exponentially; permanent
//! rejections propagate on the first attempt.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use renova_core::error::{EngineError, EngineResult};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::commands::{
    CreateContract, CreateRenewalOpportunity, RolloutRenewalOpportunityOnExpiration,
    SoftDeleteContract, UpdateContract, UpdateOpportunity, UpdateRenewalOpportunity,
    UpdateRenewalOpportunityNextCycleDate,
};
use crate::config::{FenceConfig, RetryConfig};
use crate::store::GraphStore;

/// Mutations the engine issues against the external aggregate bus.
///
/// Each call is a single request/response; transport framing is the
/// implementor's business. Implementations classify failures: transient
/// ones (connection reset, deadline exceeded, unavailable) come back as
/// [`EngineError::Transient`] and are retried by the dispatcher,
/// everything else propagates.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Opens a renewal opportunity; returns the new opportunity id.
    async fn create_renewal_opportunity(
        &self,
        cmd: &CreateRenewalOpportunity,
    ) -> EngineResult<String>;

    /// Moves an opportunity's renewal date.
    async fn update_renewal_opportunity_next_cycle_date(
        &self,
        cmd: &UpdateRenewalOpportunityNextCycleDate,
    ) -> EngineResult<()>;

    /// Applies a masked forecast update.
    async fn update_opportunity(&self, cmd: &UpdateOpportunity) -> EngineResult<()>;

    /// Applies a masked renewal-field update.
    async fn update_renewal_opportunity(&self, cmd: &UpdateRenewalOpportunity)
        -> EngineResult<()>;

    /// Closes the expired opportunity and opens the next; returns the new
    /// opportunity id.
    async fn rollout_renewal_opportunity_on_expiration(
        &self,
        cmd: &RolloutRenewalOpportunityOnExpiration,
    ) -> EngineResult<String>;

    /// Soft-deletes a contract aggregate.
    async fn soft_delete_contract(&self, cmd: &SoftDeleteContract) -> EngineResult<()>;

    /// Creates a contract aggregate; returns the contract id.
    async fn create_contract(&self, cmd: &CreateContract) -> EngineResult<String>;

    /// Applies a masked contract update.
    async fn update_contract(&self, cmd: &UpdateContract) -> EngineResult<()>;
}

/// The retrying command dispatcher.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Dispatcher {
    bus: Arc<dyn CommandBus>,
    store: Arc<dyn GraphStore>,
    retry: RetryConfig,
    fence: FenceConfig,
}

impl Dispatcher {
    /// Builds a dispatcher over `bus`, using `store` for write fences.
    #[must_use]
    pub fn new(
        bus: Arc<dyn CommandBus>,
        store: Arc<dyn GraphStore>,
        retry: RetryConfig,
        fence: FenceConfig,
    ) -> Self {
        Self {
            bus,
            store,
            retry,
            fence,
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => {
                    debug!(operation, attempt, "command dispatched");
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient command failure, backing off"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Dispatches [`CreateRenewalOpportunity`] and returns the new
    /// opportunity id.
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors;
    /// transient errors only after the attempt budget is spent.
    pub async fn create_renewal_opportunity(
        &self,
        cmd: &CreateRenewalOpportunity,
    ) -> EngineResult<String> {
        cmd.validate()?;
        self.with_retry("create_renewal_opportunity", || {
            self.bus.create_renewal_opportunity(cmd)
        })
        .await
    }

    /// Dispatches [`UpdateRenewalOpportunityNextCycleDate`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn update_renewal_opportunity_next_cycle_date(
        &self,
        cmd: &UpdateRenewalOpportunityNextCycleDate,
    ) -> EngineResult<()> {
        cmd.validate()?;
        self.with_retry("update_renewal_opportunity_next_cycle_date", || {
            self.bus.update_renewal_opportunity_next_cycle_date(cmd)
        })
        .await
    }

    /// Dispatches [`UpdateOpportunity`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn update_opportunity(&self, cmd: &UpdateOpportunity) -> EngineResult<()> {
        cmd.validate()?;
        self.with_retry("update_opportunity", || self.bus.update_opportunity(cmd))
            .await
    }

    /// Dispatches [`UpdateRenewalOpportunity`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn update_renewal_opportunity(
        &self,
        cmd: &UpdateRenewalOpportunity,
    ) -> EngineResult<()> {
        cmd.validate()?;
        self.with_retry("update_renewal_opportunity", || {
            self.bus.update_renewal_opportunity(cmd)
        })
        .await
    }

    /// Dispatches [`RolloutRenewalOpportunityOnExpiration`] and returns
    /// the replacement opportunity id.
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn rollout_renewal_opportunity_on_expiration(
        &self,
        cmd: &RolloutRenewalOpportunityOnExpiration,
    ) -> EngineResult<String> {
        cmd.validate()?;
        self.with_retry("rollout_renewal_opportunity_on_expiration", || {
            self.bus.rollout_renewal_opportunity_on_expiration(cmd)
        })
        .await
    }

    /// Dispatches [`SoftDeleteContract`], then polls the graph store
    /// until the node disappears.
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors, and
    /// returns [`EngineError::Canceled`] when the node is still visible
    /// after the fence budget.
    pub async fn soft_delete_contract(&self, cmd: &SoftDeleteContract) -> EngineResult<()> {
        cmd.validate()?;
        self.with_retry("soft_delete_contract", || self.bus.soft_delete_contract(cmd))
            .await?;
        self.await_fence("soft_delete_contract", &cmd.tenant, &cmd.contract_id, false)
            .await
    }

    /// Dispatches [`CreateContract`] and returns the contract id.
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn create_contract(&self, cmd: &CreateContract) -> EngineResult<String> {
        cmd.validate()?;
        self.with_retry("create_contract", || self.bus.create_contract(cmd))
            .await
    }

    /// Dispatches [`UpdateContract`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures and non-transient bus errors.
    pub async fn update_contract(&self, cmd: &UpdateContract) -> EngineResult<()> {
        cmd.validate()?;
        self.with_retry("update_contract", || self.bus.update_contract(cmd))
            .await
    }

    /// Blocks until the contract node is visible in the graph store.
    ///
    /// Read-your-write fence for UIs sitting on the command surface.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Canceled`] when the write is still
    /// invisible after the fence budget, and propagates store read
    /// errors.
    pub async fn await_contract_visible(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> EngineResult<()> {
        self.await_fence("await_contract_visible", tenant, contract_id, true)
            .await
    }

    async fn await_fence(
        &self,
        operation: &'static str,
        tenant: &str,
        contract_id: &str,
        want_present: bool,
    ) -> EngineResult<()> {
        let deadline = Instant::now() + Duration::from_millis(self.fence.budget_ms);
        let period = Duration::from_millis(self.fence.poll_ms);
        loop {
            if self.store.exists_contract(tenant, contract_id).await? == want_present {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(operation, contract_id, want_present, "write fence timed out");
                return Err(EngineError::canceled(operation));
            }
            sleep(period).await;
        }
    }
}
