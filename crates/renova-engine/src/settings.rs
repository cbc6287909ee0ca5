//! Tenant settings provider.
//!
//! Contract creation defaults (currency, billing country) come from the
//! tenant's settings and default billing profile, read behind this
//! trait.

use async_trait::async_trait;
use renova_core::error::EngineResult;
use serde::{Deserialize, Serialize};

/// Tenant-wide settings relevant to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TenantSettings {
    /// Currency assigned to contracts created without one.
    #[serde(default)]
    pub base_currency: String,
}

/// The tenant's default billing profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TenantBillingProfile {
    /// Billing country assigned to contracts created without one.
    #[serde(default)]
    pub country: String,
}

/// Read access to tenant configuration.
#[async_trait]
pub trait TenantSettingsProvider: Send + Sync {
    /// Loads the tenant's settings, `None` when the tenant has none.
    async fn get_tenant_settings(&self, tenant: &str) -> EngineResult<Option<TenantSettings>>;

    /// Loads the tenant's default billing profile, `None` when absent.
    async fn get_default_billing_profile(
        &self,
        tenant: &str,
    ) -> EngineResult<Option<TenantBillingProfile>>;
}

/// Fixed settings for tests and single-tenant embedders.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantSettings {
    /// Settings returned for every tenant.
    pub settings: Option<TenantSettings>,
    /// Billing profile returned for every tenant.
    pub billing_profile: Option<TenantBillingProfile>,
}

#[async_trait]
impl TenantSettingsProvider for StaticTenantSettings {
    async fn get_tenant_settings(&self, _tenant: &str) -> EngineResult<Option<TenantSettings>> {
        Ok(self.settings.clone())
    }

    async fn get_default_billing_profile(
        &self,
        _tenant: &str,
    ) -> EngineResult<Option<TenantBillingProfile>> {
        Ok(self.billing_profile.clone())
    }
}
