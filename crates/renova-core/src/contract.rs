//! Contract entity and lifecycle status.
//!
//! A contract is the aggregate root of the renewal engine: it owns its
//! service line items and at most one open renewal opportunity. The
//! `tenant` and `id` fields are immutable; everything else may be
//! rewritten by the command surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted id length for contracts.
pub const MAX_CONTRACT_ID_LENGTH: usize = 256;

/// Billing cycles the invoicing pipeline understands, in months.
/// Zero marks a non-invoiced contract.
pub const SUPPORTED_BILLING_CYCLES: [u32; 4] = [0, 1, 3, 12];

/// Contract lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Being drafted, not yet in effect.
    Draft,
    /// Signed with a future service start.
    Scheduled,
    /// In effect and billable.
    Live,
    /// Terminated.
    Ended,
}

impl ContractStatus {
    /// Returns `true` for the terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// Legacy renewal cycle names still accepted by the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalCycle {
    /// Renews every month.
    Monthly,
    /// Renews every quarter.
    Quarterly,
    /// Renews every year.
    Annual,
}

impl RenewalCycle {
    /// Cycle length in months before the periods multiplier.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Annual => 12,
        }
    }
}

/// A time-bounded commercial agreement with one customer organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contract {
    /// Contract id, immutable.
    pub id: String,
    /// Tenancy partition, immutable.
    pub tenant: String,
    /// Owning customer organization.
    #[serde(default)]
    pub organization_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// When the contract became billable, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_started_at: Option<DateTime<Utc>>,
    /// When the contract was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    /// When the contract terminated or will terminate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// First day invoices may be generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoicing_start_date: Option<DateTime<Utc>>,
    /// Renewal cycle length in months; zero means one-shot, never renewed.
    pub length_in_months: u32,
    /// Invoicing cadence in months (0, 1, 3, or 12).
    pub billing_cycle_in_months: u32,
    /// Whether invoicing is switched on for this contract.
    #[serde(default)]
    pub invoicing_enabled: bool,
    /// Whether the contract rolls over automatically on expiry.
    pub auto_renew: bool,
    /// Lifecycle status.
    pub status: ContractStatus,
    /// ISO currency code for all amounts under this contract.
    pub currency: String,
    /// A draft that is unapproved must never be rolled over.
    #[serde(default)]
    pub approved: bool,
}

/// Validation failures for a stored contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractValidationError {
    /// The id is empty or too long.
    #[error("invalid contract id: {reason}")]
    InvalidId {
        /// Why the id was rejected.
        reason: String,
    },
    /// The tenant partition is empty.
    #[error("contract {id} has no tenant")]
    MissingTenant {
        /// Offending contract.
        id: String,
    },
    /// The billing cycle is not one the invoicing pipeline supports.
    #[error("contract {id} has unsupported billing cycle {cycle} months")]
    UnsupportedBillingCycle {
        /// Offending contract.
        id: String,
        /// The rejected cycle.
        cycle: u32,
    },
    /// A terminated timestamp without the terminal status, or vice versa.
    #[error("contract {id} has ended_at and status out of step")]
    EndedStateMismatch {
        /// Offending contract.
        id: String,
    },
}

impl Contract {
    /// Returns `true` if the contract can ever hold a renewal opportunity.
    #[must_use]
    pub const fn is_renewable(&self) -> bool {
        self.length_in_months > 0
    }

    /// Returns `true` if the contract is terminated as of `now`.
    ///
    /// Either the status already says so, or a set `ended_at` has passed.
    #[must_use]
    pub fn is_ended(&self, now: DateTime<Utc>) -> bool {
        if matches!(self.status, ContractStatus::Ended) {
            return true;
        }
        self.ended_at.map_or(false, |end| end <= now)
    }

    /// Validates stored fields against engine invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ContractValidationError`] when identity fields are
    /// malformed, the billing cycle is unsupported, or `ended_at` and
    /// `status` disagree.
    pub fn validate(&self) -> Result<(), ContractValidationError> {
        if self.id.is_empty() {
            return Err(ContractValidationError::InvalidId {
                reason: "empty".to_string(),
            });
        }
        if self.id.len() > MAX_CONTRACT_ID_LENGTH {
            return Err(ContractValidationError::InvalidId {
                reason: format!("length {} exceeds {MAX_CONTRACT_ID_LENGTH}", self.id.len()),
            });
        }
        if self.tenant.is_empty() {
            return Err(ContractValidationError::MissingTenant {
                id: self.id.clone(),
            });
        }
        if !SUPPORTED_BILLING_CYCLES.contains(&self.billing_cycle_in_months) {
            return Err(ContractValidationError::UnsupportedBillingCycle {
                id: self.id.clone(),
                cycle: self.billing_cycle_in_months,
            });
        }
        // ended_at in the past requires the terminal status; a future
        // ended_at on a live contract is a scheduled termination.
        if self.status == ContractStatus::Ended && self.ended_at.is_none() {
            return Err(ContractValidationError::EndedStateMismatch {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .expect("valid test instant")
    }

    fn live_contract() -> Contract {
        Contract {
            id: "c-1".to_string(),
            tenant: "acme".to_string(),
            organization_id: "org-1".to_string(),
            name: "Acme subscription".to_string(),
            service_started_at: Some(utc(2024, 1, 1)),
            signed_at: Some(utc(2023, 12, 15)),
            ended_at: None,
            invoicing_start_date: Some(utc(2024, 1, 1)),
            length_in_months: 12,
            billing_cycle_in_months: 1,
            invoicing_enabled: true,
            auto_renew: true,
            status: ContractStatus::Live,
            currency: "USD".to_string(),
            approved: true,
        }
    }

    #[test]
    fn renewable_requires_positive_length() {
        let mut contract = live_contract();
        assert!(contract.is_renewable());
        contract.length_in_months = 0;
        assert!(!contract.is_renewable());
    }

    #[test]
    fn ended_by_status_or_past_timestamp() {
        let now = utc(2024, 6, 15);

        let mut by_status = live_contract();
        by_status.status = ContractStatus::Ended;
        by_status.ended_at = Some(utc(2024, 6, 1));
        assert!(by_status.is_ended(now));

        let mut by_timestamp = live_contract();
        by_timestamp.ended_at = Some(utc(2024, 6, 15));
        assert!(by_timestamp.is_ended(now));

        let mut scheduled_end = live_contract();
        scheduled_end.ended_at = Some(utc(2024, 7, 1));
        assert!(!scheduled_end.is_ended(now));

        assert!(!live_contract().is_ended(now));
    }

    #[test]
    fn validate_accepts_live_contract() {
        assert!(live_contract().validate().is_ok());
    }

    #[test]
    fn validate_rejects_defects() {
        let mut no_id = live_contract();
        no_id.id = String::new();
        assert!(matches!(
            no_id.validate(),
            Err(ContractValidationError::InvalidId { .. })
        ));

        let mut no_tenant = live_contract();
        no_tenant.tenant = String::new();
        assert!(matches!(
            no_tenant.validate(),
            Err(ContractValidationError::MissingTenant { .. })
        ));

        let mut bad_cycle = live_contract();
        bad_cycle.billing_cycle_in_months = 6;
        assert!(matches!(
            bad_cycle.validate(),
            Err(ContractValidationError::UnsupportedBillingCycle { cycle: 6, .. })
        ));

        let mut ended_without_timestamp = live_contract();
        ended_without_timestamp.status = ContractStatus::Ended;
        assert!(matches!(
            ended_without_timestamp.validate(),
            Err(ContractValidationError::EndedStateMismatch { .. })
        ));
    }

    #[test]
    fn serde_roundtrip_rejects_unknown_fields() {
        let contract = live_contract();
        let bytes = serde_json::to_vec(&contract).expect("serialize");
        let restored: Contract = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(contract, restored);

        let mut json: serde_json::Value = serde_json::to_value(&contract).expect("json value");
        json["unexpected_field"] = serde_json::Value::Bool(true);
        let tampered = serde_json::to_vec(&json).expect("serialize");
        assert!(serde_json::from_slice::<Contract>(&tampered).is_err());
    }

    #[test]
    fn renewal_cycle_months_table() {
        assert_eq!(RenewalCycle::Monthly.months(), 1);
        assert_eq!(RenewalCycle::Quarterly.months(), 3);
        assert_eq!(RenewalCycle::Annual.months(), 12);
    }

    #[test]
    fn status_terminality() {
        assert!(ContractStatus::Ended.is_terminal());
        assert!(!ContractStatus::Live.is_terminal());
        assert!(!ContractStatus::Draft.is_terminal());
        assert!(!ContractStatus::Scheduled.is_terminal());
    }
}
