//! Typed commands for the external aggregate bus.
//!
//! Contracts and opportunities are event-sourced aggregates owned by an
//! external command bus; every engine mutation is one of the records in
//! this module. Updates carry an explicit field mask, which is what makes
//! re-issuing a command with the same mask and values safe: the aggregate
//! applies exactly the masked fields, nothing else.

use chrono::{DateTime, Utc};
use renova_core::contract::RenewalCycle;
use renova_core::error::EngineError;
use renova_core::opportunity::{RenewalLikelihood, MAX_ADJUSTED_RATE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted length for ids and short strings in commands.
pub const MAX_FIELD_LENGTH: usize = 256;

/// Command validation failures.
///
/// These are caller defects, not transport failures; the dispatcher
/// refuses the command without touching the bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A required field is empty.
    #[error("command field {field} is empty")]
    EmptyField {
        /// Offending field.
        field: &'static str,
    },
    /// A field exceeds the accepted length.
    #[error("command field {field} length {len} exceeds {max}")]
    FieldTooLong {
        /// Offending field.
        field: &'static str,
        /// Observed length.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },
    /// The update mask is empty: the command would be a no-op.
    #[error("update mask is empty")]
    EmptyMask,
    /// A masked field has no value, or a value has no mask entry.
    #[error("mask and values disagree on {field}")]
    MaskMismatch {
        /// Offending field.
        field: &'static str,
    },
    /// The adjusted rate is outside `[0, 100]`.
    #[error("adjusted rate {value} exceeds {MAX_ADJUSTED_RATE}")]
    RateOutOfRange {
        /// The rejected value.
        value: u8,
    },
}

impl From<CommandError> for EngineError {
    fn from(err: CommandError) -> Self {
        Self::permanent("command validation", err.to_string())
    }
}

const fn check_non_empty(field: &'static str, value: &str) -> Result<(), CommandError> {
    if value.is_empty() {
        return Err(CommandError::EmptyField { field });
    }
    Ok(())
}

const fn check_length(field: &'static str, value: &str) -> Result<(), CommandError> {
    if value.len() > MAX_FIELD_LENGTH {
        return Err(CommandError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_FIELD_LENGTH,
        });
    }
    Ok(())
}

fn check_id(field: &'static str, value: &str) -> Result<(), CommandError> {
    check_non_empty(field, value)?;
    check_length(field, value)
}

/// Opportunity fields an update mask may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityField {
    /// Committed ARR amount.
    Amount,
    /// Maximum ARR amount.
    MaxAmount,
    /// Renewal likelihood.
    Likelihood,
    /// Adjusted rate percentage.
    AdjustedRate,
    /// Next renewal date.
    RenewedAt,
    /// Explicit user approval flag.
    RenewalApproved,
}

/// Contract fields an update mask may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractField {
    /// Display name.
    Name,
    /// Renewal cycle length in months.
    LengthInMonths,
    /// Invoicing cadence in months.
    BillingCycleInMonths,
    /// Auto-renew flag.
    AutoRenew,
    /// Currency code.
    Currency,
    /// Signature timestamp.
    SignedAt,
    /// Service start timestamp.
    ServiceStartedAt,
    /// Termination timestamp.
    EndedAt,
    /// Invoicing start date.
    InvoicingStartDate,
    /// Approval flag.
    Approved,
    /// Invoicing switch.
    InvoicingEnabled,
}

fn check_mask<F: Ord + Copy>(mask: &[F]) -> Result<(), CommandError> {
    if mask.is_empty() {
        return Err(CommandError::EmptyMask);
    }
    Ok(())
}

fn check_masked<F: PartialEq + Copy, T>(
    mask: &[F],
    field: F,
    value: &Option<T>,
    name: &'static str,
) -> Result<(), CommandError> {
    if mask.contains(&field) != value.is_some() {
        return Err(CommandError::MaskMismatch { field: name });
    }
    Ok(())
}

/// Opens a renewal opportunity for a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRenewalOpportunity {
    /// Tenancy partition.
    pub tenant: String,
    /// Owning contract.
    pub contract_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// Renewal date to open with, when already known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_at: Option<DateTime<Utc>>,
    /// Initial likelihood.
    pub likelihood: RenewalLikelihood,
    /// Initial adjusted rate.
    pub adjusted_rate: u8,
}

impl CreateRenewalOpportunity {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields or an
    /// out-of-range rate.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("contract_id", &self.contract_id)?;
        check_length("actor_user_id", &self.actor_user_id)?;
        if self.adjusted_rate > MAX_ADJUSTED_RATE {
            return Err(CommandError::RateOutOfRange {
                value: self.adjusted_rate,
            });
        }
        Ok(())
    }
}

/// Moves the renewal date of an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRenewalOpportunityNextCycleDate {
    /// Tenancy partition.
    pub tenant: String,
    /// Target opportunity.
    pub opportunity_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// The renewal date to write.
    pub renewed_at: DateTime<Utc>,
}

impl UpdateRenewalOpportunityNextCycleDate {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("opportunity_id", &self.opportunity_id)?;
        check_length("actor_user_id", &self.actor_user_id)
    }
}

/// Masked update of opportunity forecast fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOpportunity {
    /// Tenancy partition.
    pub tenant: String,
    /// Target opportunity.
    pub opportunity_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// Fields the aggregate applies.
    pub mask: Vec<OpportunityField>,
    /// Committed ARR, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Maximum ARR, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
}

impl UpdateOpportunity {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields, an empty
    /// mask, or mask/value disagreement.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("opportunity_id", &self.opportunity_id)?;
        check_length("actor_user_id", &self.actor_user_id)?;
        check_mask(&self.mask)?;
        check_masked(&self.mask, OpportunityField::Amount, &self.amount, "amount")?;
        check_masked(
            &self.mask,
            OpportunityField::MaxAmount,
            &self.max_amount,
            "max_amount",
        )
    }
}

/// Masked update of renewal-specific opportunity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRenewalOpportunity {
    /// Tenancy partition.
    pub tenant: String,
    /// Target opportunity.
    pub opportunity_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// Fields the aggregate applies.
    pub mask: Vec<OpportunityField>,
    /// Likelihood, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<RenewalLikelihood>,
    /// Adjusted rate, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_rate: Option<u8>,
    /// Renewal date, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_at: Option<DateTime<Utc>>,
    /// Approval flag, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_approved: Option<bool>,
}

impl UpdateRenewalOpportunity {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields, an empty
    /// mask, mask/value disagreement, or an out-of-range rate.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("opportunity_id", &self.opportunity_id)?;
        check_length("actor_user_id", &self.actor_user_id)?;
        check_mask(&self.mask)?;
        check_masked(
            &self.mask,
            OpportunityField::Likelihood,
            &self.likelihood,
            "likelihood",
        )?;
        check_masked(
            &self.mask,
            OpportunityField::AdjustedRate,
            &self.adjusted_rate,
            "adjusted_rate",
        )?;
        check_masked(
            &self.mask,
            OpportunityField::RenewedAt,
            &self.renewed_at,
            "renewed_at",
        )?;
        check_masked(
            &self.mask,
            OpportunityField::RenewalApproved,
            &self.renewal_approved,
            "renewal_approved",
        )?;
        if let Some(rate) = self.adjusted_rate {
            if rate > MAX_ADJUSTED_RATE {
                return Err(CommandError::RateOutOfRange { value: rate });
            }
        }
        Ok(())
    }
}

/// Closes the expired opportunity and opens the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloutRenewalOpportunityOnExpiration {
    /// Tenancy partition.
    pub tenant: String,
    /// Owning contract.
    pub contract_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
}

impl RolloutRenewalOpportunityOnExpiration {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("contract_id", &self.contract_id)?;
        check_length("actor_user_id", &self.actor_user_id)
    }
}

/// Soft-deletes a contract aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftDeleteContract {
    /// Tenancy partition.
    pub tenant: String,
    /// Target contract.
    pub contract_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
}

impl SoftDeleteContract {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("contract_id", &self.contract_id)?;
        check_length("actor_user_id", &self.actor_user_id)
    }
}

/// Creates a contract aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateContract {
    /// Tenancy partition.
    pub tenant: String,
    /// Client-generated contract id.
    pub contract_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// Owning customer organization.
    pub organization_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Currency code, already defaulted by the surface.
    pub currency: String,
    /// Billing country, already defaulted by the surface.
    #[serde(default)]
    pub billing_country: String,
    /// Invoicing cadence in months.
    pub billing_cycle_in_months: u32,
    /// Renewal cycle length in months.
    pub length_in_months: u32,
    /// Auto-renew flag.
    pub auto_renew: bool,
    /// Approval flag.
    pub approved: bool,
    /// Service start, when known at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_started_at: Option<DateTime<Utc>>,
    /// Signature timestamp, when known at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    /// Invoicing start, when known at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoicing_start_date: Option<DateTime<Utc>>,
}

impl CreateContract {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity or currency fields.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("contract_id", &self.contract_id)?;
        check_id("organization_id", &self.organization_id)?;
        check_length("actor_user_id", &self.actor_user_id)?;
        check_non_empty("currency", &self.currency)?;
        check_length("currency", &self.currency)?;
        check_length("name", &self.name)?;
        check_length("billing_country", &self.billing_country)
    }
}

/// Masked update of contract fields.
///
/// Each optional date field is written from its own input; providing one
/// never touches the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateContract {
    /// Tenancy partition.
    pub tenant: String,
    /// Target contract.
    pub contract_id: String,
    /// User or system identity issuing the command.
    pub actor_user_id: String,
    /// Fields the aggregate applies.
    pub mask: Vec<ContractField>,
    /// Display name, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Renewal cycle length, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_in_months: Option<u32>,
    /// Invoicing cadence, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_cycle_in_months: Option<u32>,
    /// Auto-renew flag, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_renew: Option<bool>,
    /// Currency code, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Signature timestamp, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    /// Service start, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_started_at: Option<DateTime<Utc>>,
    /// Termination timestamp, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Invoicing start, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoicing_start_date: Option<DateTime<Utc>>,
    /// Approval flag, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Invoicing switch, present iff masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoicing_enabled: Option<bool>,
}

impl UpdateContract {
    /// Validates the command before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] on malformed identity fields, an empty
    /// mask, or mask/value disagreement.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_id("tenant", &self.tenant)?;
        check_id("contract_id", &self.contract_id)?;
        check_length("actor_user_id", &self.actor_user_id)?;
        check_mask(&self.mask)?;
        check_masked(&self.mask, ContractField::Name, &self.name, "name")?;
        check_masked(
            &self.mask,
            ContractField::LengthInMonths,
            &self.length_in_months,
            "length_in_months",
        )?;
        check_masked(
            &self.mask,
            ContractField::BillingCycleInMonths,
            &self.billing_cycle_in_months,
            "billing_cycle_in_months",
        )?;
        check_masked(
            &self.mask,
            ContractField::AutoRenew,
            &self.auto_renew,
            "auto_renew",
        )?;
        check_masked(&self.mask, ContractField::Currency, &self.currency, "currency")?;
        check_masked(&self.mask, ContractField::SignedAt, &self.signed_at, "signed_at")?;
        check_masked(
            &self.mask,
            ContractField::ServiceStartedAt,
            &self.service_started_at,
            "service_started_at",
        )?;
        check_masked(&self.mask, ContractField::EndedAt, &self.ended_at, "ended_at")?;
        check_masked(
            &self.mask,
            ContractField::InvoicingStartDate,
            &self.invoicing_start_date,
            "invoicing_start_date",
        )?;
        check_masked(&self.mask, ContractField::Approved, &self.approved, "approved")?;
        check_masked(
            &self.mask,
            ContractField::InvoicingEnabled,
            &self.invoicing_enabled,
            "invoicing_enabled",
        )
    }
}

/// Derives the cycle length in months from explicit input or the legacy
/// cycle/periods pair.
///
/// The periods multiplier only ever applied to annual cycles; monthly and
/// quarterly contracts ignore it.
#[must_use]
pub fn derive_length_in_months(
    explicit: Option<u32>,
    legacy_cycle: Option<RenewalCycle>,
    legacy_periods: Option<u32>,
) -> Option<u32> {
    if explicit.is_some() {
        return explicit;
    }
    legacy_cycle.map(|cycle| match cycle {
        RenewalCycle::Annual => cycle.months() * legacy_periods.unwrap_or(1).max(1),
        RenewalCycle::Monthly | RenewalCycle::Quarterly => cycle.months(),
    })
}
