//! Renewal opportunities: the record tracking a contract's next
//! commercial decision point.
//!
//! At most one opportunity per contract is ever `Open`; that one is the
//! *active* renewal opportunity every other part of the engine reads and
//! mutates. Rolling over on expiry closes the current opportunity and
//! opens the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound of the adjusted-rate percentage.
pub const MAX_ADJUSTED_RATE: u8 = 100;

/// Internal opportunity kind; the engine only ever creates renewals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    /// Tracks an upcoming contract renewal.
    Renewal,
}

/// Internal pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    /// Pending commercial decision.
    Open,
    /// Decided, either rolled over or terminated with its contract.
    Closed,
}

/// How likely the customer is to renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalLikelihood {
    /// Renewal is expected.
    High,
    /// Renewal is uncertain.
    Medium,
    /// Renewal is at risk.
    Low,
    /// Renewal will not happen (terminated contracts).
    Zero,
}

impl RenewalLikelihood {
    /// Default adjusted rate implied by a likelihood, used when the
    /// lifecycle policy forces a transition.
    #[must_use]
    pub const fn default_adjusted_rate(self) -> u8 {
        match self {
            Self::High => 100,
            Self::Medium => 50,
            Self::Low => 25,
            Self::Zero => 0,
        }
    }
}

/// The auxiliary record tracking a contract's next renewal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewalOpportunity {
    /// Opportunity id.
    pub id: String,
    /// Owning contract.
    pub contract_id: String,
    /// Always [`OpportunityType::Renewal`] for engine-created records.
    pub internal_type: OpportunityType,
    /// Open or closed.
    pub internal_stage: OpportunityStage,
    /// Committed ARR forecast, in the contract currency.
    pub amount: f64,
    /// Maximum ARR forecast, in the contract currency.
    pub max_amount: f64,
    /// Renewal likelihood.
    pub renewal_likelihood: RenewalLikelihood,
    /// Discount factor against `max_amount`, percent in `[0, 100]`.
    pub renewal_adjusted_rate: u8,
    /// The next renewal date this opportunity represents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_at: Option<DateTime<Utc>>,
    /// Whether a user approved the renewal explicitly.
    #[serde(default)]
    pub renewal_approved: bool,
    /// Sales owner, carried through updates untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
}

impl RenewalOpportunity {
    /// Returns `true` while the opportunity is pending decision.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.internal_stage, OpportunityStage::Open)
    }

    /// Returns `true` if the renewal date exists and has passed `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.renewed_at.map_or(false, |renewed_at| renewed_at <= now)
    }
}
