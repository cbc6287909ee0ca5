//! Service line items: priced, quantized charges with a billing cadence
//! and an activity window.
//!
//! A line item contributes to recurring revenue only while its activity
//! window covers the valuation date and it is neither paused nor
//! canceled. One-time and usage-based items never contribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted id length for line items.
pub const MAX_SLI_ID_LENGTH: usize = 256;

/// Billing cadence of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BilledType {
    /// One-time charge, never recurring.
    Once,
    /// Billed every month.
    Monthly,
    /// Billed every quarter.
    Quarterly,
    /// Billed every year.
    Annually,
    /// Usage-based, amount unknown ahead of time.
    Usage,
}

impl BilledType {
    /// Number of billing periods per year, zero for non-recurring kinds.
    #[must_use]
    pub const fn periods_per_year(self) -> u32 {
        match self {
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Annually => 1,
            Self::Once | Self::Usage => 0,
        }
    }

    /// Returns `true` for cadences that produce recurring revenue.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        self.periods_per_year() > 0
    }
}

/// A service line item attached to a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceLineItem {
    /// Line item id.
    pub id: String,
    /// Previous version in the amendment chain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Unit price, non-negative, in the contract currency.
    pub price: f64,
    /// Number of units.
    pub quantity: u64,
    /// Billing cadence.
    pub billed: BilledType,
    /// Start of the activity window.
    pub started_at: DateTime<Utc>,
    /// End of the activity window, open-ended when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Temporarily suspended.
    #[serde(default)]
    pub paused: bool,
    /// Permanently canceled.
    #[serde(default)]
    pub canceled: bool,
    /// Free-form operator comments, carried but never computed over.
    #[serde(default)]
    pub comments: String,
}

/// Validation failures for a stored line item.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SliValidationError {
    /// The id is empty or too long.
    #[error("invalid line item id: {reason}")]
    InvalidId {
        /// Why the id was rejected.
        reason: String,
    },
    /// The price is negative or not finite.
    #[error("line item {id} has invalid price {price}")]
    InvalidPrice {
        /// Offending line item.
        id: String,
        /// The rejected price.
        price: f64,
    },
    /// The activity window ends before it starts.
    #[error("line item {id} ends before it starts")]
    NonMonotonicWindow {
        /// Offending line item.
        id: String,
    },
}

impl ServiceLineItem {
    /// Returns `true` if this line item is active at `v`.
    ///
    /// Active means the window covers `v` (`started_at <= v < ended_at`)
    /// and the item is neither paused nor canceled.
    #[must_use]
    pub fn is_active_at(&self, v: DateTime<Utc>) -> bool {
        if self.paused || self.canceled {
            return false;
        }
        if self.started_at > v {
            return false;
        }
        self.ended_at.map_or(true, |end| v < end)
    }

    /// Validates stored fields against engine invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SliValidationError`] when the id is malformed, the price
    /// is negative or non-finite, or the activity window is inverted.
    pub fn validate(&self) -> Result<(), SliValidationError> {
        if self.id.is_empty() {
            return Err(SliValidationError::InvalidId {
                reason: "empty".to_string(),
            });
        }
        if self.id.len() > MAX_SLI_ID_LENGTH {
            return Err(SliValidationError::InvalidId {
                reason: format!("length {} exceeds {MAX_SLI_ID_LENGTH}", self.id.len()),
            });
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(SliValidationError::InvalidPrice {
                id: self.id.clone(),
                price: self.price,
            });
        }
        if let Some(end) = self.ended_at {
            if end < self.started_at {
                return Err(SliValidationError::NonMonotonicWindow {
                    id: self.id.clone(),
                });
            }
        }
        Ok(())
    }
}
