//! Lifecycle-derived renewal likelihood transitions.
//!
//! These transitions fire only as side effects of contract lifecycle
//! changes. Outside of them the stored likelihood and adjusted rate are
//! user-owned: a user update through the command surface bypasses this
//! policy entirely, and the policy never overwrites a user-chosen value.

use chrono::{DateTime, Utc};

use crate::contract::Contract;
use crate::opportunity::{RenewalLikelihood, RenewalOpportunity};

/// A forced likelihood transition with its implied adjusted rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikelihoodChange {
    /// The likelihood to write.
    pub likelihood: RenewalLikelihood,
    /// The adjusted rate to write alongside it.
    pub adjusted_rate: u8,
}

/// Derives the implicit likelihood transition for `opportunity`, if any.
///
/// Two transitions exist:
///
/// - A contract whose renewal became unreachable — already terminated,
///   or terminating on or before the scheduled renewal date — forces
///   `Zero` with rate 0, unless the opportunity is already at `Zero`.
/// - A reinitiated contract — previously driven to `Zero`, termination
///   cleared, renewal date back in the future — recovers to `Medium`
///   with rate 50.
///
/// Everything else returns `None`: no transition, nothing to write.
#[must_use]
pub fn derive_transition(
    contract: &Contract,
    opportunity: &RenewalOpportunity,
    now: DateTime<Utc>,
) -> Option<LikelihoodChange> {
    if renewal_unreachable(contract, opportunity, now) {
        if opportunity.renewal_likelihood == RenewalLikelihood::Zero {
            return None;
        }
        return Some(LikelihoodChange {
            likelihood: RenewalLikelihood::Zero,
            adjusted_rate: RenewalLikelihood::Zero.default_adjusted_rate(),
        });
    }

    let reinitiated = opportunity.renewal_likelihood == RenewalLikelihood::Zero
        && contract.ended_at.is_none()
        && !contract.status.is_terminal()
        && opportunity
            .renewed_at
            .map_or(false, |renewed_at| renewed_at > now);
    if reinitiated {
        return Some(LikelihoodChange {
            likelihood: RenewalLikelihood::Medium,
            adjusted_rate: RenewalLikelihood::Medium.default_adjusted_rate(),
        });
    }

    None
}

/// The renewal this opportunity tracks will never happen: the contract is
/// already terminated, or terminates on or before the renewal date.
fn renewal_unreachable(
    contract: &Contract,
    opportunity: &RenewalOpportunity,
    now: DateTime<Utc>,
) -> bool {
    if contract.is_ended(now) {
        return true;
    }
    match (contract.ended_at, opportunity.renewed_at) {
        (Some(ended_at), Some(renewed_at)) => ended_at <= renewed_at,
        _ => false,
    }
}
