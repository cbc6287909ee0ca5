//! Next-renewal-date computation.
//!
//! The renewal date is derived from the contract's service start and
//! cycle length, never from the previous opportunity's date: advancing
//! whole cycles from the anchor keeps clamped month-ends stable no
//! matter how many cycles have elapsed.

use chrono::{DateTime, Utc};

use crate::calendar::{add_months, to_date, whole_months_between};
use crate::contract::Contract;
use crate::opportunity::RenewalOpportunity;

/// Computes the desired renewal date for `contract` as observed at `now`.
///
/// Returns `None` when the contract never renews (`length_in_months` of
/// zero) or has not started service yet; the caller must not create an
/// opportunity in either case.
///
/// A non-auto-renewing contract keeps an already-scheduled future date:
/// the stored value is returned unchanged so the reconcile loop sees no
/// difference and issues nothing.
///
/// A scheduled termination never shortens the result; closing the
/// opportunity when the contract ends is the lifecycle policy's job, not
/// a date adjustment.
#[must_use]
pub fn compute_renewal_date(
    contract: &Contract,
    now: DateTime<Utc>,
    existing: Option<&RenewalOpportunity>,
) -> Option<DateTime<Utc>> {
    if !contract.is_renewable() {
        return None;
    }
    let started = contract.service_started_at?;

    if !contract.auto_renew {
        if let Some(renewed_at) = existing.and_then(|opportunity| opportunity.renewed_at) {
            if renewed_at > now {
                return Some(renewed_at);
            }
        }
    }

    let cycle = contract.length_in_months;
    // First whole cycle past `now`, advanced from the service-start
    // anchor. Starting near the elapsed-cycle count keeps this O(1) for
    // contracts that have been live for decades.
    let mut k = (whole_months_between(started, now) / cycle).max(1);
    loop {
        let candidate = add_months(started, k.saturating_mul(cycle));
        if candidate > now {
            return Some(to_date(candidate));
        }
        k += 1;
    }
}
