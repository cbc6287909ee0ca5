// AGENT-AUTHORED (TCK-00694)
//! Annual recurring revenue forecasting over heterogeneous billing
//! cadences.
//!
//! The evaluator computes the committed and maximum annualized value of a
//! contract's line items at a valuation date, prorated down when the
//! contract terminates less than a year out. It is pure: the reconcile
//! loop feeds it the same inputs it read, and equal inputs always produce
//! equal forecasts, which is what makes reconciles idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::whole_months_between;
use crate::opportunity::MAX_ADJUSTED_RATE;
use crate::sli::ServiceLineItem;

/// Months in a full annual forecast window.
const FULL_TERM_MONTHS: u32 = 12;

/// Inputs to one ARR evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrQuery {
    /// Date the forecast is valued at: the opportunity's renewal date, or
    /// the current instant when no renewal date exists yet.
    pub valuation: DateTime<Utc>,
    /// The instant the reconcile observed; proration of a terminating
    /// contract counts whole months remaining from here.
    pub as_of: DateTime<Utc>,
    /// Contract termination instant, open-ended when absent.
    pub horizon_end: Option<DateTime<Utc>>,
    /// Discount factor against the maximum, percent in `[0, 100]`.
    pub adjusted_rate: u8,
}

/// One ARR forecast: committed and maximum annualized value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ArrForecast {
    /// Committed ARR: the maximum discounted by the adjusted rate.
    pub amount: f64,
    /// Maximum ARR if the customer renews everything.
    pub max_amount: f64,
}

impl ArrForecast {
    /// Cent-level equality, the comparison the reconcile loop uses so it
    /// never flaps on sub-cent float noise.
    #[must_use]
    pub fn matches(&self, amount: f64, max_amount: f64) -> bool {
        round_to_cents(self.amount) == round_to_cents(amount)
            && round_to_cents(self.max_amount) == round_to_cents(max_amount)
    }
}

/// Rounds a currency amount to cents.
#[must_use]
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes the ARR forecast for `slis` under `query`.
///
/// Per-item annualized contribution is `price x quantity x periods/year`
/// for recurring cadences and zero for one-time, usage, paused, canceled,
/// or inactive items. When the contract terminates before a full year of
/// the renewed term, both values are prorated by whole months remaining;
/// a renewal date at or past the termination yields zero.
#[must_use]
pub fn evaluate(slis: &[ServiceLineItem], query: &ArrQuery) -> ArrForecast {
    let max_annualized: f64 = slis
        .iter()
        .filter(|item| item.is_active_at(query.valuation))
        .map(|item| item.price * item.quantity as f64 * f64::from(item.billed.periods_per_year()))
        .sum();

    let rate = query.adjusted_rate.min(MAX_ADJUSTED_RATE);
    let scale = proration_factor(query);

    let max_amount = round_to_cents(max_annualized * scale);
    let amount = round_to_cents(max_annualized * f64::from(rate) / 100.0 * scale);
    ArrForecast { amount, max_amount }
}

/// Fraction of a full annual term the contract still covers.
fn proration_factor(query: &ArrQuery) -> f64 {
    let Some(end) = query.horizon_end else {
        return 1.0;
    };
    if query.valuation >= end {
        // The contract terminates before the renewal lands.
        return 0.0;
    }
    let months_remaining = whole_months_between(query.as_of, end);
    if months_remaining >= FULL_TERM_MONTHS {
        1.0
    } else {
        f64::from(months_remaining) / f64::from(FULL_TERM_MONTHS)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::calendar::add_months;
    use crate::sli::BilledType;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .expect("valid test instant")
    }

    fn item(billed: BilledType, price: f64, quantity: u64) -> ServiceLineItem {
        ServiceLineItem {
            id: format!("sli-{billed:?}-{price}"),
            parent_id: None,
            name: String::new(),
            price,
            quantity,
            billed,
            started_at: utc(2020, 1, 1),
            ended_at: None,
            paused: false,
            canceled: false,
            comments: String::new(),
        }
    }

    fn open_query(valuation: DateTime<Utc>) -> ArrQuery {
        ArrQuery {
            valuation,
            as_of: valuation,
            horizon_end: None,
            adjusted_rate: 100,
        }
    }

    #[test]
    fn annualizes_each_cadence() {
        let v = utc(2024, 6, 1);
        let slis = vec![
            item(BilledType::Monthly, 10.0, 2),   // 240 / year
            item(BilledType::Quarterly, 50.0, 1), // 200 / year
            item(BilledType::Annually, 300.0, 1), // 300 / year
            item(BilledType::Once, 999.0, 1),     // ignored
            item(BilledType::Usage, 5.0, 100),    // ignored
        ];
        let forecast = evaluate(&slis, &open_query(v));
        assert_eq!(forecast.max_amount, 740.0);
        assert_eq!(forecast.amount, 740.0);
    }

    #[test]
    fn empty_and_inactive_yield_zero() {
        let v = utc(2024, 6, 1);
        assert_eq!(evaluate(&[], &open_query(v)), ArrForecast::default());

        let mut paused = item(BilledType::Monthly, 10.0, 1);
        paused.paused = true;
        let mut ended = item(BilledType::Annually, 100.0, 1);
        ended.ended_at = Some(utc(2024, 1, 1));
        let mut future = item(BilledType::Annually, 100.0, 1);
        future.started_at = utc(2025, 1, 1);

        let forecast = evaluate(&[paused, ended, future], &open_query(v));
        assert_eq!(forecast, ArrForecast::default());
    }

    #[test]
    fn adjusted_rate_discounts_committed_only() {
        let v = utc(2024, 6, 1);
        let slis = vec![item(BilledType::Annually, 1000.0, 4)];
        let forecast = evaluate(
            &slis,
            &ArrQuery {
                adjusted_rate: 50,
                ..open_query(v)
            },
        );
        assert_eq!(forecast.max_amount, 4000.0);
        assert_eq!(forecast.amount, 2000.0);
    }

    #[test]
    fn prorates_when_termination_is_under_a_year_out() {
        let now = utc(2024, 1, 10);
        let slis = vec![item(BilledType::Annually, 1000.0, 1)];
        let forecast = evaluate(
            &slis,
            &ArrQuery {
                valuation: add_months(now, 1),
                as_of: now,
                horizon_end: Some(add_months(now, 6)),
                adjusted_rate: 100,
            },
        );
        assert_eq!(forecast.max_amount, 500.0);
        assert_eq!(forecast.amount, 500.0);
    }

    #[test]
    fn termination_before_renewal_zeroes_the_forecast() {
        let now = utc(2024, 6, 15);
        let slis = vec![item(BilledType::Annually, 1000.0, 1)];
        let forecast = evaluate(
            &slis,
            &ArrQuery {
                valuation: utc(2024, 6, 17),
                as_of: now,
                horizon_end: Some(utc(2024, 6, 16)),
                adjusted_rate: 100,
            },
        );
        assert_eq!(forecast, ArrForecast::default());
    }

    #[test]
    fn termination_a_year_or_more_out_is_not_prorated() {
        let now = utc(2024, 1, 1);
        let slis = vec![item(BilledType::Monthly, 100.0, 1)];
        let forecast = evaluate(
            &slis,
            &ArrQuery {
                valuation: now,
                as_of: now,
                horizon_end: Some(utc(2026, 1, 1)),
                adjusted_rate: 100,
            },
        );
        assert_eq!(forecast.max_amount, 1200.0);
    }

    #[test]
    fn cent_rounding_and_matching() {
        assert_eq!(round_to_cents(10.004), 10.0);
        assert_eq!(round_to_cents(10.005), 10.01);
        let forecast = ArrForecast {
            amount: 99.999_999,
            max_amount: 100.0,
        };
        assert!(forecast.matches(100.0, 100.000_001));
        assert!(!forecast.matches(100.02, 100.0));
    }

    proptest! {
        #[test]
        fn committed_never_exceeds_maximum(
            price in 0.0f64..10_000.0,
            quantity in 0u64..1_000,
            rate in 0u8..=100,
            months_to_end in 0u32..36,
        ) {
            let now = utc(2024, 1, 10);
            let slis = vec![item(BilledType::Monthly, price, quantity)];
            let forecast = evaluate(&slis, &ArrQuery {
                valuation: now,
                as_of: now,
                horizon_end: Some(add_months(now, months_to_end)),
                adjusted_rate: rate,
            });
            prop_assert!(forecast.amount >= 0.0);
            prop_assert!(forecast.max_amount >= 0.0);
            prop_assert!(forecast.amount <= forecast.max_amount + 0.01);
        }
    }
}
