//! Estimate, cost and capture-clamping rules

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::shared::errors::{ChargeError, DomainResult};

/// Station owner share in basis points (70%).
pub const DEFAULT_OWNER_SHARE_BPS: u32 = 7_000;

/// Pre-session estimate shown before the user confirms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    /// Estimated cost in minor currency units
    pub estimated_cost: i64,
    /// Estimated duration in whole minutes
    pub estimated_duration_minutes: i64,
}

/// Estimate session cost and duration.
///
/// * `max_power_kw` - station maximum power
/// * `price_per_kwh` - price in minor units per kWh (may be fractional)
/// * `assumed_energy_kwh` - energy the user is expected to draw
///
/// Both outputs round up, so every valid input yields a strictly positive
/// cost and duration.
pub fn estimate(
    max_power_kw: f64,
    price_per_kwh: Decimal,
    assumed_energy_kwh: f64,
) -> DomainResult<Estimate> {
    if !(max_power_kw.is_finite() && max_power_kw > 0.0) {
        return Err(ChargeError::InvalidArgument(format!(
            "max power must be positive, got {}",
            max_power_kw
        )));
    }
    if price_per_kwh <= Decimal::ZERO {
        return Err(ChargeError::InvalidArgument(format!(
            "price per kWh must be positive, got {}",
            price_per_kwh
        )));
    }
    if !(assumed_energy_kwh.is_finite() && assumed_energy_kwh > 0.0) {
        return Err(ChargeError::InvalidArgument(format!(
            "assumed energy must be positive, got {}",
            assumed_energy_kwh
        )));
    }

    let energy = to_decimal(assumed_energy_kwh)?;
    let estimated_cost = (energy * price_per_kwh)
        .round_dp_with_strategy(0, RoundingStrategy::AwayFromZero)
        .to_i64()
        .ok_or_else(|| ChargeError::InvalidArgument("estimated cost overflows".into()))?
        .max(1);

    let minutes = (assumed_energy_kwh / max_power_kw * 60.0).ceil();
    let estimated_duration_minutes = (minutes as i64).max(1);

    Ok(Estimate {
        estimated_cost,
        estimated_duration_minutes,
    })
}

/// Cost of `energy_kwh` at `price_per_kwh`, rounded half away from zero
/// to whole minor units. Negative or non-finite energy counts as zero.
pub fn energy_cost(energy_kwh: f64, price_per_kwh: Decimal) -> i64 {
    if !energy_kwh.is_finite() || energy_kwh <= 0.0 {
        return 0;
    }
    let Some(energy) = Decimal::from_f64(energy_kwh) else {
        return 0;
    };
    (energy * price_per_kwh)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

fn to_decimal(value: f64) -> DomainResult<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| ChargeError::InvalidArgument(format!("{} is not representable", value)))
}

/// Outcome of clamping a final cost against the authorized hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDecision {
    /// Amount to capture (never above the hold)
    pub capture_amount: i64,
    /// Amount the hold left uncaptured and released back to the customer
    pub released_amount: i64,
    /// Cost above the hold that needs manual reconciliation
    pub overage_amount: i64,
}

impl CaptureDecision {
    pub fn clamp(final_cost: i64, authorized_amount: i64) -> Self {
        let final_cost = final_cost.max(0);
        let capture_amount = final_cost.min(authorized_amount);
        Self {
            capture_amount,
            released_amount: authorized_amount - capture_amount,
            overage_amount: (final_cost - authorized_amount).max(0),
        }
    }

    pub fn has_overage(&self) -> bool {
        self.overage_amount > 0
    }
}

/// Read-only projection of how a captured amount splits between the
/// station owner and the platform. No payouts are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    pub owner_share: i64,
    pub platform_share: i64,
}

impl RevenueSplit {
    pub fn compute(amount: i64, owner_share_bps: u32) -> Self {
        let bps = owner_share_bps.min(10_000) as i64;
        let owner_share = amount * bps / 10_000;
        Self {
            owner_share,
            platform_share: amount - owner_share,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn price(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn estimate_is_positive_for_valid_inputs() {
        for (power, p, energy) in [
            (7.4, "28", 30.0),
            (150.0, "0.5", 0.01),
            (3.7, "45.5", 80.0),
            (350.0, "1", 0.001),
        ] {
            let est = estimate(power, price(p), energy).unwrap();
            assert!(est.estimated_cost > 0, "cost for {power}/{p}/{energy}");
            assert!(est.estimated_duration_minutes > 0);
        }
    }

    #[test]
    fn estimate_values() {
        // 30 kWh at 28c on a 7.5 kW station: $8.40, 240 minutes
        let est = estimate(7.5, price("28"), 30.0).unwrap();
        assert_eq!(est.estimated_cost, 840);
        assert_eq!(est.estimated_duration_minutes, 240);
    }

    #[test]
    fn estimate_rejects_non_positive_inputs() {
        assert!(matches!(
            estimate(0.0, price("28"), 30.0),
            Err(ChargeError::InvalidArgument(_))
        ));
        assert!(matches!(
            estimate(7.0, price("0"), 30.0),
            Err(ChargeError::InvalidArgument(_))
        ));
        assert!(matches!(
            estimate(7.0, price("28"), -1.0),
            Err(ChargeError::InvalidArgument(_))
        ));
        assert!(estimate(f64::NAN, price("28"), 1.0).is_err());
    }

    #[test]
    fn energy_cost_rounds_half_away_from_zero() {
        // 18.2 kWh * 28c = 509.6c → 510c
        assert_eq!(energy_cost(18.2, price("28")), 510);
        // 3.5 kWh * 30c = 105c
        assert_eq!(energy_cost(3.5, price("30")), 105);
        assert_eq!(energy_cost(0.5, price("1")), 1);
        assert_eq!(energy_cost(0.0, price("28")), 0);
        assert_eq!(energy_cost(-4.0, price("28")), 0);
    }

    #[test]
    fn clamp_under_hold_releases_remainder() {
        let d = CaptureDecision::clamp(510, 2000);
        assert_eq!(d.capture_amount, 510);
        assert_eq!(d.released_amount, 1490);
        assert!(!d.has_overage());
    }

    #[test]
    fn clamp_over_hold_captures_only_hold() {
        let d = CaptureDecision::clamp(2300, 2000);
        assert_eq!(d.capture_amount, 2000);
        assert_eq!(d.released_amount, 0);
        assert_eq!(d.overage_amount, 300);
        assert!(d.has_overage());
    }

    #[test]
    fn revenue_split_seventy_thirty() {
        let split = RevenueSplit::compute(510, DEFAULT_OWNER_SHARE_BPS);
        assert_eq!(split.owner_share, 357);
        assert_eq!(split.platform_share, 153);
        assert_eq!(split.owner_share + split.platform_share, 510);
    }
}
