//! Fee schedule applied to quotes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use swapsettle_common::{FeeBreakdown, Money, MoneyResult};

/// Platform and processing fee rates, as fractions of the quote total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Platform fee rate (default 1.6%).
    pub platform_rate: Decimal,
    /// Processing fee rate (default 1.4%).
    pub processing_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_rate: Decimal::new(16, 3),
            processing_rate: Decimal::new(14, 3),
        }
    }
}

impl FeeSchedule {
    /// Create a schedule from two rates.
    pub fn new(platform_rate: Decimal, processing_rate: Decimal) -> Self {
        Self {
            platform_rate,
            processing_rate,
        }
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut schedule = Self::default();

        if let Ok(rate) = std::env::var("SWAPSETTLE_PLATFORM_FEE_RATE") {
            if let Ok(rate) = rate.parse() {
                schedule.platform_rate = rate;
            }
        }

        if let Ok(rate) = std::env::var("SWAPSETTLE_PROCESSING_FEE_RATE") {
            if let Ok(rate) = rate.parse() {
                schedule.processing_rate = rate;
            }
        }

        schedule
    }

    /// Validate the schedule.
    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("platform", self.platform_rate),
            ("processing", self.processing_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(format!("{} fee rate must be in [0, 1), got {}", name, rate));
            }
        }

        if self.total_rate() >= Decimal::ONE {
            return Err("Combined fee rate must be below 1".to_string());
        }

        Ok(())
    }

    /// Combined fee rate.
    pub fn total_rate(&self) -> Decimal {
        self.platform_rate + self.processing_rate
    }

    /// Fee lines for a quote total.
    ///
    /// Each line is rounded on its own; `total` is their exact sum.
    pub fn apply(&self, total: &Money) -> MoneyResult<FeeBreakdown> {
        let platform_fee = total.percent(self.platform_rate)?;
        let processing_fee = total.percent(self.processing_rate)?;
        let sum = platform_fee.checked_add(&processing_fee)?;

        Ok(FeeBreakdown {
            platform_fee,
            processing_fee,
            total: sum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use swapsettle_common::Currency;

    #[test]
    fn test_default_schedule() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.total_rate(), dec!(0.03));
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn test_apply_fees() {
        let total = Money::parse("100000", Currency::ngn(), 2).unwrap();
        let fees = FeeSchedule::default().apply(&total).unwrap();

        assert_eq!(fees.platform_fee.to_string(), "1600.00");
        assert_eq!(fees.processing_fee.to_string(), "1400.00");
        assert_eq!(fees.total.to_string(), "3000.00");
    }

    #[test]
    fn test_fee_total_is_sum_of_rounded_lines() {
        let total = Money::parse("0.55", Currency::ngn(), 2).unwrap();
        let fees = FeeSchedule::default().apply(&total).unwrap();

        // 0.0088 -> 0.01 and 0.0077 -> 0.01
        assert_eq!(fees.platform_fee.minor_units(), 1);
        assert_eq!(fees.processing_fee.minor_units(), 1);
        assert_eq!(fees.total.minor_units(), 2);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(FeeSchedule::new(dec!(-0.01), dec!(0.01)).validate().is_err());
        assert!(FeeSchedule::new(dec!(1), dec!(0)).validate().is_err());
        assert!(FeeSchedule::new(dec!(0.6), dec!(0.5)).validate().is_err());
    }
}
