//! Settlement Calculator.
//!
//! Pure, stateless money arithmetic shared by the booking engine (collection
//! amounts) and the payment ledger (payout amounts). Nothing here is cached:
//! every figure is recomputed from its inputs, so the same inputs always give
//! the same outputs and a fee-rate change can never leave a stale figure.

use super::money::{FeeRate, Money, SessionHours, round_money};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The full split for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementQuote {
    pub gross: Money,
    pub platform_fee: Money,
    pub payout: Money,
    pub fee_rate: FeeRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementCalculator {
    fee_rate: FeeRate,
}

impl SettlementCalculator {
    pub fn new(fee_rate: FeeRate) -> Self {
        Self { fee_rate }
    }

    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    /// `rate × hours`, rounded half-up to cents.
    pub fn gross_amount(&self, hourly_rate: Money, hours: SessionHours) -> Result<Money> {
        scale(hourly_rate, hours.value())
    }

    /// `gross × (1 − fee_rate)`, rounded half-up to cents.
    pub fn payout_amount(&self, gross: Money) -> Result<Money> {
        payout_for(gross, self.fee_rate)
    }

    pub fn quote(&self, hourly_rate: Money, hours: SessionHours) -> Result<SettlementQuote> {
        let gross = self.gross_amount(hourly_rate, hours)?;
        let payout = self.payout_amount(gross)?;
        Ok(SettlementQuote {
            gross,
            platform_fee: gross - payout,
            payout,
            fee_rate: self.fee_rate,
        })
    }
}

/// Payout owed for a collected amount at a given fee rate.
pub fn payout_for(gross: Money, fee_rate: FeeRate) -> Result<Money> {
    scale(gross, fee_rate.keep_ratio())
}

fn scale(amount: Money, factor: Decimal) -> Result<Money> {
    let product = amount.value().checked_mul(factor).ok_or_else(|| {
        LedgerError::AmountOverflow(format!("{} x {} does not fit a decimal", amount, factor))
    })?;
    Money::new(round_money(product))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn calculator() -> SettlementCalculator {
        SettlementCalculator::new(FeeRate::new(dec!(0.13)).unwrap())
    }

    #[test]
    fn test_two_hours_at_three_hundred() {
        let rate = Money::new(dec!(300)).unwrap();
        let hours = SessionHours::new(dec!(2)).unwrap();
        let quote = calculator().quote(rate, hours).unwrap();

        assert_eq!(quote.gross.value(), dec!(600.00));
        assert_eq!(quote.payout.value(), dec!(522.00));
        assert_eq!(quote.platform_fee.value(), dec!(78.00));
    }

    #[test]
    fn test_fractional_rounding_is_half_up() {
        // 333.33 * 1.5 = 499.995 -> 500.00
        let rate = Money::new(dec!(333.33)).unwrap();
        let hours = SessionHours::new(dec!(1.5)).unwrap();
        assert_eq!(calculator().gross_amount(rate, hours).unwrap().value(), dec!(500.00));

        // 10.05 * 0.87 = 8.7435 -> 8.74
        let gross = Money::new(dec!(10.05)).unwrap();
        assert_eq!(calculator().payout_amount(gross).unwrap().value(), dec!(8.74));
    }

    #[test]
    fn test_fee_change_is_reflected_immediately() {
        let gross = Money::new(dec!(100)).unwrap();
        let before = calculator().payout_amount(gross).unwrap();
        let after = SettlementCalculator::new(FeeRate::new(dec!(0.20)).unwrap())
            .payout_amount(gross)
            .unwrap();
        assert_eq!(before.value(), dec!(87.00));
        assert_eq!(after.value(), dec!(80.00));
    }

    #[test]
    fn test_zero_fee_pays_everything() {
        let calc = SettlementCalculator::new(FeeRate::new(dec!(0)).unwrap());
        let gross = Money::new(dec!(451.27)).unwrap();
        assert_eq!(calc.payout_amount(gross).unwrap(), gross);
    }

    #[test]
    fn test_overflow_is_an_error_not_a_panic() {
        let rate = Money::new(Decimal::MAX).unwrap();
        let hours = SessionHours::new(dec!(2)).unwrap();

        let err = calculator().gross_amount(rate, hours).unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow(_)));
        assert!(calculator().quote(rate, hours).is_err());
    }
}
