//! Portfolio ledger: cash and held quantity for a single instrument.

use super::error::RotatorError;

/// Absolute slack allowed when a mutation lands a hair below zero through
/// floating-point rounding. Anything beyond this is a caller defect.
const LEDGER_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    cash: f64,
    quantity: f64,
}

impl Portfolio {
    pub fn new(cash: f64) -> Self {
        Portfolio {
            cash,
            quantity: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Mark-to-market equity: cash + quantity * price.
    pub fn value(&self, price: f64) -> f64 {
        self.cash + self.quantity * price
    }

    /// Debit `cost + fee` from cash and credit `size` units.
    ///
    /// The ledger does not clamp. Callers size the order against
    /// affordability first; an order that would overdraw cash is rejected.
    pub(crate) fn apply_buy(&mut self, size: f64, cost: f64, fee: f64) -> Result<(), RotatorError> {
        check_size(size)?;
        let required = cost + fee;
        let remaining = self.cash - required;
        if remaining < -tolerance(self.cash) {
            return Err(RotatorError::InsufficientCash {
                required,
                available: self.cash,
            });
        }
        self.cash = remaining.max(0.0);
        self.quantity += size;
        Ok(())
    }

    /// Credit `proceeds - fee` to cash and debit `size` units.
    pub(crate) fn apply_sell(
        &mut self,
        size: f64,
        proceeds: f64,
        fee: f64,
    ) -> Result<(), RotatorError> {
        check_size(size)?;
        let remaining = self.quantity - size;
        if remaining < -tolerance(self.quantity) {
            return Err(RotatorError::Oversell {
                requested: size,
                held: self.quantity,
            });
        }
        self.quantity = remaining.max(0.0);
        self.cash += proceeds - fee;
        Ok(())
    }
}

fn check_size(size: f64) -> Result<(), RotatorError> {
    if !size.is_finite() || size <= 0.0 {
        return Err(RotatorError::InvalidOrderSize { size });
    }
    Ok(())
}

fn tolerance(scale: f64) -> f64 {
    LEDGER_TOLERANCE * scale.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(10_000.0);
        assert!((portfolio.cash() - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.quantity(), 0.0);
    }

    #[test]
    fn value_marks_quantity_to_price() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_buy(10.0, 1_000.0, 1.0).unwrap();
        assert!((portfolio.value(120.0) - (8_999.0 + 1_200.0)).abs() < 1e-9);
    }

    #[test]
    fn apply_buy_debits_cost_and_fee() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_buy(55.0, 5_500.0, 5.5).unwrap();
        assert!((portfolio.cash() - 4_494.5).abs() < 1e-9);
        assert!((portfolio.quantity() - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn apply_sell_credits_proceeds_minus_fee() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_buy(55.0, 5_500.0, 5.5).unwrap();
        portfolio.apply_sell(55.0, 4_950.0, 4.95).unwrap();
        assert!((portfolio.cash() - 9_439.55).abs() < 1e-9);
        assert_eq!(portfolio.quantity(), 0.0);
    }

    #[test]
    fn overdraw_is_a_defect() {
        let mut portfolio = Portfolio::new(100.0);
        let err = portfolio.apply_buy(2.0, 100.0, 0.1).unwrap_err();
        assert!(matches!(err, RotatorError::InsufficientCash { .. }));
        assert!((portfolio.cash() - 100.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.quantity(), 0.0);
    }

    #[test]
    fn oversell_is_a_defect() {
        let mut portfolio = Portfolio::new(1_000.0);
        portfolio.apply_buy(1.0, 100.0, 0.0).unwrap();
        let err = portfolio.apply_sell(1.5, 150.0, 0.0).unwrap_err();
        assert!(matches!(err, RotatorError::Oversell { .. }));
        assert!((portfolio.quantity() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_size_is_a_defect() {
        let mut portfolio = Portfolio::new(1_000.0);
        assert!(matches!(
            portfolio.apply_buy(0.0, 0.0, 0.0),
            Err(RotatorError::InvalidOrderSize { .. })
        ));
        assert!(matches!(
            portfolio.apply_sell(-1.0, 0.0, 0.0),
            Err(RotatorError::InvalidOrderSize { .. })
        ));
        assert!(matches!(
            portfolio.apply_buy(f64::NAN, 0.0, 0.0),
            Err(RotatorError::InvalidOrderSize { .. })
        ));
    }

    #[test]
    fn rounding_dust_snaps_to_zero() {
        let mut portfolio = Portfolio::new(100.0);
        portfolio.apply_buy(1.0, 100.0 + 1e-12, 0.0).unwrap();
        assert_eq!(portfolio.cash(), 0.0);
    }
}
