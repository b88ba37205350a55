use std::fmt::{Debug, Display, Formatter};

use crate::quantity::Quantity;

/// Amount of money in the tariff currency.
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    /// Amounts smaller than this are noise of the cost accounting.
    pub const TOLERANCE: Self = Self(1e-6);

    /// Round the cost to [mills][1].
    ///
    /// [1]: https://en.wikipedia.org/wiki/Mill_(currency)
    #[must_use]
    pub fn round_to_mills(self) -> Self {
        Self((self.0 * 1000.0).round() / 1000.0)
    }

    #[must_use]
    pub fn is_negligible(self) -> bool {
        self.0.abs() < Self::TOLERANCE.0
    }

    /// Round to mills and clamp the accounting noise to zero.
    #[must_use]
    pub fn settle(self) -> Self {
        let cost = self.round_to_mills();
        if cost.is_negligible() { Self::ZERO } else { cost }
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_round_to_mills() {
        assert_abs_diff_eq!(Cost::from(0.0015).round_to_mills().0, 0.002);
    }

    #[test]
    fn test_settle() {
        assert_eq!(Cost::from(-0.000_4).settle(), Cost::ZERO);
        assert_eq!(Cost::from(1e-9).settle(), Cost::ZERO);
        assert_abs_diff_eq!(Cost::from(12.345_6).settle().0, 12.346);
    }
}
