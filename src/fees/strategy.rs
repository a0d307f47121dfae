//! How much native value accompanies a bridge message

use super::FeeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStrategy {
    /// Attach the full fee total
    Fixed,
    /// Top the treasury up to the fee total, never below the mandatory
    /// minimum, plus a storage reserve
    BalanceAdjusted { storage_margin: u128 },
}

impl ValueStrategy {
    /// Whether the treasury's native balance is an input
    pub fn needs_treasury_balance(&self) -> bool {
        matches!(self, ValueStrategy::BalanceAdjusted { .. })
    }

    /// Value in nanotons for a bridge against `snapshot`.
    ///
    /// `treasury_balance` is ignored by `Fixed`.
    pub fn required_value(&self, snapshot: &FeeSnapshot, treasury_balance: u128) -> u128 {
        match *self {
            ValueStrategy::Fixed => snapshot.total_required_value(),
            ValueStrategy::BalanceAdjusted { storage_margin } => {
                let shortfall = snapshot
                    .total_required_value()
                    .saturating_sub(treasury_balance);
                shortfall
                    .max(snapshot.minimum_required_value())
                    .saturating_add(storage_margin)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{FeeComponent, FeeSnapshot};
    use std::collections::BTreeMap;

    /// Total 5_000_000 of which 2_000_000 is mandatory
    fn eth_like_snapshot() -> FeeSnapshot {
        let components = vec![
            FeeComponent {
                name: "native_fee",
                amount: 2_000_000,
                mandatory: false,
            },
            FeeComponent {
                name: "estimated_gas_cost",
                amount: 1_000_000,
                mandatory: false,
            },
            FeeComponent {
                name: "jetton_transfer_gas_cost",
                amount: 1_500_000,
                mandatory: true,
            },
            FeeComponent {
                name: "treasury_fee",
                amount: 500_000,
                mandatory: true,
            },
        ];
        FeeSnapshot::new(components, None, BTreeMap::new(), None)
    }

    #[test]
    fn test_fixed_attaches_total() {
        let snap = eth_like_snapshot();
        assert!(!ValueStrategy::Fixed.needs_treasury_balance());
        assert_eq!(ValueStrategy::Fixed.required_value(&snap, 123), 5_000_000);
    }

    #[test]
    fn test_balance_adjusted_tops_up_treasury() {
        let snap = eth_like_snapshot();
        let strategy = ValueStrategy::BalanceAdjusted {
            storage_margin: 5_000_000,
        };
        assert!(strategy.needs_treasury_balance());
        // max(5_000_000 - 1_000_000, 2_000_000) + 5_000_000
        assert_eq!(strategy.required_value(&snap, 1_000_000), 9_000_000);
    }

    #[test]
    fn test_balance_adjusted_floor_is_minimum_plus_margin() {
        let snap = eth_like_snapshot();
        let margin = 5_000_000;
        let strategy = ValueStrategy::BalanceAdjusted {
            storage_margin: margin,
        };
        let floor = snap.minimum_required_value() + margin;

        for balance in [0, 1, 2_999_999, 3_000_000, 4_999_999, 5_000_000, u128::MAX] {
            let value = strategy.required_value(&snap, balance);
            assert!(value >= floor, "balance {}", balance);
            let expected = snap
                .total_required_value()
                .saturating_sub(balance)
                .max(snap.minimum_required_value())
                + margin;
            assert_eq!(value, expected);
        }

        // A rich treasury only gets the mandatory part
        assert_eq!(strategy.required_value(&snap, 10_000_000_000), floor);
    }
}
