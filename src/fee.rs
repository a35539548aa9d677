//! Basis-point fee arithmetic.

/// Denominator of the fee rate: one basis point is 1/10000 of the amount.
pub const BASE: u128 = 10_000;

/// Creation-time cap on an agent's fee rate (10%).
pub const MAX_AGENT_FEE_BPS: u16 = 1_000;

/// Splits `amount` into the agent's cut and the principal's remainder.
///
/// The agent receives `floor(amount * fee_bps / BASE)`; the principal
/// receives everything else. Floor division, no rounding adjustment. The
/// quotient/remainder decomposition keeps the product inside `u128` over the
/// whole amount domain and is exact. `fee_bps` must not exceed [`BASE`].
pub fn split(amount: u128, fee_bps: u16) -> (u128, u128) {
    debug_assert!(u128::from(fee_bps) <= BASE);
    let fee = u128::from(fee_bps);
    let to_agent = (amount / BASE) * fee + (amount % BASE) * fee / BASE;
    (to_agent, amount - to_agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_percent_of_half_a_token() {
        // 0.5 * 10^18 at 500 bps
        let amount = 500_000_000_000_000_000u128;
        let (to_agent, to_principal) = split(amount, 500);
        assert_eq!(to_agent, 25_000_000_000_000_000);
        assert_eq!(to_principal, 475_000_000_000_000_000);
        assert_eq!(to_agent + to_principal, amount);
    }

    #[test]
    fn floors_the_agent_cut() {
        // 999 * 500 / 10000 = 49.95 -> 49
        assert_eq!(split(999, 500), (49, 950));
        assert_eq!(split(1, 999), (0, 1));
    }

    #[test]
    fn zero_amount_and_zero_fee() {
        assert_eq!(split(0, 500), (0, 0));
        assert_eq!(split(12_345, 0), (0, 12_345));
    }

    #[test]
    fn exact_at_the_extremes() {
        let (to_agent, to_principal) = split(u128::MAX, MAX_AGENT_FEE_BPS);
        assert_eq!(to_agent + to_principal, u128::MAX);
        assert_eq!(to_agent, u128::MAX / BASE * 1_000 + u128::MAX % BASE * 1_000 / BASE);
    }
}
