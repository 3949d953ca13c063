use alloy_primitives::{ruint::UintTryTo, U256};
use serde::{Deserialize, Serialize};

#[inline]
fn try_convert_to_u128(value: U256) -> Option<u128> {
    value.uint_try_to().ok()
}

/// Native token amount with 18 decimals of fixed-point precision.
///
/// Balances, balance caps and grant amounts are all carried in this unit.
/// The raw value is the on-chain integer (wei for an 18-decimal token).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u128::MAX);
    pub const ONE: Amount = Amount(Self::SCALE);
    pub const SCALE: u128 = 1_000_000_000__000_000_000;
    pub const DECIMALS: usize = 18;

    #[inline]
    pub fn is_not(&self) -> bool {
        // An amount of exactly zero means "not set" for caps and
        // configuration values, as opposed to a small non-zero balance.
        self.0 == 0
    }

    #[inline]
    pub fn from_u128_raw(value: u128) -> Self {
        Self(value)
    }

    /// Values wider than 128 bits clamp to [`Amount::MAX`]. Only used for
    /// balances read from chain, where a clamped value still compares
    /// correctly against any cap.
    #[inline]
    pub fn from_u256_saturating(value: U256) -> Self {
        Self(try_convert_to_u128(value).unwrap_or(u128::MAX))
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let integral = self.0 / Self::SCALE;
        let fraction = self.0 % Self::SCALE;

        let max_scale_len = Amount::DECIMALS;
        let frac_str = format!(
            "{:0>max_scale_len$}",
            fraction,
            max_scale_len = max_scale_len
        );

        let final_frac_str = match f.precision() {
            Some(p) => {
                let len = p.min(max_scale_len);
                &frac_str[0..len]
            }
            None => {
                let trimmed = frac_str.trim_end_matches('0');
                if trimmed.is_empty() {
                    "0"
                } else {
                    trimmed
                }
            }
        };

        if final_frac_str.is_empty() {
            write!(f, "{}", integral)
        } else {
            write!(f, "{}.{}", integral, final_frac_str)
        }
    }
}
