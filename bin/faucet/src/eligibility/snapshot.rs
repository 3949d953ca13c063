use alloy_primitives::Address;
use common::amount::Amount;

/// Cooldown used when the handler does not report one (24 hours)
pub const DEFAULT_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Balance cap used when the handler does not report one (1.0 token)
pub const DEFAULT_BALANCE_CAP: Amount = Amount::ONE;

/// On-chain facts the snapshot is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFacts {
    /// Unix seconds of the last grant, None if never granted
    pub last_grant: Option<u64>,
    pub cooldown_period_secs: u64,
    /// None until the balance has been read once
    pub balance: Option<Amount>,
    pub balance_cap: Amount,
    /// Per-address facts have been read at least once
    pub loaded: bool,
}

impl Default for EligibilityFacts {
    fn default() -> Self {
        Self {
            last_grant: None,
            cooldown_period_secs: DEFAULT_COOLDOWN_SECS,
            balance: None,
            balance_cap: DEFAULT_BALANCE_CAP,
            loaded: false,
        }
    }
}

/// Seconds left before `last_grant + cooldown` is reached.
///
/// A missing or zero grant timestamp means "never granted" and yields 0.
pub fn seconds_remaining(last_grant: Option<u64>, cooldown_secs: u64, now: u64) -> u64 {
    match last_grant {
        None | Some(0) => 0,
        Some(granted_at) => {
            let elapsed = now.saturating_sub(granted_at);
            cooldown_secs.saturating_sub(elapsed)
        }
    }
}

/// Derived eligibility of one address at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilitySnapshot {
    pub address: Option<Address>,
    pub last_grant_timestamp: Option<u64>,
    pub cooldown_period_secs: u64,
    pub current_balance: Option<Amount>,
    pub balance_cap: Amount,
    pub seconds_remaining: u64,
    pub on_cooldown: bool,
    pub balance_too_high: bool,
    pub eligible: bool,
    pub loaded: bool,
}

impl EligibilitySnapshot {
    pub fn derive(address: Option<Address>, facts: &EligibilityFacts, now: u64) -> Self {
        let seconds_remaining =
            seconds_remaining(facts.last_grant, facts.cooldown_period_secs, now);
        let on_cooldown = seconds_remaining > 0;
        // The cap is inclusive: holding exactly the cap already disqualifies
        let balance_too_high = facts
            .balance
            .is_some_and(|balance| balance >= facts.balance_cap);
        let eligible = address.is_some() && facts.loaded && !on_cooldown && !balance_too_high;

        Self {
            address,
            last_grant_timestamp: facts.last_grant.filter(|t| *t != 0),
            cooldown_period_secs: facts.cooldown_period_secs,
            current_balance: facts.balance,
            balance_cap: facts.balance_cap,
            seconds_remaining,
            on_cooldown,
            balance_too_high,
            eligible,
            loaded: facts.loaded,
        }
    }

    /// Snapshot for "no wallet connected"
    pub fn disconnected() -> Self {
        Self::derive(None, &EligibilityFacts::default(), 0)
    }

    /// Fraction of the cooldown already elapsed, 1.0 when ready
    pub fn cooldown_progress(&self) -> f64 {
        if self.cooldown_period_secs == 0 {
            return 1.0;
        }
        1.0 - self.seconds_remaining as f64 / self.cooldown_period_secs as f64
    }

    /// Why a claim is not possible right now, None when eligible
    pub fn blocked_reason(&self) -> Option<&'static str> {
        if self.address.is_none() {
            Some("Connect wallet")
        } else if !self.loaded {
            Some("Checking eligibility")
        } else if self.on_cooldown {
            Some("On cooldown")
        } else if self.balance_too_high {
            Some("Balance too high")
        } else {
            None
        }
    }
}

impl Default for EligibilitySnapshot {
    fn default() -> Self {
        Self::disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn loaded_facts() -> EligibilityFacts {
        EligibilityFacts {
            last_grant: None,
            cooldown_period_secs: 3600,
            balance: Some(Amount::ZERO),
            balance_cap: Amount::ONE,
            loaded: true,
        }
    }

    fn user() -> Option<Address> {
        Some(Address::repeat_byte(0xaa))
    }

    #[test]
    fn test_seconds_remaining_half_way() {
        assert_eq!(seconds_remaining(Some(NOW - 1800), 3600, NOW), 1800);
    }

    #[test]
    fn test_seconds_remaining_never_granted() {
        assert_eq!(seconds_remaining(None, 3600, NOW), 0);
        assert_eq!(seconds_remaining(Some(0), 3600, NOW), 0);
    }

    #[test]
    fn test_seconds_remaining_is_clamped_and_decreasing() {
        let granted = NOW - 10;
        let mut previous = u64::MAX;
        for offset in 0..4000 {
            let remaining = seconds_remaining(Some(granted), 3600, granted + offset);
            assert!(remaining <= previous);
            if previous > 0 && previous != u64::MAX {
                assert!(remaining < previous, "must strictly decrease until zero");
            }
            assert_eq!(remaining, 3600u64.saturating_sub(offset));
            previous = remaining;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_seconds_remaining_resets_at_grant() {
        assert_eq!(seconds_remaining(Some(NOW), 3600, NOW), 3600);
    }

    #[test]
    fn test_cooldown_scenario() {
        let facts = EligibilityFacts {
            last_grant: Some(NOW - 1800),
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);

        assert_eq!(snapshot.seconds_remaining, 1800);
        assert!(snapshot.on_cooldown);
        assert!(!snapshot.eligible);
        assert_eq!(snapshot.cooldown_progress(), 0.5);
        assert_eq!(snapshot.blocked_reason(), Some("On cooldown"));
    }

    #[test]
    fn test_balance_cap_is_inclusive() {
        let five = Amount::from_u128_raw(5_000_000_000_000_000_000);
        let facts = EligibilityFacts {
            balance: Some(five),
            balance_cap: five,
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);

        assert!(snapshot.balance_too_high);
        assert!(!snapshot.eligible);
    }

    #[test]
    fn test_eligible_when_all_clauses_hold() {
        let snapshot = EligibilitySnapshot::derive(user(), &loaded_facts(), NOW);
        assert!(snapshot.eligible);
        assert!(!snapshot.on_cooldown);
        assert!(!snapshot.balance_too_high);
        assert_eq!(snapshot.blocked_reason(), None);
    }

    #[test]
    fn test_each_clause_falsifies_eligibility() {
        // no address
        let snapshot = EligibilitySnapshot::derive(None, &loaded_facts(), NOW);
        assert!(!snapshot.eligible);

        // on cooldown only
        let facts = EligibilityFacts {
            last_grant: Some(NOW - 1),
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);
        assert!(snapshot.on_cooldown && !snapshot.balance_too_high);
        assert!(!snapshot.eligible);

        // balance too high only
        let facts = EligibilityFacts {
            balance: Some(Amount::ONE),
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);
        assert!(!snapshot.on_cooldown && snapshot.balance_too_high);
        assert!(!snapshot.eligible);

        // facts not read yet
        let facts = EligibilityFacts {
            loaded: false,
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);
        assert!(!snapshot.eligible);
        assert_eq!(snapshot.blocked_reason(), Some("Checking eligibility"));
    }

    #[test]
    fn test_unknown_balance_is_not_too_high() {
        let facts = EligibilityFacts {
            balance: None,
            ..loaded_facts()
        };
        let snapshot = EligibilitySnapshot::derive(user(), &facts, NOW);
        assert!(!snapshot.balance_too_high);
    }

    #[test]
    fn test_disconnected_snapshot() {
        let snapshot = EligibilitySnapshot::disconnected();
        assert!(!snapshot.eligible);
        assert_eq!(snapshot.cooldown_period_secs, DEFAULT_COOLDOWN_SECS);
        assert_eq!(snapshot.balance_cap, DEFAULT_BALANCE_CAP);
        assert_eq!(snapshot.cooldown_progress(), 1.0);
    }
}
