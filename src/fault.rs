//! Simulated failures.
//!
//! The API has no backing store, so to exercise its error paths each handler
//! asks a [`FaultPolicy`] whether this call should fail, and how. Production
//! runs [`RandomFaults`]; test mode runs [`NoFaults`] and every response is
//! deterministic.
//!
//! The odds live in [`FaultRates`]. They are demonstration values, not
//! business rules.

use std::fmt;
use std::time::Duration;

use rand::Rng;

/// Where in a handler a fault may be injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultSite {
    /// `GET /`.
    Home,
    /// `GET /api/users`.
    ListUsers,
    /// Input validation in `POST /api/users`.
    ValidateUser,
    /// Persisting the user in `POST /api/users`.
    ProcessUser,
    /// The simulated database read in `GET /api/users/{id}`.
    QueryUser { id: i64 },
    /// The existence check in `GET /api/users/{id}`, after the query.
    LookupUser { id: i64 },
}

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultOutcome {
    ServiceUnavailable,
    DatabaseUnavailable,
    ValidationFailed,
    ConstraintViolation,
    ConnectionTimeout,
    QueryFailed,
    PrimaryKeyViolation,
    NotFound,
}

impl fmt::Display for FaultOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServiceUnavailable => "random service unavailable",
            Self::DatabaseUnavailable => "database connection failed",
            Self::ValidationFailed => "validation error: required fields missing",
            Self::ConstraintViolation => "database constraint violation",
            Self::ConnectionTimeout => "connection timeout",
            Self::QueryFailed => "query execution failed",
            Self::PrimaryKeyViolation => "primary key constraint violation",
            Self::NotFound => "user not found",
        })
    }
}

/// Decides, per call, whether a handler should fail.
pub trait FaultPolicy: Send + Sync + 'static {
    fn decide(&self, site: FaultSite) -> Option<FaultOutcome>;

    /// Extra latency to simulate slow work at `site`.
    fn latency(&self, _site: FaultSite) -> Duration {
        Duration::ZERO
    }
}

/// Never fails, never waits. Used in test mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn decide(&self, _site: FaultSite) -> Option<FaultOutcome> {
        None
    }
}

// ── Odds ──────────────────────────────────────────────────────────────────────

/// A `hits`-in-`out_of` chance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chance {
    hits: u32,
    out_of: u32,
}

impl Chance {
    pub const NEVER: Self = Self { hits: 0, out_of: 1 };
    pub const ALWAYS: Self = Self { hits: 1, out_of: 1 };

    /// `1` in `n`; `n == 0` is treated as `1`.
    pub const fn one_in(n: u32) -> Self {
        Self { hits: 1, out_of: if n == 0 { 1 } else { n } }
    }

    fn roll(self, rng: &mut impl Rng) -> bool {
        self.hits > 0 && rng.random_ratio(self.hits.min(self.out_of), self.out_of)
    }
}

/// Odds for the simulated database read.
///
/// A single roll in `0..roll_out_of` is drawn per query; an id fails when
/// its rule applies and the roll is below that rule's bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryOdds {
    pub roll_out_of: u32,
    /// Ids divisible by 5 time out when the roll is below this.
    pub timeout_below: u32,
    /// Ids divisible by 3 fail the query when the roll is below this.
    pub query_failed_below: u32,
    /// Ids above `large_id` violate a constraint when the roll is below this.
    pub constraint_below: u32,
    pub large_id: i64,
}

impl QueryOdds {
    /// The outcome for `id` given a roll already drawn from `0..roll_out_of`.
    pub fn outcome(&self, id: i64, roll: u32) -> Option<FaultOutcome> {
        if id % 5 == 0 && roll < self.timeout_below {
            return Some(FaultOutcome::ConnectionTimeout);
        }
        if id % 3 == 0 && roll < self.query_failed_below {
            return Some(FaultOutcome::QueryFailed);
        }
        if id > self.large_id && roll < self.constraint_below {
            return Some(FaultOutcome::PrimaryKeyViolation);
        }
        None
    }
}

/// Every tunable number behind [`RandomFaults`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultRates {
    pub home_unavailable: Chance,
    pub list_users_failed: Chance,
    pub validation_failed: Chance,
    pub processing_failed: Chance,
    /// Applies only to ids above `not_found_above`.
    pub not_found: Chance,
    pub not_found_above: i64,
    pub query: QueryOdds,
    /// Upper bound (exclusive) of the random delay while creating a user.
    pub max_processing_delay: Duration,
}

impl Default for FaultRates {
    fn default() -> Self {
        Self {
            home_unavailable: Chance::one_in(10),
            list_users_failed: Chance::one_in(5),
            validation_failed: Chance::one_in(3),
            processing_failed: Chance::one_in(4),
            not_found: Chance::one_in(2),
            not_found_above: 10,
            query: QueryOdds {
                roll_out_of: 10,
                timeout_below: 3,
                query_failed_below: 3,
                constraint_below: 2,
                large_id: 1000,
            },
            max_processing_delay: Duration::from_millis(100),
        }
    }
}

/// Fails at random according to [`FaultRates`].
///
/// Uses the thread-local generator, so no state is shared between requests.
#[derive(Clone, Debug, Default)]
pub struct RandomFaults {
    rates: FaultRates,
}

impl RandomFaults {
    pub fn new(rates: FaultRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &FaultRates {
        &self.rates
    }

    fn decide_with(&self, site: FaultSite, rng: &mut impl Rng) -> Option<FaultOutcome> {
        let r = &self.rates;
        match site {
            FaultSite::Home => r.home_unavailable.roll(rng).then_some(FaultOutcome::ServiceUnavailable),
            FaultSite::ListUsers => r.list_users_failed.roll(rng).then_some(FaultOutcome::DatabaseUnavailable),
            FaultSite::ValidateUser => r.validation_failed.roll(rng).then_some(FaultOutcome::ValidationFailed),
            FaultSite::ProcessUser => r.processing_failed.roll(rng).then_some(FaultOutcome::ConstraintViolation),
            FaultSite::QueryUser { id } => {
                let roll = rng.random_range(0..r.query.roll_out_of.max(1));
                r.query.outcome(id, roll)
            }
            FaultSite::LookupUser { id } => {
                (id > r.not_found_above && r.not_found.roll(rng)).then_some(FaultOutcome::NotFound)
            }
        }
    }
}

impl FaultPolicy for RandomFaults {
    fn decide(&self, site: FaultSite) -> Option<FaultOutcome> {
        self.decide_with(site, &mut rand::rng())
    }

    fn latency(&self, site: FaultSite) -> Duration {
        let max = self.rates.max_processing_delay;
        if site != FaultSite::ProcessUser || max.is_zero() {
            return Duration::ZERO;
        }
        rand::rng().random_range(Duration::ZERO..max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SITES: [FaultSite; 6] = [
        FaultSite::Home,
        FaultSite::ListUsers,
        FaultSite::ValidateUser,
        FaultSite::ProcessUser,
        FaultSite::QueryUser { id: 15 },
        FaultSite::LookupUser { id: 5000 },
    ];

    fn never() -> FaultRates {
        FaultRates {
            home_unavailable: Chance::NEVER,
            list_users_failed: Chance::NEVER,
            validation_failed: Chance::NEVER,
            processing_failed: Chance::NEVER,
            not_found: Chance::NEVER,
            not_found_above: 10,
            query: QueryOdds { timeout_below: 0, query_failed_below: 0, constraint_below: 0, ..FaultRates::default().query },
            max_processing_delay: Duration::ZERO,
        }
    }

    fn always() -> FaultRates {
        FaultRates {
            home_unavailable: Chance::ALWAYS,
            list_users_failed: Chance::ALWAYS,
            validation_failed: Chance::ALWAYS,
            processing_failed: Chance::ALWAYS,
            not_found: Chance::ALWAYS,
            query: QueryOdds { timeout_below: 10, query_failed_below: 10, constraint_below: 10, ..FaultRates::default().query },
            ..FaultRates::default()
        }
    }

    #[test]
    fn no_faults_never_fails() {
        for site in SITES {
            assert_eq!(NoFaults.decide(site), None);
            assert_eq!(NoFaults.latency(site), Duration::ZERO);
        }
    }

    #[test]
    fn zero_odds_never_fail() {
        let policy = RandomFaults::new(never());
        for _ in 0..200 {
            for site in SITES {
                assert_eq!(policy.decide(site), None);
            }
        }
        assert_eq!(policy.latency(FaultSite::ProcessUser), Duration::ZERO);
    }

    #[test]
    fn certain_odds_map_each_site_to_its_outcome() {
        let policy = RandomFaults::new(always());
        assert_eq!(policy.decide(FaultSite::Home), Some(FaultOutcome::ServiceUnavailable));
        assert_eq!(policy.decide(FaultSite::ListUsers), Some(FaultOutcome::DatabaseUnavailable));
        assert_eq!(policy.decide(FaultSite::ValidateUser), Some(FaultOutcome::ValidationFailed));
        assert_eq!(policy.decide(FaultSite::ProcessUser), Some(FaultOutcome::ConstraintViolation));
        assert_eq!(policy.decide(FaultSite::LookupUser { id: 11 }), Some(FaultOutcome::NotFound));
    }

    #[test]
    fn not_found_only_applies_above_the_threshold() {
        let policy = RandomFaults::new(always());
        assert_eq!(policy.decide(FaultSite::LookupUser { id: 10 }), None);
        assert_eq!(policy.decide(FaultSite::LookupUser { id: 1 }), None);
    }

    #[test]
    fn query_rules_follow_the_id() {
        let odds = FaultRates::default().query;
        assert_eq!(odds.outcome(10, 0), Some(FaultOutcome::ConnectionTimeout));
        assert_eq!(odds.outcome(10, 3), None);
        assert_eq!(odds.outcome(9, 2), Some(FaultOutcome::QueryFailed));
        assert_eq!(odds.outcome(1001, 1), Some(FaultOutcome::PrimaryKeyViolation));
        assert_eq!(odds.outcome(1001, 2), None);
        assert_eq!(odds.outcome(7, 0), None);
        // divisible by both 5 and 3: timeout is checked first
        assert_eq!(odds.outcome(15, 0), Some(FaultOutcome::ConnectionTimeout));
    }

    #[test]
    fn default_odds_are_roughly_respected() {
        let policy = RandomFaults::default();
        let mut rng = StdRng::seed_from_u64(7);
        let hits = (0..10_000)
            .filter(|_| policy.decide_with(FaultSite::ListUsers, &mut rng).is_some())
            .count();
        // 1 in 5 → ~2000
        assert!((1600..2400).contains(&hits), "got {hits}");
    }

    #[test]
    fn processing_latency_stays_below_the_bound() {
        let policy = RandomFaults::default();
        for _ in 0..100 {
            assert!(policy.latency(FaultSite::ProcessUser) < Duration::from_millis(100));
        }
        assert_eq!(policy.latency(FaultSite::Home), Duration::ZERO);
    }

    #[test]
    fn one_in_zero_is_certain() {
        assert_eq!(Chance::one_in(0), Chance::ALWAYS);
    }
}
