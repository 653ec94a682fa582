//! Game and tournament configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Parameters of one public goods game: group size, multiplier, rounds.
///
/// Only constructible through [`GameConfig::new`] (or deserialization
/// followed by [`GameConfig::validate`]), so every engine sees
/// `n >= 2`, `1 < k < n`, `r >= 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    n: u32,
    k: f64,
    r: u32,
}

impl GameConfig {
    pub fn new(n: u32, k: f64, r: u32) -> Result<Self, ConfigurationError> {
        let config = Self { n, k, r };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n < 2 {
            return Err(ConfigurationError::GroupTooSmall(self.n));
        }
        if !self.k.is_finite() || self.k <= 1.0 || self.k >= self.n as f64 {
            return Err(ConfigurationError::MultiplierOutOfRange {
                k: self.k,
                n: self.n,
            });
        }
        if self.r < 1 {
            return Err(ConfigurationError::NoRounds);
        }
        Ok(())
    }

    /// Group size
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Public good multiplier
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Rounds per match
    pub fn r(&self) -> u32 {
        self.r
    }

    /// Marginal per-capita return, `k / n`
    pub fn mpcr(&self) -> f64 {
        self.k / self.n as f64
    }

    /// True if `round_index` is the final round of the match.
    pub fn is_last_round(&self, round_index: u32) -> bool {
        round_index + 1 == self.r
    }

    /// Rounds remaining after `round_index`, not counting it.
    pub fn rounds_left(&self, round_index: u32) -> u32 {
        self.r.saturating_sub(round_index + 1)
    }
}

/// How strategies are grouped into matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    /// Every combination of `n` distinct strategies.
    #[default]
    RoundRobin,
    /// `sample_groups` random groups of `n` distinct strategies.
    RandomSample,
    /// One focal seat against `n - 1` copies of each other strategy.
    AllVsOne,
}

impl Composition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Composition::RoundRobin => "round_robin",
            Composition::RandomSample => "random_sample",
            Composition::AllVsOne => "all_vs_one",
        }
    }
}

/// Full tournament configuration.
///
/// ```json
/// {"n": 4, "k": 1.6, "r": 20, "composition": "random_sample",
///  "sample_groups": 200, "seed": 7}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TournamentConfig {
    /// Group size
    pub n: u32,
    /// Public good multiplier
    pub k: f64,
    /// Rounds per match
    pub r: u32,
    /// Matches played per group (variance reduction)
    pub repetitions_per_group: u32,
    pub composition: Composition,
    /// Groups drawn when `composition` is `random_sample`
    pub sample_groups: u32,
    pub seed: u64,
    /// Worker threads (None = rayon default)
    pub workers: Option<usize>,
    /// Per-call wall-clock budget for `decide`, in milliseconds (>= 1)
    pub decision_timeout_ms: Option<u64>,
    /// Faults after which a seat is no longer consulted for the match (>= 1)
    pub max_faults_per_seat: Option<u32>,
    /// Keep round histories in outcomes of `Tournament::play_match`.
    /// Full runs only aggregate scores and never keep them.
    pub keep_histories: bool,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            n: 4,
            k: 1.6,
            r: 10,
            repetitions_per_group: 1,
            composition: Composition::RoundRobin,
            sample_groups: 100,
            seed: 0,
            workers: None,
            decision_timeout_ms: None,
            max_faults_per_seat: None,
            keep_histories: false,
        }
    }
}

impl TournamentConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.game()?;
        if self.repetitions_per_group < 1 {
            return Err(ConfigurationError::NoRepetitions);
        }
        if self.composition == Composition::RandomSample && self.sample_groups < 1 {
            return Err(ConfigurationError::NoSampleGroups);
        }
        if self.decision_timeout_ms == Some(0) {
            return Err(ConfigurationError::ZeroDecisionTimeout);
        }
        if self.max_faults_per_seat == Some(0) {
            return Err(ConfigurationError::ZeroFaultBudget);
        }
        Ok(())
    }

    /// The validated per-match game configuration.
    pub fn game(&self) -> Result<GameConfig, ConfigurationError> {
        GameConfig::new(self.n, self.k, self.r)
    }

    pub fn decision_timeout(&self) -> Option<Duration> {
        self.decision_timeout_ms.map(Duration::from_millis)
    }
}
