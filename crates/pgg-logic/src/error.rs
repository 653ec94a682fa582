//! Error taxonomy
//!
//! Harness bugs and bad configuration are errors and propagate with `?`.
//! Strategy misbehaviour is *not* an error at the tournament level: it is
//! downgraded to a [`StrategyFaultEvent`](crate::StrategyFaultEvent) and a
//! default `Defect`.

use thiserror::Error;

use crate::vm::VmError;

/// PayoffCalculator received a malformed action vector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidActionsError {
    #[error("expected {expected} actions, got {got}")]
    WrongCardinality { expected: usize, got: usize },

    #[error("player {player} has contribution {value}, expected 0 or 1")]
    InvalidContribution { player: usize, value: u8 },
}

/// Failure reported by a strategy's `decide`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("strategy failed: {0}")]
    Failed(String),

    #[error("strategy returned invalid action value {0}")]
    InvalidAction(u8),

    #[error("bytecode error: {0}")]
    Vm(#[from] VmError),
}

/// Aggregate results were requested before the tournament finished.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IncompleteTournamentError {
    #[error("tournament has not signalled completion")]
    NotComplete,

    #[error("{missing} of {expected} matches have not been recorded")]
    MissingMatches { expected: u64, missing: u64 },
}

/// Invalid game or tournament setup, raised before any match runs.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("group size n must be >= 2, got {0}")]
    GroupTooSmall(u32),

    #[error("multiplier k must satisfy 1 < k < n (n = {n}), got {k}")]
    MultiplierOutOfRange { k: f64, n: u32 },

    #[error("round count r must be >= 1")]
    NoRounds,

    #[error("repetitions_per_group must be >= 1")]
    NoRepetitions,

    #[error("random_sample composition needs sample_groups >= 1")]
    NoSampleGroups,

    #[error("decision_timeout_ms must be at least 1")]
    ZeroDecisionTimeout,

    #[error("max_faults_per_seat must be at least 1")]
    ZeroFaultBudget,

    #[error("composition {composition} needs at least {needed} strategies, {registered} registered")]
    NotEnoughStrategies {
        composition: &'static str,
        needed: u32,
        registered: u32,
    },

    #[error("strategy name already registered: {0}")]
    DuplicateStrategy(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy name must not be empty")]
    EmptyStrategyName,

    #[error("invalid bytecode for {name}: {source}")]
    InvalidBytecode {
        name: String,
        #[source]
        source: crate::vm::BytecodeError,
    },

    #[error("expected {expected} seated strategies, got {got}")]
    SeatCountMismatch { expected: u32, got: usize },

    #[error("schedule of {0} matches is too large")]
    ScheduleTooLarge(u128),

    #[error("worker pool could not be built: {0}")]
    WorkerPool(String),

    #[error("malformed tournament configuration: {0}")]
    Malformed(String),
}

/// Engine-internal failures. These indicate a harness bug.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    InvalidActions(#[from] InvalidActionsError),

    #[error("match {0} is already finalized")]
    AlreadyFinalized(u64),

    #[error("match {match_id} finished after {played} of {expected} rounds")]
    Unfinished {
        match_id: u64,
        played: u32,
        expected: u32,
    },

    #[error("decision order must be a permutation of 0..{0}")]
    InvalidDecisionOrder(u32),

    #[error("outcome for match {0} recorded twice")]
    DuplicateOutcome(u64),

    #[error("match {match_id} is outside a schedule of {scheduled} matches")]
    OutOfSchedule { match_id: u64, scheduled: u64 },
}

/// Umbrella error for running a tournament.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TournamentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Incomplete(#[from] IncompleteTournamentError),
}
