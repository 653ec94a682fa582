//! Match Logic for Public Goods Arena
//!
//! Core engine for the Iterated N-Player Public Goods Game tournament.
//! This crate is compiled to:
//! - Native (tournament runner, parallel across matches)
//! - WASM (for frontend match replay)

mod aggregate;
mod config;
mod error;
mod game;
mod history;
mod random;
mod registry;
mod schedule;
mod strategy;
mod tournament;
pub mod vm;

#[cfg(feature = "wasm")]
mod wasm;

pub use aggregate::{ResultAggregator, Standing, TournamentResult};
pub use config::{Composition, GameConfig, TournamentConfig};
pub use error::{
    ConfigurationError, IncompleteTournamentError, InvalidActionsError, MatchError,
    StrategyError, TournamentError,
};
pub use game::{
    run_match, FaultReason, MatchEngine, MatchOutcome, MatchPhase, MatchSettings, Seat,
    StrategyFaultEvent,
};
pub use history::{HistoryView, PlayerId, RoundRecord, ScoredRoundRecord};
pub use random::SeededRng;
pub use registry::{StrategyDescriptor, StrategyFactory, StrategyRegistry};
pub use schedule::{calculate_match_count, generate_all_groups, get_group_for_match, MatchSpec};
pub use strategy::{
    describe_strategy, strategy_fn, Action, BuiltinPlayer, BuiltinStrategy, DecisionContext,
    FnStrategy, Strategy, StrategyBase, StrategyParams,
};
pub use tournament::Tournament;
pub use vm::{BytecodeError, BytecodeStrategy, VmError};

/// Total payoff per seat over one match
pub type MatchScore = Vec<f64>;

/// Payoffs for one round of the public goods game
///
/// `payoff_i = (1 - c_i) + (k / n) * Σ c_j`, where `c_i` is 1 if seat `i`
/// cooperated. Returns one payoff per seat, in seat order.
pub fn payoff(config: &GameConfig, actions: &[Action]) -> Result<Vec<f64>, InvalidActionsError> {
    let n = config.n() as usize;
    if actions.len() != n {
        return Err(InvalidActionsError::WrongCardinality {
            expected: n,
            got: actions.len(),
        });
    }

    let contributions: u32 = actions.iter().map(|a| a.contribution() as u32).sum();
    let share = config.mpcr() * contributions as f64;

    Ok(actions
        .iter()
        .map(|a| (1 - a.contribution()) as f64 + share)
        .collect())
}

/// Payoffs from raw contributions; every value must be 0 or 1.
pub fn payoff_from_contributions(
    config: &GameConfig,
    contributions: &[u8],
) -> Result<Vec<f64>, InvalidActionsError> {
    let actions = contributions
        .iter()
        .enumerate()
        .map(|(player, &value)| match value {
            0 => Ok(Action::Defect),
            1 => Ok(Action::Cooperate),
            _ => Err(InvalidActionsError::InvalidContribution { player, value }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    payoff(config, &actions)
}
