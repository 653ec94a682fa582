//! Match execution engine

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GameConfig;
use crate::error::{ConfigurationError, MatchError, StrategyError, TournamentError};
use crate::history::{HistoryView, PlayerId, RoundRecord, ScoredRoundRecord};
use crate::random::SeededRng;
use crate::strategy::{Action, DecisionContext, Strategy};
use crate::{payoff, MatchScore};

/// A strategy instance sitting at one seat of a match.
pub struct Seat {
    name: Arc<str>,
    strategy: Box<dyn Strategy>,
}

impl Seat {
    pub fn new(name: impl Into<Arc<str>>, strategy: impl Strategy + 'static) -> Self {
        Self {
            name: name.into(),
            strategy: Box::new(strategy),
        }
    }

    /// Seat an already boxed strategy (as produced by a registry factory).
    pub fn boxed(name: impl Into<Arc<str>>, strategy: Box<dyn Strategy>) -> Self {
        Self {
            name: name.into(),
            strategy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seat").field("name", &self.name).finish()
    }
}

/// Per-match harness limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchSettings {
    /// Wall-clock budget per `decide` call. When set, every call runs on
    /// its own thread; a call still running at the deadline is abandoned
    /// and its seat quarantined. Threads are unavailable on wasm32, so
    /// leave this unset there.
    pub decision_timeout: Option<Duration>,
    /// Faults after which a seat stops being consulted.
    pub max_faults_per_seat: Option<u32>,
    /// Return the full round history in the outcome.
    pub keep_history: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    Init,
    InProgress { next_round: u32 },
    Finalized,
}

/// Why a seat's decision was replaced by `Defect`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultReason {
    Errored { message: String },
    Panicked { message: String },
    InvalidAction { value: u8 },
    TimedOut { elapsed_ms: u64, budget_ms: u64 },
    Quarantined { faults: u32 },
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::Errored { message } => write!(f, "errored: {}", message),
            FaultReason::Panicked { message } => write!(f, "panicked: {}", message),
            FaultReason::InvalidAction { value } => write!(f, "invalid action value {}", value),
            FaultReason::TimedOut {
                elapsed_ms,
                budget_ms,
            } => write!(f, "took {}ms, budget {}ms", elapsed_ms, budget_ms),
            FaultReason::Quarantined { faults } => {
                write!(f, "quarantined after {} faults", faults)
            }
        }
    }
}

impl From<StrategyError> for FaultReason {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::InvalidAction(value) => FaultReason::InvalidAction { value },
            other => FaultReason::Errored {
                message: other.to_string(),
            },
        }
    }
}

/// A recorded, non-fatal strategy misbehaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFaultEvent {
    pub match_id: u64,
    pub round: u32,
    pub seat: PlayerId,
    pub strategy_name: String,
    pub reason: FaultReason,
}

/// Result of a complete match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub match_id: u64,
    pub config: GameConfig,
    /// Strategy name per seat
    pub seats: Vec<String>,
    /// Total payoff per seat
    pub scores: MatchScore,
    pub rounds_played: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ScoredRoundRecord>>,
    pub faults: Vec<StrategyFaultEvent>,
}

struct SeatState {
    name: Arc<str>,
    /// `None` once an abandoned call kept the instance
    strategy: Option<Box<dyn Strategy>>,
    faults: u32,
    quarantined: bool,
}

impl fmt::Debug for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeatState")
            .field("name", &self.name)
            .field("faults", &self.faults)
            .field("quarantined", &self.quarantined)
            .finish()
    }
}

/// Drives one match round by round.
#[derive(Debug)]
pub struct MatchEngine {
    match_id: u64,
    config: GameConfig,
    seats: Vec<SeatState>,
    rng: SeededRng,
    settings: MatchSettings,
    phase: MatchPhase,
    history: Vec<ScoredRoundRecord>,
    scores: Vec<f64>,
    faults: Vec<StrategyFaultEvent>,
}

impl MatchEngine {
    pub fn new(
        match_id: u64,
        config: GameConfig,
        seats: Vec<Seat>,
        seed: u64,
        settings: MatchSettings,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        if seats.len() != config.n() as usize {
            return Err(ConfigurationError::SeatCountMismatch {
                expected: config.n(),
                got: seats.len(),
            });
        }

        Ok(Self {
            match_id,
            config,
            seats: seats
                .into_iter()
                .map(|seat| SeatState {
                    name: seat.name,
                    strategy: Some(seat.strategy),
                    faults: 0,
                    quarantined: false,
                })
                .collect(),
            rng: SeededRng::new(seed, match_id),
            settings,
            phase: MatchPhase::Init,
            history: Vec::with_capacity(config.r() as usize),
            scores: vec![0.0; config.n() as usize],
            faults: Vec::new(),
        })
    }

    pub fn match_id(&self) -> u64 {
        self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn history(&self) -> HistoryView<'_> {
        HistoryView::new(&self.history)
    }

    pub fn faults(&self) -> &[StrategyFaultEvent] {
        &self.faults
    }

    /// Play the next round, asking seats in index order.
    pub fn play_round(&mut self) -> Result<&ScoredRoundRecord, MatchError> {
        let order: Vec<usize> = (0..self.seats.len()).collect();
        self.play_round_in_order(&order)
    }

    /// Play the next round, asking seats in the given order.
    ///
    /// The order only affects call sequence: every seat sees the same
    /// history and its own RNG stream, so the resulting actions are the
    /// same for any permutation.
    pub fn play_round_in_order(
        &mut self,
        order: &[usize],
    ) -> Result<&ScoredRoundRecord, MatchError> {
        let n = self.seats.len();
        if self.phase != MatchPhase::Finalized && !is_permutation(order, n) {
            return Err(MatchError::InvalidDecisionOrder(n as u32));
        }

        let round = match self.phase {
            MatchPhase::Finalized => return Err(MatchError::AlreadyFinalized(self.match_id)),
            MatchPhase::Init => {
                for strategy in self.seats.iter_mut().filter_map(|s| s.strategy.as_mut()) {
                    strategy.reset();
                }
                debug!(match_id = self.match_id, seats = self.seats.len(), "match started");
                0
            }
            MatchPhase::InProgress { next_round } => next_round,
        };

        let view = HistoryView::new(&self.history);
        // Budgeted calls run on their own threads and need an owned copy
        let snapshot: Option<Arc<[ScoredRoundRecord]>> = self
            .settings
            .decision_timeout
            .map(|_| Arc::from(self.history.as_slice()));
        let mut actions = vec![Action::Defect; n];
        for &index in order {
            let state = &mut self.seats[index];
            let seat_id = PlayerId(index as u32);
            if state.quarantined {
                continue;
            }

            let mut rng = self.rng.for_decision(round, index as u32);

            let result = match (self.settings.decision_timeout, &snapshot) {
                (Some(budget), Some(history)) => {
                    let Some(strategy) = state.strategy.take() else {
                        continue;
                    };
                    let ctx = OwnedContext {
                        round_index: round,
                        config: self.config,
                        my_id: seat_id,
                        history: Arc::clone(history),
                    };
                    let (returned, result) = decide_with_budget(strategy, ctx, rng, budget);
                    state.strategy = returned;
                    result
                }
                _ => {
                    let Some(strategy) = state.strategy.as_mut() else {
                        continue;
                    };
                    let ctx = DecisionContext {
                        round_index: round,
                        config: self.config,
                        my_id: seat_id,
                        history: view,
                    };
                    decide_guarded(strategy.as_mut(), &ctx, &mut rng)
                }
            };

            match result {
                Ok(action) => actions[index] = action,
                Err(reason) => {
                    state.faults += 1;
                    record_fault(&mut self.faults, self.match_id, round, seat_id, state, reason);

                    let over_limit = self
                        .settings
                        .max_faults_per_seat
                        .is_some_and(|limit| state.faults >= limit);
                    if over_limit || state.strategy.is_none() {
                        state.quarantined = true;
                        let reason = FaultReason::Quarantined {
                            faults: state.faults,
                        };
                        record_fault(&mut self.faults, self.match_id, round, seat_id, state, reason);
                    }
                }
            }
        }

        let payoffs = payoff(&self.config, &actions)?;
        for (total, p) in self.scores.iter_mut().zip(&payoffs) {
            *total += p;
        }
        self.history.push(ScoredRoundRecord::new(
            RoundRecord::new(round, actions),
            payoffs,
        ));

        self.phase = if self.config.is_last_round(round) {
            MatchPhase::Finalized
        } else {
            MatchPhase::InProgress {
                next_round: round + 1,
            }
        };

        // Pushed just above
        Ok(&self.history[self.history.len() - 1])
    }

    /// Close the match and produce its outcome.
    pub fn finish(self) -> Result<MatchOutcome, MatchError> {
        let played = self.history.len() as u32;
        if self.phase != MatchPhase::Finalized || played != self.config.r() {
            return Err(MatchError::Unfinished {
                match_id: self.match_id,
                played,
                expected: self.config.r(),
            });
        }

        debug!(
            match_id = self.match_id,
            faults = self.faults.len(),
            "match finished"
        );

        Ok(MatchOutcome {
            match_id: self.match_id,
            config: self.config,
            seats: self.seats.iter().map(|s| s.name.to_string()).collect(),
            scores: self.scores,
            rounds_played: played,
            history: self.settings.keep_history.then_some(self.history),
            faults: self.faults,
        })
    }
}

/// Run a complete match of `config.r()` rounds.
pub fn run_match(
    match_id: u64,
    config: GameConfig,
    seats: Vec<Seat>,
    seed: u64,
    settings: MatchSettings,
) -> Result<MatchOutcome, TournamentError> {
    let mut engine = MatchEngine::new(match_id, config, seats, seed, settings)?;
    while engine.phase() != MatchPhase::Finalized {
        engine.play_round()?;
    }
    Ok(engine.finish()?)
}

fn is_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &i in order {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// Call `decide`, converting errors, panics and invalid values into faults.
fn decide_guarded(
    strategy: &mut dyn Strategy,
    ctx: &DecisionContext<'_>,
    rng: &mut SeededRng,
) -> Result<Action, FaultReason> {
    match panic::catch_unwind(AssertUnwindSafe(|| strategy.decide(ctx, rng))) {
        Ok(Ok(action)) => Ok(action),
        Ok(Err(err)) => Err(err.into()),
        Err(payload) => Err(FaultReason::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Decision inputs a budgeted call can own on its thread.
struct OwnedContext {
    round_index: u32,
    config: GameConfig,
    my_id: PlayerId,
    history: Arc<[ScoredRoundRecord]>,
}

/// Run one `decide` call on a fresh thread and wait at most `budget`.
///
/// The strategy travels to the thread and back with the answer. When the
/// deadline passes first the thread is abandoned together with the
/// instance, and `None` is returned in its place.
fn decide_with_budget(
    mut strategy: Box<dyn Strategy>,
    ctx: OwnedContext,
    mut rng: SeededRng,
    budget: Duration,
) -> (Option<Box<dyn Strategy>>, Result<Action, FaultReason>) {
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();

    let spawned = thread::Builder::new()
        .name(format!("decide-{}", ctx.my_id))
        .spawn(move || {
            let view = DecisionContext {
                round_index: ctx.round_index,
                config: ctx.config,
                my_id: ctx.my_id,
                history: HistoryView::new(&ctx.history),
            };
            let result = decide_guarded(strategy.as_mut(), &view, &mut rng);
            // The receiver is gone if the deadline already passed
            let _ = tx.send((strategy, result));
        });
    if let Err(err) = spawned {
        let reason = FaultReason::Errored {
            message: format!("decision thread failed to start: {}", err),
        };
        return (None, Err(reason));
    }

    match rx.recv_timeout(budget) {
        Ok((strategy, result)) => (Some(strategy), result),
        Err(RecvTimeoutError::Timeout) => {
            let reason = FaultReason::TimedOut {
                elapsed_ms: started.elapsed().as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            };
            (None, Err(reason))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let reason = FaultReason::Panicked {
                message: "decision thread exited without an answer".to_string(),
            };
            (None, Err(reason))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn record_fault(
    log: &mut Vec<StrategyFaultEvent>,
    match_id: u64,
    round: u32,
    seat: PlayerId,
    state: &SeatState,
    reason: FaultReason,
) {
    warn!(
        match_id,
        round,
        seat = %seat,
        strategy = %state.name,
        reason = %reason,
        "strategy fault"
    );
    log.push(StrategyFaultEvent {
        match_id,
        round,
        seat,
        strategy_name: state.name.to_string(),
        reason,
    });
}
