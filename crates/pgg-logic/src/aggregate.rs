//! Tournament result aggregation
//!
//! Match outcomes arrive from worker threads in any order. They are parked
//! in a reorder buffer and applied strictly in match-id order, so every
//! floating-point sum is taken in the same order on every run. Round
//! histories are dropped on arrival; only scores and faults are kept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IncompleteTournamentError, InvalidActionsError, MatchError};
use crate::game::{FaultReason, MatchOutcome, StrategyFaultEvent};
use crate::registry::StrategyDescriptor;

/// Scores closer than this are a shared top score.
const TIE_EPSILON: f64 = 1e-9;

/// Final statistics for one strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based position in the ranking
    pub rank: u32,
    pub name: String,
    pub source: String,
    /// Mean payoff per round played
    pub mean_payoff: f64,
    pub total_payoff: f64,
    /// Seat-matches: a strategy seated twice in one match counts twice
    pub matches_played: u64,
    pub rounds_played: u64,
    /// Sample variance of the per-match mean payoff per round
    pub variance: f64,
    /// Matches where this seat alone had the top score
    pub wins: u64,
    /// Matches where this seat shared the top score
    pub ties: u64,
    pub win_rate: f64,
    /// Strategy faults, not counting quarantine notices
    pub faults: u64,
    /// Total score of every seat-match, in match-id order
    pub match_scores: Vec<f64>,
}

/// Complete output of a tournament run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub standings: Vec<Standing>,
    /// Every fault, in match-id order
    pub faults: Vec<StrategyFaultEvent>,
    pub matches_played: u64,
}

impl TournamentResult {
    pub fn standing(&self, name: &str) -> Option<&Standing> {
        self.standings.iter().find(|s| s.name == name)
    }
}

#[derive(Clone, Debug, Default)]
struct StrategyStats {
    matches: u64,
    rounds: u64,
    total: f64,
    // Welford accumulators over per-match mean per round
    mean_of_means: f64,
    m2: f64,
    wins: u64,
    ties: u64,
    faults: u64,
    match_scores: Vec<f64>,
}

impl StrategyStats {
    fn push_match(&mut self, score: f64, rounds: u32) {
        self.matches += 1;
        self.rounds += rounds as u64;
        self.total += score;
        self.match_scores.push(score);

        let x = if rounds == 0 { 0.0 } else { score / rounds as f64 };
        let delta = x - self.mean_of_means;
        self.mean_of_means += delta / self.matches as f64;
        self.m2 += delta * (x - self.mean_of_means);
    }

    fn mean_per_round(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.total / self.rounds as f64
        }
    }

    fn variance(&self) -> f64 {
        if self.matches < 2 {
            0.0
        } else {
            self.m2 / (self.matches - 1) as f64
        }
    }
}

/// Online per-strategy statistics over a fixed schedule of matches.
#[derive(Debug)]
pub struct ResultAggregator {
    strategies: Vec<StrategyDescriptor>,
    stats: Vec<StrategyStats>,
    scheduled: u64,
    next_match: u64,
    pending: BTreeMap<u64, (Vec<usize>, MatchOutcome)>,
    peak_buffered: usize,
    faults: Vec<StrategyFaultEvent>,
    complete: bool,
}

impl ResultAggregator {
    pub fn new(strategies: Vec<StrategyDescriptor>, scheduled: u64) -> Self {
        let stats = vec![StrategyStats::default(); strategies.len()];
        Self {
            strategies,
            stats,
            scheduled,
            next_match: 0,
            pending: BTreeMap::new(),
            peak_buffered: 0,
            faults: Vec::new(),
            complete: false,
        }
    }

    /// Matches applied so far (contiguous from id 0).
    pub fn applied(&self) -> u64 {
        self.next_match
    }

    /// Matches received but waiting for an earlier id.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Largest [`buffered`](Self::buffered) count seen so far.
    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    /// Accept one outcome. `seats` maps each seat to its strategy index.
    pub fn record(
        &mut self,
        seats: Vec<usize>,
        mut outcome: MatchOutcome,
    ) -> Result<(), MatchError> {
        let match_id = outcome.match_id;
        if match_id >= self.scheduled {
            return Err(MatchError::OutOfSchedule {
                match_id,
                scheduled: self.scheduled,
            });
        }
        if match_id < self.next_match || self.pending.contains_key(&match_id) {
            return Err(MatchError::DuplicateOutcome(match_id));
        }
        if seats.len() != outcome.scores.len() || seats.iter().any(|&s| s >= self.stats.len()) {
            return Err(InvalidActionsError::WrongCardinality {
                expected: seats.len(),
                got: outcome.scores.len(),
            }
            .into());
        }

        outcome.history = None;
        self.pending.insert(match_id, (seats, outcome));
        self.peak_buffered = self.peak_buffered.max(self.pending.len());
        while let Some((seats, outcome)) = self.pending.remove(&self.next_match) {
            self.apply(&seats, outcome);
            self.next_match += 1;
        }
        Ok(())
    }

    /// Signal that no more outcomes will be recorded.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Rank every registered strategy.
    pub fn finalize(&self) -> Result<TournamentResult, IncompleteTournamentError> {
        if !self.complete {
            return Err(IncompleteTournamentError::NotComplete);
        }
        if self.next_match < self.scheduled {
            return Err(IncompleteTournamentError::MissingMatches {
                expected: self.scheduled,
                missing: self.scheduled - self.next_match,
            });
        }

        let mut standings: Vec<Standing> = self
            .strategies
            .iter()
            .zip(&self.stats)
            .map(|(descriptor, stats)| Standing {
                rank: 0,
                name: descriptor.name.clone(),
                source: descriptor.source.clone(),
                mean_payoff: stats.mean_per_round(),
                total_payoff: stats.total,
                matches_played: stats.matches,
                rounds_played: stats.rounds,
                variance: stats.variance(),
                wins: stats.wins,
                ties: stats.ties,
                win_rate: if stats.matches == 0 {
                    0.0
                } else {
                    stats.wins as f64 / stats.matches as f64
                },
                faults: stats.faults,
                match_scores: stats.match_scores.clone(),
            })
            .collect();

        standings.sort_by(|a, b| {
            b.mean_payoff
                .total_cmp(&a.mean_payoff)
                .then_with(|| b.total_payoff.total_cmp(&a.total_payoff))
                .then_with(|| a.name.cmp(&b.name))
        });
        for (i, standing) in standings.iter_mut().enumerate() {
            standing.rank = i as u32 + 1;
        }

        Ok(TournamentResult {
            standings,
            faults: self.faults.clone(),
            matches_played: self.next_match,
        })
    }

    fn apply(&mut self, seats: &[usize], outcome: MatchOutcome) {
        let top = outcome
            .scores
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let at_top = outcome
            .scores
            .iter()
            .filter(|&&s| top - s <= TIE_EPSILON)
            .count();

        for (&strategy, &score) in seats.iter().zip(&outcome.scores) {
            let stats = &mut self.stats[strategy];
            stats.push_match(score, outcome.rounds_played);
            if top - score <= TIE_EPSILON {
                if at_top == 1 {
                    stats.wins += 1;
                } else {
                    stats.ties += 1;
                }
            }
        }

        for fault in &outcome.faults {
            if matches!(fault.reason, FaultReason::Quarantined { .. }) {
                continue;
            }
            if let Some(&strategy) = seats.get(fault.seat.index()) {
                self.stats[strategy].faults += 1;
            }
        }
        self.faults.extend(outcome.faults);
    }
}
