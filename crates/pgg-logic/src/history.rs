//! Match history data model
//!
//! The engine owns the history; strategies only ever receive a
//! [`HistoryView`], a shared borrow of the completed rounds. Records are
//! built once per round and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::strategy::Action;

/// Seat index `0..n` within one match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl PlayerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Actions of every seat in one round, indexed by `PlayerId`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    round_index: u32,
    actions: Vec<Action>,
}

impl RoundRecord {
    pub(crate) fn new(round_index: u32, actions: Vec<Action>) -> Self {
        Self {
            round_index,
            actions,
        }
    }

    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action_of(&self, player: PlayerId) -> Option<Action> {
        self.actions.get(player.index()).copied()
    }

    /// Number of cooperators this round
    pub fn cooperators(&self) -> u32 {
        self.actions
            .iter()
            .map(|a| a.contribution() as u32)
            .sum()
    }
}

/// A round record together with the payoffs it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredRoundRecord {
    record: RoundRecord,
    payoffs: Vec<f64>,
}

impl ScoredRoundRecord {
    pub(crate) fn new(record: RoundRecord, payoffs: Vec<f64>) -> Self {
        Self { record, payoffs }
    }

    pub fn record(&self) -> &RoundRecord {
        &self.record
    }

    pub fn round_index(&self) -> u32 {
        self.record.round_index
    }

    pub fn actions(&self) -> &[Action] {
        &self.record.actions
    }

    pub fn payoffs(&self) -> &[f64] {
        &self.payoffs
    }

    pub fn payoff_of(&self, player: PlayerId) -> Option<f64> {
        self.payoffs.get(player.index()).copied()
    }
}

/// Read-only view over the completed rounds of a match.
#[derive(Clone, Copy, Debug)]
pub struct HistoryView<'a> {
    rounds: &'a [ScoredRoundRecord],
}

impl<'a> HistoryView<'a> {
    pub fn new(rounds: &'a [ScoredRoundRecord]) -> Self {
        Self { rounds }
    }

    /// An empty view, as seen in round 0.
    pub fn empty() -> HistoryView<'static> {
        HistoryView { rounds: &[] }
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> &'a [ScoredRoundRecord] {
        self.rounds
    }

    pub fn round(&self, round_index: usize) -> Option<&'a ScoredRoundRecord> {
        self.rounds.get(round_index)
    }

    pub fn last(&self) -> Option<&'a ScoredRoundRecord> {
        self.rounds.last()
    }

    /// The most recent `count` rounds (fewer if the match is younger).
    pub fn recent(&self, count: usize) -> &'a [ScoredRoundRecord] {
        let start = self.rounds.len().saturating_sub(count);
        &self.rounds[start..]
    }

    /// Record from `back` rounds ago; 0 is the last completed round.
    pub fn rounds_ago(&self, back: usize) -> Option<&'a ScoredRoundRecord> {
        self.rounds.len().checked_sub(back + 1).map(|i| &self.rounds[i])
    }

    pub fn action_of(&self, round_index: usize, player: PlayerId) -> Option<Action> {
        self.round(round_index)?.record.action_of(player)
    }

    pub fn last_action_of(&self, player: PlayerId) -> Option<Action> {
        self.last()?.record.action_of(player)
    }

    pub fn payoff_of(&self, round_index: usize, player: PlayerId) -> Option<f64> {
        self.round(round_index)?.payoff_of(player)
    }

    pub fn last_payoff_of(&self, player: PlayerId) -> Option<f64> {
        self.last()?.payoff_of(player)
    }

    pub fn cooperators_in(&self, round_index: usize) -> Option<u32> {
        Some(self.round(round_index)?.record.cooperators())
    }

    /// Fraction of all seats that cooperated in the round.
    pub fn cooperation_rate(&self, round_index: usize) -> Option<f64> {
        let record = &self.round(round_index)?.record;
        Some(record.cooperators() as f64 / record.actions.len() as f64)
    }

    /// Fraction of the *other* seats that cooperated in the round.
    pub fn others_cooperation_rate(&self, round_index: usize, me: PlayerId) -> Option<f64> {
        let record = &self.round(round_index)?.record;
        let others = record.actions.len().checked_sub(1).filter(|n| *n > 0)?;
        let mine = record.action_of(me).map_or(0, |a| a.contribution() as u32);
        Some((record.cooperators() - mine) as f64 / others as f64)
    }

    pub fn count_defections_by(&self, player: PlayerId) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.record.action_of(player) == Some(Action::Defect))
            .count()
    }

    /// Total defections by every seat except `me`, over the whole match.
    pub fn others_defections(&self, me: PlayerId) -> usize {
        self.rounds
            .iter()
            .map(|r| {
                r.record
                    .actions
                    .iter()
                    .enumerate()
                    .filter(|(i, a)| *i != me.index() && **a == Action::Defect)
                    .count()
            })
            .sum()
    }
}
