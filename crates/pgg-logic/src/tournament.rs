//! Tournament runner
//!
//! Matches are independent: each worker builds fresh strategy instances,
//! plays the match and hands the outcome to the shared aggregator. Match
//! ids are handed out in batches, so the aggregator never parks more than
//! one batch of outcomes.

use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::aggregate::{ResultAggregator, TournamentResult};
use crate::config::{GameConfig, TournamentConfig};
use crate::error::{ConfigurationError, MatchError, TournamentError};
use crate::game::{run_match, MatchOutcome, MatchSettings};
use crate::registry::StrategyRegistry;
use crate::schedule::{calculate_match_count, get_group_for_match, MatchSpec};

/// Matches in flight per worker thread.
const MATCHES_PER_WORKER: u64 = 64;

/// A validated tournament: configuration, strategies and schedule size.
#[derive(Debug)]
pub struct Tournament {
    config: TournamentConfig,
    game: GameConfig,
    registry: StrategyRegistry,
    match_count: u64,
}

impl Tournament {
    pub fn new(
        config: TournamentConfig,
        registry: StrategyRegistry,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let game = config.game()?;
        let strategy_count = u32::try_from(registry.len())
            .map_err(|_| ConfigurationError::ScheduleTooLarge(registry.len() as u128))?;
        let match_count = calculate_match_count(&config, strategy_count)?;

        Ok(Self {
            config,
            game,
            registry,
            match_count,
        })
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    /// The scheduled group for `match_id`.
    pub fn match_spec(&self, match_id: u64) -> Option<MatchSpec> {
        get_group_for_match(&self.config, self.registry.len() as u32, match_id)
    }

    /// Play a single scheduled match with fresh strategy instances.
    ///
    /// The outcome carries the round history when `keep_histories` is set.
    pub fn play_match(&self, match_id: u64) -> Result<(MatchSpec, MatchOutcome), TournamentError> {
        self.play(match_id, self.config.keep_histories)
    }

    fn play(
        &self,
        match_id: u64,
        keep_history: bool,
    ) -> Result<(MatchSpec, MatchOutcome), TournamentError> {
        let spec = self
            .match_spec(match_id)
            .ok_or(MatchError::OutOfSchedule {
                match_id,
                scheduled: self.match_count,
            })?;

        let seats = spec
            .seats
            .iter()
            .map(|&id| {
                self.registry
                    .seat(id)
                    .ok_or_else(|| ConfigurationError::UnknownStrategy(format!("#{}", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let settings = MatchSettings {
            decision_timeout: self.config.decision_timeout(),
            max_faults_per_seat: self.config.max_faults_per_seat,
            keep_history,
        };
        let outcome = run_match(match_id, self.game, seats, self.config.seed, settings)?;
        Ok((spec, outcome))
    }

    /// Play every scheduled match on a worker pool and rank the strategies.
    ///
    /// Results do not depend on the worker count. Histories are never
    /// kept here; replay single matches with [`play_match`](Self::play_match).
    pub fn run(&self) -> Result<TournamentResult, TournamentError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers.unwrap_or(0))
            .build()
            .map_err(|e| ConfigurationError::WorkerPool(e.to_string()))?;

        info!(
            matches = self.match_count,
            strategies = self.registry.len(),
            workers = pool.current_num_threads(),
            composition = self.config.composition.as_str(),
            n = self.game.n(),
            k = self.game.k(),
            r = self.game.r(),
            seed = self.config.seed,
            "tournament started"
        );

        let batch = (pool.current_num_threads() as u64).max(1) * MATCHES_PER_WORKER;
        let mut aggregator = self.play_all(&pool, batch)?;
        aggregator.mark_complete();
        let result = aggregator.finalize()?;

        info!(
            matches = result.matches_played,
            faults = result.faults.len(),
            leader = result.standings.first().map(|s| s.name.as_str()).unwrap_or(""),
            "tournament finished"
        );
        Ok(result)
    }

    /// Play every match, `batch` ids at a time, into a fresh aggregator.
    fn play_all(
        &self,
        pool: &ThreadPool,
        batch: u64,
    ) -> Result<ResultAggregator, TournamentError> {
        let aggregator = Mutex::new(ResultAggregator::new(
            self.registry.descriptors().cloned().collect(),
            self.match_count,
        ));

        let mut start = 0;
        while start < self.match_count {
            let end = start.saturating_add(batch).min(self.match_count);
            pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .try_for_each(|match_id| -> Result<(), TournamentError> {
                        let (spec, outcome) = self.play(match_id, false)?;
                        aggregator
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record(spec.seats, outcome)?;
                        Ok(())
                    })
            })?;
            start = end;
        }

        Ok(aggregator.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
