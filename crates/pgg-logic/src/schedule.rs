//! Deterministic group generation for tournament matches
//!
//! Every match id maps to its group by direct computation: combinations
//! are unranked, sampled groups are redrawn from their own seeded stream.
//! Nothing requires materializing the schedule.

use serde::{Deserialize, Serialize};

use crate::config::{Composition, TournamentConfig};
use crate::error::ConfigurationError;
use crate::random::SeededRng;

/// One scheduled match: which registered strategies sit at which seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpec {
    pub match_id: u64,
    /// Index of the group within the composition
    pub group: u64,
    /// Repetition of that group, `0..repetitions_per_group`
    pub repetition: u32,
    /// Registry index per seat
    pub seats: Vec<usize>,
}

/// Total number of matches. O(1), no allocation
///
/// Fails if the composition needs more strategies than are registered or
/// the schedule does not fit a `u64` match id.
pub fn calculate_match_count(
    config: &TournamentConfig,
    strategy_count: u32,
) -> Result<u64, ConfigurationError> {
    config.validate()?;
    let groups = group_count(config, strategy_count)?;
    let total = groups
        .checked_mul(config.repetitions_per_group as u128)
        .ok_or(ConfigurationError::ScheduleTooLarge(u128::MAX))?;
    u64::try_from(total).map_err(|_| ConfigurationError::ScheduleTooLarge(total))
}

/// Get the group for a specific match id. O(n·S) time, O(n) memory
///
/// Returns `None` for ids past the end of the schedule or an unusable
/// configuration.
pub fn get_group_for_match(
    config: &TournamentConfig,
    strategy_count: u32,
    match_id: u64,
) -> Option<MatchSpec> {
    let total = calculate_match_count(config, strategy_count).ok()?;
    if match_id >= total {
        return None;
    }

    let reps = config.repetitions_per_group as u64;
    let group = match_id / reps;
    let repetition = (match_id % reps) as u32;
    let n = config.n;

    let seats = match config.composition {
        Composition::RoundRobin => unrank_combination(group as u128, strategy_count, n),
        Composition::RandomSample => sample_group(config.seed, group, strategy_count, n),
        Composition::AllVsOne => focal_group(group, strategy_count, n),
    };

    Some(MatchSpec {
        match_id,
        group,
        repetition,
        seats,
    })
}

/// Generate the whole schedule in match-id order.
///
/// Heap-allocating version for inspection and the frontend. The tournament
/// runner uses `get_group_for_match` instead.
pub fn generate_all_groups(
    config: &TournamentConfig,
    strategy_count: u32,
) -> Result<Vec<MatchSpec>, ConfigurationError> {
    let total = calculate_match_count(config, strategy_count)?;
    Ok((0..total)
        .filter_map(|id| get_group_for_match(config, strategy_count, id))
        .collect())
}

// ──────────────────────────── Internal helpers ────────────────────────────

fn group_count(config: &TournamentConfig, strategy_count: u32) -> Result<u128, ConfigurationError> {
    let needed = match config.composition {
        Composition::RoundRobin | Composition::RandomSample => config.n,
        Composition::AllVsOne => 2,
    };
    if strategy_count < needed {
        return Err(ConfigurationError::NotEnoughStrategies {
            composition: config.composition.as_str(),
            needed,
            registered: strategy_count,
        });
    }

    let s = strategy_count as u128;
    match config.composition {
        Composition::RoundRobin => binomial(strategy_count, config.n)
            .ok_or(ConfigurationError::ScheduleTooLarge(u128::MAX)),
        Composition::RandomSample => Ok(config.sample_groups as u128),
        Composition::AllVsOne => Ok(s * (s - 1)),
    }
}

/// `C(n, k)`, or `None` on overflow.
fn binomial(n: u32, k: u32) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k) as u128;
    let n = n as u128;
    let mut result = 1u128;
    for i in 0..k {
        // Exact at every step: result * (n - i) is divisible by (i + 1)
        result = result.checked_mul(n - i)? / (i + 1);
    }
    Some(result)
}

/// Colexicographic combination unranking: rank → `k` ascending indices.
///
/// rank = C(c_k, k) + … + C(c_2, 2) + C(c_1, 1) with c_k > … > c_1
fn unrank_combination(rank: u128, strategy_count: u32, k: u32) -> Vec<usize> {
    let mut seats = vec![0usize; k as usize];
    let mut rank = rank;
    let mut upper = strategy_count;

    for i in (1..=k).rev() {
        // Largest c < upper with C(c, i) <= rank
        let mut c = upper.saturating_sub(1);
        while c >= i && binomial(c, i).map_or(true, |b| b > rank) {
            c -= 1;
        }
        rank -= binomial(c, i).unwrap_or(0);
        seats[(i - 1) as usize] = c as usize;
        upper = c;
    }

    seats
}

/// Floyd's algorithm: sample `k` distinct indices from `[0, strategy_count)`.
///
/// Each group draws from its own stream, so any group can be regenerated
/// in isolation.
fn sample_group(seed: u64, group: u64, strategy_count: u32, k: u32) -> Vec<usize> {
    // Streams counted down from u64::MAX stay clear of match-id streams
    let mut rng = SeededRng::new(seed, u64::MAX - group);
    let mut seats: Vec<usize> = Vec::with_capacity(k as usize);

    for j in (strategy_count - k)..strategy_count {
        let t = rng.next_range(j + 1) as usize; // uniform in [0, j]
        if seats.contains(&t) {
            seats.push(j as usize);
        } else {
            seats.push(t);
        }
    }

    seats.sort_unstable();
    seats
}

/// Ordered pair unranking: group → (focal, other), focal != other.
fn focal_group(group: u64, strategy_count: u32, n: u32) -> Vec<usize> {
    let others = strategy_count as u64 - 1;
    let focal = (group / others) as usize;
    let offset = (group % others) as usize;
    let other = if offset >= focal { offset + 1 } else { offset };

    let mut seats = Vec::with_capacity(n as usize);
    seats.push(focal);
    seats.extend(std::iter::repeat(other).take(n as usize - 1));
    seats
}
