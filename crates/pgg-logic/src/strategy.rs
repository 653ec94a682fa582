//! Strategy contract and built-in strategies

use serde::{Deserialize, Serialize};
use rand::Rng;

use crate::config::GameConfig;
use crate::error::StrategyError;
use crate::history::{HistoryView, PlayerId};
use crate::random::SeededRng;

/// A move in the public goods game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Contribute the endowment to the pool.
    Cooperate,
    /// Keep the endowment.
    Defect,
}

impl Action {
    /// 1 for cooperate, 0 for defect
    pub fn contribution(self) -> u8 {
        match self {
            Action::Cooperate => 1,
            Action::Defect => 0,
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Action::Cooperate => Action::Defect,
            Action::Defect => Action::Cooperate,
        }
    }

    /// Decode a bytecode `RETURN` value: 0 = cooperate, 1 = defect.
    ///
    /// Not the inverse of [`contribution`](Action::contribution).
    pub fn from_vm_value(value: u8) -> Result<Self, StrategyError> {
        match value {
            0 => Ok(Action::Cooperate),
            1 => Ok(Action::Defect),
            other => Err(StrategyError::InvalidAction(other)),
        }
    }
}

/// Everything a strategy may observe when deciding a round.
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    /// Current round, 0-indexed; the last round is `config.r() - 1`
    pub round_index: u32,
    pub config: GameConfig,
    pub my_id: PlayerId,
    /// Completed rounds `0..round_index`
    pub history: HistoryView<'a>,
}

impl DecisionContext<'_> {
    pub fn is_last_round(&self) -> bool {
        self.config.is_last_round(self.round_index)
    }

    /// Others' cooperation rate in the previous round (None in round 0).
    pub fn last_others_rate(&self) -> Option<f64> {
        let last = self.history.len().checked_sub(1)?;
        self.history.others_cooperation_rate(last, self.my_id)
    }
}

/// The decision-function contract every strategy implements.
///
/// A strategy may keep mutable state across rounds of one match. The
/// harness builds a fresh instance for every match and calls [`reset`]
/// before round 0, so nothing should be carried between matches.
///
/// Randomness must come from `rng`, which is seeded per (match, round,
/// seat). Returning `Err` or panicking is recorded as a fault and the seat
/// plays `Defect` for that round.
///
/// Strategies must be `Send`: under a decision time budget each call runs
/// on its own thread so that a hung call cannot stall the match.
///
/// [`reset`]: Strategy::reset
pub trait Strategy: Send {
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Action, StrategyError>;

    /// Clear per-match state.
    fn reset(&mut self) {}
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Action, StrategyError> {
        (**self).decide(ctx, rng)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Adapter turning a closure into a [`Strategy`].
pub struct FnStrategy<F>(F);

/// Wrap a closure as a strategy.
pub fn strategy_fn<F>(f: F) -> FnStrategy<F>
where
    F: FnMut(&DecisionContext<'_>, &mut SeededRng) -> Result<Action, StrategyError> + Send,
{
    FnStrategy(f)
}

impl<F> Strategy for FnStrategy<F>
where
    F: FnMut(&DecisionContext<'_>, &mut SeededRng) -> Result<Action, StrategyError> + Send,
{
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Action, StrategyError> {
        (self.0)(ctx, rng)
    }
}

// ── Built-in strategies ──────────────────────────────────────────────

/// Base strategy type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyBase {
    /// Always cooperate, never defect.
    AlwaysCooperate,
    /// Always defect, never cooperate.
    AlwaysDefect,
    /// Cooperate while enough of the others cooperated last round. Start with cooperate.
    ConditionalCooperator,
    /// Conditional cooperator that starts with defect.
    SuspiciousConditional,
    /// Cooperate until the others defect too often, then always defect.
    GrimTrigger,
    /// Win-stay, lose-switch.
    Pavlov,
    /// Random choice each round.
    Random,
    /// Defect only after two consecutive rounds of low cooperation.
    PatientConditional,
    /// Retaliate with increasing defection streaks, then calm down.
    Gradual,
    /// Conditional cooperator that defects in the closing rounds.
    EndgameDefector,
}

impl StrategyBase {
    pub const ALL: [StrategyBase; 10] = [
        StrategyBase::AlwaysCooperate,
        StrategyBase::AlwaysDefect,
        StrategyBase::ConditionalCooperator,
        StrategyBase::SuspiciousConditional,
        StrategyBase::GrimTrigger,
        StrategyBase::Pavlov,
        StrategyBase::Random,
        StrategyBase::PatientConditional,
        StrategyBase::Gradual,
        StrategyBase::EndgameDefector,
    ];

    /// Stable identifier, matching the serde variant name
    pub fn id(&self) -> &'static str {
        match self {
            StrategyBase::AlwaysCooperate => "AlwaysCooperate",
            StrategyBase::AlwaysDefect => "AlwaysDefect",
            StrategyBase::ConditionalCooperator => "ConditionalCooperator",
            StrategyBase::SuspiciousConditional => "SuspiciousConditional",
            StrategyBase::GrimTrigger => "GrimTrigger",
            StrategyBase::Pavlov => "Pavlov",
            StrategyBase::Random => "Random",
            StrategyBase::PatientConditional => "PatientConditional",
            StrategyBase::Gradual => "Gradual",
            StrategyBase::EndgameDefector => "EndgameDefector",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.id() == id)
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyBase::AlwaysCooperate => "Always Cooperate",
            StrategyBase::AlwaysDefect => "Always Defect",
            StrategyBase::ConditionalCooperator => "Conditional Cooperator",
            StrategyBase::SuspiciousConditional => "Suspicious Conditional",
            StrategyBase::GrimTrigger => "Grim Trigger",
            StrategyBase::Pavlov => "Pavlov",
            StrategyBase::Random => "Random",
            StrategyBase::PatientConditional => "Patient Conditional",
            StrategyBase::Gradual => "Gradual",
            StrategyBase::EndgameDefector => "Endgame Defector",
        }
    }
}

/// Strategy parameters for fine-tuning behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Percentage chance to cooperate when the rule says defect (0-100)
    pub forgiveness: u8,
    /// Others' cooperation rate, in percent, needed to keep cooperating
    pub threshold: u8,
    /// Number of defections by others to ignore before triggering (GrimTrigger)
    pub noise_tolerance: u8,
    /// Bitmask of first 8 moves (1 = defect, 0 = use strategy)
    pub initial_moves: u8,
    /// Bias toward cooperation for Random strategy (0-100)
    pub cooperate_bias: u8,
    /// Closing rounds in which EndgameDefector defects
    pub endgame_rounds: u8,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            forgiveness: 0,
            threshold: 50,
            noise_tolerance: 0,
            initial_moves: 0,
            cooperate_bias: 50,
            endgame_rounds: 1,
        }
    }
}

/// Complete built-in strategy: base type and parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinStrategy {
    pub base: StrategyBase,
    #[serde(default)]
    pub params: StrategyParams,
}

impl BuiltinStrategy {
    /// Create a new strategy with default parameters
    pub fn new(base: StrategyBase) -> Self {
        Self {
            base,
            params: StrategyParams::default(),
        }
    }

    /// Create with custom parameters
    pub fn with_params(base: StrategyBase, params: StrategyParams) -> Self {
        Self { base, params }
    }

    /// A fresh playing instance for one match
    pub fn player(self) -> BuiltinPlayer {
        BuiltinPlayer {
            strategy: self,
            gradual: GradualState::default(),
        }
    }
}

impl Default for BuiltinStrategy {
    fn default() -> Self {
        Self::new(StrategyBase::ConditionalCooperator)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct GradualState {
    provocations: u32,
    punish_left: u32,
    calm_left: u32,
}

/// Runtime instance of a [`BuiltinStrategy`], holding per-match state.
#[derive(Clone, Debug)]
pub struct BuiltinPlayer {
    strategy: BuiltinStrategy,
    gradual: GradualState,
}

impl BuiltinPlayer {
    pub fn strategy(&self) -> &BuiltinStrategy {
        &self.strategy
    }
}

impl Strategy for BuiltinPlayer {
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Action, StrategyError> {
        let params = &self.strategy.params;

        // Check initial_moves override (first 8 rounds)
        if ctx.round_index < 8 && (params.initial_moves >> ctx.round_index) & 1 == 1 {
            return Ok(Action::Defect);
        }

        let action = match self.strategy.base {
            StrategyBase::AlwaysCooperate => Action::Cooperate,
            StrategyBase::AlwaysDefect => Action::Defect,
            StrategyBase::ConditionalCooperator => {
                execute_conditional(ctx, params, rng, Action::Cooperate)
            }
            StrategyBase::SuspiciousConditional => {
                execute_conditional(ctx, params, rng, Action::Defect)
            }
            StrategyBase::GrimTrigger => execute_grim_trigger(ctx, params),
            StrategyBase::Pavlov => execute_pavlov(ctx),
            StrategyBase::Random => execute_random(params, rng),
            StrategyBase::PatientConditional => execute_patient_conditional(ctx, params),
            StrategyBase::Gradual => execute_gradual(ctx, params, &mut self.gradual),
            StrategyBase::EndgameDefector => {
                if ctx.config.rounds_left(ctx.round_index) < params.endgame_rounds as u32 {
                    Action::Defect
                } else {
                    execute_conditional(ctx, params, rng, Action::Cooperate)
                }
            }
        };

        Ok(action)
    }

    fn reset(&mut self) {
        self.gradual = GradualState::default();
    }
}

fn meets_threshold(rate: f64, threshold: u8) -> bool {
    rate * 100.0 >= threshold as f64
}

/// Forgiveness: chance to cooperate anyway
fn forgive(params: &StrategyParams, rng: &mut SeededRng) -> Action {
    if params.forgiveness > 0 && rng.next_percent() < params.forgiveness {
        Action::Cooperate
    } else {
        Action::Defect
    }
}

/// Conditional cooperation on the others' last-round rate
fn execute_conditional(
    ctx: &DecisionContext<'_>,
    params: &StrategyParams,
    rng: &mut SeededRng,
    opening: Action,
) -> Action {
    match ctx.last_others_rate() {
        None => opening,
        Some(rate) if meets_threshold(rate, params.threshold) => Action::Cooperate,
        Some(_) => forgive(params, rng),
    }
}

/// Grim Trigger: defect forever once the others' defections exceed the tolerance
fn execute_grim_trigger(ctx: &DecisionContext<'_>, params: &StrategyParams) -> Action {
    if ctx.history.others_defections(ctx.my_id) > params.noise_tolerance as usize {
        Action::Defect
    } else {
        Action::Cooperate
    }
}

/// Pavlov: win-stay, lose-switch
/// - A round is a win if it paid at least halfway between
///   all-defect (1) and all-cooperate (k)
fn execute_pavlov(ctx: &DecisionContext<'_>) -> Action {
    let me = ctx.my_id;
    let (Some(my_last), Some(my_payoff)) = (
        ctx.history.last_action_of(me),
        ctx.history.last_payoff_of(me),
    ) else {
        return Action::Cooperate; // Start with cooperate
    };

    let aspiration = (1.0 + ctx.config.k()) / 2.0;
    if my_payoff >= aspiration {
        my_last
    } else {
        my_last.flip()
    }
}

/// Random: Random choice with configurable bias
fn execute_random(params: &StrategyParams, rng: &mut SeededRng) -> Action {
    let p = params.cooperate_bias.min(100) as f64 / 100.0;
    if rng.gen_bool(p) {
        Action::Cooperate
    } else {
        Action::Defect
    }
}

/// Patient conditional: only defect after two consecutive bad rounds
fn execute_patient_conditional(ctx: &DecisionContext<'_>, params: &StrategyParams) -> Action {
    let len = ctx.history.len();
    if len < 2 {
        return Action::Cooperate;
    }

    let bad = |round: usize| {
        ctx.history
            .others_cooperation_rate(round, ctx.my_id)
            .is_some_and(|rate| !meets_threshold(rate, params.threshold))
    };

    if bad(len - 1) && bad(len - 2) {
        Action::Defect
    } else {
        Action::Cooperate
    }
}

/// Gradual: escalating retaliation
/// The m-th provocation is answered with m defections, followed by
/// two calm rounds of cooperation.
fn execute_gradual(
    ctx: &DecisionContext<'_>,
    params: &StrategyParams,
    state: &mut GradualState,
) -> Action {
    if state.punish_left > 0 {
        state.punish_left -= 1;
        if state.punish_left == 0 {
            state.calm_left = 2;
        }
        return Action::Defect;
    }

    if state.calm_left > 0 {
        state.calm_left -= 1;
        return Action::Cooperate;
    }

    match ctx.last_others_rate() {
        Some(rate) if !meets_threshold(rate, params.threshold) => {
            state.provocations += 1;
            state.punish_left = state.provocations - 1;
            if state.punish_left == 0 {
                state.calm_left = 2;
            }
            Action::Defect
        }
        _ => Action::Cooperate,
    }
}

/// Get a human-readable description of a strategy
pub fn describe_strategy(strategy: &BuiltinStrategy) -> String {
    let params = &strategy.params;
    let base_desc = match strategy.base {
        StrategyBase::AlwaysCooperate => "Never defects. Always contributes.".to_string(),
        StrategyBase::AlwaysDefect => "Never contributes. Always free-rides.".to_string(),
        StrategyBase::ConditionalCooperator => format!(
            "Contributes while at least {}% of the others contributed last round. Starts by contributing.",
            params.threshold
        ),
        StrategyBase::SuspiciousConditional => format!(
            "Contributes while at least {}% of the others contributed last round. Starts by free-riding.",
            params.threshold
        ),
        StrategyBase::GrimTrigger => "Contributes until the group defects, then never again.".to_string(),
        StrategyBase::Pavlov => "Repeats its move if the round paid well, switches if not.".to_string(),
        StrategyBase::Random => format!(
            "Contributes with {}% probability each round.",
            params.cooperate_bias.min(100)
        ),
        StrategyBase::PatientConditional => format!(
            "Only free-rides after two rounds in a row below {}% cooperation.",
            params.threshold
        ),
        StrategyBase::Gradual => "Retaliates with increasing severity, then calms down.".to_string(),
        StrategyBase::EndgameDefector => format!(
            "Conditional cooperator that free-rides in the last {} round(s).",
            params.endgame_rounds
        ),
    };

    let mut desc = base_desc;

    if params.forgiveness > 0 {
        desc.push_str(&format!(" {}% chance to forgive.", params.forgiveness));
    }

    if params.noise_tolerance > 0 {
        desc.push_str(&format!(
            " Tolerates {} defections.",
            params.noise_tolerance
        ));
    }

    if params.initial_moves != 0 {
        desc.push_str(&format!(
            " Opening override mask {:08b}.",
            params.initial_moves
        ));
    }

    desc
}
