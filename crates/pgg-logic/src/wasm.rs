//! WASM bindings for frontend match replay

#![cfg(feature = "wasm")]

use serde::Deserialize;
use wasm_bindgen::prelude::*;

use crate::strategy::describe_strategy;
use crate::vm::{validate_bytecode, BytecodeStrategy};
use crate::{
    calculate_match_count, generate_all_groups, get_group_for_match, run_match, BuiltinStrategy,
    GameConfig, MatchSettings, Seat, StrategyBase, TournamentConfig,
};

/// Strategy for one seat of a replayed match.
#[derive(Deserialize)]
enum SeatStrategy {
    Builtin(BuiltinStrategy),
    Custom(Vec<u8>),
}

/// Parse one seat's strategy.
///
/// Accepts:
/// - Builtin: `{"base": "GrimTrigger", "params": {...}}`
/// - Custom:  `{"Custom": [2, 24]}` (bytecode array)
/// - Full:    `{"Builtin": {"base": "GrimTrigger", "params": {...}}}`
fn parse_seat(value: serde_json::Value, index: usize) -> Result<Seat, String> {
    let strategy = match serde_json::from_value::<SeatStrategy>(value.clone()) {
        Ok(strategy) => strategy,
        Err(_) => SeatStrategy::Builtin(
            serde_json::from_value(value)
                .map_err(|e| format!("Invalid strategy for seat {}: {}", index, e))?,
        ),
    };

    Ok(match strategy {
        SeatStrategy::Builtin(builtin) => Seat::new(builtin.base.id(), builtin.player()),
        SeatStrategy::Custom(code) => {
            let program = BytecodeStrategy::new(code)
                .map_err(|e| format!("Invalid bytecode for seat {}: {}", index, e))?;
            Seat::new(format!("custom_{}", index), program)
        }
    })
}

fn parse_tournament_config(json: &str) -> Result<TournamentConfig, JsError> {
    TournamentConfig::from_json(json).map_err(|e| JsError::new(&e.to_string()))
}

/// Replay a match with full round-by-round details
///
/// # Arguments
/// * `game_json` - `{"n": .., "k": .., "r": ..}`
/// * `strategies_json` - JSON array with one strategy per seat
/// * `seed` - Tournament seed
/// * `match_id` - Id of this match within the tournament
///
/// # Returns
/// Serialized MatchOutcome, history included
#[wasm_bindgen]
pub fn replay_match(
    game_json: &str,
    strategies_json: &str,
    seed: u64,
    match_id: u64,
) -> Result<JsValue, JsError> {
    let game: GameConfig = serde_json::from_str(game_json)
        .map_err(|e| JsError::new(&format!("Invalid game config: {}", e)))?;
    game.validate().map_err(|e| JsError::new(&e.to_string()))?;

    let values: Vec<serde_json::Value> = serde_json::from_str(strategies_json)
        .map_err(|e| JsError::new(&format!("Invalid strategy list: {}", e)))?;
    let seats = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| parse_seat(v, i))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| JsError::new(&e))?;

    // No decision timeout: Instant is unavailable in the browser
    let settings = MatchSettings {
        keep_history: true,
        ..Default::default()
    };
    let outcome = run_match(match_id, game, seats, seed, settings)
        .map_err(|e| JsError::new(&e.to_string()))?;

    serde_wasm_bindgen::to_value(&outcome)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Get human-readable description of a strategy
#[wasm_bindgen]
pub fn get_strategy_description(strategy_json: &str) -> Result<String, JsError> {
    let strategy: BuiltinStrategy = serde_json::from_str(strategy_json)
        .map_err(|e| JsError::new(&format!("Invalid strategy: {}", e)))?;

    Ok(describe_strategy(&strategy))
}

#[derive(serde::Serialize)]
struct StrategyInfo {
    id: &'static str,
    name: &'static str,
    description: String,
}

/// Get all available strategy base types
#[wasm_bindgen]
pub fn get_strategy_types() -> Result<JsValue, JsError> {
    let types: Vec<StrategyInfo> = StrategyBase::ALL
        .iter()
        .map(|base| StrategyInfo {
            id: base.id(),
            name: base.display_name(),
            description: describe_strategy(&BuiltinStrategy::new(*base)),
        })
        .collect();

    serde_wasm_bindgen::to_value(&types)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Create a strategy JSON from base type
#[wasm_bindgen]
pub fn create_strategy(base: &str) -> Result<String, JsError> {
    let base = StrategyBase::from_id(base)
        .ok_or_else(|| JsError::new(&format!("Unknown strategy: {}", base)))?;

    serde_json::to_string(&BuiltinStrategy::new(base))
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Get the whole schedule of a tournament
#[wasm_bindgen]
pub fn get_tournament_groups(config_json: &str, strategy_count: u32) -> Result<JsValue, JsError> {
    let config = parse_tournament_config(config_json)?;
    let groups =
        generate_all_groups(&config, strategy_count).map_err(|e| JsError::new(&e.to_string()))?;

    serde_wasm_bindgen::to_value(&groups)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Get the group for a specific match
#[wasm_bindgen]
pub fn get_match_group(
    config_json: &str,
    strategy_count: u32,
    match_id: u64,
) -> Result<JsValue, JsError> {
    let config = parse_tournament_config(config_json)?;
    let group = get_group_for_match(&config, strategy_count, match_id);

    serde_wasm_bindgen::to_value(&group)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

#[derive(serde::Serialize)]
struct ValidationResult {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Validate custom bytecode program
///
/// Returns `{valid: true}` or `{valid: false, error: "..."}`.
/// Never throws; validation errors are returned as structured data.
#[wasm_bindgen]
pub fn validate_custom_bytecode(bytecode: &[u8]) -> JsValue {
    let result = match validate_bytecode(bytecode) {
        Ok(()) => ValidationResult {
            valid: true,
            error: None,
        },
        Err(e) => ValidationResult {
            valid: false,
            error: Some(e.to_string()),
        },
    };
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Get total match count for a tournament
#[wasm_bindgen]
pub fn get_match_count(config_json: &str, strategy_count: u32) -> Result<u64, JsError> {
    let config = parse_tournament_config(config_json)?;
    calculate_match_count(&config, strategy_count).map_err(|e| JsError::new(&e.to_string()))
}
