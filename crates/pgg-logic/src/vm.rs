//! Stack-based bytecode VM for custom player strategies.
//!
//! Programs are at most 64 bytes and run on a fixed 8-slot u8 stack with a
//! 128-instruction fuel limit, so a program can never run away. Any runtime
//! error (stack underflow, unknown opcode, fuel exhaustion, a `RETURN` of
//! anything but 0 or 1) is reported to the engine, which records a fault
//! and plays `Defect` for the seat.
//!
//! Value convention: 0 = cooperate / no data, 1 = defect.

use thiserror::Error;

use crate::error::StrategyError;
use crate::history::HistoryView;
use crate::random::SeededRng;
use crate::strategy::{Action, DecisionContext, Strategy};

// ── Constants ────────────────────────────────────────────────────────

/// Maximum bytecode program length in bytes.
pub const MAX_BYTECODE_LEN: usize = 64;

/// Maximum instructions the VM will execute before halting (fuel limit).
pub const MAX_FUEL: u32 = 128;

/// Stack depth (fixed array, no heap).
const STACK_SIZE: usize = 8;

// ── Opcodes ──────────────────────────────────────────────────────────

pub mod op {
    pub const COOP: u8 = 0x00;
    pub const PUSH: u8 = 0x01;
    /// Others who defected last round
    pub const OTHERS_DEF_LAST: u8 = 0x02;
    pub const MY_LAST: u8 = 0x03;
    /// Pops n; others who defected n rounds before the last one
    pub const OTHERS_DEF_N: u8 = 0x04;
    pub const MY_N: u8 = 0x05;
    /// Others' defections over the whole match
    pub const OTHERS_DEFECTS: u8 = 0x06;
    pub const MY_DEFECTS: u8 = 0x07;
    pub const ROUND: u8 = 0x08;
    pub const RAND: u8 = 0x09;
    pub const ADD: u8 = 0x0A;
    pub const SUB: u8 = 0x0B;
    pub const MUL: u8 = 0x0C;
    pub const GT: u8 = 0x0D;
    pub const LT: u8 = 0x0E;
    pub const EQ: u8 = 0x0F;
    pub const NOT: u8 = 0x10;
    pub const AND: u8 = 0x11;
    pub const OR: u8 = 0x12;
    pub const DUP: u8 = 0x13;
    pub const JMP_FWD: u8 = 0x14;
    pub const JMP_FWD_IF: u8 = 0x15;
    pub const DEFECT: u8 = 0x16;
    /// My last payoff x10, floored
    pub const PAYOFF_LAST: u8 = 0x17;
    pub const RETURN: u8 = 0x18;
    pub const GROUP_SIZE: u8 = 0x19;
    pub const ROUNDS_LEFT: u8 = 0x1A;
}

// ── Errors ───────────────────────────────────────────────────────────

/// Errors that can occur during bytecode validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("bytecode is empty")]
    Empty,

    #[error("bytecode exceeds {} bytes", MAX_BYTECODE_LEN)]
    TooLong,

    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },

    #[error("truncated immediate at offset {offset}")]
    TruncatedImmediate { offset: usize },

    #[error("forward jump out of bounds at offset {offset}")]
    JumpOutOfBounds { offset: usize },

    #[error("no terminal instruction (COOP/DEFECT/RETURN)")]
    NoTerminal,
}

/// Errors raised while running a program.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("stack underflow at offset {0}")]
    StackUnderflow(usize),

    #[error("stack overflow at offset {0}")]
    StackOverflow(usize),

    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },

    #[error("truncated immediate at offset {0}")]
    TruncatedImmediate(usize),

    #[error("fuel exhausted after {} instructions", MAX_FUEL)]
    FuelExhausted,

    #[error("program ended without a terminal instruction")]
    FellOffEnd,
}

// ── Validation ───────────────────────────────────────────────────────

/// Validate bytecode before registering it.
///
/// Checks:
/// - Non-empty, at most `MAX_BYTECODE_LEN` bytes
/// - All opcodes are known
/// - All immediates are present (not truncated)
/// - All forward jumps land within bounds
/// - At least one terminal instruction exists
pub fn validate_bytecode(bytecode: &[u8]) -> Result<(), BytecodeError> {
    if bytecode.is_empty() {
        return Err(BytecodeError::Empty);
    }
    if bytecode.len() > MAX_BYTECODE_LEN {
        return Err(BytecodeError::TooLong);
    }

    let mut pc = 0usize;
    let mut has_terminal = false;

    while pc < bytecode.len() {
        let opcode = bytecode[pc];
        match opcode {
            op::COOP | op::DEFECT | op::RETURN => {
                has_terminal = true;
                pc += 1;
            }
            // 2-byte: opcode + immediate
            op::PUSH => {
                if pc + 1 >= bytecode.len() {
                    return Err(BytecodeError::TruncatedImmediate { offset: pc });
                }
                pc += 2;
            }
            // 2-byte: opcode + forward offset
            op::JMP_FWD | op::JMP_FWD_IF => {
                if pc + 1 >= bytecode.len() {
                    return Err(BytecodeError::TruncatedImmediate { offset: pc });
                }
                let offset = bytecode[pc + 1] as usize;
                let target = pc + 2 + offset;
                if target > bytecode.len() {
                    return Err(BytecodeError::JumpOutOfBounds { offset: pc });
                }
                pc += 2;
            }
            op::OTHERS_DEF_LAST | op::MY_LAST | op::OTHERS_DEF_N | op::MY_N
            | op::OTHERS_DEFECTS | op::MY_DEFECTS | op::ROUND | op::RAND
            | op::ADD | op::SUB | op::MUL | op::GT | op::LT | op::EQ
            | op::NOT | op::AND | op::OR | op::DUP | op::PAYOFF_LAST
            | op::GROUP_SIZE | op::ROUNDS_LEFT => {
                pc += 1;
            }
            _ => {
                return Err(BytecodeError::UnknownOpcode { offset: pc, opcode });
            }
        }
    }

    if !has_terminal {
        return Err(BytecodeError::NoTerminal);
    }

    Ok(())
}

// ── Strategy ─────────────────────────────────────────────────────────

/// A validated bytecode program playing as a strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytecodeStrategy {
    code: Vec<u8>,
}

impl BytecodeStrategy {
    pub fn new(code: Vec<u8>) -> Result<Self, BytecodeError> {
        validate_bytecode(&code)?;
        Ok(Self { code })
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

impl Strategy for BytecodeStrategy {
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Action, StrategyError> {
        execute_bytecode(&self.code, ctx, rng)
    }
}

// ── Execution ────────────────────────────────────────────────────────

/// Execute a bytecode program and return the chosen action.
pub fn execute_bytecode(
    bytecode: &[u8],
    ctx: &DecisionContext<'_>,
    rng: &mut SeededRng,
) -> Result<Action, StrategyError> {
    let mut stack = [0u8; STACK_SIZE];
    let mut sp: usize = 0; // stack pointer (next empty slot)
    let mut pc: usize = 0;
    let mut fuel: u32 = 0;

    let history = &ctx.history;
    let me = ctx.my_id;

    while pc < bytecode.len() {
        fuel += 1;
        if fuel > MAX_FUEL {
            return Err(VmError::FuelExhausted.into());
        }

        let opcode = bytecode[pc];
        let at = pc;
        match opcode {
            op::COOP => return Ok(Action::Cooperate),
            op::DEFECT => return Ok(Action::Defect),

            op::RETURN => {
                let v = pop(&mut stack, &mut sp, at)?;
                return Action::from_vm_value(v);
            }

            op::PUSH => {
                let imm = *bytecode.get(pc + 1).ok_or(VmError::TruncatedImmediate(at))?;
                push(&mut stack, &mut sp, imm, at)?;
                pc += 2;
            }

            op::OTHERS_DEF_LAST => {
                let v = others_defected_n_ago(history, me, 0);
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::MY_LAST => {
                let v = my_move_n_ago(history, me, 0);
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::OTHERS_DEF_N => {
                let n = pop(&mut stack, &mut sp, at)? as usize;
                let v = others_defected_n_ago(history, me, n);
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::MY_N => {
                let n = pop(&mut stack, &mut sp, at)? as usize;
                let v = my_move_n_ago(history, me, n);
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::OTHERS_DEFECTS => {
                let count = saturate(history.others_defections(me));
                push(&mut stack, &mut sp, count, at)?;
                pc += 1;
            }

            op::MY_DEFECTS => {
                let count = saturate(history.count_defections_by(me));
                push(&mut stack, &mut sp, count, at)?;
                pc += 1;
            }

            op::ROUND => {
                push(&mut stack, &mut sp, saturate(ctx.round_index as usize), at)?;
                pc += 1;
            }

            op::ROUNDS_LEFT => {
                let left = ctx.config.rounds_left(ctx.round_index);
                push(&mut stack, &mut sp, saturate(left as usize), at)?;
                pc += 1;
            }

            op::GROUP_SIZE => {
                push(&mut stack, &mut sp, saturate(ctx.config.n() as usize), at)?;
                pc += 1;
            }

            op::RAND => {
                let v = rng.next_percent();
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::ADD | op::SUB | op::MUL | op::GT | op::LT | op::EQ | op::AND | op::OR => {
                let b = pop(&mut stack, &mut sp, at)?;
                let a = pop(&mut stack, &mut sp, at)?;
                let v = match opcode {
                    op::ADD => a.saturating_add(b),
                    op::SUB => a.saturating_sub(b),
                    op::MUL => a.saturating_mul(b),
                    op::GT => u8::from(a > b),
                    op::LT => u8::from(a < b),
                    op::EQ => u8::from(a == b),
                    op::AND => u8::from(a != 0 && b != 0),
                    _ => u8::from(a != 0 || b != 0),
                };
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            op::NOT => {
                let a = pop(&mut stack, &mut sp, at)?;
                push(&mut stack, &mut sp, u8::from(a == 0), at)?;
                pc += 1;
            }

            op::DUP => {
                let a = pop(&mut stack, &mut sp, at)?;
                push(&mut stack, &mut sp, a, at)?;
                push(&mut stack, &mut sp, a, at)?;
                pc += 1;
            }

            op::JMP_FWD => {
                let offset = *bytecode.get(pc + 1).ok_or(VmError::TruncatedImmediate(at))? as usize;
                pc = pc + 2 + offset;
            }

            op::JMP_FWD_IF => {
                let cond = pop(&mut stack, &mut sp, at)?;
                let offset = *bytecode.get(pc + 1).ok_or(VmError::TruncatedImmediate(at))? as usize;
                if cond != 0 {
                    pc = pc + 2 + offset;
                } else {
                    pc += 2;
                }
            }

            op::PAYOFF_LAST => {
                // Round 0 assumes mutual cooperation
                let payoff = history.last_payoff_of(me).unwrap_or(ctx.config.k());
                let v = (payoff * 10.0).floor().clamp(0.0, 255.0) as u8;
                push(&mut stack, &mut sp, v, at)?;
                pc += 1;
            }

            _ => return Err(VmError::UnknownOpcode { offset: at, opcode }.into()),
        }
    }

    Err(VmError::FellOffEnd.into())
}

// ── Stack helpers ────────────────────────────────────────────────────

#[inline]
fn push(stack: &mut [u8; STACK_SIZE], sp: &mut usize, val: u8, at: usize) -> Result<(), VmError> {
    if *sp >= STACK_SIZE {
        return Err(VmError::StackOverflow(at));
    }
    stack[*sp] = val;
    *sp += 1;
    Ok(())
}

#[inline]
fn pop(stack: &mut [u8; STACK_SIZE], sp: &mut usize, at: usize) -> Result<u8, VmError> {
    if *sp == 0 {
        return Err(VmError::StackUnderflow(at));
    }
    *sp -= 1;
    Ok(stack[*sp])
}

// ── History helpers ──────────────────────────────────────────────────

#[inline]
fn saturate(value: usize) -> u8 {
    value.min(u8::MAX as usize) as u8
}

fn my_move_n_ago(history: &HistoryView<'_>, me: crate::PlayerId, n: usize) -> u8 {
    match history.rounds_ago(n).and_then(|r| r.record().action_of(me)) {
        Some(Action::Defect) => 1,
        _ => 0, // Cooperate or no history
    }
}

fn others_defected_n_ago(history: &HistoryView<'_>, me: crate::PlayerId, n: usize) -> u8 {
    let Some(round) = history.rounds_ago(n) else {
        return 0;
    };
    let defectors = round
        .actions()
        .iter()
        .enumerate()
        .filter(|(i, a)| *i != me.index() && **a == Action::Defect)
        .count();
    saturate(defectors)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::history::{PlayerId, RoundRecord, ScoredRoundRecord};
    use crate::payoff;
    use crate::strategy::{BuiltinStrategy, StrategyBase};
    use Action::{Cooperate as C, Defect as D};

    fn rng() -> SeededRng {
        SeededRng::new(42, 0)
    }

    fn config(n: u32) -> GameConfig {
        GameConfig::new(n, 2.0, 10).unwrap()
    }

    fn scored(config: &GameConfig, rounds: &[&[Action]]) -> Vec<ScoredRoundRecord> {
        rounds
            .iter()
            .enumerate()
            .map(|(i, actions)| {
                let payoffs = payoff(config, actions).unwrap();
                ScoredRoundRecord::new(RoundRecord::new(i as u32, actions.to_vec()), payoffs)
            })
            .collect()
    }

    fn run(code: &[u8], config: &GameConfig, rounds: &[ScoredRoundRecord]) -> Result<Action, StrategyError> {
        let ctx = DecisionContext {
            round_index: rounds.len() as u32,
            config: *config,
            my_id: PlayerId(0),
            history: HistoryView::new(rounds),
        };
        execute_bytecode(code, &ctx, &mut rng())
    }

    fn run_empty(code: &[u8]) -> Result<Action, StrategyError> {
        run(code, &config(3), &[])
    }

    // -- Terminals --

    #[test]
    fn test_coop() {
        assert_eq!(run_empty(&[op::COOP]), Ok(C));
    }

    #[test]
    fn test_defect() {
        assert_eq!(run_empty(&[op::DEFECT]), Ok(D));
    }

    #[test]
    fn test_return_zero_and_one() {
        assert_eq!(run_empty(&[op::PUSH, 0, op::RETURN]), Ok(C));
        assert_eq!(run_empty(&[op::PUSH, 1, op::RETURN]), Ok(D));
    }

    #[test]
    fn test_return_out_of_range_is_invalid_action() {
        assert_eq!(
            run_empty(&[op::PUSH, 7, op::RETURN]),
            Err(StrategyError::InvalidAction(7))
        );
    }

    // -- Conditional cooperation as bytecode --

    #[test]
    fn test_bytecode_any_defector_last_round() {
        // Defect if anyone else defected last round
        let code = [op::OTHERS_DEF_LAST, op::PUSH, 0, op::GT, op::RETURN];
        let cfg = config(3);

        assert_eq!(run(&code, &cfg, &[]), Ok(C));
        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[C, C, C]])), Ok(C));
        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[C, C, D]])), Ok(D));
        // Own defection does not count
        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[D, C, C]])), Ok(C));
    }

    #[test]
    fn test_bytecode_grim_trigger() {
        let code = [
            op::OTHERS_DEFECTS, // push count
            op::PUSH, 0,        // push 0
            op::GT,             // count > 0?
            op::JMP_FWD_IF, 1,  // if yes, skip 1 byte
            op::COOP,           // cooperate
            op::DEFECT,         // defect
        ];
        let cfg = config(3);

        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[C, C, C], &[C, C, C]])), Ok(C));
        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[C, D, C], &[C, C, C]])), Ok(D));
    }

    #[test]
    fn test_history_lookbacks() {
        let cfg = config(3);
        let rounds = scored(&cfg, &[&[D, D, D], &[C, C, D]]);

        assert_eq!(run(&[op::MY_LAST, op::RETURN], &cfg, &rounds), Ok(C));
        assert_eq!(run(&[op::PUSH, 1, op::MY_N, op::RETURN], &cfg, &rounds), Ok(D));
        // 2 others defected one round before last
        assert_eq!(
            run(&[op::PUSH, 1, op::OTHERS_DEF_N, op::PUSH, 2, op::EQ, op::RETURN], &cfg, &rounds),
            Ok(D)
        );
        // Lookback past the start reads as cooperate
        assert_eq!(run(&[op::PUSH, 5, op::MY_N, op::RETURN], &cfg, &rounds), Ok(C));
        // My total defections: 1
        assert_eq!(run(&[op::MY_DEFECTS, op::RETURN], &cfg, &rounds), Ok(D));
    }

    #[test]
    fn test_round_and_rounds_left() {
        let cfg = config(3); // r = 10
        let all_c: Vec<&[Action]> = (0..9).map(|_| &[C, C, C][..]).collect();
        let rounds = scored(&cfg, &all_c);
        let last_round_defect = [op::ROUNDS_LEFT, op::PUSH, 0, op::EQ, op::RETURN];

        assert_eq!(run(&last_round_defect, &cfg, &rounds[..8]), Ok(C));
        assert_eq!(run(&last_round_defect, &cfg, &rounds[..9]), Ok(D));
        assert_eq!(run(&[op::ROUND, op::PUSH, 9, op::EQ, op::RETURN], &cfg, &rounds), Ok(D));
    }

    #[test]
    fn test_group_size() {
        let code = [op::GROUP_SIZE, op::PUSH, 5, op::EQ, op::RETURN];
        assert_eq!(run(&code, &config(5), &[]), Ok(D));
        assert_eq!(run(&code, &config(4), &[]), Ok(C));
    }

    #[test]
    fn test_payoff_last() {
        // n = 3, k = 2: lone cooperator earned 2/3 -> 6
        let cfg = config(3);
        let code = [op::PAYOFF_LAST, op::PUSH, 6, op::EQ, op::RETURN];
        assert_eq!(run(&code, &cfg, &scored(&cfg, &[&[C, D, D]])), Ok(D));

        // Round 0 assumes mutual cooperation: k * 10 = 20
        let code = [op::PAYOFF_LAST, op::PUSH, 20, op::EQ, op::RETURN];
        assert_eq!(run(&code, &cfg, &[]), Ok(D));
    }

    // -- Arithmetic --

    #[test]
    fn test_saturating_arithmetic() {
        // 200 + 100 saturates to 255
        assert_eq!(
            run_empty(&[op::PUSH, 200, op::PUSH, 100, op::ADD, op::PUSH, 255, op::EQ, op::RETURN]),
            Ok(D)
        );
        // 5 - 10 saturates to 0
        assert_eq!(run_empty(&[op::PUSH, 5, op::PUSH, 10, op::SUB, op::RETURN]), Ok(C));
        // 16 * 16 saturates to 255
        assert_eq!(
            run_empty(&[op::PUSH, 16, op::PUSH, 16, op::MUL, op::PUSH, 255, op::EQ, op::RETURN]),
            Ok(D)
        );
    }

    #[test]
    fn test_logic_ops() {
        assert_eq!(run_empty(&[op::PUSH, 3, op::PUSH, 2, op::GT, op::RETURN]), Ok(D));
        assert_eq!(run_empty(&[op::PUSH, 3, op::PUSH, 2, op::LT, op::RETURN]), Ok(C));
        assert_eq!(run_empty(&[op::PUSH, 0, op::NOT, op::RETURN]), Ok(D));
        assert_eq!(run_empty(&[op::PUSH, 1, op::PUSH, 0, op::AND, op::RETURN]), Ok(C));
        assert_eq!(run_empty(&[op::PUSH, 1, op::PUSH, 0, op::OR, op::RETURN]), Ok(D));
        assert_eq!(run_empty(&[op::PUSH, 1, op::DUP, op::AND, op::RETURN]), Ok(D));
    }

    #[test]
    fn test_rand_range() {
        let code = [op::RAND, op::PUSH, 100, op::LT, op::RETURN];
        for _ in 0..50 {
            assert_eq!(run_empty(&code), Ok(D));
        }
    }

    #[test]
    fn test_jumps() {
        assert_eq!(run_empty(&[op::JMP_FWD, 1, op::COOP, op::DEFECT]), Ok(D));
        assert_eq!(run_empty(&[op::PUSH, 1, op::JMP_FWD_IF, 1, op::COOP, op::DEFECT]), Ok(D));
        assert_eq!(run_empty(&[op::PUSH, 0, op::JMP_FWD_IF, 1, op::COOP, op::DEFECT]), Ok(C));
    }

    // -- Runtime faults --

    #[test]
    fn test_stack_underflow() {
        assert_eq!(
            run_empty(&[op::RETURN]),
            Err(StrategyError::Vm(VmError::StackUnderflow(0)))
        );
    }

    #[test]
    fn test_stack_overflow() {
        let mut code = Vec::new();
        for _ in 0..9 {
            code.push(op::PUSH);
            code.push(1);
        }
        code.push(op::RETURN);
        assert_eq!(
            run_empty(&code),
            Err(StrategyError::Vm(VmError::StackOverflow(16)))
        );
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            run_empty(&[0xFF]),
            Err(StrategyError::Vm(VmError::UnknownOpcode { offset: 0, opcode: 0xFF }))
        );
    }

    #[test]
    fn test_fuel_exhaustion() {
        // 1 (PUSH) + 127 (NOT) + 1 (RETURN) = 129 ops > 128 fuel
        let mut code = vec![op::PUSH, 1];
        code.extend(std::iter::repeat(op::NOT).take(127));
        code.push(op::RETURN);
        assert_eq!(
            run_empty(&code),
            Err(StrategyError::Vm(VmError::FuelExhausted))
        );
    }

    #[test]
    fn test_fall_off_end() {
        assert_eq!(
            run_empty(&[op::PUSH, 5]),
            Err(StrategyError::Vm(VmError::FellOffEnd))
        );
    }

    // -- Validation --

    #[test]
    fn test_validate_empty() {
        assert_eq!(validate_bytecode(&[]), Err(BytecodeError::Empty));
    }

    #[test]
    fn test_validate_too_long() {
        let code = vec![op::PUSH; MAX_BYTECODE_LEN + 1];
        assert_eq!(validate_bytecode(&code), Err(BytecodeError::TooLong));
    }

    #[test]
    fn test_validate_unknown_opcode() {
        assert_eq!(
            validate_bytecode(&[0xFF, op::COOP]),
            Err(BytecodeError::UnknownOpcode { offset: 0, opcode: 0xFF }),
        );
    }

    #[test]
    fn test_validate_truncated_push() {
        assert_eq!(
            validate_bytecode(&[op::PUSH]),
            Err(BytecodeError::TruncatedImmediate { offset: 0 }),
        );
    }

    #[test]
    fn test_validate_jump_out_of_bounds() {
        assert_eq!(
            validate_bytecode(&[op::JMP_FWD, 255, op::COOP]),
            Err(BytecodeError::JumpOutOfBounds { offset: 0 }),
        );
    }

    #[test]
    fn test_validate_no_terminal() {
        assert_eq!(
            validate_bytecode(&[op::PUSH, 5, op::PUSH, 3, op::ADD]),
            Err(BytecodeError::NoTerminal)
        );
    }

    #[test]
    fn test_max_length_bytecode() {
        // 31 PUSH+imm pairs (62 bytes) + COOP + DEFECT = 64 bytes
        let mut code = Vec::new();
        for _ in 0..31 {
            code.push(op::PUSH);
            code.push(0);
        }
        code.push(op::COOP);
        code.push(op::DEFECT);
        assert_eq!(code.len(), MAX_BYTECODE_LEN);
        assert!(BytecodeStrategy::new(code.clone()).is_ok());
        // Valid, but overflows the stack on the 9th push
        assert_eq!(
            run_empty(&code),
            Err(StrategyError::Vm(VmError::StackOverflow(16)))
        );
    }

    #[test]
    fn test_bytecode_strategy_rejects_invalid() {
        assert_eq!(BytecodeStrategy::new(vec![]), Err(BytecodeError::Empty));
    }

    // -- Parity with native builtins --

    /// Grim trigger in bytecode and natively must agree round by round.
    #[test]
    fn test_round_by_round_parity_grim_trigger() {
        let cfg = config(3);
        let mut native = BuiltinStrategy::new(StrategyBase::GrimTrigger).player();
        let mut custom = BytecodeStrategy::new(vec![
            op::OTHERS_DEFECTS, op::PUSH, 0, op::GT, op::JMP_FWD_IF, 1, op::COOP, op::DEFECT,
        ])
        .unwrap();

        let others: [[Action; 2]; 5] = [[C, C], [C, C], [C, D], [C, C], [C, C]];
        let mut rounds: Vec<Vec<Action>> = Vec::new();
        for pair in others {
            let recorded: Vec<&[Action]> = rounds.iter().map(|r| r.as_slice()).collect();
            let history = scored(&cfg, &recorded);
            let ctx = DecisionContext {
                round_index: history.len() as u32,
                config: cfg,
                my_id: PlayerId(0),
                history: HistoryView::new(&history),
            };
            let a = native.decide(&ctx, &mut rng()).unwrap();
            let b = custom.decide(&ctx, &mut rng()).unwrap();
            assert_eq!(a, b, "mismatch at round {}", history.len());
            rounds.push(vec![a, pair[0], pair[1]]);
        }
    }
}
