//! Seeded pseudo-random number generator
//!
//! Deterministic PRNG for reproducible tournaments. Every random draw in the
//! engine (group sampling, strategy forgiveness, bytecode `RAND`) comes from
//! a stream derived here; there is no ambient global source.

use rand::RngCore;

const STREAM_MIX: u64 = 0x517c_c1b7_2722_0a95;
const ROUND_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const SEAT_MIX: u64 = 0xbf58_476d_1ce4_e5b9;

/// Seeded random number generator (xorshift64*)
///
/// Deterministic: same seed + stream = same sequence
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Create a new RNG from a tournament seed and a stream index
    /// (usually the match id).
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut state = seed.rotate_left(17) ^ stream.wrapping_mul(STREAM_MIX);
        if state == 0 {
            state = ROUND_MIX;
        }

        // Warm up the generator
        let mut rng = Self { state };
        for _ in 0..8 {
            rng.next_u64();
        }

        rng
    }

    /// Derive the stream handed to one seat for one round.
    ///
    /// Streams depend only on (parent, round, seat), never on the order in
    /// which seats are asked to decide.
    pub fn for_decision(&self, round: u32, seat: u32) -> Self {
        let mut state = self.state;
        state ^= (round as u64).wrapping_add(1).wrapping_mul(ROUND_MIX);
        state ^= (seat as u64).wrapping_add(1).wrapping_mul(SEAT_MIX);
        if state == 0 {
            state = SEAT_MIX;
        }

        let mut rng = Self { state };
        rng.next_u64(); // Mix
        rng.next_u64();
        rng
    }

    /// Generate next u64
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64*
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Generate next u32
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate a value 0-99 (for percentage checks)
    pub fn next_percent(&mut self) -> u8 {
        (self.next_u32() % 100) as u8
    }

    /// Generate a value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        self.next_u32() % max
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        SeededRng::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        SeededRng::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = SeededRng::next_u64(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
