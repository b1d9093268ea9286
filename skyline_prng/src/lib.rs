// Seeded scene PRNG for the Skyline mirror.
//
// xoshiro256++ (Blackman & Vigna) expanded from a single `u64` seed with
// SplitMix64. Every random choice the mirror makes (which side of the grid a
// person enters from, which lane, how long an exited person waits before
// coming back) draws from one `SceneRng` owned by the reconciler, so a
// replay with the same seed and the same event log produces the same scene.
//
// The mirror is not a source of truth for the simulation; randomness here is
// purely cosmetic. Determinism matters for tests, which advance a virtual
// clock and assert exact entry positions and re-entry times.

use serde::{Deserialize, Serialize};

/// xoshiro256++ generator state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneRng {
    s: [u64; 4],
}

impl SceneRng {
    /// Seed a generator. Equal seeds yield equal streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f64` in [0, 1), built from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[low, high)` without modulo bias.
    ///
    /// Returns `low` when the range is empty instead of panicking; callers
    /// in the frame loop must never be able to abort it.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform integer in `[low, high]`, both ends reachable (except
    /// `u64::MAX`, which saturates).
    pub fn range_inclusive_u64(&mut self, low: u64, high: u64) -> u64 {
        self.range_u64(low, high.saturating_add(1))
    }

    /// Unweighted coin flip.
    pub fn coin_flip(&mut self) -> bool {
        self.next_f64() < 0.5
    }
}

/// SplitMix64 step, used only to expand the seed.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
