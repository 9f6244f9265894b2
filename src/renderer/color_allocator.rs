use crate::color::Color;

/// Finest subdivision round. Its alphabet holds all 256 channel values.
const LAST_ROUND: u32 = 8;

/// Number of colors handed out before exhaustion: every RGB triple exactly once.
pub const COLOR_CAPACITY: u64 = 1 << 24;

/// Hands out opaque RGB colors, each exactly once, coarse and distinct ones first.
///
/// Round `r` works over the alphabet `round(255 * k / 2^r)` for `k` in `0..=2^r`:
/// `{0, 255}`, then `{0, 128, 255}`, then `{0, 64, 128, 191, 255}` and so on. Each round
/// yields the triples of its alphabet that use at least one value the previous round did
/// not have, red varying slowest. After round 8 every triple has been produced and the
/// allocator is exhausted.
#[derive(Debug, Clone)]
pub struct ColorAllocator {
    round: u32,
    alphabet: Vec<u8>,
    fresh: [bool; 256],
    cursor: [usize; 3],
    allocated: u64,
    exhausted: bool,
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorAllocator {
    pub fn new() -> Self {
        let mut allocator = Self {
            round: 0,
            alphabet: Vec::new(),
            fresh: [false; 256],
            cursor: [0; 3],
            allocated: 0,
            exhausted: false,
        };
        allocator.enter_round(0);
        allocator
    }

    /// Starts over from the first round.
    pub fn reset(&mut self) {
        self.allocated = 0;
        self.exhausted = false;
        self.enter_round(0);
    }

    /// Colors handed out since construction or the last reset.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next unused color, or `None` once all of them were handed out.
    pub fn next_color(&mut self) -> Option<Color> {
        while !self.exhausted {
            let len = self.alphabet.len();
            let [r, g, b] = self.cursor;

            if r == len {
                if self.round == LAST_ROUND {
                    self.exhausted = true;
                    break;
                }
                self.enter_round(self.round + 1);
                continue;
            }

            self.cursor[2] += 1;
            if self.cursor[2] == len {
                self.cursor[2] = 0;
                self.cursor[1] += 1;
                if self.cursor[1] == len {
                    self.cursor[1] = 0;
                    self.cursor[0] += 1;
                }
            }

            let triple = [self.alphabet[r], self.alphabet[g], self.alphabet[b]];
            if triple.iter().any(|&value| self.fresh[value as usize]) {
                self.allocated += 1;
                return Some(Color::rgb(triple[0], triple[1], triple[2]));
            }
        }
        None
    }

    fn enter_round(&mut self, round: u32) {
        let previous = std::mem::take(&mut self.alphabet);
        self.alphabet = alphabet(round);

        self.fresh = [true; 256];
        for value in previous {
            self.fresh[value as usize] = false;
        }

        self.round = round;
        self.cursor = [0; 3];
    }
}

impl Iterator for ColorAllocator {
    type Item = Color;

    fn next(&mut self) -> Option<Color> {
        self.next_color()
    }
}

/// Channel values of round `round`, ascending and without duplicates.
fn alphabet(round: u32) -> Vec<u8> {
    let steps = 1u32 << round;
    let mut values: Vec<u8> = (0..=steps)
        .map(|k| ((510 * k + steps) / (2 * steps)) as u8)
        .collect();
    values.dedup();
    values
}
