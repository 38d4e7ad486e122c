//! Input handling.
//!
//! The host samples held keys every frame, but the server expects one input
//! message per fixed step. [`InputCadence`] turns variable frame times into a
//! whole number of due steps and carries the remainder, so the send rate does
//! not drift with the frame rate.

use realm_shared::net::{Keys, Outbound};

/// Reference spacing between input messages.
pub const INPUT_STEP_MS: f64 = 100.0;

/// Most steps a single frame may emit. Longer stalls are dropped.
pub const MAX_CATCH_UP_STEPS: u32 = 5;

/// Fixed-step accumulator for the outbound input stream.
#[derive(Debug, Clone)]
pub struct InputCadence {
    step_ms: f64,
    acc_ms: f64,
}

impl Default for InputCadence {
    fn default() -> Self {
        Self::new(INPUT_STEP_MS)
    }
}

impl InputCadence {
    pub fn new(step_ms: f64) -> Self {
        Self {
            step_ms: step_ms.max(1.0),
            acc_ms: 0.0,
        }
    }

    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }

    /// Time accumulated towards the next step.
    pub fn pending_ms(&self) -> f64 {
        self.acc_ms
    }

    /// Adds one frame's elapsed time and returns how many steps became due,
    /// at most [`MAX_CATCH_UP_STEPS`]. Negative or non-finite frame times are
    /// ignored.
    pub fn accumulate(&mut self, dt_ms: f64) -> u32 {
        if !dt_ms.is_finite() || dt_ms <= 0.0 {
            return 0;
        }
        let cap = self.step_ms * f64::from(MAX_CATCH_UP_STEPS);
        self.acc_ms = (self.acc_ms + dt_ms).min(cap);
        let mut due = 0;
        while self.acc_ms >= self.step_ms {
            self.acc_ms -= self.step_ms;
            due += 1;
        }
        due
    }

    pub fn reset(&mut self) {
        self.acc_ms = 0.0;
    }
}

/// The input message for one step.
pub fn build_input(keys: Keys) -> Outbound {
    Outbound::Input { keys: keys.into() }
}

/// Parses held keys from words such as `"up left action"` or `"w a space"`.
/// Unknown words are ignored.
pub fn parse_keys(s: &str) -> Keys {
    s.split(|c: char| c.is_whitespace() || c == ',' || c == '+')
        .fold(Keys::empty(), |keys, word| {
            keys | match word.to_ascii_lowercase().as_str() {
                "up" | "w" => Keys::UP,
                "left" | "a" => Keys::LEFT,
                "down" | "s" => Keys::DOWN,
                "right" | "d" => Keys::RIGHT,
                "action" | "space" | "attack" => Keys::ACTION,
                _ => Keys::empty(),
            }
        })
}
