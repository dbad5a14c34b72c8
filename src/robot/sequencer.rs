//! Motion sequencer: timed press/release execution over the robot link.
//!
//! Safety rules enforced here:
//! - never two opposed axes engaged at once — a new motion releases the
//!   currently engaged axis before pressing its own;
//! - every press is eventually followed by its matching release, on time or
//!   early via preemption, never omitted;
//! - `stop()` is unconditional and idempotent;
//! - a single request (manual move or pattern) is "in control" at a time; a
//!   newer request takes control and the superseded one winds down.
//!
//! Send failures are logged and the sequence continues best-effort. A
//! dropped command is never retried: a stale `Down` re-sent after its window
//! could re-engage a motor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::robot::encoder::{self, MotionPair, ALL_STOP};
use crate::robot::{Command, Direction, RobotLink, SpeedLevel};

/// Duration bounds for a single timed motion, in milliseconds.
pub const MIN_MOVE_MS: u64 = 500;
pub const MAX_MOVE_MS: u64 = 5000;

/// Named choreographies. `Pulse` is the short flourish used by the sensor
/// bridge when the robot falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Dance,
    Spin,
    Zigzag,
    Square,
    Pulse,
}

impl Pattern {
    /// The fallback when a pattern request carries no usable name.
    pub const DEFAULT: Pattern = Pattern::Dance;

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dance" => Some(Self::Dance),
            "spin" => Some(Self::Spin),
            "zigzag" => Some(Self::Zigzag),
            "square" => Some(Self::Square),
            "pulse" => Some(Self::Pulse),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dance => "dance",
            Self::Spin => "spin",
            Self::Zigzag => "zigzag",
            Self::Square => "square",
            Self::Pulse => "pulse",
        }
    }

    /// Fixed step list: (direction, speed percent, hold ms).
    fn steps(&self) -> &'static [(Direction, u8, u64)] {
        match self {
            Self::Dance => &[
                (Direction::Left, 50, 500),
                (Direction::Right, 50, 500),
                (Direction::Forward, 50, 500),
                (Direction::Backward, 50, 500),
                (Direction::Left, 80, 600),
                (Direction::Right, 80, 600),
            ],
            Self::Spin => &[(Direction::Right, 80, 2000)],
            Self::Zigzag => &[
                (Direction::Forward, 50, 600),
                (Direction::Left, 50, 500),
                (Direction::Forward, 50, 600),
                (Direction::Right, 50, 500),
                (Direction::Forward, 50, 600),
                (Direction::Left, 50, 500),
            ],
            Self::Square => &[
                (Direction::Forward, 50, 800),
                (Direction::Right, 50, 550),
                (Direction::Forward, 50, 800),
                (Direction::Right, 50, 550),
                (Direction::Forward, 50, 800),
                (Direction::Right, 50, 550),
                (Direction::Forward, 50, 800),
                (Direction::Right, 50, 550),
            ],
            Self::Pulse => &[
                (Direction::Backward, 30, 500),
                (Direction::Forward, 30, 500),
            ],
        }
    }
}

#[derive(Debug)]
struct SequencerState {
    /// Bumped on every motion change; a sleeping release timer only fires
    /// if the generation is still its own.
    generation: u64,
    /// Bumped when a new request takes control; a running pattern checks
    /// this between steps and winds down when superseded.
    controller: u64,
    /// The axis currently held Down, if any.
    engaged: Option<MotionPair>,
    /// Last speed level sent to the firmware (it latches the level).
    speed_level: Option<SpeedLevel>,
}

/// Exclusive owner of the [`RobotLink`] handle. Cheap to clone; clones share
/// the same state and link.
#[derive(Clone)]
pub struct MotionSequencer {
    link: Arc<dyn RobotLink>,
    state: Arc<Mutex<SequencerState>>,
}

impl MotionSequencer {
    pub fn new(link: Arc<dyn RobotLink>) -> Self {
        Self {
            link,
            state: Arc::new(Mutex::new(SequencerState {
                generation: 0,
                controller: 0,
                engaged: None,
                speed_level: None,
            })),
        }
    }

    /// Execute one timed motion: press now, release after `duration_ms`.
    ///
    /// Takes control from any running pattern. Resolves once the release
    /// has been sent — by this call's own timer, or earlier by whichever
    /// request preempted it.
    pub async fn move_timed(&self, direction: Direction, speed: u8, duration_ms: u64) -> Result<()> {
        if direction == Direction::Stop {
            self.stop();
            return Ok(());
        }
        {
            let mut st = self.state.lock().unwrap();
            st.controller += 1;
        }
        self.step_move(direction, speed, duration_ms).await
    }

    /// Unconditional all-stop: Up on all four axes. Idempotent, always safe,
    /// cancels any pending release timer and takes control.
    pub fn stop(&self) {
        let mut st = self.state.lock().unwrap();
        st.generation += 1;
        st.controller += 1;
        st.engaged = None;
        // Sent under the lock so no interleaved press can land between the
        // four releases.
        for cmd in &ALL_STOP {
            self.send_best_effort(cmd);
        }
    }

    /// Run a named choreography, steps strictly in sequence. A newer request
    /// taking control ends the pattern early (the in-flight step still
    /// releases); a hard failure mid-pattern stops the robot before the
    /// error propagates.
    pub async fn run_pattern(&self, pattern: Pattern) -> Result<()> {
        let token = {
            let mut st = self.state.lock().unwrap();
            st.controller += 1;
            st.controller
        };
        debug!(pattern = pattern.name(), "starting pattern");

        for (direction, speed, hold_ms) in pattern.steps() {
            if self.state.lock().unwrap().controller != token {
                debug!(pattern = pattern.name(), "pattern preempted");
                return Ok(());
            }
            if let Err(e) = self.step_move(*direction, *speed, *hold_ms).await {
                self.stop();
                return Err(e);
            }
        }

        // Pattern ran to completion — settle on a clean all-stop, but only
        // if nothing newer has taken control meanwhile.
        if self.state.lock().unwrap().controller == token {
            self.stop();
        }
        Ok(())
    }

    /// Latch a speed level on the firmware and remember it.
    pub fn set_speed(&self, level: SpeedLevel) {
        let mut st = self.state.lock().unwrap();
        st.speed_level = Some(level);
        drop(st);
        self.send_best_effort(&encoder::encode_speed(level));
    }

    /// Pass-through for non-motion commands (color, buzzer, LED, toy GPIO).
    /// The link stays owned here; nothing else writes to the robot.
    pub fn send_command(&self, cmd: &Command) {
        self.send_best_effort(cmd);
    }

    /// One press/hold/release cycle without taking control (patterns call
    /// this per step; `move_timed` wraps it).
    async fn step_move(&self, direction: Direction, speed: u8, duration_ms: u64) -> Result<()> {
        let pair = encoder::encode_motion(direction)?;
        let duration_ms = duration_ms.clamp(MIN_MOVE_MS, MAX_MOVE_MS);
        let level = SpeedLevel::for_percent(speed.min(100));

        let my_generation = {
            let mut st = self.state.lock().unwrap();
            st.generation += 1;
            // Never leave the previous axis engaged while pressing a new
            // one — its release goes out first.
            if let Some(prev) = st.engaged.take() {
                self.send_best_effort(&prev.release);
            }
            if st.speed_level != Some(level) {
                st.speed_level = Some(level);
                self.send_best_effort(&encoder::encode_speed(level));
            }
            self.send_best_effort(&pair.press);
            st.engaged = Some(pair);
            st.generation
        };

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        let mut st = self.state.lock().unwrap();
        if st.generation == my_generation {
            st.engaged = None;
            drop(st);
            self.send_best_effort(&pair.release);
        }
        // Preempted: whoever bumped the generation already released this
        // axis; a second Up here would be harmless but is redundant.
        Ok(())
    }

    fn send_best_effort(&self, cmd: &Command) {
        if let Err(e) = self.link.send(cmd) {
            // No retry: re-sending a stale press after time has passed
            // could re-engage a motor unexpectedly.
            let e = crate::error::BridgeError::ActuatorSend(e.to_string());
            warn!(command = %cmd, "{}", e);
        }
    }
}
