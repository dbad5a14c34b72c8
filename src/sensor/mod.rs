//! Accelerometer fall/pickup bridge.
//!
//! The shell samples the accelerometer at a fixed interval and forwards
//! raw `(x, y, z)` readings; this module turns threshold crossings into
//! debounced triggers. Each trigger kind has its own cooldown clock, so a
//! tumble that shakes the robot repeatedly still reads as one fall.
//!
//! Triggers are only meaningful while a session is Active — the wiring in
//! the main loop checks that and discards (with a log line) anything that
//! fires without an injection target. Nothing is queued across sessions.

use std::time::{Duration, Instant};

/// A hard fall spikes total acceleration well past gravity.
pub const FALL_MAGNITUDE_THRESHOLD: f64 = 25.0;
pub const FALL_COOLDOWN: Duration = Duration::from_secs(5);

/// A pickup shows as sustained upward (z-axis) acceleration.
pub const PICKUP_AXIS_THRESHOLD: f64 = 13.0;
pub const PICKUP_COOLDOWN: Duration = Duration::from_secs(3);

/// Synthesized user turns injected on trigger, phrased as if spoken by the
/// user so the assistant reacts conversationally.
pub const FALL_PHRASE: &str =
    "Oh no, I think the robot just fell over! React to that, then help me get it going again.";
pub const PICKUP_PHRASE: &str = "I just picked the robot up. Say something about that!";

/// One accelerometer reading, m/s² per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SensorSample {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Fall,
    Pickup,
}

impl TriggerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fall => "fall",
            Self::Pickup => "pickup",
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            Self::Fall => FALL_PHRASE,
            Self::Pickup => PICKUP_PHRASE,
        }
    }
}

/// Debounce state. `last_*` start as "never", so the first crossing always
/// fires.
pub struct SensorBridge {
    fall_enabled: bool,
    pickup_enabled: bool,
    last_fall: Option<Instant>,
    last_pickup: Option<Instant>,
}

impl SensorBridge {
    pub fn new(fall_enabled: bool, pickup_enabled: bool) -> Self {
        Self {
            fall_enabled,
            pickup_enabled,
            last_fall: None,
            last_pickup: None,
        }
    }

    /// Evaluate one sample against both triggers. A fall outranks a pickup
    /// when a single sample crosses both thresholds.
    pub fn observe(&mut self, sample: &SensorSample) -> Option<TriggerKind> {
        self.observe_at(sample, Instant::now())
    }

    /// Clock-injected variant for tests.
    pub fn observe_at(&mut self, sample: &SensorSample, now: Instant) -> Option<TriggerKind> {
        if self.fall_enabled
            && sample.magnitude() > FALL_MAGNITUDE_THRESHOLD
            && cooled_down(self.last_fall, now, FALL_COOLDOWN)
        {
            self.last_fall = Some(now);
            return Some(TriggerKind::Fall);
        }
        if self.pickup_enabled
            && sample.z > PICKUP_AXIS_THRESHOLD
            && cooled_down(self.last_pickup, now, PICKUP_COOLDOWN)
        {
            self.last_pickup = Some(now);
            return Some(TriggerKind::Pickup);
        }
        None
    }
}

fn cooled_down(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    match last {
        Some(t) => now.duration_since(t) >= cooldown,
        None => true,
    }
}
