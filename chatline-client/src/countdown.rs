/// Idle timeout enforced per session, in seconds.
pub const IDLE_MAX_SECONDS: u32 = 180;

/// Seconds-until-idle as an explicit state value.
///
/// The 1-second tick source lives in the connection runtime; this type only
/// tracks the remaining time, so a session can never have two countdowns
/// racing each other. Reaching zero stops the countdown without any further
/// effect on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleCountdown {
    duration: u32,
    remaining: u32,
    running: bool,
}

impl IdleCountdown {
    pub fn new() -> Self {
        Self::with_duration(IDLE_MAX_SECONDS)
    }

    pub fn with_duration(duration_seconds: u32) -> Self {
        Self {
            duration: duration_seconds,
            remaining: duration_seconds,
            running: false,
        }
    }

    /// Begin counting down from `duration_seconds`, superseding any countdown
    /// already in progress.
    pub fn start(&mut self, duration_seconds: u32) {
        self.remaining = duration_seconds;
        self.running = duration_seconds > 0;
    }

    /// Restart at the configured duration. Safe to call before `start`.
    pub fn reset(&mut self) {
        self.start(self.duration);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
        }
    }

    pub fn value(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `remaining / duration`, for progress-bar style rendering.
    pub fn ratio(&self) -> f32 {
        if self.duration == 0 {
            return 0.0;
        }
        self.remaining as f32 / self.duration as f32
    }
}

impl Default for IdleCountdown {
    fn default() -> Self {
        Self::new()
    }
}
