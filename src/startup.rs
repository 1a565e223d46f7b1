//! Countdown/ramp primitive used for the startup delays and the soft-start ramps.

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StartupTimer {
    pub counter: u16,
    pub period: u16,
    pub reference: u16,
    pub step: u16,
}

impl StartupTimer {
    pub const fn new(period: u16, step: u16) -> Self {
        Self { counter: 0, period, reference: 0, step }
    }

    /// Advance one tick. Returns true once `counter > period`; the counter then
    /// holds at `period + 1`.
    pub fn tick(&mut self) -> bool {
        if self.counter <= self.period {
            self.counter = self.counter.saturating_add(1);
        }
        self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.counter > self.period
    }

    /// Preset to the expired value so the next sequence skips this delay.
    pub fn expire(&mut self) {
        self.counter = self.period.saturating_add(1);
    }

    pub fn restart(&mut self) {
        self.counter = 0;
    }

    /// Step `reference` up toward `target` without overshooting.
    /// Returns true when the reference has reached the target.
    pub fn ramp_toward(&mut self, target: u16) -> bool {
        if self.reference < target {
            self.reference = self.reference.saturating_add(self.step).min(target);
        }
        self.reference >= target
    }
}

/// Move `current` one `step` toward `target` in either direction, never past it.
pub fn approach(current: u16, target: u16, step: u16) -> u16 {
    if current < target {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}
