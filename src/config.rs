//! Converter configuration and firmware default constants.
//! All voltage/current quantities are raw ADC counts; periods are slow-tick counts.

use crate::compensator::OutputLimits;
use crate::data_types::{ControlMode, SetValues, Topology};
use crate::error::ConfigError;

/// Power-on delay before soft-start (100 ms at a 10 kHz tick).
pub const DEFAULT_POWER_ON_DELAY: u16 = 999;
/// Power-good delay after the ramp completes (200 ms at a 10 kHz tick).
pub const DEFAULT_POWER_GOOD_DELAY: u16 = 1_999;
pub const DEFAULT_V_RAMP_STEP: u16 = 1;
pub const DEFAULT_I_RAMP_STEP: u16 = 1;

/// Maximum balancing trim applied to the secondary phase.
pub const DEFAULT_BALANCING_MAX_TRIM: u16 = 7;
/// Samples averaged by the current-sense calibration (must be a power of two).
pub const CALIBRATION_SAMPLES: u8 = 8;

/// Fault debounce counts (slow ticks).
pub const UVLO_TRIP_COUNT: u16 = 50;
pub const UVLO_RELEASE_COUNT: u16 = 500;
pub const OVLO_TRIP_COUNT: u16 = 50;
pub const OVLO_RELEASE_COUNT: u16 = 500;
pub const REGERR_TRIP_COUNT: u16 = 250;
pub const REGERR_RELEASE_COUNT: u16 = 1_000;
pub const OCP_TRIP_COUNT: u16 = 50;
pub const OCP_RELEASE_COUNT: u16 = 2_000;

/// Soft-start timing.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StartupConfig {
    pub power_on_delay: u16,
    pub power_good_delay: u16,
    /// Voltage reference increment per tick during the ramp and while online.
    pub v_ramp_step: u16,
    /// Current ceiling increment per tick (average current mode).
    pub i_ramp_step: u16,
    /// Current ceiling at launch (average current mode).
    pub startup_current: u16,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            power_on_delay: DEFAULT_POWER_ON_DELAY,
            power_good_delay: DEFAULT_POWER_GOOD_DELAY,
            v_ramp_step: DEFAULT_V_RAMP_STEP,
            i_ramp_step: DEFAULT_I_RAMP_STEP,
            startup_current: 0,
        }
    }
}

/// Per-loop wiring.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    pub reference: u16,
    /// Subtracted from the feedback sample before normalization.
    pub feedback_offset: u16,
    /// ADC trigger placed at `duty / 2 + offset` when set.
    pub trigger_offset: Option<u16>,
    pub minimum: i16,
    pub maximum: i16,
}

impl LoopConfig {
    pub fn limits(&self) -> Result<OutputLimits, ConfigError> {
        OutputLimits::new(self.minimum, self.maximum)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            reference: 0,
            feedback_offset: 0,
            trigger_offset: None,
            minimum: 0,
            maximum: i16::MAX,
        }
    }
}

/// PWM switch node timing in PWM counts.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SwitchNodeConfig {
    pub period: u16,
    pub duty_min: u16,
    pub duty_max: u16,
}

impl Default for SwitchNodeConfig {
    fn default() -> Self {
        Self { period: 1_000, duty_min: 10, duty_max: 900 }
    }
}

/// Feedback normalization `((raw - offset) * factor) >> (16 - scaler)`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FeedbackScaling {
    pub factor: i16,
    pub scaler: u8,
    pub offset: u16,
}

impl Default for FeedbackScaling {
    fn default() -> Self {
        Self { factor: 0x4000, scaler: 2, offset: 0 }
    }
}

/// Complete converter configuration for `N` phases.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConverterConfig<const N: usize> {
    pub control_mode: ControlMode,
    pub topology: Topology,
    pub startup: StartupConfig,
    pub set_values: SetValues,
    pub v_loop: LoopConfig,
    pub i_loops: [LoopConfig; N],
    pub switch_node: SwitchNodeConfig,
    pub v_in_feedback: FeedbackScaling,
    pub v_out_feedback: FeedbackScaling,
    /// Leave Standby on its own once every start condition holds.
    pub autorun: bool,
    /// Run the current-sense offset calibration before each startup.
    pub cs_calib_needed: bool,
    /// Nominal input voltage for the adaptive-gain observer.
    pub agc_nominal_v_in: Option<u16>,
}

impl<const N: usize> Default for ConverterConfig<N> {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::VoltageMode,
            topology: Topology::Buck,
            startup: StartupConfig::default(),
            set_values: SetValues::default(),
            v_loop: LoopConfig::default(),
            i_loops: [LoopConfig::default(); N],
            switch_node: SwitchNodeConfig::default(),
            v_in_feedback: FeedbackScaling::default(),
            v_out_feedback: FeedbackScaling::default(),
            autorun: true,
            cs_calib_needed: true,
            agc_nominal_v_in: None,
        }
    }
}

impl<const N: usize> ConverterConfig<N> {
    /// Check consistency and coerce zero ramp steps to one.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if N == 0 {
            return Err(ConfigError::InvalidPhaseCount);
        }
        let sw = &self.switch_node;
        if sw.duty_min > sw.duty_max || sw.duty_max > sw.period {
            return Err(ConfigError::InvalidLimits);
        }
        self.v_loop.limits()?;
        for lp in &self.i_loops {
            lp.limits()?;
        }
        if self.v_in_feedback.scaler > 16 || self.v_out_feedback.scaler > 16 {
            return Err(ConfigError::InvalidScaler);
        }
        if self.startup.power_on_delay == u16::MAX || self.startup.power_good_delay == u16::MAX {
            return Err(ConfigError::InvalidConfig);
        }
        if self.startup.v_ramp_step == 0 {
            warn!("voltage ramp step of 0 coerced to 1");
            self.startup.v_ramp_step = 1;
        }
        if self.startup.i_ramp_step == 0 {
            warn!("current ramp step of 0 coerced to 1");
            self.startup.i_ramp_step = 1;
        }
        Ok(self)
    }
}
