//! Discrete n-pole/n-zero compensator in Q15 fixed point.
//!
//! `y[n] = sum(B[i] * e[n-i]) - sum(A[i] * y[n-1-i])`, each product sum shifted back to Q15
//! by its own post scaler and saturated. The converter talks to loops through the
//! [`Compensator`] trait so alternative control laws can be plugged in.

use crate::data_types::ControlOutput;
use crate::error::ConfigError;
use crate::q15::{self, Gain};
use crate::status_word::CompensatorStatusBits;

/// Port normalization: `((raw - offset) * factor) >> (16 - scaler)` on input,
/// `((y * factor) >> (16 - scaler)) + offset` on output.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Port {
    pub offset: u16,
    pub factor: i16,
    pub scaler: u8,
}

impl Port {
    /// Identity mapping with no offset.
    pub const UNITY: Port = Port { offset: 0, factor: 0x4000, scaler: 2 };

    pub fn new(offset: u16, factor: i16, scaler: u8) -> Result<Self, ConfigError> {
        if scaler > 16 {
            return Err(ConfigError::InvalidScaler);
        }
        Ok(Self { offset, factor, scaler })
    }

    pub fn with_offset(offset: u16) -> Self {
        Self { offset, ..Port::UNITY }
    }

    pub fn normalize(&self, raw: u16) -> i64 {
        q15::scale(raw as i64 - self.offset as i64, self.factor, self.scaler)
    }

    pub fn write(&self, y: i16) -> u16 {
        q15::sat_u16(q15::scale(y as i64, self.factor, self.scaler) + self.offset as i64)
    }
}

impl Default for Port {
    fn default() -> Self {
        Port::UNITY
    }
}

/// Output clamp pair.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutputLimits {
    pub minimum: i16,
    pub maximum: i16,
}

impl OutputLimits {
    pub fn new(minimum: i16, maximum: i16) -> Result<Self, ConfigError> {
        if minimum > maximum {
            return Err(ConfigError::InvalidLimits);
        }
        Ok(Self { minimum, maximum })
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self { minimum: 0, maximum: i16::MAX }
    }
}

/// Bit shifts around the filter. Positive values shift left.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Scalers {
    /// Applied to the raw error before it enters the history.
    pub pre_shift: i8,
    /// Applied to the A-term sum after the Q15 renormalization.
    pub post_shift_a: i8,
    /// Applied to the B-term sum after the Q15 renormalization.
    pub post_shift_b: i8,
}

/// Control-loop capability set used by the state machine and the control tick.
pub trait Compensator {
    /// Zero the histories and clear the saturation flags. Coefficients stay.
    fn reset(&mut self);
    /// Fill every history slot so the next update continues from `output`.
    fn precharge(&mut self, error: i16, output: i16);
    /// One control tick. Returns `None` while disabled.
    fn update(&mut self, source: u16, reference: u16) -> Option<ControlOutput>;
    /// Map a control value through the output ports without touching any state.
    fn port_output(&self, value: i16) -> ControlOutput;

    fn enable(&mut self);
    fn disable(&mut self);
    fn is_enabled(&self) -> bool;

    fn limits(&self) -> OutputLimits;
    fn set_limits(&mut self, limits: OutputLimits);

    fn source_offset(&self) -> u16;
    fn set_source_offset(&mut self, offset: u16);
    fn set_alt_target_offset(&mut self, offset: u16);

    /// Runtime gain applied to the B-term when adaptive gain is enabled.
    fn set_gain_modulation(&mut self, gain: Gain);
    fn gain_modulation_enabled(&self) -> bool;

    fn status(&self) -> CompensatorStatusBits;
    /// Last clamped control output.
    fn output(&self) -> i16;
    /// Last (pre-shifted) control error.
    fn error(&self) -> i16;
}

/// Fixed-order IIR compensator. `NB` must equal `NA + 1`.
#[derive(Clone, Debug)]
pub struct Npnz<const NA: usize, const NB: usize> {
    a: [i16; NA],
    b: [i16; NB],
    control_history: [i16; NA],
    error_history: [i16; NB],
    scalers: Scalers,
    source: Port,
    target: Port,
    alt_target: Port,
    limits: OutputLimits,
    gain: Gain,
    status: CompensatorStatusBits,
    output: i16,
    error: i16,
}

pub type Npnz1p1z = Npnz<1, 2>;
pub type Npnz2p2z = Npnz<2, 3>;
pub type Npnz3p3z = Npnz<3, 4>;

impl<const NA: usize, const NB: usize> Npnz<NA, NB> {
    /// Bind coefficients and scalers. Ports default to identity, limits to `0..=i16::MAX`.
    pub fn new(a: [i16; NA], b: [i16; NB], scalers: Scalers) -> Result<Self, ConfigError> {
        if NA == 0 || NB != NA + 1 {
            return Err(ConfigError::CoefficientLength);
        }
        let in_range = |s: i8| (-31..=31).contains(&s);
        if !(in_range(scalers.pre_shift) && in_range(scalers.post_shift_a) && in_range(scalers.post_shift_b)) {
            return Err(ConfigError::InvalidScaler);
        }
        Ok(Self {
            a,
            b,
            control_history: [0; NA],
            error_history: [0; NB],
            scalers,
            source: Port::UNITY,
            target: Port::UNITY,
            alt_target: Port::UNITY,
            limits: OutputLimits::default(),
            gain: Gain::UNITY,
            status: CompensatorStatusBits::empty(),
            output: 0,
            error: 0,
        })
    }

    pub fn with_source(mut self, port: Port) -> Self {
        self.source = port;
        self
    }

    pub fn with_target(mut self, port: Port) -> Self {
        self.target = port;
        self
    }

    pub fn with_alt_target(mut self, port: Port) -> Self {
        self.alt_target = port;
        self
    }

    pub fn with_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Negate the error (for plants whose output falls as the control rises).
    pub fn with_inverted_input(mut self, invert: bool) -> Self {
        self.status.set(CompensatorStatusBits::INVERT_INPUT, invert);
        self
    }

    pub fn with_gain_modulation(mut self, enabled: bool) -> Self {
        self.status.set(CompensatorStatusBits::AGC_ENABLED, enabled);
        self
    }

    pub fn coefficients(&self) -> (&[i16], &[i16]) {
        (&self.a, &self.b)
    }

    pub fn control_history(&self) -> &[i16] {
        &self.control_history
    }

    pub fn error_history(&self) -> &[i16] {
        &self.error_history
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }
}

impl<const NA: usize, const NB: usize> Compensator for Npnz<NA, NB> {
    fn reset(&mut self) {
        self.control_history = [0; NA];
        self.error_history = [0; NB];
        self.status
            .remove(CompensatorStatusBits::LOWER_SATURATION | CompensatorStatusBits::UPPER_SATURATION);
        self.output = 0;
        self.error = 0;
    }

    fn precharge(&mut self, error: i16, output: i16) {
        self.error_history = [error; NB];
        self.control_history = [output; NA];
        self.error = error;
        self.output = output;
    }

    fn update(&mut self, source: u16, reference: u16) -> Option<ControlOutput> {
        if !self.status.contains(CompensatorStatusBits::ENABLED) {
            return None;
        }

        let mut error = reference as i64 - self.source.normalize(source);
        if self.status.contains(CompensatorStatusBits::INVERT_INPUT) {
            error = -error;
        }
        let e = q15::sat16(q15::shift(error, self.scalers.pre_shift));
        self.error_history.copy_within(0..NB - 1, 1);
        self.error_history[0] = e;

        let b_sum: i64 = self
            .b
            .iter()
            .zip(self.error_history.iter())
            .map(|(&c, &x)| c as i64 * x as i64)
            .sum();
        let mut b_term = q15::sat16(q15::shift(b_sum, self.scalers.post_shift_b - 15)) as i64;
        if self.status.contains(CompensatorStatusBits::AGC_ENABLED) {
            b_term = q15::sat16(self.gain.apply(b_term)) as i64;
        }

        let a_sum: i64 = self
            .a
            .iter()
            .zip(self.control_history.iter())
            .map(|(&c, &y)| c as i64 * y as i64)
            .sum();
        let a_term = q15::sat16(q15::shift(a_sum, self.scalers.post_shift_a - 15)) as i64;

        let unclamped = q15::sat16(b_term - a_term);
        self.status
            .remove(CompensatorStatusBits::LOWER_SATURATION | CompensatorStatusBits::UPPER_SATURATION);
        let y = if unclamped < self.limits.minimum {
            self.status.insert(CompensatorStatusBits::LOWER_SATURATION);
            self.limits.minimum
        } else if unclamped > self.limits.maximum {
            self.status.insert(CompensatorStatusBits::UPPER_SATURATION);
            self.limits.maximum
        } else {
            unclamped
        };

        self.control_history.copy_within(0..NA - 1, 1);
        self.control_history[0] = y;
        self.output = y;
        self.error = e;

        Some(self.port_output(y))
    }

    fn port_output(&self, value: i16) -> ControlOutput {
        ControlOutput {
            primary: self.target.write(value),
            alternate: self.alt_target.write(value),
        }
    }

    fn enable(&mut self) {
        self.status.insert(CompensatorStatusBits::ENABLED);
    }

    fn disable(&mut self) {
        self.status.remove(CompensatorStatusBits::ENABLED);
    }

    fn is_enabled(&self) -> bool {
        self.status.contains(CompensatorStatusBits::ENABLED)
    }

    fn limits(&self) -> OutputLimits {
        self.limits
    }

    fn set_limits(&mut self, limits: OutputLimits) {
        self.limits = limits;
    }

    fn source_offset(&self) -> u16 {
        self.source.offset
    }

    fn set_source_offset(&mut self, offset: u16) {
        self.source.offset = offset;
    }

    fn set_alt_target_offset(&mut self, offset: u16) {
        self.alt_target.offset = offset;
    }

    fn set_gain_modulation(&mut self, gain: Gain) {
        self.gain = gain;
    }

    fn gain_modulation_enabled(&self) -> bool {
        self.status.contains(CompensatorStatusBits::AGC_ENABLED)
    }

    fn status(&self) -> CompensatorStatusBits {
        self.status
    }

    fn output(&self) -> i16 {
        self.output
    }

    fn error(&self) -> i16 {
        self.error
    }
}
