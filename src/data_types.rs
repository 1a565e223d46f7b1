//! Plain data shared between the state machine, the fault monitors and the supervisor.

/// Converter state machine position.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ConverterMode {
    #[default]
    Initialize = 0,
    Reset = 1,
    Standby = 2,
    PowerOnDelay = 3,
    LaunchRamp = 4,
    VoltageRampUp = 5,
    CurrentRampUp = 6,
    PowerGoodDelay = 7,
    Online = 8,
    Suspend = 9,
}

impl ConverterMode {
    /// Decode a telemetry value. Anything outside `0..=9` maps to `Initialize`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConverterMode::Reset,
            2 => ConverterMode::Standby,
            3 => ConverterMode::PowerOnDelay,
            4 => ConverterMode::LaunchRamp,
            5 => ConverterMode::VoltageRampUp,
            6 => ConverterMode::CurrentRampUp,
            7 => ConverterMode::PowerGoodDelay,
            8 => ConverterMode::Online,
            9 => ConverterMode::Suspend,
            _ => ConverterMode::Initialize,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True while the output is ramping or regulating (VoltageRampUp through Online).
    pub fn is_regulating(self) -> bool {
        matches!(
            self,
            ConverterMode::VoltageRampUp
                | ConverterMode::CurrentRampUp
                | ConverterMode::PowerGoodDelay
                | ConverterMode::Online
        )
    }
}

/// Regulation scheme, fixed at configuration time.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ControlMode {
    /// Single voltage loop drives the duty cycle directly.
    #[default]
    VoltageMode,
    /// Outer voltage loop feeds one inner current loop per phase.
    AverageCurrentMode,
}

/// Power stage topology.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Topology {
    #[default]
    Buck,
    Boost,
}

/// Which reference the voltage loop currently follows.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReferenceSource {
    /// The live user reference (tuned toward `SetValues::v_ref` while online).
    #[default]
    User,
    /// The soft-start ramp reference owned by the state machine.
    Ramp,
}

/// Converter status and control flags.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConverterStatus {
    pub ready: bool,
    pub adc_active: bool,
    pub pwm_active: bool,
    pub power_source_detected: bool,
    pub cs_calib_complete: bool,
    pub fault_active: bool,
    pub busy: bool,
    pub cs_calib_needed: bool,
    pub go: bool,
    pub autorun: bool,
    pub enabled: bool,
}

/// User-commanded operating point (ADC counts).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SetValues {
    /// Output voltage reference.
    pub v_ref: u16,
    /// Current reference ceiling (average current mode only).
    pub i_ref: u16,
}

/// One phase current reading.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PhaseSample {
    pub raw: u16,
    /// `raw` minus the calibrated sense offset, floored at zero.
    pub calibrated: u16,
}

/// Raw ADC readings delivered once per tick.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Samples<const N: usize> {
    pub v_in: u16,
    pub v_out: u16,
    pub i_sns: [u16; N],
    pub temp: u16,
}

impl<const N: usize> Default for Samples<N> {
    fn default() -> Self {
        Self { v_in: 0, v_out: 0, i_sns: [0; N], temp: 0 }
    }
}

/// Latest measurements as seen by the slow tick.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuntimeData<const N: usize> {
    pub v_in: u16,
    pub v_out: u16,
    pub i_sns: [PhaseSample; N],
    /// Saturating sum of the raw phase currents.
    pub i_out: u16,
    pub temp: u16,
}

impl<const N: usize> Default for RuntimeData<N> {
    fn default() -> Self {
        Self {
            v_in: 0,
            v_out: 0,
            i_sns: [PhaseSample::default(); N],
            i_out: 0,
            temp: 0,
        }
    }
}

/// Compensator output pair: primary port and alternate port.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ControlOutput {
    pub primary: u16,
    pub alternate: u16,
}
