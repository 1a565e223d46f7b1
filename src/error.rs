//! Error definitions for the converter control core.

/// Setup-time configuration problems. An instance that failed to build never runs.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Coefficient arrays are empty or `B` is not one longer than `A`.
    CoefficientLength,
    /// An output clamp or duty window has `minimum > maximum`.
    InvalidLimits,
    /// A normalization scaler lies outside `0..=16`.
    InvalidScaler,
    /// The converter must drive at least one phase.
    InvalidPhaseCount,
    /// Any other inconsistent setting (e.g. a delay period of `u16::MAX`).
    InvalidConfig,
}

/// Runtime error surfaced by converter operations.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum Error<E> {
    /// The PWM/ADC layer rejected a request.
    PowerStage(E),
    /// A PowerGood or enable pin access failed.
    Pin,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::CoefficientLength => write!(f, "coefficient array length mismatch"),
            ConfigError::InvalidLimits => write!(f, "minimum exceeds maximum"),
            ConfigError::InvalidScaler => write!(f, "scaler out of range"),
            ConfigError::InvalidPhaseCount => write!(f, "at least one phase required"),
            ConfigError::InvalidConfig => write!(f, "invalid configuration"),
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::PowerStage(e) => write!(f, "power stage error: {:?}", e),
            Error::Pin => write!(f, "pin access failed"),
        }
    }
}

/// Keep the first failure while letting later operations run.
pub(crate) fn record<E>(outcome: &mut Result<(), Error<E>>, result: Result<(), Error<E>>) {
    if outcome.is_ok() {
        *outcome = result;
    }
}
