//! Debounced fault monitors with asymmetric trip/release hysteresis.
//!
//! A monitor compares one signal (optionally as a deviation from a reference) against a
//! trip level. The fault latches after `trip_threshold` consecutive violations are
//! exceeded, and clears only after the release predicate has held for more than
//! `release_threshold` consecutive checks. Each edge is reported once as a
//! [`FaultEvent`] carrying the configured response.

use crate::config::{
    OCP_RELEASE_COUNT, OCP_TRIP_COUNT, OVLO_RELEASE_COUNT, OVLO_TRIP_COUNT, REGERR_RELEASE_COUNT,
    REGERR_TRIP_COUNT, UVLO_RELEASE_COUNT, UVLO_TRIP_COUNT,
};
use crate::data_types::RuntimeData;
use crate::error::ConfigError;

/// Signal a monitor reads from the runtime data.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultSource {
    InputVoltage,
    OutputVoltage,
    /// Sum of the raw phase currents.
    OutputCurrent,
    /// Raw current of one phase.
    PhaseCurrent(usize),
    Temperature,
}

impl FaultSource {
    pub fn read<const N: usize>(&self, data: &RuntimeData<N>) -> u16 {
        match *self {
            FaultSource::InputVoltage => data.v_in,
            FaultSource::OutputVoltage => data.v_out,
            FaultSource::OutputCurrent => data.i_out,
            FaultSource::PhaseCurrent(p) => data.i_sns.get(p).map_or(0, |s| s.raw),
            FaultSource::Temperature => data.temp,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareKind {
    /// Violation while the value is below the trip level.
    LessThan,
    /// Violation while the value is above the trip level.
    GreaterThan,
}

/// What the supervisor does on a fault edge.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FaultResponse {
    #[default]
    None,
    Suspend,
    Resume,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultEvent {
    Tripped(FaultResponse),
    Released(FaultResponse),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FaultObject {
    source: FaultSource,
    reference: Option<u16>,
    bit_mask: u16,
    compare: CompareKind,
    trip_level: u16,
    trip_threshold: u16,
    trip_count: u16,
    release_level: u16,
    release_threshold: u16,
    release_count: u16,
    enabled: bool,
    paused: bool,
    fault_active: bool,
    trip_response: FaultResponse,
    release_response: FaultResponse,
}

impl FaultObject {
    /// `release_level` must sit on the healthy side of `trip_level`.
    pub fn new(
        source: FaultSource,
        compare: CompareKind,
        trip_level: u16,
        trip_threshold: u16,
        release_level: u16,
        release_threshold: u16,
    ) -> Result<Self, ConfigError> {
        let ordered = match compare {
            CompareKind::LessThan => release_level >= trip_level,
            CompareKind::GreaterThan => release_level <= trip_level,
        };
        if !ordered {
            return Err(ConfigError::InvalidLimits);
        }
        Ok(Self {
            source,
            reference: None,
            bit_mask: u16::MAX,
            compare,
            trip_level,
            trip_threshold,
            trip_count: 0,
            release_level,
            release_threshold,
            release_count: 0,
            enabled: true,
            paused: false,
            fault_active: false,
            trip_response: FaultResponse::None,
            release_response: FaultResponse::None,
        })
    }

    pub fn with_bit_mask(mut self, mask: u16) -> Self {
        self.bit_mask = mask;
        self
    }

    pub fn with_responses(mut self, trip: FaultResponse, release: FaultResponse) -> Self {
        self.trip_response = trip;
        self.release_response = release;
        self
    }

    /// Start with the fault already latched, so operation waits for a sustained release.
    pub fn latched(mut self) -> Self {
        self.fault_active = true;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Compare `|source - reference|` instead of the raw source.
    pub fn set_reference(&mut self, reference: Option<u16>) {
        self.reference = reference;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.paused = false;
    }

    /// Stop monitoring and drop any latched fault.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.paused = false;
        self.fault_active = false;
        self.trip_count = 0;
        self.release_count = 0;
    }

    /// Stop watching the signal but keep a latched fault.
    ///
    /// A paused latch counts every check toward its release delay. Repeated calls keep
    /// the count running.
    pub fn pause(&mut self) {
        self.enabled = false;
        if !self.paused {
            self.paused = true;
            self.trip_count = 0;
            self.release_count = 0;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_active(&self) -> bool {
        self.fault_active
    }

    pub fn source(&self) -> FaultSource {
        self.source
    }

    pub fn trip_level(&self) -> u16 {
        self.trip_level
    }

    pub fn trip_count(&self) -> u16 {
        self.trip_count
    }

    pub fn release_count(&self) -> u16 {
        self.release_count
    }

    /// Read the configured source from `data` and evaluate it.
    pub fn check<const N: usize>(&mut self, data: &RuntimeData<N>) -> Option<FaultEvent> {
        let value = self.source.read(data);
        self.evaluate(value)
    }

    /// Evaluate one sample. Returns an event only on the tick the state changes.
    pub fn evaluate(&mut self, sample: u16) -> Option<FaultEvent> {
        if !self.enabled {
            self.trip_count = 0;
            if self.paused && self.fault_active {
                self.release_count = self.release_count.saturating_add(1);
                return self.try_release();
            }
            self.release_count = 0;
            return None;
        }

        let masked = sample & self.bit_mask;
        let value = match self.reference {
            Some(r) => masked.abs_diff(r),
            None => masked,
        };

        let violated = match self.compare {
            CompareKind::LessThan => value < self.trip_level,
            CompareKind::GreaterThan => value > self.trip_level,
        };
        self.trip_count = if violated { self.trip_count.saturating_add(1) } else { 0 };

        if !self.fault_active {
            if self.trip_count > self.trip_threshold {
                self.fault_active = true;
                self.release_count = 0;
                warn!("fault tripped: {:?} value {}", self.source, value);
                return Some(FaultEvent::Tripped(self.trip_response));
            }
            return None;
        }

        let recovered = match self.compare {
            CompareKind::LessThan => value >= self.release_level,
            CompareKind::GreaterThan => value <= self.release_level,
        };
        self.release_count = if recovered { self.release_count.saturating_add(1) } else { 0 };
        self.try_release()
    }

    fn try_release(&mut self) -> Option<FaultEvent> {
        if self.release_count <= self.release_threshold {
            return None;
        }
        self.fault_active = false;
        self.trip_count = 0;
        self.release_count = 0;
        info!("fault released: {:?}", self.source);
        Some(FaultEvent::Released(self.release_response))
    }
}

/// Trip/release levels for the standard protection set (ADC counts).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProtectionLimits {
    pub uvlo_trip: u16,
    pub uvlo_release: u16,
    pub ovlo_trip: u16,
    pub ovlo_release: u16,
    /// Allowed deviation of the output from the active reference.
    pub regulation_trip: u16,
    pub regulation_release: u16,
    pub ocp_trip: u16,
    pub ocp_release: u16,
}

/// Input under/over-voltage, regulation error and overcurrent monitors.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FaultSet {
    pub uvlo: FaultObject,
    pub ovlo: FaultObject,
    pub regulation: FaultObject,
    pub overcurrent: FaultObject,
}

impl FaultSet {
    /// Build the set with the firmware debounce counts. UVLO, OVLO and overcurrent start
    /// latched; the regulation monitor starts disabled until the output is ramping.
    pub fn new(limits: &ProtectionLimits) -> Result<Self, ConfigError> {
        let responses = |f: FaultObject| f.with_responses(FaultResponse::Suspend, FaultResponse::Resume);
        Ok(Self {
            uvlo: responses(
                FaultObject::new(
                    FaultSource::InputVoltage,
                    CompareKind::LessThan,
                    limits.uvlo_trip,
                    UVLO_TRIP_COUNT,
                    limits.uvlo_release,
                    UVLO_RELEASE_COUNT,
                )?
                .latched(),
            ),
            ovlo: responses(
                FaultObject::new(
                    FaultSource::InputVoltage,
                    CompareKind::GreaterThan,
                    limits.ovlo_trip,
                    OVLO_TRIP_COUNT,
                    limits.ovlo_release,
                    OVLO_RELEASE_COUNT,
                )?
                .latched(),
            ),
            regulation: responses(
                FaultObject::new(
                    FaultSource::OutputVoltage,
                    CompareKind::GreaterThan,
                    limits.regulation_trip,
                    REGERR_TRIP_COUNT,
                    limits.regulation_release,
                    REGERR_RELEASE_COUNT,
                )?
                .with_enabled(false),
            ),
            overcurrent: responses(
                FaultObject::new(
                    FaultSource::OutputCurrent,
                    CompareKind::GreaterThan,
                    limits.ocp_trip,
                    OCP_TRIP_COUNT,
                    limits.ocp_release,
                    OCP_RELEASE_COUNT,
                )?
                .latched(),
            ),
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FaultObject> {
        [&mut self.uvlo, &mut self.ovlo, &mut self.regulation, &mut self.overcurrent].into_iter()
    }

    pub fn any_active(&self) -> bool {
        self.uvlo.is_active() || self.ovlo.is_active() || self.regulation.is_active() || self.overcurrent.is_active()
    }

    /// Input voltage lies strictly between the UVLO and OVLO trip levels.
    pub fn power_source_present(&self, v_in: u16) -> bool {
        self.uvlo.trip_level() < v_in && v_in < self.ovlo.trip_level()
    }
}
