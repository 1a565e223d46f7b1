//! Current-sense offset calibration and two-phase current balancing.

use crate::config::{CALIBRATION_SAMPLES, DEFAULT_BALANCING_MAX_TRIM};
use crate::data_types::{ControlMode, ConverterMode, ConverterStatus, PhaseSample};

/// Averages the zero-current reading of every phase while the converter idles in Standby.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CurrentSenseCalibration<const N: usize> {
    accumulators: [u32; N],
    count: u8,
}

impl<const N: usize> Default for CurrentSenseCalibration<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CurrentSenseCalibration<N> {
    pub const fn new() -> Self {
        Self { accumulators: [0; N], count: 0 }
    }

    /// Samples accumulated so far in the current run.
    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn clear(&mut self) {
        self.accumulators = [0; N];
        self.count = 0;
    }

    /// Feed one tick. Returns the per-phase offsets on the tick the average completes.
    ///
    /// Runs only in Standby, only while calibration is requested and not yet complete,
    /// and only once the ADC is delivering samples. Leaving Standby drops a partial run.
    pub fn step(
        &mut self,
        mode: ConverterMode,
        status: &ConverterStatus,
        samples: &[PhaseSample; N],
    ) -> Option<[u16; N]> {
        if mode != ConverterMode::Standby {
            if self.count > 0 {
                self.clear();
            }
            return None;
        }
        if !status.cs_calib_needed || status.cs_calib_complete || !status.adc_active {
            return None;
        }

        for (acc, s) in self.accumulators.iter_mut().zip(samples.iter()) {
            *acc += s.raw as u32;
        }
        self.count += 1;
        if self.count < CALIBRATION_SAMPLES {
            return None;
        }

        let shift = CALIBRATION_SAMPLES.trailing_zeros();
        let mut offsets = [0u16; N];
        for (o, acc) in offsets.iter_mut().zip(self.accumulators.iter()) {
            *o = (*acc >> shift) as u16;
        }
        self.clear();
        info!("current sense calibration complete");
        Some(offsets)
    }
}

/// Bounded trim that nudges the secondary phase toward the primary phase current.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CurrentBalancer {
    enabled: bool,
    trim: u16,
    max_trim: u16,
}

impl Default for CurrentBalancer {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCING_MAX_TRIM)
    }
}

impl CurrentBalancer {
    /// Disabled until [`CurrentBalancer::set_enabled`] turns it on.
    pub const fn new(max_trim: u16) -> Self {
        Self { enabled: false, trim: 0, max_trim }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn trim(&self) -> u16 {
        self.trim
    }

    pub fn max_trim(&self) -> u16 {
        self.max_trim
    }

    /// Returns the new trim when balancing ran this tick.
    pub fn step<const N: usize>(
        &mut self,
        mode: ConverterMode,
        control_mode: ControlMode,
        samples: &[PhaseSample; N],
    ) -> Option<u16> {
        if !self.enabled || mode != ConverterMode::Online || control_mode != ControlMode::AverageCurrentMode {
            return None;
        }
        let (Some(a), Some(b)) = (samples.first(), samples.get(1)) else {
            return None;
        };
        self.trim = if a.calibrated > b.calibrated {
            self.trim.saturating_add(1).min(self.max_trim)
        } else {
            self.trim.saturating_sub(1)
        };
        Some(self.trim)
    }
}
