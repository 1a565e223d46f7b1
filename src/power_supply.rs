//! Supervisory loop tying the converter, its protection monitors and the auxiliary tasks together.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::calibration::{CurrentBalancer, CurrentSenseCalibration};
use crate::compensator::Compensator;
use crate::converter::{Converter, PowerStage};
use crate::data_types::Samples;
use crate::error::{record, Error};
use crate::fault::{FaultEvent, FaultResponse, FaultSet};

/// A converter with its protection set, offset calibration and current balancer.
pub struct PowerSupply<V, I, P, PG, EN, const N: usize> {
    converter: Converter<V, I, P, PG, EN, N>,
    faults: FaultSet,
    calibration: CurrentSenseCalibration<N>,
    balancer: CurrentBalancer,
}

fn respond<V, I, P, PG, EN, const N: usize>(
    converter: &mut Converter<V, I, P, PG, EN, N>,
    response: FaultResponse,
) -> Result<(), Error<P::Error>>
where
    V: Compensator,
    I: Compensator,
    P: PowerStage,
    PG: OutputPin,
    EN: InputPin,
{
    match response {
        FaultResponse::None => Ok(()),
        FaultResponse::Suspend => converter.suspend(),
        FaultResponse::Resume => converter.resume(),
    }
}

impl<V, I, P, PG, EN, const N: usize> PowerSupply<V, I, P, PG, EN, N>
where
    V: Compensator,
    I: Compensator,
    P: PowerStage,
    PG: OutputPin,
    EN: InputPin,
{
    /// Wrap `converter`. Faults that start latched hold it off from the first tick.
    pub fn new(mut converter: Converter<V, I, P, PG, EN, N>, faults: FaultSet, balancer: CurrentBalancer) -> Self {
        converter.status_mut().fault_active = faults.any_active();
        Self {
            converter,
            faults,
            calibration: CurrentSenseCalibration::new(),
            balancer,
        }
    }

    /// Arm the power stage and enable the converter.
    pub fn start(&mut self) -> Result<(), Error<P::Error>> {
        self.converter.start()
    }

    /// Shut the power stage down and disable the converter.
    pub fn stop(&mut self) -> Result<(), Error<P::Error>> {
        self.converter.stop()
    }

    /// Slow tick: samples, protection, state machine, then calibration and balancing.
    pub fn tick(&mut self, samples: &Samples<N>) -> Result<(), Error<P::Error>> {
        let mut outcome = Ok(());
        self.converter.load_samples(samples);

        for fault in self.faults.iter_mut() {
            let response = match fault.check(self.converter.data()) {
                Some(FaultEvent::Tripped(r)) | Some(FaultEvent::Released(r)) => r,
                None => continue,
            };
            record(&mut outcome, respond(&mut self.converter, response));
        }

        let v_in = self.converter.data().v_in;
        let detected = self.faults.power_source_present(v_in);
        let fault_active = self.faults.any_active();
        let status = self.converter.status_mut();
        status.power_source_detected = detected;
        status.fault_active = fault_active;

        record(&mut outcome, self.converter.execute());

        let mode = self.converter.mode();
        let data = *self.converter.data();
        if let Some(offsets) = self.calibration.step(mode, self.converter.status(), &data.i_sns) {
            self.converter.apply_current_offsets(&offsets);
        }
        let control_mode = self.converter.config().control_mode;
        if let Some(trim) = self.balancer.step(mode, control_mode, &data.i_sns) {
            self.converter.set_balancing_trim(trim);
        }

        self.gate_regulation_monitor();
        outcome
    }

    /// Fast tick, forwarded to the converter.
    pub fn control_tick(&mut self, samples: &Samples<N>) -> Result<(), Error<P::Error>> {
        self.converter.control_update(samples)
    }

    /// Watch the output deviation only while the voltage loop is actually regulating.
    ///
    /// Outside regulation a tripped monitor is paused rather than disabled, so the
    /// latch still holds the converter off for the full release delay.
    fn gate_regulation_monitor(&mut self) {
        let regulation = &mut self.faults.regulation;
        let watching = self.converter.mode().is_regulating() && self.converter.v_loop().controller().is_enabled();
        if watching {
            regulation.enable();
            regulation.set_reference(Some(self.converter.active_reference_value()));
        } else if regulation.is_active() {
            regulation.pause();
        } else if regulation.is_enabled() || regulation.is_paused() {
            regulation.disable();
        }
    }

    pub fn converter(&self) -> &Converter<V, I, P, PG, EN, N> {
        &self.converter
    }

    pub fn converter_mut(&mut self) -> &mut Converter<V, I, P, PG, EN, N> {
        &mut self.converter
    }

    /// Protection monitors.
    pub fn faults(&self) -> &FaultSet {
        &self.faults
    }

    pub fn faults_mut(&mut self) -> &mut FaultSet {
        &mut self.faults
    }

    /// Progress of the current-sense offset calibration.
    pub fn calibration(&self) -> &CurrentSenseCalibration<N> {
        &self.calibration
    }

    /// Balancing control, e.g. to switch it on.
    pub fn balancer_mut(&mut self) -> &mut CurrentBalancer {
        &mut self.balancer
    }

    /// Give the converter back.
    pub fn free(self) -> Converter<V, I, P, PG, EN, N> {
        self.converter
    }
}
