//! Converter state machine.
//!
//! The slow tick calls [`Converter::execute`]; the fast tick calls
//! [`Converter::control_update`]. Entry actions run at the moment a transition is
//! taken, so every mode change is observable from the outside in the same call.

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::compensator::{Compensator, OutputLimits};
use crate::config::{ConverterConfig, FeedbackScaling, LoopConfig};
use crate::data_types::{
    ControlMode, ConverterMode, ConverterStatus, PhaseSample, ReferenceSource, RuntimeData, Samples, SetValues,
    Topology,
};
use crate::error::{record, ConfigError, Error};
use crate::q15::{self, Gain};
use crate::startup::{approach, StartupTimer};

/// PWM and ADC trigger surface consumed by the state machine.
pub trait PowerStage {
    type Error: core::fmt::Debug;

    /// Arm the PWM hardware.
    fn start(&mut self) -> Result<(), Self::Error>;
    /// Shut the PWM hardware down.
    fn stop(&mut self) -> Result<(), Self::Error>;
    /// Hold the outputs off while keeping the hardware armed.
    fn suspend(&mut self) -> Result<(), Self::Error>;
    /// Release the outputs after a suspend.
    fn resume(&mut self) -> Result<(), Self::Error>;
    fn set_duty(&mut self, phase: usize, duty: u16) -> Result<(), Self::Error>;

    fn set_adc_trigger(&mut self, phase: usize, position: u16) -> Result<(), Self::Error> {
        let _ = (phase, position);
        Ok(())
    }
}

/// Placeholder for an unconnected pin.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Optional PowerGood output and external enable input.
#[derive(Debug)]
pub struct ConverterPins<PG, EN> {
    pub power_good: Option<PG>,
    pub enable: Option<EN>,
}

impl ConverterPins<NoPin, NoPin> {
    /// No PowerGood output and no enable input.
    pub fn none() -> Self {
        Self { power_good: None, enable: None }
    }
}

/// A compensator together with the wiring the state machine manages for it.
#[derive(Clone, Debug)]
pub struct LoopBinding<C> {
    pub reference: u16,
    pub feedback_offset: u16,
    pub trigger_offset: Option<u16>,
    /// Configured output clamp; ramps narrow the live clamp and restore this one.
    pub limits: OutputLimits,
    controller: C,
}

impl<C: Compensator> LoopBinding<C> {
    fn bind(mut controller: C, cfg: &LoopConfig) -> Self {
        let limits = OutputLimits { minimum: cfg.minimum, maximum: cfg.maximum };
        controller.set_limits(limits);
        controller.set_source_offset(cfg.feedback_offset);
        controller.disable();
        Self {
            reference: cfg.reference,
            feedback_offset: cfg.feedback_offset,
            trigger_offset: cfg.trigger_offset,
            limits,
            controller,
        }
    }

    /// The bound compensator.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn clamp(&self, value: u16) -> i16 {
        (value as i64).clamp(self.limits.minimum as i64, self.limits.maximum as i64) as i16
    }
}

/// The four startup timers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StartupTimers {
    pub power_on_delay: StartupTimer,
    pub power_good_delay: StartupTimer,
    pub v_ramp: StartupTimer,
    pub i_ramp: StartupTimer,
}

impl StartupTimers {
    fn restart(&mut self) {
        for t in [
            &mut self.power_on_delay,
            &mut self.power_good_delay,
            &mut self.v_ramp,
            &mut self.i_ramp,
        ] {
            t.restart();
            t.reference = 0;
        }
    }
}

fn stage<E: core::fmt::Debug>(result: Result<(), E>) -> Result<(), Error<E>> {
    result.map_err(|e| {
        warn!("power stage request failed");
        Error::PowerStage(e)
    })
}

fn normalize(raw: u16, scaling: &FeedbackScaling) -> i64 {
    q15::scale(raw as i64 - scaling.offset as i64, scaling.factor, scaling.scaler)
}

/// Multi-phase converter with one voltage loop `V` and `N` current loops `I`.
pub struct Converter<V, I, P, PG, EN, const N: usize> {
    config: ConverterConfig<N>,
    status: ConverterStatus,
    mode: ConverterMode,
    set_values: SetValues,
    data: RuntimeData<N>,
    startup: StartupTimers,
    active_reference: ReferenceSource,
    v_loop: LoopBinding<V>,
    i_loops: [LoopBinding<I>; N],
    power_stage: P,
    pins: ConverterPins<PG, EN>,
}

impl<V, I, P, PG, EN, const N: usize> Converter<V, I, P, PG, EN, N>
where
    V: Compensator,
    I: Compensator,
    P: PowerStage,
    PG: OutputPin,
    EN: InputPin,
{
    /// Validate `config` and bind the loops. The converter starts idle in Initialize.
    pub fn new(
        config: ConverterConfig<N>,
        v_loop: V,
        i_loops: [I; N],
        power_stage: P,
        pins: ConverterPins<PG, EN>,
    ) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let v_loop = LoopBinding::bind(v_loop, &config.v_loop);
        let mut phase = 0;
        let i_loops = i_loops.map(|c| {
            let binding = LoopBinding::bind(c, &config.i_loops[phase]);
            phase += 1;
            binding
        });

        let s = &config.startup;
        let startup = StartupTimers {
            power_on_delay: StartupTimer::new(s.power_on_delay, 1),
            power_good_delay: StartupTimer::new(s.power_good_delay, 1),
            v_ramp: StartupTimer::new(0, s.v_ramp_step),
            i_ramp: StartupTimer::new(0, s.i_ramp_step),
        };

        Ok(Self {
            status: Self::fresh_status(&config),
            mode: ConverterMode::Initialize,
            set_values: config.set_values,
            data: RuntimeData::default(),
            startup,
            active_reference: ReferenceSource::User,
            v_loop,
            i_loops,
            power_stage,
            pins,
            config,
        })
    }

    fn fresh_status(config: &ConverterConfig<N>) -> ConverterStatus {
        ConverterStatus {
            busy: true,
            autorun: config.autorun,
            cs_calib_needed: config.cs_calib_needed,
            cs_calib_complete: !config.cs_calib_needed,
            ..ConverterStatus::default()
        }
    }

    /// Return to the idle, disabled Initialize state without touching the PWM hardware.
    pub fn initialize(&mut self) -> Result<(), Error<P::Error>> {
        let mut outcome = Ok(());
        self.status = Self::fresh_status(&self.config);
        self.disable_loops();
        self.transition(ConverterMode::Initialize, &mut outcome);
        outcome
    }

    /// Arm the PWM hardware and enable the converter.
    pub fn start(&mut self) -> Result<(), Error<P::Error>> {
        let started = stage(self.power_stage.start());
        self.status.pwm_active = started.is_ok();
        let mut outcome = started;
        self.disable_loops();
        self.reset_loops();
        self.status.enabled = true;
        self.transition(ConverterMode::Initialize, &mut outcome);
        outcome
    }

    /// Shut the PWM hardware down and disable the converter.
    pub fn stop(&mut self) -> Result<(), Error<P::Error>> {
        let mut outcome = stage(self.power_stage.stop());
        self.status.pwm_active = false;
        self.disable_loops();
        self.status.enabled = false;
        self.transition(ConverterMode::Initialize, &mut outcome);
        outcome
    }

    /// Force Suspend. A second call while suspended has no effect.
    pub fn suspend(&mut self) -> Result<(), Error<P::Error>> {
        let mut outcome = Ok(());
        if self.mode != ConverterMode::Suspend {
            self.transition(ConverterMode::Suspend, &mut outcome);
        }
        outcome
    }

    /// Re-enable and force Reset, from where startup proceeds once conditions allow.
    pub fn resume(&mut self) -> Result<(), Error<P::Error>> {
        let mut outcome = Ok(());
        self.status.enabled = true;
        self.transition(ConverterMode::Reset, &mut outcome);
        outcome
    }

    /// One slow-tick step of the state machine.
    pub fn execute(&mut self) -> Result<(), Error<P::Error>> {
        let mut outcome = Ok(());
        let s = self.status;

        if !s.enabled || !s.power_source_detected || s.fault_active {
            let target = if s.ready { ConverterMode::Reset } else { ConverterMode::Initialize };
            if self.mode != target {
                self.transition(target, &mut outcome);
            }
            return outcome;
        }

        match self.mode {
            ConverterMode::Initialize => self.transition(ConverterMode::Reset, &mut outcome),
            ConverterMode::Reset => self.transition(ConverterMode::Standby, &mut outcome),
            ConverterMode::Standby => self.standby(&mut outcome),
            ConverterMode::PowerOnDelay => {
                if self.startup.power_on_delay.tick() && self.status.cs_calib_complete {
                    self.transition(ConverterMode::LaunchRamp, &mut outcome);
                }
            }
            ConverterMode::LaunchRamp => self.transition(ConverterMode::VoltageRampUp, &mut outcome),
            ConverterMode::VoltageRampUp => {
                if self.startup.v_ramp.ramp_toward(self.set_values.v_ref) {
                    self.v_loop.reference = self.startup.v_ramp.reference;
                    self.active_reference = ReferenceSource::User;
                    let next = match self.config.control_mode {
                        ControlMode::VoltageMode => ConverterMode::PowerGoodDelay,
                        ControlMode::AverageCurrentMode => ConverterMode::CurrentRampUp,
                    };
                    self.transition(next, &mut outcome);
                }
            }
            ConverterMode::CurrentRampUp => self.current_ramp_up(&mut outcome),
            ConverterMode::PowerGoodDelay => {
                if self.startup.power_good_delay.tick() {
                    self.transition(ConverterMode::Online, &mut outcome);
                }
            }
            ConverterMode::Online => self.track_set_values(),
            ConverterMode::Suspend => self.transition(ConverterMode::Reset, &mut outcome),
        }
        outcome
    }

    fn standby(&mut self, outcome: &mut Result<(), Error<P::Error>>) {
        if self.status.autorun {
            self.status.go = true;
        }
        // a configured enable pin always has the final say
        if let Some(pin) = self.pins.enable.as_mut() {
            let high = match pin.is_high() {
                Ok(high) => high,
                Err(_) => {
                    record(outcome, Err(Error::Pin));
                    false
                }
            };
            self.status.go = high;
        }

        let s = self.status;
        if s.enabled && s.go && s.adc_active && s.pwm_active && !s.fault_active && s.cs_calib_complete {
            self.transition(ConverterMode::PowerOnDelay, outcome);
        }
    }

    fn current_ramp_up(&mut self, outcome: &mut Result<(), Error<P::Error>>) {
        if self.config.control_mode != ControlMode::AverageCurrentMode {
            // unreachable while the control mode stays fixed
            warn!("current ramp entered in voltage mode");
            self.v_loop.controller.set_limits(self.v_loop.limits);
            self.transition(ConverterMode::PowerGoodDelay, outcome);
            return;
        }
        let target = self.current_ceiling_target();
        let done = self.startup.i_ramp.ramp_toward(target);
        self.apply_current_ceiling(self.startup.i_ramp.reference);
        if done {
            self.transition(ConverterMode::PowerGoodDelay, outcome);
        }
    }

    fn track_set_values(&mut self) {
        let v_step = self.startup.v_ramp.step;
        self.v_loop.reference = approach(self.v_loop.reference, self.set_values.v_ref, v_step);
        let mut settled = self.v_loop.reference == self.set_values.v_ref;

        if self.config.control_mode == ControlMode::AverageCurrentMode {
            let target = self.current_ceiling_target();
            let i = &mut self.startup.i_ramp;
            i.reference = approach(i.reference, target, i.step);
            settled &= i.reference == target;
            self.apply_current_ceiling(self.startup.i_ramp.reference);
        }
        self.status.busy = !settled;
    }

    fn transition(&mut self, next: ConverterMode, outcome: &mut Result<(), Error<P::Error>>) {
        debug!("mode {:?} -> {:?}", self.mode, next);
        self.mode = next;
        match next {
            ConverterMode::Initialize => {
                self.startup.restart();
                self.active_reference = ReferenceSource::User;
                self.status.busy = true;
                self.status.ready = false;
                self.status.go = false;
                self.status.adc_active = false;
                self.status.power_source_detected = false;
                self.status.cs_calib_complete = !self.status.cs_calib_needed;
                record(outcome, self.set_power_good(false));
            }
            ConverterMode::Reset => {
                self.status.busy = true;
                record(outcome, stage(self.power_stage.suspend()));
                self.disable_loops();
                self.reset_loops();
                self.v_loop.controller.set_limits(self.v_loop.limits);
                self.write_minimum_outputs(outcome);
                record(outcome, self.set_power_good(false));
                self.active_reference = ReferenceSource::User;
                self.status.ready = true;
            }
            ConverterMode::Standby => self.status.busy = false,
            ConverterMode::PowerOnDelay => {
                self.status.busy = true;
                if !self.status.autorun && self.pins.enable.is_none() {
                    // manual go is a one-shot request
                    self.status.go = false;
                }
            }
            ConverterMode::LaunchRamp => self.launch(outcome),
            ConverterMode::VoltageRampUp => {
                record(outcome, stage(self.power_stage.resume()));
                self.v_loop.controller.enable();
                if self.config.control_mode == ControlMode::AverageCurrentMode {
                    for lp in self.i_loops.iter_mut() {
                        lp.controller.enable();
                    }
                }
            }
            ConverterMode::CurrentRampUp | ConverterMode::PowerGoodDelay => self.status.busy = true,
            ConverterMode::Online => {
                info!("output online");
                record(outcome, self.set_power_good(true));
            }
            ConverterMode::Suspend => {
                self.status.busy = true;
                record(outcome, stage(self.power_stage.suspend()));
                self.disable_loops();
                self.startup.power_on_delay.expire();
                self.startup.power_good_delay.expire();
                record(outcome, self.set_power_good(false));
            }
        }
    }

    /// Hijack the reference, seed the ramp at the present output and precharge the loops.
    fn launch(&mut self, outcome: &mut Result<(), Error<P::Error>>) {
        self.status.busy = true;
        let seed = match self.config.topology {
            Topology::Buck => self.data.v_out,
            Topology::Boost => self.data.v_in,
        };
        self.startup.v_ramp.reference = seed.min(self.set_values.v_ref);
        self.active_reference = ReferenceSource::Ramp;

        let duty = self.launch_duty();
        match self.config.control_mode {
            ControlMode::VoltageMode => {
                let y = self.v_loop.clamp(duty);
                self.v_loop.controller.precharge(0, y);
            }
            ControlMode::AverageCurrentMode => {
                let ceiling = self.config.startup.startup_current.min(self.current_ceiling_target());
                self.startup.i_ramp.reference = ceiling;
                self.apply_current_ceiling(ceiling);
                self.v_loop.controller.precharge(0, self.v_loop.limits.minimum);
                for lp in self.i_loops.iter_mut() {
                    let y = lp.clamp(duty);
                    lp.controller.precharge(0, y);
                }
            }
        }
        for phase in 0..N {
            record(outcome, stage(self.power_stage.set_duty(phase, duty)));
        }
    }

    /// Open-loop duty estimate from the measured conversion ratio.
    fn launch_duty(&self) -> u16 {
        let sw = &self.config.switch_node;
        let v_in = normalize(self.data.v_in, &self.config.v_in_feedback);
        let v_out = normalize(self.data.v_out, &self.config.v_out_feedback);
        if v_in <= 0 || v_out <= 0 {
            return sw.duty_min;
        }
        let period = sw.period as i64;
        let duty = match self.config.topology {
            Topology::Buck => v_out * period / v_in,
            Topology::Boost if v_out > v_in => period - v_in * period / v_out,
            Topology::Boost => return sw.duty_min,
        };
        duty.clamp(sw.duty_min as i64, sw.duty_max as i64) as u16
    }

    /// Park every phase at its loop's minimum output, routed the way the fast tick routes it.
    fn write_minimum_outputs(&mut self, outcome: &mut Result<(), Error<P::Error>>) {
        for phase in 0..N {
            let duty = match self.config.control_mode {
                ControlMode::VoltageMode => {
                    let out = self.v_loop.controller.port_output(self.v_loop.limits.minimum);
                    if phase == 0 { out.primary } else { out.alternate }
                }
                ControlMode::AverageCurrentMode => {
                    let lp = &self.i_loops[phase];
                    lp.controller.port_output(lp.limits.minimum).primary
                }
            };
            record(outcome, stage(self.power_stage.set_duty(phase, duty)));
        }
    }

    fn current_ceiling_target(&self) -> u16 {
        let max = self.v_loop.limits.maximum.max(0) as u16;
        self.set_values.i_ref.min(max)
    }

    fn apply_current_ceiling(&mut self, ceiling: u16) {
        let mut limits = self.v_loop.limits;
        limits.maximum = (ceiling.min(i16::MAX as u16) as i16).max(limits.minimum);
        self.v_loop.controller.set_limits(limits);
    }

    fn set_power_good(&mut self, high: bool) -> Result<(), Error<P::Error>> {
        if let Some(pin) = self.pins.power_good.as_mut() {
            let result = if high { pin.set_high() } else { pin.set_low() };
            result.map_err(|_| Error::Pin)?;
        }
        Ok(())
    }

    fn disable_loops(&mut self) {
        self.v_loop.controller.disable();
        for lp in self.i_loops.iter_mut() {
            lp.controller.disable();
        }
    }

    fn reset_loops(&mut self) {
        self.v_loop.controller.reset();
        for lp in self.i_loops.iter_mut() {
            lp.controller.reset();
        }
    }

    /// Fast control tick: update the loops and write duties and ADC triggers.
    pub fn control_update(&mut self, samples: &Samples<N>) -> Result<(), Error<P::Error>> {
        self.status.adc_active = true;
        let mut outcome = Ok(());

        if let Some(nominal) = self.config.agc_nominal_v_in {
            let gain = Gain::ratio(nominal, samples.v_in);
            if self.v_loop.controller.gain_modulation_enabled() {
                self.v_loop.controller.set_gain_modulation(gain);
            }
            for lp in self.i_loops.iter_mut() {
                if lp.controller.gain_modulation_enabled() {
                    lp.controller.set_gain_modulation(gain);
                }
            }
        }

        let reference = self.active_reference_value();
        let v_out = self.v_loop.controller.update(samples.v_out, reference);

        match self.config.control_mode {
            ControlMode::VoltageMode => {
                if let Some(out) = v_out {
                    let trigger = self.v_loop.trigger_offset;
                    for phase in 0..N {
                        let duty = if phase == 0 { out.primary } else { out.alternate };
                        record(&mut outcome, self.drive_phase(phase, duty, trigger));
                    }
                }
            }
            ControlMode::AverageCurrentMode => {
                let refs = v_out.unwrap_or_default();
                for phase in 0..N {
                    let i_ref = if phase == 0 { refs.primary } else { refs.alternate };
                    let lp = &mut self.i_loops[phase];
                    let trigger = lp.trigger_offset;
                    if let Some(out) = lp.controller.update(samples.i_sns[phase], i_ref) {
                        record(&mut outcome, self.drive_phase(phase, out.primary, trigger));
                    }
                }
            }
        }
        outcome
    }

    fn drive_phase(&mut self, phase: usize, duty: u16, trigger: Option<u16>) -> Result<(), Error<P::Error>> {
        let mut outcome = stage(self.power_stage.set_duty(phase, duty));
        if let Some(offset) = trigger {
            let position = (duty / 2).saturating_add(offset);
            record(&mut outcome, stage(self.power_stage.set_adc_trigger(phase, position)));
        }
        outcome
    }

    /// Copy a slow-tick sample set into the runtime data.
    pub fn load_samples(&mut self, samples: &Samples<N>) {
        self.data.v_in = samples.v_in;
        self.data.v_out = samples.v_out;
        self.data.temp = samples.temp;
        let mut total: u16 = 0;
        for ((slot, &raw), lp) in self.data.i_sns.iter_mut().zip(samples.i_sns.iter()).zip(self.i_loops.iter()) {
            *slot = PhaseSample { raw, calibrated: raw.saturating_sub(lp.feedback_offset) };
            total = total.saturating_add(raw);
        }
        self.data.i_out = total;
    }

    /// Store calibrated current-sense offsets and mark calibration complete.
    pub fn apply_current_offsets(&mut self, offsets: &[u16; N]) {
        for (lp, &offset) in self.i_loops.iter_mut().zip(offsets.iter()) {
            lp.feedback_offset = offset;
            lp.controller.set_source_offset(offset);
        }
        self.status.cs_calib_complete = true;
    }

    /// Offset applied to the voltage loop's alternate output (secondary phases).
    pub fn set_balancing_trim(&mut self, trim: u16) {
        self.v_loop.controller.set_alt_target_offset(trim);
    }

    /// Value the voltage loop currently regulates to.
    pub fn active_reference_value(&self) -> u16 {
        match self.active_reference {
            ReferenceSource::User => self.v_loop.reference,
            ReferenceSource::Ramp => self.startup.v_ramp.reference,
        }
    }

    /// Whether the loop follows the user reference or the startup ramp.
    pub fn active_reference(&self) -> ReferenceSource {
        self.active_reference
    }

    /// Current state machine mode.
    pub fn mode(&self) -> ConverterMode {
        self.mode
    }

    /// Status flags as reported in the status word.
    pub fn status(&self) -> &ConverterStatus {
        &self.status
    }

    /// External writes (enable, go, aggregate fault and power-source state).
    pub fn status_mut(&mut self) -> &mut ConverterStatus {
        &mut self.status
    }

    /// Enable or disable the converter. Disabling takes effect on the next [`Converter::execute`].
    pub fn set_enabled(&mut self, enabled: bool) {
        self.status.enabled = enabled;
    }

    /// User set points the converter tunes toward once online.
    pub fn set_values(&self) -> &SetValues {
        &self.set_values
    }

    /// New output voltage set point, approached one ramp step per tick while online.
    pub fn set_voltage_reference(&mut self, v_ref: u16) {
        self.set_values.v_ref = v_ref;
    }

    /// New current ceiling for average current mode, capped by the voltage loop maximum.
    pub fn set_current_reference(&mut self, i_ref: u16) {
        self.set_values.i_ref = i_ref;
    }

    /// Latest slow-tick measurements.
    pub fn data(&self) -> &RuntimeData<N> {
        &self.data
    }

    /// Validated configuration.
    pub fn config(&self) -> &ConverterConfig<N> {
        &self.config
    }

    /// Startup delay and ramp timers.
    pub fn startup(&self) -> &StartupTimers {
        &self.startup
    }

    /// Outer voltage loop.
    pub fn v_loop(&self) -> &LoopBinding<V> {
        &self.v_loop
    }

    /// Inner current loops, one per phase.
    pub fn i_loops(&self) -> &[LoopBinding<I>; N] {
        &self.i_loops
    }

    /// Borrow the power stage.
    pub fn power_stage(&self) -> &P {
        &self.power_stage
    }

    /// Mutably borrow the power stage.
    pub fn power_stage_mut(&mut self) -> &mut P {
        &mut self.power_stage
    }

    /// Consume the converter and return the power stage and pins.
    pub fn free(self) -> (P, ConverterPins<PG, EN>) {
        (self.power_stage, self.pins)
    }
}
