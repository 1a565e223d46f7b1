#![allow(dead_code)]

use smps_core::compensator::Scalers;
use smps_core::config::{ConverterConfig, LoopConfig, StartupConfig, SwitchNodeConfig};
use smps_core::data_types::{ConverterMode, SetValues};
use smps_core::{Converter, ConverterPins, NoPin, Npnz1p1z, PowerStage, Samples};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFault;

/// Power stage that records every request.
#[derive(Debug, Default)]
pub struct FakeStage {
    pub started: u32,
    pub stopped: u32,
    pub suspended: u32,
    pub resumed: u32,
    pub duties: Vec<(usize, u16)>,
    pub triggers: Vec<(usize, u16)>,
    pub fail_start: bool,
}

impl PowerStage for FakeStage {
    type Error = StageFault;

    fn start(&mut self) -> Result<(), StageFault> {
        self.started += 1;
        if self.fail_start { Err(StageFault) } else { Ok(()) }
    }

    fn stop(&mut self) -> Result<(), StageFault> {
        self.stopped += 1;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), StageFault> {
        self.suspended += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StageFault> {
        self.resumed += 1;
        Ok(())
    }

    fn set_duty(&mut self, phase: usize, duty: u16) -> Result<(), StageFault> {
        self.duties.push((phase, duty));
        Ok(())
    }

    fn set_adc_trigger(&mut self, phase: usize, position: u16) -> Result<(), StageFault> {
        self.triggers.push((phase, position));
        Ok(())
    }
}

pub type TestConverter<const N: usize> = Converter<Npnz1p1z, Npnz1p1z, FakeStage, NoPin, NoPin, N>;

/// y[n] = y[n-1] + k * (e[n] - e[n-1])
pub fn velocity_loop() -> Npnz1p1z {
    Npnz1p1z::new([i16::MIN], [2_000, -2_000], Scalers::default()).unwrap()
}

/// Voltage mode, v_ref 1000 ramped in steps of 10, short delays, no calibration.
pub fn vmc_config<const N: usize>() -> ConverterConfig<N> {
    ConverterConfig {
        startup: StartupConfig {
            power_on_delay: 2,
            power_good_delay: 3,
            v_ramp_step: 10,
            i_ramp_step: 10,
            startup_current: 0,
        },
        set_values: SetValues { v_ref: 1_000, i_ref: 0 },
        v_loop: LoopConfig { minimum: 10, maximum: 900, ..LoopConfig::default() },
        switch_node: SwitchNodeConfig { period: 1_000, duty_min: 10, duty_max: 900 },
        cs_calib_needed: false,
        ..ConverterConfig::default()
    }
}

pub fn build<const N: usize>(config: ConverterConfig<N>) -> TestConverter<N> {
    Converter::new(
        config,
        velocity_loop(),
        core::array::from_fn(|_| velocity_loop()),
        FakeStage::default(),
        ConverterPins::none(),
    )
    .unwrap()
}

/// Start the converter with a present power source and a live ADC.
pub fn power_up<const N: usize>(conv: &mut TestConverter<N>) {
    conv.start().unwrap();
    conv.status_mut().power_source_detected = true;
    conv.control_update(&Samples::default()).unwrap();
}

/// Execute until `mode` is reached; returns the number of steps taken.
pub fn run_until<const N: usize>(conv: &mut TestConverter<N>, mode: ConverterMode) -> usize {
    for steps in 0..10_000 {
        if conv.mode() == mode {
            return steps;
        }
        conv.execute().unwrap();
    }
    panic!("never reached {:?}, stuck in {:?}", mode, conv.mode());
}
