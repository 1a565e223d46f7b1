mod common;

use common::{build, vmc_config, FakeStage};
use smps_core::calibration::CurrentBalancer;
use smps_core::compensator::Compensator;
use smps_core::config::{ConverterConfig, LoopConfig};
use smps_core::data_types::{ControlMode, ConverterMode, SetValues};
use smps_core::fault::{FaultSet, ProtectionLimits};
use smps_core::{NoPin, Npnz1p1z, PowerSupply, Samples};

type Supply = PowerSupply<Npnz1p1z, Npnz1p1z, FakeStage, NoPin, NoPin, 2>;

fn limits() -> ProtectionLimits {
    ProtectionLimits {
        uvlo_trip: 100,
        uvlo_release: 150,
        ovlo_trip: 1_000,
        ovlo_release: 900,
        regulation_trip: 200,
        regulation_release: 100,
        ocp_trip: 2_000,
        ocp_release: 1_500,
    }
}

fn supply() -> Supply {
    supply_with(vmc_config())
}

fn supply_with(mut config: ConverterConfig<2>) -> Supply {
    config.cs_calib_needed = true;
    let mut ps = PowerSupply::new(build(config), FaultSet::new(&limits()).unwrap(), CurrentBalancer::default());
    ps.start().unwrap();
    ps
}

/// Output follows the active reference; phase currents carry a sense offset of 12/8.
fn healthy(ps: &Supply) -> Samples<2> {
    Samples {
        v_in: 500,
        v_out: ps.converter().active_reference_value(),
        i_sns: [12, 8],
        temp: 0,
    }
}

fn tick(ps: &mut Supply, samples: &Samples<2>) {
    ps.control_tick(samples).unwrap();
    ps.tick(samples).unwrap();
}

fn run_online(ps: &mut Supply) {
    for _ in 0..5_000 {
        if ps.converter().mode() == ConverterMode::Online {
            return;
        }
        let samples = healthy(ps);
        tick(ps, &samples);
    }
    panic!("stuck in {:?}", ps.converter().mode());
}

#[test]
fn latched_faults_hold_off_startup_until_released() {
    let mut ps = supply();
    assert!(ps.converter().status().fault_active);

    for _ in 0..500 {
        let samples = healthy(&ps);
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Initialize);
    }
    // undervoltage and overvoltage release on tick 501
    let samples = healthy(&ps);
    tick(&mut ps, &samples);
    assert_eq!(ps.converter().mode(), ConverterMode::Reset);
    assert!(ps.faults().overcurrent.is_active());

    // overcurrent releases on tick 2001
    for _ in 501..2_000 {
        let samples = healthy(&ps);
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Reset);
    }
    let samples = healthy(&ps);
    tick(&mut ps, &samples);
    assert!(!ps.faults().any_active());
    assert_eq!(ps.converter().mode(), ConverterMode::Standby);
}

#[test]
fn calibrates_then_reaches_online() {
    let mut ps = supply();
    run_online(&mut ps);

    let status = ps.converter().status();
    assert!(status.cs_calib_complete && status.power_source_detected && status.adc_active);
    assert_eq!(ps.converter().i_loops()[0].feedback_offset, 12);
    assert_eq!(ps.converter().i_loops()[1].controller().source_offset(), 8);
    assert_eq!(ps.converter().data().i_sns[0].calibrated, 0);
    assert!(ps.faults().regulation.is_enabled());
}

#[test]
fn overcurrent_trip_suspends_the_converter() {
    let mut ps = supply();
    run_online(&mut ps);
    let suspended = ps.converter().power_stage().suspended;

    let mut samples = healthy(&ps);
    samples.i_sns = [1_100, 1_100];
    for _ in 0..50 {
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Online);
    }
    tick(&mut ps, &samples);
    assert!(ps.faults().overcurrent.is_active());
    assert_eq!(ps.converter().mode(), ConverterMode::Reset);
    assert!(!ps.converter().v_loop().controller().is_enabled());
    assert!(ps.converter().power_stage().suspended > suspended);
}

#[test]
fn regulation_error_holds_off_restart_for_the_release_delay() {
    let mut ps = supply();
    run_online(&mut ps);

    let mut samples = healthy(&ps);
    samples.v_out = 0;
    for _ in 0..250 {
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Online);
    }
    tick(&mut ps, &samples);
    assert_eq!(ps.converter().mode(), ConverterMode::Reset);
    assert!(ps.faults().regulation.is_active());
    assert!(ps.faults().regulation.is_paused());
    let resumed = ps.converter().power_stage().resumed;

    // no relaunch while the latch runs out its 1000-tick release delay
    for _ in 0..1_000 {
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Reset);
        assert!(ps.converter().status().fault_active);
    }
    assert_eq!(ps.converter().power_stage().resumed, resumed);

    tick(&mut ps, &samples);
    assert!(!ps.faults().regulation.is_active());
    assert!(!ps.faults().regulation.is_paused());
    assert_eq!(ps.converter().mode(), ConverterMode::Standby);

    run_online(&mut ps);
    assert!(ps.faults().regulation.is_enabled());
}

#[test]
fn missing_input_forces_reset_and_recovers_automatically() {
    let mut ps = supply();
    run_online(&mut ps);

    let mut samples = healthy(&ps);
    samples.v_in = 1_200;
    tick(&mut ps, &samples);
    assert_eq!(ps.converter().mode(), ConverterMode::Reset);
    assert!(!ps.converter().status().power_source_detected);

    for _ in 0..60 {
        tick(&mut ps, &samples);
    }
    assert!(ps.faults().ovlo.is_active());

    // sustained recovery, then the converter restarts on its own
    run_online(&mut ps);
    assert!(!ps.faults().ovlo.is_active());
}

#[test]
fn balancing_is_off_by_default() {
    let mut ps = supply();
    run_online(&mut ps);
    assert!(!ps.balancer_mut().is_enabled());
    ps.balancer_mut().set_enabled(true);
    let samples = healthy(&ps);
    tick(&mut ps, &samples);
    // voltage mode never balances
    assert_eq!(ps.balancer_mut().trim(), 0);
}

#[test]
fn balancing_trim_raises_the_secondary_current_reference() {
    let mut config = vmc_config::<2>();
    config.control_mode = ControlMode::AverageCurrentMode;
    config.startup.startup_current = 100;
    config.set_values = SetValues { v_ref: 1_000, i_ref: 300 };
    config.v_loop = LoopConfig { minimum: 0, maximum: 500, ..LoopConfig::default() };
    config.i_loops = [LoopConfig { minimum: 10, maximum: 900, ..LoopConfig::default() }; 2];
    let mut ps = supply_with(config);
    run_online(&mut ps);

    // calibrated phase currents 28 and 0
    let unbalanced = |ps: &Supply| Samples { i_sns: [40, 8], ..healthy(ps) };
    let spread = |ps: &Supply| {
        let loops = ps.converter().i_loops();
        loops[1].controller().error() as i32 - loops[0].controller().error() as i32
    };

    let samples = unbalanced(&ps);
    tick(&mut ps, &samples);
    assert_eq!(ps.balancer_mut().trim(), 0);
    assert_eq!(spread(&ps), 28);

    ps.balancer_mut().set_enabled(true);
    for _ in 0..10 {
        let samples = unbalanced(&ps);
        tick(&mut ps, &samples);
        assert_eq!(ps.converter().mode(), ConverterMode::Online);
    }
    assert_eq!(ps.balancer_mut().trim(), 7);
    assert_eq!(spread(&ps), 28 + 7);
}
