use smps_core::compensator::{Compensator, Npnz, Npnz1p1z, Npnz2p2z, OutputLimits, Port, Scalers};
use smps_core::q15::Gain;
use smps_core::status_word::CompensatorStatusBits;
use smps_core::ConfigError;

fn velocity(k: i16) -> Npnz1p1z {
    Npnz1p1z::new([i16::MIN], [k, -k], Scalers::default()).unwrap()
}

#[test]
fn rejects_mismatched_coefficients() {
    assert_eq!(Npnz::<2, 2>::new([0; 2], [0; 2], Scalers::default()).unwrap_err(), ConfigError::CoefficientLength);
    assert_eq!(Npnz::<0, 1>::new([], [0], Scalers::default()).unwrap_err(), ConfigError::CoefficientLength);
    let bad = Scalers { pre_shift: 40, ..Scalers::default() };
    assert_eq!(Npnz1p1z::new([0], [0; 2], bad).unwrap_err(), ConfigError::InvalidScaler);
    assert!(Npnz2p2z::new([0x58BD, 0x2744], [0x7D28, 0x0ECD, -0x6E5A], Scalers::default()).is_ok());
}

#[test]
fn precharge_gives_continuous_output() {
    let mut c = velocity(3_000);
    c.enable();
    c.precharge(50, 1_234);
    // source 500 against reference 550 reproduces the seeded error of 50
    let out = c.update(500, 550).unwrap();
    assert_eq!(c.output(), 1_234);
    assert_eq!(out.primary, 1_234);
    assert_eq!(c.error(), 50);
}

#[test]
fn disabled_update_is_a_no_op() {
    let mut c = velocity(3_000);
    c.precharge(0, 77);
    assert!(c.update(0, 1_000).is_none());
    assert_eq!(c.output(), 77);
    assert_eq!(c.error_history(), &[0, 0]);
}

#[test]
fn saturation_flags_track_the_clamped_bound() {
    let mut c = velocity(16_384).with_limits(OutputLimits::new(0, 1_000).unwrap());
    c.enable();
    c.precharge(0, 990);

    // +100 error adds 50 counts: 1040 clamps to 1000
    c.update(0, 100).unwrap();
    assert_eq!(c.output(), 1_000);
    assert!(c.status().contains(CompensatorStatusBits::UPPER_SATURATION));

    c.update(30_000, 0).unwrap();
    assert_eq!(c.output(), 0);
    assert!(c.status().contains(CompensatorStatusBits::LOWER_SATURATION));
    assert!(!c.status().contains(CompensatorStatusBits::UPPER_SATURATION));

    c.reset();
    assert!(!c.status().intersects(
        CompensatorStatusBits::LOWER_SATURATION | CompensatorStatusBits::UPPER_SATURATION
    ));
    assert_eq!(c.control_history(), &[0]);
    assert!(c.is_enabled());
}

#[test]
fn alternate_port_applies_its_offset() {
    let mut c = velocity(3_000).with_alt_target(Port::with_offset(5));
    c.enable();
    c.precharge(0, 400);
    let out = c.update(100, 100).unwrap();
    assert_eq!(out.primary, 400);
    assert_eq!(out.alternate, 405);

    c.set_alt_target_offset(0);
    assert_eq!(c.update(100, 100).unwrap().alternate, 400);
}

#[test]
fn source_offset_and_inverted_input() {
    let mut c = velocity(16_384).with_source(Port::with_offset(20)).with_inverted_input(true);
    c.enable();
    c.precharge(0, 500);
    // error = -(100 - (140 - 20)) = 20, 16384 * 20 >> 15 = 10
    c.update(140, 100).unwrap();
    assert_eq!(c.error(), 20);
    assert_eq!(c.output(), 510);
}

#[test]
fn gain_modulation_scales_the_b_term_only_when_enabled() {
    let mut plain = velocity(16_384);
    let mut modulated = velocity(16_384).with_gain_modulation(true);
    for c in [&mut plain, &mut modulated] {
        c.enable();
        c.precharge(0, 1_000);
        c.set_gain_modulation(Gain::ratio(1, 2));
    }
    plain.update(0, 200).unwrap();
    modulated.update(0, 200).unwrap();
    assert_eq!(plain.output(), 1_100);
    assert_eq!(modulated.output(), 1_050);
    assert!(modulated.gain_modulation_enabled());
    assert!(!plain.gain_modulation_enabled());
}
