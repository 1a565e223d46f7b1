use smps_core::compensator::Port;
use smps_core::q15::{sat16, sat_u16, scale, shift, Gain};

#[test]
fn saturation_clamps_instead_of_wrapping() {
    assert_eq!(sat16(40_000), i16::MAX);
    assert_eq!(sat16(-40_000), i16::MIN);
    assert_eq!(sat16(-123), -123);
    assert_eq!(sat_u16(-1), 0);
    assert_eq!(sat_u16(70_000), u16::MAX);
}

#[test]
fn shift_directions() {
    assert_eq!(shift(3, 2), 12);
    // arithmetic right shift rounds toward negative infinity
    assert_eq!(shift(-9, -1), -5);
    assert_eq!(shift(i64::MAX / 2, 4), i64::MAX);
}

#[test]
fn scale_with_unity_factor_is_identity() {
    assert_eq!(scale(1_000, 0x4000, 2), 1_000);
    assert_eq!(scale(1_000, 0x4000, 1), 500);
    assert_eq!(scale(-64, 0x4000, 2), -64);
}

#[test]
fn port_normalization_and_output() {
    let port = Port::with_offset(100);
    assert_eq!(port.normalize(150), 50);
    assert_eq!(port.normalize(50), -50);
    assert_eq!(port.write(25), 125);
    assert_eq!(Port::UNITY.write(-5), 0);
    assert!(Port::new(0, 0x4000, 17).is_err());
}

#[test]
fn gain_ratio_matches_quotient() {
    assert_eq!(Gain::ratio(100, 100), Gain::UNITY);
    assert_eq!(Gain::ratio(100, 0), Gain::UNITY);
    assert_eq!(Gain::UNITY.apply(1_234), 1_234);
    assert_eq!(Gain::ratio(100, 200).apply(1_000), 500);
    assert_eq!(Gain::ratio(300, 100).apply(1_000), 3_000);
}
