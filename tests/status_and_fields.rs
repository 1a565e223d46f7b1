use smps_core::data_types::{ConverterMode, ConverterStatus};
use smps_core::status_word::{decode_status, encode_status, StatusBits};

#[test]
fn status_word_bit_positions() {
    let status = ConverterStatus { ready: true, enabled: true, ..ConverterStatus::default() };
    assert_eq!(encode_status(&status), 0x8001);

    let status = ConverterStatus { fault_active: true, busy: true, go: true, ..ConverterStatus::default() };
    assert_eq!(status.to_bits(), (1 << 7) | (1 << 8) | (1 << 13));
}

#[test]
fn status_word_decode_ignores_reserved_bits() {
    assert_eq!(decode_status(0b0110_0000), ConverterStatus::default());
    assert_eq!(decode_status(0b0001_1100_0000_0000), ConverterStatus::default());

    let all = ConverterStatus::from_bits(u16::MAX);
    assert!(all.ready && all.adc_active && all.pwm_active && all.power_source_detected);
    assert!(all.cs_calib_complete && all.fault_active && all.busy && all.cs_calib_needed);
    assert!(all.go && all.autorun && all.enabled);
    assert_eq!(all.to_bits(), StatusBits::all().bits());
}

#[test]
fn mode_codes() {
    assert_eq!(ConverterMode::Online.as_u8(), 8);
    assert_eq!(ConverterMode::from_u8(9), ConverterMode::Suspend);
    assert_eq!(ConverterMode::from_u8(3), ConverterMode::PowerOnDelay);
    // corrupted values recover to Initialize
    assert_eq!(ConverterMode::from_u8(42), ConverterMode::Initialize);
    assert_eq!(ConverterMode::from_u8(u8::MAX), ConverterMode::Initialize);
}

#[test]
fn regulating_modes() {
    assert!(ConverterMode::VoltageRampUp.is_regulating());
    assert!(ConverterMode::Online.is_regulating());
    assert!(!ConverterMode::LaunchRamp.is_regulating());
    assert!(!ConverterMode::Suspend.is_regulating());
}
