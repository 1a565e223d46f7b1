//! Packed 16-bit status words for telemetry.
//! Bit positions follow the firmware status registers so existing host tools keep decoding them.

use crate::data_types::ConverterStatus;

bitflags::bitflags! {
    /// Converter status word.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct StatusBits: u16 {
        const READY                 = 1 << 0;
        const ADC_ACTIVE            = 1 << 1;
        const PWM_ACTIVE            = 1 << 2;
        const POWER_SOURCE_DETECTED = 1 << 3;
        const CS_CALIB_COMPLETE     = 1 << 4;
        // bits 5-6 reserved
        const FAULT_ACTIVE          = 1 << 7;
        const BUSY                  = 1 << 8;
        /// Current-sense calibration requested.
        const CS_CALIB              = 1 << 9;
        // bits 10-12 reserved
        const GO                    = 1 << 13;
        const AUTORUN               = 1 << 14;
        const ENABLED               = 1 << 15;
    }

    /// Compensator status word.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CompensatorStatusBits: u16 {
        /// Last output was clamped at the minimum.
        const LOWER_SATURATION = 1 << 0;
        /// Last output was clamped at the maximum.
        const UPPER_SATURATION = 1 << 1;
        const AGC_ENABLED      = 1 << 11;
        const INVERT_INPUT     = 1 << 14;
        const ENABLED          = 1 << 15;
    }
}

/// Pack a status struct into its telemetry word.
pub fn encode_status(status: &ConverterStatus) -> u16 {
    let mut bits = StatusBits::empty();
    bits.set(StatusBits::READY, status.ready);
    bits.set(StatusBits::ADC_ACTIVE, status.adc_active);
    bits.set(StatusBits::PWM_ACTIVE, status.pwm_active);
    bits.set(StatusBits::POWER_SOURCE_DETECTED, status.power_source_detected);
    bits.set(StatusBits::CS_CALIB_COMPLETE, status.cs_calib_complete);
    bits.set(StatusBits::FAULT_ACTIVE, status.fault_active);
    bits.set(StatusBits::BUSY, status.busy);
    bits.set(StatusBits::CS_CALIB, status.cs_calib_needed);
    bits.set(StatusBits::GO, status.go);
    bits.set(StatusBits::AUTORUN, status.autorun);
    bits.set(StatusBits::ENABLED, status.enabled);
    bits.bits()
}

/// Unpack a telemetry word; reserved bits are ignored.
pub fn decode_status(word: u16) -> ConverterStatus {
    let bits = StatusBits::from_bits_truncate(word);
    ConverterStatus {
        ready: bits.contains(StatusBits::READY),
        adc_active: bits.contains(StatusBits::ADC_ACTIVE),
        pwm_active: bits.contains(StatusBits::PWM_ACTIVE),
        power_source_detected: bits.contains(StatusBits::POWER_SOURCE_DETECTED),
        cs_calib_complete: bits.contains(StatusBits::CS_CALIB_COMPLETE),
        fault_active: bits.contains(StatusBits::FAULT_ACTIVE),
        busy: bits.contains(StatusBits::BUSY),
        cs_calib_needed: bits.contains(StatusBits::CS_CALIB),
        go: bits.contains(StatusBits::GO),
        autorun: bits.contains(StatusBits::AUTORUN),
        enabled: bits.contains(StatusBits::ENABLED),
    }
}

impl ConverterStatus {
    pub fn to_bits(&self) -> u16 {
        encode_status(self)
    }

    pub fn from_bits(word: u16) -> Self {
        decode_status(word)
    }
}
