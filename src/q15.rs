//! Q15 fixed-point helpers. Every stage saturates, nothing wraps.

/// Clamp to the signed 16-bit range.
pub fn sat16(x: i64) -> i16 {
    x.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Clamp to the unsigned 16-bit range.
pub fn sat_u16(x: i64) -> u16 {
    x.clamp(0, u16::MAX as i64) as u16
}

/// Shift left for positive `s`, arithmetic right for negative `s`.
/// Left shifts saturate at the `i64` bounds.
pub fn shift(x: i64, s: i8) -> i64 {
    if s >= 0 {
        x.saturating_mul(1i64 << (s as u32).min(62))
    } else {
        x >> (s.unsigned_abs() as u32).min(63)
    }
}

/// `(x * factor) >> (16 - scaler)`. `scaler` is expected in `0..=16`.
pub fn scale(x: i64, factor: i16, scaler: u8) -> i64 {
    shift(x.saturating_mul(factor as i64), scaler.min(16) as i8 - 16)
}

/// Multiplicative gain expressed as `factor * 2^(scaler - 15)`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Gain {
    pub factor: i16,
    pub scaler: i8,
}

impl Gain {
    /// Exactly 1.0.
    pub const UNITY: Gain = Gain { factor: 0x4000, scaler: 1 };

    /// Gain approximating `num / den`; a zero denominator yields unity.
    pub fn ratio(num: u16, den: u16) -> Gain {
        if den == 0 {
            return Gain::UNITY;
        }
        let mut q = ((num as i64) << 15) / den as i64;
        let mut scaler = 0i8;
        while q > i16::MAX as i64 {
            q >>= 1;
            scaler += 1;
        }
        Gain { factor: q as i16, scaler }
    }

    pub fn apply(&self, x: i64) -> i64 {
        shift(x.saturating_mul(self.factor as i64), self.scaler - 15)
    }
}

impl Default for Gain {
    fn default() -> Self {
        Gain::UNITY
    }
}
