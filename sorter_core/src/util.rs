//! Common time and duty helpers.

use sorter_traits::DUTY_MAX;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Period in microseconds for a given rate in Hz.
/// Clamps `hz` to at least 1; result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Encoder velocity in counts/second from a per-period delta.
/// `period_ms` is clamped to at least 1.
#[inline]
pub fn velocity_cps(delta_counts: i64, period_ms: u64) -> i64 {
    delta_counts.saturating_mul(MILLIS_PER_SEC as i64) / period_ms.max(1) as i64
}

/// Duty as an operator-facing percentage of full scale.
#[inline]
pub fn duty_percent(duty: u16) -> u8 {
    ((u32::from(duty.min(DUTY_MAX)) * 100) / u32::from(DUTY_MAX)) as u8
}
