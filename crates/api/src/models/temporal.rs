use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::TemporalError;

/// Granularity used when converting nanosecond values to coarser units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nano,
    Micro,
    #[default]
    Milli,
    Second,
    Minute,
}

impl TimeUnit {
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            TimeUnit::Nano => 1,
            TimeUnit::Micro => 1_000,
            TimeUnit::Milli => 1_000_000,
            TimeUnit::Second => 1_000_000_000,
            TimeUnit::Minute => 60_000_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nano => "nano",
            TimeUnit::Micro => "micro",
            TimeUnit::Milli => "milli",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
        }
    }

    /// Converts a nanosecond value into this unit.
    ///
    /// Values sitting on the `i64` boundary are saturated sentinels rather than
    /// real measurements, so converting them is reported as an overflow instead
    /// of silently producing a truncated number.
    pub fn from_nanos(self, nanos: i64) -> Result<i64, TemporalError> {
        if nanos == i64::MAX || nanos == i64::MIN {
            return Err(TemporalError::Overflow {
                value: nanos,
                from: TimeUnit::Nano,
                to: self,
            });
        }
        Ok(nanos / self.nanos_per_unit())
    }

    /// Converts a value expressed in this unit into nanoseconds.
    pub fn to_nanos(self, value: i64) -> Result<i64, TemporalError> {
        value
            .checked_mul(self.nanos_per_unit())
            .filter(|n| *n != i64::MAX && *n != i64::MIN)
            .ok_or(TemporalError::Overflow {
                value,
                from: self,
                to: TimeUnit::Nano,
            })
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nano" | "nanoseconds" | "ns" => Ok(TimeUnit::Nano),
            "micro" | "microseconds" | "us" => Ok(TimeUnit::Micro),
            "milli" | "milliseconds" | "ms" => Ok(TimeUnit::Milli),
            "second" | "seconds" | "s" => Ok(TimeUnit::Second),
            "minute" | "minutes" | "m" => Ok(TimeUnit::Minute),
            other => Err(format!("unknown time unit: {other}")),
        }
    }
}

/// An elapsed interval with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    pub const fn from_minutes(minutes: i64) -> Self {
        Self(minutes.saturating_mul(60_000_000_000))
    }

    pub fn from_unit(value: i64, unit: TimeUnit) -> Result<Self, TemporalError> {
        unit.to_nanos(value).map(Self)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_micros(self) -> Result<i64, TemporalError> {
        TimeUnit::Micro.from_nanos(self.0)
    }

    pub fn as_millis(self) -> Result<i64, TemporalError> {
        TimeUnit::Milli.from_nanos(self.0)
    }

    pub fn as_secs(self) -> Result<i64, TemporalError> {
        TimeUnit::Second.from_nanos(self.0)
    }

    pub fn as_unit(self, unit: TimeUnit) -> Result<i64, TemporalError> {
        unit.from_nanos(self.0)
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Duration) -> Option<Duration> {
        self.0.checked_add(other.0).map(Duration)
    }

    pub fn checked_sub(self, other: Duration) -> Option<Duration> {
        self.0.checked_sub(other.0).map(Duration)
    }

    /// Scales the interval by `ratio`, rounding to the nearest nanosecond.
    pub fn mul_f64(self, ratio: f64) -> Option<Duration> {
        let scaled = (self.0 as f64 * ratio).round();
        if !scaled.is_finite() || scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
            return None;
        }
        Some(Duration(scaled as i64))
    }

    /// Negative intervals clamp to zero.
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Duration(i64::try_from(value.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        self.checked_add(rhs).expect("overflow when adding durations")
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        self.checked_sub(rhs)
            .expect("overflow when subtracting durations")
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0;
        let abs = nanos.unsigned_abs();
        let sign = if nanos < 0 { "-" } else { "" };
        if abs >= 1_000_000_000 {
            write!(f, "{sign}{:.3}s", abs as f64 / 1e9)
        } else if abs >= 1_000_000 {
            write!(f, "{sign}{:.3}ms", abs as f64 / 1e6)
        } else if abs >= 1_000 {
            write!(f, "{sign}{:.3}us", abs as f64 / 1e3)
        } else {
            write!(f, "{sign}{abs}ns")
        }
    }
}

/// A point in time, in nanoseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(i64);

impl Instant {
    pub const MIN: Instant = Instant(i64::MIN);
    pub const MAX: Instant = Instant(i64::MAX);
    pub const EPOCH: Instant = Instant(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub fn from_unit(value: i64, unit: TimeUnit) -> Result<Self, TemporalError> {
        unit.to_nanos(value).map(Self)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_micros(self) -> Result<i64, TemporalError> {
        TimeUnit::Micro.from_nanos(self.0)
    }

    pub fn as_millis(self) -> Result<i64, TemporalError> {
        TimeUnit::Milli.from_nanos(self.0)
    }

    pub fn as_secs(self) -> Result<i64, TemporalError> {
        TimeUnit::Second.from_nanos(self.0)
    }

    pub fn as_unit(self, unit: TimeUnit) -> Result<i64, TemporalError> {
        unit.from_nanos(self.0)
    }

    pub fn checked_add(self, duration: Duration) -> Option<Instant> {
        self.0.checked_add(duration.0).map(Instant)
    }

    pub fn checked_sub(self, duration: Duration) -> Option<Instant> {
        self.0.checked_sub(duration.0).map(Instant)
    }

    /// Signed distance from `earlier` to `self`.
    pub fn checked_duration_since(self, earlier: Instant) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration)
    }

    pub fn duration_since(self, earlier: Instant) -> Duration {
        self.checked_duration_since(earlier)
            .expect("overflow when subtracting instants")
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        self.checked_add(rhs)
            .expect("overflow when adding duration to instant")
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        self.checked_sub(rhs)
            .expect("overflow when subtracting duration from instant")
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_display_picks_readable_unit() {
        assert_eq!(Duration::from_nanos(12).to_string(), "12ns");
        assert_eq!(Duration::from_millis(1500).to_string(), "1.500s");
        assert_eq!(Duration::from_micros(-2500).to_string(), "-2.500ms");
    }

    #[test]
    fn test_time_unit_parse() {
        assert_eq!("ms".parse::<TimeUnit>(), Ok(TimeUnit::Milli));
        assert_eq!("MICRO".parse::<TimeUnit>(), Ok(TimeUnit::Micro));
        assert!("fortnight".parse::<TimeUnit>().is_err());
    }
}
