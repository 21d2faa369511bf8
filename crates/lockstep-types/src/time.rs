//! Logical time represented as an integer count of nanosecond ticks.
//!
//! All arithmetic on [`TimePoint`] and [`Duration`] is exact integer
//! arithmetic. Conversion from floating-point seconds rounds to the nearest
//! tick with ties to even; at nanosecond resolution a signed 64-bit tick
//! count covers roughly +/- 292 years around the epoch.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A number which identifies a specific macro step in an execution.
pub type StepNumber = i64;

const NANOS_PER_SECOND: f64 = 1e9;

/// A point in logical time, measured in nanoseconds from the epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimePoint(i64);

impl TimePoint {
    /// The epoch, `t = 0`.
    pub const ZERO: TimePoint = TimePoint(0);

    /// Creates a time point from a tick count.
    pub const fn from_nanos(nanos: i64) -> Self {
        TimePoint(nanos)
    }

    /// Creates a time point from a number of seconds, rounding to the
    /// nearest tick with ties to even.
    pub fn from_seconds(seconds: f64) -> Self {
        TimePoint((seconds * NANOS_PER_SECOND).round_ties_even() as i64)
    }

    /// Returns the tick count.
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Returns the time point as (possibly inexact) seconds.
    pub fn to_seconds(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND
    }
}

/// A signed span of logical time, measured in nanoseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    /// The zero-length duration.
    pub const ZERO: Duration = Duration(0);

    /// Creates a duration from a tick count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    /// Creates a duration from a number of seconds, rounding to the nearest
    /// tick with ties to even.
    pub fn from_seconds(seconds: f64) -> Self {
        Duration((seconds * NANOS_PER_SECOND).round_ties_even() as i64)
    }

    /// Returns the tick count.
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Returns the duration as (possibly inexact) seconds.
    pub fn to_seconds(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND
    }

    /// Returns whether the duration is strictly positive.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;
    fn add(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for TimePoint {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub<Duration> for TimePoint {
    type Output = TimePoint;
    fn sub(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 - rhs.0)
    }
}

impl SubAssign<Duration> for TimePoint {
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

impl Sub for TimePoint {
    type Output = Duration;
    fn sub(self, rhs: TimePoint) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;
    fn mul(self, rhs: i64) -> Duration {
        Duration(self.0 * rhs)
    }
}

impl Div<i64> for Duration {
    type Output = Duration;
    fn div(self, rhs: i64) -> Duration {
        Duration(self.0 / rhs)
    }
}

impl Neg for Duration {
    type Output = Duration;
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} s", self.to_seconds())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} s", self.to_seconds())
    }
}
