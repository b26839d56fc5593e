//! Anchor-aligned time windows for bulletin selection.
//!
//! A bulletin covers one *period* (e.g. seven days). Period boundaries are
//! not relative to the moment the command runs; they are laid out on a fixed
//! grid starting at an *anchor* instant:
//!
//! ```text
//!   anchor      anchor+p     anchor+2p    anchor+3p
//!     |------------|------------|------------|----
//!                  [  window    ]       ^
//!                                      now
//! ```
//!
//! For a given `now` the aligner returns the last *completed* period, i.e.
//! the one immediately before the period containing `now`. Any two runs
//! inside the same period therefore select the same window, and the period
//! still accumulating articles is never published early.

use crate::error::{BulletinError, Result};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::fmt;

/// Default grid origin: Monday 2000-01-03 00:00:00 UTC.
pub fn default_anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A strictly positive period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period(TimeDelta);

impl Period {
    /// Validate an arbitrary duration as a period.
    ///
    /// # Errors
    ///
    /// [`BulletinError::Configuration`] if `length` is shorter than one
    /// millisecond (including zero and negative durations) or is not a whole
    /// number of milliseconds. The grid is computed in milliseconds.
    pub fn new(length: TimeDelta) -> Result<Self> {
        if length.num_milliseconds() <= 0 {
            return Err(BulletinError::configuration(format!(
                "period must be positive, got {length}"
            )));
        }
        if TimeDelta::try_milliseconds(length.num_milliseconds()) != Some(length) {
            return Err(BulletinError::configuration(format!(
                "period must be a whole number of milliseconds, got {length}"
            )));
        }
        Ok(Self(length))
    }

    /// A period of `days` whole days.
    pub fn days(days: i64) -> Result<Self> {
        if days <= 0 {
            return Err(BulletinError::configuration(format!(
                "days must be a positive number, got {days}"
            )));
        }
        let length = TimeDelta::try_days(days)
            .ok_or_else(|| BulletinError::configuration(format!("days out of range: {days}")))?;
        Self::new(length)
    }

    pub fn length(&self) -> TimeDelta {
        self.0
    }

    /// Whole days in the period, for labelling.
    pub fn num_days(&self) -> i64 {
        self.0.num_days()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.0.num_days();
        if TimeDelta::try_days(days) == Some(self.0) {
            write!(f, "{days} day{}", if days == 1 { "" } else { "s" })
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The range `(start, end]` a bulletin covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn length(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Lower bound exclusive, upper bound inclusive.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start < instant && instant <= self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Computes bulletin windows on a grid fixed at `anchor`.
///
/// The anchor is chosen once at startup and never changes for the lifetime
/// of the aligner.
#[derive(Debug, Clone, Copy)]
pub struct IntervalAligner {
    anchor: DateTime<Utc>,
}

impl Default for IntervalAligner {
    fn default() -> Self {
        Self::new(default_anchor())
    }
}

impl IntervalAligner {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self { anchor }
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// The last fully elapsed period before the one containing `now`.
    ///
    /// With `n = floor((now - anchor) / period)` the window starts at
    /// `anchor + (n - 1) * period`. Division floors toward negative infinity,
    /// so instants before the anchor behave exactly like instants after it.
    /// An instant sitting on a boundary belongs to the period starting there.
    ///
    /// # Errors
    ///
    /// [`BulletinError::Configuration`] when the window falls outside the
    /// representable date range.
    pub fn window(&self, period: Period, now: DateTime<Utc>) -> Result<Window> {
        let period_ms = period.length().num_milliseconds();
        let elapsed_ms = now.signed_duration_since(self.anchor).num_milliseconds();

        // Millisecond truncation can put the estimate one period off for
        // sub-millisecond instants right at a boundary; settle it exactly.
        let mut n = elapsed_ms.div_euclid(period_ms);
        while self.boundary(period_ms, n)? > now {
            n -= 1;
        }
        while self.boundary(period_ms, n + 1)? <= now {
            n += 1;
        }

        let start = self.boundary(period_ms, n - 1)?;
        let end = self.boundary(period_ms, n)?;
        Ok(Window { start, end })
    }

    /// `anchor + k * period`.
    fn boundary(&self, period_ms: i64, k: i64) -> Result<DateTime<Utc>> {
        period_ms
            .checked_mul(k)
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|offset| self.anchor.checked_add_signed(offset))
            .ok_or_else(|| {
                BulletinError::configuration(format!(
                    "period boundary {k} out of range for anchor {}",
                    self.anchor.to_rfc3339()
                ))
            })
    }
}
