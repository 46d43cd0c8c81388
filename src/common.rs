use std::{ops::Deref, time::Duration};

use crate::TickbucketError;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Refill rate in tokens per second.
///
/// One token is added per tick, and a tick fires every `1s / rate`.
///
/// # Validation
///
/// Must be greater than 0.
///
/// # Examples
///
/// ```
/// use tickbucket::Rate;
///
/// let rate = Rate::try_from(10).unwrap();
/// assert_eq!(*rate, 10);
/// assert_eq!(rate.tick_interval().as_millis(), 100);
///
/// assert!(Rate::try_from(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rate(u64);

impl Rate {
    /// Time between two refill ticks.
    ///
    /// Computed in whole nanoseconds, so rates that do not divide a second evenly
    /// tick slightly early (by less than one nanosecond per tick). Rates above one
    /// billion per second are clamped to a 1ns tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos((NANOS_PER_SECOND / self.0).max(1))
    }
}

impl Deref for Rate {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for Rate {
    type Error = TickbucketError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(TickbucketError::InvalidRate(
                "Rate must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value as u64))
        }
    }
}

/// Maximum number of tokens the bucket holds (the burst ceiling).
///
/// # Validation
///
/// Must be greater than 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(u64);

impl Deref for Capacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for Capacity {
    type Error = TickbucketError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(TickbucketError::InvalidCapacity(
                "Capacity must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value as u64))
        }
    }
}

/// Configuration for a [`TokenBucket`](crate::TokenBucket).
///
/// Both fields are validated newtypes, so any value of this struct describes a
/// usable bucket.
#[derive(Clone, Debug)]
pub struct TokenBucketOptions {
    /// Tokens added per second.
    pub rate: Rate,
    /// Burst ceiling. The bucket starts full.
    pub capacity: Capacity,
}
