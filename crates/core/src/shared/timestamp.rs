use std::cmp::Ordering;
use std::fmt;

/// A point on a media timeline, expressed as `value / timescale` seconds.
///
/// Keeping the rational form avoids drift when sample counts are converted
/// between rates; conversion to float seconds happens only for display and
/// coarse comparisons.
#[derive(Clone, Copy, Debug)]
pub struct Timestamp {
    value: i64,
    timescale: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        value: 0,
        timescale: 1,
    };

    /// Timescale used when a timestamp is built from float seconds.
    pub const MICROSECONDS: i32 = 1_000_000;

    pub fn new(value: i64, timescale: i32) -> Self {
        debug_assert!(timescale > 0, "timescale must be positive");
        Self {
            value,
            timescale: timescale.max(1),
        }
    }

    pub fn from_seconds(seconds: f64) -> Self {
        Self::new(
            (seconds * Self::MICROSECONDS as f64).round() as i64,
            Self::MICROSECONDS,
        )
    }

    /// Timestamp of the sample at `index` in a stream running at `sample_rate`.
    pub fn from_samples(index: u64, sample_rate: u32) -> Self {
        Self::new(index as i64, sample_rate as i32)
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Converts to another timescale, rounding to the nearest tick.
    pub fn rescale(&self, timescale: i32) -> Timestamp {
        if timescale == self.timescale {
            return *self;
        }
        let num = self.value as i128 * timescale as i128;
        let den = self.timescale as i128;
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        Timestamp::new(rounded as i64, timescale)
    }

    /// Sample index this timestamp falls on at `sample_rate`.
    pub fn to_samples(&self, sample_rate: u32) -> i64 {
        self.rescale(sample_rate as i32).value
    }

    pub fn add_samples(&self, samples: u64, sample_rate: u32) -> Timestamp {
        let base = self.rescale(sample_rate as i32);
        Timestamp::new(base.value + samples as i64, sample_rate as i32)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.seconds())
    }
}
