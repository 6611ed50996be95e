//! Wire representation of timestamps: signed 64-bit ticks (100ns units)
//! since `0001-01-01T00:00:00Z`, matching the source material's
//! `DateTime.Ticks` epoch so imported fixtures round-trip byte-for-byte.

/// Ticks between `0001-01-01` and the Unix epoch, at 100ns resolution.
pub const TICKS_TO_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// A point in time expressed as signed 100ns ticks since `0001-01-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WireDate(i64);

impl WireDate {
    /// Wraps a raw tick count.
    #[must_use]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Builds a [`WireDate`] from a Unix timestamp in whole seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(TICKS_TO_UNIX_EPOCH + seconds * 10_000_000)
    }

    /// Converts to whole seconds since the Unix epoch, truncating
    /// sub-second ticks.
    #[must_use]
    pub const fn to_unix_seconds(self) -> i64 {
        (self.0 - TICKS_TO_UNIX_EPOCH) / 10_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_round_trips() {
        let date = WireDate::from_unix_seconds(0);
        assert_eq!(date.to_unix_seconds(), 0);
        assert_eq!(date.ticks(), TICKS_TO_UNIX_EPOCH);
    }

    #[test]
    fn arbitrary_timestamp_round_trips() {
        let date = WireDate::from_unix_seconds(1_753_660_800);
        assert_eq!(date.to_unix_seconds(), 1_753_660_800);
    }
}
