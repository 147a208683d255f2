//! Per-channel-per-day admission counters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Admissions granted to one channel on one calendar day.
///
/// Counters are created lazily by the first successful reservation of the
/// day and only ever move through the ledger's atomic
/// increment-if-below-limit operation. Quota resets by keying a new day,
/// not by mutating the prior day's counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub channel_id: String,
    pub day: NaiveDate,
    pub count: u32,
    pub last_admission_at: DateTime<Utc>,
}

impl QuotaCounter {
    /// Counter state after the first admission of the day.
    pub fn first(channel_id: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            channel_id: channel_id.into(),
            day,
            count: 1,
            last_admission_at: Utc::now(),
        }
    }

    /// Record another admission.
    pub fn increment(&mut self) {
        self.count += 1;
        self.last_admission_at = Utc::now();
    }

    /// Remaining quota against a channel's daily limit.
    pub fn remaining(&self, daily_quota: u32) -> u32 {
        daily_quota.saturating_sub(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_admission() {
        let counter = QuotaCounter::first("ch-1", Utc::now().date_naive());
        assert_eq!(counter.count, 1);
        assert_eq!(counter.remaining(3), 2);
    }

    #[test]
    fn test_remaining_saturates() {
        let mut counter = QuotaCounter::first("ch-1", Utc::now().date_naive());
        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.count, 4);
        assert_eq!(counter.remaining(3), 0);
    }
}
