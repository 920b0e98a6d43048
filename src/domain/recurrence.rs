//! Recurrence frequency and calendar arithmetic for recurring templates.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// How often a recurring template produces an occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceFrequency::Daily => "DAILY",
            RecurrenceFrequency::Weekly => "WEEKLY",
            RecurrenceFrequency::Monthly => "MONTHLY",
            RecurrenceFrequency::Yearly => "YEARLY",
        }
    }

    /// The date `n` periods after `anchor`.
    ///
    /// Always counted from the anchor, so a month-end anchor clamps per month
    /// (Jan 31 -> Feb 29 -> Mar 31) instead of drifting to the shortest month.
    /// Returns `None` if the result leaves chrono's supported range.
    pub fn occurrence(&self, anchor: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            RecurrenceFrequency::Daily => anchor.checked_add_days(Days::new(u64::from(n))),
            RecurrenceFrequency::Weekly => anchor.checked_add_days(Days::new(7 * u64::from(n))),
            RecurrenceFrequency::Monthly => anchor.checked_add_months(Months::new(n)),
            RecurrenceFrequency::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// First occurrence (n >= 1) strictly after `after`.
    pub fn next_occurrence_after(&self, anchor: NaiveDate, after: NaiveDate) -> Option<NaiveDate> {
        let mut n = self.periods_elapsed_estimate(anchor, after).max(1);
        loop {
            let candidate = self.occurrence(anchor, n)?;
            if candidate > after {
                return Some(candidate);
            }
            n = n.checked_add(1)?;
        }
    }

    /// Lower bound on the index of the first occurrence after `after`.
    /// Never overshoots; the caller walks forward from here.
    fn periods_elapsed_estimate(&self, anchor: NaiveDate, after: NaiveDate) -> u32 {
        if after < anchor {
            return 1;
        }
        let estimate = match self {
            RecurrenceFrequency::Daily => (after - anchor).num_days() + 1,
            RecurrenceFrequency::Weekly => (after - anchor).num_days() / 7 + 1,
            RecurrenceFrequency::Monthly => {
                i64::from(after.year() - anchor.year()) * 12 + i64::from(after.month())
                    - i64::from(anchor.month())
            }
            RecurrenceFrequency::Yearly => i64::from(after.year() - anchor.year()),
        };
        u32::try_from(estimate).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for RecurrenceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceFrequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(RecurrenceFrequency::Daily),
            "WEEKLY" => Ok(RecurrenceFrequency::Weekly),
            "MONTHLY" => Ok(RecurrenceFrequency::Monthly),
            "YEARLY" => Ok(RecurrenceFrequency::Yearly),
            other => Err(DomainError::InvalidRecurrence(format!(
                "unknown frequency '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_daily_and_weekly_occurrence() {
        let anchor = date("2024-01-01");
        assert_eq!(RecurrenceFrequency::Daily.occurrence(anchor, 1), Some(date("2024-01-02")));
        assert_eq!(RecurrenceFrequency::Weekly.occurrence(anchor, 2), Some(date("2024-01-15")));
    }

    #[test]
    fn test_monthly_clamps_without_drift() {
        let anchor = date("2024-01-31");
        let monthly = RecurrenceFrequency::Monthly;
        assert_eq!(monthly.occurrence(anchor, 1), Some(date("2024-02-29")));
        assert_eq!(monthly.occurrence(anchor, 2), Some(date("2024-03-31")));
        assert_eq!(monthly.occurrence(anchor, 3), Some(date("2024-04-30")));
    }

    #[test]
    fn test_yearly_leap_day() {
        let anchor = date("2024-02-29");
        let yearly = RecurrenceFrequency::Yearly;
        assert_eq!(yearly.occurrence(anchor, 1), Some(date("2025-02-28")));
        assert_eq!(yearly.occurrence(anchor, 4), Some(date("2028-02-29")));
    }

    #[test]
    fn test_next_occurrence_after_anchor() {
        let anchor = date("2026-07-16");
        let monthly = RecurrenceFrequency::Monthly;
        assert_eq!(monthly.next_occurrence_after(anchor, anchor), Some(date("2026-08-16")));
        assert_eq!(
            monthly.next_occurrence_after(anchor, date("2026-08-16")),
            Some(date("2026-09-16"))
        );
        assert_eq!(
            monthly.next_occurrence_after(anchor, date("2026-08-20")),
            Some(date("2026-09-16"))
        );
    }

    #[test]
    fn test_next_occurrence_is_exact_for_every_frequency() {
        let anchor = date("2023-03-31");
        let after = date("2026-10-16");
        for frequency in [
            RecurrenceFrequency::Daily,
            RecurrenceFrequency::Weekly,
            RecurrenceFrequency::Monthly,
            RecurrenceFrequency::Yearly,
        ] {
            let next = frequency.next_occurrence_after(anchor, after).unwrap();
            assert!(next > after, "{} produced {}", frequency, next);

            // Walking from n = 1 must find the same date
            let mut n = 1;
            let walked = loop {
                let d = frequency.occurrence(anchor, n).unwrap();
                if d > after {
                    break d;
                }
                n += 1;
            };
            assert_eq!(next, walked, "{}", frequency);
        }
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!("monthly".parse::<RecurrenceFrequency>().unwrap(), RecurrenceFrequency::Monthly);
        assert!(matches!(
            "hourly".parse::<RecurrenceFrequency>(),
            Err(DomainError::InvalidRecurrence(_))
        ));
    }
}
