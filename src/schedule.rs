//! Poll scheduling for feedrelay.
//!
//! This module decides whether a feed is due for polling for a given
//! frequency, based on the frequency's policy and the last poll time.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;

/// A named polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Near-real-time polling on a minimum interval.
    Instant,
    /// Once per day at a fixed clock time.
    Daily,
    /// Once per week at a fixed clock time on a fixed weekday.
    Weekly,
}

impl Frequency {
    /// All known frequencies, in processing order.
    pub const ALL: [Frequency; 3] = [Frequency::Instant, Frequency::Daily, Frequency::Weekly];

    /// Parse a frequency name.
    ///
    /// Unknown names return `None`; callers treat such frequencies as
    /// never due rather than as errors.
    pub fn from_name(name: &str) -> Option<Frequency> {
        match name {
            "instant" => Some(Frequency::Instant),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            _ => None,
        }
    }

    /// The canonical name used in tags and template lookups.
    pub fn name(&self) -> &'static str {
        match self {
            Frequency::Instant => "instant",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    /// Whether this frequency delivers per-article notifications
    /// (as opposed to per-subscriber digests).
    pub fn is_instant(&self) -> bool {
        matches!(self, Frequency::Instant)
    }

    /// Build the scheduling policy for this frequency.
    pub fn policy(&self, config: &ScheduleConfig) -> PollPolicy {
        match self {
            Frequency::Instant => {
                PollPolicy::Interval(Duration::minutes(config.instant_interval_minutes))
            }
            Frequency::Daily => PollPolicy::FixedTime {
                hour: config.daily_hour,
                minute: config.daily_minute,
                weekday: None,
            },
            Frequency::Weekly => PollPolicy::FixedTime {
                hour: config.weekly_hour,
                minute: config.weekly_minute,
                weekday: Some(parse_weekday(&config.weekly_day)),
            },
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scheduling policy for a frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPolicy {
    /// Re-poll after the given minimum interval has elapsed.
    Interval(Duration),
    /// Re-poll once per cycle at a fixed clock time, optionally
    /// restricted to a weekday.
    FixedTime {
        /// Hour of day (0-23) in the configured timezone.
        hour: u32,
        /// Minute of hour.
        minute: u32,
        /// Required weekday; `None` means every day.
        weekday: Option<Weekday>,
    },
}

/// Parse a weekday name, defaulting to Monday.
pub fn parse_weekday(name: &str) -> Weekday {
    match name.to_lowercase().as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => Weekday::Mon,
    }
}

/// Decide whether a feed is due for polling.
///
/// Interval policies are due when no poll has happened yet, or strictly
/// more than the interval has elapsed.
///
/// Fixed-time policies use one deterministic rule: on a non-matching
/// weekday the feed is never due; otherwise the feed is due once `now`
/// has passed today's target clock time (in `tz`) and the last poll
/// happened before that target. This yields at most one due signal per
/// calendar cycle, and after process downtime exactly one catch-up poll
/// fires rather than a backlog.
pub fn should_poll(
    policy: &PollPolicy,
    last_poll: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: Tz,
) -> bool {
    match policy {
        PollPolicy::Interval(interval) => match last_poll {
            None => true,
            Some(last) => now.signed_duration_since(last) > *interval,
        },
        PollPolicy::FixedTime {
            hour,
            minute,
            weekday,
        } => {
            let local_now = now.with_timezone(&tz);
            if let Some(day) = weekday {
                if local_now.weekday() != *day {
                    return false;
                }
            }
            let target_naive = match local_now.date_naive().and_hms_opt(*hour, *minute, 0) {
                Some(naive) => naive,
                None => return false,
            };
            // A DST gap can make the target unrepresentable for one day;
            // the next cycle resolves normally.
            let target = match tz.from_local_datetime(&target_naive).earliest() {
                Some(target) => target.with_timezone(&Utc),
                None => return false,
            };
            if now < target {
                return false;
            }
            match last_poll {
                None => true,
                Some(last) => last < target,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_frequency_name_round_trip() {
        for freq in Frequency::ALL {
            assert_eq!(Frequency::from_name(freq.name()), Some(freq));
        }
    }

    #[test]
    fn test_frequency_unknown_name() {
        assert_eq!(Frequency::from_name("hourly"), None);
        assert_eq!(Frequency::from_name(""), None);
        assert_eq!(Frequency::from_name("Instant"), None);
    }

    #[test]
    fn test_interval_never_polled() {
        let policy = PollPolicy::Interval(Duration::minutes(5));
        assert!(should_poll(&policy, None, utc(2024, 1, 15, 12, 0), Tz::UTC));
    }

    #[test]
    fn test_interval_law() {
        // 5-minute interval: false at +4m, true at +6m
        let policy = PollPolicy::Interval(Duration::minutes(5));
        let last = utc(2024, 1, 15, 12, 0);
        assert!(!should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 15, 12, 4),
            Tz::UTC
        ));
        assert!(should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 15, 12, 6),
            Tz::UTC
        ));
    }

    #[test]
    fn test_interval_exact_boundary_not_due() {
        let policy = PollPolicy::Interval(Duration::minutes(5));
        let last = utc(2024, 1, 15, 12, 0);
        assert!(!should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 15, 12, 5),
            Tz::UTC
        ));
    }

    #[test]
    fn test_fixed_time_before_target() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: None,
        };
        assert!(!should_poll(&policy, None, utc(2024, 1, 15, 7, 59), Tz::UTC));
    }

    #[test]
    fn test_fixed_time_after_target_never_polled() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: None,
        };
        assert!(should_poll(&policy, None, utc(2024, 1, 15, 8, 1), Tz::UTC));
    }

    #[test]
    fn test_fixed_time_once_per_cycle() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: None,
        };
        // Polled at 08:01 today: not due again today
        let last = utc(2024, 1, 15, 8, 1);
        assert!(!should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 15, 12, 0),
            Tz::UTC
        ));
        // Due again once tomorrow's target has passed
        assert!(should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 16, 8, 1),
            Tz::UTC
        ));
    }

    #[test]
    fn test_fixed_time_catch_up_after_downtime() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: None,
        };
        // Last polled three days ago; one catch-up signal fires now
        let last = utc(2024, 1, 12, 8, 2);
        let now = utc(2024, 1, 15, 14, 30);
        assert!(should_poll(&policy, Some(last), now, Tz::UTC));
        // After that poll, the same day yields no further signals
        assert!(!should_poll(&policy, Some(now), utc(2024, 1, 15, 18, 0), Tz::UTC));
    }

    #[test]
    fn test_weekly_wrong_weekday_never_due() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: Some(Weekday::Mon),
        };
        // 2024-01-16 is a Tuesday; never due, even long after the target
        assert!(!should_poll(&policy, None, utc(2024, 1, 16, 23, 0), Tz::UTC));
    }

    #[test]
    fn test_weekly_on_weekday() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: Some(Weekday::Mon),
        };
        // 2024-01-15 is a Monday
        assert!(should_poll(&policy, None, utc(2024, 1, 15, 8, 30), Tz::UTC));
        // Polled this cycle: not due later the same day
        let last = utc(2024, 1, 15, 8, 30);
        assert!(!should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 15, 20, 0),
            Tz::UTC
        ));
        // Due again the following Monday
        assert!(should_poll(
            &policy,
            Some(last),
            utc(2024, 1, 22, 8, 30),
            Tz::UTC
        ));
    }

    #[test]
    fn test_fixed_time_respects_timezone() {
        let policy = PollPolicy::FixedTime {
            hour: 8,
            minute: 0,
            weekday: None,
        };
        // 08:00 in Tokyo is 23:00 UTC the previous day
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        assert!(!should_poll(&policy, None, utc(2024, 1, 14, 22, 0), tz));
        assert!(should_poll(&policy, None, utc(2024, 1, 14, 23, 30), tz));
    }

    #[test]
    fn test_policy_from_config() {
        let config = ScheduleConfig::default();
        assert_eq!(
            Frequency::Instant.policy(&config),
            PollPolicy::Interval(Duration::minutes(5))
        );
        assert_eq!(
            Frequency::Weekly.policy(&config),
            PollPolicy::FixedTime {
                hour: 8,
                minute: 0,
                weekday: Some(Weekday::Mon),
            }
        );
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("sunday"), Weekday::Sun);
        assert_eq!(parse_weekday("Fri"), Weekday::Fri);
        assert_eq!(parse_weekday("unknown"), Weekday::Mon);
    }
}
