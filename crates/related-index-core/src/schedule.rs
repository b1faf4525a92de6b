//! Daily slot arithmetic for the replica scheduler.
//!
//! All times are UTC. The leader's rebuild slot precedes the follower's
//! sync slot so followers pull after the leader has had a chance to publish.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::models::ReplicaRole;

/// A wall-clock time of day (`HH:MM`, UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyTime {
    hour: u32,
    minute: u32,
}

impl DailyTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            bail!("invalid time of day {:02}:{:02}", hour, minute);
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DailyTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((h, m)) = s.trim().split_once(':') else {
            bail!("expected HH:MM, got '{}'", s);
        };
        DailyTime::new(h.parse()?, m.parse()?)
    }
}

impl<'de> Deserialize<'de> for DailyTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Default slot for each role: leader 09:00, follower 09:30.
pub fn default_slot(role: ReplicaRole) -> DailyTime {
    match role {
        ReplicaRole::Leader => DailyTime { hour: 9, minute: 0 },
        ReplicaRole::Follower => DailyTime { hour: 9, minute: 30 },
    }
}

/// First run: today at `at`, or tomorrow if that moment is already past.
pub fn next_run_after(now: DateTime<Utc>, at: DailyTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at.as_naive()).and_utc();
    if today < now {
        today + Duration::days(1)
    } else {
        today
    }
}

/// The slot after `previous`, skipping whole days until it lies after `now`.
///
/// A job that overran one or more slots resumes on the next future slot
/// instead of firing back to back.
pub fn following_run(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut next = previous + Duration::days(1);
    while next <= now {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn runs_later_today_when_slot_is_ahead() {
        let slot = DailyTime::new(9, 0).unwrap();
        assert_eq!(next_run_after(at(8, 59, 59), slot), at(9, 0, 0));
        assert_eq!(next_run_after(at(9, 0, 0), slot), at(9, 0, 0));
    }

    #[test]
    fn rolls_to_tomorrow_when_slot_has_passed() {
        let slot = DailyTime::new(9, 30).unwrap();
        let next = next_run_after(at(9, 30, 1), slot);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 9, 30, 0).unwrap());
    }

    #[test]
    fn overrun_skips_missed_slots() {
        let prev = at(9, 0, 0);
        let now = Utc.with_ymd_and_hms(2024, 3, 12, 10, 0, 0).unwrap();
        assert_eq!(
            following_run(prev, now),
            Utc.with_ymd_and_hms(2024, 3, 13, 9, 0, 0).unwrap()
        );
        assert_eq!(following_run(prev, at(9, 5, 0)), prev + Duration::days(1));
    }

    #[test]
    fn follower_slot_is_after_leader_slot() {
        assert!(default_slot(ReplicaRole::Follower) > default_slot(ReplicaRole::Leader));
    }

    #[test]
    fn parses_and_rejects_times() {
        assert_eq!("09:30".parse::<DailyTime>().unwrap(), DailyTime { hour: 9, minute: 30 });
        assert!("24:00".parse::<DailyTime>().is_err());
        assert!("0930".parse::<DailyTime>().is_err());
    }
}
