//! Transmission schedules for the published message groups.
//!
//! Every group has its own period and an initial offset. Offsets stagger
//! groups that share a period so they do not all hit the bus on the same
//! tick. Schedules stay unarmed until the bus has claimed an address; at
//! that point [`ScheduleSet::reset_all`] anchors them to the current time.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A periodic timer polled from the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitSchedule {
    period: Duration,
    offset: Duration,
    next_due: Option<Instant>,
}

impl TransmitSchedule {
    pub fn new(period_ms: u32, offset_ms: u32) -> Self {
        Self {
            period: Duration::from_millis(u64::from(period_ms)),
            offset: Duration::from_millis(u64::from(offset_ms)),
            next_due: None,
        }
    }

    /// Re-anchor: first due time is `now + offset`.
    pub fn reset(&mut self, now: Instant) {
        self.next_due = Some(now + self.offset);
    }

    /// True when the schedule is armed and its due time has passed.
    pub fn is_time(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    /// Advance by exactly one period from the previous due time, so
    /// processing jitter does not accumulate into drift.
    pub fn update_next_time(&mut self) {
        if let Some(due) = self.next_due.as_mut() {
            *due += self.period;
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Message groups with their own schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageGroup {
    Heading,
    Attitude,
    Wind,
    WaterSpeed,
    Gnss,
}

impl fmt::Display for MessageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageGroup::Heading => "heading",
            MessageGroup::Attitude => "attitude",
            MessageGroup::Wind => "wind",
            MessageGroup::WaterSpeed => "water speed",
            MessageGroup::Gnss => "gnss",
        };
        f.write_str(name)
    }
}

/// Period and offset of one group, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    pub period_ms: u32,
    pub offset_ms: u32,
}

impl ScheduleSpec {
    pub const fn new(period_ms: u32, offset_ms: u32) -> Self {
        Self {
            period_ms,
            offset_ms,
        }
    }
}

/// Schedule configuration for every group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    pub heading: ScheduleSpec,
    pub attitude: ScheduleSpec,
    pub wind: ScheduleSpec,
    pub water_speed: ScheduleSpec,
    pub gnss: ScheduleSpec,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            heading: ScheduleSpec::new(100, 0),
            attitude: ScheduleSpec::new(1000, 0),
            wind: ScheduleSpec::new(1000, 500),
            water_speed: ScheduleSpec::new(1000, 600),
            gnss: ScheduleSpec::new(1000, 300),
        }
    }
}

impl ScheduleConfig {
    pub fn spec(&self, group: MessageGroup) -> ScheduleSpec {
        match group {
            MessageGroup::Heading => self.heading,
            MessageGroup::Attitude => self.attitude,
            MessageGroup::Wind => self.wind,
            MessageGroup::WaterSpeed => self.water_speed,
            MessageGroup::Gnss => self.gnss,
        }
    }
}

/// The schedules of the groups a node publishes.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSet {
    entries: Vec<(MessageGroup, TransmitSchedule)>,
}

impl ScheduleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build schedules for `groups` from the configuration.
    pub fn from_config(config: &ScheduleConfig, groups: &[MessageGroup]) -> Self {
        let mut set = Self::new();
        for &group in groups {
            let spec = config.spec(group);
            set.insert(group, TransmitSchedule::new(spec.period_ms, spec.offset_ms));
        }
        set
    }

    pub fn insert(&mut self, group: MessageGroup, schedule: TransmitSchedule) {
        self.entries.retain(|(g, _)| *g != group);
        self.entries.push((group, schedule));
    }

    /// Anchor every schedule at `now`.
    pub fn reset_all(&mut self, now: Instant) {
        for (_, schedule) in &mut self.entries {
            schedule.reset(now);
        }
    }

    /// Groups due at `now`. Each returned group's schedule has been advanced
    /// by exactly one period.
    pub fn due(&mut self, now: Instant) -> Vec<MessageGroup> {
        let mut due = Vec::new();
        for (group, schedule) in &mut self.entries {
            if schedule.is_time(now) {
                schedule.update_next_time();
                due.push(*group);
            }
        }
        due
    }

    pub fn get(&self, group: MessageGroup) -> Option<&TransmitSchedule> {
        self.entries
            .iter()
            .find(|(g, _)| *g == group)
            .map(|(_, s)| s)
    }

    pub fn groups(&self) -> impl Iterator<Item = MessageGroup> + '_ {
        self.entries.iter().map(|(g, _)| *g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unarmed_schedule_never_fires() {
        let schedule = TransmitSchedule::new(100, 0);
        let now = Instant::now();
        assert!(!schedule.is_time(now));
        assert!(!schedule.is_time(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_offset_and_period() {
        let t0 = Instant::now();
        let mut schedule = TransmitSchedule::new(1000, 500);
        schedule.reset(t0);

        assert!(!schedule.is_time(t0 + Duration::from_millis(499)));
        assert!(schedule.is_time(t0 + Duration::from_millis(500)));
        schedule.update_next_time();
        assert_eq!(schedule.next_due(), Some(t0 + Duration::from_millis(1500)));
    }

    #[test]
    fn test_no_drift_from_late_polling() {
        let t0 = Instant::now();
        let mut schedule = TransmitSchedule::new(100, 0);
        schedule.reset(t0);

        // Polled 30 ms late: next due stays on the 100 ms grid
        assert!(schedule.is_time(t0 + Duration::from_millis(30)));
        schedule.update_next_time();
        assert_eq!(schedule.next_due(), Some(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_fires_once_per_period() {
        let t0 = Instant::now();
        let mut set = ScheduleSet::new();
        set.insert(MessageGroup::Heading, TransmitSchedule::new(100, 0));
        set.reset_all(t0);

        let mut fired = 0;
        for ms in 0..1000 {
            fired += set.due(t0 + Duration::from_millis(ms)).len();
        }
        assert_eq!(fired, 10);
    }

    #[test]
    fn test_staggered_schedules_never_collide() {
        let t0 = Instant::now();
        let mut set = ScheduleSet::new();
        set.insert(MessageGroup::Wind, TransmitSchedule::new(1000, 500));
        set.insert(MessageGroup::WaterSpeed, TransmitSchedule::new(1000, 600));
        set.reset_all(t0);

        let mut wind_ticks = Vec::new();
        let mut water_ticks = Vec::new();
        for ms in 0..=2000 {
            let due = set.due(t0 + Duration::from_millis(ms));
            assert!(due.len() <= 1, "groups collided at {} ms: {:?}", ms, due);
            for group in due {
                match group {
                    MessageGroup::Wind => wind_ticks.push(ms),
                    MessageGroup::WaterSpeed => water_ticks.push(ms),
                    _ => unreachable!(),
                }
            }
        }
        assert_eq!(wind_ticks, vec![500, 1500]);
        assert_eq!(water_ticks, vec![600, 1600]);
    }

    #[test]
    fn test_default_config_groups() {
        let set = ScheduleSet::from_config(
            &ScheduleConfig::default(),
            &[MessageGroup::Heading, MessageGroup::Wind],
        );
        assert_eq!(set.groups().collect::<Vec<_>>(), vec![MessageGroup::Heading, MessageGroup::Wind]);
        assert_eq!(
            set.get(MessageGroup::Heading).map(|s| s.period()),
            Some(Duration::from_millis(100))
        );
        assert!(set.get(MessageGroup::Attitude).is_none());
    }
}
