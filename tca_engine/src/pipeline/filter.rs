use chrono::NaiveTime;
use chrono_tz::Tz;

use super::TradeOrderFilter;
use crate::{
    models::{TagField, TradeTable},
    tz::local_time_of_day,
};

/// Keeps trades whose tag value is in `allowed`. Untagged trades are dropped.
#[derive(Debug, Clone)]
pub struct TagFilter {
    pub tag: TagField,
    pub allowed: Vec<String>,
}

impl TagFilter {
    pub fn new(tag: TagField, allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tag,
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl TradeOrderFilter for TagFilter {
    fn filter(&self, mut trades: TradeTable) -> TradeTable {
        trades
            .rows
            .retain(|r| r.tag(self.tag).is_some_and(|v| self.allowed.iter().any(|a| a == v)));
        trades
    }
}

/// Keeps trades whose local wall-clock time falls in `[start, finish]`.
///
/// When `start > finish` the window wraps midnight.
#[derive(Debug, Clone)]
pub struct TimeOfDayFilter {
    pub tz: Tz,
    pub start: NaiveTime,
    pub finish: NaiveTime,
}

impl TimeOfDayFilter {
    pub fn new(tz: Tz, start: NaiveTime, finish: NaiveTime) -> Self {
        Self { tz, start, finish }
    }

    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.finish {
            self.start <= t && t <= self.finish
        } else {
            t >= self.start || t <= self.finish
        }
    }
}

impl TradeOrderFilter for TimeOfDayFilter {
    fn filter(&self, mut trades: TradeTable) -> TradeTable {
        trades
            .rows
            .retain(|r| self.contains(local_time_of_day(r.timestamp, self.tz)));
        trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, TradeOrderKind, TradeRecord};
    use chrono::{TimeZone, Utc};

    fn table() -> TradeTable {
        let at = |h| Utc.with_ymd_and_hms(2024, 1, 5, h, 0, 0).unwrap();
        TradeTable::new(
            TradeOrderKind::Trade,
            vec![
                TradeRecord::new("a", at(8), Side::Buy, 1.0, 1.0).with_venue("ebs"),
                TradeRecord::new("b", at(14), Side::Buy, 1.0, 1.0).with_venue("reuters"),
                TradeRecord::new("c", at(22), Side::Buy, 1.0, 1.0),
            ],
        )
    }

    #[test]
    fn tag_filter_drops_untagged_and_unlisted() {
        let out = TagFilter::new(TagField::Venue, ["ebs"]).filter(table());
        let ids: Vec<&str> = out.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn time_of_day_uses_local_clock() {
        // 14:00 UTC is 09:00 in New York (EST) in January.
        let f = TimeOfDayFilter::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let out = f.filter(table());
        let ids: Vec<&str> = out.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn time_of_day_wraps_midnight() {
        let f = TimeOfDayFilter::new(
            chrono_tz::UTC,
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );
        let out = f.filter(table());
        let ids: Vec<&str> = out.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
