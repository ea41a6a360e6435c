//! Weekly slot templates.
//!
//! A template maps weekdays to lists of `HH:MM` time ranges. The Template
//! Expander turns the store's active template into concrete slots.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::id::{StoreId, TemplateId};

/// Template status. A store has at most one active template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Active,
    Inactive,
}

impl fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateStatus::Active => write!(f, "active"),
            TemplateStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TemplateStatus::Active),
            "inactive" => Ok(TemplateStatus::Inactive),
            other => Err(format!("invalid template status: '{other}'")),
        }
    }
}

/// A half-open `[start, end)` window within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid time range '{s}': expected HH:MM-HH:MM"))?;
        Ok(Self {
            start: hhmm::parse(start.trim())?,
            end: hhmm::parse(end.trim())?,
        })
    }

    /// Ranges that merely touch (`09:00-10:00`, `10:00-11:00`) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format(hhmm::FORMAT),
            self.end.format(hhmm::FORMAT)
        )
    }
}

/// The time ranges offered on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayRule {
    pub weekday: Weekday,
    pub ranges: Vec<TimeRange>,
}

/// A named per-store weekly pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub store_id: StoreId,
    pub name: String,
    pub status: TemplateStatus,
    pub rules: Vec<WeekdayRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Ranges for the given weekday, or an empty slice if the store is closed that day.
    pub fn ranges_for(&self, weekday: Weekday) -> &[TimeRange] {
        self.rules
            .iter()
            .find(|r| r.weekday == weekday)
            .map(|r| r.ranges.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_active(&self) -> bool {
        self.status == TemplateStatus::Active
    }
}

/// Validate a template's name and rules.
///
/// Each weekday may appear once. Within a weekday every range must have
/// `start < end` and no two ranges may overlap.
pub fn validate_rules(name: &str, rules: &[WeekdayRule]) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("template name cannot be empty".to_string());
    }

    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.weekday) {
            return Err(format!("weekday {} appears more than once", rule.weekday));
        }

        let mut sorted = rule.ranges.clone();
        sorted.sort_by_key(|r| r.start);
        for range in &sorted {
            if range.start >= range.end {
                return Err(format!(
                    "range {range} on {} must start before it ends",
                    rule.weekday
                ));
            }
        }
        for pair in sorted.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(format!(
                    "ranges {} and {} on {} overlap",
                    pair[0], pair[1], rule.weekday
                ));
            }
        }
    }

    Ok(())
}

/// Request to create a new template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub store_id: StoreId,
    pub name: String,
    pub rules: Vec<WeekdayRule>,
    /// Activate immediately, deactivating the store's other templates.
    #[serde(default)]
    pub activate: bool,
}

/// Partial template update. Absent or empty fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<WeekdayRule>>,
    /// `Active` goes through activation, deactivating the store's others.
    #[serde(default)]
    pub status: Option<TemplateStatus>,
}

/// `HH:MM` serde helpers for [`NaiveTime`].
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(s: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(s, FORMAT).map_err(|e| format!("invalid time '{s}': {e}"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> TimeRange {
        TimeRange::parse(s).unwrap()
    }

    #[test]
    fn test_touching_ranges_are_valid() {
        let rules = vec![WeekdayRule {
            weekday: Weekday::Mon,
            ranges: vec![range("10:00-11:00"), range("09:00-10:00")],
        }];
        assert!(validate_rules("weekday", &rules).is_ok());
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let rules = vec![WeekdayRule {
            weekday: Weekday::Tue,
            ranges: vec![range("09:00-10:30"), range("10:00-11:00")],
        }];
        let err = validate_rules("weekday", &rules).unwrap_err();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let rules = vec![WeekdayRule {
            weekday: Weekday::Wed,
            ranges: vec![range("11:00-10:00")],
        }];
        assert!(validate_rules("weekday", &rules).is_err());

        let empty = vec![WeekdayRule {
            weekday: Weekday::Wed,
            ranges: vec![range("10:00-10:00")],
        }];
        assert!(validate_rules("weekday", &empty).is_err());
    }

    #[test]
    fn test_duplicate_weekday_rejected() {
        let rules = vec![
            WeekdayRule {
                weekday: Weekday::Fri,
                ranges: vec![range("09:00-10:00")],
            },
            WeekdayRule {
                weekday: Weekday::Fri,
                ranges: vec![range("14:00-15:00")],
            },
        ];
        assert!(validate_rules("weekday", &rules).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_rules("  ", &[]).is_err());
        assert!(validate_rules("closed", &[]).is_ok());
    }

    #[test]
    fn test_time_range_serializes_as_hhmm() {
        let r = range("09:00-10:30");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"start":"09:00","end":"10:30"}"#);
        let parsed: TimeRange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r);
        assert_eq!(r.to_string(), "09:00-10:30");
    }

    #[test]
    fn test_time_range_parse_rejects_garbage() {
        assert!(TimeRange::parse("9am").is_err());
        assert!(TimeRange::parse("25:00-26:00").is_err());
    }

    #[test]
    fn test_ranges_for_missing_weekday_is_empty() {
        let template = Template {
            id: TemplateId::new(),
            store_id: StoreId::new(),
            name: "weekdays".into(),
            status: TemplateStatus::Active,
            rules: vec![WeekdayRule {
                weekday: Weekday::Mon,
                ranges: vec![range("09:00-10:00")],
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(template.ranges_for(Weekday::Mon).len(), 1);
        assert!(template.ranges_for(Weekday::Sun).is_empty());
    }
}
