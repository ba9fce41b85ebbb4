use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::models::common::serialize_record_id;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Monday = 1 ... Sunday = 7, matching chrono's numbering.
    pub fn number_from_monday(&self) -> u32 {
        match self {
            Weekday::Monday => 1,
            Weekday::Tuesday => 2,
            Weekday::Wednesday => 3,
            Weekday::Thursday => 4,
            Weekday::Friday => 5,
            Weekday::Saturday => 6,
            Weekday::Sunday => 7,
        }
    }
}

/// One entry of a weekly schedule: "every Monday at 18:00".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recurrence {
    /// A single occurrence on the template's start date.
    OneOff { start_time: NaiveTime },
    /// Repeats weekly over the template's date range.
    Weekly { slots: Vec<WeeklySlot> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTemplate {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_record_id",
        default
    )]
    pub id: Option<Thing>,
    pub tenant_id: String,
    pub title: String,
    pub capacity: i64,
    pub recurrence: Recurrence,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub instructor_id: Option<String>,
    pub price_minor_units: i64,
    pub duration_minutes: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassTemplateRequest {
    #[validate(length(min = 2, max = 200, message = "Title must be between 2 and 200 characters"))]
    pub title: String,
    #[validate(range(min = 1, message = "Capacity must be at least 1"))]
    pub capacity: i64,
    pub recurrence: Recurrence,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub instructor_id: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_minor_units: i64,
    #[validate(range(min = 15, max = 480, message = "Duration must be between 15 and 480 minutes"))]
    pub duration_minutes: i64,
}

impl ClassTemplate {
    pub fn new(tenant_id: String, request: CreateClassTemplateRequest) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            tenant_id,
            title: request.title,
            capacity: request.capacity,
            recurrence: request.recurrence,
            start_date: request.start_date,
            end_date: request.end_date,
            instructor_id: request.instructor_id,
            price_minor_units: request.price_minor_units,
            duration_minutes: request.duration_minutes,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn check_rules(&self) -> Result<(), String> {
        if self.end_date < self.start_date {
            return Err("End date must not be before start date".to_string());
        }
        if let Recurrence::Weekly { slots } = &self.recurrence {
            if slots.is_empty() {
                return Err("Weekly recurrence requires at least one slot".to_string());
            }
        }
        Ok(())
    }
}

/// chrono's weekday for a date, as Monday = 1 ... Sunday = 7.
pub fn weekday_number(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(recurrence: Recurrence, start: NaiveDate, end: NaiveDate) -> ClassTemplate {
        ClassTemplate::new(
            "studio-a".to_string(),
            CreateClassTemplateRequest {
                title: "Ballet beginners".to_string(),
                capacity: 12,
                recurrence,
                start_date: start,
                end_date: end,
                instructor_id: None,
                price_minor_units: 15_000,
                duration_minutes: 60,
            },
        )
    }

    #[test]
    fn test_reversed_date_range_rejected() {
        let t = template(
            Recurrence::OneOff {
                start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
            NaiveDate::from_ymd_opt(2026, 9, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        );
        assert!(t.check_rules().is_err());
    }

    #[test]
    fn test_empty_weekly_schedule_rejected() {
        let t = template(
            Recurrence::Weekly { slots: vec![] },
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        );
        assert!(t.check_rules().is_err());
    }

    #[test]
    fn test_weekday_numbers_align_with_chrono() {
        // 2026-08-31 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 8, 31).unwrap();
        assert_eq!(weekday_number(monday), Weekday::Monday.number_from_monday());
        assert_eq!(weekday_number(monday.succ_opt().unwrap()), 2);
    }
}
