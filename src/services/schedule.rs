use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::error::ApiError;
use crate::models::class_instance::ClassInstance;
use crate::models::class_template::{weekday_number, ClassTemplate, Recurrence};
use crate::services::database::DatabaseService;

/// Expands a template's recurrence rule into concrete occurrence times.
///
/// Weekly rules walk the date range in 7-day steps; each slot is adjusted to
/// its weekday within that week, and only dates inside the template's range
/// are kept. All times are interpreted as UTC.
pub fn expand_occurrences(template: &ClassTemplate) -> Vec<DateTime<Utc>> {
    let mut occurrences = Vec::new();

    match &template.recurrence {
        Recurrence::OneOff { start_time } => {
            occurrences.push(template.start_date.and_time(*start_time).and_utc());
        }
        Recurrence::Weekly { slots } => {
            let mut week_start = template.start_date;
            while week_start <= template.end_date {
                for slot in slots {
                    let offset = (slot.weekday.number_from_monday() + 7
                        - weekday_number(week_start))
                        % 7;
                    let date = week_start + Duration::days(offset as i64);
                    if date >= template.start_date && date <= template.end_date {
                        occurrences.push(date.and_time(slot.start_time).and_utc());
                    }
                }
                week_start += Duration::days(7);
            }
        }
    }

    occurrences.sort();
    occurrences
}

/// Generates, cancels, and deletes the concrete occurrences of class
/// templates.
#[derive(Clone)]
pub struct ScheduleService {
    db: DatabaseService,
}

impl ScheduleService {
    pub fn new(db: DatabaseService) -> Self {
        Self { db }
    }

    /// Materializes every occurrence of a template as a bookable instance,
    /// each starting empty with the template's capacity. Occurrences that
    /// already have an instance are skipped, so re-running after adding slots
    /// or widening the range only fills the gaps.
    pub async fn generate_instances(
        &self,
        tenant_id: &str,
        template_key: &str,
    ) -> Result<Vec<ClassInstance>, ApiError> {
        let template = self
            .db
            .get_template(tenant_id, template_key)
            .await?
            .ok_or(ApiError::NotFound("Class template"))?;

        if !template.is_active {
            return Err(ApiError::Validation(
                "Cannot generate instances for an inactive template".to_string(),
            ));
        }

        let existing: HashSet<DateTime<Utc>> = self
            .db
            .list_instances(tenant_id, Some(template_key))
            .await?
            .iter()
            .map(|instance| instance.scheduled_at)
            .collect();

        let mut instances = Vec::new();
        for scheduled_at in expand_occurrences(&template) {
            if existing.contains(&scheduled_at) {
                continue;
            }
            let instance =
                ClassInstance::from_template(&template, template_key.to_string(), scheduled_at);
            instances.push(self.db.create_instance(&instance).await?);
        }

        log::info!(
            "generated {} instances for template {} in tenant {}",
            instances.len(),
            template_key,
            tenant_id
        );
        Ok(instances)
    }

    /// Cancels a single instance. Idempotent: re-cancelling returns the
    /// instance unchanged, keeping the original reason.
    pub async fn cancel_instance(
        &self,
        tenant_id: &str,
        instance_key: &str,
        reason: Option<String>,
    ) -> Result<ClassInstance, ApiError> {
        if let Some(cancelled) = self
            .db
            .cancel_instance_if_scheduled(tenant_id, instance_key, reason)
            .await?
        {
            return Ok(cancelled);
        }

        // The conditional update did not fire: either the instance is already
        // cancelled (fine) or it does not exist in this tenant.
        self.db
            .get_instance(tenant_id, instance_key)
            .await?
            .ok_or(ApiError::NotFound("Class instance"))
    }

    /// Cancels all future instances of a template and reports how many were
    /// affected. Past instances stay untouched.
    pub async fn cancel_series(
        &self,
        tenant_id: &str,
        template_key: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassInstance>, ApiError> {
        if self.db.get_template(tenant_id, template_key).await?.is_none() {
            return Err(ApiError::NotFound("Class template"));
        }

        let cancelled = self
            .db
            .cancel_future_instances(tenant_id, template_key, reason, now)
            .await?;
        log::info!(
            "cancelled {} future instances of template {} in tenant {}",
            cancelled.len(),
            template_key,
            tenant_id
        );
        Ok(cancelled)
    }

    /// Hard-deletes an instance, cascading to its bookings. Returns the number
    /// of bookings removed.
    pub async fn delete_instance(
        &self,
        tenant_id: &str,
        instance_key: &str,
    ) -> Result<u64, ApiError> {
        self.db
            .delete_instance_with_bookings(tenant_id, instance_key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::class_template::{
        CreateClassTemplateRequest, Recurrence, Weekday, WeeklySlot,
    };
    use crate::models::common::record_key;
    use chrono::{NaiveDate, NaiveTime, Timelike};

    fn weekly_template(
        slots: Vec<WeeklySlot>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ClassTemplate {
        ClassTemplate::new(
            "studio-a".to_string(),
            CreateClassTemplateRequest {
                title: "Contemporary".to_string(),
                capacity: 10,
                recurrence: Recurrence::Weekly { slots },
                start_date: start,
                end_date: end,
                instructor_id: None,
                price_minor_units: 12_500,
                duration_minutes: 60,
            },
        )
    }

    #[test]
    fn test_weekly_monday_over_two_weeks() {
        // 2026-09-07 is a Monday; a 14-day range starting on a Monday with a
        // single Monday slot yields exactly 2 occurrences, 7 days apart.
        let start = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let template = weekly_template(
            vec![WeeklySlot {
                weekday: Weekday::Monday,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            }],
            start,
            start + Duration::days(13),
        );

        let occurrences = expand_occurrences(&template);
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[1] - occurrences[0], Duration::days(7));
        assert_eq!(occurrences[0].hour(), 18);
        assert_eq!(occurrences[1].hour(), 18);
    }

    #[test]
    fn test_slot_before_range_start_is_skipped() {
        // Range starts on a Wednesday; the Monday slot of that first week
        // falls before the range and must not be emitted.
        let start = NaiveDate::from_ymd_opt(2026, 9, 9).unwrap(); // Wednesday
        let template = weekly_template(
            vec![WeeklySlot {
                weekday: Weekday::Monday,
                start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            }],
            start,
            start + Duration::days(20),
        );

        let occurrences = expand_occurrences(&template);
        // Mondays at +5 and +12 days fall inside; +19 is a Monday too.
        assert_eq!(occurrences.len(), 3);
        for occurrence in &occurrences {
            assert!(occurrence.date_naive() >= start);
        }
    }

    #[test]
    fn test_multiple_slots_per_week() {
        let start = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap(); // Monday
        let template = weekly_template(
            vec![
                WeeklySlot {
                    weekday: Weekday::Monday,
                    start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                },
                WeeklySlot {
                    weekday: Weekday::Thursday,
                    start_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
                },
            ],
            start,
            start + Duration::days(6),
        );

        let occurrences = expand_occurrences(&template);
        assert_eq!(occurrences.len(), 2);
        assert!(occurrences[0] < occurrences[1]);
    }

    #[test]
    fn test_one_off_emits_single_occurrence() {
        let start = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let mut template = weekly_template(vec![], start, start);
        template.recurrence = Recurrence::OneOff {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };

        let occurrences = expand_occurrences(&template);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].date_naive(), start);
    }

    async fn setup() -> (DatabaseService, ScheduleService) {
        let db = DatabaseService::new("memory://").await.unwrap();
        (db.clone(), ScheduleService::new(db))
    }

    #[tokio::test]
    async fn test_generate_persists_empty_instances() {
        let (db, schedule) = setup().await;
        let start = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let template = weekly_template(
            vec![WeeklySlot {
                weekday: Weekday::Monday,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            }],
            start,
            start + Duration::days(13),
        );
        let created = db.create_template(&template).await.unwrap();
        let template_key = record_key(&created.id);

        let instances = schedule
            .generate_instances("studio-a", &template_key)
            .await
            .unwrap();
        assert_eq!(instances.len(), 2);
        for instance in &instances {
            assert_eq!(instance.booked_count, 0);
            assert_eq!(instance.capacity, 10);
            assert!(!instance.is_cancelled);
        }

        let listed = db
            .list_instances("studio-a", Some(&template_key))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_regenerate_does_not_duplicate_instances() {
        let (db, schedule) = setup().await;
        let start = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let template = weekly_template(
            vec![WeeklySlot {
                weekday: Weekday::Monday,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            }],
            start,
            start + Duration::days(13),
        );
        let created = db.create_template(&template).await.unwrap();
        let template_key = record_key(&created.id);

        let first = schedule
            .generate_instances("studio-a", &template_key)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = schedule
            .generate_instances("studio-a", &template_key)
            .await
            .unwrap();
        assert!(second.is_empty());

        let listed = db
            .list_instances("studio-a", Some(&template_key))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_instance_is_idempotent_and_keeps_reason() {
        let (db, schedule) = setup().await;
        let start = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let mut template = weekly_template(vec![], start, start);
        template.recurrence = Recurrence::OneOff {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let created = db.create_template(&template).await.unwrap();
        let template_key = record_key(&created.id);

        let instances = schedule
            .generate_instances("studio-a", &template_key)
            .await
            .unwrap();
        let key = instances[0].key();

        let cancelled = schedule
            .cancel_instance("studio-a", &key, Some("Instructor ill".to_string()))
            .await
            .unwrap();
        assert!(cancelled.is_cancelled);
        assert_eq!(
            cancelled.cancellation_reason.as_deref(),
            Some("Instructor ill")
        );

        let again = schedule
            .cancel_instance("studio-a", &key, Some("Different reason".to_string()))
            .await
            .unwrap();
        assert!(again.is_cancelled);
        assert_eq!(again.cancellation_reason.as_deref(), Some("Instructor ill"));
    }

    #[tokio::test]
    async fn test_cancel_series_only_touches_future_instances() {
        let (db, schedule) = setup().await;
        let now = Utc::now();

        // 3 future instances and 1 past one, created directly.
        let start = NaiveDate::from_ymd_opt(2026, 9, 7).unwrap();
        let template = weekly_template(vec![], start, start);
        let created = db.create_template(&template).await.unwrap();
        let template_key = record_key(&created.id);

        for days in [-7i64, 1, 8, 15] {
            let instance = ClassInstance::from_template(
                &template,
                template_key.clone(),
                now + Duration::days(days),
            );
            db.create_instance(&instance).await.unwrap();
        }

        let cancelled = schedule
            .cancel_series("studio-a", &template_key, Some("Studio closed".to_string()), now)
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 3);

        let all = db
            .list_instances("studio-a", Some(&template_key))
            .await
            .unwrap();
        let past_still_scheduled = all
            .iter()
            .filter(|i| i.scheduled_at < now && !i.is_cancelled)
            .count();
        assert_eq!(past_still_scheduled, 1);
    }

    #[tokio::test]
    async fn test_delete_instance_cascades_to_bookings() {
        use crate::models::booking::Booking;

        let (db, schedule) = setup().await;
        let start = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let mut template = weekly_template(vec![], start, start);
        template.recurrence = Recurrence::OneOff {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let created = db.create_template(&template).await.unwrap();
        let instances = schedule
            .generate_instances("studio-a", &record_key(&created.id))
            .await
            .unwrap();
        let key = instances[0].key();

        let booking = Booking::new(
            "studio-a".to_string(),
            "user-1".to_string(),
            key.clone(),
            "sub-1".to_string(),
        );
        let booking = db.create_booking(&booking).await.unwrap();

        let removed = schedule.delete_instance("studio-a", &key).await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_instance("studio-a", &key).await.unwrap().is_none());
        assert!(db
            .get_booking("studio-a", &booking.key())
            .await
            .unwrap()
            .is_none());
    }
}
