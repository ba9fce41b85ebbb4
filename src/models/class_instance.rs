use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::models::class_template::ClassTemplate;
use crate::models::common::{record_key, serialize_record_id};

/// One concrete scheduled occurrence of a class template. Capacity is copied
/// from the template at generation time; `booked_count` is the single
/// authoritative counter, maintained only through conditional updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInstance {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_record_id",
        default
    )]
    pub id: Option<Thing>,
    pub tenant_id: String,
    pub template_id: String,
    pub title: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub capacity: i64,
    pub booked_count: i64,
    pub is_cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CancelInstanceRequest {
    pub reason: Option<String>,
}

impl ClassInstance {
    pub fn from_template(
        template: &ClassTemplate,
        template_key: String,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            tenant_id: template.tenant_id.clone(),
            template_id: template_key,
            title: template.title.clone(),
            scheduled_at,
            duration_minutes: template.duration_minutes,
            capacity: template.capacity,
            booked_count: 0,
            is_cancelled: false,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_capacity(&self) -> bool {
        !self.is_cancelled && self.booked_count < self.capacity
    }

    pub fn key(&self) -> String {
        record_key(&self.id)
    }
}
