use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::models::common::{record_key, serialize_record_id};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// A confirmed seat in a class instance, funded by one subscription credit.
/// Lifecycle: confirmed -> cancelled, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_record_id",
        default
    )]
    pub id: Option<Thing>,
    pub tenant_id: String,
    pub user_id: String,
    pub class_instance_id: String,
    pub subscription_id: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "class_instance_id is required"))]
    pub class_instance_id: String,
    #[validate(length(min = 1, message = "subscription_id is required"))]
    pub subscription_id: String,
}

impl Booking {
    pub fn new(
        tenant_id: String,
        user_id: String,
        class_instance_id: String,
        subscription_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            tenant_id,
            user_id,
            class_instance_id,
            subscription_id,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    pub fn key(&self) -> String {
        record_key(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_booking_is_confirmed() {
        let booking = Booking::new(
            "studio-a".to_string(),
            "user-1".to_string(),
            "instance-1".to_string(),
            "sub-1".to_string(),
        );
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(!booking.is_cancelled());
    }
}
