use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::models::common::{record_key, serialize_record_id};
use crate::models::pass::{PassDefinition, PassKind, Validity};

/// A user's purchased instance of a pass. Created exactly once per successful
/// payment event; only the booking engine and lazy expiry checks mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_record_id",
        default
    )]
    pub id: Option<Thing>,
    pub tenant_id: String,
    pub user_id: String,
    /// Record key of the pass this subscription was purchased from. The fields
    /// below snapshot the pass at purchase time; later catalog edits never
    /// touch existing subscriptions.
    pub pass_id: String,
    pub pass_name: String,
    pub kind: PassKind,
    pub price_minor_units: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// None for unlimited kinds.
    pub remaining_credits: Option<i64>,
    /// Original credit limit, the cap for credit restores.
    pub credit_limit: Option<i64>,
    pub is_active: bool,
    pub external_payment_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "external_payment_reference is required"))]
    pub external_payment_reference: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub id: String,
    pub user_id: String,
    pub pass_name: String,
    pub kind: PassKind,
    pub is_active: bool,
    pub usable: bool,
    pub remaining_credits: Option<i64>,
    pub credit_limit: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub days_remaining: i64,
}

impl Subscription {
    pub fn from_pass(
        tenant_id: String,
        user_id: String,
        pass: &PassDefinition,
        pass_key: String,
        external_payment_reference: String,
        now: DateTime<Utc>,
    ) -> Self {
        let end_date = match &pass.validity {
            Validity::FixedDays(days) => now + Duration::days(*days as i64),
            Validity::FixedExpiryDate(date) => *date,
        };

        Self {
            id: None,
            tenant_id,
            user_id,
            pass_id: pass_key,
            pass_name: pass.name.clone(),
            kind: pass.kind,
            price_minor_units: pass.price_minor_units,
            start_date: now,
            end_date,
            remaining_credits: pass.class_credit_limit,
            credit_limit: pass.class_credit_limit,
            is_active: true,
            external_payment_reference,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining_credits.is_none()
    }

    /// The single source of truth for whether a subscription can back a
    /// booking right now. Expiry is evaluated lazily here; callers must not
    /// cache the result across requests.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && now <= self.end_date
            && self.remaining_credits.map_or(true, |credits| credits > 0)
    }

    pub fn key(&self) -> String {
        record_key(&self.id)
    }

    pub fn to_status_response(&self, now: DateTime<Utc>) -> SubscriptionStatusResponse {
        SubscriptionStatusResponse {
            id: self.key(),
            user_id: self.user_id.clone(),
            pass_name: self.pass_name.clone(),
            kind: self.kind,
            is_active: self.is_active,
            usable: self.is_usable(now),
            remaining_credits: self.remaining_credits,
            credit_limit: self.credit_limit,
            start_date: self.start_date,
            end_date: self.end_date,
            days_remaining: self.end_date.signed_duration_since(now).num_days(),
        }
    }
}
