use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::models::common::serialize_record_id;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Single,
    MultiPass,
    Clipcard,
    Monthly,
}

impl PassKind {
    /// Monthly passes grant unlimited attendance; every other kind is
    /// credit-limited.
    pub fn is_unlimited(&self) -> bool {
        matches!(self, PassKind::Monthly)
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassKind::Single => write!(f, "single"),
            PassKind::MultiPass => write!(f, "multi_pass"),
            PassKind::Clipcard => write!(f, "clipcard"),
            PassKind::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Validity {
    /// Valid for a fixed number of days from purchase.
    FixedDays(u32),
    /// Valid until a fixed calendar date, regardless of purchase time.
    FixedExpiryDate(DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassDefinition {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_record_id",
        default
    )]
    pub id: Option<Thing>,
    pub tenant_id: String,
    pub name: String,
    pub kind: PassKind,
    pub price_minor_units: i64,
    pub validity: Validity,
    pub class_credit_limit: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePassRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    pub kind: PassKind,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_minor_units: i64,
    pub validity: Validity,
    pub class_credit_limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePassRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_minor_units: Option<i64>,
    pub validity: Option<Validity>,
    pub class_credit_limit: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

impl PassDefinition {
    pub fn new(tenant_id: String, request: CreatePassRequest) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            tenant_id,
            name: request.name,
            kind: request.kind,
            price_minor_units: request.price_minor_units,
            validity: request.validity,
            class_credit_limit: request.class_credit_limit,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the rules that cut across fields: validity windows must be
    /// meaningful at edit time, and the credit limit must agree with the kind.
    pub fn check_rules(&self, now: DateTime<Utc>) -> Result<(), String> {
        match &self.validity {
            Validity::FixedDays(days) if *days < 1 => {
                return Err("Validity in days must be at least 1".to_string());
            }
            Validity::FixedExpiryDate(date) if *date <= now => {
                return Err("Expiry date must be in the future".to_string());
            }
            _ => {}
        }

        if self.kind.is_unlimited() {
            if self.class_credit_limit.is_some() {
                return Err("Unlimited passes cannot carry a class credit limit".to_string());
            }
        } else {
            match self.class_credit_limit {
                Some(limit) if limit >= 1 => {}
                _ => {
                    return Err(format!(
                        "Passes of kind '{}' require a class credit limit of at least 1",
                        self.kind
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn apply_update(&mut self, request: UpdatePassRequest) {
        if let Some(name) = request.name {
            self.name = name;
        }
        if let Some(price) = request.price_minor_units {
            self.price_minor_units = price;
        }
        if let Some(validity) = request.validity {
            self.validity = validity;
        }
        if let Some(limit) = request.class_credit_limit {
            self.class_credit_limit = limit;
        }
        if let Some(active) = request.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
    }
}
