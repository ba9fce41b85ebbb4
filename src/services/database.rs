use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::booking::Booking;
use crate::models::class_instance::ClassInstance;
use crate::models::class_template::ClassTemplate;
use crate::models::pass::PassDefinition;
use crate::models::subscription::Subscription;

const PASS: &str = "pass";
const TEMPLATE: &str = "class_template";
const INSTANCE: &str = "class_instance";
const SUBSCRIPTION: &str = "subscription";
const BOOKING: &str = "booking";

const PAYMENT_REFERENCE_INDEX: &str = "unique_payment_reference";

/// All access to the backing document store. Capacity and credit counters are
/// only ever changed through the conditional `UPDATE ... WHERE` methods below;
/// a plain read-modify-write of those fields is not safe under concurrent
/// requests and must not be added.
#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("studio_booking").use_db("main").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db
            .query(
                "
            DEFINE TABLE pass SCHEMALESS;
            DEFINE TABLE class_template SCHEMALESS;
            DEFINE TABLE class_instance SCHEMALESS;
            DEFINE TABLE booking SCHEMALESS;
            DEFINE TABLE subscription SCHEMALESS;
            DEFINE INDEX unique_payment_reference ON TABLE subscription COLUMNS external_payment_reference UNIQUE;
            DEFINE INDEX booking_instance ON TABLE booking COLUMNS class_instance_id;
        ",
            )
            .await?;

        log::info!("database schema initialized");
        Ok(())
    }

    pub fn new_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Serializes a document without its `id` field; the record id is supplied
    /// separately so the store assigns it, keeping ids out of document bodies.
    fn content_of<T: Serialize>(doc: &T) -> Result<serde_json::Value, ApiError> {
        let mut value =
            serde_json::to_value(doc).map_err(|e| ApiError::Internal(e.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object.remove("id");
        }
        Ok(value)
    }

    async fn create_record<T>(&self, table: &str, key: String, doc: &T) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        let created: Option<T> = self
            .db
            .query("CREATE type::thing($tb, $id) CONTENT $data")
            .bind(("tb", table.to_string()))
            .bind(("id", key))
            .bind(("data", Self::content_of(doc)?))
            .await?
            .take(0)?;

        created.ok_or_else(|| ApiError::Internal(format!("failed to create {} record", table)))
    }

    async fn get_record<T>(&self, table: &str, tenant_id: &str, key: &str) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let record: Option<T> = self
            .db
            .query("SELECT * FROM type::thing($tb, $id) WHERE tenant_id = $tenant")
            .bind(("tb", table.to_string()))
            .bind(("id", key.to_string()))
            .bind(("tenant", tenant_id.to_string()))
            .await?
            .take(0)?;
        Ok(record)
    }

    // Pass catalog

    pub async fn create_pass(&self, pass: &PassDefinition) -> Result<PassDefinition, ApiError> {
        self.create_record(PASS, Self::new_key(), pass).await
    }

    pub async fn get_pass(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<PassDefinition>, ApiError> {
        self.get_record(PASS, tenant_id, key).await
    }

    pub async fn list_active_passes(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<PassDefinition>, ApiError> {
        let passes: Vec<PassDefinition> = self
            .db
            .query(
                "SELECT * FROM pass WHERE tenant_id = $tenant AND is_active = true \
                 ORDER BY price_minor_units ASC",
            )
            .bind(("tenant", tenant_id.to_string()))
            .await?
            .take(0)?;
        Ok(passes)
    }

    pub async fn replace_pass(
        &self,
        key: &str,
        pass: &PassDefinition,
    ) -> Result<PassDefinition, ApiError> {
        let updated: Option<PassDefinition> = self
            .db
            .query("UPDATE type::thing($tb, $id) CONTENT $data RETURN AFTER")
            .bind(("tb", PASS.to_string()))
            .bind(("id", key.to_string()))
            .bind(("data", Self::content_of(pass)?))
            .await?
            .take(0)?;

        updated.ok_or(ApiError::NotFound("Pass"))
    }

    pub async fn count_active_subscriptions_for_pass(
        &self,
        tenant_id: &str,
        pass_key: &str,
    ) -> Result<u64, ApiError> {
        let rows: Vec<serde_json::Value> = self
            .db
            .query(
                "SELECT count() AS count FROM subscription \
                 WHERE tenant_id = $tenant AND pass_id = $pass AND is_active = true GROUP ALL",
            )
            .bind(("tenant", tenant_id.to_string()))
            .bind(("pass", pass_key.to_string()))
            .await?
            .take(0)?;

        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|count| count.as_u64())
            .unwrap_or(0))
    }

    pub async fn delete_pass(&self, tenant_id: &str, key: &str) -> Result<(), ApiError> {
        if self.get_pass(tenant_id, key).await?.is_none() {
            return Err(ApiError::NotFound("Pass"));
        }
        if self.count_active_subscriptions_for_pass(tenant_id, key).await? > 0 {
            return Err(ApiError::Conflict(
                "Pass is referenced by active subscriptions".to_string(),
            ));
        }

        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", PASS.to_string()))
            .bind(("id", key.to_string()))
            .await?;
        Ok(())
    }

    // Class templates

    pub async fn create_template(
        &self,
        template: &ClassTemplate,
    ) -> Result<ClassTemplate, ApiError> {
        self.create_record(TEMPLATE, Self::new_key(), template).await
    }

    pub async fn get_template(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<ClassTemplate>, ApiError> {
        self.get_record(TEMPLATE, tenant_id, key).await
    }

    // Class instances

    pub async fn create_instance(
        &self,
        instance: &ClassInstance,
    ) -> Result<ClassInstance, ApiError> {
        self.create_record(INSTANCE, Self::new_key(), instance).await
    }

    pub async fn get_instance(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<ClassInstance>, ApiError> {
        self.get_record(INSTANCE, tenant_id, key).await
    }

    pub async fn list_instances(
        &self,
        tenant_id: &str,
        template_key: Option<&str>,
    ) -> Result<Vec<ClassInstance>, ApiError> {
        let mut query = "SELECT * FROM class_instance WHERE tenant_id = $tenant".to_string();
        if template_key.is_some() {
            query.push_str(" AND template_id = $template");
        }
        query.push_str(" ORDER BY scheduled_at ASC");

        let mut db_query = self.db.query(query).bind(("tenant", tenant_id.to_string()));
        if let Some(template) = template_key {
            db_query = db_query.bind(("template", template.to_string()));
        }

        let instances: Vec<ClassInstance> = db_query.await?.take(0)?;
        Ok(instances)
    }

    /// Conditionally claims one seat. Returns `None` when the instance is
    /// cancelled or full; the race loser sees `None` rather than an
    /// over-capacity counter.
    pub async fn try_increment_booked_count(
        &self,
        key: &str,
    ) -> Result<Option<ClassInstance>, ApiError> {
        let updated: Option<ClassInstance> = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET booked_count += 1, updated_at = $now \
                 WHERE is_cancelled = false AND booked_count < capacity \
                 RETURN AFTER",
            )
            .bind(("tb", INSTANCE.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", Utc::now()))
            .await?
            .take(0)?;
        Ok(updated)
    }

    /// Releases one seat, flooring at zero. Succeeds even on a cancelled
    /// instance so booking cancellations always reconcile the counter.
    pub async fn decrement_booked_count(&self, key: &str) -> Result<(), ApiError> {
        self.db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET booked_count -= 1, updated_at = $now \
                 WHERE booked_count > 0",
            )
            .bind(("tb", INSTANCE.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", Utc::now()))
            .await?
            .take::<Vec<ClassInstance>>(0)?;
        Ok(())
    }

    /// Flips a scheduled instance to cancelled. Returns `None` when the
    /// instance is missing, belongs to another tenant, or was already
    /// cancelled; an already-cancelled instance keeps its original reason.
    pub async fn cancel_instance_if_scheduled(
        &self,
        tenant_id: &str,
        key: &str,
        reason: Option<String>,
    ) -> Result<Option<ClassInstance>, ApiError> {
        let updated: Option<ClassInstance> = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET is_cancelled = true, cancellation_reason = $reason, updated_at = $now \
                 WHERE tenant_id = $tenant AND is_cancelled = false \
                 RETURN AFTER",
            )
            .bind(("tb", INSTANCE.to_string()))
            .bind(("id", key.to_string()))
            .bind(("tenant", tenant_id.to_string()))
            .bind(("reason", reason))
            .bind(("now", Utc::now()))
            .await?
            .take(0)?;
        Ok(updated)
    }

    /// Cancels every future, not-yet-cancelled instance of a template.
    /// Instances strictly before `now` are left untouched.
    pub async fn cancel_future_instances(
        &self,
        tenant_id: &str,
        template_key: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassInstance>, ApiError> {
        let cancelled: Vec<ClassInstance> = self
            .db
            .query(
                "UPDATE class_instance \
                 SET is_cancelled = true, cancellation_reason = $reason, updated_at = $now \
                 WHERE tenant_id = $tenant AND template_id = $template \
                   AND is_cancelled = false AND scheduled_at > $now \
                 RETURN AFTER",
            )
            .bind(("tenant", tenant_id.to_string()))
            .bind(("template", template_key.to_string()))
            .bind(("reason", reason))
            .bind(("now", now))
            .await?
            .take(0)?;
        Ok(cancelled)
    }

    /// Administrative hard delete: dependent bookings go first, then the
    /// instance itself.
    pub async fn delete_instance_with_bookings(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<u64, ApiError> {
        if self.get_instance(tenant_id, key).await?.is_none() {
            return Err(ApiError::NotFound("Class instance"));
        }

        let deleted: Vec<Booking> = self
            .db
            .query(
                "DELETE booking WHERE tenant_id = $tenant AND class_instance_id = $id \
                 RETURN BEFORE",
            )
            .bind(("tenant", tenant_id.to_string()))
            .bind(("id", key.to_string()))
            .await?
            .take(0)?;

        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", INSTANCE.to_string()))
            .bind(("id", key.to_string()))
            .await?;

        Ok(deleted.len() as u64)
    }

    // Subscriptions

    /// Inserts a subscription, relying on the unique index over
    /// `external_payment_reference` as the idempotency boundary for webhook
    /// redelivery. A reference collision surfaces as `DuplicatePayment`.
    pub async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, ApiError> {
        let content = Self::content_of(subscription)?;
        let result: Result<Option<Subscription>, surrealdb::Error> = async {
            self.db
                .query("CREATE type::thing($tb, $id) CONTENT $data")
                .bind(("tb", SUBSCRIPTION.to_string()))
                .bind(("id", Self::new_key()))
                .bind(("data", content))
                .await?
                .take(0)
        }
        .await;

        match result {
            Ok(Some(created)) => Ok(created),
            Ok(None) => Err(ApiError::Internal(
                "failed to create subscription record".to_string(),
            )),
            Err(e) if e.to_string().contains(PAYMENT_REFERENCE_INDEX) => {
                Err(ApiError::DuplicatePayment)
            }
            Err(e) => Err(ApiError::Database(e)),
        }
    }

    pub async fn get_subscription(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<Subscription>, ApiError> {
        self.get_record(SUBSCRIPTION, tenant_id, key).await
    }

    pub async fn get_subscription_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Subscription>, ApiError> {
        let subscription: Option<Subscription> = self
            .db
            .query("SELECT * FROM subscription WHERE external_payment_reference = $reference")
            .bind(("reference", reference.to_string()))
            .await?
            .take(0)?;
        Ok(subscription)
    }

    pub async fn list_subscriptions_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<Subscription>, ApiError> {
        let subscriptions: Vec<Subscription> = self
            .db
            .query(
                "SELECT * FROM subscription WHERE tenant_id = $tenant AND user_id = $user \
                 ORDER BY created_at DESC",
            )
            .bind(("tenant", tenant_id.to_string()))
            .bind(("user", user_id.to_string()))
            .await?
            .take(0)?;
        Ok(subscriptions)
    }

    /// Conditionally spends one credit: only an active, unexpired subscription
    /// with credits left is decremented, and the subscription deactivates in
    /// the same round trip when the last credit goes. Returns `None` when the
    /// condition did not hold.
    pub async fn try_consume_credit(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, ApiError> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET remaining_credits -= 1, updated_at = $now \
                 WHERE is_active = true AND remaining_credits > 0 AND end_date >= $now \
                 RETURN AFTER",
            )
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET is_active = false, updated_at = $now \
                 WHERE remaining_credits = 0 AND is_active = true \
                 RETURN AFTER",
            )
            .bind(("tb", SUBSCRIPTION.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", now))
            .await?;

        let consumed: Option<Subscription> = response.take(0)?;
        let deactivated: Option<Subscription> = response.take(1)?;
        // Only report a consume when the decrement itself fired; the
        // deactivation statement alone must never count as one.
        Ok(consumed.map(|updated| deactivated.unwrap_or(updated)))
    }

    /// Restores one credit, capped at the subscription's original limit, and
    /// re-activates a subscription that was deactivated purely by credit
    /// exhaustion and has not date-expired.
    pub async fn try_restore_credit(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, ApiError> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET remaining_credits += 1, updated_at = $now \
                 WHERE remaining_credits < credit_limit \
                 RETURN AFTER",
            )
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET is_active = true, updated_at = $now \
                 WHERE is_active = false AND remaining_credits > 0 AND end_date >= $now \
                 RETURN AFTER",
            )
            .bind(("tb", SUBSCRIPTION.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", now))
            .await?;

        let restored: Option<Subscription> = response.take(0)?;
        let reactivated: Option<Subscription> = response.take(1)?;
        Ok(reactivated.or(restored))
    }

    // Bookings

    pub async fn create_booking(&self, booking: &Booking) -> Result<Booking, ApiError> {
        self.create_record(BOOKING, Self::new_key(), booking).await
    }

    pub async fn get_booking(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<Booking>, ApiError> {
        self.get_record(BOOKING, tenant_id, key).await
    }

    /// Flips a booking confirmed -> cancelled. Returns `None` when the booking
    /// was already cancelled, which makes concurrent cancellations collapse to
    /// a single counter reversal.
    pub async fn try_mark_booking_cancelled(
        &self,
        key: &str,
    ) -> Result<Option<Booking>, ApiError> {
        let updated: Option<Booking> = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET status = 'cancelled', updated_at = $now \
                 WHERE status = 'confirmed' \
                 RETURN AFTER",
            )
            .bind(("tb", BOOKING.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", Utc::now()))
            .await?
            .take(0)?;
        Ok(updated)
    }

    /// Puts a just-cancelled booking back to confirmed so a failed reversal
    /// can be retried end to end. Returns `None` when the booking is not in
    /// the cancelled state.
    pub async fn try_revert_booking_cancellation(
        &self,
        key: &str,
    ) -> Result<Option<Booking>, ApiError> {
        let reverted: Option<Booking> = self
            .db
            .query(
                "UPDATE type::thing($tb, $id) \
                 SET status = 'confirmed', updated_at = $now \
                 WHERE status = 'cancelled' \
                 RETURN AFTER",
            )
            .bind(("tb", BOOKING.to_string()))
            .bind(("id", key.to_string()))
            .bind(("now", Utc::now()))
            .await?
            .take(0)?;
        Ok(reverted)
    }

    pub async fn health_check(&self) -> Result<(), ApiError> {
        self.db.health().await?;
        Ok(())
    }
}
