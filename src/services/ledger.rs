use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::subscription::Subscription;
use crate::services::database::DatabaseService;

/// Credit and lifecycle bookkeeping for purchased passes. Creation happens
/// exactly once per payment reference; afterwards only the booking engine
/// moves credits through `consume_credit`/`restore_credit`.
#[derive(Clone)]
pub struct SubscriptionLedger {
    db: DatabaseService,
}

impl SubscriptionLedger {
    pub fn new(db: DatabaseService) -> Self {
        Self { db }
    }

    /// Turns a completed payment into a subscription. The unique index on the
    /// payment reference makes this idempotent under webhook redelivery: the
    /// second writer gets `DuplicatePayment` instead of a second subscription.
    pub async fn create_from_payment(
        &self,
        tenant_id: &str,
        user_id: &str,
        pass_key: &str,
        external_payment_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscription, ApiError> {
        let pass = self
            .db
            .get_pass(tenant_id, pass_key)
            .await?
            .ok_or(ApiError::NotFound("Pass"))?;

        if !pass.is_active {
            return Err(ApiError::Validation(
                "Pass is no longer offered for sale".to_string(),
            ));
        }

        let subscription = Subscription::from_pass(
            tenant_id.to_string(),
            user_id.to_string(),
            &pass,
            pass_key.to_string(),
            external_payment_reference.to_string(),
            now,
        );

        let created = self.db.create_subscription(&subscription).await?;
        log::info!(
            "subscription {} created for user {} from pass {} (reference {})",
            created.key(),
            user_id,
            pass_key,
            external_payment_reference
        );
        Ok(created)
    }

    /// Spends one credit. Unlimited subscriptions pass through untouched;
    /// limited ones are decremented conditionally so two concurrent consumers
    /// can never spend the same credit.
    pub async fn consume_credit(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, ApiError> {
        if subscription.is_unlimited() {
            if !subscription.is_usable(now) {
                return Err(ApiError::NoValidPass);
            }
            return Ok(subscription.clone());
        }

        match self.db.try_consume_credit(&subscription.key(), now).await? {
            Some(updated) => Ok(updated),
            None => {
                // The conditional update lost; find out why for the caller.
                let current = self
                    .db
                    .get_subscription(&subscription.tenant_id, &subscription.key())
                    .await?
                    .ok_or(ApiError::NotFound("Subscription"))?;
                if current.remaining_credits == Some(0) {
                    Err(ApiError::InsufficientCredit)
                } else {
                    Err(ApiError::NoValidPass)
                }
            }
        }
    }

    /// Gives one credit back, capped at the original limit, re-activating a
    /// subscription that was switched off purely by exhaustion. A no-op for
    /// unlimited subscriptions and for subscriptions already at their cap.
    pub async fn restore_credit(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if subscription.is_unlimited() {
            return Ok(());
        }
        self.db.try_restore_credit(&subscription.key(), now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pass::{CreatePassRequest, PassDefinition, PassKind, Validity};

    async fn setup() -> (DatabaseService, SubscriptionLedger, String) {
        let db = DatabaseService::new("memory://").await.unwrap();
        let ledger = SubscriptionLedger::new(db.clone());

        let pass = PassDefinition::new(
            "studio-a".to_string(),
            CreatePassRequest {
                name: "2-clip card".to_string(),
                kind: PassKind::Clipcard,
                price_minor_units: 30_000,
                validity: Validity::FixedDays(30),
                class_credit_limit: Some(2),
            },
        );
        let created = db.create_pass(&pass).await.unwrap();
        let pass_key = crate::models::common::record_key(&created.id);
        (db, ledger, pass_key)
    }

    #[tokio::test]
    async fn test_create_from_payment() {
        let (_db, ledger, pass_key) = setup().await;
        let sub = ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_1", Utc::now())
            .await
            .unwrap();

        assert_eq!(sub.remaining_credits, Some(2));
        assert_eq!(sub.credit_limit, Some(2));
        assert!(sub.is_active);
        assert_eq!(sub.external_payment_reference, "PAY_1");
    }

    #[tokio::test]
    async fn test_duplicate_payment_reference_rejected() {
        let (_db, ledger, pass_key) = setup().await;
        ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_DUP", Utc::now())
            .await
            .unwrap();

        let second = ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_DUP", Utc::now())
            .await;
        assert!(matches!(second, Err(ApiError::DuplicatePayment)));
    }

    #[tokio::test]
    async fn test_unknown_pass_is_not_found() {
        let (_db, ledger, _pass_key) = setup().await;
        let result = ledger
            .create_from_payment("studio-a", "user-1", "missing", "PAY_2", Utc::now())
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pass_in_other_tenant_is_not_found() {
        let (_db, ledger, pass_key) = setup().await;
        let result = ledger
            .create_from_payment("studio-b", "user-1", &pass_key, "PAY_3", Utc::now())
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_last_credit_deactivates_subscription() {
        let (db, ledger, pass_key) = setup().await;
        let now = Utc::now();
        let sub = ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_4", now)
            .await
            .unwrap();

        let sub = ledger.consume_credit(&sub, now).await.unwrap();
        assert_eq!(sub.remaining_credits, Some(1));
        assert!(sub.is_active);

        let sub = ledger.consume_credit(&sub, now).await.unwrap();
        assert_eq!(sub.remaining_credits, Some(0));
        assert!(!sub.is_active);

        let stored = db
            .get_subscription("studio-a", &sub.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.remaining_credits, Some(0));
        assert!(!stored.is_active);

        let exhausted = ledger.consume_credit(&stored, now).await;
        assert!(matches!(exhausted, Err(ApiError::InsufficientCredit)));
    }

    #[tokio::test]
    async fn test_restore_reactivates_exhausted_subscription() {
        let (db, ledger, pass_key) = setup().await;
        let now = Utc::now();
        let sub = ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_5", now)
            .await
            .unwrap();

        let sub = ledger.consume_credit(&sub, now).await.unwrap();
        let sub = ledger.consume_credit(&sub, now).await.unwrap();
        assert!(!sub.is_active);

        ledger.restore_credit(&sub, now).await.unwrap();
        let stored = db
            .get_subscription("studio-a", &sub.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.remaining_credits, Some(1));
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_zero_credit_row_never_reports_a_consume() {
        // A row sitting at zero credits must not look like a successful
        // consume, even though the deactivation statement still fires for it.
        let (db, _ledger, pass_key) = setup().await;
        let now = Utc::now();
        let pass = db.get_pass("studio-a", &pass_key).await.unwrap().unwrap();

        let mut sub = Subscription::from_pass(
            "studio-a".to_string(),
            "user-1".to_string(),
            &pass,
            pass_key.clone(),
            "PAY_ZERO".to_string(),
            now,
        );
        sub.remaining_credits = Some(0);
        let created = db.create_subscription(&sub).await.unwrap();

        let consumed = db.try_consume_credit(&created.key(), now).await.unwrap();
        assert!(consumed.is_none());

        let stored = db
            .get_subscription("studio-a", &created.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.remaining_credits, Some(0));
    }

    #[tokio::test]
    async fn test_restore_is_capped_at_original_limit() {
        let (db, ledger, pass_key) = setup().await;
        let now = Utc::now();
        let sub = ledger
            .create_from_payment("studio-a", "user-1", &pass_key, "PAY_6", now)
            .await
            .unwrap();

        // Already at the limit; restore must not exceed it.
        ledger.restore_credit(&sub, now).await.unwrap();
        let stored = db
            .get_subscription("studio-a", &sub.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.remaining_credits, Some(2));
    }
}
