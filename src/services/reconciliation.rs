use chrono::Utc;

use crate::error::ApiError;
use crate::models::subscription::Subscription;
use crate::services::database::DatabaseService;
use crate::services::ledger::SubscriptionLedger;
use crate::services::providers::{PaymentEvent, PaymentEventStatus};

/// Outcome of applying a payment event, distinguishing first delivery from
/// redelivery so handlers can log accordingly.
#[derive(Debug)]
pub enum ReconciliationOutcome {
    /// A subscription was created for this payment.
    Created(Subscription),
    /// The payment was already applied; the existing subscription is returned.
    AlreadyApplied(Subscription),
    /// The payment failed; nothing was created.
    Ignored,
}

/// Applies decoded payment events to the subscription ledger. Redeliveries of
/// the same payment reference converge on the subscription the first delivery
/// created.
#[derive(Clone)]
pub struct PaymentReconciliation {
    db: DatabaseService,
    ledger: SubscriptionLedger,
}

impl PaymentReconciliation {
    pub fn new(db: DatabaseService, ledger: SubscriptionLedger) -> Self {
        Self { db, ledger }
    }

    pub async fn handle(&self, event: &PaymentEvent) -> Result<ReconciliationOutcome, ApiError> {
        if event.status == PaymentEventStatus::Failed {
            log::info!(
                "{} payment {} failed; no subscription created",
                event.provider,
                event.external_payment_reference
            );
            return Ok(ReconciliationOutcome::Ignored);
        }

        if let Some(existing) = self
            .db
            .get_subscription_by_reference(&event.external_payment_reference)
            .await?
        {
            log::info!(
                "{} payment {} already reconciled as subscription {}",
                event.provider,
                event.external_payment_reference,
                existing.key()
            );
            return Ok(ReconciliationOutcome::AlreadyApplied(existing));
        }

        match self
            .ledger
            .create_from_payment(
                &event.tenant_id,
                &event.user_id,
                &event.pass_id,
                &event.external_payment_reference,
                Utc::now(),
            )
            .await
        {
            Ok(created) => Ok(ReconciliationOutcome::Created(created)),
            // Lost a race with a concurrent delivery of the same webhook; the
            // winner's subscription is the answer.
            Err(ApiError::DuplicatePayment) => {
                let existing = self
                    .db
                    .get_subscription_by_reference(&event.external_payment_reference)
                    .await?
                    .ok_or_else(|| {
                        ApiError::Internal(format!(
                            "payment {} reported duplicate but no subscription found",
                            event.external_payment_reference
                        ))
                    })?;
                Ok(ReconciliationOutcome::AlreadyApplied(existing))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pass::{CreatePassRequest, PassDefinition, PassKind, Validity};

    fn event(reference: &str, pass_key: &str, status: PaymentEventStatus) -> PaymentEvent {
        PaymentEvent {
            provider: "peach",
            external_payment_reference: reference.to_string(),
            tenant_id: "studio-a".to_string(),
            user_id: "user-1".to_string(),
            pass_id: pass_key.to_string(),
            amount_minor_units: Some(30_000),
            status,
        }
    }

    async fn setup() -> (PaymentReconciliation, String) {
        let db = DatabaseService::new("memory://").await.unwrap();
        let ledger = SubscriptionLedger::new(db.clone());

        let pass = PassDefinition::new(
            "studio-a".to_string(),
            CreatePassRequest {
                name: "Monthly unlimited".to_string(),
                kind: PassKind::Monthly,
                price_minor_units: 30_000,
                validity: Validity::FixedDays(30),
                class_credit_limit: None,
            },
        );
        let created = db.create_pass(&pass).await.unwrap();
        let pass_key = crate::models::common::record_key(&created.id);
        (PaymentReconciliation::new(db, ledger), pass_key)
    }

    #[tokio::test]
    async fn test_completed_payment_creates_subscription() {
        let (reconciliation, pass_key) = setup().await;
        let outcome = reconciliation
            .handle(&event("TXN_1", &pass_key, PaymentEventStatus::Completed))
            .await
            .unwrap();

        match outcome {
            ReconciliationOutcome::Created(sub) => {
                assert_eq!(sub.external_payment_reference, "TXN_1");
                assert!(sub.is_active);
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redelivery_returns_existing_subscription() {
        let (reconciliation, pass_key) = setup().await;
        let first = reconciliation
            .handle(&event("TXN_2", &pass_key, PaymentEventStatus::Completed))
            .await
            .unwrap();
        let first_key = match first {
            ReconciliationOutcome::Created(sub) => sub.key(),
            other => panic!("expected Created, got {other:?}"),
        };

        let second = reconciliation
            .handle(&event("TXN_2", &pass_key, PaymentEventStatus::Completed))
            .await
            .unwrap();
        match second {
            ReconciliationOutcome::AlreadyApplied(sub) => assert_eq!(sub.key(), first_key),
            other => panic!("expected AlreadyApplied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_payment_is_ignored() {
        let (reconciliation, pass_key) = setup().await;
        let outcome = reconciliation
            .handle(&event("TXN_3", &pass_key, PaymentEventStatus::Failed))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconciliationOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_unknown_pass_surfaces_not_found() {
        let (reconciliation, _pass_key) = setup().await;
        let result = reconciliation
            .handle(&event("TXN_4", "missing", PaymentEventStatus::Completed))
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
