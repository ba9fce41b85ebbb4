use chrono::Utc;

use crate::error::ApiError;
use crate::models::booking::Booking;
use crate::models::class_instance::ClassInstance;
use crate::services::database::DatabaseService;
use crate::services::ledger::SubscriptionLedger;

/// Couples a booking to one capacity slot and one subscription credit, and
/// reverses both on cancellation.
///
/// The store has no multi-document transaction, so the engine claims the seat
/// first, then the credit, then writes the booking, and compensates earlier
/// steps when a later one fails. Each individual step is a conditional update,
/// so concurrent requests against the same instance or subscription cannot
/// overshoot a counter.
#[derive(Clone)]
pub struct BookingEngine {
    db: DatabaseService,
    ledger: SubscriptionLedger,
}

impl BookingEngine {
    pub fn new(db: DatabaseService, ledger: SubscriptionLedger) -> Self {
        Self { db, ledger }
    }

    pub async fn book(
        &self,
        tenant_id: &str,
        user_id: &str,
        class_instance_key: &str,
        subscription_key: &str,
    ) -> Result<Booking, ApiError> {
        let now = Utc::now();

        let instance = self
            .db
            .get_instance(tenant_id, class_instance_key)
            .await?
            .ok_or(ApiError::NotFound("Class instance"))?;
        if instance.is_cancelled {
            return Err(ApiError::ClassCancelled);
        }
        if !instance.has_capacity() {
            return Err(ApiError::Full);
        }

        let subscription = self
            .db
            .get_subscription(tenant_id, subscription_key)
            .await?
            .ok_or(ApiError::NoValidPass)?;
        if subscription.user_id != user_id || !subscription.is_usable(now) {
            return Err(ApiError::NoValidPass);
        }

        // Claim the seat. The conditional update is the authoritative
        // capacity check; the read above only produces friendlier errors.
        let instance = self.claim_seat(tenant_id, class_instance_key).await?;

        // Spend the credit, releasing the seat again if that fails.
        if let Err(credit_error) = self.ledger.consume_credit(&subscription, now).await {
            if let Err(rollback_error) = self.db.decrement_booked_count(class_instance_key).await {
                log::error!(
                    "compensation failed: seat on instance {} not released after credit \
                     failure for subscription {}: {rollback_error:?}",
                    class_instance_key,
                    subscription_key
                );
                return Err(ApiError::Internal(
                    "booking rollback failed; manual reconciliation required".to_string(),
                ));
            }
            return Err(credit_error);
        }

        let booking = Booking::new(
            tenant_id.to_string(),
            user_id.to_string(),
            class_instance_key.to_string(),
            subscription_key.to_string(),
        );
        match self.db.create_booking(&booking).await {
            Ok(created) => {
                log::info!(
                    "booking {} confirmed: user {} on instance {} ({}/{} seats)",
                    created.key(),
                    user_id,
                    class_instance_key,
                    instance.booked_count,
                    instance.capacity
                );
                Ok(created)
            }
            Err(create_error) => {
                // Undo both earlier steps before surfacing the error.
                let seat = self.db.decrement_booked_count(class_instance_key).await;
                let credit = self.ledger.restore_credit(&subscription, now).await;
                if seat.is_err() || credit.is_err() {
                    log::error!(
                        "compensation failed after booking write error on instance {} / \
                         subscription {}: seat={seat:?} credit={credit:?} cause={create_error:?}",
                        class_instance_key,
                        subscription_key
                    );
                    return Err(ApiError::Internal(
                        "booking rollback failed; manual reconciliation required".to_string(),
                    ));
                }
                Err(create_error)
            }
        }
    }

    /// Conditionally claims one seat, distinguishing why the claim failed:
    /// an instance cancelled after the precheck read answers `ClassCancelled`,
    /// not `Full`.
    async fn claim_seat(
        &self,
        tenant_id: &str,
        class_instance_key: &str,
    ) -> Result<ClassInstance, ApiError> {
        if let Some(claimed) = self.db.try_increment_booked_count(class_instance_key).await? {
            return Ok(claimed);
        }

        let current = self
            .db
            .get_instance(tenant_id, class_instance_key)
            .await?
            .ok_or(ApiError::NotFound("Class instance"))?;
        if current.is_cancelled {
            Err(ApiError::ClassCancelled)
        } else {
            Err(ApiError::Full)
        }
    }

    /// Idempotent: cancelling an already-cancelled booking returns it
    /// unchanged. The reversal succeeds even when the class instance itself
    /// has been cancelled since, so counters and credits always reconcile.
    pub async fn cancel_booking(
        &self,
        tenant_id: &str,
        booking_key: &str,
    ) -> Result<Booking, ApiError> {
        let now = Utc::now();

        let booking = self
            .db
            .get_booking(tenant_id, booking_key)
            .await?
            .ok_or(ApiError::NotFound("Booking"))?;
        if booking.is_cancelled() {
            return Ok(booking);
        }

        let Some(cancelled) = self.db.try_mark_booking_cancelled(booking_key).await? else {
            // Lost a cancellation race; the other caller did the reversal.
            return self
                .db
                .get_booking(tenant_id, booking_key)
                .await?
                .ok_or(ApiError::NotFound("Booking"));
        };

        // The flip is committed; from here every failure must either be
        // unwound or escalated, because a retry lands on the idempotent
        // no-op branch above and would silently leak the seat and credit.
        if let Err(seat_error) = self
            .db
            .decrement_booked_count(&cancelled.class_instance_id)
            .await
        {
            if let Err(revert_error) = self.db.try_revert_booking_cancellation(booking_key).await {
                log::error!(
                    "compensation failed: booking {} stuck cancelled with seat on instance {} \
                     and credit on subscription {} unreturned: {seat_error:?} / {revert_error:?}",
                    booking_key,
                    cancelled.class_instance_id,
                    cancelled.subscription_id
                );
                return Err(ApiError::Internal(
                    "cancellation rollback failed; manual reconciliation required".to_string(),
                ));
            }
            // Booking is confirmed again; a retry redoes the whole reversal.
            return Err(seat_error);
        }

        let subscription = match self
            .db
            .get_subscription(tenant_id, &cancelled.subscription_id)
            .await
        {
            Ok(subscription) => subscription,
            Err(lookup_error) => {
                log::error!(
                    "compensation failed: booking {} cancelled and seat on instance {} \
                     released, but credit on subscription {} not restored: {lookup_error:?}",
                    booking_key,
                    cancelled.class_instance_id,
                    cancelled.subscription_id
                );
                return Err(ApiError::Internal(
                    "cancellation rollback failed; manual reconciliation required".to_string(),
                ));
            }
        };

        match subscription {
            Some(subscription) => {
                if let Err(credit_error) = self.ledger.restore_credit(&subscription, now).await {
                    log::error!(
                        "compensation failed: booking {} cancelled and seat on instance {} \
                         released, but credit on subscription {} not restored: {credit_error:?}",
                        booking_key,
                        cancelled.class_instance_id,
                        cancelled.subscription_id
                    );
                    return Err(ApiError::Internal(
                        "cancellation rollback failed; manual reconciliation required"
                            .to_string(),
                    ));
                }
            }
            None => log::warn!(
                "booking {} cancelled but its subscription {} is gone; credit not restored",
                booking_key,
                cancelled.subscription_id
            ),
        }

        log::info!("booking {} cancelled by user request", booking_key);
        Ok(cancelled)
    }
}
