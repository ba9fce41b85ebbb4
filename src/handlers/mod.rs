pub mod bookings;
pub mod checkout;
pub mod class_instances;
pub mod class_templates;
pub mod health;
pub mod passes;
pub mod subscriptions;
pub mod webhooks;

use actix_web::web;

/// Mounts the full route tree. Shared with the integration tests so they run
/// against the same routing the binary serves.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(passes::list_passes)
            .service(passes::get_pass)
            .service(passes::create_pass)
            .service(passes::update_pass)
            .service(passes::delete_pass)
            .service(checkout::create_checkout)
            .service(subscriptions::create_subscription)
            .service(subscriptions::get_subscription_status)
            .service(subscriptions::list_subscriptions)
            .service(class_templates::create_template)
            .service(class_templates::generate_instances)
            .service(class_templates::cancel_series)
            .service(class_instances::list_instances)
            .service(class_instances::cancel_instance)
            .service(class_instances::delete_instance)
            .service(bookings::create_booking)
            .service(bookings::cancel_booking)
            .service(webhooks::payment_webhook),
    );
}
