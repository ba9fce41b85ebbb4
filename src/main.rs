use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use dotenv::dotenv;
use std::env;

use studio_booking_api::config::Config;
use studio_booking_api::handlers;
use studio_booking_api::services::booking::BookingEngine;
use studio_booking_api::services::database::DatabaseService;
use studio_booking_api::services::ledger::SubscriptionLedger;
use studio_booking_api::services::providers::{PeachPaymentService, StripePaymentService};
use studio_booking_api::services::reconciliation::PaymentReconciliation;
use studio_booking_api::services::schedule::ScheduleService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().expect("failed to read configuration");

    let db = DatabaseService::new(&config.database_url)
        .await
        .expect("failed to initialise database");

    let ledger = SubscriptionLedger::new(db.clone());
    let schedule = ScheduleService::new(db.clone());
    let engine = BookingEngine::new(db.clone(), ledger.clone());
    let reconciliation = PaymentReconciliation::new(db.clone(), ledger.clone());

    let peach = PeachPaymentService::new(
        config.peach.clone(),
        config.checkout.clone(),
        config.currency.clone(),
        config.http_timeout_secs,
    );
    let stripe = StripePaymentService::new(
        config.stripe.clone(),
        config.checkout.clone(),
        config.currency.to_lowercase(),
        config.http_timeout_secs,
    );

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    println!("Starting server at http://{}", bind_address);
    println!("  GET  /api/v1/health - Health check");
    println!("  GET  /api/v1/passes - List active passes");
    println!("  POST /api/v1/passes/{{id}}/checkout - Start a pass purchase");
    println!("  GET  /api/v1/subscriptions - List my subscriptions");
    println!("  GET  /api/v1/class-instances - List scheduled classes");
    println!("  POST /api/v1/bookings - Book a class");
    println!("  POST /api/v1/bookings/{{id}}/cancel - Cancel a booking");
    println!("  POST /api/v1/webhooks/payment/{{provider}} - Payment notifications");

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(ledger.clone()))
            .app_data(Data::new(schedule.clone()))
            .app_data(Data::new(engine.clone()))
            .app_data(Data::new(reconciliation.clone()))
            .app_data(Data::new(peach.clone()))
            .app_data(Data::new(stripe.clone()))
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
