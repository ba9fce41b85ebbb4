use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub currency: String,
    /// Role claim that grants cross-tenant operator access. Issued by the
    /// identity provider, never derived from a specific identity.
    pub platform_admin_role: String,
    pub http_timeout_secs: u64,
    pub checkout: CheckoutConfig,
    pub peach: PeachConfig,
    pub stripe: StripeConfig,
}

/// URLs the payment providers redirect shoppers back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeachConfig {
    pub auth_service_url: String,
    pub checkout_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub merchant_id: String,
    pub entity_id: String,
    pub webhook_secret: String,
    pub notification_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "memory://".to_string()),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "ZAR".to_string()),
            platform_admin_role: env::var("PLATFORM_ADMIN_ROLE")
                .unwrap_or_else(|_| "platform_admin".to_string()),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            checkout: CheckoutConfig {
                success_url: env::var("CHECKOUT_SUCCESS_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/payment-success".to_string()),
                cancel_url: env::var("CHECKOUT_CANCEL_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/payment-cancelled".to_string()),
            },

            peach: PeachConfig {
                auth_service_url: env::var("PEACH_AUTH_SERVICE_URL").unwrap_or_default(),
                checkout_endpoint: env::var("PEACH_CHECKOUT_ENDPOINT").unwrap_or_default(),
                client_id: env::var("PEACH_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("PEACH_CLIENT_SECRET").unwrap_or_default(),
                merchant_id: env::var("PEACH_MERCHANT_ID").unwrap_or_default(),
                entity_id: env::var("PEACH_ENTITY_ID").unwrap_or_default(),
                webhook_secret: env::var("PEACH_WEBHOOK_SECRET").unwrap_or_default(),
                notification_url: env::var("PEACH_NOTIFICATION_URL").unwrap_or_default(),
            },

            stripe: StripeConfig {
                api_url: env::var("STRIPE_API_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "memory://".to_string(),
            currency: "ZAR".to_string(),
            platform_admin_role: "platform_admin".to_string(),
            http_timeout_secs: 10,
            checkout: CheckoutConfig {
                success_url: "http://localhost:8080/payment-success".to_string(),
                cancel_url: "http://localhost:8080/payment-cancelled".to_string(),
            },
            peach: PeachConfig {
                auth_service_url: String::new(),
                checkout_endpoint: String::new(),
                client_id: String::new(),
                client_secret: String::new(),
                merchant_id: String::new(),
                entity_id: String::new(),
                webhook_secret: String::new(),
                notification_url: String::new(),
            },
            stripe: StripeConfig {
                api_url: "https://api.stripe.com".to_string(),
                secret_key: String::new(),
                webhook_secret: String::new(),
            },
        }
    }
}
