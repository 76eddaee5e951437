pub mod health;
pub mod metrics;
pub mod quotes;
pub mod webhooks;
