pub mod health;
pub mod kafka;
pub mod metrics;
pub mod record;
pub mod store;
pub mod time;
