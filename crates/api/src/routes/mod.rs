pub mod checkout;
pub mod health;
pub mod metrics;
pub mod products;
pub mod stores;
pub mod users;
