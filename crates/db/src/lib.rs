//! SQLite persistence for the association engine: pool setup, embedded
//! migrations, SQL implementations of every engine port, and the demo corpus.

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult, DEMO_WEB_ORDERS_IN_WINDOW};
