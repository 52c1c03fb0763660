//! Database migrations for the Sentinel maintenance engine.
//!
//! The schema is shared with the bot's command and event layers; these
//! migrations create the tables the background jobs read and write.

pub use sea_orm_migration::prelude::*;

mod m2025_01_01_000001_create_users;
mod m2025_01_01_000002_create_activity_logs;
mod m2025_01_01_000003_create_polls;
mod m2025_01_01_000004_create_events;
mod m2025_01_01_000005_create_media_tables;
mod m2025_01_01_000006_create_system_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_users::Migration),
            Box::new(m2025_01_01_000002_create_activity_logs::Migration),
            Box::new(m2025_01_01_000003_create_polls::Migration),
            Box::new(m2025_01_01_000004_create_events::Migration),
            Box::new(m2025_01_01_000005_create_media_tables::Migration),
            Box::new(m2025_01_01_000006_create_system_settings::Migration),
        ]
    }
}
