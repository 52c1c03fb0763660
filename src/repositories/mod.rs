//! # Repository Layer
//!
//! SeaORM access for the tables the maintenance jobs read and write. Writes
//! that must land atomically with other work take a generic
//! [`sea_orm::ConnectionTrait`] so they can run inside a transaction.

pub mod attachment;
pub mod checkpoint;
pub mod media_recommendation;
pub mod message_log;
pub mod settings;
pub mod user;

pub use attachment::AttachmentRepository;
pub use checkpoint::CheckpointStore;
pub use message_log::MessageLogRepository;
pub use settings::SettingsRepository;
pub use user::UserRepository;
