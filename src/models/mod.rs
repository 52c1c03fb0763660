//! # Data Models
//!
//! SeaORM entities for the tables the maintenance jobs read and write, plus the
//! small response types shared by the HTTP handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod channel_log;
pub mod channel_scan_history;
pub mod event_interest;
pub mod event_log;
pub mod event_update_log;
pub mod giphy_cache;
pub mod media_recommendation;
pub mod media_scan_checkpoint;
pub mod member_status_log;
pub mod message_attachment;
pub mod message_log;
pub mod nickname_log;
pub mod poll_log;
pub mod poll_vote;
pub mod system_setting;
pub mod user;
pub mod voice_log;

pub use channel_log::Entity as ChannelLog;
pub use channel_scan_history::Entity as ChannelScanHistory;
pub use event_interest::Entity as EventInterest;
pub use event_log::Entity as EventLog;
pub use event_update_log::Entity as EventUpdateLog;
pub use giphy_cache::Entity as GiphyCache;
pub use media_recommendation::Entity as MediaRecommendation;
pub use media_scan_checkpoint::Entity as MediaScanCheckpoint;
pub use member_status_log::Entity as MemberStatusLog;
pub use message_attachment::Entity as MessageAttachment;
pub use message_log::Entity as MessageLog;
pub use nickname_log::Entity as NicknameLog;
pub use poll_log::Entity as PollLog;
pub use poll_vote::Entity as PollVote;
pub use system_setting::Entity as SystemSetting;
pub use user::Entity as User;
pub use voice_log::Entity as VoiceLog;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "sentinel-jobs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
