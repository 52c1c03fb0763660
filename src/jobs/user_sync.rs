//! Periodic refresh of the `users` table from guild member lists.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};

use super::{Job, JobContext, JobError, JobReport};
use crate::platform::{GuildMember, PlatformClient};
use crate::repositories::UserRepository;
use crate::repositories::user::UserRecord;
use crate::trigger::Clock;

pub struct UserSyncJob {
    users: UserRepository,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
}

impl UserSyncJob {
    pub fn new(
        db: DatabaseConnection,
        platform: Arc<dyn PlatformClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: UserRepository::new(db),
            platform,
            clock,
        }
    }
}

fn record_for(member: &GuildMember, seen_at: chrono::DateTime<chrono::Utc>) -> UserRecord {
    let global_handle = match member.discriminator {
        Some(_) => None,
        None => Some(member.username.clone()),
    };
    UserRecord {
        discord_user_id: member.user_id,
        username: member.username.clone(),
        discriminator: member.discriminator.clone(),
        global_handle,
        nickname: member.nickname.clone(),
        last_seen: seen_at,
    }
}

#[async_trait]
impl Job for UserSyncJob {
    fn name(&self) -> &str {
        "user_sync"
    }

    fn description(&self) -> &str {
        "Refresh stored user identities from every guild's member list"
    }

    #[instrument(skip_all, fields(job = "user_sync", run_id = %ctx.run_id))]
    async fn run(&self, ctx: &JobContext) -> Result<JobReport, JobError> {
        let guilds = self.platform.guild_ids().await?;
        let mut report = JobReport::default();

        for guild_id in guilds {
            let members = match self.platform.guild_members(guild_id).await {
                Ok(members) => members,
                Err(err) => {
                    warn!(guild_id, error = %err, "Skipping guild, member listing failed");
                    report.items_failed += 1;
                    continue;
                }
            };

            info!(guild_id, members = members.len(), "Syncing guild members");
            let seen_at = self.clock.now();

            for member in &members {
                report.items_processed += 1;
                match self.users.upsert(&record_for(member, seen_at)).await {
                    Ok(()) => report.items_affected += 1,
                    Err(err) => {
                        error!(guild_id, user_id = member.user_id, error = %err, "Failed to update user");
                        report.items_failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(discriminator: Option<&str>) -> GuildMember {
        GuildMember {
            user_id: 9,
            username: "mika".into(),
            discriminator: discriminator.map(str::to_string),
            nickname: Some("Mika".into()),
            is_bot: false,
        }
    }

    #[test]
    fn handle_accounts_use_username_as_global_handle() {
        let record = record_for(&member(None), Utc::now());
        assert_eq!(record.global_handle.as_deref(), Some("mika"));
        assert_eq!(record.discriminator, None);
    }

    #[test]
    fn legacy_accounts_keep_discriminator() {
        let record = record_for(&member(Some("0420")), Utc::now());
        assert_eq!(record.global_handle, None);
        assert_eq!(record.discriminator.as_deref(), Some("0420"));
        assert_eq!(record.nickname.as_deref(), Some("Mika"));
    }
}
