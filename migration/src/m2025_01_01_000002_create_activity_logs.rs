//! Migration to create the activity log tables.
//!
//! Messages, attachments, voice, presence, nickname and channel audit logs are
//! written by the event layer. Background jobs scan them and expire old rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MessageLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageLogs::MessageId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MessageLogs::UserId).big_integer().not_null())
                    .col(ColumnDef::new(MessageLogs::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(MessageLogs::Content).text().null())
                    .col(
                        ColumnDef::new(MessageLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageLogs::Edited)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_logs_channel_id")
                    .table(MessageLogs::Table)
                    .col(MessageLogs::ChannelId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MessageAttachments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageAttachments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MessageAttachments::MessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageAttachments::AttachmentId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(MessageAttachments::Filename)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageAttachments::ContentType)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(MessageAttachments::Size).big_integer().not_null())
                    .col(ColumnDef::new(MessageAttachments::Url).text().not_null())
                    .col(ColumnDef::new(MessageAttachments::ProxyUrl).text().null())
                    .col(ColumnDef::new(MessageAttachments::LocalPath).text().null())
                    .col(
                        ColumnDef::new(MessageAttachments::CachedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_attachments_message_id")
                    .table(MessageAttachments::Table)
                    .col(MessageAttachments::MessageId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_attachments_cached_at")
                    .table(MessageAttachments::Table)
                    .col(MessageAttachments::CachedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VoiceLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoiceLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoiceLogs::UserId).big_integer().not_null())
                    .col(ColumnDef::new(VoiceLogs::ChannelId).big_integer().null())
                    .col(ColumnDef::new(VoiceLogs::Action).string_len(20).not_null())
                    .col(
                        ColumnDef::new(VoiceLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_voice_logs_timestamp")
                    .table(VoiceLogs::Table)
                    .col(VoiceLogs::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MemberStatusLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MemberStatusLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MemberStatusLogs::UserId).big_integer().not_null())
                    .col(ColumnDef::new(MemberStatusLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(MemberStatusLogs::Status).string_len(20).not_null())
                    .col(
                        ColumnDef::new(MemberStatusLogs::ClientStatusDesktop)
                            .string_len(20)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MemberStatusLogs::ClientStatusMobile)
                            .string_len(20)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MemberStatusLogs::ClientStatusWeb)
                            .string_len(20)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MemberStatusLogs::ActivityType)
                            .string_len(50)
                            .null(),
                    )
                    .col(ColumnDef::new(MemberStatusLogs::ActivityName).text().null())
                    .col(ColumnDef::new(MemberStatusLogs::ActivityDetails).text().null())
                    .col(
                        ColumnDef::new(MemberStatusLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_member_status_logs_timestamp")
                    .table(MemberStatusLogs::Table)
                    .col(MemberStatusLogs::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NicknameLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NicknameLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NicknameLogs::UserId).big_integer().not_null())
                    .col(ColumnDef::new(NicknameLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(NicknameLogs::OldNickname).string_len(100).null())
                    .col(ColumnDef::new(NicknameLogs::NewNickname).string_len(100).null())
                    .col(
                        ColumnDef::new(NicknameLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nickname_logs_timestamp")
                    .table(NicknameLogs::Table)
                    .col(NicknameLogs::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChannelLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChannelLogs::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(ChannelLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(ChannelLogs::Action).string_len(20).not_null())
                    .col(ColumnDef::new(ChannelLogs::FieldName).string_len(50).null())
                    .col(ColumnDef::new(ChannelLogs::OldValue).text().null())
                    .col(ColumnDef::new(ChannelLogs::NewValue).text().null())
                    .col(ColumnDef::new(ChannelLogs::ActorId).big_integer().null())
                    .col(
                        ColumnDef::new(ChannelLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_logs_channel_action")
                    .table(ChannelLogs::Table)
                    .col(ChannelLogs::ChannelId)
                    .col(ChannelLogs::Action)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChannelLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NicknameLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MemberStatusLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VoiceLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessageAttachments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessageLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MessageLogs {
    Table,
    MessageId,
    UserId,
    ChannelId,
    Content,
    Timestamp,
    Edited,
}

#[derive(DeriveIden)]
enum MessageAttachments {
    Table,
    Id,
    MessageId,
    AttachmentId,
    Filename,
    ContentType,
    Size,
    Url,
    ProxyUrl,
    LocalPath,
    CachedAt,
}

#[derive(DeriveIden)]
enum VoiceLogs {
    Table,
    Id,
    UserId,
    ChannelId,
    Action,
    Timestamp,
}

#[derive(DeriveIden)]
enum MemberStatusLogs {
    Table,
    Id,
    UserId,
    GuildId,
    Status,
    ClientStatusDesktop,
    ClientStatusMobile,
    ClientStatusWeb,
    ActivityType,
    ActivityName,
    ActivityDetails,
    Timestamp,
}

#[derive(DeriveIden)]
enum NicknameLogs {
    Table,
    Id,
    UserId,
    GuildId,
    OldNickname,
    NewNickname,
    Timestamp,
}

#[derive(DeriveIden)]
enum ChannelLogs {
    Table,
    Id,
    ChannelId,
    GuildId,
    Action,
    FieldName,
    OldValue,
    NewValue,
    ActorId,
    Timestamp,
}
