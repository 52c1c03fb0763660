//! Migration to create media recommendation, scan checkpoint, watchlist and Giphy cache tables.
//!
//! `media_recommendations` carries the uniqueness guard that makes repeated scans of the
//! same message a no-op. `channel_scan_history` holds one backfill cursor per channel.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MediaRecommendations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaRecommendations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::MessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::ChannelId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::GuildId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::MediaType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::Title)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaRecommendations::Url).text().null())
                    .col(
                        ColumnDef::new(MediaRecommendations::ConfidenceScore)
                            .float()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MediaRecommendations::MessageTimestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_media_recommendations_message_type_title")
                    .table(MediaRecommendations::Table)
                    .col(MediaRecommendations::MessageId)
                    .col(MediaRecommendations::MediaType)
                    .col(MediaRecommendations::Title)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MediaScanCheckpoint::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaScanCheckpoint::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MediaScanCheckpoint::LastScannedMessageId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MediaScanCheckpoint::LastScanTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MediaScanCheckpoint::MessagesScanned)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MediaScanCheckpoint::RecommendationsFound)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChannelScanHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelScanHistory::ChannelId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::GuildId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::OldestMessageId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::MessagesScanned)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::RecommendationsFound)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::ScanCompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChannelScanHistory::LastAttemptedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GlobalWatchlist::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GlobalWatchlist::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GlobalWatchlist::MediaType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GlobalWatchlist::Title).string_len(255).not_null())
                    .col(ColumnDef::new(GlobalWatchlist::Url).text().null())
                    .col(ColumnDef::new(GlobalWatchlist::Description).text().null())
                    .col(ColumnDef::new(GlobalWatchlist::AddedBy).big_integer().not_null())
                    .col(
                        ColumnDef::new(GlobalWatchlist::AddedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_global_watchlist_type_title")
                    .table(GlobalWatchlist::Table)
                    .col(GlobalWatchlist::MediaType)
                    .col(GlobalWatchlist::Title)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GlobalWatchlistVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GlobalWatchlistVotes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GlobalWatchlistVotes::WatchlistId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GlobalWatchlistVotes::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GlobalWatchlistVotes::VoteType)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GlobalWatchlistVotes::VotedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_global_watchlist_votes_watchlist_id")
                            .from(GlobalWatchlistVotes::Table, GlobalWatchlistVotes::WatchlistId)
                            .to(GlobalWatchlist::Table, GlobalWatchlist::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_global_watchlist_votes_watchlist_user")
                    .table(GlobalWatchlistVotes::Table)
                    .col(GlobalWatchlistVotes::WatchlistId)
                    .col(GlobalWatchlistVotes::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GiphyCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GiphyCache::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GiphyCache::SearchTerm).string_len(255).not_null())
                    .col(ColumnDef::new(GiphyCache::GifId).string_len(100).not_null())
                    .col(ColumnDef::new(GiphyCache::GifUrl).text().not_null())
                    .col(ColumnDef::new(GiphyCache::GifTitle).text().null())
                    .col(ColumnDef::new(GiphyCache::GifRating).string_len(10).null())
                    .col(ColumnDef::new(GiphyCache::Width).integer().null())
                    .col(ColumnDef::new(GiphyCache::Height).integer().null())
                    .col(ColumnDef::new(GiphyCache::FileSizeBytes).big_integer().null())
                    .col(
                        ColumnDef::new(GiphyCache::CachedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GiphyCache::LastUsed)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GiphyCache::UseCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_giphy_cache_term_gif")
                    .table(GiphyCache::Table)
                    .col(GiphyCache::SearchTerm)
                    .col(GiphyCache::GifId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_giphy_cache_last_used")
                    .table(GiphyCache::Table)
                    .col(GiphyCache::LastUsed)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GiphyCache::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GlobalWatchlistVotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GlobalWatchlist::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChannelScanHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaScanCheckpoint::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaRecommendations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MediaRecommendations {
    Table,
    Id,
    MessageId,
    UserId,
    ChannelId,
    GuildId,
    MediaType,
    Title,
    Url,
    ConfidenceScore,
    MessageTimestamp,
}

#[derive(DeriveIden)]
enum MediaScanCheckpoint {
    Table,
    Id,
    LastScannedMessageId,
    LastScanTime,
    MessagesScanned,
    RecommendationsFound,
}

#[derive(DeriveIden)]
enum ChannelScanHistory {
    Table,
    ChannelId,
    GuildId,
    OldestMessageId,
    MessagesScanned,
    RecommendationsFound,
    ScanCompletedAt,
    LastAttemptedAt,
}

#[derive(DeriveIden)]
enum GlobalWatchlist {
    Table,
    Id,
    MediaType,
    Title,
    Url,
    Description,
    AddedBy,
    AddedAt,
}

#[derive(DeriveIden)]
enum GlobalWatchlistVotes {
    Table,
    Id,
    WatchlistId,
    UserId,
    VoteType,
    VotedAt,
}

#[derive(DeriveIden)]
enum GiphyCache {
    Table,
    Id,
    SearchTerm,
    GifId,
    GifUrl,
    GifTitle,
    GifRating,
    Width,
    Height,
    FileSizeBytes,
    CachedAt,
    LastUsed,
    UseCount,
}
