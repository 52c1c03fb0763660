//! Migration to create the poll tracking tables.
//!
//! Answers and votes cascade on deletion of their parent poll.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PollLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollLogs::PollId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollLogs::MessageId).big_integer().not_null())
                    .col(ColumnDef::new(PollLogs::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(PollLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(PollLogs::CreatorId).big_integer().not_null())
                    .col(ColumnDef::new(PollLogs::Question).text().not_null())
                    .col(
                        ColumnDef::new(PollLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollLogs::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PollLogs::IsMultiselect)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PollLogs::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollAnswers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollAnswers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollAnswers::PollId).string_len(64).not_null())
                    .col(ColumnDef::new(PollAnswers::AnswerId).integer().not_null())
                    .col(ColumnDef::new(PollAnswers::AnswerText).text().not_null())
                    .col(ColumnDef::new(PollAnswers::Emoji).string_len(100).null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_answers_poll_id")
                            .from(PollAnswers::Table, PollAnswers::PollId)
                            .to(PollLogs::Table, PollLogs::PollId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollVotes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollVotes::PollId).string_len(64).not_null())
                    .col(ColumnDef::new(PollVotes::UserId).big_integer().not_null())
                    .col(ColumnDef::new(PollVotes::AnswerId).integer().not_null())
                    .col(
                        ColumnDef::new(PollVotes::VotedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_votes_poll_id")
                            .from(PollVotes::Table, PollVotes::PollId)
                            .to(PollLogs::Table, PollLogs::PollId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_poll_votes_poll_user_answer")
                    .table(PollVotes::Table)
                    .col(PollVotes::PollId)
                    .col(PollVotes::UserId)
                    .col(PollVotes::AnswerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollVotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollAnswers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PollLogs {
    Table,
    PollId,
    MessageId,
    ChannelId,
    GuildId,
    CreatorId,
    Question,
    CreatedAt,
    ExpiresAt,
    IsMultiselect,
    ClosedAt,
}

#[derive(DeriveIden)]
enum PollAnswers {
    Table,
    Id,
    PollId,
    AnswerId,
    AnswerText,
    Emoji,
}

#[derive(DeriveIden)]
enum PollVotes {
    Table,
    Id,
    PollId,
    UserId,
    AnswerId,
    VotedAt,
}
