//! Migration to create the scheduled-event tracking tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventLogs::EventId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(EventLogs::ChannelId).big_integer().null())
                    .col(ColumnDef::new(EventLogs::CreatorId).big_integer().null())
                    .col(ColumnDef::new(EventLogs::Name).string_len(255).not_null())
                    .col(ColumnDef::new(EventLogs::Description).text().null())
                    .col(
                        ColumnDef::new(EventLogs::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventLogs::EndTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EventLogs::Location).text().null())
                    .col(ColumnDef::new(EventLogs::Status).string_len(20).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventInterests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventInterests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventInterests::EventId).big_integer().not_null())
                    .col(ColumnDef::new(EventInterests::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(EventInterests::InterestType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventInterests::ExpressedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_interests_event_id")
                            .from(EventInterests::Table, EventInterests::EventId)
                            .to(EventLogs::Table, EventLogs::EventId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_event_interests_event_user")
                    .table(EventInterests::Table)
                    .col(EventInterests::EventId)
                    .col(EventInterests::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventUpdateLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventUpdateLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventUpdateLogs::EventId).big_integer().not_null())
                    .col(
                        ColumnDef::new(EventUpdateLogs::FieldName)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EventUpdateLogs::OldValue).text().null())
                    .col(ColumnDef::new(EventUpdateLogs::NewValue).text().null())
                    .col(ColumnDef::new(EventUpdateLogs::UpdatedBy).big_integer().null())
                    .col(
                        ColumnDef::new(EventUpdateLogs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_update_logs_event_id")
                            .from(EventUpdateLogs::Table, EventUpdateLogs::EventId)
                            .to(EventLogs::Table, EventLogs::EventId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_event_update_logs_updated_at")
                    .table(EventUpdateLogs::Table)
                    .col(EventUpdateLogs::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventUpdateLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventInterests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EventLogs {
    Table,
    EventId,
    GuildId,
    ChannelId,
    CreatorId,
    Name,
    Description,
    StartTime,
    EndTime,
    Location,
    Status,
}

#[derive(DeriveIden)]
enum EventInterests {
    Table,
    Id,
    EventId,
    UserId,
    InterestType,
    ExpressedAt,
}

#[derive(DeriveIden)]
enum EventUpdateLogs {
    Table,
    Id,
    EventId,
    FieldName,
    OldValue,
    NewValue,
    UpdatedBy,
    UpdatedAt,
}
