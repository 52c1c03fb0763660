//! Migration to create the system_settings key/value table and seed defaults.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SystemSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemSettings::SettingKey)
                            .string_len(100)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemSettings::SettingValue).text().not_null())
                    .to_owned(),
            )
            .await?;

        let seed = Query::insert()
            .into_table(SystemSettings::Table)
            .columns([SystemSettings::SettingKey, SystemSettings::SettingValue])
            .values_panic(["cache_media".into(), "false".into()])
            .values_panic(["snort_cooldown_seconds".into(), "30".into()])
            .on_conflict(
                OnConflict::column(SystemSettings::SettingKey)
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();

        let backend = manager.get_database_backend();
        manager
            .get_connection()
            .execute(backend.build(&seed))
            .await
            .map(|_| ())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SystemSettings {
    Table,
    SettingKey,
    SettingValue,
}
