use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_products_table::Migration),
            Box::new(m20240301_000002_create_cart_tables::Migration),
            Box::new(m20240301_000003_create_order_tables::Migration),
            Box::new(m20240301_000004_create_gateway_configs_table::Migration),
        ]
    }
}

mod m20240301_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Products::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Slug,
        UnitPrice,
        StockQuantity,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Carts::OwnerRef)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartLines::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartLines::Name).string().not_null())
                        .col(
                            ColumnDef::new(CartLines::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartLines::AddedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_lines_cart_id")
                                .from(CartLines::Table, CartLines::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_lines_cart_product")
                        .table(CartLines::Table)
                        .col(CartLines::CartId)
                        .col(CartLines::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        OwnerRef,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartLines {
        Table,
        Id,
        CartId,
        ProductId,
        Name,
        UnitPrice,
        Quantity,
        AddedAt,
    }
}

mod m20240301_000003_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OwnerRef).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Orders::SettledBy).string().null())
                        .col(ColumnDef::new(Orders::PaymentRef).string().null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::ShippingStreet).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingState).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingZip).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCountry).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingPhone).string().null())
                        .col(ColumnDef::new(Orders::CarrierOrderRef).string().null())
                        .col(ColumnDef::new(Orders::ShipmentRef).string().null())
                        .col(ColumnDef::new(Orders::TrackingCode).string().null())
                        .col(ColumnDef::new(Orders::CarrierName).string().null())
                        .col(ColumnDef::new(Orders::TrackingUrl).string().null())
                        .col(ColumnDef::new(Orders::LabelUrl).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_owner_ref")
                        .table(Orders::Table)
                        .col(Orders::OwnerRef)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::Name).string().not_null())
                        .col(
                            ColumnDef::new(OrderLines::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OwnerRef,
        Status,
        PaymentStatus,
        PaymentMethod,
        SettledBy,
        PaymentRef,
        TotalAmount,
        Currency,
        ShippingStreet,
        ShippingCity,
        ShippingState,
        ShippingZip,
        ShippingCountry,
        ShippingPhone,
        CarrierOrderRef,
        ShipmentRef,
        TrackingCode,
        CarrierName,
        TrackingUrl,
        LabelUrl,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        Name,
        UnitPrice,
        Quantity,
    }
}

mod m20240301_000004_create_gateway_configs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_gateway_configs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GatewayConfigs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GatewayConfigs::Id)
                                .string_len(32)
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GatewayConfigs::Enabled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(GatewayConfigs::Config).json().not_null())
                        .col(
                            ColumnDef::new(GatewayConfigs::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GatewayConfigs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum GatewayConfigs {
        Table,
        Id,
        Enabled,
        Config,
        UpdatedAt,
    }
}
