use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(clipcast_scheduler_migration::Migrator).await;
}
