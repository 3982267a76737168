use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use crate::error::AppResult;

pub async fn connect_and_migrate(database_url: &str) -> AppResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    configure_sqlite(&db).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Applied per-connection on sqlite. foreign_keys must be ON so deleting a
/// diary entry cascades to its review.
pub async fn configure_sqlite(db: &DatabaseConnection) -> AppResult<()> {
    for pragma in
        ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA foreign_keys=ON"]
    {
        db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string())).await?;
    }
    Ok(())
}
