use migration::MigratorTrait;
use sea_orm::{ ConnectOptions, Database, DatabaseConnection };

/// Fresh in-memory SQLite database with all migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory file.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.expect("connect sqlite");
    migration::Migrator::up(&db, None).await.expect("run migrations");
    db
}
