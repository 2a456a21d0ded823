use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, EntityTrait, Schema, Set,
    Statement,
};
use url::Url;

use crate::entities::entry;
use crate::error::AppError;

pub const DOCUMENT_KEY: &str = "vtuber-todo/data";
pub const ACTIVE_KEY: &str = "vtuber-todo/active";
pub const UNRECOGNIZED_KEY: &str = "vtuber-todo/data.unrecognized";

const HOME_ENV: &str = "VTODO_HOME";

/// Durable string key-value storage backing the document store.
#[allow(async_fn_in_trait)]
pub trait Storage {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), AppError>;
}

pub struct SqliteStorage {
    db: DatabaseConnection,
}

impl SqliteStorage {
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        let db = connect(path).await?;
        ensure_schema(&db).await?;
        Ok(Self { db })
    }
}

impl Storage for SqliteStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(entry::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?
            .map(|model| model.payload))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), AppError> {
        let active = entry::ActiveModel {
            name: Set(key.to_string()),
            payload: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };
        entry::Entity::insert(active)
            .on_conflict(
                OnConflict::column(entry::Column::Name)
                    .update_columns([entry::Column::Payload, entry::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}

/// Data directory: explicit flag, then `VTODO_HOME`, then `$HOME/.vtodo`.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home).join(".vtodo"));
    }
    Err(AppError::Config(format!(
        "unable to resolve data directory; pass --data-dir or set {HOME_ENV}"
    )))
}

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vtodo.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::Config(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    tracing::debug!(url = %sqlite_url, "connecting to storage");
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA journal_mode = WAL;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut entry_stmt = schema.create_table_from_entity(entry::Entity);
    entry_stmt.if_not_exists();
    db.execute(builder.build(&entry_stmt)).await?;
    Ok(())
}
