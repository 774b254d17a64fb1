use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

use pet_registry_core::types::{NewPet, PetChanges, PetRecord, Sex};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PET_COLUMNS: &str =
    "id, user_id, nome, tipo, idade_anos, idade_meses, sexo, created_at, updated_at";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// File databases are created when missing. Pragmas are part of the connect
    /// options so every pooled connection carries them.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to operate on pet records.
    pub fn pets(&self) -> PetRepository {
        PetRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for pet records.
///
/// Every lookup and mutation filters on both the record id and the owner id,
/// so a record owned by someone else is indistinguishable from a missing one.
#[derive(Clone)]
pub struct PetRepository {
    pool: SqlitePool,
}

impl PetRepository {
    /// Lists every pet owned by `owner_id`, oldest first.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<PetRecord>, PetStoreError> {
        let rows = sqlx::query_as::<_, PetRow>(&format!(
            "SELECT {PET_COLUMNS} FROM pets WHERE user_id = ? ORDER BY id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PetRow::into_domain).collect()
    }

    /// Inserts a new pet for `owner_id`, defaulting missing months to zero.
    pub async fn insert(
        &self,
        owner_id: &str,
        pet: &NewPet,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, PetStoreError> {
        let timestamp = to_rfc3339(now);
        let row = sqlx::query_as::<_, PetRow>(&format!(
            "INSERT INTO pets \
             (user_id, nome, tipo, idade_anos, idade_meses, sexo, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {PET_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(&pet.nome)
        .bind(&pet.tipo)
        .bind(pet.idade_anos)
        .bind(pet.months_or_default())
        .bind(pet.sexo.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    /// Loads a single pet owned by `owner_id`.
    pub async fn find_for_owner(
        &self,
        owner_id: &str,
        pet_id: i64,
    ) -> Result<PetRecord, PetStoreError> {
        let row = sqlx::query_as::<_, PetRow>(&format!(
            "SELECT {PET_COLUMNS} FROM pets WHERE id = ? AND user_id = ?"
        ))
        .bind(pet_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PetStoreError::NotFound)?;

        row.into_domain()
    }

    /// Applies the supplied changes in a single statement and bumps `updated_at`.
    ///
    /// Fields left as `None` keep their stored value.
    pub async fn update_for_owner(
        &self,
        owner_id: &str,
        pet_id: i64,
        changes: &PetChanges,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, PetStoreError> {
        let row = sqlx::query_as::<_, PetRow>(&format!(
            "UPDATE pets \
             SET nome = COALESCE(?, nome), \
                 tipo = COALESCE(?, tipo), \
                 idade_anos = COALESCE(?, idade_anos), \
                 idade_meses = COALESCE(?, idade_meses), \
                 sexo = COALESCE(?, sexo), \
                 updated_at = ? \
             WHERE id = ? AND user_id = ? \
             RETURNING {PET_COLUMNS}"
        ))
        .bind(changes.nome.as_deref())
        .bind(changes.tipo.as_deref())
        .bind(changes.idade_anos)
        .bind(changes.idade_meses)
        .bind(changes.sexo.map(Sex::as_str))
        .bind(to_rfc3339(now))
        .bind(pet_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PetStoreError::NotFound)?;

        row.into_domain()
    }

    /// Permanently removes a pet owned by `owner_id`.
    pub async fn delete_for_owner(&self, owner_id: &str, pet_id: i64) -> Result<(), PetStoreError> {
        let result = sqlx::query("DELETE FROM pets WHERE id = ? AND user_id = ?")
            .bind(pet_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PetStoreError::NotFound);
        }
        Ok(())
    }
}

/// Raw `pets` row as stored in SQLite.
#[derive(Debug, sqlx::FromRow)]
pub struct PetRow {
    pub id: i64,
    pub user_id: String,
    pub nome: String,
    pub tipo: String,
    pub idade_anos: i64,
    pub idade_meses: i64,
    pub sexo: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PetRow {
    /// Converts the database row into a domain record.
    pub fn into_domain(self) -> Result<PetRecord, PetStoreError> {
        let sexo = Sex::from_str(&self.sexo)
            .map_err(|_| PetStoreError::CorruptRow(self.id, "sexo"))?;
        if self.idade_anos < 0 {
            return Err(PetStoreError::CorruptRow(self.id, "idade_anos"));
        }
        if !(0..=11).contains(&self.idade_meses) {
            return Err(PetStoreError::CorruptRow(self.id, "idade_meses"));
        }

        Ok(PetRecord {
            id: self.id,
            user_id: self.user_id,
            nome: self.nome,
            tipo: self.tipo,
            idade_anos: self.idade_anos,
            idade_meses: self.idade_meses,
            sexo,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Errors that can occur while reading or mutating pets.
#[derive(Debug, Error)]
pub enum PetStoreError {
    #[error("pet not found")]
    NotFound,
    #[error("pet {0} has an invalid {1} column")]
    CorruptRow(i64, &'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
