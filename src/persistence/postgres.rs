//! PostgreSQL implementation of the persistence layer.
//!
//! Documents live in the `documents` table as JSONB, one row per
//! `(collection, id)`. Unique keys live in `document_keys`, whose primary
//! key turns a duplicate claim into a unique violation inside the same
//! transaction as the document write.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{DocumentBackend, FieldFilter, UniqueKey};
use crate::config::ControlPlaneConfig;
use crate::domain::DocumentId;
use crate::error::ControlPlaneError;

/// PostgreSQL-backed document storage using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Creates a backend over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the database settings in `config` and applies the
    /// embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Persistence`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &ControlPlaneConfig) -> Result<Self, ControlPlaneError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ControlPlaneError::Persistence(format!("migration failed: {e}")))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres document store"
        );
        Ok(Self::new(pool))
    }
}

/// Maps a unique violation to [`ControlPlaneError::Conflict`], anything
/// else to [`ControlPlaneError::Persistence`].
fn map_write_error(err: sqlx::Error, collection: &str) -> ControlPlaneError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return ControlPlaneError::Conflict(format!(
            "unique key already taken in {collection}"
        ));
    }
    ControlPlaneError::from(err)
}

impl DocumentBackend for PostgresBackend {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
                .bind(collection)
                .bind(Uuid::from(id))
                .bind(&document)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, collection))?;

            for key in &unique {
                sqlx::query(
                    "INSERT INTO document_keys (collection, field, value, id) VALUES ($1, $2, $3, $4)",
                )
                .bind(collection)
                .bind(&key.field)
                .bind(&key.value)
                .bind(Uuid::from(id))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, collection))?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<Option<Value>, ControlPlaneError>> {
        Box::pin(async move {
            let body = sqlx::query_scalar::<_, Value>(
                "SELECT body FROM documents WHERE collection = $1 AND id = $2",
            )
            .bind(collection)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
            Ok(body)
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Option<FieldFilter>,
    ) -> BoxFuture<'a, Result<Vec<Value>, ControlPlaneError>> {
        Box::pin(async move {
            let rows = if let Some(filter) = filter {
                sqlx::query_scalar::<_, Value>(
                    "SELECT body FROM documents WHERE collection = $1 AND body -> $2 = $3 \
                     ORDER BY seq ASC",
                )
                .bind(collection)
                .bind(&filter.field)
                .bind(&filter.value)
                .fetch_all(&self.pool)
                .await
            } else {
                sqlx::query_scalar::<_, Value>(
                    "SELECT body FROM documents WHERE collection = $1 ORDER BY seq ASC",
                )
                .bind(collection)
                .fetch_all(&self.pool)
                .await
            }?;
            Ok(rows)
        })
    }

    fn replace<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
        document: Value,
        unique: Vec<UniqueKey>,
    ) -> BoxFuture<'a, Result<(), ControlPlaneError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let updated = sqlx::query(
                "UPDATE documents SET body = $3, updated_at = now() \
                 WHERE collection = $1 AND id = $2",
            )
            .bind(collection)
            .bind(Uuid::from(id))
            .bind(&document)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(ControlPlaneError::not_found(collection, id));
            }

            sqlx::query("DELETE FROM document_keys WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(Uuid::from(id))
                .execute(&mut *tx)
                .await?;
            for key in &unique {
                sqlx::query(
                    "INSERT INTO document_keys (collection, field, value, id) VALUES ($1, $2, $3, $4)",
                )
                .bind(collection)
                .bind(&key.field)
                .bind(&key.value)
                .bind(Uuid::from(id))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, collection))?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        id: DocumentId,
    ) -> BoxFuture<'a, Result<bool, ControlPlaneError>> {
        Box::pin(async move {
            // document_keys rows go with the document via ON DELETE CASCADE.
            let deleted = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(Uuid::from(id))
                .execute(&self.pool)
                .await?;
            Ok(deleted.rows_affected() > 0)
        })
    }
}
