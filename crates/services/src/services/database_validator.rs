//! Schema sanity check reported by the health endpoint.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;

/// Tables every request path depends on
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "groups",
    "group_members",
    "domains",
    "skills",
    "skill_levels",
    "sources",
    "assessments",
    "assessment_skills",
    "assessment_sources",
    "attempts",
    "results",
    "disputes",
];

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ValidationResult {
    pub is_initialized: bool,
    pub migrations_applied: i64,
    pub latest_migration: Option<String>,
    pub missing_tables: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.is_initialized && self.missing_tables.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.is_initialized {
            "Database not initialized - migrations need to be run".to_string()
        } else if !self.missing_tables.is_empty() {
            format!("Missing tables: {}", self.missing_tables.join(", "))
        } else {
            format!("Database OK - {} migrations applied", self.migrations_applied)
        }
    }
}

pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn validate(&self) -> Result<ValidationResult, DatabaseValidationError> {
        let migrations_table_exists = self.table_exists("_sqlx_migrations").await?;
        if !migrations_table_exists {
            warn!("Database not initialized - _sqlx_migrations table does not exist");
            return Ok(ValidationResult {
                is_initialized: false,
                migrations_applied: 0,
                latest_migration: None,
                missing_tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
            });
        }

        let migrations_applied =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&self.pool)
                .await?;
        let latest_migration = sqlx::query_scalar::<_, String>(
            "SELECT description FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let mut missing_tables = Vec::new();
        for table in REQUIRED_TABLES {
            if !self.table_exists(table).await? {
                missing_tables.push(table.to_string());
            }
        }
        if !missing_tables.is_empty() {
            warn!(missing = ?missing_tables, "Database is missing tables");
        }

        debug!(migrations_applied, "Database validation complete");
        Ok(ValidationResult {
            is_initialized: true,
            migrations_applied,
            latest_migration,
            missing_tables,
        })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use db::models::test_support::pool;

    use super::*;

    #[tokio::test]
    async fn test_migrated_database_is_ok() {
        let result = DatabaseValidator::new(pool().await).validate().await.unwrap();
        assert!(result.is_ok(), "{}", result.summary());
        assert!(result.migrations_applied >= 1);
        assert_eq!(result.latest_migration.as_deref(), Some("init"));
    }

    #[tokio::test]
    async fn test_empty_database_is_not_initialized() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let result = DatabaseValidator::new(pool).validate().await.unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.missing_tables.len(), REQUIRED_TABLES.len());
    }
}
