//! `ConfirmationStore` over a single `confirmations` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType};
use confirm_storage::{ConfirmationFilter, ConfirmationStore, StorageError, prepare_for_write};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgPool, Postgres};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::{migrations, pool};

const SELECT_DOC: &str = "SELECT key, doc FROM confirmations";

#[derive(Debug, Clone)]
enum Bind {
    Text(String),
    Texts(Vec<String>),
}

/// WHERE clause assembled from a sparse filter, with positional binds.
#[derive(Debug, Default)]
struct WhereClause {
    conditions: Vec<String>,
    binds: Vec<Bind>,
}

impl WhereClause {
    fn push(&mut self, template: &str, bind: Bind) {
        self.binds.push(bind);
        let placeholder = format!("${}", self.binds.len());
        self.conditions.push(template.replace("{}", &placeholder));
    }

    fn push_text(&mut self, column: &str, value: &Option<String>) {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            self.push(&format!("{column} = {{}}"), Bind::Text(v.to_string()));
        }
    }

    fn from_filter(filter: &ConfirmationFilter, statuses: &[ConfirmationStatus]) -> Self {
        let mut clause = Self::default();
        clause.push_text("key", &filter.key);
        if !filter.types.is_empty() {
            let types = filter.types.iter().map(|t| t.as_str().to_string()).collect();
            clause.push("type = ANY({})", Bind::Texts(types));
        }
        if let Some(status) = filter.status {
            clause.push("status = {}", Bind::Text(status.as_str().to_string()));
        }
        if !statuses.is_empty() {
            let statuses = statuses.iter().map(|s| s.as_str().to_string()).collect();
            clause.push("status = ANY({})", Bind::Texts(statuses));
        }
        clause.push_text("creator_id", &filter.creator_id);
        clause.push_text("user_id", &filter.user_id);
        clause.push_text("email", &filter.email.as_deref().map(confirm_core::normalize_email));
        clause.push_text("clinic_id", &filter.clinic_id);
        clause.push_text("team_id", &filter.team_id);

        if let Some(recipient) = &filter.recipient {
            clause.binds.push(Bind::Text(recipient.user_id.clone().unwrap_or_default()));
            let user = clause.binds.len();
            clause.binds.push(Bind::Texts(recipient.emails.clone()));
            let emails = clause.binds.len();
            clause
                .conditions
                .push(format!("(user_id = ${user} OR email = ANY(${emails}))"));
        }
        clause
    }

    fn sql(&self, head: &str, tail: &str) -> String {
        if self.conditions.is_empty() {
            format!("{head} {tail}")
        } else {
            format!("{head} WHERE {} {tail}", self.conditions.join(" AND "))
        }
    }
}

fn time_to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_else(Utc::now)
}

fn decode(key: String, doc: serde_json::Value) -> Result<Confirmation> {
    serde_json::from_value(doc).map_err(|source| PostgresError::Decode { key, source })
}

/// PostgreSQL-backed confirmation store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects, and runs migrations when configured to.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool; the schema must already be migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select(&self, sql: &str, binds: &[Bind]) -> Result<Vec<Confirmation>> {
        let mut q = query_as::<Postgres, (String, serde_json::Value)>(sql);
        for bind in binds {
            q = match bind {
                Bind::Text(v) => q.bind(v.clone()),
                Bind::Texts(v) => q.bind(v.clone()),
            };
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|(key, doc)| decode(key, doc)).collect()
    }

    async fn upsert_inner(&self, record: &Confirmation) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        query(
            r#"
            INSERT INTO confirmations (
                key, type, status, creator_id, user_id, email, clinic_id, team_id,
                created, modified, doc
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (key) DO UPDATE SET
                type = EXCLUDED.type,
                status = EXCLUDED.status,
                creator_id = EXCLUDED.creator_id,
                user_id = EXCLUDED.user_id,
                email = EXCLUDED.email,
                clinic_id = EXCLUDED.clinic_id,
                team_id = EXCLUDED.team_id,
                modified = EXCLUDED.modified,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(&record.key)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(&record.creator_id)
        .bind(record.user_id.as_deref())
        .bind(record.email.as_deref())
        .bind(record.clinic_id.as_deref())
        .bind(record.team_id())
        .bind(time_to_chrono(record.created))
        .bind(time_to_chrono(record.modified))
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfirmationStore for PostgresStore {
    #[instrument(skip(self, record), fields(key = %record.key, kind = %record.kind))]
    async fn upsert(&self, record: &Confirmation) -> std::result::Result<(), StorageError> {
        let stored = prepare_for_write(record)?;
        self.upsert_inner(&stored).await?;
        debug!("Upserted confirmation");
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &ConfirmationFilter,
    ) -> std::result::Result<Option<Confirmation>, StorageError> {
        let clause = WhereClause::from_filter(filter, &[]);
        let sql = clause.sql(SELECT_DOC, "ORDER BY created DESC, key ASC LIMIT 1");
        Ok(self.select(&sql, &clause.binds).await?.into_iter().next())
    }

    async fn find_many(
        &self,
        filter: &ConfirmationFilter,
        statuses: &[ConfirmationStatus],
    ) -> std::result::Result<Vec<Confirmation>, StorageError> {
        let clause = WhereClause::from_filter(filter, statuses);
        let sql = clause.sql(SELECT_DOC, "ORDER BY created DESC, key ASC");
        Ok(self.select(&sql, &clause.binds).await?)
    }

    async fn remove(&self, key: &str) -> std::result::Result<bool, StorageError> {
        let result = query("DELETE FROM confirmations WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn remove_all_for_user(&self, user_id: &str) -> std::result::Result<u64, StorageError> {
        let result = query("DELETE FROM confirmations WHERE creator_id = $1 OR user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        Ok(result.rows_affected())
    }

    async fn count_since(
        &self,
        kind: ConfirmationType,
        user_id: &str,
        since: OffsetDateTime,
    ) -> std::result::Result<u64, StorageError> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM confirmations WHERE type = $1 AND user_id = $2 AND created >= $3",
        )
        .bind(kind.as_str())
        .bind(user_id)
        .bind(time_to_chrono(since))
        .fetch_one(&self.pool)
        .await
        .map_err(PostgresError::from)?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> std::result::Result<(), StorageError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        Ok(())
    }
}
