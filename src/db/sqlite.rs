use crate::db::models::{DbDataServer, DbUser};
use crate::db::schema::SQLITE_INIT;
use crate::error::BridgeError;
use crate::types::DataServerInfo;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub type SqlitePool = Pool<Sqlite>;

const DATA_SERVER_COLUMNS: &str = r#"id, name, routine, primary_keys, description,
    get_example, post_example, requires_filter, filter_format, keywords,
    common_errors, consumption_tips, filter_tips, usage_examples, notes,
    last_documentation_update, documentation_author"#;

/// Open (creating if needed) the SQLite database, retrying transient failures.
pub async fn connect(database_url: &str) -> Result<SqlitePool, BridgeError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let retry_policy = ExponentialBuilder::default()
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(5);

    let pool = (|| async {
        SqlitePoolOptions::new()
            .connect_with(connect_opts.clone())
            .await
    })
    .retry(retry_policy)
    .notify(|err, dur: Duration| {
        warn!("database connect failed: {}, retrying in {:?}", err, dur);
    })
    .await?;
    Ok(pool)
}

/// Initialize the schema by executing the bundled DDL.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), BridgeError> {
    // sqlx::query runs a single statement
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

fn decode_err<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(decode_err)?
        .with_timezone(&Utc))
}

/// The DataServer catalog.
#[derive(Clone)]
pub struct CatalogStorage {
    pool: SqlitePool,
}

impl CatalogStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the row with the same name. Returns the row id.
    pub async fn upsert(&self, ds: &DataServerInfo) -> Result<i64, BridgeError> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_on(&mut conn, ds).await
    }

    /// Batch upsert using a single transaction. Returns ids in the same order.
    pub async fn upsert_many(&self, items: &[DataServerInfo]) -> Result<Vec<i64>, BridgeError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(items.len());
        for ds in items {
            ids.push(Self::upsert_on(&mut tx, ds).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn upsert_on(
        conn: &mut sqlx::SqliteConnection,
        ds: &DataServerInfo,
    ) -> Result<i64, BridgeError> {
        let primary_keys = serde_json::to_string(&ds.primary_keys)?;
        let keywords = serde_json::to_string(&ds.keywords)?;
        let doc_update = ds.last_documentation_update.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO data_servers (
                name, routine, primary_keys, description, get_example, post_example,
                requires_filter, filter_format, keywords, common_errors, consumption_tips,
                filter_tips, usage_examples, notes, last_documentation_update,
                documentation_author
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                routine=excluded.routine,
                primary_keys=excluded.primary_keys,
                description=excluded.description,
                get_example=excluded.get_example,
                post_example=excluded.post_example,
                requires_filter=excluded.requires_filter,
                filter_format=excluded.filter_format,
                keywords=excluded.keywords,
                common_errors=excluded.common_errors,
                consumption_tips=excluded.consumption_tips,
                filter_tips=excluded.filter_tips,
                usage_examples=excluded.usage_examples,
                notes=excluded.notes,
                last_documentation_update=excluded.last_documentation_update,
                documentation_author=excluded.documentation_author
            "#,
        )
        .bind(&ds.name)
        .bind(&ds.routine)
        .bind(primary_keys)
        .bind(&ds.description)
        .bind(&ds.get_example)
        .bind(&ds.post_example)
        .bind(ds.requires_filter as i64)
        .bind(&ds.filter_format)
        .bind(keywords)
        .bind(&ds.common_errors)
        .bind(&ds.consumption_tips)
        .bind(&ds.filter_tips)
        .bind(&ds.usage_examples)
        .bind(&ds.notes)
        .bind(doc_update)
        .bind(&ds.documentation_author)
        .execute(&mut *conn)
        .await?;

        let rec: (i64,) = sqlx::query_as("SELECT id FROM data_servers WHERE name = ?")
            .bind(&ds.name)
            .fetch_one(&mut *conn)
            .await?;
        Ok(rec.0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<DataServerInfo>, BridgeError> {
        let sql = format!("SELECT {DATA_SERVER_COLUMNS} FROM data_servers WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_info).transpose()
    }

    /// Exact-name lookup.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<DataServerInfo>, BridgeError> {
        let sql = format!("SELECT {DATA_SERVER_COLUMNS} FROM data_servers WHERE name = ?");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_info).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<DataServerInfo>, BridgeError> {
        let sql = format!("SELECT {DATA_SERVER_COLUMNS} FROM data_servers ORDER BY name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_info).collect()
    }

    pub async fn list_names(&self, limit: i64) -> Result<Vec<String>, BridgeError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM data_servers ORDER BY name LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Names containing `term`, first `limit` by name. A blank term matches all.
    pub async fn search_by_name(
        &self,
        term: &str,
        limit: i64,
    ) -> Result<Vec<DataServerInfo>, BridgeError> {
        let sql = format!(
            "SELECT {DATA_SERVER_COLUMNS} FROM data_servers \
             WHERE name LIKE '%' || ? || '%' ORDER BY name LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(term.trim())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_info).collect()
    }

    /// Rows whose name, routine or description contain `term`.
    pub async fn search_text(&self, term: &str) -> Result<Vec<DataServerInfo>, BridgeError> {
        let sql = format!(
            "SELECT {DATA_SERVER_COLUMNS} FROM data_servers \
             WHERE name LIKE '%' || ?1 || '%' \
                OR routine LIKE '%' || ?1 || '%' \
                OR description LIKE '%' || ?1 || '%' \
             ORDER BY name"
        );
        let rows = sqlx::query(&sql)
            .bind(term.trim())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_info).collect()
    }

    pub async fn count(&self) -> Result<i64, BridgeError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM data_servers")
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    fn row_to_model(row: SqliteRow) -> Result<DbDataServer, BridgeError> {
        let primary_keys_json: String = row.try_get("primary_keys")?;
        let keywords_json: String = row.try_get("keywords")?;
        let requires_filter: i64 = row.try_get("requires_filter")?;
        let doc_update: Option<String> = row.try_get("last_documentation_update")?;

        let primary_keys: Vec<String> =
            serde_json::from_str(&primary_keys_json).map_err(decode_err)?;
        let keywords: Vec<String> = serde_json::from_str(&keywords_json).map_err(decode_err)?;
        let last_documentation_update = doc_update.as_deref().map(parse_time).transpose()?;

        Ok(DbDataServer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            routine: row.try_get("routine")?,
            primary_keys,
            description: row.try_get("description")?,
            get_example: row.try_get("get_example")?,
            post_example: row.try_get("post_example")?,
            requires_filter: requires_filter != 0,
            filter_format: row.try_get("filter_format")?,
            keywords,
            common_errors: row.try_get("common_errors")?,
            consumption_tips: row.try_get("consumption_tips")?,
            filter_tips: row.try_get("filter_tips")?,
            usage_examples: row.try_get("usage_examples")?,
            notes: row.try_get("notes")?,
            last_documentation_update,
            documentation_author: row.try_get("documentation_author")?,
        })
    }

    fn row_to_info(row: SqliteRow) -> Result<DataServerInfo, BridgeError> {
        Self::row_to_model(row).map(Into::into)
    }
}

/// Accounts that have logged in at least once.
#[derive(Clone)]
pub struct UserStorage {
    pool: SqlitePool,
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the account on first login, otherwise refresh its base URL.
    /// `mark_admin` only ever raises the stored flag.
    pub async fn upsert_login(
        &self,
        username: &str,
        base_url: &str,
        mark_admin: bool,
    ) -> Result<DbUser, BridgeError> {
        sqlx::query(
            r#"
            INSERT INTO users (username, base_url, is_admin, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                base_url=excluded.base_url,
                is_admin=MAX(users.is_admin, excluded.is_admin)
            "#,
        )
        .bind(username)
        .bind(base_url)
        .bind(mark_admin as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_by_username(username)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("user '{username}' not found")))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<DbUser>, BridgeError> {
        let row = sqlx::query(
            "SELECT id, username, base_url, is_admin, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<DbUser>, BridgeError> {
        let rows = sqlx::query(
            "SELECT id, username, base_url, is_admin, created_at FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    fn row_to_model(row: SqliteRow) -> Result<DbUser, BridgeError> {
        let is_admin: i64 = row.try_get("is_admin")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(DbUser {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            base_url: row.try_get("base_url")?,
            is_admin: is_admin != 0,
            created_at: parse_time(&created_at)?,
        })
    }
}
