//! PostgreSQL-backed [`TokenStore`] keeping the append-only token history.

// crates.io
use sqlx::{
	FromRow, PgPool,
	postgres::{PgConnectOptions, PgPoolOptions},
};
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	config::DatabaseSettings,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Table holding every issued token.
pub const TOKEN_TABLE: &str = "oauth_access_tokens";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS oauth_access_tokens (
	id BIGSERIAL PRIMARY KEY,
	access_token TEXT NOT NULL,
	token_type TEXT NOT NULL,
	issued_at TIMESTAMPTZ NOT NULL,
	expires_in INTEGER NOT NULL,
	scope TEXT
);
CREATE INDEX IF NOT EXISTS oauth_access_tokens_issued_at_idx
	ON oauth_access_tokens (issued_at DESC);
"#;
const FIND_VALID_SQL: &str = r#"
SELECT access_token, token_type, scope, issued_at, expires_in
FROM oauth_access_tokens
WHERE issued_at + (expires_in - $1::BIGINT) * INTERVAL '1 second' > $2
ORDER BY issued_at DESC
LIMIT 1
"#;
const INSERT_SQL: &str = r#"
INSERT INTO oauth_access_tokens (access_token, token_type, issued_at, expires_in, scope)
VALUES ($1, $2, $3, $4, $5)
"#;

/// Token store over a lazily connected PostgreSQL pool.
///
/// Each operation checks a connection out of the pool and returns it when the operation's
/// future completes, including on error paths. No connection is held between calls, so a slow
/// issuer round trip never pins a pooled connection.
#[derive(Clone, Debug)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	/// Builds a store whose pool connects on first use.
	pub fn connect_lazy(settings: &DatabaseSettings) -> Self {
		let options = PgConnectOptions::new()
			.host(&settings.host)
			.port(settings.port)
			.database(&settings.name)
			.username(&settings.user)
			.password(&settings.password);
		let pool = PgPoolOptions::new()
			.max_connections(settings.max_connections)
			.acquire_timeout(settings.acquire_timeout)
			.connect_lazy_with(options);

		Self { pool }
	}

	/// Wraps an existing pool.
	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Underlying pool.
	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Creates the token table and its `issued_at` index when they do not exist yet.
	pub async fn ensure_schema(&self) -> Result<(), StoreError> {
		sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await.map_err(classify)?;

		tracing::debug!(table = TOKEN_TABLE, "Token table schema ensured.");

		Ok(())
	}

	async fn insert(&self, record: TokenRecord) -> Result<(), StoreError> {
		let mut tx = self.pool.begin().await.map_err(classify)?;
		// An early return drops `tx`, which rolls the transaction back.
		let expires_in = i32::try_from(record.expires_in.whole_seconds()).map_err(|_| {
			StoreError::Serialization {
				message: format!(
					"expires_in {}s does not fit an INTEGER column",
					record.expires_in.whole_seconds()
				),
			}
		})?;

		sqlx::query(INSERT_SQL)
			.bind(record.access_token.expose())
			.bind(&record.token_type)
			.bind(record.issued_at)
			.bind(expires_in)
			.bind(record.scope.as_deref())
			.execute(&mut *tx)
			.await
			.map_err(classify)?;
		tx.commit().await.map_err(classify)?;

		tracing::debug!(issued_at = %record.issued_at, expires_in, "Token record persisted.");

		Ok(())
	}

	async fn select_valid(
		&self,
		now: OffsetDateTime,
		margin: Duration,
	) -> Result<Option<TokenRecord>, StoreError> {
		let mut conn = self.pool.acquire().await.map_err(classify)?;
		let row = sqlx::query_as::<_, TokenRow>(FIND_VALID_SQL)
			.bind(margin.whole_seconds())
			.bind(now)
			.fetch_optional(&mut *conn)
			.await
			.map_err(classify)?;

		row.map(TokenRow::into_record).transpose()
	}
}
impl TokenStore for PgStore {
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(self.insert(record))
	}

	fn find_valid(
		&self,
		now: OffsetDateTime,
		margin: Duration,
	) -> StoreFuture<'_, Option<TokenRecord>> {
		Box::pin(self.select_valid(now, margin))
	}
}

#[derive(FromRow)]
struct TokenRow {
	access_token: String,
	token_type: String,
	scope: Option<String>,
	issued_at: OffsetDateTime,
	expires_in: i32,
}
impl TokenRow {
	fn into_record(self) -> Result<TokenRecord, StoreError> {
		let mut builder = TokenRecord::builder()
			.access_token(self.access_token)
			.token_type(self.token_type)
			.issued_at(self.issued_at)
			.expires_in(Duration::seconds(self.expires_in.into()));

		if let Some(scope) = self.scope {
			builder = builder.scope(scope);
		}

		builder.build().map_err(|e| StoreError::Serialization { message: e.to_string() })
	}
}

fn classify(err: sqlx::Error) -> StoreError {
	match err {
		sqlx::Error::PoolTimedOut
		| sqlx::Error::PoolClosed
		| sqlx::Error::Io(_)
		| sqlx::Error::Tls(_)
		| sqlx::Error::Configuration(_) => StoreError::Unavailable { message: err.to_string() },
		other => StoreError::Backend { message: other.to_string() },
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn rows_become_records() {
		let row = TokenRow {
			access_token: "abc123".into(),
			token_type: "Bearer".into(),
			scope: Some("saldo".into()),
			issued_at: macros::datetime!(2025-01-01 00:00 UTC),
			expires_in: 3600,
		};
		let record = row.into_record().expect("Row fixture should convert.");

		assert_eq!(record.access_token.expose(), "abc123");
		assert_eq!(record.expires_at(), macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(record.scope.as_deref(), Some("saldo"));
	}

	#[test]
	fn corrupt_rows_are_serialization_errors() {
		let row = TokenRow {
			access_token: String::new(),
			token_type: "Bearer".into(),
			scope: None,
			issued_at: macros::datetime!(2025-01-01 00:00 UTC),
			expires_in: 3600,
		};

		assert!(matches!(row.into_record(), Err(StoreError::Serialization { .. })));
	}

	#[test]
	fn pool_failures_are_unavailable() {
		assert!(matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unavailable { .. }));
		assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::Backend { .. }));
	}
}
