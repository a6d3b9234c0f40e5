//! Storage contracts and built-in store implementations for issued token records.
//!
//! Stores are append-only histories: records are inserted once and superseded by newer
//! records, never updated or deleted. A lookup returns the most recently issued record that is
//! still reusable.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

// self
use crate::{_prelude::*, auth::TokenRecord};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by token stores.
///
/// Every operation acquires whatever backend resource it needs and releases it before its
/// future resolves; no connection outlives a single call.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Appends a record. Partial writes must never become visible.
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Returns the most recently issued record satisfying
	/// `now < issued_at + expires_in - margin`, if any.
	fn find_valid(
		&self,
		now: OffsetDateTime,
		margin: Duration,
	) -> StoreFuture<'_, Option<TokenRecord>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Backend cannot be reached or no connection could be acquired.
	#[error("Store unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A record value cannot be represented by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}

/// Read-side contract of the broker: lookup failures are logged and reported as a miss.
pub async fn find_valid_or_miss(
	store: &dyn TokenStore,
	now: OffsetDateTime,
	margin: Duration,
) -> Option<TokenRecord> {
	match store.find_valid(now, margin).await {
		Ok(found) => found,
		Err(e) => {
			tracing::warn!(error = %e, "Token store lookup failed; treating as cache miss.");

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as _;
	// self
	use super::*;

	struct BrokenStore;
	impl TokenStore for BrokenStore {
		fn save(&self, _: TokenRecord) -> StoreFuture<'_, ()> {
			Box::pin(async { Err(StoreError::Unavailable { message: "down".into() }) })
		}

		fn find_valid(&self, _: OffsetDateTime, _: Duration) -> StoreFuture<'_, Option<TokenRecord>> {
			Box::pin(async { Err(StoreError::Unavailable { message: "down".into() }) })
		}
	}

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = broker_error
			.source()
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[tokio::test]
	async fn lookup_failures_become_misses() {
		let found =
			find_valid_or_miss(&BrokenStore, OffsetDateTime::now_utc(), Duration::seconds(60))
				.await;

		assert!(found.is_none());
	}
}
