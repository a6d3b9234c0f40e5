//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreLog = Arc<RwLock<Vec<TokenRecord>>>;

/// Append-only token history kept in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreLog);
impl MemoryStore {
	/// Snapshot of every record saved so far, oldest first.
	pub fn records(&self) -> Vec<TokenRecord> {
		self.0.read().clone()
	}

	/// Number of records saved so far.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing has been saved.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn save_now(log: StoreLog, record: TokenRecord) -> Result<(), StoreError> {
		log.write().push(record);

		Ok(())
	}

	fn find_now(log: StoreLog, now: OffsetDateTime, margin: Duration) -> Option<TokenRecord> {
		log.read()
			.iter()
			.filter(|record| record.is_reusable_at(now, margin))
			.max_by_key(|record| record.issued_at)
			.cloned()
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let log = self.0.clone();

		Box::pin(async move { Self::save_now(log, record) })
	}

	fn find_valid(
		&self,
		now: OffsetDateTime,
		margin: Duration,
	) -> StoreFuture<'_, Option<TokenRecord>> {
		let log = self.0.clone();

		Box::pin(async move { Ok(Self::find_now(log, now, margin)) })
	}
}
