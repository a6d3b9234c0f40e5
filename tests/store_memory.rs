// crates.io
use time::macros;
// self
use mtls_token_broker::{
	_preludet::*,
	auth::{SAFETY_MARGIN, TokenRecord},
	store::{MemoryStore, TokenStore},
};

fn record(token: &str, issued_at: OffsetDateTime, expires_in: i64) -> TokenRecord {
	TokenRecord::builder()
		.access_token(token)
		.token_type("Bearer")
		.scope("saldo")
		.issued_at(issued_at)
		.expires_in(Duration::seconds(expires_in))
		.build()
		.expect("Token record fixture should build.")
}

#[tokio::test]
async fn reuse_window_boundary() {
	let store = MemoryStore::default();
	let issued = macros::datetime!(2025-03-01 12:00 UTC);
	let lifetime = Duration::seconds(3600);

	store.save(record("boundary", issued, 3600)).await.expect("Save should succeed.");

	let early = store
		.find_valid(issued + lifetime - Duration::seconds(61), SAFETY_MARGIN)
		.await
		.expect("Lookup should succeed.");
	let late = store
		.find_valid(issued + lifetime - Duration::seconds(59), SAFETY_MARGIN)
		.await
		.expect("Lookup should succeed.");

	assert_eq!(early.map(|r| r.access_token.into_inner()).as_deref(), Some("boundary"));
	assert!(late.is_none());
}

#[tokio::test]
async fn most_recent_valid_record_wins() {
	let store = MemoryStore::default();
	let base = macros::datetime!(2025-03-01 12:00 UTC);

	store.save(record("older", base, 3600)).await.expect("Save should succeed.");
	store
		.save(record("newer", base + Duration::minutes(10), 3600))
		.await
		.expect("Save should succeed.");
	store
		.save(record("newest-expired", base + Duration::minutes(20), 60))
		.await
		.expect("Save should succeed.");

	let found = store
		.find_valid(base + Duration::minutes(30), SAFETY_MARGIN)
		.await
		.expect("Lookup should succeed.")
		.expect("A reusable record should be found.");

	assert_eq!(found.access_token.expose(), "newer");
	assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn saved_record_round_trips() {
	let store = MemoryStore::default();
	let saved = record("round-trip", OffsetDateTime::now_utc(), 3600);

	store.save(saved.clone()).await.expect("Save should succeed.");

	let found = store
		.find_valid(OffsetDateTime::now_utc(), SAFETY_MARGIN)
		.await
		.expect("Lookup should succeed.")
		.expect("Fresh record should be reusable.");

	assert_eq!(found.access_token, saved.access_token);
	assert_eq!(found.token_type, saved.token_type);
	assert_eq!(found.scope, saved.scope);
}

#[tokio::test]
async fn history_is_append_only() {
	let store = MemoryStore::default();
	let issued = OffsetDateTime::now_utc();

	store.save(record("same", issued, 3600)).await.expect("Save should succeed.");
	store.save(record("same", issued, 3600)).await.expect("Save should succeed.");

	assert_eq!(store.records().len(), 2);
}
