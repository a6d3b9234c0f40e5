//! Client-credentials token broker for mTLS-authenticated banking APIs.
//!
//! The broker presents a password-protected client certificate to the issuer, reuses cached
//! tokens until they near expiry, and keeps an append-only token history in PostgreSQL.

#![deny(clippy::all, missing_docs)]

pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod issuer;
pub mod obs;
pub mod store;
pub mod tls;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers shared by integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::GrantMode,
		flows::{Broker, ReqwestBroker},
		http::ReqwestHttpClient,
		issuer::{ReqwestTransportErrorMapper, TokenIssuer},
		store::{MemoryStore, TokenStore},
	};

	/// Issuer type alias used by reqwest-backed integration tests.
	pub type ReqwestTestIssuer = TokenIssuer<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a plain reqwest HTTP client for talking to `httpmock` servers.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs an mTLS-only issuer pointed at the provided token endpoint.
	pub fn build_test_issuer(token_endpoint: &str, client_id: &str) -> ReqwestTestIssuer {
		let endpoint = Url::parse(token_endpoint).expect("Mock token endpoint should parse.");

		TokenIssuer::with_http_client(
			client_id,
			None,
			GrantMode::MtlsOnly,
			endpoint,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.expect("Test issuer should accept the fixture credentials.")
	}

	/// Constructs a [`Broker`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	pub fn build_test_broker(
		token_endpoint: &str,
		client_id: &str,
	) -> (ReqwestBroker, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let broker = Broker::new(store, build_test_issuer(token_endpoint, client_id));

		(broker, store_backend)
	}

	/// Absolute path of a file under `tests/fixtures`.
	pub fn fixture_path(name: &str) -> std::path::PathBuf {
		std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::RwLock;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
