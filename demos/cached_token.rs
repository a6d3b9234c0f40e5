//! Runs the broker against a mock issuer with the in-memory store: the first call mints a
//! token, the second reuses it without touching the issuer.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use mtls_token_broker::{
	config::GrantMode,
	flows::Broker,
	http::ReqwestHttpClient,
	issuer::{ReqwestTransportErrorMapper, TokenIssuer},
	reqwest::{Client, redirect::Policy},
	store::{MemoryStore, TokenStore},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/server-mtls/v2/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"demo-token-0123456789","token_type":"Bearer","expires_in":"3600","scope":"saldo"}"#,
			);
		})
		.await;
	// A real deployment builds this client with `tls::MtlsClientBuilder`.
	let http_client =
		ReqwestHttpClient::with_client(Client::builder().redirect(Policy::none()).build()?);
	let issuer = TokenIssuer::with_http_client(
		"demo-client",
		None,
		GrantMode::MtlsOnly,
		Url::parse(&server.url("/auth/server-mtls/v2/token"))?,
		http_client,
		ReqwestTransportErrorMapper,
	)?;
	let store = Arc::new(MemoryStore::default());
	let broker = Broker::new(store.clone() as Arc<dyn TokenStore>, issuer);
	let first = broker.try_access_token().await?;
	let second = broker.try_access_token().await?;

	println!("First token:  {}", first.preview());
	println!("Second token: {}", second.preview());
	println!("Stored records: {}", store.len());

	token_mock.assert_calls_async(1).await;

	Ok(())
}
