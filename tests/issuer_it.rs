// crates.io
use httpmock::prelude::*;
// self
use mtls_token_broker::{
	_preludet::*,
	config::GrantMode,
	error::{ConfigError, MalformedResponseError, NetworkError},
	issuer::{ReqwestTransportErrorMapper, TokenIssuer},
};

const CLIENT_ID: &str = "client-issuer";
const TOKEN_PATH: &str = "/auth/server-mtls/v2/token";

#[tokio::test]
async fn issues_token_from_form_request() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.header("accept", "application/json")
				.body("grant_type=client_credentials&client_id=client-issuer");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"abc123xyz","token_type":"Bearer","expires_in":"3600","scope":"saldo"}"#,
			);
		})
		.await;
	let issuer = build_test_issuer(&server.url(TOKEN_PATH), CLIENT_ID);
	let before = OffsetDateTime::now_utc();
	let record = issuer.request_token().await.expect("Issuer should mint a token.");

	assert_eq!(record.access_token.expose(), "abc123xyz");
	assert_eq!(record.token_type, "Bearer");
	assert_eq!(record.scope.as_deref(), Some("saldo"));
	assert_eq!(record.expires_in, Duration::seconds(3600));
	assert!(record.issued_at >= before);
	assert!(record.is_reusable());

	mock.assert_async().await;
}

#[tokio::test]
async fn sends_client_secret_only_in_secret_mode() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body(
				"grant_type=client_credentials&client_id=client-issuer&client_secret=top+secret",
			);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"with-secret","expires_in":600}"#);
		})
		.await;
	let endpoint = Url::parse(&server.url(TOKEN_PATH)).expect("Mock endpoint should parse.");
	let issuer = TokenIssuer::with_http_client(
		CLIENT_ID,
		Some("top secret".into()),
		GrantMode::MtlsWithSecret,
		endpoint,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
	.expect("Secret-mode issuer should build.");
	let record = issuer.request_token().await.expect("Secret-mode exchange should succeed.");

	assert_eq!(record.access_token.expose(), "with-secret");

	mock.assert_async().await;
}

#[tokio::test]
async fn rejection_keeps_status_and_body() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_client"}"#);
		})
		.await;
	let issuer = build_test_issuer(&server.url(TOKEN_PATH), CLIENT_ID);
	let err = issuer.request_token().await.expect_err("401 must not produce a token.");

	match err {
		Error::AuthServer { status, body, .. } => {
			assert_eq!(status, 401);
			assert!(body.contains("invalid_client"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	mock.assert_async().await;
}

#[tokio::test]
async fn non_json_success_is_malformed() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "text/html").body("<html>maintenance</html>");
		})
		.await;

	let issuer = build_test_issuer(&server.url(TOKEN_PATH), CLIENT_ID);
	let err = issuer.request_token().await.expect_err("HTML body must be rejected.");

	assert!(matches!(err, Error::MalformedResponse(MalformedResponseError::Json { .. })));
}

#[tokio::test]
async fn missing_access_token_is_malformed() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"token_type":"Bearer","expires_in":3600}"#);
		})
		.await;

	let issuer = build_test_issuer(&server.url(TOKEN_PATH), CLIENT_ID);
	let err = issuer.request_token().await.expect_err("Body without a token must be rejected.");

	assert!(matches!(err, Error::MalformedResponse(MalformedResponseError::MissingAccessToken)));
}

#[tokio::test]
async fn empty_client_id_fails_without_network_calls() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;
	let endpoint = Url::parse(&server.url(TOKEN_PATH)).expect("Mock endpoint should parse.");
	let err = TokenIssuer::with_http_client(
		"",
		None,
		GrantMode::MtlsOnly,
		endpoint,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
	.expect_err("Empty client id must be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::MissingCredential { field: "client_id" })));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn unreachable_issuer_is_a_network_error() {
	let listener =
		std::net::TcpListener::bind("127.0.0.1:0").expect("Ephemeral port should be bindable.");
	let addr = listener.local_addr().expect("Listener should expose its address.");

	drop(listener);

	let issuer = build_test_issuer(&format!("http://{addr}{TOKEN_PATH}"), CLIENT_ID);
	let err = issuer.request_token().await.expect_err("Closed port must not produce a token.");

	assert!(
		matches!(err, Error::Network(NetworkError::Request { .. })),
		"Unexpected error: {err:?}."
	);
}
