// crates.io
use httpmock::prelude::*;
// self
use mtls_token_broker::{
	_preludet::*,
	balance::{Amount, BalanceClient, BalanceError},
};

const BALANCE_PATH: &str = "/v1/fornecimento-saldos-contas/saldos";

fn client(server: &MockServer) -> BalanceClient {
	let endpoint = Url::parse(&server.url(BALANCE_PATH)).expect("Mock endpoint should parse.");

	BalanceClient::new(test_reqwest_http_client(), endpoint)
}

#[tokio::test]
async fn fetches_total_balance_with_bearer_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(BALANCE_PATH)
				.query_param("agencia", "1234")
				.query_param("conta", "56789")
				.header("authorization", "Bearer abc123");
			then.status(200).header("content-type", "application/json").body(
				r#"{"saldoCC":{"lstLancamentosSaldos":[
					{"nomeProduto":"SALDO BLOQUEADO","valorLancamento":"0,00"},
					{"nomeProduto":"SALDO TOTAL","valorLancamento":"12.345,67"}
				]}}"#,
			);
		})
		.await;
	let amount = client(&server)
		.fetch_balance("abc123", "1234", "56789")
		.await
		.expect("Balance should parse.");

	assert_eq!(amount, Amount::from_cents(1_234_567));
	assert_eq!(amount.to_string(), "12345.67");

	mock.assert_async().await;
}

#[tokio::test]
async fn missing_total_is_a_balance_error() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path(BALANCE_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"saldoCC":{"lstLancamentosSaldos":[]}}"#);
		})
		.await;

	let err = client(&server)
		.fetch_balance("abc123", "1234", "56789")
		.await
		.expect_err("Empty entry list has no total.");

	assert!(matches!(err, Error::Balance(BalanceError::TotalNotFound)));
}

#[tokio::test]
async fn blank_query_fields_fail_before_sending() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;
	let err = client(&server)
		.fetch_balance("abc123", " ", "56789")
		.await
		.expect_err("Blank agency must be rejected.");

	assert!(matches!(err, Error::Balance(BalanceError::EmptyField { field: "agency" })));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_token_surfaces_status() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path(BALANCE_PATH);
			then.status(401).body("token expired");
		})
		.await;

	let err = client(&server)
		.fetch_balance("stale", "1234", "56789")
		.await
		.expect_err("401 must surface.");

	assert!(matches!(err, Error::AuthServer { status: 401, .. }));
}
