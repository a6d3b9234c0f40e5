// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
use parking_lot::Mutex;
// self
use mtls_token_broker::{
	_preludet::*,
	config::GrantMode,
	error::NetworkError,
	flows::Broker,
	http::TokenHttpClient,
	issuer::{TokenIssuer, TransportErrorMapper},
	store::{MemoryStore, TokenStore},
};

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

/// Transport that records every request body and answers with a canned outcome.
#[derive(Clone, Default)]
struct FakeHttpClient {
	bodies: Arc<Mutex<Vec<String>>>,
	fail: bool,
}
impl FakeHttpClient {
	fn failing() -> Self {
		Self { fail: true, ..Default::default() }
	}

	fn recorded_bodies(&self) -> Vec<String> {
		self.bodies.lock().clone()
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn handle(&self) -> Self::Handle {
		FakeHttpHandle { bodies: self.bodies.clone(), fail: self.fail }
	}
}

struct FakeHttpHandle {
	bodies: Arc<Mutex<Vec<String>>>,
	fail: bool,
}
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		self.bodies.lock().push(String::from_utf8_lossy(request.body()).into_owned());

		let fail = self.fail;

		Box::pin(async move {
			if fail {
				return Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)));
			}

			let mut response = HttpResponse::new(
				br#"{"access_token":"fake-token","token_type":"Bearer","expires_in":120}"#.to_vec(),
			);

			*response.status_mut() = StatusCode::OK;

			Ok(response)
		})
	}
}

#[derive(Clone, Default)]
struct RecordingTransportErrorMapper {
	targets: Arc<Mutex<Vec<&'static str>>>,
}
impl TransportErrorMapper<FakeTransportError> for RecordingTransportErrorMapper {
	fn map_transport_error(
		&self,
		target: &'static str,
		err: HttpClientError<FakeTransportError>,
	) -> Error {
		self.targets.lock().push(target);

		NetworkError::Other(format!("Fake transport error: {err}")).into()
	}
}

fn issuer(
	http_client: FakeHttpClient,
	mapper: RecordingTransportErrorMapper,
) -> TokenIssuer<FakeHttpClient, RecordingTransportErrorMapper> {
	TokenIssuer::with_http_client(
		"seam-client",
		None,
		GrantMode::MtlsOnly,
		Url::parse("https://issuer.test/token").expect("Endpoint fixture should parse."),
		http_client,
		mapper,
	)
	.expect("Issuer should build over the fake transport.")
}

#[tokio::test]
async fn broker_runs_over_a_custom_transport() {
	let http_client = FakeHttpClient::default();
	let store_backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = store_backend.clone();
	let broker = Broker::new(store, issuer(http_client.clone(), Default::default()));

	assert_eq!(broker.get_access_token().await.as_deref(), Some("fake-token"));
	assert_eq!(broker.get_access_token().await.as_deref(), Some("fake-token"));
	assert_eq!(
		http_client.recorded_bodies(),
		vec!["grant_type=client_credentials&client_id=seam-client".to_owned()]
	);
	assert_eq!(store_backend.len(), 1);
}

#[tokio::test]
async fn transport_errors_flow_through_the_mapper() {
	let mapper = RecordingTransportErrorMapper::default();
	let issuer = issuer(FakeHttpClient::failing(), mapper.clone());
	let err = issuer.request_token().await.expect_err("Failing transport must surface.");

	assert!(matches!(err, Error::Network(NetworkError::Other(_))));
	assert_eq!(*mapper.targets.lock(), vec!["the issuer"]);
}
