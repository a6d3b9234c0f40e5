//! Token issuer: one client-credentials exchange against the mTLS token endpoint.
//!
//! The issuer is pure with respect to storage. It builds the form request, sends it through a
//! [`TokenHttpClient`], and turns the response into a [`TokenRecord`] or a typed [`Error`];
//! persisting the record is the broker's job.

// crates.io
use oauth2::{
	HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use serde::{Deserializer, de::Error as _};
// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	config::{Credentials, GrantMode, Settings},
	error::{CertificateError, ConfigError, MalformedResponseError, NetworkError},
	http::{ReqwestHttpClient, TokenHttpClient, parse_retry_after},
	tls::{self, MtlsClientBuilder},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const ISSUER_TARGET: &str = "the issuer";

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] raised while calling `target` into a broker error.
	fn map_transport_error(&self, target: &'static str, error: HttpClientError<E>) -> Error;
}

/// Default mapper for reqwest-backed transports.
///
/// TLS failures anywhere in the source chain become [`CertificateError::Handshake`]; timeouts
/// and everything else reachable-host related become [`NetworkError`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		target: &'static str,
		error: HttpClientError<ReqwestError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => map_reqwest_error(target, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) =>
				if tls::is_tls_failure(&inner) {
					CertificateError::Handshake { source: Box::new(inner) }.into()
				} else {
					NetworkError::Io(inner).into()
				},
			HttpClientError::Other(message) => NetworkError::Other(message).into(),
			_ => NetworkError::Other(format!("unknown transport failure calling {target}")).into(),
		}
	}
}

fn map_reqwest_error(target: &'static str, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if tls::is_tls_failure(&err) {
		return CertificateError::Handshake { source: Box::new(err) }.into();
	}
	if err.is_timeout() {
		return NetworkError::Timeout { target, source: Box::new(err) }.into();
	}

	NetworkError::Request { target, source: Box::new(err) }.into()
}

/// Issues client-credentials tokens from a single mTLS token endpoint.
pub struct TokenIssuer<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client_id: String,
	client_secret: Option<TokenSecret>,
	grant_mode: GrantMode,
	token_endpoint: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl TokenIssuer<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the mTLS client described by `settings` and an issuer for its environment.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		let http_client =
			MtlsClientBuilder::new(&settings.credentials, &settings.issuer).build_http_client()?;
		let token_endpoint = settings.issuer.environment.token_endpoint()?;

		Self::from_credentials(
			&settings.credentials,
			settings.issuer.grant_mode,
			token_endpoint,
			http_client,
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an issuer from the credential bundle; the certificate itself already lives in
	/// `http_client`.
	pub fn from_credentials(
		credentials: &Credentials,
		grant_mode: GrantMode,
		token_endpoint: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		Self::with_http_client(
			credentials.client_id.clone(),
			credentials.client_secret.clone(),
			grant_mode,
			token_endpoint,
			http_client,
			error_mapper,
		)
	}

	/// Creates an issuer over a caller-supplied transport. Performs no I/O.
	pub fn with_http_client(
		client_id: impl Into<String>,
		client_secret: Option<String>,
		grant_mode: GrantMode,
		token_endpoint: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let client_id = client_id.into();

		if client_id.trim().is_empty() {
			return Err(ConfigError::MissingCredential { field: "client_id" }.into());
		}

		let client_secret = match grant_mode {
			GrantMode::MtlsOnly => {
				if client_secret.is_some() {
					tracing::debug!("Client secret configured but unused in mtls_only mode.");
				}

				None
			},
			GrantMode::MtlsWithSecret => Some(
				client_secret
					.filter(|secret| !secret.trim().is_empty())
					.map(TokenSecret::new)
					.ok_or(ConfigError::MissingCredential { field: "client_secret" })?,
			),
		};

		Ok(Self {
			client_id,
			client_secret,
			grant_mode,
			token_endpoint,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Token endpoint this issuer posts to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Grant mode this issuer was configured with.
	pub fn grant_mode(&self) -> GrantMode {
		self.grant_mode
	}

	/// Transport shared with other callers of the same mTLS session.
	pub fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	/// Performs one client-credentials exchange.
	pub async fn request_token(&self) -> Result<TokenRecord> {
		let request = self.build_request()?;
		let handle = self.http_client.handle();

		tracing::debug!(
			endpoint = %self.token_endpoint,
			grant_mode = self.grant_mode.as_str(),
			"Requesting client-credentials token."
		);

		let response = oauth2::AsyncHttpClient::call(&handle, request)
			.await
			.map_err(|e| self.error_mapper.map_transport_error(ISSUER_TARGET, e))?;

		parse_token_response(response)
	}

	fn build_request(&self) -> Result<HttpRequest> {
		let body = self.form_body();
		let request = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(self.token_endpoint.as_str())
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.header(ACCEPT, JSON_CONTENT_TYPE)
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;

		Ok(request)
	}

	fn form_body(&self) -> String {
		let mut form = url::form_urlencoded::Serializer::new(String::new());

		form.append_pair("grant_type", "client_credentials");
		form.append_pair("client_id", &self.client_id);

		if let Some(secret) = &self.client_secret {
			form.append_pair("client_secret", secret.expose());
		}

		form.finish()
	}
}
impl<C, M> Debug for TokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer")
			.field("client_id", &crate::auth::truncate(&self.client_id, 6))
			.field("grant_mode", &self.grant_mode)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.finish_non_exhaustive()
	}
}

#[derive(Deserialize)]
struct TokenResponseBody {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default, deserialize_with = "expires_in_seconds")]
	expires_in: Option<i64>,
	#[serde(default)]
	scope: Option<String>,
}

fn expires_in_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Seconds(i64),
		Text(String),
	}

	match Option::<Raw>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Raw::Seconds(secs)) => Ok(Some(secs)),
		Some(Raw::Text(text)) => text
			.trim()
			.parse::<i64>()
			.map(Some)
			.map_err(|_| D::Error::custom(format!("expires_in `{text}` is not an integer"))),
	}
}

fn parse_token_response(response: HttpResponse) -> Result<TokenRecord> {
	let status = response.status();

	if !status.is_success() {
		let retry_after = parse_retry_after(response.headers());
		let body = String::from_utf8_lossy(response.body()).into_owned();

		tracing::debug!(status = status.as_u16(), "Issuer rejected the token request.");

		return Err(Error::AuthServer { status: status.as_u16(), body, retry_after });
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let parsed: TokenResponseBody = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| MalformedResponseError::Json { source, status: status.as_u16() })?;
	let mut builder = TokenRecord::builder().issued_now();

	if let Some(token) = parsed.access_token {
		builder = builder.access_token(token);
	}
	if let Some(token_type) = parsed.token_type {
		builder = builder.token_type(token_type);
	}
	if let Some(scope) = parsed.scope {
		builder = builder.scope(scope);
	}
	if let Some(secs) = parsed.expires_in {
		builder = builder.expires_in(Duration::seconds(secs));
	}

	builder.build().map_err(|e| MalformedResponseError::from(e).into())
}
