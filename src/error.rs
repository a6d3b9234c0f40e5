//! Broker-level error types shared across the TLS builder, issuer, stores, and flows.

// std
use std::path::PathBuf;
// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Missing or invalid credentials, paths, or settings; raised before any I/O.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Client certificate or private key could not be used (usually a wrong password).
	#[error(transparent)]
	Certificate(#[from] CertificateError),
	/// Transport failure reaching the issuer or the API.
	#[error(transparent)]
	Network(#[from] NetworkError),
	/// Issuer (or the API behind it) was reachable but rejected the request.
	#[error("Server responded with HTTP {status}: {}.", body_preview(.body))]
	AuthServer {
		/// HTTP status code returned by the server.
		status: u16,
		/// Raw response body kept for diagnostics.
		body: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Issuer answered 2xx with a body that cannot be turned into a token.
	#[error(transparent)]
	MalformedResponse(#[from] MalformedResponseError),
	/// Balance response could not be turned into an amount.
	#[error(transparent)]
	Balance(#[from] crate::balance::BalanceError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}

/// Configuration and validation failures raised before any network attempt.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required environment variable is absent or blank.
	#[error("Environment variable `{name}` is required.")]
	MissingVariable {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable is present but cannot be parsed.
	#[error("Environment variable `{name}` is invalid: {reason}.")]
	InvalidVariable {
		/// Variable name.
		name: &'static str,
		/// Human-readable parse failure.
		reason: String,
	},
	/// A credential field required by the selected grant mode is empty.
	#[error("Credential field `{field}` must not be empty.")]
	MissingCredential {
		/// Credential field label.
		field: &'static str,
	},
	/// Certificate or key path does not point at an existing file.
	#[error("Credential file {} does not exist.", .path.display())]
	MissingFile {
		/// Offending path.
		path: PathBuf,
	},
	/// Certificate or key file exists but cannot be read.
	#[error("Credential file {} cannot be read.", .path.display())]
	UnreadableFile {
		/// Offending path.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Server certificate verification cannot be disabled against production.
	#[error("DANGER_ACCEPT_INVALID_CERTS is not allowed for the production issuer.")]
	InsecureProduction,
	/// Endpoint URL cannot be parsed or joined.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Client certificate failures, kept apart from [`NetworkError`] so a bad password is never
/// mistaken for an unreachable host.
#[derive(Debug, ThisError)]
pub enum CertificateError {
	/// Encrypted private key could not be decrypted with the configured password.
	#[error("Private key could not be decrypted; check CERT_PASSWORD.")]
	KeyDecryption {
		/// Underlying PKCS#8 failure.
		#[source]
		source: pkcs8::Error,
	},
	/// Private key file is not a PEM document this broker understands.
	#[error("Private key format is not supported: {reason}.")]
	UnsupportedKeyFormat {
		/// Why the key was rejected.
		reason: String,
	},
	/// Certificate and key could not be combined into a TLS identity.
	#[error("Client certificate and key do not form a usable TLS identity.")]
	Identity {
		/// Underlying TLS backend failure.
		#[source]
		source: ReqwestError,
	},
	/// TLS handshake with the issuer failed.
	#[error("TLS handshake with the issuer failed.")]
	Handshake {
		/// Underlying transport failure.
		#[source]
		source: BoxError,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum NetworkError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Request {
		/// Which endpoint was being called.
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured connect or read timeout.
	#[error("Request to {target} timed out.")]
	Timeout {
		/// Which endpoint was being called.
		target: &'static str,
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during an HTTP call.")]
	Io(#[from] std::io::Error),
	/// Transport reported a failure without a structured cause.
	#[error("HTTP client error occurred: {0}.")]
	Other(String),
}
/// Issuer returned a 2xx body that does not describe a token.
#[derive(Debug, ThisError)]
pub enum MalformedResponseError {
	/// Body is not JSON or does not match the token response shape.
	#[error("Response body is not the expected JSON at `{}`.", .source.path())]
	Json {
		/// Structured parsing failure including the failing field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Body parsed but `access_token` is absent or blank.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
	/// Body parsed but `expires_in` is absent.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// `expires_in` is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// `expires_in` is so large that the expiry instant cannot be represented.
	#[error("The expires_in value is out of range.")]
	ExpiresInOutOfRange,
}

impl From<crate::auth::TokenRecordBuilderError> for MalformedResponseError {
	fn from(e: crate::auth::TokenRecordBuilderError) -> Self {
		use crate::auth::TokenRecordBuilderError as BuilderError;

		match e {
			BuilderError::MissingAccessToken => Self::MissingAccessToken,
			BuilderError::MissingExpiry => Self::MissingExpiresIn,
			BuilderError::NonPositiveExpiry => Self::NonPositiveExpiresIn,
			BuilderError::UnrepresentableExpiry => Self::ExpiresInOutOfRange,
		}
	}
}

fn body_preview(body: &str) -> &str {
	const MAX: usize = 200;

	match body.char_indices().nth(MAX) {
		Some((idx, _)) => &body[..idx],
		None => body,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auth_server_error_truncates_long_bodies() {
		let body = "x".repeat(500);
		let err = Error::AuthServer { status: 401, body: body.clone(), retry_after: None };
		let rendered = err.to_string();

		assert!(rendered.starts_with("Server responded with HTTP 401: "));
		assert!(rendered.len() < body.len());
	}

	#[test]
	fn config_errors_name_the_missing_variable() {
		let err: Error = ConfigError::MissingVariable { name: "CLIENT_ID" }.into();

		assert!(matches!(err, Error::Config(ConfigError::MissingVariable { name: "CLIENT_ID" })));
		assert_eq!(err.to_string(), "Environment variable `CLIENT_ID` is required.");
	}
}
