//! Immutable token record structs, validity helpers, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Buffer subtracted from a token's lifetime so it is never handed out moments before it
/// expires mid-request.
pub const SAFETY_MARGIN: Duration = Duration::seconds(60);

/// Token type assumed when the issuer omits `token_type`.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no lifetime was configured.
	#[error("Token lifetime must be supplied via expires_in.")]
	MissingExpiry,
	/// Issued when the lifetime is zero or negative.
	#[error("Token lifetime must be positive.")]
	NonPositiveExpiry,
	/// Issued when `issued_at + expires_in` falls outside the representable date range.
	#[error("Token lifetime is too large to represent an expiry instant.")]
	UnrepresentableExpiry,
}

/// Immutable record describing an issued access token.
///
/// Records are created once per successful exchange and never mutated; newer records supersede
/// older ones in the store.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the issuer, usually `Bearer`.
	pub token_type: String,
	/// Scope string reported by the issuer, if any.
	pub scope: Option<String>,
	/// Local UTC instant at which the issuer response was received.
	pub issued_at: OffsetDateTime,
	/// Lifetime reported by the issuer.
	pub expires_in: Duration,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Instant at which the issuer considers the token expired.
	///
	/// Saturates at the edge of the date range for records assembled by hand; records from the
	/// builder are always in range.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at.saturating_add(self.expires_in)
	}

	/// Last instant (exclusive) at which the record may still be handed out.
	pub fn reusable_until(&self, margin: Duration) -> OffsetDateTime {
		self.expires_at().saturating_sub(margin)
	}

	/// Returns `true` iff `instant < issued_at + expires_in - margin`.
	///
	/// Records stamped slightly in the future (clock skew between writers) still count as
	/// reusable; only the upper bound matters for cache reuse.
	pub fn is_reusable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		instant < self.reusable_until(margin)
	}

	/// Convenience helper that checks reuse against the current UTC clock and [`SAFETY_MARGIN`].
	pub fn is_reusable(&self) -> bool {
		self.is_reusable_at(OffsetDateTime::now_utc(), SAFETY_MARGIN)
	}

	/// `Authorization` header value for downstream calls.
	pub fn authorization_header(&self) -> String {
		format!("{} {}", self.token_type, self.access_token.expose())
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	token_type: Option<String>,
	scope: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the token type; defaults to [`DEFAULT_TOKEN_TYPE`].
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets the lifetime reported by the issuer.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_blank())
			.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expires_in = self.expires_in.ok_or(TokenRecordBuilderError::MissingExpiry)?;

		if !expires_in.is_positive() {
			return Err(TokenRecordBuilderError::NonPositiveExpiry);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);

		if issued_at.checked_add(expires_in).is_none() {
			return Err(TokenRecordBuilderError::UnrepresentableExpiry);
		}

		let token_type = self
			.token_type
			.filter(|value| !value.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned());
		let scope = self.scope.filter(|value| !value.is_empty());

		Ok(TokenRecord {
			access_token,
			token_type,
			scope,
			issued_at,
			expires_in,
		})
	}
}
