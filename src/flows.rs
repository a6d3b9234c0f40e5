//! Token orchestration: serve a stored token or mint and persist a new one.

mod client_credentials;

// self
use crate::{
	_prelude::*,
	auth::SAFETY_MARGIN,
	config::Settings,
	http::{ReqwestHttpClient, TokenHttpClient},
	issuer::{ReqwestTransportErrorMapper, TokenIssuer, TransportErrorMapper},
	store::TokenStore,
};

/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates the token store and the issuer for a single credential set.
///
/// The broker holds no token state of its own. Each call looks the store up, falls back to the
/// issuer on a miss, and writes the fresh record back; the three steps run strictly one after
/// another and nothing is shared between concurrent calls.
pub struct Broker<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Token history consulted before every issuance.
	pub store: Arc<dyn TokenStore>,
	/// Issuer called on a cache miss.
	pub issuer: TokenIssuer<C, M>,
	safety_margin: Duration,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker using the default [`SAFETY_MARGIN`].
	pub fn new(store: Arc<dyn TokenStore>, issuer: TokenIssuer<C, M>) -> Self {
		Self { store, issuer, safety_margin: SAFETY_MARGIN }
	}

	/// Overrides how long before expiry a stored token stops being handed out.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin;

		self
	}

	/// Margin currently applied to stored tokens.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}
}
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the mTLS client, issuer, and broker described by `settings`.
	///
	/// Fails fast on configuration and certificate problems; no network call is made.
	pub fn from_settings(settings: &Settings, store: Arc<dyn TokenStore>) -> Result<Self> {
		settings.credentials.validate(settings.issuer.grant_mode)?;

		let issuer = TokenIssuer::from_settings(settings)?;

		tracing::info!(
			environment = settings.issuer.environment.as_str(),
			grant_mode = settings.issuer.grant_mode.as_str(),
			"Token broker configured."
		);

		Ok(Self::new(store, issuer))
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("issuer", &self.issuer)
			.field("safety_margin", &self.safety_margin)
			.finish_non_exhaustive()
	}
}
