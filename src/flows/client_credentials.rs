//! Cached client-credentials token retrieval.
//!
//! [`Broker::try_access_token`] runs the two-state machine: a reusable stored token is returned
//! without touching the network; otherwise the issuer mints a new one, which is persisted and
//! returned. A failed write-back is logged and does not withhold the fresh token.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	flows::Broker,
	http::TokenHttpClient,
	issuer::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a reusable access token, minting and storing a new one on a miss.
	///
	/// Store read failures count as a miss and store write failures are only logged; issuer,
	/// certificate, and configuration failures are returned.
	pub async fn try_access_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::AccessToken;

		let span = FlowSpan::new(KIND, "try_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let now = OffsetDateTime::now_utc();

				if let Some(record) =
					store::find_valid_or_miss(self.store.as_ref(), now, self.safety_margin()).await
				{
					tracing::debug!(
						expires_at = %record.expires_at(),
						"Reusing stored access token."
					);

					return Ok((record.access_token, FlowOutcome::CacheHit));
				}

				tracing::info!("No reusable access token stored; requesting a new one.");

				let record = self.issuer.request_token().await?;

				tracing::info!(
					token = %record.access_token.preview(),
					expires_in = record.expires_in.whole_seconds(),
					"Issued new access token."
				);

				if let Err(e) = self.store.save(record.clone()).await {
					tracing::warn!(error = %e, "Failed to persist the issued token; returning it anyway.");
				}

				Ok::<_, Error>((record.access_token, FlowOutcome::Issued))
			})
			.await;

		match result {
			Ok((token, outcome)) => {
				obs::record_flow_outcome(KIND, outcome);

				Ok(token)
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Boundary helper returning the bare token string, or `None` after logging the failure.
	pub async fn get_access_token(&self) -> Option<String> {
		match self.try_access_token().await {
			Ok(token) => Some(token.into_inner()),
			Err(e) => {
				tracing::error!(error = %e, "Could not obtain an access token.");

				None
			},
		}
	}
}
