//! Balance inquiry client: the downstream consumer of broker-issued tokens.
//!
//! Calls go out over the same mTLS session as the token request. The `SALDO TOTAL` entry of the
//! response is parsed from Brazilian notation (`1.234,56`) into an exact [`Amount`].

// crates.io
use oauth2::{
	HttpResponse,
	http::{
		Method,
		header::{ACCEPT, AUTHORIZATION},
	},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, MalformedResponseError},
	http::{ReqwestHttpClient, TokenHttpClient},
	issuer::{ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Product name of the balance entry that carries the account total.
pub const TOTAL_PRODUCT: &str = "SALDO TOTAL";

const BALANCE_TARGET: &str = "the balance endpoint";

/// Failures specific to interpreting a balance response.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum BalanceError {
	/// A query parameter or the bearer token is blank.
	#[error("Balance query field `{field}` must not be empty.")]
	EmptyField {
		/// Offending field.
		field: &'static str,
	},
	/// Response has no `SALDO TOTAL` entry with a value.
	#[error("Balance response has no SALDO TOTAL entry.")]
	TotalNotFound,
	/// `valorLancamento` is not a Brazilian-formatted decimal.
	#[error("Balance value `{value}` is not a valid amount.")]
	InvalidAmount {
		/// Raw value received.
		value: String,
	},
}

/// Monetary amount stored as integer cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);
impl Amount {
	/// Builds an amount from cents.
	pub const fn from_cents(cents: i64) -> Self {
		Self(cents)
	}

	/// Value in cents.
	pub const fn cents(self) -> i64 {
		self.0
	}

	/// Parses Brazilian notation: `.` groups thousands and `,` separates at most two decimals.
	pub fn parse_brl(raw: &str) -> Result<Self, BalanceError> {
		let invalid = || BalanceError::InvalidAmount { value: raw.to_owned() };
		let trimmed = raw.trim();
		let (negative, digits) = match trimmed.strip_prefix('-') {
			Some(rest) => (true, rest),
			None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
		};
		let (grouped, fraction) = digits.split_once(',').unwrap_or((digits, ""));
		let mut groups = grouped.split('.');
		let leading = groups.next().unwrap_or_default();
		let mut whole = leading.to_owned();

		// Thousands separators split the integer part into a 1-3 digit head and 3-digit groups.
		if grouped.contains('.') && !(1..=3).contains(&leading.len()) {
			return Err(invalid());
		}
		for group in groups {
			if group.len() != 3 {
				return Err(invalid());
			}

			whole.push_str(group);
		}
		if whole.is_empty()
			|| fraction.len() > 2
			|| !whole.bytes().all(|b| b.is_ascii_digit())
			|| !fraction.bytes().all(|b| b.is_ascii_digit())
		{
			return Err(invalid());
		}

		let units = whole.parse::<i64>().map_err(|_| invalid())?;
		let cents = match fraction.len() {
			0 => 0,
			1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
			_ => fraction.parse::<i64>().map_err(|_| invalid())?,
		};
		let total = units.checked_mul(100).and_then(|v| v.checked_add(cents)).ok_or_else(invalid)?;

		Ok(Self(if negative { -total } else { total }))
	}
}
impl FromStr for Amount {
	type Err = BalanceError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse_brl(s)
	}
}
impl Display for Amount {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let sign = if self.0 < 0 { "-" } else { "" };
		let abs = self.0.unsigned_abs();

		write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
	}
}

#[derive(Deserialize)]
struct BalanceResponse {
	#[serde(rename = "saldoCC")]
	saldo_cc: AccountBalances,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountBalances {
	#[serde(default)]
	lst_lancamentos_saldos: Vec<BalanceEntry>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
	#[serde(default)]
	nome_produto: Option<String>,
	#[serde(default)]
	valor_lancamento: Option<String>,
}

/// Queries account balances with a bearer token.
pub struct BalanceClient<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl BalanceClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client over the shared reqwest mTLS session.
	pub fn new(http_client: impl Into<Arc<ReqwestHttpClient>>, endpoint: Url) -> Self {
		Self::with_mapper(http_client, endpoint, ReqwestTransportErrorMapper)
	}
}
impl<C, M> BalanceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over any transport and error mapper.
	pub fn with_mapper(
		http_client: impl Into<Arc<C>>,
		endpoint: Url,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { endpoint, http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Fetches the `SALDO TOTAL` of `account` at `agency`.
	pub async fn fetch_balance(&self, token: &str, agency: &str, account: &str) -> Result<Amount> {
		const KIND: FlowKind = FlowKind::Balance;

		let span = FlowSpan::new(KIND, "fetch_balance");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				for (field, value) in [("token", token), ("agency", agency), ("account", account)] {
					if value.trim().is_empty() {
						return Err(BalanceError::EmptyField { field }.into());
					}
				}

				let mut url = self.endpoint.clone();

				url.query_pairs_mut().append_pair("agencia", agency).append_pair("conta", account);

				let request = oauth2::http::Request::builder()
					.method(Method::GET)
					.uri(url.as_str())
					.header(AUTHORIZATION, format!("Bearer {token}"))
					.header(ACCEPT, "application/json")
					.body(Vec::new())
					.map_err(ConfigError::from)?;
				let handle = self.http_client.handle();
				let response = oauth2::AsyncHttpClient::call(&handle, request)
					.await
					.map_err(|e| self.error_mapper.map_transport_error(BALANCE_TARGET, e))?;

				parse_balance_response(response)
			})
			.await;

		match &result {
			Ok(amount) => {
				tracing::info!(agency, %amount, "Balance retrieved.");
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(e) => {
				tracing::warn!(agency, error = %e, "Balance inquiry failed.");
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}
}
impl<C, M> Debug for BalanceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BalanceClient").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

fn parse_balance_response(response: HttpResponse) -> Result<Amount> {
	let status = response.status();

	if !status.is_success() {
		return Err(Error::AuthServer {
			status: status.as_u16(),
			body: String::from_utf8_lossy(response.body()).into_owned(),
			retry_after: crate::http::parse_retry_after(response.headers()),
		});
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let parsed: BalanceResponse = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| MalformedResponseError::Json { source, status: status.as_u16() })?;
	let raw = parsed
		.saldo_cc
		.lst_lancamentos_saldos
		.into_iter()
		.find(|entry| entry.nome_produto.as_deref() == Some(TOTAL_PRODUCT))
		.and_then(|entry| entry.valor_lancamento)
		.ok_or(BalanceError::TotalNotFound)?;

	Ok(Amount::parse_brl(&raw)?)
}
