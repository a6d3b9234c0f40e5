//! Immutable process settings assembled once at startup.
//!
//! [`Settings::from_env`] is the only place that reads ambient process state. Everything else
//! receives `&Settings` (or one of its sections) explicitly, so the TLS builder, issuer, and
//! stores never consult environment variables on their own.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, error::ConfigError};

/// Path of the token endpoint on every issuer host.
pub const TOKEN_PATH: &str = "/auth/server-mtls/v2/token";
/// Path of the balance inquiry endpoint on every issuer host.
pub const BALANCE_PATH: &str = "/v1/fornecimento-saldos-contas/saldos";

/// How the client proves its identity to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantMode {
	/// Identity comes from the client certificate alone; `client_secret` is never sent.
	#[default]
	MtlsOnly,
	/// Certificate plus a `client_secret` form parameter.
	MtlsWithSecret,
}
impl GrantMode {
	/// Returns the configuration label for the mode.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantMode::MtlsOnly => "mtls_only",
			GrantMode::MtlsWithSecret => "mtls_with_secret",
		}
	}
}
impl FromStr for GrantMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"mtls_only" => Ok(Self::MtlsOnly),
			"mtls_with_secret" => Ok(Self::MtlsWithSecret),
			other => Err(format!("expected mtls_only or mtls_with_secret, got `{other}`")),
		}
	}
}
impl Display for GrantMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Issuer deployment the broker talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerEnvironment {
	/// Sandbox hosts used for integration testing.
	Sandbox,
	/// Production hosts.
	#[default]
	Production,
}
impl IssuerEnvironment {
	/// Returns the configuration label for the environment.
	pub const fn as_str(self) -> &'static str {
		match self {
			IssuerEnvironment::Sandbox => "sandbox",
			IssuerEnvironment::Production => "production",
		}
	}

	/// Base URL shared by the token and business endpoints.
	pub const fn base_url(self) -> &'static str {
		match self {
			IssuerEnvironment::Sandbox => "https://openapisandbox.prebanco.com.br",
			IssuerEnvironment::Production => "https://openapi.bradesco.com.br",
		}
	}

	/// Token endpoint for the environment.
	pub fn token_endpoint(self) -> Result<Url, ConfigError> {
		join_endpoint(self.base_url(), TOKEN_PATH)
	}

	/// Balance inquiry endpoint for the environment.
	pub fn balance_endpoint(self) -> Result<Url, ConfigError> {
		join_endpoint(self.base_url(), BALANCE_PATH)
	}
}
impl FromStr for IssuerEnvironment {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"sandbox" => Ok(Self::Sandbox),
			"production" => Ok(Self::Production),
			other => Err(format!("expected sandbox or production, got `{other}`")),
		}
	}
}
impl Display for IssuerEnvironment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Client identity material: the credential bundle loaded once per process.
#[derive(Clone)]
pub struct Credentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret, only sent when [`GrantMode::MtlsWithSecret`] is selected.
	pub client_secret: Option<String>,
	/// PEM certificate (chain) presented during the TLS handshake.
	pub cert_path: PathBuf,
	/// PEM private key matching the certificate, usually PKCS#8-encrypted.
	pub key_path: PathBuf,
	/// Password protecting the private key.
	pub key_password: String,
}
impl Credentials {
	/// Fails with [`ConfigError::MissingCredential`] when a field the grant mode needs is blank.
	pub fn validate(&self, grant_mode: GrantMode) -> Result<(), ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::MissingCredential { field: "client_id" });
		}
		if self.cert_path.as_os_str().is_empty() {
			return Err(ConfigError::MissingCredential { field: "cert_path" });
		}
		if self.key_path.as_os_str().is_empty() {
			return Err(ConfigError::MissingCredential { field: "key_path" });
		}
		if self.key_password.is_empty() {
			return Err(ConfigError::MissingCredential { field: "key_password" });
		}
		if grant_mode == GrantMode::MtlsWithSecret
			&& self.client_secret.as_deref().is_none_or(|secret| secret.trim().is_empty())
		{
			return Err(ConfigError::MissingCredential { field: "client_secret" });
		}

		Ok(())
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("client_id", &crate::auth::truncate(&self.client_id, 6))
			.field("client_secret_set", &self.client_secret.is_some())
			.field("cert_path", &self.cert_path)
			.field("key_path", &self.key_path)
			.field("key_password", &"<redacted>")
			.finish()
	}
}

/// Issuer connection settings.
#[derive(Clone, Debug)]
pub struct IssuerSettings {
	/// Which deployment to call.
	pub environment: IssuerEnvironment,
	/// Whether `client_secret` accompanies the certificate.
	pub grant_mode: GrantMode,
	/// Disables server certificate verification; never allowed in production.
	pub danger_accept_invalid_certs: bool,
	/// Upper bound on TCP + TLS connection establishment.
	pub connect_timeout: std::time::Duration,
	/// Upper bound on a whole request, response body included.
	pub request_timeout: std::time::Duration,
}
impl IssuerSettings {
	/// Default connect timeout.
	pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
	/// Default request timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

	/// Rejects combinations that would silently weaken TLS.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.danger_accept_invalid_certs && self.environment == IssuerEnvironment::Production {
			return Err(ConfigError::InsecureProduction);
		}

		Ok(())
	}
}
impl Default for IssuerSettings {
	fn default() -> Self {
		Self {
			environment: IssuerEnvironment::default(),
			grant_mode: GrantMode::default(),
			danger_accept_invalid_certs: false,
			connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

/// PostgreSQL connection parameters for the token history table.
#[derive(Clone)]
pub struct DatabaseSettings {
	/// Database host.
	pub host: String,
	/// Database port.
	pub port: u16,
	/// Database name.
	pub name: String,
	/// Login role.
	pub user: String,
	/// Login password.
	pub password: String,
	/// Pool size cap.
	pub max_connections: u32,
	/// How long an operation waits for a pooled connection.
	pub acquire_timeout: std::time::Duration,
}
impl DatabaseSettings {
	/// Default pool size cap.
	pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
	/// Default acquire timeout.
	pub const DEFAULT_ACQUIRE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
}
impl Debug for DatabaseSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DatabaseSettings")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("name", &self.name)
			.field("user", &self.user)
			.field("password", &"<redacted>")
			.field("max_connections", &self.max_connections)
			.field("acquire_timeout", &self.acquire_timeout)
			.finish()
	}
}

/// Complete, validated process configuration.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Client identity.
	pub credentials: Credentials,
	/// Issuer connection settings.
	pub issuer: IssuerSettings,
	/// Token history database.
	pub database: DatabaseSettings,
}
impl Settings {
	/// Reads every setting from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads every setting through `lookup`, which maps a variable name to its value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let vars = Lookup(lookup);
		let issuer = IssuerSettings {
			environment: vars.parsed_or("ISSUER_ENVIRONMENT", IssuerEnvironment::default())?,
			grant_mode: vars.parsed_or("GRANT_MODE", GrantMode::default())?,
			danger_accept_invalid_certs: vars.flag("DANGER_ACCEPT_INVALID_CERTS")?,
			connect_timeout: vars
				.seconds_or("HTTP_CONNECT_TIMEOUT_SECS", IssuerSettings::DEFAULT_CONNECT_TIMEOUT)?,
			request_timeout: vars
				.seconds_or("HTTP_TIMEOUT_SECS", IssuerSettings::DEFAULT_REQUEST_TIMEOUT)?,
		};
		let credentials = Credentials {
			client_id: vars.required("CLIENT_ID")?,
			client_secret: match issuer.grant_mode {
				GrantMode::MtlsOnly => None,
				GrantMode::MtlsWithSecret => Some(vars.required_secret("CLIENT_SECRET")?),
			},
			cert_path: vars.required("CERT_FILE")?.into(),
			key_path: vars.required("KEY_FILE")?.into(),
			key_password: vars.required_secret("CERT_PASSWORD")?,
		};
		let database = DatabaseSettings {
			host: vars.required("DB_HOST")?,
			port: vars.required_parsed("DB_PORT")?,
			name: vars.required("DB_NAME")?,
			user: vars.required("DB_USER")?,
			password: vars.required_secret("DB_PASSWORD")?,
			max_connections: vars
				.parsed_or("DB_MAX_CONNECTIONS", DatabaseSettings::DEFAULT_MAX_CONNECTIONS)?,
			acquire_timeout: vars
				.seconds_or("DB_ACQUIRE_TIMEOUT_SECS", DatabaseSettings::DEFAULT_ACQUIRE_TIMEOUT)?,
		};

		credentials.validate(issuer.grant_mode)?;
		issuer.validate()?;

		Ok(Self { credentials, issuer, database })
	}
}

struct Lookup<F>(F);
impl<F> Lookup<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn optional(&self, name: &'static str) -> Option<String> {
		(self.0)(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
	}

	fn required(&self, name: &'static str) -> Result<String, ConfigError> {
		self.optional(name).ok_or(ConfigError::MissingVariable { name })
	}

	/// Like [`required`](Self::required) but hands the value back untrimmed; surrounding
	/// whitespace is part of a password.
	fn required_secret(&self, name: &'static str) -> Result<String, ConfigError> {
		(self.0)(name)
			.filter(|value| !value.trim().is_empty())
			.ok_or(ConfigError::MissingVariable { name })
	}

	fn required_parsed<T>(&self, name: &'static str) -> Result<T, ConfigError>
	where
		T: FromStr,
		T::Err: Display,
	{
		parse_value(name, &self.required(name)?)
	}

	fn parsed_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
	where
		T: FromStr,
		T::Err: Display,
	{
		match self.optional(name) {
			Some(raw) => parse_value(name, &raw),
			None => Ok(default),
		}
	}

	fn seconds_or(
		&self,
		name: &'static str,
		default: std::time::Duration,
	) -> Result<std::time::Duration, ConfigError> {
		match self.optional(name) {
			Some(raw) => match parse_value::<u64>(name, &raw)? {
				0 => Err(ConfigError::InvalidVariable {
					name,
					reason: "must be at least one second".into(),
				}),
				secs => Ok(std::time::Duration::from_secs(secs)),
			},
			None => Ok(default),
		}
	}

	fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
		match self.optional(name).map(|raw| raw.to_ascii_lowercase()).as_deref() {
			None | Some("0" | "false" | "no" | "off") => Ok(false),
			Some("1" | "true" | "yes" | "on") => Ok(true),
			Some(other) =>
				Err(ConfigError::InvalidVariable { name, reason: format!("`{other}` is not a boolean") }),
		}
	}
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	raw.parse().map_err(|e: T::Err| ConfigError::InvalidVariable { name, reason: e.to_string() })
}

fn join_endpoint(base: &str, path: &str) -> Result<Url, ConfigError> {
	Url::parse(base)
		.and_then(|base| base.join(path))
		.map_err(|source| ConfigError::InvalidEndpoint { source })
}
