//! Fetches a (cached or freshly issued) access token and optionally queries a balance.

// crates.io
use clap::{Parser, ValueEnum};
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
// self
use mtls_token_broker::{
	auth::truncate,
	balance::BalanceClient,
	config::Settings,
	flows::Broker,
	issuer::{ReqwestTransportErrorMapper, TokenIssuer},
	store::{PgStore, TokenStore},
	tls::MtlsClientBuilder,
};

const TOKEN_PREVIEW_CHARS: usize = 30;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
	Compact,
	Json,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	/// Log output format.
	#[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
	log_format: LogFormat,
	/// Create the token table before use.
	#[arg(long)]
	ensure_schema: bool,
	/// Query the account balance with the obtained token.
	#[arg(long, requires_all = ["agency", "account"])]
	balance: bool,
	/// Branch number for the balance inquiry.
	#[arg(long, env = "BALANCE_AGENCY")]
	agency: Option<String>,
	/// Account number for the balance inquiry.
	#[arg(long, env = "BALANCE_ACCOUNT")]
	account: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let dotenv = dotenvy::dotenv();
	let cli = Cli::parse();

	init_logging(cli.log_format);

	match dotenv {
		Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file."),
		Err(e) if e.not_found() => tracing::debug!("No environment file found."),
		Err(e) => return Err(e.into()),
	}

	let settings = Settings::from_env()?;
	let http_client = MtlsClientBuilder::new(&settings.credentials, &settings.issuer)
		.build_http_client()?;
	let issuer = TokenIssuer::from_credentials(
		&settings.credentials,
		settings.issuer.grant_mode,
		settings.issuer.environment.token_endpoint()?,
		http_client.clone(),
		ReqwestTransportErrorMapper,
	)?;
	let store = PgStore::connect_lazy(&settings.database);

	if cli.ensure_schema {
		store.ensure_schema().await?;
	}

	let store: std::sync::Arc<dyn TokenStore> = std::sync::Arc::new(store);
	let broker = Broker::new(store, issuer);
	let token = broker.try_access_token().await?;

	println!("Access token: {}", truncate(token.expose(), TOKEN_PREVIEW_CHARS));

	if cli.balance {
		let agency = cli.agency.ok_or_else(|| eyre!("--agency is required with --balance"))?;
		let account = cli.account.ok_or_else(|| eyre!("--account is required with --balance"))?;
		let client = BalanceClient::new(http_client, settings.issuer.environment.balance_endpoint()?);
		let amount = client.fetch_balance(token.expose(), &agency, &account).await?;

		println!("Balance: R$ {amount}");
	}

	Ok(())
}

fn init_logging(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);

	match format {
		LogFormat::Json => {
			let layer = fmt::layer().json().flatten_event(true).with_ansi(false);

			let _ = registry.with(layer).try_init();
		},
		LogFormat::Compact => {
			let _ = registry.with(fmt::layer().compact()).try_init();
		},
	}
}
