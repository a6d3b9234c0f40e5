//! Certificate-backed TLS sessions for mutual-TLS issuers.
//!
//! [`MtlsClientBuilder`] turns a [`Credentials`] bundle into a pooled [`ReqwestClient`] that
//! presents the client certificate on every handshake. Path and field problems surface as
//! [`ConfigError`] before any file is parsed; key decryption and identity problems surface as
//! [`CertificateError`], so a wrong password never looks like a network outage.

// std
use std::{fs, io::ErrorKind, path::Path};
// crates.io
use pkcs8::{EncryptedPrivateKeyInfo, SecretDocument, der::pem::LineEnding};
use reqwest::{Identity, redirect::Policy};
// self
use crate::{
	_prelude::*,
	config::{Credentials, IssuerSettings},
	error::{CertificateError, ConfigError},
	http::ReqwestHttpClient,
};

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const PKCS8_KEY_LABEL: &str = "PRIVATE KEY";
const PLAIN_KEY_LABELS: [&str; 3] = [PKCS8_KEY_LABEL, "RSA PRIVATE KEY", "EC PRIVATE KEY"];

/// Builds reqwest clients that authenticate with a password-protected client certificate.
#[derive(Clone, Debug)]
pub struct MtlsClientBuilder<'a> {
	credentials: &'a Credentials,
	settings: &'a IssuerSettings,
}
impl<'a> MtlsClientBuilder<'a> {
	/// Creates a builder over borrowed settings; nothing is read until [`build`](Self::build).
	pub fn new(credentials: &'a Credentials, settings: &'a IssuerSettings) -> Self {
		Self { credentials, settings }
	}

	/// Validates the settings and credential bundle, decrypts the key, and builds the pooled
	/// client.
	pub fn build(&self) -> Result<ReqwestClient> {
		self.settings.validate()?;

		let identity = self.identity()?;

		let mut builder = ReqwestClient::builder()
			.use_rustls_tls()
			.identity(identity)
			.redirect(Policy::none())
			.connect_timeout(self.settings.connect_timeout)
			.timeout(self.settings.request_timeout);

		if self.settings.danger_accept_invalid_certs {
			tracing::warn!(
				environment = self.settings.environment.as_str(),
				"Server certificate verification is DISABLED; never use this against production."
			);

			builder = builder.danger_accept_invalid_certs(true);
		}

		let client = builder.build().map_err(ConfigError::from)?;

		tracing::debug!(
			cert_path = %self.credentials.cert_path.display(),
			environment = self.settings.environment.as_str(),
			"Built mTLS client."
		);

		Ok(client)
	}

	/// Same as [`build`](Self::build), wrapped in the broker's transport type.
	pub fn build_http_client(&self) -> Result<ReqwestHttpClient> {
		self.build().map(ReqwestHttpClient::with_client)
	}

	/// Reads the certificate and key files and combines them into a TLS identity.
	pub fn identity(&self) -> Result<Identity> {
		let credentials = self.credentials;

		if credentials.cert_path.as_os_str().is_empty() {
			return Err(ConfigError::MissingCredential { field: "cert_path" }.into());
		}
		if credentials.key_path.as_os_str().is_empty() {
			return Err(ConfigError::MissingCredential { field: "key_path" }.into());
		}
		if credentials.key_password.is_empty() {
			return Err(ConfigError::MissingCredential { field: "key_password" }.into());
		}

		let cert_pem = read_credential_file(&credentials.cert_path)?;
		let key_pem = read_credential_file(&credentials.key_path)?;
		let key_pem = decrypt_private_key(&key_pem, &credentials.key_password)?;
		let mut bundle = String::with_capacity(cert_pem.len() + key_pem.len() + 1);

		bundle.push_str(cert_pem.trim_end());
		bundle.push('\n');
		bundle.push_str(&key_pem);

		Identity::from_pem(bundle.as_bytes())
			.map_err(|source| CertificateError::Identity { source }.into())
	}
}

/// Returns an unencrypted PEM private key, decrypting PKCS#8 `ENCRYPTED PRIVATE KEY` documents
/// with `password`.
pub fn decrypt_private_key(pem: &str, password: &str) -> Result<String, CertificateError> {
	if pem.contains("Proc-Type: 4,ENCRYPTED") {
		return Err(CertificateError::UnsupportedKeyFormat {
			reason: "legacy OpenSSL-encrypted PEM; convert with `openssl pkcs8 -topk8 -v2 aes-256-cbc`"
				.into(),
		});
	}

	let (label, document) = SecretDocument::from_pem(pem).map_err(|e| {
		CertificateError::UnsupportedKeyFormat { reason: format!("key file is not valid PEM: {e}") }
	})?;

	if PLAIN_KEY_LABELS.contains(&label) {
		tracing::debug!(label, "Private key is not encrypted; password unused.");

		return Ok(pem.to_owned());
	}
	if label != ENCRYPTED_KEY_LABEL {
		return Err(CertificateError::UnsupportedKeyFormat {
			reason: format!("unexpected PEM label `{label}`"),
		});
	}

	let info = EncryptedPrivateKeyInfo::try_from(document.as_bytes())
		.map_err(|e| CertificateError::KeyDecryption { source: e.into() })?;
	let decrypted =
		info.decrypt(password).map_err(|source| CertificateError::KeyDecryption { source })?;
	let pem = decrypted
		.to_pem(PKCS8_KEY_LABEL, LineEnding::LF)
		.map_err(|e| CertificateError::KeyDecryption { source: e.into() })?;

	Ok(pem.as_str().to_owned())
}

/// Returns `true` when a TLS-layer failure is anywhere in `err`'s source chain.
///
/// IO errors hide their payload from [`StdError::source`], so they are unwrapped explicitly.
pub fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
	let mut current = Some(err);

	while let Some(err) = current {
		if err.is::<rustls::Error>() {
			return true;
		}
		if let Some(inner) = err.downcast_ref::<std::io::Error>().and_then(std::io::Error::get_ref) {
			if is_tls_failure(inner) {
				return true;
			}
		}

		current = err.source();
	}

	false
}

fn read_credential_file(path: &Path) -> Result<String, ConfigError> {
	match fs::read_to_string(path) {
		Ok(contents) => Ok(contents),
		Err(e) if e.kind() == ErrorKind::NotFound =>
			Err(ConfigError::MissingFile { path: path.to_path_buf() }),
		Err(source) => Err(ConfigError::UnreadableFile { path: path.to_path_buf(), source }),
	}
}
