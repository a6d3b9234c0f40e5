//! Secure token secret wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	const PREVIEW_CHARS: usize = 8;

	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Consumes the wrapper and returns the bare token string.
	pub fn into_inner(self) -> String {
		self.0
	}

	/// Returns `true` when the secret is empty or whitespace only.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// Truncated form that is safe to log: the first few characters followed by `...`.
	pub fn preview(&self) -> String {
		truncate(&self.0, Self::PREVIEW_CHARS)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Keeps the first `keep` characters of `value` and appends `...` when anything was cut.
pub fn truncate(value: &str, keep: usize) -> String {
	match value.char_indices().nth(keep) {
		Some((idx, _)) => format!("{}...", &value[..idx]),
		None => value.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn preview_keeps_a_short_prefix() {
		assert_eq!(TokenSecret::new("abc123def456ghi").preview(), "abc123de...");
		assert_eq!(TokenSecret::new("short").preview(), "short");
		assert_eq!(truncate("ação-token", 3), "açã...");
	}
}
