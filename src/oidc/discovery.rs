use serde::Deserialize;
use thiserror::Error;

/// The subset of the OIDC discovery document the validator consumes.
/// Unrecognized fields are ignored rather than rejected — a real discovery
/// document carries many fields (`authorization_endpoint`,
/// `token_endpoint`, `end_session_endpoint`, ...) this library has no use
/// for.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DiscoveryDocument {
	pub issuer: String,
	pub jwks_uri: String,
	pub userinfo_endpoint: String,
	#[serde(default)]
	pub id_token_signing_alg_values_supported: Vec<String>,
}

/// A single JSON Web Key (RFC 7517). Only the fields needed to build a
/// `jsonwebtoken::DecodingKey` are modeled; unrecognized fields (`use`,
/// `x5c`, ...) are ignored.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Jwk {
	pub kty: String,
	pub kid: Option<String>,
	pub alg: Option<String>,
	// RSA components
	pub n: Option<String>,
	pub e: Option<String>,
	// EC components
	pub crv: Option<String>,
	pub x: Option<String>,
	pub y: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Jwks {
	#[serde(default)]
	pub keys: Vec<Jwk>,
}

impl Jwks {
	/// All keys matching `kid`. A JWKS may legitimately carry more than one
	/// key under the same `kid` during a rotation window; the validator
	/// tries them in order.
	pub fn keys_for_kid<'a>(&'a self, kid: &str) -> Vec<&'a Jwk> {
		self.keys.iter().filter(|k| k.kid.as_deref() == Some(kid)).collect()
	}
}

/// An immutable discovery-document + JWKS pair, published atomically by the
/// provider's refresh loop and read by concurrent validators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderDefinition {
	pub discovery: Option<DiscoveryDocument>,
	pub jwks: Jwks,
}

impl ProviderDefinition {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.discovery.is_none()
	}
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("http request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("unexpected content-type {0:?} (expected one of {1:?})")]
	UnexpectedContentType(String, &'static [&'static str]),
	#[error("response decode failed: {0}")]
	Decode(String),
}

fn content_type_base(value: &str) -> &str {
	value.split(';').next().unwrap_or("").trim()
}

/// Fetches and validates a discovery document's `Content-Type`, then decodes
/// the body. A `Content-Type` header is required to be present and must
/// match (ignoring any `; charset=...` suffix).
async fn fetch_json_strict<T: for<'de> Deserialize<'de>>(
	client: &reqwest::Client,
	url: &str,
	accepted: &'static [&'static str],
) -> Result<T, DiscoveryError> {
	let resp = client.get(url).send().await?.error_for_status()?;
	let content_type = resp
		.headers()
		.get(reqwest::header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.map(content_type_base)
		.unwrap_or_default()
		.to_string();

	if !accepted.contains(&content_type.as_str()) {
		return Err(DiscoveryError::UnexpectedContentType(content_type, accepted));
	}

	let bytes = resp.bytes().await?;
	serde_json::from_slice(&bytes).map_err(|e| DiscoveryError::Decode(e.to_string()))
}

const DISCOVERY_CONTENT_TYPES: &[&str] = &["application/json"];
const JWKS_CONTENT_TYPES: &[&str] = &["application/jwk-set+json", "application/json"];

/// Performs discovery against `issuer`, fetching both the discovery document
/// and the JWKS it references.
pub async fn fetch_definition(
	client: &reqwest::Client,
	issuer: &url::Url,
) -> Result<ProviderDefinition, DiscoveryError> {
	// Plain concatenation, not `Url::join` — a relative join would replace
	// any path component already present on the issuer (e.g. a realm path
	// like `https://op.example/realms/foo`) instead of appending to it.
	let discovery_url = format!("{}/.well-known/openid-configuration", issuer.as_str().trim_end_matches('/'));

	let discovery: DiscoveryDocument =
		fetch_json_strict(client, &discovery_url, DISCOVERY_CONTENT_TYPES).await?;

	let jwks: Jwks = fetch_json_strict(client, &discovery.jwks_uri, JWKS_CONTENT_TYPES).await?;

	Ok(ProviderDefinition {
		discovery: Some(discovery),
		jwks,
	})
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn content_type_base_strips_charset() {
		assert_eq!(content_type_base("application/json; charset=utf-8"), "application/json");
		assert_eq!(content_type_base("application/json"), "application/json");
	}

	#[test]
	fn keys_for_kid_filters_and_allows_duplicates() {
		let jwks = Jwks {
			keys: vec![
				Jwk {
					kty: "RSA".into(),
					kid: Some("k1".into()),
					alg: None,
					n: Some("n1".into()),
					e: Some("AQAB".into()),
					crv: None,
					x: None,
					y: None,
				},
				Jwk {
					kty: "RSA".into(),
					kid: Some("k2".into()),
					alg: None,
					n: Some("n2".into()),
					e: Some("AQAB".into()),
					crv: None,
					x: None,
					y: None,
				},
			],
		};
		assert_eq!(jwks.keys_for_kid("k1").len(), 1);
		assert_eq!(jwks.keys_for_kid("missing").len(), 0);
	}

	#[test]
	fn provider_definition_empty_by_default() {
		let def = ProviderDefinition::empty();
		assert!(def.is_empty());
	}
}
