use std::collections::HashSet;

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use super::claims::{self, RegisteredClaims, TokenType};
use super::discovery::{Jwk, ProviderDefinition};
use super::error::{from_jwt_error, ErrStatus};

/// The full result of validating a token string, including the claims even
/// when `status` is not `ErrStatus::None` — the authenticated user id in
/// particular is resolved regardless of validation outcome, for forensic
/// logging of failed attempts.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
	pub authenticated_user_id: String,
	pub from_identity_claim: bool,
	pub token_type: TokenType,
	pub registered: RegisteredClaims,
	pub extra: Map<String, Value>,
	pub status: ErrStatus,
}

impl ValidatedToken {
	pub fn is_valid(&self) -> bool {
		self.status.is_success()
	}
}

fn alg_name(alg: Algorithm) -> String {
	// Algorithm serializes to exactly the JWA name (e.g. "RS256"), matching
	// what discovery's id_token_signing_alg_values_supported carries.
	serde_json::to_value(alg)
		.ok()
		.and_then(|v| v.as_str().map(str::to_string))
		.unwrap_or_default()
}

fn decoding_key_for(jwk: &Jwk) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
	match jwk.kty.as_str() {
		"RSA" => {
			let n = jwk.n.as_deref().ok_or(ErrorKind::InvalidKeyFormat)?;
			let e = jwk.e.as_deref().ok_or(ErrorKind::InvalidKeyFormat)?;
			DecodingKey::from_rsa_components(n, e)
		}
		"EC" => {
			let x = jwk.x.as_deref().ok_or(ErrorKind::InvalidKeyFormat)?;
			let y = jwk.y.as_deref().ok_or(ErrorKind::InvalidKeyFormat)?;
			DecodingKey::from_ec_components(x, y)
		}
		_ => Err(ErrorKind::InvalidKeyFormat.into()),
	}
}

/// Decodes a token's claims without verifying its signature or time-based
/// claims. Used only to resolve a subject for logging when validation fails
/// further down the pipeline, and as the first step of the real validation
/// below — never treated as an authentication decision on its own.
fn peek_claims(token: &str, alg: Algorithm) -> Result<Map<String, Value>, jsonwebtoken::errors::Error> {
	let mut validation = Validation::new(alg);
	validation.insecure_disable_signature_validation();
	validation.validate_exp = false;
	validation.validate_nbf = false;
	validation.required_spec_claims = HashSet::new();
	// The key is irrelevant once signature validation is disabled.
	let dummy = DecodingKey::from_secret(&[]);
	let data = jsonwebtoken::decode::<Value>(token, &dummy, &validation)?;
	Ok(data.claims.as_object().cloned().unwrap_or_default())
}

/// Validates a JWT against a provider's current discovery/JWKS definition.
/// Never panics on malformed input — every failure mode maps to a status in
/// the closed taxonomy.
pub fn validate(definition: &ProviderDefinition, token: &str) -> ValidatedToken {
	let empty = || ValidatedToken {
		authenticated_user_id: String::new(),
		from_identity_claim: false,
		token_type: TokenType::Standard,
		registered: RegisteredClaims::default(),
		extra: Map::new(),
		status: ErrStatus::TokenMalformed,
	};

	let header = match jsonwebtoken::decode_header(token) {
		Ok(h) => h,
		Err(_) => return empty(),
	};

	let mut claims_map = match peek_claims(token, header.alg) {
		Ok(m) => m,
		Err(_) => return empty(),
	};

	let registered = claims::split_registered(&mut claims_map);
	let extra = claims_map;
	let token_type = claims::token_type(&extra);
	let (authenticated_user_id, from_identity_claim) =
		claims::authenticated_user_id(&extra, &registered.sub);

	let mut outcome = ValidatedToken {
		authenticated_user_id,
		from_identity_claim,
		token_type,
		registered,
		extra,
		status: ErrStatus::TokenValidationFailed,
	};

	let Some(discovery) = &definition.discovery else {
		outcome.status = ErrStatus::NotInitialized;
		return outcome;
	};

	let alg_str = alg_name(header.alg);
	if !discovery
		.id_token_signing_alg_values_supported
		.iter()
		.any(|a| a == &alg_str)
	{
		outcome.status = ErrStatus::TokenUnexpectedSigningMethod;
		return outcome;
	}

	let kid = header.kid.clone().unwrap_or_default();
	let candidates = definition.jwks.keys_for_kid(&kid);
	if candidates.is_empty() {
		outcome.status = ErrStatus::TokenUnknownKey;
		return outcome;
	}

	// Only the first matching key is tried, not every same-kid candidate —
	// a JWKS may carry more than one key under the same kid during a
	// rotation window, but the first one is authoritative.
	let jwk = candidates[0];
	outcome.status = match decoding_key_for(jwk) {
		Ok(decoding_key) => {
			let mut validation = Validation::new(header.alg);
			validation.leeway = 0;
			validation.validate_exp = true;
			validation.validate_nbf = true;
			validation.required_spec_claims = HashSet::new();

			match jsonwebtoken::decode::<Value>(token, &decoding_key, &validation) {
				Ok(_) => ErrStatus::None,
				Err(e) => from_jwt_error(&e),
			}
		}
		Err(e) => from_jwt_error(&e),
	};

	outcome
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use crate::oidc::discovery::{DiscoveryDocument, Jwks};
	use jsonwebtoken::{encode, EncodingKey, Header};
	use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
	use rsa::{RsaPrivateKey, RsaPublicKey};
	use serde::Serialize;
	use serde_json::json;

	fn rsa_keypair() -> (RsaPrivateKey, RsaPublicKey) {
		let mut rng = rand::thread_rng();
		let priv_key = RsaPrivateKey::new(&mut rng, 2048).expect("rsa keygen");
		let pub_key = RsaPublicKey::from(&priv_key);
		(priv_key, pub_key)
	}

	fn jwk_from_pub(pub_key: &RsaPublicKey, kid: &str) -> Jwk {
		use base64::Engine;
		let n = pub_key.n().to_bytes_be();
		let e = pub_key.e().to_bytes_be();
		let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
		Jwk {
			kty: "RSA".into(),
			kid: Some(kid.to_string()),
			alg: Some("RS256".into()),
			n: Some(b64.encode(n)),
			e: Some(b64.encode(e)),
			crv: None,
			x: None,
			y: None,
		}
	}

	fn definition_with(jwks: Jwks) -> ProviderDefinition {
		ProviderDefinition {
			discovery: Some(DiscoveryDocument {
				issuer: "https://issuer.example".into(),
				jwks_uri: "https://issuer.example/jwks".into(),
				userinfo_endpoint: "https://issuer.example/userinfo".into(),
				id_token_signing_alg_values_supported: vec!["RS256".into()],
			}),
			jwks,
		}
	}

	#[derive(Serialize)]
	struct Claims {
		sub: String,
		exp: i64,
		#[serde(skip_serializing_if = "Option::is_none")]
		nbf: Option<i64>,
	}

	fn sign(priv_key: &RsaPrivateKey, kid: &str, claims: &Claims) -> String {
		let pkcs1 = priv_key.to_pkcs1_der().unwrap();
		let encoding_key = EncodingKey::from_rsa_der(pkcs1.as_bytes());
		let mut header = Header::new(Algorithm::RS256);
		header.kid = Some(kid.to_string());
		encode(&header, claims, &encoding_key).unwrap()
	}

	#[test]
	fn happy_path_standard_token() {
		let (priv_key, pub_key) = rsa_keypair();
		let jwks = Jwks {
			keys: vec![jwk_from_pub(&pub_key, "k1")],
		};
		let def = definition_with(jwks);
		let now = 2_000_000_000;
		let token = sign(
			&priv_key,
			"k1",
			&Claims {
				sub: "alice".into(),
				exp: now + 3600,
				nbf: None,
			},
		);

		let result = validate(&def, &token);
		assert!(result.is_valid(), "expected success, got {:?}", result.status);
		assert_eq!(result.authenticated_user_id, "alice");
		assert_eq!(result.registered.sub, "alice");
	}

	#[test]
	fn duplicate_kid_only_tries_the_first_key() {
		// A JWKS may legitimately carry more than one key under the same
		// `kid` during a rotation window. Only the first one is
		// authoritative: a token that fails against it must not fall
		// through and succeed against a later same-kid entry.
		let (_wrong_priv_key, wrong_pub_key) = rsa_keypair();
		let (signing_priv_key, signing_pub_key) = rsa_keypair();
		let jwks = Jwks {
			keys: vec![
				jwk_from_pub(&wrong_pub_key, "k1"),
				jwk_from_pub(&signing_pub_key, "k1"),
			],
		};
		let def = definition_with(jwks);
		let token = sign(
			&signing_priv_key,
			"k1",
			&Claims {
				sub: "alice".into(),
				exp: 9_999_999_999,
				nbf: None,
			},
		);

		let result = validate(&def, &token);
		assert_eq!(result.status, ErrStatus::TokenInvalidSignature);
	}

	#[test]
	fn unexpected_signing_method_rejected() {
		let def = definition_with(Jwks::default());
		let token = jsonwebtoken::encode(
			&Header::new(Algorithm::HS256),
			&json!({"sub": "alice", "exp": 9_999_999_999i64}),
			&EncodingKey::from_secret(b"secret"),
		)
		.unwrap();

		let result = validate(&def, &token);
		assert_eq!(result.status, ErrStatus::TokenUnexpectedSigningMethod);
	}

	#[test]
	fn unknown_kid_falls_back_to_sub() {
		let (priv_key, _pub_key) = rsa_keypair();
		let def = definition_with(Jwks::default());
		let token = sign(
			&priv_key,
			"missing-kid",
			&Claims {
				sub: "bob".into(),
				exp: 9_999_999_999,
				nbf: None,
			},
		);

		let result = validate(&def, &token);
		assert_eq!(result.status, ErrStatus::TokenUnknownKey);
		assert_eq!(result.authenticated_user_id, "bob");
	}

	#[test]
	fn expired_token_rejected() {
		let (priv_key, pub_key) = rsa_keypair();
		let jwks = Jwks {
			keys: vec![jwk_from_pub(&pub_key, "k1")],
		};
		let def = definition_with(jwks);
		let token = sign(
			&priv_key,
			"k1",
			&Claims {
				sub: "alice".into(),
				exp: 10,
				nbf: None,
			},
		);

		let result = validate(&def, &token);
		assert_eq!(result.status, ErrStatus::TokenExpiredOrNotValidYet);
	}

	#[test]
	fn malformed_token_rejected() {
		let def = definition_with(Jwks::default());
		let result = validate(&def, "not-a-jwt");
		assert_eq!(result.status, ErrStatus::TokenMalformed);
	}
}
