use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// The JWT spec's reserved claim names, split out of the rest of the
/// payload. Missing string claims decode to an empty string; missing
/// integer claims decode to zero — callers that care about "was this claim
/// present at all" should consult `extra` or the original payload instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisteredClaims {
	pub aud: String,
	pub exp: i64,
	pub jti: String,
	pub iat: i64,
	pub iss: String,
	pub nbf: i64,
	pub sub: String,
}

/// Token type derived from the `kc.*` namespaced claims. Absence of both
/// flags means an ordinary (identity) token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
	Standard = 0,
	KCAccess = 1,
	KCRefresh = 2,
}

fn pop_string(m: &mut Map<String, Value>, key: &str) -> String {
	m.remove(key)
		.and_then(|v| v.as_str().map(|s| s.to_string()))
		.unwrap_or_default()
}

fn pop_i64(m: &mut Map<String, Value>, key: &str) -> i64 {
	m.remove(key).and_then(|v| v.as_i64()).unwrap_or_default()
}

/// Removes and returns the registered claims from `payload`, leaving
/// whatever remains (the provider-specific extra claims) in place.
pub fn split_registered(payload: &mut Map<String, Value>) -> RegisteredClaims {
	RegisteredClaims {
		aud: pop_string(payload, "aud"),
		exp: pop_i64(payload, "exp"),
		jti: pop_string(payload, "jti"),
		iat: pop_i64(payload, "iat"),
		iss: pop_string(payload, "iss"),
		nbf: pop_i64(payload, "nbf"),
		sub: pop_string(payload, "sub"),
	}
}

/// Classifies a token from its (already-split) extra claims.
pub fn token_type(extra: &Map<String, Value>) -> TokenType {
	if extra.get("kc.isAccessToken").and_then(Value::as_bool).unwrap_or(false) {
		TokenType::KCAccess
	} else if extra.get("kc.isRefreshToken").and_then(Value::as_bool).unwrap_or(false) {
		TokenType::KCRefresh
	} else {
		TokenType::Standard
	}
}

/// Resolves the authenticated user id, preferring the extended identity
/// claim and falling back to registered `sub`. Returns `(id, from_identity)`
/// where `from_identity` is true only when `kc.identity.kc.i.id` supplied
/// it. This runs regardless of whether the surrounding validation
/// succeeded, so callers always have a subject to log.
pub fn authenticated_user_id(extra: &Map<String, Value>, sub: &str) -> (String, bool) {
	if let Some(id) = extra
		.get("kc.identity")
		.and_then(Value::as_object)
		.and_then(|identity| identity.get("kc.i.id"))
		.and_then(Value::as_str)
		.filter(|s| !s.is_empty())
	{
		(id.to_string(), true)
	} else {
		(sub.to_string(), false)
	}
}

/// Whether the extended identity claim marks this subject as a guest.
/// Defaults to `false` when the identity claim, or its guest flag, is absent.
pub fn is_guest(extra: &Map<String, Value>) -> bool {
	extra
		.get("kc.identity")
		.and_then(Value::as_object)
		.and_then(|identity| identity.get("kc.i.guest"))
		.and_then(Value::as_bool)
		.unwrap_or(false)
}

/// The set of scopes the token is authorized for, if the claim is present.
pub fn authorized_scopes(extra: &Map<String, Value>) -> Option<HashSet<String>> {
	extra
		.get("kc.authorizedScopes")
		.and_then(Value::as_array)
		.map(|arr| {
			arr.iter()
				.filter_map(|v| v.as_str())
				.map(|s| s.to_string())
				.collect()
		})
}

/// The authorized-claims mapping, if present.
pub fn authorized_claims(extra: &Map<String, Value>) -> Option<Map<String, Value>> {
	extra
		.get("kc.authorizedClaims")
		.and_then(Value::as_object)
		.cloned()
}

/// Checks that every scope in `required` is present in the token's
/// authorized scopes. An empty `required` list always succeeds, even when
/// the token carries no `kc.authorizedScopes` claim at all.
pub fn require_scopes(extra: &Map<String, Value>, required: &[&str]) -> bool {
	if required.is_empty() {
		return true;
	}
	let granted = authorized_scopes(extra).unwrap_or_default();
	required.iter().all(|s| granted.contains(*s))
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use serde_json::json;

	fn obj(v: Value) -> Map<String, Value> {
		v.as_object().unwrap().clone()
	}

	#[test]
	fn split_registered_pulls_reserved_fields() {
		let mut payload = obj(json!({
			"aud": "client-1",
			"exp": 1_700_000_000i64,
			"jti": "abc",
			"iat": 1_699_999_000i64,
			"iss": "https://issuer.example",
			"nbf": 1_699_999_500i64,
			"sub": "alice",
			"kc.isAccessToken": true,
		}));
		let registered = split_registered(&mut payload);
		assert_eq!(registered.sub, "alice");
		assert_eq!(registered.aud, "client-1");
		assert_eq!(registered.exp, 1_700_000_000);
		// registered claims removed, extras remain
		assert!(!payload.contains_key("sub"));
		assert!(payload.contains_key("kc.isAccessToken"));
	}

	#[test]
	fn missing_registered_claims_default_to_zero_or_empty() {
		let mut payload = obj(json!({}));
		let registered = split_registered(&mut payload);
		assert_eq!(registered.sub, "");
		assert_eq!(registered.exp, 0);
	}

	#[test]
	fn token_type_classification() {
		assert_eq!(token_type(&obj(json!({}))), TokenType::Standard);
		assert_eq!(
			token_type(&obj(json!({"kc.isAccessToken": true}))),
			TokenType::KCAccess
		);
		assert_eq!(
			token_type(&obj(json!({"kc.isRefreshToken": true}))),
			TokenType::KCRefresh
		);
	}

	#[test]
	fn authenticated_user_id_prefers_identity_then_falls_back() {
		let with_identity = obj(json!({"kc.identity": {"kc.i.id": "u-42"}}));
		assert_eq!(
			authenticated_user_id(&with_identity, "alice"),
			("u-42".to_string(), true)
		);

		let without_identity = obj(json!({}));
		assert_eq!(
			authenticated_user_id(&without_identity, "alice"),
			("alice".to_string(), false)
		);

		let empty_identity_id = obj(json!({"kc.identity": {"kc.i.id": ""}}));
		assert_eq!(
			authenticated_user_id(&empty_identity_id, "alice"),
			("alice".to_string(), false)
		);
	}

	#[test]
	fn is_guest_defaults_false() {
		assert!(!is_guest(&obj(json!({}))));
		assert!(is_guest(&obj(
			json!({"kc.identity": {"kc.i.guest": true}})
		)));
	}

	#[test]
	fn require_scopes_empty_always_succeeds() {
		assert!(require_scopes(&obj(json!({})), &[]));
	}

	#[test]
	fn require_scopes_checks_membership() {
		let claims = obj(json!({"kc.authorizedScopes": ["openid", "profile"]}));
		assert!(require_scopes(&claims, &["openid"]));
		assert!(require_scopes(&claims, &["openid", "profile"]));
		assert!(!require_scopes(&claims, &["admin"]));
	}
}
