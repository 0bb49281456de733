//! Shared helpers for the integration suite: a mock OIDC issuer (discovery +
//! JWKS, served over HTTP via `wiremock`) and RSA-signed test tokens.

use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn rsa_keypair() -> (RsaPrivateKey, RsaPublicKey) {
	let mut rng = rand::thread_rng();
	let priv_key = RsaPrivateKey::new(&mut rng, 2048).expect("rsa keygen");
	let pub_key = RsaPublicKey::from(&priv_key);
	(priv_key, pub_key)
}

pub fn jwk_json(pub_key: &RsaPublicKey, kid: &str) -> Value {
	let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
	json!({
		"kty": "RSA",
		"kid": kid,
		"alg": "RS256",
		"n": b64.encode(pub_key.n().to_bytes_be()),
		"e": b64.encode(pub_key.e().to_bytes_be()),
	})
}

pub fn sign_token(priv_key: &RsaPrivateKey, kid: &str, claims: &Value) -> String {
	let pkcs1 = priv_key.to_pkcs1_der().unwrap();
	let encoding_key = EncodingKey::from_rsa_der(pkcs1.as_bytes());
	let mut header = Header::new(Algorithm::RS256);
	header.kid = Some(kid.to_string());
	encode(&header, claims, &encoding_key).unwrap()
}

/// Starts a `MockServer` serving a discovery document and JWKS at the
/// conventional paths, with `keys` as the JWKS's `keys` array. Returns the
/// server so the caller can mutate the mounted mocks (e.g. to simulate key
/// rotation) and so its lifetime outlives the test.
pub async fn mock_issuer(keys: Vec<Value>) -> MockServer {
	let server = MockServer::start().await;
	mount_discovery(&server).await;
	mount_jwks(&server, keys).await;
	server
}

pub async fn mount_discovery(server: &MockServer) {
	let discovery = json!({
		"issuer": server.uri(),
		"jwks_uri": format!("{}/jwks", server.uri()),
		"userinfo_endpoint": format!("{}/userinfo", server.uri()),
		"id_token_signing_alg_values_supported": ["RS256"],
	});

	Mock::given(method("GET"))
		.and(path("/.well-known/openid-configuration"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(discovery.to_string())
				.insert_header("content-type", "application/json"),
		)
		.mount(server)
		.await;
}

pub async fn mount_jwks(server: &MockServer, keys: Vec<Value>) {
	let jwks = json!({ "keys": keys });
	Mock::given(method("GET"))
		.and(path("/jwks"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(jwks.to_string())
				.insert_header("content-type", "application/jwk-set+json"),
		)
		.mount(server)
		.await;
}

/// Mounts a replacement JWKS response that takes precedence over one mounted
/// by `mock_issuer`/`mount_jwks` at the default priority — used to simulate a
/// mid-test key rotation without leaving two ambiguously-matching mocks.
pub async fn rotate_jwks(server: &MockServer, keys: Vec<Value>) {
	let jwks = json!({ "keys": keys });
	Mock::given(method("GET"))
		.and(path("/jwks"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(jwks.to_string())
				.insert_header("content-type", "application/jwk-set+json"),
		)
		.with_priority(1)
		.mount(server)
		.await;
}

pub async fn mount_userinfo(server: &MockServer, body: Value) {
	Mock::given(method("GET"))
		.and(path("/userinfo"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(body.to_string())
				.insert_header("content-type", "application/json"),
		)
		.mount(server)
		.await;
}
