//! Integration tests for the Provider state machine against a mocked issuer:
//! initialize/ready/uninitialize lifecycle, reinitialization, and
//! concurrent validation across a JWKS key rotation (spec scenario S5).

mod common;

use std::sync::Arc;
use std::time::Duration;

use oidc_rp_validator::oidc::Provider;
use oidc_rp_validator::ErrStatus;
use serde_json::json;

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn initialize_reaches_ready_against_a_mocked_issuer() {
	let (_priv_key, pub_key) = common::rsa_keypair();
	let server = common::mock_issuer(vec![common::jwk_json(&pub_key, "k1")]).await;

	let provider = Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_millis(50),
	);
	provider.initialize(&server.uri()).await.unwrap();
	provider
		.wait_until_ready(Duration::from_secs(5))
		.await
		.expect("provider should become ready");

	provider.uninitialize().await.unwrap();
}

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn reinitialize_after_uninitialize_reaches_ready_again() {
	let (_priv_key, pub_key) = common::rsa_keypair();
	let server = common::mock_issuer(vec![common::jwk_json(&pub_key, "k1")]).await;

	let provider = Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_millis(50),
	);

	provider.initialize(&server.uri()).await.unwrap();
	provider.wait_until_ready(Duration::from_secs(5)).await.unwrap();
	provider.uninitialize().await.unwrap();

	provider.initialize(&server.uri()).await.unwrap();
	provider.wait_until_ready(Duration::from_secs(5)).await.unwrap();
	provider.uninitialize().await.unwrap();
}

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn userinfo_fetch_uses_bearer_token() {
	let (priv_key, pub_key) = common::rsa_keypair();
	let server = common::mock_issuer(vec![common::jwk_json(&pub_key, "k1")]).await;
	common::mount_userinfo(&server, json!({"sub": "alice", "email": "alice@example.com"})).await;

	let provider = Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_millis(50),
	);
	provider.initialize(&server.uri()).await.unwrap();
	provider.wait_until_ready(Duration::from_secs(5)).await.unwrap();

	let token = common::sign_token(
		&priv_key,
		"k1",
		&json!({"sub": "alice", "exp": 9_999_999_999i64}),
	);
	let userinfo = provider
		.fetch_userinfo_with_accesstoken_string(&token)
		.await
		.expect("userinfo fetch should succeed");
	assert_eq!(userinfo["sub"], "alice");

	provider.uninitialize().await.unwrap();
}

/// Spec scenario S5: 8 tasks validate the same token 2,000 times each while
/// the issuer's JWKS rotates from `k1`-only to `k1`+`k2` midway through. No
/// validator should ever see a null or half-updated definition, and tokens
/// signed with either key should validate once their key is published.
#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn concurrent_validators_observe_monotone_definitions_across_key_rotation() {
	let (priv_key_1, pub_key_1) = common::rsa_keypair();
	let (priv_key_2, pub_key_2) = common::rsa_keypair();
	let server = common::mock_issuer(vec![common::jwk_json(&pub_key_1, "k1")]).await;

	let provider = Arc::new(Provider::with_intervals(
		None,
		false,
		Duration::from_millis(80),
		Duration::from_millis(80),
	));
	provider.initialize(&server.uri()).await.unwrap();
	provider.wait_until_ready(Duration::from_secs(5)).await.unwrap();

	let token_k1 = common::sign_token(&priv_key_1, "k1", &json!({"sub": "alice", "exp": 9_999_999_999i64}));

	let mut handles = Vec::new();
	for _ in 0..8 {
		let provider = provider.clone();
		let token = token_k1.clone();
		handles.push(tokio::spawn(async move {
			for _ in 0..2_000 {
				let outcome = provider.validate_token_string(&token).expect("provider is ready");
				assert!(outcome.is_valid(), "unexpected status: {:?}", outcome.status);
			}
		}));
	}

	// Rotate the JWKS to add k2 while validators are mid-flight.
	tokio::time::sleep(Duration::from_millis(30)).await;
	common::rotate_jwks(
		&server,
		vec![common::jwk_json(&pub_key_1, "k1"), common::jwk_json(&pub_key_2, "k2")],
	)
	.await;

	for handle in handles {
		handle.await.unwrap();
	}

	// Give the refresher a cycle to pick up the rotated JWKS, then confirm a
	// token signed by the newly-added key validates.
	tokio::time::sleep(Duration::from_millis(200)).await;
	let token_k2 = common::sign_token(&priv_key_2, "k2", &json!({"sub": "bob", "exp": 9_999_999_999i64}));
	let outcome = provider.validate_token_string(&token_k2).unwrap();
	assert!(outcome.is_valid(), "k2 token should validate once the rotation is observed: {:?}", outcome.status);

	provider.uninitialize().await.unwrap();
}

/// A JWKS may legitimately carry more than one key under the same `kid`
/// during a rotation window, but only the first one is authoritative. A
/// token that fails against it must not validate just because a later
/// same-kid entry would have verified it.
#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn validation_tries_only_the_first_key_for_a_duplicate_kid() {
	let (_wrong_priv_key, wrong_pub_key) = common::rsa_keypair();
	let (signing_priv_key, signing_pub_key) = common::rsa_keypair();
	let server = common::mock_issuer(vec![
		common::jwk_json(&wrong_pub_key, "k1"),
		common::jwk_json(&signing_pub_key, "k1"),
	])
	.await;

	let provider = Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_millis(50),
	);
	provider.initialize(&server.uri()).await.unwrap();
	provider.wait_until_ready(Duration::from_secs(5)).await.unwrap();

	let token = common::sign_token(
		&signing_priv_key,
		"k1",
		&json!({"sub": "alice", "exp": 9_999_999_999i64}),
	);
	let outcome = provider.validate_token_string(&token).unwrap();
	assert_eq!(outcome.status, ErrStatus::TokenInvalidSignature);

	provider.uninitialize().await.unwrap();
}

/// A waiter blocked in `wait_until_ready` must not report success just
/// because a concurrent `uninitialize()` cancelled the refresh loop before
/// it ever published a definition.
#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn wait_until_ready_loses_race_against_concurrent_uninitialize() {
	let provider = Arc::new(Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_secs(5),
	));
	// No mock server is started, so discovery never succeeds on its own —
	// only the uninitialize() race below should resolve the wait.
	provider.initialize("https://invalid.invalid").await.unwrap();

	let waiter = {
		let provider = provider.clone();
		tokio::spawn(async move { provider.wait_until_ready(Duration::from_secs(5)).await })
	};

	tokio::time::sleep(Duration::from_millis(20)).await;
	provider.uninitialize().await.unwrap();

	assert_eq!(waiter.await.unwrap(), Err(ErrStatus::NotInitialized));
}

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn insecure_issuer_rejected_and_unreachable_host_times_out() {
	let provider = Provider::with_intervals(
		None,
		false,
		Duration::from_secs(60),
		Duration::from_millis(50),
	);

	assert_eq!(
		provider.initialize("http://op.example/").await,
		Err(ErrStatus::InvalidIss)
	);

	provider.initialize("https://invalid.invalid/").await.unwrap();
	assert_eq!(
		provider.wait_until_ready(Duration::from_secs(1)).await,
		Err(ErrStatus::Timeout)
	);
	provider.uninitialize().await.unwrap();
}
