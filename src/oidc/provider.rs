use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use super::claims;
use super::discovery::{self, ProviderDefinition};
use super::error::ErrStatus;
use super::validator::{self, ValidatedToken};

const DEFAULT_SUCCESS_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

struct Lifecycle {
	cancel: CancellationToken,
	ready_rx: watch::Receiver<bool>,
	handle: tokio::task::JoinHandle<()>,
}

/// A thread-safe handle binding to exactly one OIDC issuer: discovery,
/// JWKS refresh, and JWT validation against whatever definition is
/// currently published. Validators never block on the refresher; they read
/// an atomically-swapped snapshot.
pub struct Provider {
	http_client: reqwest::Client,
	debug: bool,
	definition: Arc<ArcSwap<ProviderDefinition>>,
	lifecycle: RwLock<Option<Lifecycle>>,
	success_interval: Duration,
	retry_interval: Duration,
}

fn validate_issuer(raw: &str) -> Result<url::Url, ErrStatus> {
	let parsed = url::Url::parse(raw).map_err(|_| ErrStatus::InvalidIss)?;
	if parsed.scheme() != "https" {
		return Err(ErrStatus::InvalidIss);
	}
	match parsed.host_str() {
		Some(h) if !h.is_empty() => Ok(parsed),
		_ => Err(ErrStatus::InvalidIss),
	}
}

async fn sleep_or_cancelled(dur: Duration, cancel: &CancellationToken) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(dur) => false,
		_ = cancel.cancelled() => true,
	}
}

async fn refresh_loop(
	client: reqwest::Client,
	issuer: url::Url,
	definition: Arc<ArcSwap<ProviderDefinition>>,
	cancel: CancellationToken,
	ready_tx: watch::Sender<bool>,
	success_interval: Duration,
	retry_interval: Duration,
) {
	let mut ready_fired = false;
	loop {
		tokio::select! {
			_ = cancel.cancelled() => {
				log::debug!("oidc refresh loop cancelled for issuer {issuer}");
				return;
			}
			result = discovery::fetch_definition(&client, &issuer) => {
				match result {
					Ok(def) => {
						definition.store(Arc::new(def));
						if !ready_fired {
							ready_fired = true;
							// Ignore send errors: no receivers left just means
							// every waiter already gave up or was never
							// created, not a failure of the refresh itself.
							let _ = ready_tx.send(true);
						}
						if sleep_or_cancelled(success_interval, &cancel).await {
							return;
						}
					}
					Err(e) => {
						log::warn!("oidc discovery refresh failed for issuer {issuer}: {e}");
						if sleep_or_cancelled(retry_interval, &cancel).await {
							return;
						}
					}
				}
			}
		}
	}
}

impl Provider {
	/// Constructs an uninitialized Provider with the default 60s/5s refresh
	/// timings. `http_client` defaults to a fresh `reqwest::Client` when
	/// `None`.
	pub fn new(http_client: Option<reqwest::Client>, debug: bool) -> Self {
		Self::with_intervals(http_client, debug, DEFAULT_SUCCESS_INTERVAL, DEFAULT_RETRY_INTERVAL)
	}

	/// Same as `new`, but with caller-controlled refresh timings — mainly
	/// useful for tests and the `benchmark` CLI, which cannot wait a real
	/// 60 seconds to observe a second refresh cycle.
	pub fn with_intervals(
		http_client: Option<reqwest::Client>,
		debug: bool,
		success_interval: Duration,
		retry_interval: Duration,
	) -> Self {
		Self {
			http_client: http_client.unwrap_or_default(),
			debug,
			definition: Arc::new(ArcSwap::from_pointee(ProviderDefinition::empty())),
			lifecycle: RwLock::new(None),
			success_interval,
			retry_interval,
		}
	}

	pub fn is_debug(&self) -> bool {
		self.debug
	}

	/// Begins discovery against `issuer` and starts the background refresh
	/// loop. Returns as soon as the loop is spawned — it does not wait for
	/// the first successful fetch; use `wait_until_ready` for that.
	pub async fn initialize(&self, issuer: &str) -> Result<(), ErrStatus> {
		let issuer_url = validate_issuer(issuer)?;

		let mut guard = self.lifecycle.write().await;
		if guard.is_some() {
			return Err(ErrStatus::AlreadyInitialized);
		}

		self.definition.store(Arc::new(ProviderDefinition::empty()));

		let cancel = CancellationToken::new();
		let (ready_tx, ready_rx) = watch::channel(false);

		let handle = tokio::spawn(refresh_loop(
			self.http_client.clone(),
			issuer_url,
			self.definition.clone(),
			cancel.clone(),
			ready_tx,
			self.success_interval,
			self.retry_interval,
		));

		*guard = Some(Lifecycle {
			cancel,
			ready_rx,
			handle,
		});

		Ok(())
	}

	/// Blocks until the first successful discovery+JWKS fetch publishes a
	/// definition, or until `timeout` elapses.
	pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ErrStatus> {
		let mut ready_rx = {
			let guard = self.lifecycle.read().await;
			let lifecycle = guard.as_ref().ok_or(ErrStatus::NotInitialized)?;
			if *lifecycle.ready_rx.borrow() {
				return Ok(());
			}
			lifecycle.ready_rx.clone()
		};

		let wait = async {
			loop {
				if *ready_rx.borrow() {
					return Ok(());
				}
				if ready_rx.changed().await.is_err() {
					// The sender was dropped: the refresh loop was cancelled
					// (e.g. a concurrent `uninitialize`) before ever
					// publishing a definition. The provider never became
					// ready, so this is not success.
					return Err(ErrStatus::NotInitialized);
				}
			}
		};

		match tokio::time::timeout(timeout, wait).await {
			Ok(result) => result,
			Err(_) => Err(ErrStatus::Timeout),
		}
	}

	/// Cancels the refresh loop and blocks until it has acknowledged
	/// termination. Safe to call from any task; calling it twice in a row
	/// returns `NotInitialized` the second time (native contract — the C
	/// ABI wrapper tolerates this and maps it to success instead).
	pub async fn uninitialize(&self) -> Result<(), ErrStatus> {
		let mut guard = self.lifecycle.write().await;
		let lifecycle = guard.take().ok_or(ErrStatus::NotInitialized)?;

		lifecycle.cancel.cancel();
		let _ = lifecycle.handle.await;
		self.definition.store(Arc::new(ProviderDefinition::empty()));

		Ok(())
	}

	/// Validates a token against the currently published definition.
	/// Returns `Err(NotInitialized)` only when no definition has ever been
	/// published yet; any other validation failure is represented inside
	/// the returned `ValidatedToken::status`, never as an `Err`, because the
	/// authenticated user id (even on failure) is still useful to the
	/// caller.
	pub fn validate_token_string(&self, token: &str) -> Result<ValidatedToken, ErrStatus> {
		let definition = self.definition.load();
		if definition.is_empty() {
			return Err(ErrStatus::NotInitialized);
		}
		Ok(validator::validate(&definition, token))
	}

	/// Same as `validate_token_string`, but additionally requires
	/// `required_scope` to be present in the token's authorized scopes.
	pub fn validate_token_string_and_require_scope(
		&self,
		token: &str,
		required_scope: &str,
	) -> Result<ValidatedToken, ErrStatus> {
		let mut outcome = self.validate_token_string(token)?;
		if outcome.is_valid() && !claims::require_scopes(&outcome.extra, &[required_scope]) {
			outcome.status = ErrStatus::MissingRequiredScope;
		}
		Ok(outcome)
	}

	/// Fetches the userinfo endpoint using `token` as a bearer credential.
	/// The response is decoded as a free-form JSON value since the
	/// provider-specific shape of userinfo is not part of this library's
	/// contract.
	pub async fn fetch_userinfo_with_accesstoken_string(
		&self,
		token: &str,
	) -> Result<Value, ErrStatus> {
		let definition = self.definition.load();
		let discovery = definition.discovery.as_ref().ok_or(ErrStatus::NotInitialized)?;

		let resp = self
			.http_client
			.get(&discovery.userinfo_endpoint)
			.bearer_auth(token)
			.send()
			.await
			.map_err(|e| {
				log::warn!("userinfo fetch failed: {e}");
				ErrStatus::Unknown
			})?;

		resp.json::<Value>().await.map_err(|e| {
			log::warn!("userinfo decode failed: {e}");
			ErrStatus::Unknown
		})
	}
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn rejects_non_https_and_empty_host() {
		assert_eq!(validate_issuer(""), Err(ErrStatus::InvalidIss));
		assert_eq!(validate_issuer("http://op.example"), Err(ErrStatus::InvalidIss));
		assert_eq!(validate_issuer("https://"), Err(ErrStatus::InvalidIss));
		assert!(validate_issuer("https://op.example").is_ok());
	}

	#[tokio::test]
	async fn validate_before_initialize_is_not_initialized() {
		let provider = Provider::new(None, false);
		assert_eq!(
			provider.validate_token_string("whatever"),
			Err(ErrStatus::NotInitialized)
		);
	}

	#[tokio::test]
	async fn double_initialize_fails() {
		let provider = Provider::new(None, false);
		assert!(provider.initialize("https://op.example").await.is_ok());
		assert_eq!(
			provider.initialize("https://op.example").await,
			Err(ErrStatus::AlreadyInitialized)
		);
		let _ = provider.uninitialize().await;
	}

	#[tokio::test]
	async fn uninitialize_without_initialize_fails() {
		let provider = Provider::new(None, false);
		assert_eq!(provider.uninitialize().await, Err(ErrStatus::NotInitialized));
	}

	#[tokio::test]
	async fn wait_until_ready_times_out_when_issuer_unreachable() {
		let provider = Provider::with_intervals(
			None,
			false,
			Duration::from_secs(60),
			Duration::from_millis(50),
		);
		// This issuer host is reserved by RFC 2606 and never resolves to a
		// real discovery endpoint, so readiness should time out.
		provider.initialize("https://invalid.invalid").await.unwrap();
		let result = provider.wait_until_ready(Duration::from_millis(200)).await;
		assert_eq!(result, Err(ErrStatus::Timeout));
		let _ = provider.uninitialize().await;
	}

	#[tokio::test]
	async fn wait_until_ready_reports_not_initialized_when_uninitialize_wins_the_race() {
		// A concurrent `uninitialize()` can cancel the refresh loop before it
		// ever publishes a definition. A waiter blocked in `wait_until_ready`
		// must observe that as failure, not as success just because its
		// ready channel was dropped.
		let provider = Arc::new(Provider::with_intervals(
			None,
			false,
			Duration::from_secs(60),
			Duration::from_secs(5),
		));
		provider.initialize("https://invalid.invalid").await.unwrap();

		let waiter = {
			let provider = provider.clone();
			tokio::spawn(async move { provider.wait_until_ready(Duration::from_secs(5)).await })
		};

		// Give the waiter a moment to subscribe to the ready channel before
		// tearing the provider down.
		tokio::time::sleep(Duration::from_millis(20)).await;
		provider.uninitialize().await.unwrap();

		let result = waiter.await.unwrap();
		assert_eq!(result, Err(ErrStatus::NotInitialized));
	}

	#[tokio::test]
	async fn reinitialize_after_uninitialize_is_allowed() {
		let provider = Provider::new(None, false);
		provider.initialize("https://op.example").await.unwrap();
		provider.uninitialize().await.unwrap();
		assert!(provider.initialize("https://op.example").await.is_ok());
		provider.uninitialize().await.unwrap();
	}
}
