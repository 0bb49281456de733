//! `benchmark <issuer> <token>` — drives many concurrent validators against
//! a single Provider to exercise the lock-free read path. Grounded on
//! `original_source/cmd/benchmark/main.go`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use oidc_rp_validator::config;
use oidc_rp_validator::oidc::Provider;

#[derive(Parser)]
#[command(name = "benchmark", about = "Benchmark concurrent token validation against an issuer")]
struct Args {
	issuer: String,
	token: String,
	#[arg(long)]
	insecure: bool,
	/// Number of validator tasks; defaults to available parallelism
	#[arg(long)]
	threads: Option<usize>,
	/// Validations per task
	#[arg(long, default_value_t = 100_000)]
	count: u64,
	#[arg(long, default_value_t = 10)]
	ready_timeout: u64,
	#[arg(long)]
	debug: bool,
}

async fn bench_validate_token_s(provider: Arc<Provider>, id: usize, count: u64, token: Arc<String>) {
	log::info!("thread {id} started ...");
	let mut success = 0u64;
	let mut failed = 0u64;
	for _ in 0..count {
		match provider.validate_token_string(&token) {
			Ok(outcome) if outcome.is_valid() => success += 1,
			Ok(_) | Err(_) => failed += 1,
		}
	}
	log::info!("thread {id} done:{success} failed:{failed} ...");
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();
	let settings = config::load().unwrap_or_default();
	let debug = args.debug || settings.debug;

	if let Err(e) = oidc_rp_validator::logging::init_cli(debug) {
		eprintln!("warning: failed to initialize logging: {e}");
	}

	let client = match reqwest::Client::builder()
		.danger_accept_invalid_certs(args.insecure)
		.timeout(Duration::from_millis(settings.http_timeout_ms))
		.build()
	{
		Ok(c) => c,
		Err(e) => {
			println!("> Error: failed to build http client: {e}");
			return ExitCode::FAILURE;
		}
	};

	let provider = Arc::new(Provider::with_intervals(
		Some(client),
		debug,
		Duration::from_secs(settings.refresh_interval_secs),
		Duration::from_secs(settings.refresh_retry_secs),
	));

	if let Err(status) = provider.initialize(&args.issuer).await {
		println!("> Error: initialize failed: {status}");
		return ExitCode::FAILURE;
	}

	if let Err(status) = provider
		.wait_until_ready(Duration::from_secs(args.ready_timeout))
		.await
	{
		println!("> Error: failed to get ready in time: {status}");
		let _ = provider.uninitialize().await;
		return ExitCode::FAILURE;
	}

	let num_threads = args
		.threads
		.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
	let token = Arc::new(args.token);

	println!("> Info : using {num_threads} threads with {} runs per thread", args.count);

	let begin = Instant::now();
	let mut handles = Vec::with_capacity(num_threads);
	for id in 1..=num_threads {
		handles.push(tokio::spawn(bench_validate_token_s(
			provider.clone(),
			id,
			args.count,
			token.clone(),
		)));
	}
	for handle in handles {
		let _ = handle.await;
	}
	let elapsed = begin.elapsed();
	let rate = (args.count * num_threads as u64) as f64 / elapsed.as_secs_f64();

	println!("> Time : {:.6}s", elapsed.as_secs_f64());
	println!("> Rate : {rate:.6} ops");

	if let Err(status) = provider.uninitialize().await {
		eprintln!("> Error: failed to uninitialize: {status}");
	}

	ExitCode::SUCCESS
}
