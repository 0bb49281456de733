//! `validate <issuer> <token>` — exercises the native Provider API against a
//! live issuer and prints the validation outcome. Grounded on
//! `original_source/cmd/validate/main.go`.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use oidc_rp_validator::config;
use oidc_rp_validator::oidc::{Provider, TokenType};

#[derive(Parser)]
#[command(name = "validate", about = "Validate a single OIDC token against an issuer")]
struct Args {
	/// Issuer URL, e.g. https://id.example.com/realms/demo
	issuer: String,
	/// Compact-serialized JWT to validate
	token: String,
	/// Accept issuers with self-signed or otherwise invalid TLS certificates
	#[arg(long)]
	insecure: bool,
	/// Seconds to wait for the provider to become ready
	#[arg(long, default_value_t = 10)]
	ready_timeout: u64,
	/// Enable debug logging
	#[arg(long)]
	debug: bool,
}

fn print_result(label: &str, status: oidc_rp_validator::ErrStatus) {
	println!("> {label:<12}: {:#x} ({status})", status.code());
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

	let provider = Provider::with_intervals(
		Some(client),
		debug,
		Duration::from_secs(settings.refresh_interval_secs),
		Duration::from_secs(settings.refresh_retry_secs),
	);

	if let Err(status) = provider.initialize(&args.issuer).await {
		print_result("Initialize", status);
		return ExitCode::FAILURE;
	}

	if let Err(status) = provider
		.wait_until_ready(Duration::from_secs(args.ready_timeout))
		.await
	{
		print_result("Ready", status);
		let _ = provider.uninitialize().await;
		return ExitCode::FAILURE;
	}

	let begin = Instant::now();
	let outcome = provider.validate_token_string(&args.token);
	let elapsed = begin.elapsed();

	let exit = match &outcome {
		Ok(result) => {
			let valid_str = if result.is_valid() { "valid" } else { "invalid" };
			print_result("Result code", result.status);
			println!("> Validation   : {valid_str}");
			println!("> Auth ID      : {}", result.authenticated_user_id);
			println!("> Subject      : {}", result.registered.sub);
			println!("> Time spent   : {:.6}s", elapsed.as_secs_f64());
			println!("> Standard     : {:?}", result.registered);
			println!("> Extra        : {:?}", result.extra);
			println!("> Token type   : {}", result.token_type as u64);

			if result.is_valid() && result.token_type == TokenType::KCAccess {
				match provider
					.fetch_userinfo_with_accesstoken_string(&args.token)
					.await
				{
					Ok(userinfo) => {
						print_result("Userinfo", oidc_rp_validator::ErrStatus::None);
						println!("{userinfo}");
					}
					Err(status) => print_result("Userinfo", status),
				}
			}

			if result.is_valid() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
		}
		Err(status) => {
			print_result("Result code", *status);
			ExitCode::FAILURE
		}
	};

	if let Err(status) = provider.uninitialize().await {
		eprintln!("> Error: failed to uninitialize: {status}");
	}

	exit
}
