mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use molv_bridge::{Bridge, BridgeConfig, HeadlessSession, RegistryPolicy};
use tokio::net::TcpListener;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		tracing::error!(error = %err, "fatal");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve {
			host,
			port,
			timeout_secs,
			headless,
			strict,
		} => serve(host, port, timeout_secs, headless, strict).await,
	}
}

async fn serve(
	host: String,
	port: u16,
	timeout_secs: u64,
	headless: bool,
	strict: bool,
) -> Result<()> {
	let policy = if strict {
		RegistryPolicy::Reject
	} else {
		RegistryPolicy::PromoteObserver
	};
	let bridge = Bridge::new(BridgeConfig {
		host: host.clone(),
		port,
		timeout: Duration::from_secs(timeout_secs),
		policy,
	});

	let listener = TcpListener::bind(format!("{host}:{port}"))
		.await
		.with_context(|| format!("failed to bind {host}:{port}"))?;
	let addr = listener.local_addr()?;
	println!("serving viewer on http://{addr} (session endpoint ws://{addr}/ws)");

	if headless {
		let url = format!("ws://{addr}/ws");
		tokio::spawn(async move {
			// The listener is already bound; one short retry covers the gap
			// until the accept loop is up.
			for attempt in 0..10u32 {
				match HeadlessSession::connect(&url).await {
					Ok(session) => {
						if let Err(err) = session.run().await {
							tracing::error!(error = %err, "headless session ended");
						}
						return;
					}
					Err(err) if attempt < 9 => {
						tracing::debug!(error = %err, attempt, "headless connect retry");
						tokio::time::sleep(Duration::from_millis(100)).await;
					}
					Err(err) => {
						tracing::error!(error = %err, "headless session failed to connect");
						return;
					}
				}
			}
		});
	}

	Arc::clone(&bridge)
		.serve_on(listener)
		.await
		.context("bridge endpoint error")
}
