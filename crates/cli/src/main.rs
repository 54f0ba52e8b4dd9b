//! `shq-enqueue`: enqueue one function invocation from the command line.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`](config::Config) from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Read the payload as JSON from stdin.
//! 4. Enqueue it and print the API response to stdout.

mod config;
mod telemetry;

use std::io::Read;

use anyhow::{Context, Result};
use shq_client::{Client, EnqueueArgs, Value};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let log = config::LogConfig::from_env()?;
    let cfg = config::Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: shq-enqueue configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&log.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        function = %cfg.function_name,
        "shq-enqueue starting"
    );

    // -----------------------------------------------------------------------
    // 3. Payload
    // -----------------------------------------------------------------------
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read payload from stdin")?;
    let json: serde_json::Value = if input.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(&input).context("payload on stdin is not valid JSON")?
    };
    let payload = Value::from(json);

    // -----------------------------------------------------------------------
    // 4. Enqueue
    // -----------------------------------------------------------------------
    let client = Client::new(cfg.token.as_str(), &cfg.client)?;
    let resp = client
        .enqueue(EnqueueArgs {
            function_name: &cfg.function_name,
            payload: &payload,
            callback_url: &cfg.callback_url,
        })
        .await
        .context("enqueue failed")?;

    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}
