//! Fetch one URL through the http-pipeline client.
//!
//! ```bash
//! pipeline-demo https://httpbin.org/gzip --compress
//! RUST_LOG=http_pipeline=debug pipeline-demo --insecure http://localhost:8080/health
//! ```

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use http::{Method, StatusCode, Uri};
use http_pipeline::{HttpClient, HttpError, Observer, TransportSecurity};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipeline-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Absolute URL to GET
    #[arg(value_name = "URL")]
    url: String,

    /// Gzip request bodies and decode gzip responses
    #[arg(long)]
    compress: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Allow plain http:// URLs
    #[arg(long)]
    insecure: bool,
}

/// Prints each exchange to stdout.
struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_request(&self, target: &Uri, method: &Method) {
        println!("REQUEST: {target} : {method}");
    }

    fn on_response(&self, status: Option<StatusCode>) {
        match status {
            Some(status) => println!("RESPONSE: {}", status.as_u16()),
            None => println!("RESPONSE: <none>"),
        }
    }
}

/// Whether the server answered with a failure or was never reached.
fn failure_kind(err: &HttpError) -> &'static str {
    if err.is_status() {
        "HTTP non-success"
    } else {
        "connectivity"
    }
}

fn build_client(cli: &Cli) -> anyhow::Result<HttpClient> {
    let mut builder = HttpClient::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .observer(Arc::new(ConsoleObserver));
    if cli.compress {
        builder = builder.with_compression();
    }
    if cli.insecure {
        builder = builder.transport(TransportSecurity::AllowInsecureHttp);
    }
    builder.build().context("failed to build HTTP client")
}

async fn fetch(client: &HttpClient, url: &str) -> Result<String, HttpError> {
    client.get(url).send().await?.text().await
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = build_client(&cli)?;

    match fetch(&client, &cli.url).await {
        Ok(body) => {
            println!("{body}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(error = ?err, "request failed");
            eprintln!("{} failure: {err}", failure_kind(&err));
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pipeline-demo", "https://example.com"]).unwrap();
        assert_eq!(cli.url, "https://example.com");
        assert_eq!(cli.timeout_secs, 120);
        assert!(!cli.compress);
        assert!(!cli.insecure);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "pipeline-demo",
            "--compress",
            "--insecure",
            "--timeout-secs",
            "5",
            "http://localhost:8080/",
        ])
        .unwrap();
        assert!(cli.compress);
        assert!(cli.insecure);
        assert_eq!(cli.timeout_secs, 5);
    }

    #[test]
    fn test_failure_kind() {
        let status = HttpError::HttpStatus {
            status: StatusCode::BAD_GATEWAY,
            body_preview: String::new(),
            content_type: None,
        };
        assert_eq!(failure_kind(&status), "HTTP non-success");
        assert_eq!(
            failure_kind(&HttpError::Timeout(Duration::from_secs(1))),
            "connectivity"
        );
    }

    #[tokio::test]
    async fn test_build_client() {
        let cli = Cli::try_parse_from(["pipeline-demo", "--compress", "https://example.com"])
            .unwrap();
        assert!(build_client(&cli).is_ok());
    }
}
