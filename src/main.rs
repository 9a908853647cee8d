//! gsfetch -- fetch a Cloud Storage object with HTTP semantics.
//!
//! Streams the body of `gs://bucket/key[#generation]` to stdout.  Exits
//! non-zero when the request fails outright or the response status is
//! neither 2xx nor 304.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use gsprotocol::config::{load_config, Config};
use gsprotocol::{ObjectRequest, ObjectResponse, Transport};
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Command-line arguments for gsfetch.
#[derive(Parser, Debug)]
#[command(
    name = "gsfetch",
    version,
    about = "Fetch a Cloud Storage object with HTTP GET/HEAD semantics"
)]
struct Cli {
    /// Path to the YAML configuration file.  Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Send a HEAD request instead of GET.
    #[arg(short = 'I', long)]
    head: bool,

    /// Print the status line and response headers to stderr.
    #[arg(short, long)]
    include: bool,

    /// Extra request header, e.g. `-H 'If-None-Match: "abc"'`.  Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Object URL: gs://bucket/key[#generation].
    url: String,
}

/// Exit status for responses that are neither 2xx nor 304.
const EXIT_HTTP_ERROR: u8 = 22;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            load_config(path).with_context(|| format!("loading configuration from {path}"))?
        }
        None => Config::default(),
    };

    init_tracing(&config);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path);
    }

    let metrics = if config.observability.metrics {
        let handle = gsprotocol::metrics::init_metrics()?;
        gsprotocol::metrics::describe_metrics();
        Some(handle)
    } else {
        None
    };

    let transport = Transport::with_gcs(&config.gcs)?;

    let method = if cli.head { Method::HEAD } else { Method::GET };
    let mut req = ObjectRequest::new(method, &cli.url)?;
    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        req.headers.append(name, value);
    }

    let resp = transport.round_trip(&req).await?;
    debug!(status = %resp.status, "received response");
    if cli.include {
        print_head(&resp);
    }
    let status = resp.status;

    let mut stdout = tokio::io::stdout();
    let mut body = resp.body;
    while let Some(chunk) = body.chunk().await? {
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }

    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_HTTP_ERROR))
    }
}

/// Initialize tracing from the logging section.  `RUST_LOG` overrides the
/// configured level.  Logs go to stderr so they never mix with the body.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Split a `Name: value` argument into a header pair.
fn parse_header(raw: &str) -> anyhow::Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid header {raw:?}: expected 'Name: value'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in {raw:?}"))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in {raw:?}"))?;
    Ok((name, value))
}

fn print_head(resp: &ObjectResponse) {
    eprintln!("{:?} {}", resp.version, resp.status);
    for (name, value) in &resp.headers {
        eprintln!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    if resp.close {
        eprintln!("connection: close");
    }
    eprintln!();
}
