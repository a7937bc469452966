use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use unrelated_http_tools::runtime::{DownstreamExecutor, ExecutorConfig};
use unrelated_openapi_mcp_proxy::cache::CacheStore;
use unrelated_openapi_mcp_proxy::error::{ProxyError, Result};
use unrelated_openapi_mcp_proxy::session::GatewaySession;
use unrelated_openapi_tools::config::ToolSourceConfig;
use unrelated_openapi_tools::runtime::OpenApiToolSource;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Expose an OpenAPI-described HTTP API as MCP tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "unrelated-openapi-mcp-proxy", version, about, long_about = None)]
struct Args {
    /// URL of the OpenAPI document (JSON or YAML)
    #[arg(value_name = "SPEC_URL")]
    spec_url: String,

    /// Prefix for every tool name (normalized to end with a single `_`)
    #[arg(value_name = "TOOL_PREFIX", default_value = "")]
    tool_prefix: String,

    /// Directory for `tools_cache_*.json` files (default: the executable's directory)
    #[arg(long, env = "OPENAPI_MCP_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Timeout for fetching the spec and for spec-host reachability checks
    #[arg(long, env = "OPENAPI_MCP_SPEC_TIMEOUT_SECS", default_value_t = 10)]
    spec_timeout_secs: u64,

    /// Timeout for each downstream API call
    #[arg(long, env = "OPENAPI_MCP_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Timeout for the offline-recovery reachability probe
    #[arg(long, env = "OPENAPI_MCP_PROBE_TIMEOUT_SECS", default_value_t = 5)]
    probe_timeout_secs: u64,

    /// Log level (overridden by `RUST_LOG` when set)
    #[arg(long, env = "OPENAPI_MCP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "OPENAPI_MCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "proxy exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ToolSourceConfig::new(args.spec_url)
        .with_tool_prefix(&args.tool_prefix)
        .with_spec_timeout(Duration::from_secs(args.spec_timeout_secs));

    let source = OpenApiToolSource::load(config, reqwest::Client::new())
        .await
        .map_err(ProxyError::SpecLoad)?;

    let executor = DownstreamExecutor::new(ExecutorConfig {
        call_timeout: Duration::from_secs(args.call_timeout_secs),
        probe_timeout: Duration::from_secs(args.probe_timeout_secs),
    });
    let cache = CacheStore::new(args.cache_dir.unwrap_or_else(default_cache_dir));
    tracing::debug!(dir = %cache.dir().display(), "using tools cache directory");

    let mut session = GatewaySession::new(source, executor, cache);
    session
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

/// The executable's directory, or the working directory when that cannot be determined.
fn default_cache_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // stdout carries the protocol; logs must stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
