use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use perplexity_mcp::config::{
    default_config_path, find_config_file, load_settings, write_default_config, ConfigProvider,
    EnvConfigProvider, API_KEY_VAR, BASE_URL_VAR, PROXY_VARS, SERVICE_ORIGIN_VAR, TIMEOUT_VAR,
};
use perplexity_mcp::engine::Engines;
use perplexity_mcp::mcp::McpServer;
use perplexity_mcp::models::{
    CompletionRequest, ConversationMessage, FilterArgs, ReasoningEffort, Recency,
    SearchContextSize, SearchQuery, SearchRequest, ASK_MODEL, DEEP_RESEARCH_MODEL, REASON_MODEL,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Perplexity MCP - Perplexity answers, research and web search as MCP tools
#[derive(Parser, Debug)]
#[command(name = "perplexity-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Perplexity answers, research and web search as MCP tools", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in milliseconds (PERPLEXITY_TIMEOUT_MS still wins per call)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Log line format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Recency window
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RecencyArg {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Web context size
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ContextSizeArg {
    Low,
    Medium,
    High,
}

/// Research depth
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EffortArg {
    Minimal,
    Low,
    Medium,
    High,
}

/// Options shared by `ask` and `reason`
#[derive(Args, Debug)]
struct AnswerArgs {
    /// Question to ask
    query: String,

    /// Only use sources from this recent window
    #[arg(long, value_enum)]
    recency: Option<RecencyArg>,

    /// Domain to include, or exclude with a leading '-' (repeatable)
    #[arg(long = "domain", short = 'd', allow_hyphen_values = true)]
    domains: Vec<String>,

    /// Published after (M/D/YYYY)
    #[arg(long)]
    after: Option<String>,

    /// Published before (M/D/YYYY)
    #[arg(long)]
    before: Option<String>,

    /// Last updated after (M/D/YYYY)
    #[arg(long)]
    updated_after: Option<String>,

    /// Last updated before (M/D/YYYY)
    #[arg(long)]
    updated_before: Option<String>,

    /// How much web context to retrieve
    #[arg(long, value_enum)]
    context_size: Option<ContextSizeArg>,

    /// Remove <think> reasoning from the answer
    #[arg(long)]
    strip_thinking: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (for Claude Desktop and other MCP clients)
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Host to bind to for HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Ask a question (sonar-pro)
    #[command(alias = "a")]
    Ask(AnswerArgs),

    /// Run a deep research report (sonar-deep-research)
    Research {
        /// Research topic
        query: String,

        /// Research depth
        #[arg(long, value_enum)]
        effort: Option<EffortArg>,

        /// Remove <think> reasoning from the report
        #[arg(long)]
        strip_thinking: bool,
    },

    /// Reason through a problem (sonar-reasoning-pro)
    Reason(AnswerArgs),

    /// Search the web
    #[command(alias = "s")]
    Search {
        /// One or more queries (at most 5)
        #[arg(required = true)]
        queries: Vec<String>,

        /// Number of results (1-20)
        #[arg(long, short, default_value_t = 10)]
        max_results: u64,

        /// Tokens extracted per page (256-2048)
        #[arg(long, default_value_t = 1024)]
        max_tokens_per_page: u64,

        /// ISO 3166-1 alpha-2 country code
        #[arg(long, short)]
        country: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Target path (default: user config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

impl From<RecencyArg> for Recency {
    fn from(arg: RecencyArg) -> Self {
        match arg {
            RecencyArg::Hour => Recency::Hour,
            RecencyArg::Day => Recency::Day,
            RecencyArg::Week => Recency::Week,
            RecencyArg::Month => Recency::Month,
            RecencyArg::Year => Recency::Year,
        }
    }
}

impl From<ContextSizeArg> for SearchContextSize {
    fn from(arg: ContextSizeArg) -> Self {
        match arg {
            ContextSizeArg::Low => SearchContextSize::Low,
            ContextSizeArg::Medium => SearchContextSize::Medium,
            ContextSizeArg::High => SearchContextSize::High,
        }
    }
}

impl From<EffortArg> for ReasoningEffort {
    fn from(arg: EffortArg) -> Self {
        match arg {
            EffortArg::Minimal => ReasoningEffort::Minimal,
            EffortArg::Low => ReasoningEffort::Low,
            EffortArg::Medium => ReasoningEffort::Medium,
            EffortArg::High => ReasoningEffort::High,
        }
    }
}

impl AnswerArgs {
    fn into_request(self, model: &str) -> (CompletionRequest, FilterArgs) {
        let filters = FilterArgs {
            recency: self.recency.map(Recency::from),
            search_after_date: self.after,
            search_before_date: self.before,
            last_updated_after: self.updated_after,
            last_updated_before: self.updated_before,
            domain_filter: (!self.domains.is_empty()).then_some(self.domains),
        };

        let mut request = CompletionRequest::new(model, vec![ConversationMessage::user(self.query)])
            .strip_thinking(self.strip_thinking);
        if let Some(size) = self.context_size {
            request = request.search_context_size(size.into());
        }

        (request, filters)
    }
}

/// Print all recognised environment variables
fn print_env_vars() {
    println!("Perplexity MCP - Environment Variables");
    println!();
    println!("API:");
    println!("  {:<27} Perplexity API key (required)", API_KEY_VAR);
    println!("  {:<27} API root (default: https://api.perplexity.ai)", BASE_URL_VAR);
    println!("  {:<27} Request timeout in milliseconds (default: 300000)", TIMEOUT_VAR);
    println!("  {:<27} Value sent as the X-Service header", SERVICE_ORIGIN_VAR);
    println!();
    println!("Proxy (first non-empty wins):");
    for name in PROXY_VARS {
        println!("  {}", name);
    }
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export {}=\"pplx-your-key-here\"", API_KEY_VAR);
    println!("  export {}=\"600000\"", TIMEOUT_VAR);
}

fn init_tracing(verbose: u8, quiet: bool, format: LogFormat) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("perplexity_mcp={}", level)),
    );

    // stdout carries the stdio transport, so logs always go to stderr
    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .init();
}

/// Load settings and build the engines; a missing API key is fatal here
fn build_engines(config: Option<PathBuf>, timeout_ms: Option<u64>) -> Result<Engines> {
    let config_path = config.or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    let mut settings = load_settings(config_path.as_deref())?;
    if let Some(timeout_ms) = timeout_ms {
        settings.timeout_ms = timeout_ms;
    }

    let provider = Arc::new(EnvConfigProvider::new(settings));
    provider.require_api_key()?;
    Ok(Engines::new(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let (config, timeout_ms) = (cli.config, cli.timeout_ms);
    match cli.command {
        Some(Commands::InitConfig { path, force }) => {
            let path = path
                .or_else(default_config_path)
                .ok_or_else(|| anyhow::anyhow!("No user config directory; pass --path"))?;
            write_default_config(&path, force)?;
            println!("Wrote default configuration to {}", path.display());
        }

        None | Some(Commands::Serve { http: false, .. }) => {
            let server = McpServer::new(&build_engines(config, timeout_ms)?)?;
            server.run().await?;
        }

        Some(Commands::Serve {
            http: true,
            port,
            host,
        }) => {
            let server = McpServer::new(&build_engines(config, timeout_ms)?)?;
            let addr = format!("{}:{}", host, port);
            let (_bound, handle) = server.run_http(&addr).await?;

            handle
                .await
                .map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
        }

        Some(Commands::Ask(args)) => {
            let engines = build_engines(config, timeout_ms)?;
            let (request, filters) = args.into_request(ASK_MODEL);
            println!("{}", engines.completion.complete_filtered(request, filters).await?);
        }

        Some(Commands::Reason(args)) => {
            let engines = build_engines(config, timeout_ms)?;
            let (request, filters) = args.into_request(REASON_MODEL);
            println!("{}", engines.completion.complete_filtered(request, filters).await?);
        }

        Some(Commands::Research {
            query,
            effort,
            strip_thinking,
        }) => {
            let mut request =
                CompletionRequest::new(DEEP_RESEARCH_MODEL, vec![ConversationMessage::user(query)])
                    .strip_thinking(strip_thinking);
            if let Some(effort) = effort {
                request = request.reasoning_effort(effort.into());
            }
            let engines = build_engines(config, timeout_ms)?;
            println!("{}", engines.completion.complete(request).await?);
        }

        Some(Commands::Search {
            mut queries,
            max_results,
            max_tokens_per_page,
            country,
        }) => {
            let query = if queries.len() == 1 {
                SearchQuery::Single(queries.remove(0))
            } else {
                SearchQuery::Batch(queries)
            };
            let mut request = SearchRequest::new(query)
                .max_results(max_results)
                .max_tokens_per_page(max_tokens_per_page);
            if let Some(country) = country {
                request = request.country(country);
            }
            let engines = build_engines(config, timeout_ms)?;
            println!("{}", engines.search.search(request).await?);
        }
    }

    Ok(())
}
