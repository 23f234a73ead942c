use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use flowprobe::config::Config;
use flowprobe::output::{OutputMode, OutputWriter};
use flowprobe::query::{ContentSource, QueryService};
use flowprobe::server::ToolServer;
use flowprobe::store::FlowStore;

#[derive(Parser)]
#[command(name = "flowprobe")]
#[command(about = "Query recorded HTTP traffic and analyze bot protection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding capture files (overrides config and FLOWPROBE_CAPTURE_DIR)
    #[arg(long, global = true)]
    capture_dir: Option<PathBuf>,

    /// Bodies above this many bytes are previewed or truncated
    #[arg(long, global = true)]
    max_content_size: Option<usize>,

    /// Print JSON payloads instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List HTTP flows in a capture session
    List {
        /// Session id (capture file name, extension optional)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show headers and bodies of flows
    Details {
        /// Flow indexes to show
        #[arg(required = true)]
        indexes: Vec<usize>,

        #[arg(short, long)]
        session: Option<String>,

        /// Only show headers
        #[arg(long)]
        no_content: bool,
    },

    /// Extract values from a JSON body with paths like $.data.items[0].id
    Extract {
        /// Flow index
        index: usize,

        /// Path expressions
        #[arg(required = true)]
        paths: Vec<String>,

        #[arg(short, long)]
        session: Option<String>,

        /// Which body to read (request or response)
        #[arg(long, default_value = "response")]
        from: String,
    },

    /// Analyze a flow for bot protection and challenges
    Analyze {
        /// Flow index
        index: usize,

        #[arg(short, long)]
        session: Option<String>,

        /// Skip script extraction from HTML responses
        #[arg(long)]
        no_scripts: bool,
    },

    /// Serve the query tools over stdio (JSON-RPC)
    Serve,

    /// Show or initialize the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stderr keeps stdout free for payloads and the RPC stream
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load()?;
    if let Some(dir) = cli.capture_dir.clone() {
        config.capture_dir = dir;
    }
    if let Some(size) = cli.max_content_size {
        config.max_content_size = size;
    }
    debug!("Effective config: {:?}", config);

    let output = OutputWriter::new(OutputMode::auto(cli.json));
    let store = Arc::new(FlowStore::new(config.capture_dir.clone()));
    let service = QueryService::new(store, config.query_settings());
    let session = |s: Option<String>| s.unwrap_or_else(|| config.default_session.clone());

    match cli.command {
        Commands::List { session: s } => {
            let flows = service.list_flows(&session(s))?;
            output.flows(&flows)
        }

        Commands::Details {
            indexes,
            session: s,
            no_content,
        } => {
            let details = service.get_flow_details(&session(s), &indexes, !no_content)?;
            output.details(&details)
        }

        Commands::Extract {
            index,
            paths,
            session: s,
            from,
        } => {
            let source = ContentSource::from_str(&from)?;
            let fields = service.extract_json_fields(&session(s), index, source, &paths)?;
            output.fields(&fields)
        }

        Commands::Analyze {
            index,
            session: s,
            no_scripts,
        } => {
            let analysis = service.analyze_protection(&session(s), index, !no_scripts)?;
            output.analysis(&analysis)
        }

        Commands::Serve => {
            let server = Arc::new(ToolServer::new(Arc::new(service)));
            server.serve().await
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                info!("Config file: {}", Config::config_file_path()?.display());
                output.payload(&config)
            }
            ConfigAction::Init { force } => {
                let path = Config::config_file_path()?;
                if path.exists() && !force {
                    output.error(&format!(
                        "{} already exists, use --force to overwrite",
                        path.display()
                    ));
                    return Ok(());
                }
                let written = Config::default()
                    .save()
                    .context("Failed to write config file")?;
                println!("Wrote {}", written.display());
                Ok(())
            }
        },
    }
}
