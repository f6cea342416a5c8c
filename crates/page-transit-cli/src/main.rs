//! Page Transit CLI entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use page_transit::{Document, FetchOptions, Transit, TransitConfig};

#[derive(Parser)]
#[command(
    name = "page-transit",
    about = "Page Transit: fetch pages and swap their content into an HTML document",
    version
)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL relative page URLs resolve against.
    #[arg(long)]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Navigate a local document to a page and print the result.
    Navigate {
        /// HTML file acting as the live document.
        #[arg(short, long)]
        document: PathBuf,

        /// Page to navigate to.
        #[arg(short, long)]
        url: String,

        /// Container selector to swap (repeatable). Defaults to the config.
        #[arg(long = "container")]
        containers: Vec<String>,

        /// Request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Write the resulting HTML here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail when a container could not be swapped.
        #[arg(long)]
        strict: bool,
    },

    /// Fetch a page and print a JSON summary.
    Fetch {
        url: String,

        /// Request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   page-transit completions bash > ~/.local/share/bash-completion/completions/page-transit
    ///   page-transit completions zsh > ~/.zfunc/_page-transit
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<TransitConfig> {
    let mut config = TransitConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(base) = &cli.base_url {
        config.base_url = TransitConfig::with_base_url(base)?.base_url;
    }
    Ok(config)
}

fn fetch_options(timeout_ms: Option<u64>) -> FetchOptions {
    match timeout_ms {
        Some(ms) => FetchOptions::new().timeout(Duration::from_millis(ms)),
        None => FetchOptions::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Navigate {
            document,
            url,
            containers,
            timeout_ms,
            output,
            strict,
        } => {
            let mut config = load_config(&cli)?;
            if !containers.is_empty() {
                config.containers = containers.clone();
            }
            let markup = std::fs::read_to_string(document)
                .with_context(|| format!("reading {}", document.display()))?;

            let transit = Transit::new(config, Document::parse(&markup))?;
            let outcome = transit.navigate_with(url, fetch_options(*timeout_ms)).await?;
            tracing::info!("navigated to {}", outcome.page.url);

            let html = transit.document().html();
            match output {
                Some(path) => std::fs::write(path, html)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{html}"),
            }

            if *strict && !outcome.replaced {
                eprintln!("Error: not every container was replaced");
                std::process::exit(1);
            }
        }

        Commands::Fetch { url, timeout_ms } => {
            let config = load_config(&cli)?;
            let transit = Transit::new(config, Document::parse(""))?;
            let page = transit.fetch_page(url, fetch_options(*timeout_ms)).await?;
            let title = Document::parse(&page.html).title();
            let info = serde_json::json!({
                "url": page.url,
                "bytes": page.html.len(),
                "title": title,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "page-transit", &mut std::io::stdout());
        }
    }

    Ok(())
}
