//! File Cache command line
//!
//! One-shot access to a cache directory: each invocation sets the cache up,
//! runs one command and shuts it down, flushing the metadata file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_cache::{CacheConfig, FileCache, SearchLogic, SetOptions, StoredValue};

#[derive(Parser)]
#[command(name = "file_cache")]
#[command(author, version, about = "File-system backed key/value cache", long_about = None)]
struct Cli {
    /// Cache root directory
    #[arg(short, long, global = true, env = "CACHE_DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value
    Set {
        key: String,
        value: String,

        /// Parse the value as JSON and store it as an object
        #[arg(long, conflicts_with = "number")]
        json: bool,

        /// Parse the value as a number
        #[arg(long)]
        number: bool,

        /// Compress the stored bytes
        #[arg(short, long)]
        compress: bool,

        /// Expire the entry after this many milliseconds
        #[arg(short, long, value_name = "MS")]
        expire_ms: Option<u64>,

        /// Search keyword (can be specified multiple times)
        #[arg(short, long = "tag", value_name = "KEYWORD")]
        tags: Vec<String>,
    },

    /// Print a value
    Get { key: String },

    /// Delete a value
    Del { key: String },

    /// Report whether a key exists
    Exist { key: String },

    /// List keys tagged with the given keywords
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Require every keyword instead of any
        #[arg(long)]
        all: bool,
    },

    /// List every key
    Keys,

    /// Print cache statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "warn" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_cache=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env();
    if let Some(dir) = cli.dir {
        config.root_dir = dir;
    }
    info!("Using cache directory {}", config.root_dir.display());

    let cache = FileCache::setup(config)
        .await
        .context("Failed to set up cache")?;

    let outcome = run(&cache, cli.command).await;
    cache.shutdown().await.context("Failed to flush metadata")?;
    outcome
}

async fn run(cache: &FileCache, command: Commands) -> Result<()> {
    match command {
        Commands::Set {
            key,
            value,
            json,
            number,
            compress,
            expire_ms,
            tags,
        } => {
            let content = if json {
                StoredValue::Object(serde_json::from_str(&value).context("Value is not valid JSON")?)
            } else if number {
                StoredValue::Number(value.trim().parse().context("Value is not a number")?)
            } else {
                StoredValue::Text(value)
            };

            let mut options = SetOptions::new().compress(compress).search(tags);
            if let Some(ms) = expire_ms {
                options = options.expire_ms(ms);
            }
            cache.set(&key, content, options).await?;
        }
        Commands::Get { key } => match cache.get(&key).await? {
            StoredValue::Text(s) => println!("{}", s),
            StoredValue::Number(n) => println!("{}", n),
            StoredValue::Object(v) => println!("{}", serde_json::to_string_pretty(&v)?),
        },
        Commands::Del { key } => {
            if !cache.del(&key).await? {
                eprintln!("{} not found", key);
            }
        }
        Commands::Exist { key } => println!("{}", cache.exist(&key)),
        Commands::Search { keywords, all } => {
            let logic = if all {
                SearchLogic::And
            } else {
                SearchLogic::Or
            };
            for key in cache.search(&keywords, logic) {
                println!("{}", key);
            }
        }
        Commands::Keys => {
            for key in cache.keys() {
                println!("{}", key);
            }
        }
        Commands::Stats => println!("{}", serde_json::to_string_pretty(&cache.stats())?),
    }
    Ok(())
}
