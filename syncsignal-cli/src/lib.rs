//! Command-line inspection of a durable sync store
//!
//! Every invocation is one more execution context on the store, so values
//! written here reach running applications through their polling fallback.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use syncsignal_core::codec::decode_envelope;
use syncsignal_core::config::BackendKind;
use syncsignal_core::{
    Config, Flavor, Origin, PathSegment, ScalarOptions, StructureOptions, Subscription, SyncContext, SyncValue,
    TransportMode,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "syncsignal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database; overrides the configured store
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Namespace selector; structure is the default everywhere
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlavorArg {
    Scalar,
    #[default]
    Structure,
}

impl From<FlavorArg> for Flavor {
    fn from(arg: FlavorArg) -> Self {
        match arg {
            FlavorArg::Scalar => Flavor::Scalar,
            FlavorArg::Structure => Flavor::Structure,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List persisted keys
    Keys {
        /// Limit to one namespace
        #[arg(short, long, value_enum)]
        flavor: Option<FlavorArg>,
    },
    /// Print the stored value of a key
    Get {
        key: String,
        #[arg(short, long, value_enum, default_value_t)]
        flavor: FlavorArg,
    },
    /// Store a JSON value under a key and sync it
    Set {
        key: String,
        /// JSON text; anything unparsable is stored as a plain string
        value: String,
        #[arg(short, long, value_enum, default_value_t)]
        flavor: FlavorArg,
    },
    /// Delete one stored entry
    Clear {
        key: String,
        #[arg(short, long, value_enum, default_value_t)]
        flavor: FlavorArg,
    },
    /// Delete every stored entry of both namespaces
    ClearAll,
    /// Print a key's value every time another context changes it
    Watch {
        key: String,
        #[arg(short, long, value_enum, default_value_t)]
        flavor: FlavorArg,
        /// Polling interval in milliseconds
        #[arg(short, long, default_value_t = 500)]
        interval: u64,
        /// Exit after this many changes
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Report which transports the store supports
    Probe,
}

/// Resolve configuration: file or environment, then command-line overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env().context("invalid SYNCSIGNAL_* environment")?,
    };

    if let Some(db) = &cli.db {
        config.store.backend = BackendKind::Sqlite;
        config.store.path = Some(db.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

fn parse_value(raw: &str) -> SyncValue {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => SyncValue::from_json(json),
        Err(_) => SyncValue::from(raw),
    }
}

fn render(value: &SyncValue) -> Result<String> {
    Ok(serde_json::to_string_pretty(&value.to_plain_json())?)
}

/// Execute one command against the configured store
pub async fn run(cli: &Cli, config: &Config, out: &mut impl Write) -> Result<()> {
    let origin = Origin::from_config(&config.store)?;
    if config.store.backend == BackendKind::Memory {
        warn!("Using an in-memory store; nothing outlives this command");
    }
    let ctx = origin.context();

    match &cli.command {
        Command::Keys { flavor } => {
            let flavors = match flavor {
                Some(f) => vec![Flavor::from(*f)],
                None => Flavor::all().to_vec(),
            };
            for flavor in flavors {
                for key in ctx.list_keys(flavor) {
                    writeln!(out, "{}\t{}", flavor, key)?;
                }
            }
        }
        Command::Get { key, flavor } => {
            let flavor = Flavor::from(*flavor);
            let storage_key = flavor.storage_key(key);
            let raw = ctx
                .store()
                .read(&storage_key)?
                .ok_or_else(|| anyhow!("no stored entry for {} key '{}'", flavor, key))?;
            let envelope = decode_envelope(&raw).with_context(|| format!("stored entry {} is malformed", storage_key))?;
            writeln!(out, "{}", render(&envelope.data)?)?;
        }
        Command::Set { key, value, flavor } => {
            set_value(&ctx, key, parse_value(value), Flavor::from(*flavor), config)?;
            info!(key = %key, "Value stored");
        }
        Command::Clear { key, flavor } => {
            ctx.clear_synced_entry(key, Flavor::from(*flavor));
        }
        Command::ClearAll => {
            ctx.clear_all_synced_entries();
        }
        Command::Watch {
            key,
            flavor,
            interval,
            count,
        } => {
            if *interval == 0 {
                bail!("watch interval must be greater than 0");
            }
            watch(&ctx, key, Flavor::from(*flavor), Duration::from_millis(*interval), *count, out).await?;
        }
        Command::Probe => {
            writeln!(out, "broadcast\t{}", ctx.is_broadcast_transport_supported())?;
            writeln!(out, "durable\t{}", ctx.is_durable_store_supported())?;
        }
    }

    Ok(())
}

fn set_value(ctx: &SyncContext, key: &str, value: SyncValue, flavor: Flavor, config: &Config) -> Result<()> {
    match flavor {
        Flavor::Scalar => {
            let options = ScalarOptions::from_settings(key, &config.sync).auto_sync(false);
            let unit = ctx.create_synced_scalar(value.clone(), Some(options))?;
            unit.set(value);
            unit.sync();
            unit.teardown();
        }
        Flavor::Structure => {
            let options = StructureOptions::from_settings(key, value.clone(), &config.sync);
            let unit = ctx.create_synced_structure(options)?;
            unit.replace(Vec::<PathSegment>::new(), value)?;
            unit.sync();
            unit.teardown();
        }
    }
    Ok(())
}

async fn watch(
    ctx: &SyncContext,
    key: &str,
    flavor: Flavor,
    interval: Duration,
    count: Option<usize>,
    out: &mut impl Write,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Stored value wins at load; nothing is written back
    let (initial, _subscription, stop): (SyncValue, Subscription, Box<dyn Fn()>) = match flavor {
        Flavor::Scalar => {
            let options = ScalarOptions::new(key)
                .persist_on_load(false)
                .transport_mode(TransportMode::DurableOnly)
                .polling(interval);
            let unit = ctx.create_synced_scalar(SyncValue::Null, Some(options))?;
            let subscription = unit.subscribe(move |value| {
                let _ = tx.send(value.clone());
            });
            (unit.get(), subscription, Box::new(move || unit.teardown()) as Box<dyn Fn()>)
        }
        Flavor::Structure => {
            let options = StructureOptions::new(key, SyncValue::Null)
                .persist_on_load(false)
                .transport_mode(TransportMode::DurableOnly)
                .polling(interval);
            let unit = ctx.create_synced_structure(options)?;
            let subscription = unit.subscribe(move |value| {
                let _ = tx.send(value.clone());
            });
            (unit.state(), subscription, Box::new(move || unit.teardown()) as Box<dyn Fn()>)
        }
    };

    writeln!(out, "{}", render(&initial)?)?;
    out.flush()?;

    let mut seen = 0;
    while count.map_or(true, |limit| seen < limit) {
        tokio::select! {
            changed = rx.recv() => match changed {
                Some(value) => {
                    writeln!(out, "{}", render(&value)?)?;
                    out.flush()?;
                    seen += 1;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    stop();
    Ok(())
}
