use clap::{Parser, Subcommand};
use serde_json::Value;
use sqrlstore::store::codec;
use sqrlstore::{BackendMode, Listener, SetOptions, StoreAdapter, StoreConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "sqrl-store", about = "Key-value and pub/sub store tool", version)]
struct Args {
  #[arg(short, long)]
  config: Option<String>,
  /// Backend: memory or redis
  #[arg(long, env = "SQRL_STORE_MODE")]
  mode: Option<BackendMode>,
  #[arg(long, env = "SQRL_STORE_REDIS_HOST")]
  host: Option<String>,
  #[arg(short, long, env = "SQRL_STORE_REDIS_PORT")]
  port: Option<u16>,
  #[arg(long)]
  log_level: Option<String>,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Print the value at a key
  Get { key: String },
  /// Store a value (JSON, or a plain string)
  Set {
    key: String,
    value: String,
    /// Expiry in seconds
    #[arg(long)]
    ttl: Option<u64>,
  },
  /// Remove a key
  Del { key: String },
  /// Check whether a key exists
  Has { key: String },
  /// Increment a counter
  Incr { key: String },
  /// Set a key's TTL in seconds
  Expire { key: String, ttl: u64 },
  /// Publish a message (JSON, or a plain string)
  Publish { channel: String, message: String },
  /// Print messages from channels until interrupted
  Subscribe {
    #[arg(required = true)]
    channels: Vec<String>,
  },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    StoreConfig::from_file(path)?
  } else {
    StoreConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(mode) = args.mode {
    config.mode = mode;
  }
  if let Some(host) = args.host {
    config.redis.host = host;
  }
  if let Some(port) = args.port {
    config.redis.port = port;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let store = config.connect().await?;
  run(&store, args.command).await
}

async fn run(store: &StoreAdapter, command: Command) -> Result<(), anyhow::Error> {
  match command {
    Command::Get { key } => match store.get(&key).await? {
      Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
      None => println!("(nil)"),
    },
    Command::Set { key, value, ttl } => {
      let value = codec::decode(value);
      store.set(&key, &value, SetOptions { ttl }).await?;
      println!("OK");
    }
    Command::Del { key } => println!("{}", i32::from(store.delete(&key).await?)),
    Command::Has { key } => println!("{}", i32::from(store.has(&key).await?)),
    Command::Incr { key } => println!("{}", store.increment(&key).await?),
    Command::Expire { key, ttl } => println!("{}", i32::from(store.expire(&key, ttl).await?)),
    Command::Publish { channel, message } => {
      let message = codec::decode(message);
      println!("{}", store.publish(&channel, &message).await?);
    }
    Command::Subscribe { channels } => {
      for channel in channels {
        let name = channel.clone();
        let listener: Listener = Arc::new(move |message: &Value| {
          println!("{} {}", name, message);
        });
        store.subscribe(&channel, listener).await?;
      }
      tokio::signal::ctrl_c().await?;
      for channel in store.channels() {
        store.unsubscribe(&channel, None).await?;
      }
    }
  }
  Ok(())
}
