//! Redis backing client

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::{BackingClient, MessageHandler, SubscriberConnection};
use crate::config::RedisConfig;

/// Backing client for an external Redis server.
///
/// Commands go through a [`ConnectionManager`], which reconnects on its own.
/// [`BackingClient::duplicate`] opens a separate connection in pub/sub mode.
#[derive(Clone)]
pub struct RedisClient {
  client: Client,
  connection: ConnectionManager,
}

impl RedisClient {
  /// Connect using a [`RedisConfig`]
  pub async fn connect(config: &RedisConfig) -> Result<Self, RedisError> {
    Self::from_url(&config.connection_url()).await
  }

  /// Connect using a `redis://` or `rediss://` URL
  pub async fn from_url(url: &str) -> Result<Self, RedisError> {
    let client = Client::open(url)?;
    let connection = ConnectionManager::new(client.clone()).await?;
    Ok(Self { client, connection })
  }

  /// Test the connection to Redis
  pub async fn test_connection(&self) -> Result<(), RedisError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(())
  }
}

#[async_trait]
impl BackingClient for RedisClient {
  async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
    let mut conn = self.connection.clone();
    let value: Option<String> = conn.get(key).await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: String, ttl: Option<u64>) -> Result<(), anyhow::Error> {
    let mut conn = self.connection.clone();
    let result: Result<(), RedisError> = match ttl {
      Some(seconds) => conn.set_ex(key, value, seconds).await,
      None => conn.set(key, value).await,
    };
    Ok(result?)
  }

  async fn del(&self, key: &str) -> Result<u64, anyhow::Error> {
    let mut conn = self.connection.clone();
    Ok(conn.del(key).await?)
  }

  async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
    let mut conn = self.connection.clone();
    Ok(conn.exists(key).await?)
  }

  async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
    let mut conn = self.connection.clone();
    Ok(conn.incr(key, 1i64).await?)
  }

  async fn expire(&self, key: &str, ttl: u64) -> Result<bool, anyhow::Error> {
    let mut conn = self.connection.clone();
    let seconds = i64::try_from(ttl).map_err(|_| anyhow!("ttl out of range: {}", ttl))?;
    Ok(conn.expire(key, seconds).await?)
  }

  async fn publish(&self, channel: &str, message: String) -> Result<u64, anyhow::Error> {
    let mut conn = self.connection.clone();
    Ok(conn.publish(channel, message).await?)
  }

  async fn duplicate(&self) -> Result<Box<dyn SubscriberConnection>, anyhow::Error> {
    let pubsub = self.client.get_async_pubsub().await?;
    Ok(Box::new(RedisSubscriber::spawn(pubsub)))
  }
}

enum SubscriberCommand {
  Subscribe(String, oneshot::Sender<RedisResult<()>>),
  Unsubscribe(String, oneshot::Sender<RedisResult<()>>),
}

type HandlerSlot = Arc<RwLock<Option<MessageHandler>>>;

/// Pub/sub connection owned by a background task.
///
/// The task interleaves SUBSCRIBE/UNSUBSCRIBE requests with inbound
/// messages, so commands never wait on message delivery. It stops when the
/// connection closes or the subscriber is dropped.
pub struct RedisSubscriber {
  commands: mpsc::UnboundedSender<SubscriberCommand>,
  handler: HandlerSlot,
}

impl RedisSubscriber {
  fn spawn(pubsub: PubSub) -> Self {
    let (commands, rx) = mpsc::unbounded_channel();
    let handler: HandlerSlot = Arc::new(RwLock::new(None));
    tokio::spawn(run_subscriber(pubsub, rx, handler.clone()));
    Self { commands, handler }
  }

  async fn request(
    &self,
    make: impl FnOnce(oneshot::Sender<RedisResult<()>>) -> SubscriberCommand,
  ) -> Result<(), anyhow::Error> {
    let (tx, rx) = oneshot::channel();
    self
      .commands
      .send(make(tx))
      .map_err(|_| anyhow!("subscriber connection closed"))?;
    rx.await
      .map_err(|_| anyhow!("subscriber connection closed"))??;
    Ok(())
  }
}

#[async_trait]
impl SubscriberConnection for RedisSubscriber {
  async fn subscribe(&self, channel: &str) -> Result<(), anyhow::Error> {
    let channel = channel.to_string();
    self
      .request(|tx| SubscriberCommand::Subscribe(channel, tx))
      .await
  }

  async fn unsubscribe(&self, channel: &str) -> Result<(), anyhow::Error> {
    let channel = channel.to_string();
    self
      .request(|tx| SubscriberCommand::Unsubscribe(channel, tx))
      .await
  }

  fn on_message(&self, handler: MessageHandler) {
    *self.handler.write() = Some(handler);
  }
}

async fn run_subscriber(
  mut pubsub: PubSub,
  mut commands: mpsc::UnboundedReceiver<SubscriberCommand>,
  handler: HandlerSlot,
) {
  loop {
    let command = {
      let mut messages = std::pin::pin!(pubsub.on_message());
      tokio::select! {
        message = messages.next() => match message {
          Some(msg) => {
            deliver(&handler, &msg);
            continue;
          }
          None => {
            tracing::warn!("Redis subscriber connection closed");
            break;
          }
        },
        command = commands.recv() => match command {
          Some(command) => command,
          None => break,
        },
      }
    };

    match command {
      SubscriberCommand::Subscribe(channel, reply) => {
        let result = pubsub.subscribe(&channel).await;
        tracing::debug!("Redis SUBSCRIBE {} (ok: {})", channel, result.is_ok());
        let _ = reply.send(result);
      }
      SubscriberCommand::Unsubscribe(channel, reply) => {
        let result = pubsub.unsubscribe(&channel).await;
        tracing::debug!("Redis UNSUBSCRIBE {} (ok: {})", channel, result.is_ok());
        let _ = reply.send(result);
      }
    }
  }
}

fn deliver(handler: &HandlerSlot, msg: &redis::Msg) {
  let payload: String = match msg.get_payload() {
    Ok(payload) => payload,
    Err(e) => {
      tracing::warn!(
        "Dropping non-text message on '{}': {}",
        msg.get_channel_name(),
        e
      );
      return;
    }
  };
  let handler = handler.read().clone();
  if let Some(handler) = handler {
    handler(msg.get_channel_name(), &payload);
  }
}
