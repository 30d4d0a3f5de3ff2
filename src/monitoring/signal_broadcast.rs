use crate::error::BroadcastError;
use crate::global_variables::QUEUE_SIGNAL_UPDATES;
use crate::shared_data::SignalUpdate;
use amiquip::{Channel, Connection, Exchange, Publish, QueueDeclareOptions};
use std::thread;
use tokio::sync::{broadcast, mpsc};

/// Receives every accepted state change after it has been applied.
pub trait StateBroadcaster: Send + Sync {
    fn publish(&self, update: &SignalUpdate) -> Result<(), BroadcastError>;
}

/// Fans updates out to in-process subscribers.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<SignalUpdate>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalUpdate> {
        self.tx.subscribe()
    }
}

impl StateBroadcaster for ChannelBroadcaster {
    fn publish(&self, update: &SignalUpdate) -> Result<(), BroadcastError> {
        // No subscribers is not an error.
        if self.tx.send(update.clone()).is_err() {
            log::debug!("No subscribers for signal update {}", update.sequence);
        }
        Ok(())
    }
}

/// Publishes updates as JSON on the `signal_updates` queue.
///
/// A dedicated thread owns one long-lived AMQP connection; `publish` only
/// queues the encoded update and never touches the network.
pub struct AmqpBroadcaster {
    tx: mpsc::UnboundedSender<String>,
}

impl AmqpBroadcaster {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let (tx, rx) = mpsc::unbounded_channel();
        thread::spawn(move || run_publisher(url, rx));
        Self { tx }
    }
}

impl StateBroadcaster for AmqpBroadcaster {
    fn publish(&self, update: &SignalUpdate) -> Result<(), BroadcastError> {
        let payload = serde_json::to_string(update)?;
        self.tx
            .send(payload)
            .map_err(|_| BroadcastError::PublisherStopped)
    }
}

fn open_session(url: &str) -> amiquip::Result<(Connection, Channel)> {
    let mut connection = Connection::insecure_open(url)?;
    let channel = connection.open_channel(None)?;
    channel.queue_declare(QUEUE_SIGNAL_UPDATES, QueueDeclareOptions::default())?;
    Ok((connection, channel))
}

fn close_session((connection, channel): (Connection, Channel)) -> amiquip::Result<()> {
    channel.close()?;
    connection.close()
}

// Drains queued updates until every sender is gone. A failed connect or
// publish drops that update and reconnects on the next one.
fn run_publisher(url: String, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut session: Option<(Connection, Channel)> = None;
    while let Some(payload) = rx.blocking_recv() {
        if session.is_none() {
            match open_session(&url) {
                Ok(opened) => {
                    log::info!("Connected signal update publisher to {}", url);
                    session = Some(opened);
                }
                Err(e) => {
                    log::error!("Cannot reach broker, dropping signal update: {}", e);
                    continue;
                }
            }
        }

        let published = match &session {
            Some((_, channel)) => Exchange::direct(channel)
                .publish(Publish::new(payload.as_bytes(), QUEUE_SIGNAL_UPDATES)),
            None => continue,
        };
        if let Err(e) = published {
            log::error!("Failed to publish signal update: {}", e);
            if let Some(broken) = session.take() {
                let _ = close_session(broken);
            }
        }
    }

    if let Some(open) = session.take() {
        if let Err(e) = close_session(open) {
            log::warn!("Error closing signal update publisher: {}", e);
        }
    }
}
