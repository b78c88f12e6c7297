/*!
 # Message bus

 Remote control arrives as (topic, payload) messages. The client itself is an
 external collaborator behind [`MessageBus`]; this module waits for the network,
 subscribes to the control topics and feeds every event through the
 [`CommandAdapter`] to the orchestrator.

 Waiting for the network happens here and only here, so rendering never depends
 on connectivity.
*/

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::command::CommandAdapter;
use crate::orchestrator::OrchestratorHandle;
use crate::{Error, Result};

/// Inbound bus events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connected,
    /// Subscriptions are (re)established
    Subscribed,
    Message { topic: String, payload: Vec<u8> },
    Disconnected,
}

impl BusEvent {
    pub fn message(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        BusEvent::Message {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A message-bus client
pub trait MessageBus: Send + 'static {
    /// Connect, subscribe to `topics` and return the inbound event stream
    fn connect(
        &mut self,
        topics: Vec<String>,
    ) -> impl Future<Output = Result<BoxStream<'static, BusEvent>>> + Send;
}

/// Bus fed from an in-process channel; used by the CLI's stdin reader and in tests
#[derive(Debug)]
pub struct ChannelBus {
    events: Option<mpsc::UnboundedReceiver<BusEvent>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl ChannelBus {
    /// The bus and the sender that injects events into it
    pub fn new() -> (Self, mpsc::UnboundedSender<BusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            events: Some(rx),
            subscriptions: Arc::default(),
        };
        (bus, tx)
    }

    /// Shared view of the subscribed topics
    pub fn subscriptions(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.subscriptions)
    }
}

impl MessageBus for ChannelBus {
    async fn connect(&mut self, topics: Vec<String>) -> Result<BoxStream<'static, BusEvent>> {
        let events = self
            .events
            .take()
            .ok_or_else(|| Error::Bus("already connected".to_string()))?;
        self.subscriptions.lock().extend(topics);

        let inbound = stream::unfold(events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        });
        Ok(stream::iter([BusEvent::Connected, BusEvent::Subscribed])
            .chain(inbound)
            .boxed())
    }
}

/// Resolve once `ready` reports `true`
pub async fn wait_for_network(ready: &mut watch::Receiver<bool>) -> Result<()> {
    ready
        .wait_for(|ready| *ready)
        .await
        .map(|_| ())
        .map_err(|_| Error::Bus("network readiness signal went away".to_string()))
}

/// Wait for the network, connect, then forward bus events as commands until
/// the stream ends
#[instrument(skip_all)]
pub async fn run_bus<B: MessageBus>(
    mut bus: B,
    adapter: CommandAdapter,
    handle: OrchestratorHandle,
    mut network_ready: watch::Receiver<bool>,
) -> Result<()> {
    info!("Waiting for network before starting the message bus client...");
    wait_for_network(&mut network_ready).await?;

    let topics: Vec<String> = adapter.topics().all().map(str::to_string).into();
    info!("Connecting to message bus, topics {:?}", topics);
    let mut events = bus.connect(topics).await?;

    while let Some(event) = events.next().await {
        match &event {
            BusEvent::Connected => info!("Message bus connected"),
            BusEvent::Disconnected => warn!("Message bus disconnected"),
            BusEvent::Subscribed => debug!("Subscriptions established"),
            BusEvent::Message { topic, payload } => {
                debug!("TOPIC={} DATA={}", topic, String::from_utf8_lossy(payload))
            }
        }
        if let Some(command) = adapter.from_bus_event(&event) {
            handle.send(command)?;
        }
    }

    info!("Message bus stream ended");
    Ok(())
}
