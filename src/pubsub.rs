use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info_span, trace, Instrument};

use crate::message::Message;

/// How many messages a subscriber may fall behind before it starts missing some.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Create a publisher and a way to subscribe to what it publishes.
///
/// Spawns the task delivering to subscribers, so a runtime is needed.
/// The task stops once the [`Publisher`] is dropped, which ends every subscription.
pub fn pubsub(capacity: usize) -> (Publisher, Subscribers) {
    let (intake_tx, intake_rx) = mpsc::unbounded_channel();
    let subscribers = Subscribers::new(capacity);

    tokio::spawn(deliver_all(intake_rx, subscribers.clone()).instrument(info_span!("PubSub")));

    (Publisher { intake: intake_tx }, subscribers)
}

/// The single entry point for messages.
#[derive(Debug)]
pub struct Publisher {
    intake: mpsc::UnboundedSender<Message>,
}

impl Publisher {
    /// Hand a message over for delivery. Never waits on subscribers.
    pub fn publish(&self, message: Message) {
        if self.intake.send(message).is_err() {
            debug!("Delivery task gone, message dropped");
        }
    }
}

#[derive(Debug, Default)]
struct SubscriberList {
    senders: Vec<mpsc::Sender<Message>>,

    // Set once the publisher is gone.
    closed: bool,
}

/// The current set of subscribers.
#[derive(Debug, Clone)]
pub struct Subscribers {
    list: Arc<Mutex<SubscriberList>>,
    capacity: usize,
}

impl Subscribers {
    fn new(capacity: usize) -> Self {
        Self {
            list: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Start receiving every message published from now on.
    ///
    /// If the publisher is already gone the subscription ends right away.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);

        let mut list = self.list.lock();
        if !list.closed {
            list.senders.push(sender);
            trace!("Now {} subscriber(s)", list.senders.len());
        }

        Subscription { receiver }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.list.lock().senders.len()
    }

    /// True if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<mpsc::Sender<Message>> {
        self.list.lock().senders.clone()
    }

    /// Offer the message to every subscriber without waiting on any of them.
    /// A full subscriber misses this message, a gone subscriber is removed.
    fn deliver(&self, message: &Message) {
        let mut gone = 0;

        for sender in self.snapshot() {
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("Subscriber is full, dropping message"),
                Err(TrySendError::Closed(_)) => gone += 1,
            }
        }

        if gone > 0 {
            debug!("Removing {gone} subscriber(s) no longer listening");
            self.list.lock().senders.retain(|sender| !sender.is_closed());
        }
    }

    fn close(&self) {
        let mut list = self.list.lock();
        list.closed = true;
        list.senders.clear();
    }
}

async fn deliver_all(mut intake: mpsc::UnboundedReceiver<Message>, subscribers: Subscribers) {
    while let Some(message) = intake.recv().await {
        subscribers.deliver(&message);
    }

    debug!("Publisher dropped, closing subscriptions");
    subscribers.close();
}

/// A best-effort view of published messages.
///
/// Messages are missed if this is not polled often enough.
/// Since every message is complete in itself, the next one makes up for it.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Wait for the next message.
    /// `None` means nothing more will be published.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Get the next message if there is one.
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Turn into a [`futures::Stream`].
    pub fn into_stream(self) -> ReceiverStream<Message> {
        ReceiverStream::new(self.receiver)
    }
}
