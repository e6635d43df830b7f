use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use super::{MessageBus, ReplyWaiter};

const TOPIC_CAPACITY: usize = 64;

/// In-process implementation of `MessageBus`, standing in for an external
/// broker. This is the reference double the rest of the system runs
/// against in tests and single-process deployments.
pub struct LocalBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    pending_replies: Arc<Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()), pending_replies: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().expect("LocalBus topics lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        // A pending one-shot correlation on this exact topic takes the
        // message instead of the broadcast fan-out: response topics are
        // single-reader by construction.
        let waiter = self.pending_replies.lock().expect("LocalBus pending_replies lock poisoned").remove(topic);
        if let Some(tx) = waiter {
            let _ = tx.send(payload);
            return;
        }

        // No one is listening yet is not an error at QoS 0: the sender
        // gets `Ok` either way and the message is simply dropped.
        let _ = self.sender_for(topic).send(payload);
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender_for(topic).subscribe()
    }

    fn register_reply(&self, topic: &str) -> ReplyWaiter {
        let (tx, rx) = oneshot::channel();
        self.pending_replies.lock().expect("LocalBus pending_replies lock poisoned").insert(topic.to_string(), tx);

        let pending_replies = Arc::clone(&self.pending_replies);
        let topic = topic.to_string();
        ReplyWaiter::new(rx, move || {
            pending_replies.lock().expect("LocalBus pending_replies lock poisoned").remove(&topic);
        })
    }
}
