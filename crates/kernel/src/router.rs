// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Type-keyed message routing: the single coupling point between
//! transports and handlers.
//!
//! Handlers never see duplicate content (when dedup is on), never observe
//! each other's failures, and always run in registration order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::message::{AgentMessage, MessagePayload};

/// Default bound on the dedup FIFO.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Boxed future returned by a registered handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<AgentMessage>>> + Send>>;

/// A registered handler: async fn of message to optional response.
pub type Handler = Arc<dyn Fn(AgentMessage) -> HandlerFuture + Send + Sync>;

/// Bounded FIFO of recently dispatched content hashes.
#[derive(Debug, Default)]
struct DedupFifo {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupFifo {
    fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    fn record(&mut self, hash: String, capacity: usize) {
        if self.seen.contains(&hash) {
            return;
        }
        if self.order.len() == capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(hash.clone());
        self.seen.insert(hash);
    }
}

/// Request/response and publish/subscribe dispatch over typed messages.
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    topics: RwLock<HashMap<String, Vec<Handler>>>,
    dedup: Option<Mutex<DedupFifo>>,
    dedup_capacity: usize,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(true, DEFAULT_DEDUP_CAPACITY)
    }
}

impl MessageRouter {
    pub fn new(deduplicate: bool, dedup_capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            dedup: deduplicate.then(|| Mutex::new(DedupFifo::default())),
            dedup_capacity: dedup_capacity.max(1),
        }
    }

    /// Register a handler for a message type tag. Multiple handlers per
    /// type are allowed and run in registration order.
    pub async fn register<F, Fut>(&self, type_tag: &str, handler: F)
    where
        F: Fn(AgentMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<AgentMessage>>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |message| Box::pin(handler(message)));
        self.handlers.write().await.entry(type_tag.to_owned()).or_default().push(handler);
    }

    /// Subscribe a handler to a broadcast topic.
    pub async fn on_topic<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(AgentMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<AgentMessage>>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |message| Box::pin(handler(message)));
        self.topics.write().await.entry(topic.to_owned()).or_default().push(handler);
    }

    pub async fn has_handler(&self, type_tag: &str) -> bool {
        self.handlers.read().await.get(type_tag).is_some_and(|h| !h.is_empty())
    }

    pub async fn handler_count(&self, type_tag: &str) -> usize {
        self.handlers.read().await.get(type_tag).map_or(0, Vec::len)
    }

    async fn already_dispatched(&self, hash: &str) -> bool {
        match &self.dedup {
            Some(fifo) => fifo.lock().await.contains(hash),
            None => false,
        }
    }

    async fn record_dispatch(&self, hash: String) {
        if let Some(fifo) = &self.dedup {
            fifo.lock().await.record(hash, self.dedup_capacity);
        }
    }

    fn error_response(message: &AgentMessage, error: &OrchestratorError) -> AgentMessage {
        AgentMessage::new(
            "router",
            MessagePayload::Error {
                error_code: "HANDLER_ERROR".to_owned(),
                error_message: error.to_string(),
                original_message_id: Some(message.message_id.clone()),
                recoverable: true,
            },
        )
        .with_correlation_id(&message.message_id)
    }

    /// Dispatch a message to the first handler registered for its type.
    ///
    /// Returns `Ok(None)` when dedup suppresses the message. A handler
    /// failure is converted into an `Error` response rather than
    /// propagated.
    pub async fn send(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let hash = message.content_hash();
        if self.already_dispatched(&hash).await {
            debug!(type_tag = message.type_tag(), "duplicate message suppressed");
            return Ok(None);
        }

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(message.type_tag()).and_then(|h| h.first()).cloned()
        };
        let Some(handler) = handler else {
            return Err(OrchestratorError::not_found("handler", message.type_tag()));
        };

        let message_id = message.message_id.clone();
        let response = match handler(message.clone()).await {
            Ok(Some(mut response)) => {
                response.correlation_id = Some(message_id);
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(type_tag = message.type_tag(), error = %e, "handler failed");
                Some(Self::error_response(&message, &e))
            }
        };

        self.record_dispatch(hash).await;
        Ok(response)
    }

    /// Dispatch a message to every handler for its type, aggregating the
    /// non-empty responses in registration order. Dedup applies to the
    /// whole dispatch, not per handler.
    pub async fn send_multi(&self, message: AgentMessage) -> Result<Vec<AgentMessage>> {
        let hash = message.content_hash();
        if self.already_dispatched(&hash).await {
            debug!(type_tag = message.type_tag(), "duplicate message suppressed");
            return Ok(vec![]);
        }

        let handlers = {
            let handlers = self.handlers.read().await;
            handlers.get(message.type_tag()).cloned().unwrap_or_default()
        };
        if handlers.is_empty() {
            return Err(OrchestratorError::not_found("handler", message.type_tag()));
        }

        let mut responses = Vec::new();
        for handler in handlers {
            match handler(message.clone()).await {
                Ok(Some(mut response)) => {
                    response.correlation_id = Some(message.message_id.clone());
                    responses.push(response);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(type_tag = message.type_tag(), error = %e, "handler failed");
                    responses.push(Self::error_response(&message, &e));
                }
            }
        }

        self.record_dispatch(hash).await;
        Ok(responses)
    }

    /// Publish a payload to a topic, fabricating the notification
    /// envelope. Returns the number of subscribers invoked; subscriber
    /// failures are logged and swallowed.
    pub async fn publish(&self, topic: &str, payload: Value, sender: &str) -> usize {
        let notification = AgentMessage::new(
            sender,
            MessagePayload::BroadcastNotification {
                topic: topic.to_owned(),
                payload,
                target_teams: vec![],
                exclude_sender: true,
            },
        );
        self.broadcast(notification).await
    }

    /// Deliver a pre-built notification to its topic's subscribers.
    pub async fn broadcast(&self, notification: AgentMessage) -> usize {
        let MessagePayload::BroadcastNotification { ref topic, .. } = notification.payload else {
            warn!(type_tag = notification.type_tag(), "broadcast requires a notification payload");
            return 0;
        };

        let handlers = {
            let topics = self.topics.read().await;
            topics.get(topic).cloned().unwrap_or_default()
        };

        let count = handlers.len();
        for handler in handlers {
            if let Err(e) = handler(notification.clone()).await {
                warn!(topic, error = %e, "topic handler failed");
            }
        }
        count
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
