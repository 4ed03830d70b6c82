//! Live-event fan-out for the bridge.
//!
//! Message mutations that a CRM screen cannot render natively (reactions,
//! edits, deletes, reply context, instance switches) are published here so
//! connected UIs can draw overlays. Delivery is best-effort: events published
//! with no subscriber are dropped, and a slow subscriber skips what it missed.
//!
//! # Example
//!
//! ```no_run
//! use broadcaster::{Broadcaster, LiveEvent};
//!
//! # async fn example() -> Result<(), broadcaster::Error> {
//! let broadcaster = Broadcaster::new();
//! let mut events = broadcaster.subscribe_location("L1");
//!
//! broadcaster.publish(LiveEvent::Delete {
//!     location_id: "L1".to_string(),
//!     ghl_message_id: Some("ghl-1".to_string()),
//!     gateway_message_id: "ABC".to_string(),
//!     original_text: "hello".to_string(),
//!     from_me: false,
//! });
//!
//! if let Some(event) = events.recv().await {
//!     println!("{}", event.to_json()?);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors that can occur during broadcast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Event could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An event for UIs watching a CRM location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Reaction {
        location_id: String,
        ghl_message_id: Option<String>,
        gateway_message_id: String,
        emoji: String,
        from_me: bool,
        /// Reaction list after the change.
        reactions: Vec<String>,
    },
    Edit {
        location_id: String,
        ghl_message_id: Option<String>,
        gateway_message_id: String,
        original_text: String,
        new_text: String,
        from_me: bool,
    },
    Delete {
        location_id: String,
        ghl_message_id: Option<String>,
        gateway_message_id: String,
        original_text: String,
        from_me: bool,
    },
    /// A lead quoted an earlier message.
    Reply {
        location_id: String,
        original_ghl_message_id: String,
        reply_ghl_message_id: Option<String>,
        quoted_text: String,
    },
    InstanceSwitch {
        location_id: String,
        contact_id: Option<String>,
        instance_id: String,
        previous_instance_name: Option<String>,
        new_instance_name: Option<String>,
    },
}

impl LiveEvent {
    /// Location the event belongs to.
    pub fn location_id(&self) -> &str {
        match self {
            LiveEvent::Reaction { location_id, .. }
            | LiveEvent::Edit { location_id, .. }
            | LiveEvent::Delete { location_id, .. }
            | LiveEvent::Reply { location_id, .. }
            | LiveEvent::InstanceSwitch { location_id, .. } => location_id,
        }
    }

    /// Wire name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Reaction { .. } => "reaction",
            LiveEvent::Edit { .. } => "edit",
            LiveEvent::Delete { .. } => "delete",
            LiveEvent::Reply { .. } => "reply",
            LiveEvent::InstanceSwitch { .. } => "instance_switch",
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Buffered events per subscriber before it starts skipping.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out hub for [`LiveEvent`]s.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<LiveEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let kind = event.kind();
        let location_id = event.location_id().to_string();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(kind, %location_id, receivers, "Live event published");
                receivers
            }
            Err(_) => {
                debug!(kind, %location_id, "Live event dropped, no subscribers");
                0
            }
        }
    }

    /// Raw receiver for every location.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    /// Subscription limited to one location.
    pub fn subscribe_location(&self, location_id: impl Into<String>) -> LocationSubscription {
        LocationSubscription {
            location_id: location_id.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver that yields only one location's events.
#[derive(Debug)]
pub struct LocationSubscription {
    location_id: String,
    receiver: broadcast::Receiver<LiveEvent>,
}

impl LocationSubscription {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    /// Next event for this location, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.location_id() == self.location_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(location_id = %self.location_id, skipped, "Live subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
