//! Reply decision for one inbound text event.
//!
//! Order per event: persist the message (if its record fields were recovered), evaluate the
//! trigger phrases, then send at most one reply. Nothing here fails the request; every
//! downstream error is logged and reflected in the returned [`DispatchReport`].

use crate::channels::ReplySender;
use crate::config::TriggersConfig;
use crate::releases::{normalize_region, DigestSource};
use crate::store::{DialogueRecord, InsertOutcome, MessageStore};
use crate::webhook::envelope::InboundEvent;
use chrono::FixedOffset;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide talking flag shared by every conversation.
#[derive(Debug)]
pub struct TalkingState(AtomicBool);

impl TalkingState {
    pub fn new(initial: bool) -> Self {
        Self(AtomicBool::new(initial))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, talking: bool) {
        self.0.store(talking, Ordering::SeqCst);
    }
}

/// What the message text asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    StartTalking,
    StopTalking,
    Digest { region: String },
    /// Not a trigger, and talking is on.
    Placeholder,
    /// Not a trigger, and talking is off.
    Ignore,
}

/// Match `text` against the trigger phrases. Start/stop are exact matches on the raw text; the
/// digest command must be followed by end of text or whitespace.
pub fn evaluate(text: &str, triggers: &TriggersConfig, talking: bool) -> Trigger {
    if text == triggers.start_phrase {
        return Trigger::StartTalking;
    }
    if text == triggers.stop_phrase {
        return Trigger::StopTalking;
    }
    if let Some(rest) = text.strip_prefix(triggers.digest_command.as_str()) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let region = normalize_region(rest.split_whitespace().next());
            return Trigger::Digest { region };
        }
    }
    if talking {
        Trigger::Placeholder
    } else {
        Trigger::Ignore
    }
}

/// Persistence result for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Inserted(i64),
    Duplicate,
    Failed,
    /// Record fields could not be extracted; nothing was written.
    Skipped,
}

/// What happened for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub stored: StoreStatus,
    pub trigger: Trigger,
    /// Reply text chosen, if any.
    pub reply: Option<String>,
    /// True when the reply call succeeded.
    pub delivered: bool,
}

/// Per-event pipeline. One instance is shared by all request handlers.
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    replier: Arc<dyn ReplySender>,
    digests: Arc<dyn DigestSource>,
    talking: TalkingState,
    triggers: TriggersConfig,
    utc_offset: FixedOffset,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        replier: Arc<dyn ReplySender>,
        digests: Arc<dyn DigestSource>,
        initial_talking: bool,
        triggers: TriggersConfig,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            replier,
            digests,
            talking: TalkingState::new(initial_talking),
            triggers,
            utc_offset,
        }
    }

    pub fn talking(&self) -> &TalkingState {
        &self.talking
    }

    pub async fn dispatch(&self, event: InboundEvent) -> DispatchReport {
        let stored = match &event.message {
            Ok(msg) => self.persist(DialogueRecord::from_message(msg, self.utc_offset)).await,
            Err(e) => {
                log::warn!("webhook: malformed event, not stored: {}", e);
                StoreStatus::Skipped
            }
        };

        let trigger = evaluate(&event.text, &self.triggers, self.talking.get());
        let reply = match &trigger {
            Trigger::StartTalking => {
                self.talking.set(true);
                Some(self.triggers.greeting.clone())
            }
            Trigger::StopTalking => {
                self.talking.set(false);
                Some(self.triggers.farewell.clone())
            }
            Trigger::Digest { region } => Some(self.digests.digest(region).await),
            Trigger::Placeholder => Some(self.triggers.placeholder.clone()),
            Trigger::Ignore => None,
        };

        let delivered = match (&reply, event.reply_token.as_deref()) {
            (Some(text), Some(token)) => match self.replier.reply(token, text).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("webhook: reply failed: {}", e);
                    false
                }
            },
            (Some(_), None) => {
                log::debug!("webhook: event has no reply token, reply dropped");
                false
            }
            (None, _) => false,
        };

        DispatchReport {
            stored,
            trigger,
            reply,
            delivered,
        }
    }

    async fn persist(&self, record: DialogueRecord) -> StoreStatus {
        match self.store.record(record).await {
            Ok(InsertOutcome::Inserted(id)) => StoreStatus::Inserted(id),
            Ok(InsertOutcome::Duplicate) => {
                log::info!("webhook: message already recorded");
                StoreStatus::Duplicate
            }
            Err(e) => {
                log::warn!("webhook: failed to store message: {}", e);
                StoreStatus::Failed
            }
        }
    }
}
