//! Webhook ingestion: signature check, envelope extraction, and the reply-decision pipeline.
//!
//! `POST /webhook` → verify `X-Line-Signature` → take the first text event → store it →
//! evaluate trigger phrases → reply at most once. Once the signature passes the platform
//! always gets 200.

mod dispatcher;
mod envelope;
mod server;
mod signature;

pub use dispatcher::{evaluate, DispatchReport, Dispatcher, StoreStatus, TalkingState, Trigger};
pub use envelope::{first_text_event, EnvelopeError, InboundEvent, WebhookEnvelope, WebhookEvent};
pub use server::{build_state, router, run_server, WebhookState};
pub use signature::{sign, verify, SignatureError, SIGNATURE_HEADER};
