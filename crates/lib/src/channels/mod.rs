//! Messaging channel (LINE).
//!
//! Inbound text events become [`InboundMessage`] records; replies go out through the
//! [`ReplySender`] trait, implemented for the LINE reply API by [`LineChannel`].

mod inbound;
mod line;
mod reply;

pub use inbound::InboundMessage;
pub use line::LineChannel;
pub use reply::{ReplyError, ReplySender};
