//! chanrelay relay core
//!
//! The in-process pub/sub machinery shared by every connection:
//!
//! - `ChannelRegistry`: channel name -> subscribed handles, pure bookkeeping
//! - `Broadcaster`: join / leave / publish on top of the registry
//! - `Subscriber`: one connection's bounded outbound queue
//!
//! Nothing here performs network I/O; the transport layer drives it.

pub mod broadcaster;
pub mod message;
pub mod registry;
pub mod subscriber;

pub use broadcaster::Broadcaster;
pub use message::{Message, Payload};
pub use registry::ChannelRegistry;
pub use subscriber::{Offer, Outbox, Subscriber, SubscriberHandle, SubscriberId};

#[cfg(test)]
mod tests;
