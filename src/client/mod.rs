//! Client side of the relay
//!
//! [`AlertSubscriber`] keeps a dashboard session attached to the push
//! channel and hands events to the caller; [`AlertList`] merges them into the
//! locally displayed list.

pub mod alert_list;
pub mod subscriber;
pub mod transport;

pub use alert_list::AlertList;
pub use subscriber::{
    AlertHandler, AlertHandlers, AlertSubscriber, SubscriberConfig, SubscriberState,
};
pub use transport::{open_stream, EventStream, PollingEvents, WebSocketEvents};
