//! Per-document event fan-out for live progress streaming.

pub mod event;
pub mod hub;
pub mod sink;

pub use event::{ErrorDetails, ProcessingEvent};
pub use hub::BroadcastHub;
pub use sink::{ChannelSink, EventSink, SinkError, SinkId};
