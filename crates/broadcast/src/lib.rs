//! Broadcast Broker
//!
//! In-process fan-out hub delivering each published message to every
//! live subscriber. Producer pace is decoupled from consumer pace by a
//! bounded queue per subscriber; a subscriber that cannot drain its queue
//! is disconnected rather than allowed to stall publishing.

mod broker;

pub use broker::{Broadcaster, BrokerConfig, BrokerStatus, Subscription};
