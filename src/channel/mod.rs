// src/channel/mod.rs
pub mod connection;
pub mod frame;

pub use connection::{Connection, ConnectionState, RealtimeChannel, Subscription, SubscriptionToken};
pub use frame::{EventFrame, SET_USER_ID, SUBMISSION_PAYLOAD_RESPONSE};
