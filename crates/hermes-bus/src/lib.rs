//! # hermes-bus
//!
//! In-process publish/subscribe keyed by channel name.
//!
//! [`Bus`] is shared by the whole process; producers call
//! [`Bus::publish`]. Each session takes a [`BusClient`] from
//! [`Bus::client`] and subscribes through the
//! [`PubSub`](hermes_core::PubSub) trait.

#![deny(unsafe_code)]

pub mod bus;
pub mod client;

pub use bus::Bus;
pub use client::BusClient;
