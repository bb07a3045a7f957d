// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! # MQTT5 Client Tokio
//!
//! An asynchronous MQTT v5.0 client protocol engine for Rust with tokio.
//!
//! The engine owns everything between the application and a packet transport:
//! connection supervision with reconnect backoff, session negotiation, an
//! operation queue with packet identifier management and acknowledgement
//! tracking, ordered event dispatch, and operation statistics. Encoding and
//! socket I/O are left to a [`mqtt_client::PacketTransport`] produced by a
//! [`mqtt_client::Connector`], so the same client runs over TCP, TLS,
//! WebSocket or an in-memory channel.
//!
//! ## Features
//!
//! - **Connection Supervision**: automatic reconnect with None, Full or Decorrelated jitter
//! - **Session Handling**: clean or rejoined sessions, with unacknowledged publishes resent as duplicates
//! - **Flow Control**: honours the server's receive maximum, maximum QoS and maximum packet size
//! - **Offline Queueing**: configurable policy for operations submitted while disconnected
//! - **Ordered Events**: lifecycle and publish listeners run in order, isolated from each other
//! - **Statistics**: incomplete and unacknowledged operation counts and sizes
//!
//! ## Quick Start
//!
//! ```ignore
//! use mqtt5_client_tokio::mqtt_client::{self, packet::*};
//!
//! let config = mqtt_client::ClientConfig::builder()
//!     .host("localhost")
//!     .port(1883u16)
//!     .build()?;
//! let client = mqtt_client::Client::new(config, connector)?;
//! client.start()?;
//!
//! let subscribe = SubscribePacket::builder()
//!     .subscription(Subscription::new("sensors/#", Qos::AtLeastOnce))
//!     .build()?;
//! let suback = client.subscribe(subscribe)?.await?;
//! println!("Received: {suback:?}");
//! ```
//!
//! ## Main Components
//!
//! - [`mqtt_client::client`]: the client handle and its public operations
//! - [`mqtt_client::config`]: client configuration
//! - [`mqtt_client::packet`]: MQTT v5.0 packet types and builders
//! - [`mqtt_client::negotiate`]: effective settings derived from CONNECT and CONNACK
//! - [`mqtt_client::event`]: lifecycle events and publish outcomes
//! - [`mqtt_client::transport`]: the transport and connector seams
//! - [`mqtt_client::error`]: error types

pub mod mqtt_client;
