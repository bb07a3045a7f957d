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

//! Error types surfaced by the client.
//!
//! [`ValidationError`] is always produced synchronously, before anything is
//! sent. Everything else is a [`ClientError`], delivered either through a
//! completion handle or inside a lifecycle event.

use crate::mqtt_client::packet::{ConnectReasonCode, DisconnectReasonCode, PacketType, Qos};
use crate::mqtt_client::transport::TransportError;
use thiserror::Error;

/// A packet or configuration value that the protocol, the negotiated
/// session, or the extended validation mode does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} = {value} is outside 0..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: u64,
    },
    #[error("{0} must not be zero")]
    Zero(&'static str),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("invalid topic name {0:?}")]
    InvalidTopic(String),
    #[error("invalid topic filter {0:?}")]
    InvalidTopicFilter(String),
    #[error("subscribe packet has no subscriptions")]
    EmptySubscriptions,
    #[error("unsubscribe packet has no topic filters")]
    EmptyTopicFilters,
    #[error("outbound publish must not carry subscription identifiers")]
    SubscriptionIdentifierOnPublish,
    #[error("{field} is {len} long, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("keep alive {0}s is outside the allowed range")]
    KeepAlive(u16),
    #[error("disconnect reason code {0} cannot be sent by a client")]
    DisconnectReasonCode(DisconnectReasonCode),
    #[error("session expiry cannot be set on disconnect when the connect requested zero")]
    DisconnectSessionExpiry,
    #[error("packet of {size} bytes exceeds the server maximum of {max}")]
    PacketTooLarge { size: usize, max: u32 },
    #[error("{requested:?} exceeds the server maximum qos {maximum:?}")]
    QosNotSupported { requested: Qos, maximum: Qos },
    #[error("server does not support retained messages")]
    RetainNotAvailable,
    #[error("topic alias {alias} exceeds the server maximum of {max}")]
    TopicAliasOutOfRange { alias: u16, max: u16 },
    #[error("server does not support wildcard subscriptions")]
    WildcardSubscriptionsNotAvailable,
    #[error("server does not support shared subscriptions")]
    SharedSubscriptionsNotAvailable,
    #[error("server does not support subscription identifiers")]
    SubscriptionIdentifiersNotAvailable,
}

/// Failure of a connection attempt, a live connection or an operation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("connection rejected by server: {reason_code}")]
    ConnackRejected { reason_code: ConnectReasonCode },
    #[error("no CONNACK received within the connack timeout")]
    ConnackTimeout,
    #[error("no PINGRESP received within the ping timeout")]
    PingTimeout,
    #[error("server disconnected: {reason_code}")]
    ServerDisconnect { reason_code: DisconnectReasonCode },
    #[error("no acknowledgement received within the ack timeout")]
    AckTimeout,
    #[error("operation interrupted by client stop")]
    Interrupted,
    #[error("operation failed by the offline queue policy")]
    OfflineQueuePolicy,
    #[error("protocol violation: unexpected {packet:?}: {reason}")]
    ProtocolViolation {
        packet: Option<PacketType>,
        reason: String,
    },
    #[error("stop requested by the application")]
    UserInitiatedStop,
    #[error("websocket handshake transform failed: {0}")]
    WebsocketHandshake(String),
    #[error("client task is no longer running")]
    ChannelClosed,
}

impl ClientError {
    pub(crate) fn protocol_violation(packet: Option<PacketType>, reason: impl Into<String>) -> Self {
        ClientError::ProtocolViolation {
            packet,
            reason: reason.into(),
        }
    }
}
