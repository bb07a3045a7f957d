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

//! Session negotiation.
//!
//! Combines the CONNECT the client sent with the CONNACK the server returned
//! into the settings that govern the connection. A property present in the
//! CONNACK always wins; otherwise the value the client asked for, or the
//! protocol default, applies.

use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::packet::{ConnackPacket, ConnectPacket, PacketType, Qos};
use getset::{CopyGetters, Getters};
use tracing::{debug, warn};

/// Receive maximum when neither side specifies one.
pub const DEFAULT_RECEIVE_MAXIMUM: u16 = 65_535;
/// Largest packet the protocol can encode: 256 MiB of payload plus the fixed header.
pub const DEFAULT_MAXIMUM_PACKET_SIZE: u32 = 268_435_460;

/// Effective settings of one successful connection.
///
/// A fresh value is produced on every CONNACK; it is never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct NegotiatedSettings {
    #[getset(get_copy = "pub")]
    maximum_qos: Qos,
    #[getset(get_copy = "pub")]
    session_expiry_interval_sec: u32,
    #[getset(get_copy = "pub")]
    receive_maximum_from_server: u16,
    #[getset(get_copy = "pub")]
    maximum_packet_size_to_server: u32,
    #[getset(get_copy = "pub")]
    topic_alias_maximum_to_server: u16,
    #[getset(get_copy = "pub")]
    topic_alias_maximum_to_client: u16,
    #[getset(get_copy = "pub")]
    server_keep_alive_sec: u16,
    #[getset(get_copy = "pub")]
    retain_available: bool,
    #[getset(get_copy = "pub")]
    wildcard_subscriptions_available: bool,
    #[getset(get_copy = "pub")]
    subscription_identifiers_available: bool,
    #[getset(get_copy = "pub")]
    shared_subscriptions_available: bool,
    #[getset(get_copy = "pub")]
    rejoined_session: bool,
    #[getset(get = "pub")]
    client_id: String,
}

/// Derives the settings of a connection from its handshake.
///
/// Fails with a protocol violation when the server claims a session is present
/// although the CONNECT asked for a clean start, or when it advertises a
/// receive maximum or maximum packet size of zero.
pub fn negotiate(
    connect: &ConnectPacket,
    connack: &ConnackPacket,
) -> Result<NegotiatedSettings, ClientError> {
    if connack.session_present && connect.clean_start {
        return Err(ClientError::protocol_violation(
            Some(PacketType::Connack),
            "session present on a clean start",
        ));
    }
    if connack.receive_maximum == Some(0) {
        return Err(ClientError::protocol_violation(
            Some(PacketType::Connack),
            "receive maximum of zero",
        ));
    }
    if connack.maximum_packet_size == Some(0) {
        return Err(ClientError::protocol_violation(
            Some(PacketType::Connack),
            "maximum packet size of zero",
        ));
    }

    let requested_expiry = connect.session_expiry_interval_sec.unwrap_or(0);
    let session_expiry_interval_sec = connack
        .session_expiry_interval_sec
        .unwrap_or(requested_expiry);
    let server_keep_alive_sec = connack
        .server_keep_alive_sec
        .unwrap_or(connect.keep_alive_interval_sec);

    if session_expiry_interval_sec < requested_expiry {
        warn!(
            requested = requested_expiry,
            effective = session_expiry_interval_sec,
            "server lowered session expiry interval"
        );
    }
    if server_keep_alive_sec != connect.keep_alive_interval_sec {
        warn!(
            requested = connect.keep_alive_interval_sec,
            effective = server_keep_alive_sec,
            "server overrode keep alive"
        );
    }

    let client_id = connack
        .assigned_client_identifier
        .clone()
        .or_else(|| connect.client_id.clone())
        .unwrap_or_default();

    let settings = NegotiatedSettings {
        maximum_qos: connack.maximum_qos.unwrap_or(Qos::ExactlyOnce),
        session_expiry_interval_sec,
        receive_maximum_from_server: connack.receive_maximum.unwrap_or(DEFAULT_RECEIVE_MAXIMUM),
        maximum_packet_size_to_server: connack
            .maximum_packet_size
            .unwrap_or(DEFAULT_MAXIMUM_PACKET_SIZE),
        topic_alias_maximum_to_server: connack.topic_alias_maximum.unwrap_or(0),
        topic_alias_maximum_to_client: connect.topic_alias_maximum.unwrap_or(0),
        server_keep_alive_sec,
        retain_available: connack.retain_available.unwrap_or(true),
        wildcard_subscriptions_available: connack.wildcard_subscriptions_available.unwrap_or(true),
        subscription_identifiers_available: connack
            .subscription_identifiers_available
            .unwrap_or(true),
        shared_subscriptions_available: connack.shared_subscriptions_available.unwrap_or(true),
        rejoined_session: connack.session_present,
        client_id,
    };
    debug!(?settings, "negotiated connection settings");
    Ok(settings)
}
