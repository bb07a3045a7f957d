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

use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::negotiate::NegotiatedSettings;
use crate::mqtt_client::packet::{
    ConnackPacket, DisconnectPacket, PubackPacket, PubcompPacket, PubrecPacket,
};

/// State of the connection supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Stopped,
    /// Opening a transport, waiting for CONNACK, or waiting out a reconnect delay.
    Connecting,
    Connected,
    /// Tearing a connection down.
    Disconnecting,
}

/// Connection lifecycle notification.
///
/// Every attempt announced by `AttemptingConnect` ends with exactly one
/// `ConnectionSuccess` or `ConnectionFailure`; a successful connection ends
/// with exactly one `Disconnection`. `Stopped` is emitted once per stop, after
/// every outstanding operation has been resolved.
#[derive(Debug)]
pub enum LifecycleEvent {
    AttemptingConnect,
    ConnectionSuccess {
        connack: ConnackPacket,
        settings: NegotiatedSettings,
    },
    ConnectionFailure {
        error: ClientError,
        connack: Option<ConnackPacket>,
    },
    Disconnection {
        error: ClientError,
        /// The DISCONNECT exchanged on the way out, if any: the server's when
        /// it closed the connection, the client's when it was stopped.
        disconnect: Option<DisconnectPacket>,
    },
    Stopped,
}

/// Result of a successfully acknowledged publish.
///
/// A negative reason code in the acknowledgement is still an `Ok` outcome;
/// inspect the carried packet to tell success from rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Qos0,
    Qos1(PubackPacket),
    Qos2(Qos2Response),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Qos2Response {
    /// The server rejected the publish in its PUBREC.
    Pubrec(PubrecPacket),
    Pubcomp(PubcompPacket),
}

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
