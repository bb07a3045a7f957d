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

//! Transport seam of the client.
//!
//! The client never opens sockets or encodes packets itself. A [`Connector`]
//! turns a [`ConnectTarget`] into a [`PacketTransport`], which moves whole
//! control packets in both directions. TLS, proxy tunnelling and websocket
//! upgrades are the connector's business; the client only forwards the
//! configuration structs below.

use crate::mqtt_client::packet::Packet;
use crate::mqtt_client::websocket::HandshakeRequest;
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use thiserror::Error;
use tokio::time::Duration;

/// Errors reported by a transport or a connector.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport closed")]
    Closed,
}

/// A connected, packet-oriented transport.
///
/// Implementations own the wire codec. `recv` must be cancel safe: the client
/// polls it inside `tokio::select!` and drops the future whenever another event
/// wins, so a packet must never be lost because a `recv` future was dropped.
///
/// # Examples
///
/// ```rust
/// use mqtt5_client_tokio::mqtt_client::packet::Packet;
/// use mqtt5_client_tokio::mqtt_client::transport::{PacketTransport, TransportError};
/// use futures_util::future::BoxFuture;
/// use tokio::sync::mpsc;
/// use tokio::time::Duration;
///
/// struct ChannelTransport {
///     tx: mpsc::UnboundedSender<Packet>,
///     rx: mpsc::UnboundedReceiver<Packet>,
/// }
///
/// impl PacketTransport for ChannelTransport {
///     fn send<'a>(&'a mut self, packet: Packet) -> BoxFuture<'a, Result<(), TransportError>> {
///         Box::pin(async move { self.tx.send(packet).map_err(|_| TransportError::Closed) })
///     }
///
///     fn recv<'a>(&'a mut self) -> BoxFuture<'a, Result<Packet, TransportError>> {
///         Box::pin(async move { self.rx.recv().await.ok_or(TransportError::Closed) })
///     }
///
///     fn shutdown<'a>(&'a mut self, _timeout: Duration) -> BoxFuture<'a, ()> {
///         Box::pin(async move { self.rx.close() })
///     }
/// }
/// ```
pub trait PacketTransport {
    /// Writes one packet.
    fn send<'a>(&'a mut self, packet: Packet) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Reads the next packet. Must be cancel safe.
    fn recv<'a>(&'a mut self) -> BoxFuture<'a, Result<Packet, TransportError>>;

    /// Closes the transport, giving up after `timeout`.
    fn shutdown<'a>(&'a mut self, timeout: Duration) -> BoxFuture<'a, ()>;
}

impl PacketTransport for Box<dyn PacketTransport + Send> {
    fn send<'a>(&'a mut self, packet: Packet) -> BoxFuture<'a, Result<(), TransportError>> {
        (**self).send(packet)
    }

    fn recv<'a>(&'a mut self) -> BoxFuture<'a, Result<Packet, TransportError>> {
        (**self).recv()
    }

    fn shutdown<'a>(&'a mut self, timeout: Duration) -> BoxFuture<'a, ()> {
        (**self).shutdown(timeout)
    }
}

/// Opens transports for connection attempts.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        target: ConnectTarget,
    ) -> BoxFuture<'static, Result<Box<dyn PacketTransport + Send>, TransportError>>;
}

/// Everything a [`Connector`] needs to open one transport.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsOptions>,
    pub http_proxy: Option<HttpProxyOptions>,
    /// Set when the connection is a websocket upgrade; already passed through
    /// the handshake transform, if one is configured.
    pub websocket: Option<HandshakeRequest>,
}

/// Certificate or key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PemSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    pub ca: Option<PemSource>,
    pub cert: Option<PemSource>,
    pub key: Option<PemSource>,
    pub alpn: Vec<String>,
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca: None,
            cert: None,
            key: None,
            alpn: Vec::new(),
            verify_peer: true,
        }
    }
}

/// HTTP CONNECT tunnelling proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProxyOptions {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsOptions>,
    pub basic_auth: Option<(String, String)>,
}
