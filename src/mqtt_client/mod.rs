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

// Core modules
pub mod backoff;
pub mod client;
pub mod config;
pub(crate) mod dispatcher;
pub mod error;
pub mod event;
pub mod negotiate;
pub mod operation;
pub mod packet;
pub(crate) mod request;
pub mod stats;
pub(crate) mod supervisor;
pub mod transport;
pub(crate) mod validation;
pub mod websocket;

pub use backoff::ReconnectBackoff;
pub use client::Client;
pub use config::{
    ClientConfig, ClientConfigBuilder, ExtendedValidation, JitterMode, OfflineQueueBehavior,
    SessionBehavior,
};
pub use error::{ClientError, ValidationError};
pub use event::{ConnectionState, LifecycleEvent, ListenerId, PublishOutcome, Qos2Response};
pub use negotiate::NegotiatedSettings;
pub use operation::Completion;
pub use stats::OperationStatistics;
pub use transport::{
    ConnectTarget, Connector, HttpProxyOptions, PacketTransport, PemSource, TlsOptions,
    TransportError,
};
pub use websocket::{
    HandshakeDone, HandshakeError, HandshakeRequest, HandshakeTransform, WebsocketOptions,
};
