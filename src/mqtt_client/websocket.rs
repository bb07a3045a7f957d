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

//! Websocket upgrade configuration and the handshake transform hook.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// The HTTP upgrade request a connector will send for a websocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub host: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandshakeError(pub String);

/// Completion signal handed to a handshake transform.
///
/// The connection attempt stays suspended until [`complete`](Self::complete)
/// is called. Dropping the signal without completing it fails the attempt.
#[derive(Debug)]
pub struct HandshakeDone {
    tx: oneshot::Sender<Result<HandshakeRequest, HandshakeError>>,
}

impl HandshakeDone {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<HandshakeRequest, HandshakeError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self, result: Result<HandshakeRequest, HandshakeError>) {
        let _ = self.tx.send(result);
    }
}

/// Hook that may rewrite the upgrade request, for example to sign it.
///
/// It runs on the client's event dispatcher, so it must not block; anything
/// slow should be spawned and finish through [`HandshakeDone`].
#[derive(Clone)]
pub struct HandshakeTransform(Arc<dyn Fn(HandshakeRequest, HandshakeDone) + Send + Sync>);

impl HandshakeTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(HandshakeRequest, HandshakeDone) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, request: HandshakeRequest, done: HandshakeDone) {
        (self.0)(request, done)
    }
}

impl fmt::Debug for HandshakeTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandshakeTransform")
    }
}

#[derive(Debug, Clone)]
pub struct WebsocketOptions {
    pub path: String,
    pub handshake_transform: Option<HandshakeTransform>,
}

impl Default for WebsocketOptions {
    fn default() -> Self {
        Self {
            path: "/mqtt".to_string(),
            handshake_transform: None,
        }
    }
}
