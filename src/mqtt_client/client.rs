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

use crate::mqtt_client::config::ClientConfig;
use crate::mqtt_client::dispatcher::Dispatcher;
use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::event::{ConnectionState, LifecycleEvent, ListenerId, PublishOutcome};
use crate::mqtt_client::operation::{Completion, OperationTracker};
use crate::mqtt_client::packet::{
    DisconnectPacket, PublishPacket, SubackPacket, SubscribePacket, UnsubackPacket,
    UnsubscribePacket,
};
use crate::mqtt_client::request::Request;
use crate::mqtt_client::stats::OperationStatistics;
use crate::mqtt_client::supervisor::Supervisor;
use crate::mqtt_client::transport::Connector;
use crate::mqtt_client::validation;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// MQTT v5.0 client handle.
///
/// Every handle cloned from the same [`Client::new`] call drives the same
/// client task. Calls never wait for the network: `start` and `stop` only queue
/// a request, and submissions return a [`Completion`] that resolves once the
/// server acknowledged the operation or it failed. Packets are validated
/// synchronously, so an invalid packet is rejected before anything is queued.
///
/// When the last handle is dropped the client stops and its outstanding
/// operations resolve with [`ClientError::Interrupted`]. Listeners that capture
/// a handle keep the client alive until they are removed.
///
/// # Examples
///
/// ```ignore
/// use mqtt5_client_tokio::mqtt_client::{packet::*, Client, ClientConfig, LifecycleEvent};
///
/// let config = ClientConfig::builder()
///     .host("broker.example.com")
///     .port(1883u16)
///     .build()?;
/// let client = Client::new(config, connector)?;
/// client.on_lifecycle_event(|event| {
///     if let LifecycleEvent::ConnectionSuccess { settings, .. } = event {
///         println!("connected as {}", settings.client_id());
///     }
/// });
/// client.start()?;
///
/// let publish = PublishPacket::builder("sensors/1", Qos::AtLeastOnce)
///     .payload("21.5")
///     .build()?;
/// let outcome = client.publish(publish)?.await?;
/// ```
#[derive(Clone)]
pub struct Client {
    request_tx: mpsc::UnboundedSender<Request>,
    dispatcher: Dispatcher,
    config: Arc<ClientConfig>,
    stats_rx: watch::Receiver<OperationStatistics>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Creates a stopped client.
    ///
    /// Must be called within a Tokio runtime. Fails if the configured
    /// CONNECT is invalid.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self, ClientError> {
        validation::validate_connect(config.connect(), config.extended_validation())?;
        let config = Arc::new(config);
        let dispatcher = Dispatcher::spawn();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (tracker, stats_rx) = OperationTracker::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Stopped);

        let supervisor = Supervisor::new(
            config.clone(),
            connector,
            dispatcher.clone(),
            tracker,
            state_tx,
            request_rx,
        );
        tokio::spawn(supervisor.run());
        trace!(host = %config.host(), port = config.port(), "client created");

        Ok(Self {
            request_tx,
            dispatcher,
            config,
            stats_rx,
            state_rx,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts connecting. Ignored unless the client is stopped.
    pub fn start(&self) -> Result<(), ClientError> {
        self.send(Request::Start)
    }

    /// Stops the client, sending `disconnect` first if a connection is up.
    ///
    /// Every operation still outstanding resolves with
    /// [`ClientError::Interrupted`] before [`LifecycleEvent::Stopped`] is
    /// emitted. Safe to call from a listener.
    pub fn stop(&self, disconnect: Option<DisconnectPacket>) -> Result<(), ClientError> {
        if let Some(disconnect) = &disconnect {
            validation::validate_disconnect(disconnect, self.config.connect())?;
        }
        self.send(Request::Stop { disconnect })
    }

    pub fn publish(
        &self,
        packet: PublishPacket,
    ) -> Result<Completion<PublishOutcome>, ClientError> {
        validation::validate_publish(&packet, self.config.extended_validation())?;
        let (response_tx, completion) = Completion::new();
        self.send(Request::Publish {
            packet,
            response_tx,
        })?;
        Ok(completion)
    }

    pub fn subscribe(
        &self,
        packet: SubscribePacket,
    ) -> Result<Completion<SubackPacket>, ClientError> {
        validation::validate_subscribe(&packet, self.config.extended_validation())?;
        let (response_tx, completion) = Completion::new();
        self.send(Request::Subscribe {
            packet,
            response_tx,
        })?;
        Ok(completion)
    }

    pub fn unsubscribe(
        &self,
        packet: UnsubscribePacket,
    ) -> Result<Completion<UnsubackPacket>, ClientError> {
        validation::validate_unsubscribe(&packet, self.config.extended_validation())?;
        let (response_tx, completion) = Completion::new();
        self.send(Request::Unsubscribe {
            packet,
            response_tx,
        })?;
        Ok(completion)
    }

    /// Registers a lifecycle listener.
    ///
    /// Listeners run one at a time on the client's dispatcher task, in
    /// registration order, and see events in the order they happened. A
    /// listener that panics is skipped for that event.
    pub fn on_lifecycle_event<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&LifecycleEvent) + Send + 'static,
    {
        self.dispatcher.add_lifecycle_listener(Box::new(listener))
    }

    /// Registers a listener for PUBLISH packets received from the server.
    pub fn on_publish_received<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&PublishPacket) + Send + 'static,
    {
        self.dispatcher.add_publish_listener(Box::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.dispatcher.remove_listener(id);
    }

    /// Snapshot of the outstanding operations.
    pub fn get_stats(&self) -> OperationStatistics {
        *self.stats_rx.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    fn send(&self, request: Request) -> Result<(), ClientError> {
        self.request_tx
            .send(request)
            .map_err(|_| ClientError::ChannelClosed)
    }
}
