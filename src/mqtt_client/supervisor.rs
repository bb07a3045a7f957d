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

//! The client task.
//!
//! A single task per client owns the connection state machine, the operation
//! tracker and the negotiated settings. API calls arrive as [`Request`]s, timers
//! and connection attempts report back through an internal channel, and the
//! transport is polled in the same `select!`, so every state change happens on
//! this task, one at a time.

use crate::mqtt_client::backoff::ReconnectBackoff;
use crate::mqtt_client::config::{ClientConfig, SessionBehavior};
use crate::mqtt_client::dispatcher::Dispatcher;
use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::event::{ConnectionState, LifecycleEvent};
use crate::mqtt_client::negotiate::{negotiate, NegotiatedSettings};
use crate::mqtt_client::operation::{retained_offline, OperationTracker, Responder};
use crate::mqtt_client::packet::{
    ConnackPacket, ConnectPacket, DisconnectPacket, DisconnectReasonCode, Packet, PacketType,
    PubackPacket, PubcompPacket, PublishPacket, PubrecPacket, PubrelPacket, PubrelReasonCode, Qos,
};
use crate::mqtt_client::request::Request;
use crate::mqtt_client::transport::{ConnectTarget, Connector, PacketTransport, TransportError};
use crate::mqtt_client::websocket::{HandshakeDone, HandshakeRequest, WebsocketOptions};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, trace, warn};

type BoxedTransport = Box<dyn PacketTransport + Send>;

enum Internal {
    TransportReady {
        epoch: u64,
        result: Result<BoxedTransport, ClientError>,
    },
    Timer(TimerKind),
}

/// Timers carry the epoch they were armed in; one that fires after its
/// connection is gone is ignored.
#[derive(Debug, Clone, Copy)]
enum TimerKind {
    ConnackTimeout { epoch: u64 },
    Reconnect { epoch: u64 },
    PingreqSend { epoch: u64 },
    PingrespTimeout { epoch: u64 },
    AckTimeout { epoch: u64, op_id: u64 },
}

#[derive(Default)]
struct Timers {
    connack: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    pingreq: Option<JoinHandle<()>>,
    pingresp: Option<JoinHandle<()>>,
}

impl Timers {
    fn cancel_all(&mut self) {
        for handle in [
            self.connack.take(),
            self.reconnect.take(),
            self.pingreq.take(),
            self.pingresp.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

enum Step {
    Request(Request),
    Internal(Internal),
    Packet(Result<Packet, TransportError>),
}

pub(crate) struct Supervisor {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    tracker: OperationTracker,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    request_rx: mpsc::UnboundedReceiver<Request>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    transport: Option<BoxedTransport>,
    // bumped whenever an attempt starts or a connection is torn down
    epoch: u64,
    attempt_task: Option<JoinHandle<()>>,
    timers: Timers,
    backoff: ReconnectBackoff,
    pending_connect: Option<ConnectPacket>,
    settings: Option<NegotiatedSettings>,
    connected_at: Option<Instant>,
    last_outbound: Instant,
    has_connected_successfully: bool,
    assigned_client_id: Option<String>,
    inbound_aliases: HashMap<u16, String>,
    inbound_qos2: HashSet<u16>,
}

impl Supervisor {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        tracker: OperationTracker,
        state_tx: watch::Sender<ConnectionState>,
        request_rx: mpsc::UnboundedReceiver<Request>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(
            config.retry_jitter_mode(),
            Duration::from_millis(config.min_reconnect_delay_ms()),
            Duration::from_millis(config.max_reconnect_delay_ms()),
        );
        Self {
            config,
            connector,
            dispatcher,
            tracker,
            state: ConnectionState::Stopped,
            state_tx,
            request_rx,
            internal_tx,
            internal_rx,
            transport: None,
            epoch: 0,
            attempt_task: None,
            timers: Timers::default(),
            backoff,
            pending_connect: None,
            settings: None,
            connected_at: None,
            last_outbound: Instant::now(),
            has_connected_successfully: false,
            assigned_client_id: None,
            inbound_aliases: HashMap::new(),
            inbound_qos2: HashSet::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let step = tokio::select! {
                request = self.request_rx.recv() => match request {
                    Some(request) => Step::Request(request),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => Step::Internal(internal),
                result = recv_packet(&mut self.transport) => Step::Packet(result),
            };
            match step {
                Step::Request(request) => self.on_request(request).await,
                Step::Internal(Internal::TransportReady { epoch, result }) => {
                    self.on_transport_ready(epoch, result).await
                }
                Step::Internal(Internal::Timer(kind)) => self.on_timer(kind).await,
                Step::Packet(result) => self.on_packet(result).await,
            }
        }

        // every client handle is gone
        debug!("client dropped, shutting down");
        if self.state != ConnectionState::Stopped {
            self.stop(None).await;
        } else {
            self.tracker.fail_all(|| ClientError::Interrupted);
        }
    }

    async fn on_request(&mut self, request: Request) {
        match request {
            Request::Start => {
                if self.state != ConnectionState::Stopped {
                    debug!(state = ?self.state, "start ignored, client already running");
                    return;
                }
                self.begin_attempt();
            }
            Request::Stop { disconnect } => self.stop(disconnect).await,
            Request::Publish {
                packet,
                response_tx,
            } => {
                self.submit(Packet::Publish(packet), Responder::Publish(response_tx))
                    .await
            }
            Request::Subscribe {
                packet,
                response_tx,
            } => {
                self.submit(Packet::Subscribe(packet), Responder::Subscribe(response_tx))
                    .await
            }
            Request::Unsubscribe {
                packet,
                response_tx,
            } => {
                self.submit(
                    Packet::Unsubscribe(packet),
                    Responder::Unsubscribe(response_tx),
                )
                .await
            }
        }
    }

    async fn submit(&mut self, packet: Packet, responder: Responder) {
        if self.state != ConnectionState::Connected
            && !retained_offline(&packet, self.config.offline_queue_behavior())
        {
            debug!(packet_type = ?packet.packet_type(), "rejecting operation while offline");
            responder.fail(ClientError::OfflineQueuePolicy);
            return;
        }
        self.tracker.submit(packet, responder);
        if self.state == ConnectionState::Connected {
            if let Err(e) = self.service_queue().await {
                self.close_connection(e, None).await;
            }
        }
    }

    /// Writes queued operations until the queue is empty or blocked.
    async fn service_queue(&mut self) -> Result<(), ClientError> {
        while self.state == ConnectionState::Connected && self.tracker.has_queued() {
            let Some(settings) = self.settings.as_ref() else {
                break;
            };
            let Some((op_id, packet)) = self.tracker.next_to_send(settings) else {
                break;
            };
            let is_qos0 = matches!(&packet, Packet::Publish(p) if p.qos == Qos::AtMostOnce);
            self.write(packet).await?;
            if is_qos0 {
                self.tracker.complete_qos0(op_id);
            } else if self.config.ack_timeout_sec() > 0 {
                let handle = self.spawn_timer(
                    Duration::from_secs(self.config.ack_timeout_sec()),
                    TimerKind::AckTimeout {
                        epoch: self.epoch,
                        op_id,
                    },
                );
                self.tracker.set_ack_timer(op_id, handle);
            }
        }
        Ok(())
    }

    async fn write(&mut self, packet: Packet) -> Result<(), TransportError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::Closed);
        };
        trace!(packet_type = ?packet.packet_type(), "sending packet");
        transport.send(packet).await?;
        self.last_outbound = Instant::now();
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "connection state changed");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn spawn_timer(&self, delay: Duration, kind: TimerKind) -> JoinHandle<()> {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(Internal::Timer(kind));
        })
    }

    fn begin_attempt(&mut self) {
        self.epoch += 1;
        self.set_state(ConnectionState::Connecting);
        self.dispatcher.lifecycle(LifecycleEvent::AttemptingConnect);

        let target = ConnectTarget {
            host: self.config.host().clone(),
            port: self.config.port(),
            tls: self.config.tls().clone(),
            http_proxy: self.config.http_proxy().clone(),
            websocket: None,
        };
        let websocket = self.config.websocket().clone();
        let connector = self.connector.clone();
        let dispatcher = self.dispatcher.clone();
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        let timeout = Duration::from_millis(self.config.connect_timeout_ms());
        debug!(epoch, host = %target.host, port = target.port, "connection attempt started");
        self.attempt_task = Some(tokio::spawn(async move {
            let result = open_transport(connector, dispatcher, target, websocket, timeout).await;
            let _ = tx.send(Internal::TransportReady { epoch, result });
        }));
    }

    fn build_connect(&self) -> ConnectPacket {
        let mut connect = self.config.connect().clone();
        connect.clean_start = match self.config.session_behavior() {
            SessionBehavior::Clean => true,
            SessionBehavior::RejoinPostSuccess => !self.has_connected_successfully,
            SessionBehavior::RejoinAlways => false,
        };
        if connect.client_id.as_deref().map_or(true, str::is_empty) {
            if let Some(id) = &self.assigned_client_id {
                connect.client_id = Some(id.clone());
            }
        }
        connect
    }

    async fn on_transport_ready(&mut self, epoch: u64, result: Result<BoxedTransport, ClientError>) {
        if epoch != self.epoch || self.state != ConnectionState::Connecting || self.transport.is_some()
        {
            trace!(epoch, "discarding stale connection attempt");
            if let Ok(mut transport) = result {
                transport.shutdown(self.shutdown_timeout()).await;
            }
            return;
        }
        self.attempt_task = None;
        let transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                self.connection_failed(e, None).await;
                return;
            }
        };
        self.transport = Some(transport);

        let connect = self.build_connect();
        debug!(clean_start = connect.clean_start, client_id = ?connect.client_id, "sending CONNECT");
        self.pending_connect = Some(connect.clone());
        if let Err(e) = self.write(Packet::Connect(connect)).await {
            self.connection_failed(e.into(), None).await;
            return;
        }
        self.timers.connack = Some(self.spawn_timer(
            Duration::from_millis(self.config.connack_timeout_ms()),
            TimerKind::ConnackTimeout { epoch: self.epoch },
        ));
    }

    async fn on_packet(&mut self, result: Result<Packet, TransportError>) {
        let packet = match result {
            Ok(packet) => packet,
            Err(e) => {
                self.close_connection(e.into(), None).await;
                return;
            }
        };
        trace!(packet_type = ?packet.packet_type(), "received packet");
        let outcome = match self.state {
            ConnectionState::Connecting => self.on_packet_connecting(packet).await,
            ConnectionState::Connected => self.on_packet_connected(packet).await,
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            if matches!(e, ClientError::ProtocolViolation { .. }) {
                error!(error = %e, "closing connection");
                if self.state == ConnectionState::Connected {
                    let disconnect = DisconnectPacket {
                        reason_code: DisconnectReasonCode::ProtocolError,
                        ..DisconnectPacket::default()
                    };
                    let _ = self.write(Packet::Disconnect(disconnect)).await;
                }
            }
            self.close_connection(e, None).await;
        }
    }

    async fn on_packet_connecting(&mut self, packet: Packet) -> Result<(), ClientError> {
        match packet {
            Packet::Connack(connack) => self.on_connack(connack).await,
            Packet::Disconnect(disconnect) => Err(ClientError::ServerDisconnect {
                reason_code: disconnect.reason_code,
            }),
            other => Err(ClientError::protocol_violation(
                Some(other.packet_type()),
                "expected CONNACK",
            )),
        }
    }

    async fn on_connack(&mut self, connack: ConnackPacket) -> Result<(), ClientError> {
        if let Some(timer) = self.timers.connack.take() {
            timer.abort();
        }
        let Some(connect) = self.pending_connect.take() else {
            return Err(ClientError::protocol_violation(
                Some(PacketType::Connack),
                "CONNACK without a pending CONNECT",
            ));
        };
        if !connack.reason_code.is_success() {
            let reason_code = connack.reason_code;
            self.connection_failed(ClientError::ConnackRejected { reason_code }, Some(connack))
                .await;
            return Ok(());
        }
        let settings = match negotiate(&connect, &connack) {
            Ok(settings) => settings,
            Err(e) => {
                self.connection_failed(e, Some(connack)).await;
                return Ok(());
            }
        };

        if let Some(id) = &connack.assigned_client_identifier {
            self.assigned_client_id = Some(id.clone());
        }
        self.has_connected_successfully = true;
        self.connected_at = Some(Instant::now());
        if !settings.rejoined_session() {
            self.inbound_qos2.clear();
        }
        self.tracker
            .on_connection_established(settings.rejoined_session());
        self.settings = Some(settings.clone());
        self.set_state(ConnectionState::Connected);
        self.dispatcher
            .lifecycle(LifecycleEvent::ConnectionSuccess { connack, settings });
        self.schedule_ping();
        self.service_queue().await
    }

    async fn on_packet_connected(&mut self, packet: Packet) -> Result<(), ClientError> {
        match packet {
            Packet::Publish(publish) => self.on_inbound_publish(publish).await,
            Packet::Puback(puback) => {
                self.tracker.on_puback(puback)?;
                self.service_queue().await
            }
            Packet::Pubrec(pubrec) => match self.tracker.on_pubrec(pubrec)? {
                Some(pubrel) => Ok(self.write(Packet::Pubrel(pubrel)).await?),
                None => self.service_queue().await,
            },
            Packet::Pubcomp(pubcomp) => {
                self.tracker.on_pubcomp(pubcomp)?;
                self.service_queue().await
            }
            Packet::Pubrel(pubrel) => self.on_inbound_pubrel(pubrel).await,
            Packet::Suback(suback) => {
                self.tracker.on_suback(suback)?;
                self.service_queue().await
            }
            Packet::Unsuback(unsuback) => {
                self.tracker.on_unsuback(unsuback)?;
                self.service_queue().await
            }
            Packet::Pingresp => {
                if let Some(timer) = self.timers.pingresp.take() {
                    timer.abort();
                }
                Ok(())
            }
            Packet::Disconnect(disconnect) => {
                let reason_code = disconnect.reason_code;
                self.connection_lost(ClientError::ServerDisconnect { reason_code }, Some(disconnect))
                    .await;
                Ok(())
            }
            other => Err(ClientError::protocol_violation(
                Some(other.packet_type()),
                "not expected from a server",
            )),
        }
    }

    async fn on_inbound_publish(&mut self, mut publish: PublishPacket) -> Result<(), ClientError> {
        if let Some(alias) = publish.topic_alias {
            let max = self
                .settings
                .as_ref()
                .map_or(0, NegotiatedSettings::topic_alias_maximum_to_client);
            if alias == 0 || alias > max {
                return Err(ClientError::protocol_violation(
                    Some(PacketType::Publish),
                    format!("topic alias {alias} outside 1..={max}"),
                ));
            }
            if publish.topic.is_empty() {
                publish.topic = self.inbound_aliases.get(&alias).cloned().ok_or_else(|| {
                    ClientError::protocol_violation(
                        Some(PacketType::Publish),
                        format!("unknown topic alias {alias}"),
                    )
                })?;
            } else {
                self.inbound_aliases.insert(alias, publish.topic.clone());
            }
        }

        let packet_id = publish.packet_id;
        match publish.qos {
            Qos::AtMostOnce => self.dispatcher.publish(publish),
            Qos::AtLeastOnce => {
                self.dispatcher.publish(publish);
                self.write(Packet::Puback(PubackPacket {
                    packet_id,
                    ..PubackPacket::default()
                }))
                .await?;
            }
            Qos::ExactlyOnce => {
                if self.inbound_qos2.insert(packet_id) {
                    self.dispatcher.publish(publish);
                } else {
                    trace!(packet_id, "duplicate QoS 2 publish not delivered again");
                }
                self.write(Packet::Pubrec(PubrecPacket {
                    packet_id,
                    ..PubrecPacket::default()
                }))
                .await?;
            }
        }
        Ok(())
    }

    async fn on_inbound_pubrel(&mut self, pubrel: PubrelPacket) -> Result<(), ClientError> {
        let reason_code = if self.inbound_qos2.remove(&pubrel.packet_id) {
            PubrelReasonCode::Success
        } else {
            PubrelReasonCode::PacketIdentifierNotFound
        };
        self.write(Packet::Pubcomp(PubcompPacket {
            packet_id: pubrel.packet_id,
            reason_code,
        }))
        .await?;
        Ok(())
    }

    async fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ConnackTimeout { epoch }
                if epoch == self.epoch && self.state == ConnectionState::Connecting =>
            {
                self.timers.connack = None;
                self.connection_failed(ClientError::ConnackTimeout, None)
                    .await;
            }
            TimerKind::Reconnect { epoch }
                if epoch == self.epoch && self.state == ConnectionState::Connecting =>
            {
                self.timers.reconnect = None;
                self.begin_attempt();
            }
            TimerKind::PingreqSend { epoch }
                if epoch == self.epoch && self.state == ConnectionState::Connected =>
            {
                self.timers.pingreq = None;
                if let Err(e) = self.on_ping_due().await {
                    self.close_connection(e, None).await;
                }
            }
            TimerKind::PingrespTimeout { epoch }
                if epoch == self.epoch && self.state == ConnectionState::Connected =>
            {
                self.timers.pingresp = None;
                self.connection_lost(ClientError::PingTimeout, None).await;
            }
            TimerKind::AckTimeout { epoch, op_id } if epoch == self.epoch => {
                self.tracker.on_ack_timeout(op_id);
                if let Err(e) = self.service_queue().await {
                    self.close_connection(e, None).await;
                }
            }
            stale => trace!(?stale, "ignoring stale timer"),
        }
    }

    fn keep_alive(&self) -> Option<Duration> {
        self.settings
            .as_ref()
            .map(NegotiatedSettings::server_keep_alive_sec)
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    fn schedule_ping(&mut self) {
        let Some(keep_alive) = self.keep_alive() else {
            return;
        };
        let delay = (self.last_outbound + keep_alive).saturating_duration_since(Instant::now());
        if let Some(timer) = self.timers.pingreq.take() {
            timer.abort();
        }
        self.timers.pingreq = Some(self.spawn_timer(
            delay,
            TimerKind::PingreqSend { epoch: self.epoch },
        ));
    }

    /// Sends PINGREQ if nothing has been written for a keep alive period.
    async fn on_ping_due(&mut self) -> Result<(), ClientError> {
        let Some(keep_alive) = self.keep_alive() else {
            return Ok(());
        };
        if Instant::now() >= self.last_outbound + keep_alive {
            self.write(Packet::Pingreq).await?;
            if self.timers.pingresp.is_none() {
                self.timers.pingresp = Some(self.spawn_timer(
                    Duration::from_millis(self.config.ping_timeout_ms()),
                    TimerKind::PingrespTimeout { epoch: self.epoch },
                ));
            }
        }
        self.schedule_ping();
        Ok(())
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.config.shutdown_timeout_ms())
    }

    /// Drops the current attempt or connection and everything tied to it.
    async fn teardown(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
        self.timers.cancel_all();
        self.pending_connect = None;
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown(self.shutdown_timeout()).await;
        }
    }

    async fn close_connection(&mut self, error: ClientError, disconnect: Option<DisconnectPacket>) {
        match self.state {
            ConnectionState::Connecting => self.connection_failed(error, None).await,
            ConnectionState::Connected => self.connection_lost(error, disconnect).await,
            _ => {}
        }
    }

    async fn connection_failed(&mut self, error: ClientError, connack: Option<ConnackPacket>) {
        warn!(%error, "connection attempt failed");
        self.teardown().await;
        self.dispatcher
            .lifecycle(LifecycleEvent::ConnectionFailure { error, connack });
        self.schedule_reconnect();
    }

    async fn connection_lost(&mut self, error: ClientError, disconnect: Option<DisconnectPacket>) {
        warn!(%error, "connection lost");
        self.set_state(ConnectionState::Disconnecting);
        self.teardown().await;
        self.end_session();
        self.tracker
            .on_connection_lost(self.config.offline_queue_behavior());
        self.dispatcher
            .lifecycle(LifecycleEvent::Disconnection { error, disconnect });
        self.schedule_reconnect();
    }

    /// Forgets the state of a connection that has ended, resetting the
    /// backoff if the connection was up long enough.
    fn end_session(&mut self) {
        self.settings = None;
        self.inbound_aliases.clear();
        let stable = Duration::from_millis(
            self.config
                .min_connected_time_to_reset_reconnect_delay_ms(),
        );
        if self
            .connected_at
            .take()
            .is_some_and(|since| since.elapsed() >= stable)
        {
            debug!("connection was stable, resetting reconnect backoff");
            self.backoff.reset();
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        debug!(?delay, "scheduling reconnect");
        self.set_state(ConnectionState::Connecting);
        self.timers.reconnect = Some(self.spawn_timer(
            delay,
            TimerKind::Reconnect { epoch: self.epoch },
        ));
    }

    async fn stop(&mut self, disconnect: Option<DisconnectPacket>) {
        match self.state {
            ConnectionState::Stopped => {
                debug!("stop on a stopped client");
                self.tracker.fail_all(|| ClientError::Interrupted);
                return;
            }
            ConnectionState::Connecting => {
                let attempt_in_progress = self.attempt_task.is_some() || self.transport.is_some();
                self.teardown().await;
                if attempt_in_progress {
                    self.dispatcher.lifecycle(LifecycleEvent::ConnectionFailure {
                        error: ClientError::UserInitiatedStop,
                        connack: None,
                    });
                }
            }
            ConnectionState::Connected | ConnectionState::Disconnecting => {
                self.set_state(ConnectionState::Disconnecting);
                if let Some(packet) = &disconnect {
                    if let Err(e) = self.write(Packet::Disconnect(packet.clone())).await {
                        warn!(error = %e, "failed to send DISCONNECT");
                    }
                }
                self.teardown().await;
                self.end_session();
                self.dispatcher.lifecycle(LifecycleEvent::Disconnection {
                    error: ClientError::UserInitiatedStop,
                    disconnect,
                });
            }
        }
        self.finish_stop();
    }

    fn finish_stop(&mut self) {
        self.epoch += 1;
        self.timers.cancel_all();
        self.set_state(ConnectionState::Stopped);
        self.tracker.fail_all(|| ClientError::Interrupted);
        self.backoff.reset();
        self.dispatcher.lifecycle(LifecycleEvent::Stopped);
    }
}

async fn recv_packet(transport: &mut Option<BoxedTransport>) -> Result<Packet, TransportError> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

/// Opens a transport for one attempt, running the websocket handshake
/// transform first when one is configured.
async fn open_transport(
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    mut target: ConnectTarget,
    websocket: Option<WebsocketOptions>,
    timeout: Duration,
) -> Result<BoxedTransport, ClientError> {
    if let Some(websocket) = websocket {
        let mut request = HandshakeRequest {
            host: target.host.clone(),
            path: websocket.path.clone(),
            headers: Vec::new(),
        };
        request.add_header("Host", target.host.clone());
        request.add_header("Upgrade", "websocket");
        request.add_header("Connection", "Upgrade");
        request.add_header("Sec-WebSocket-Protocol", "mqtt");
        request.add_header("Sec-WebSocket-Version", "13");

        if let Some(transform) = websocket.handshake_transform {
            let (done, rx) = HandshakeDone::new();
            dispatcher.transform_handshake(transform, request, done);
            request = match rx.await {
                Ok(Ok(request)) => request,
                Ok(Err(e)) => return Err(ClientError::WebsocketHandshake(e.0)),
                Err(_) => {
                    return Err(ClientError::WebsocketHandshake(
                        "transform finished without signalling completion".to_string(),
                    ))
                }
            };
        }
        target.websocket = Some(request);
    }

    match tokio::time::timeout(timeout, connector.connect(target)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout.into()),
    }
}
