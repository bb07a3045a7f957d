/**
 * MIT License
 *
 * Copyright (c) 2025 Takatoshi Kondo
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use mqtt5_client_tokio::mqtt_client::packet::{
    ConnackPacket, ConnectPacket, ConnectReasonCode, DisconnectPacket, DisconnectReasonCode,
    Packet, PacketType, PubackPacket, PubackReasonCode, PubcompPacket, PublishPacket,
    PubrecPacket, PubrelPacket, Qos, SubackPacket, SubackReasonCode, SubscribePacket,
    Subscription, UnsubackPacket, UnsubackReasonCode, UnsubscribePacket,
};
use mqtt5_client_tokio::mqtt_client::transport::{
    ConnectTarget, Connector, PacketTransport, TransportError,
};

/// Knobs controlling how the mock broker answers
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct Behavior {
    /// Number of upcoming connect calls that fail at the transport level
    pub fail_connects: usize,
    /// Connect calls never complete
    pub hang_connect: bool,
    /// Answer CONNECT with this failure code and close
    pub reject_with: Option<ConnectReasonCode>,
    /// Never answer CONNECT
    pub withhold_connack: bool,
    /// CONNACK template; session present and assigned id are filled in
    pub connack: ConnackPacket,
    /// Claim a session is present whatever the CONNECT asked for
    pub force_session_present: bool,
    /// Do not acknowledge PUBLISH, SUBSCRIBE or UNSUBSCRIBE
    pub suppress_acks: bool,
    pub suppress_pingresp: bool,
    pub puback_reason: PubackReasonCode,
    pub pubrec_reason: PubackReasonCode,
}

#[derive(Debug, Default)]
struct Session {
    subscriptions: Vec<Subscription>,
    expiry: u32,
}

#[derive(Debug)]
struct Connection {
    client_id: Option<String>,
    tx: mpsc::UnboundedSender<Packet>,
    will: Option<PublishPacket>,
    next_packet_id: u16,
}

#[derive(Debug, Default)]
struct State {
    behavior: Behavior,
    sessions: HashMap<String, Session>,
    connections: HashMap<u64, Connection>,
    retained: HashMap<String, PublishPacket>,
    received: Vec<Packet>,
    targets: Vec<ConnectTarget>,
    connect_calls: usize,
    next_connection: u64,
    next_assigned: u64,
}

/// In-memory MQTT v5.0 broker for tests
///
/// Acts as the client's [`Connector`]; every connection is a pair of packet
/// channels. Supports persistent sessions, retained messages, wildcard
/// routing, session takeover and will messages.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<State>>,
}

#[allow(dead_code)]
impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Change broker behavior
    pub fn behave(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.lock().behavior);
    }

    /// Every packet received from any client, in arrival order
    pub fn received(&self) -> Vec<Packet> {
        self.lock().received.clone()
    }

    pub fn received_count(&self, packet_type: PacketType) -> usize {
        self.lock()
            .received
            .iter()
            .filter(|p| p.packet_type() == packet_type)
            .count()
    }

    pub fn received_publishes(&self) -> Vec<PublishPacket> {
        self.lock()
            .received
            .iter()
            .filter_map(|p| match p {
                Packet::Publish(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn received_connects(&self) -> Vec<ConnectPacket> {
        self.lock()
            .received
            .iter()
            .filter_map(|p| match p {
                Packet::Connect(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn targets(&self) -> Vec<ConnectTarget> {
        self.lock().targets.clone()
    }

    pub fn retained(&self, topic: &str) -> Option<PublishPacket> {
        self.lock().retained.get(topic).cloned()
    }

    pub fn has_session(&self, client_id: &str) -> bool {
        self.lock().sessions.contains_key(client_id)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Sends `packet` to every open connection
    pub fn inject(&self, packet: Packet) {
        for connection in self.lock().connections.values() {
            let _ = connection.tx.send(packet.clone());
        }
    }

    /// Drops every connection as a network failure would
    pub fn drop_connections(&self) {
        let mut state = self.lock();
        let ids: Vec<u64> = state.connections.keys().copied().collect();
        for id in ids {
            state.close(id, true);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn handle(&self, connection: u64, packet: Packet) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connections.contains_key(&connection) {
            return Err(TransportError::Closed);
        }
        state.received.push(packet.clone());
        match packet {
            Packet::Connect(connect) => state.on_connect(connection, connect),
            Packet::Publish(publish) => state.on_publish(connection, publish),
            Packet::Pubrel(pubrel) => {
                if !state.behavior.suppress_acks {
                    state.reply(
                        connection,
                        Packet::Pubcomp(PubcompPacket {
                            packet_id: pubrel.packet_id,
                            ..PubcompPacket::default()
                        }),
                    );
                }
            }
            Packet::Pubrec(pubrec) => state.reply(
                connection,
                Packet::Pubrel(PubrelPacket {
                    packet_id: pubrec.packet_id,
                    ..PubrelPacket::default()
                }),
            ),
            Packet::Subscribe(subscribe) => state.on_subscribe(connection, subscribe),
            Packet::Unsubscribe(unsubscribe) => state.on_unsubscribe(connection, unsubscribe),
            Packet::Pingreq => {
                if !state.behavior.suppress_pingresp {
                    state.reply(connection, Packet::Pingresp);
                }
            }
            Packet::Disconnect(disconnect) => state.on_disconnect(connection, disconnect),
            _ => {}
        }
        Ok(())
    }

    fn closed(&self, connection: u64) {
        self.lock().close(connection, true);
    }
}

impl Connector for MockBroker {
    fn connect(
        &self,
        target: ConnectTarget,
    ) -> BoxFuture<'static, Result<Box<dyn PacketTransport + Send>, TransportError>> {
        let broker = self.clone();
        Box::pin(async move {
            let hang = {
                let mut state = broker.lock();
                state.connect_calls += 1;
                state.targets.push(target);
                if state.behavior.fail_connects > 0 {
                    state.behavior.fail_connects -= 1;
                    return Err(TransportError::Connect("connection refused".to_string()));
                }
                state.behavior.hang_connect
            };
            if hang {
                std::future::pending::<()>().await;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let connection = {
                let mut state = broker.lock();
                state.next_connection += 1;
                let id = state.next_connection;
                state.connections.insert(
                    id,
                    Connection {
                        client_id: None,
                        tx,
                        will: None,
                        next_packet_id: 1,
                    },
                );
                id
            };
            let transport: Box<dyn PacketTransport + Send> = Box::new(MockTransport {
                broker,
                connection,
                rx,
            });
            Ok(transport)
        })
    }
}

impl State {
    fn reply(&self, connection: u64, packet: Packet) {
        if let Some(connection) = self.connections.get(&connection) {
            let _ = connection.tx.send(packet);
        }
    }

    fn client_id(&self, connection: u64) -> Option<String> {
        self.connections
            .get(&connection)
            .and_then(|c| c.client_id.clone())
    }

    fn on_connect(&mut self, connection: u64, connect: ConnectPacket) {
        if self.behavior.withhold_connack {
            return;
        }
        if let Some(reason_code) = self.behavior.reject_with {
            self.reply(
                connection,
                Packet::Connack(ConnackPacket {
                    reason_code,
                    ..ConnackPacket::default()
                }),
            );
            self.connections.remove(&connection);
            return;
        }

        let (client_id, assigned) = match connect.client_id.filter(|id| !id.is_empty()) {
            Some(id) => (id, false),
            None => {
                self.next_assigned += 1;
                (format!("mock-{}", self.next_assigned), true)
            }
        };

        let taken_over: Vec<u64> = self
            .connections
            .iter()
            .filter(|(id, c)| **id != connection && c.client_id.as_deref() == Some(&client_id))
            .map(|(id, _)| *id)
            .collect();
        for id in taken_over {
            self.reply(
                id,
                Packet::Disconnect(DisconnectPacket {
                    reason_code: DisconnectReasonCode::SessionTakenOver,
                    ..DisconnectPacket::default()
                }),
            );
            self.connections.remove(&id);
        }

        if connect.clean_start {
            self.sessions.remove(&client_id);
        }
        let session_present = self.sessions.contains_key(&client_id);
        let session = self.sessions.entry(client_id.clone()).or_default();
        session.expiry = connect.session_expiry_interval_sec.unwrap_or(0);

        if let Some(c) = self.connections.get_mut(&connection) {
            c.client_id = Some(client_id.clone());
            c.will = connect.will;
        }

        let mut connack = self.behavior.connack.clone();
        connack.reason_code = ConnectReasonCode::Success;
        connack.session_present = session_present || self.behavior.force_session_present;
        if assigned {
            connack.assigned_client_identifier = Some(client_id);
        }
        self.reply(connection, Packet::Connack(connack));
    }

    fn on_publish(&mut self, connection: u64, publish: PublishPacket) {
        if publish.retain {
            if publish.payload.is_empty() {
                self.retained.remove(&publish.topic);
            } else {
                self.retained.insert(publish.topic.clone(), publish.clone());
            }
        }
        self.route(Some(connection), &publish);

        if self.behavior.suppress_acks {
            return;
        }
        match publish.qos {
            Qos::AtMostOnce => {}
            Qos::AtLeastOnce => self.reply(
                connection,
                Packet::Puback(PubackPacket {
                    packet_id: publish.packet_id,
                    reason_code: self.behavior.puback_reason,
                    ..PubackPacket::default()
                }),
            ),
            Qos::ExactlyOnce => self.reply(
                connection,
                Packet::Pubrec(PubrecPacket {
                    packet_id: publish.packet_id,
                    reason_code: self.behavior.pubrec_reason,
                    ..PubrecPacket::default()
                }),
            ),
        }
    }

    fn route(&mut self, origin: Option<u64>, publish: &PublishPacket) {
        for (id, connection) in self.connections.iter_mut() {
            let Some(session) = connection
                .client_id
                .as_ref()
                .and_then(|client_id| self.sessions.get(client_id))
            else {
                continue;
            };
            let Some(subscription) = session
                .subscriptions
                .iter()
                .find(|s| topic_matches(&s.topic_filter, &publish.topic))
            else {
                continue;
            };
            if subscription.no_local && origin == Some(*id) {
                continue;
            }
            let qos = publish.qos.min(subscription.qos);
            let retain = publish.retain && subscription.retain_as_published;
            let delivery = deliver(connection, publish, qos, retain);
            let _ = connection.tx.send(Packet::Publish(delivery));
        }
    }

    fn on_subscribe(&mut self, connection: u64, subscribe: SubscribePacket) {
        let Some(client_id) = self.client_id(connection) else {
            return;
        };
        let session = self.sessions.entry(client_id).or_default();
        let mut reason_codes = Vec::with_capacity(subscribe.subscriptions.len());
        for subscription in &subscribe.subscriptions {
            session
                .subscriptions
                .retain(|s| s.topic_filter != subscription.topic_filter);
            session.subscriptions.push(subscription.clone());
            reason_codes.push(match subscription.qos {
                Qos::AtMostOnce => SubackReasonCode::GrantedQos0,
                Qos::AtLeastOnce => SubackReasonCode::GrantedQos1,
                Qos::ExactlyOnce => SubackReasonCode::GrantedQos2,
            });
        }
        if !self.behavior.suppress_acks {
            self.reply(
                connection,
                Packet::Suback(SubackPacket {
                    packet_id: subscribe.packet_id,
                    reason_codes,
                    ..SubackPacket::default()
                }),
            );
        }

        let mut retained: Vec<PublishPacket> = Vec::new();
        for subscription in &subscribe.subscriptions {
            for message in self.retained.values() {
                if topic_matches(&subscription.topic_filter, &message.topic) {
                    let mut message = message.clone();
                    message.qos = message.qos.min(subscription.qos);
                    retained.push(message);
                }
            }
        }
        if let Some(c) = self.connections.get_mut(&connection) {
            for message in retained {
                let qos = message.qos;
                let delivery = deliver(c, &message, qos, true);
                let _ = c.tx.send(Packet::Publish(delivery));
            }
        }
    }

    fn on_unsubscribe(&mut self, connection: u64, unsubscribe: UnsubscribePacket) {
        let Some(client_id) = self.client_id(connection) else {
            return;
        };
        let session = self.sessions.entry(client_id).or_default();
        let reason_codes = unsubscribe
            .topic_filters
            .iter()
            .map(|filter| {
                let before = session.subscriptions.len();
                session.subscriptions.retain(|s| &s.topic_filter != filter);
                if session.subscriptions.len() < before {
                    UnsubackReasonCode::Success
                } else {
                    UnsubackReasonCode::NoSubscriptionExisted
                }
            })
            .collect();
        if !self.behavior.suppress_acks {
            self.reply(
                connection,
                Packet::Unsuback(UnsubackPacket {
                    packet_id: unsubscribe.packet_id,
                    reason_codes,
                    ..UnsubackPacket::default()
                }),
            );
        }
    }

    fn on_disconnect(&mut self, connection: u64, disconnect: DisconnectPacket) {
        if let Some(client_id) = self.client_id(connection) {
            if let (Some(session), Some(expiry)) = (
                self.sessions.get_mut(&client_id),
                disconnect.session_expiry_interval_sec,
            ) {
                session.expiry = expiry;
            }
        }
        let publish_will = disconnect.reason_code == DisconnectReasonCode::DisconnectWithWillMessage;
        self.close(connection, publish_will);
    }

    fn close(&mut self, connection: u64, publish_will: bool) {
        let Some(closed) = self.connections.remove(&connection) else {
            return;
        };
        if let Some(client_id) = &closed.client_id {
            if self.sessions.get(client_id).is_some_and(|s| s.expiry == 0) {
                self.sessions.remove(client_id);
            }
        }
        if let (true, Some(will)) = (publish_will, closed.will) {
            if will.retain {
                self.retained.insert(will.topic.clone(), will.clone());
            }
            self.route(None, &will);
        }
    }
}

fn deliver(connection: &mut Connection, publish: &PublishPacket, qos: Qos, retain: bool) -> PublishPacket {
    let packet_id = if qos == Qos::AtMostOnce {
        0
    } else {
        let id = connection.next_packet_id;
        connection.next_packet_id = connection.next_packet_id.checked_add(1).unwrap_or(1);
        id
    };
    PublishPacket {
        packet_id,
        dup: false,
        qos,
        retain,
        topic_alias: None,
        ..publish.clone()
    }
}

/// MQTT topic filter matching, including `$share/<group>/` filters
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let filter = match filter.strip_prefix("$share/") {
        Some(rest) => rest.split_once('/').map_or(rest, |(_, f)| f),
        None => filter,
    };
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(level), Some(topic_level)) if level == topic_level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Client side of a mock broker connection
pub struct MockTransport {
    broker: MockBroker,
    connection: u64,
    rx: mpsc::UnboundedReceiver<Packet>,
}

impl PacketTransport for MockTransport {
    fn send<'a>(&'a mut self, packet: Packet) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move { self.broker.handle(self.connection, packet) })
    }

    fn recv<'a>(&'a mut self) -> BoxFuture<'a, Result<Packet, TransportError>> {
        Box::pin(async move { self.rx.recv().await.ok_or(TransportError::Closed) })
    }

    fn shutdown<'a>(&'a mut self, _timeout: Duration) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.broker.closed(self.connection);
            self.rx.close();
        })
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.broker.closed(self.connection);
    }
}
