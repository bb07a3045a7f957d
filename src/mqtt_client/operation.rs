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

//! Operation queue and acknowledgement tracking.
//!
//! Owned by the client task. Operations are queued in submission order and
//! publishes are written in that order; a packet identifier is taken from the
//! allocator only when an operation is written and returned once its
//! completion has been resolved.

use crate::mqtt_client::config::OfflineQueueBehavior;
use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::event::{PublishOutcome, Qos2Response};
use crate::mqtt_client::negotiate::NegotiatedSettings;
use crate::mqtt_client::packet::{
    Packet, PacketType, PubackPacket, PubcompPacket, PubrecPacket, PubrelPacket,
    PubrelReasonCode, Qos, SubackPacket, UnsubackPacket,
};
use crate::mqtt_client::stats::{OperationStatistics, StatisticsAggregator};
use crate::mqtt_client::validation;
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Resolves once the operation has been acknowledged or has failed.
///
/// Dropping a completion does not cancel the operation.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T> Completion<T> {
    pub(crate) fn new() -> (oneshot::Sender<Result<T, ClientError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|result| result.unwrap_or(Err(ClientError::ChannelClosed)))
    }
}

pub(crate) enum Responder {
    Publish(oneshot::Sender<Result<PublishOutcome, ClientError>>),
    Subscribe(oneshot::Sender<Result<SubackPacket, ClientError>>),
    Unsubscribe(oneshot::Sender<Result<UnsubackPacket, ClientError>>),
}

impl Responder {
    pub(crate) fn fail(self, error: ClientError) {
        // a dropped receiver only means nobody is waiting for the result
        match self {
            Responder::Publish(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::Subscribe(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::Unsubscribe(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationState {
    Queued,
    Sent,
    /// QoS 2 publish whose PUBREC arrived; PUBREL written, PUBCOMP pending.
    PubrelSent,
}

struct Operation {
    packet: Packet,
    responder: Responder,
    state: OperationState,
    // written on the current connection and not yet resolved
    written: bool,
    size: usize,
    ack_timer: Option<JoinHandle<()>>,
}

impl Operation {
    fn packet_id(&self) -> u16 {
        match &self.packet {
            Packet::Publish(p) => p.packet_id,
            Packet::Subscribe(p) => p.packet_id,
            Packet::Unsubscribe(p) => p.packet_id,
            _ => 0,
        }
    }

    fn set_packet_id(&mut self, packet_id: u16) {
        match &mut self.packet {
            Packet::Publish(p) => p.packet_id = packet_id,
            Packet::Subscribe(p) => p.packet_id = packet_id,
            Packet::Unsubscribe(p) => p.packet_id = packet_id,
            _ => {}
        }
    }

    fn publish_qos(&self) -> Option<Qos> {
        match &self.packet {
            Packet::Publish(p) => Some(p.qos),
            _ => None,
        }
    }

    /// QoS 1 and 2 publishes count against the server's receive maximum.
    fn is_flow_controlled(&self) -> bool {
        self.publish_qos().is_some_and(|qos| qos != Qos::AtMostOnce)
    }

    fn expects_ack(&self) -> bool {
        self.publish_qos() != Some(Qos::AtMostOnce)
    }

    fn is_unacked(&self) -> bool {
        self.written && self.expects_ack()
    }

    fn cancel_ack_timer(&mut self) {
        if let Some(handle) = self.ack_timer.take() {
            handle.abort();
        }
    }
}

/// Whether an unsent operation survives a period without a connection.
pub(crate) fn retained_offline(packet: &Packet, behavior: OfflineQueueBehavior) -> bool {
    let qos = match packet {
        Packet::Publish(p) => Some(p.qos),
        _ => None,
    };
    match behavior {
        OfflineQueueBehavior::FailAllOnDisconnect => false,
        OfflineQueueBehavior::FailNonQos1PublishOnDisconnect => {
            qos.is_some_and(|qos| qos != Qos::AtMostOnce)
        }
        OfflineQueueBehavior::FailQos0PublishOnDisconnect => qos != Some(Qos::AtMostOnce),
    }
}

#[derive(Debug)]
struct PacketIdAllocator {
    next: u16,
    in_use: HashSet<u16>,
}

impl PacketIdAllocator {
    fn new() -> Self {
        Self {
            next: 1,
            in_use: HashSet::new(),
        }
    }

    fn acquire(&mut self) -> Option<u16> {
        if self.in_use.len() >= usize::from(u16::MAX) {
            return None;
        }
        loop {
            let id = self.next;
            self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };
            if self.in_use.insert(id) {
                return Some(id);
            }
        }
    }

    fn release(&mut self, id: u16) {
        self.in_use.remove(&id);
    }

    fn clear(&mut self) {
        self.in_use.clear();
    }
}

pub(crate) struct OperationTracker {
    next_op_id: u64,
    // keyed by submission order
    ops: BTreeMap<u64, Operation>,
    queue: VecDeque<u64>,
    in_flight: HashMap<u16, u64>,
    packet_ids: PacketIdAllocator,
    in_flight_publishes: usize,
    stats: StatisticsAggregator,
}

impl OperationTracker {
    pub(crate) fn new() -> (Self, watch::Receiver<OperationStatistics>) {
        let (stats, stats_rx) = StatisticsAggregator::new();
        (
            Self {
                next_op_id: 1,
                ops: BTreeMap::new(),
                queue: VecDeque::new(),
                in_flight: HashMap::new(),
                packet_ids: PacketIdAllocator::new(),
                in_flight_publishes: 0,
                stats,
            },
            stats_rx,
        )
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Accepts a validated operation at the back of the queue.
    pub(crate) fn submit(&mut self, packet: Packet, responder: Responder) -> u64 {
        let id = self.next_op_id;
        self.next_op_id += 1;
        let size = packet.encoded_len();
        trace!(op_id = id, packet_type = ?packet.packet_type(), size, "operation queued");
        self.ops.insert(
            id,
            Operation {
                packet,
                responder,
                state: OperationState::Queued,
                written: false,
                size,
                ack_timer: None,
            },
        );
        self.queue.push_back(id);
        self.stats.on_incomplete_added(size);
        self.stats.publish();
        id
    }

    /// Takes the next operation that may be written on a connection with `settings`.
    ///
    /// Operations the connection cannot carry are failed on the way. Publishes
    /// leave in submission order: once one is held back by the server's receive
    /// maximum, every later publish waits too, while subscribes and unsubscribes
    /// behind it may still go out. Returns `None` when nothing can be written or
    /// when packet identifiers are exhausted.
    pub(crate) fn next_to_send(&mut self, settings: &NegotiatedSettings) -> Option<(u64, Packet)> {
        let mut index = 0;
        let mut publishes_blocked = false;
        while let Some(&id) = self.queue.get(index) {
            let Some(op) = self.ops.get(&id) else {
                self.queue.remove(index);
                continue;
            };
            let is_publish = op.publish_qos().is_some();
            if is_publish && publishes_blocked {
                index += 1;
                continue;
            }

            if op.state == OperationState::Queued {
                if let Err(e) = validation::validate_for_connection(&op.packet, settings) {
                    self.queue.remove(index);
                    warn!(op_id = id, error = %e, "operation not allowed on this connection");
                    self.fail(id, e.into());
                    continue;
                }
            }
            if op.is_flow_controlled()
                && self.in_flight_publishes >= usize::from(settings.receive_maximum_from_server())
            {
                publishes_blocked = true;
                index += 1;
                continue;
            }
            if op.expects_ack() && op.packet_id() == 0 {
                let packet_id = self.packet_ids.acquire()?;
                self.in_flight.insert(packet_id, id);
                if let Some(op) = self.ops.get_mut(&id) {
                    op.set_packet_id(packet_id);
                }
            }

            self.queue.remove(index);
            let op = self.ops.get_mut(&id)?;
            let packet = match op.state {
                OperationState::PubrelSent => Packet::Pubrel(PubrelPacket {
                    packet_id: op.packet_id(),
                    reason_code: PubrelReasonCode::Success,
                }),
                _ => {
                    op.state = OperationState::Sent;
                    op.packet.clone()
                }
            };
            op.written = true;
            if op.is_flow_controlled() {
                self.in_flight_publishes += 1;
            }
            if op.expects_ack() {
                self.stats.on_unacked_added(op.size);
                self.stats.publish();
            }
            return Some((id, packet));
        }
        None
    }

    pub(crate) fn set_ack_timer(&mut self, id: u64, handle: JoinHandle<()>) {
        match self.ops.get_mut(&id) {
            Some(op) => {
                op.cancel_ack_timer();
                op.ack_timer = Some(handle);
            }
            None => handle.abort(),
        }
    }

    /// Completes a QoS 0 publish once it has been written.
    pub(crate) fn complete_qos0(&mut self, id: u64) {
        if let Some(Responder::Publish(tx)) = self.remove(id).map(|op| op.responder) {
            let _ = tx.send(Ok(PublishOutcome::Qos0));
        }
    }

    pub(crate) fn on_puback(&mut self, puback: PubackPacket) -> Result<(), ClientError> {
        let Some(id) = self.awaiting(puback.packet_id, PacketType::Puback, |op| {
            op.publish_qos() == Some(Qos::AtLeastOnce) && op.state == OperationState::Sent
        })?
        else {
            return Ok(());
        };
        if let Some(Responder::Publish(tx)) = self.remove(id).map(|op| op.responder) {
            let _ = tx.send(Ok(PublishOutcome::Qos1(puback)));
        }
        Ok(())
    }

    /// Returns the PUBREL to write when the PUBREC accepted the publish.
    pub(crate) fn on_pubrec(
        &mut self,
        pubrec: PubrecPacket,
    ) -> Result<Option<PubrelPacket>, ClientError> {
        let Some(id) = self.awaiting(pubrec.packet_id, PacketType::Pubrec, |op| {
            op.publish_qos() == Some(Qos::ExactlyOnce) && op.state != OperationState::Queued
        })?
        else {
            return Ok(None);
        };
        if !pubrec.reason_code.is_success() {
            if let Some(Responder::Publish(tx)) = self.remove(id).map(|op| op.responder) {
                let _ = tx.send(Ok(PublishOutcome::Qos2(Qos2Response::Pubrec(pubrec))));
            }
            return Ok(None);
        }
        if let Some(op) = self.ops.get_mut(&id) {
            op.state = OperationState::PubrelSent;
        }
        Ok(Some(PubrelPacket {
            packet_id: pubrec.packet_id,
            reason_code: PubrelReasonCode::Success,
        }))
    }

    pub(crate) fn on_pubcomp(&mut self, pubcomp: PubcompPacket) -> Result<(), ClientError> {
        let Some(id) = self.awaiting(pubcomp.packet_id, PacketType::Pubcomp, |op| {
            op.state == OperationState::PubrelSent
        })?
        else {
            return Ok(());
        };
        if let Some(Responder::Publish(tx)) = self.remove(id).map(|op| op.responder) {
            let _ = tx.send(Ok(PublishOutcome::Qos2(Qos2Response::Pubcomp(pubcomp))));
        }
        Ok(())
    }

    pub(crate) fn on_suback(&mut self, suback: SubackPacket) -> Result<(), ClientError> {
        let Some(id) = self.awaiting(suback.packet_id, PacketType::Suback, |op| {
            matches!(op.packet, Packet::Subscribe(_)) && op.state == OperationState::Sent
        })?
        else {
            return Ok(());
        };
        if let Some(Responder::Subscribe(tx)) = self.remove(id).map(|op| op.responder) {
            let _ = tx.send(Ok(suback));
        }
        Ok(())
    }

    pub(crate) fn on_unsuback(&mut self, unsuback: UnsubackPacket) -> Result<(), ClientError> {
        let Some(id) = self.awaiting(unsuback.packet_id, PacketType::Unsuback, |op| {
            matches!(op.packet, Packet::Unsubscribe(_)) && op.state == OperationState::Sent
        })?
        else {
            return Ok(());
        };
        if let Some(Responder::Unsubscribe(tx)) = self.remove(id).map(|op| op.responder) {
            let _ = tx.send(Ok(unsuback));
        }
        Ok(())
    }

    /// Fails a written operation whose acknowledgement did not arrive in time.
    pub(crate) fn on_ack_timeout(&mut self, id: u64) {
        let waiting = self
            .ops
            .get(&id)
            .is_some_and(|op| op.written);
        if waiting {
            warn!(op_id = id, "operation timed out waiting for acknowledgement");
            self.fail(id, ClientError::AckTimeout);
        }
    }

    /// Moves written operations back into the queue after the connection
    /// dropped, then applies the offline policy to the queue.
    pub(crate) fn on_connection_lost(&mut self, behavior: OfflineQueueBehavior) {
        let written: Vec<u64> = self
            .ops
            .iter()
            .filter(|(_, op)| op.written)
            .map(|(id, _)| *id)
            .collect();
        for id in written {
            let Some(op) = self.ops.get_mut(&id) else {
                continue;
            };
            op.cancel_ack_timer();
            if op.is_unacked() {
                self.stats.on_unacked_removed(op.size);
            }
            if op.is_flow_controlled() {
                self.in_flight_publishes = self.in_flight_publishes.saturating_sub(1);
            }
            op.written = false;
            if op.state == OperationState::Sent {
                op.state = OperationState::Queued;
            }
            // subscriptions are not part of the session and get a fresh id on resend
            if op.publish_qos().is_none() {
                let packet_id = op.packet_id();
                op.set_packet_id(0);
                self.in_flight.remove(&packet_id);
                self.packet_ids.release(packet_id);
            }
            self.queue.push_back(id);
        }
        // operation ids follow submission order
        self.queue.make_contiguous().sort_unstable();
        self.stats.publish();
        self.apply_offline_policy(behavior);
    }

    /// Fails every queued operation the offline policy does not keep.
    pub(crate) fn apply_offline_policy(&mut self, behavior: OfflineQueueBehavior) {
        let dropped: Vec<u64> = self
            .queue
            .iter()
            .copied()
            .filter(|id| {
                self.ops
                    .get(id)
                    .is_some_and(|op| !retained_offline(&op.packet, behavior))
            })
            .collect();
        if dropped.is_empty() {
            return;
        }
        self.queue.retain(|id| !dropped.contains(id));
        for id in dropped {
            self.fail(id, ClientError::OfflineQueuePolicy);
        }
    }

    /// Prepares requeued publishes for a new connection.
    ///
    /// In a rejoined session they keep their packet identifiers and are resent
    /// as duplicates. Otherwise the server has forgotten them, so they are
    /// resent from scratch.
    pub(crate) fn on_connection_established(&mut self, rejoined_session: bool) {
        for id in self.queue.iter() {
            let Some(op) = self.ops.get_mut(id) else {
                continue;
            };
            let packet_id = op.packet_id();
            if packet_id == 0 {
                continue;
            }
            if rejoined_session {
                if let Packet::Publish(p) = &mut op.packet {
                    p.dup = true;
                }
            } else {
                op.set_packet_id(0);
                op.state = OperationState::Queued;
                if let Packet::Publish(p) = &mut op.packet {
                    p.dup = false;
                }
                self.in_flight.remove(&packet_id);
                self.packet_ids.release(packet_id);
            }
        }
    }

    /// Resolves every outstanding operation with `error()`.
    pub(crate) fn fail_all(&mut self, error: impl Fn() -> ClientError) {
        let ops = std::mem::take(&mut self.ops);
        self.queue.clear();
        self.in_flight.clear();
        self.packet_ids.clear();
        self.in_flight_publishes = 0;
        for op in ops.values() {
            self.stats.on_incomplete_removed(op.size);
            if op.is_unacked() {
                self.stats.on_unacked_removed(op.size);
            }
        }
        self.stats.publish();
        for (_, mut op) in ops {
            op.cancel_ack_timer();
            op.responder.fail(error());
        }
    }

    fn fail(&mut self, id: u64, error: ClientError) {
        if let Some(op) = self.remove(id) {
            op.responder.fail(error);
        }
    }

    /// Looks up the operation an acknowledgement refers to.
    ///
    /// `Ok(None)` means nothing is waiting on the identifier any more, which
    /// happens for acks that arrive after a timeout. An ack that does not fit
    /// the waiting operation is a protocol violation.
    fn awaiting(
        &self,
        packet_id: u16,
        packet_type: PacketType,
        fits: impl Fn(&Operation) -> bool,
    ) -> Result<Option<u64>, ClientError> {
        let Some(id) = self.in_flight.get(&packet_id).copied() else {
            warn!(packet_id, ?packet_type, "discarding acknowledgement for unknown packet id");
            return Ok(None);
        };
        match self.ops.get(&id) {
            Some(op) if fits(op) => Ok(Some(id)),
            Some(_) => Err(ClientError::protocol_violation(
                Some(packet_type),
                format!("packet id {packet_id} belongs to a different operation"),
            )),
            None => Ok(None),
        }
    }

    /// Removes an operation and settles its bookkeeping, before its
    /// completion is resolved, so that a caller woken by the completion
    /// already sees updated statistics.
    fn remove(&mut self, id: u64) -> Option<Operation> {
        let mut op = self.ops.remove(&id)?;
        op.cancel_ack_timer();
        let packet_id = op.packet_id();
        if packet_id != 0 && self.in_flight.get(&packet_id) == Some(&id) {
            self.in_flight.remove(&packet_id);
            self.packet_ids.release(packet_id);
        }
        if op.is_unacked() {
            self.stats.on_unacked_removed(op.size);
            if op.is_flow_controlled() {
                self.in_flight_publishes = self.in_flight_publishes.saturating_sub(1);
            }
        }
        self.stats.on_incomplete_removed(op.size);
        self.stats.publish();
        trace!(op_id = id, "operation resolved");
        Some(op)
    }
}
