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

//! Per-client event dispatcher.
//!
//! One task per client consumes a single FIFO of commands. Lifecycle events,
//! received publishes and handshake transforms therefore reach listeners in
//! the order the client task produced them, and never concurrently. A panicking
//! listener is logged and skipped; it does not affect the client task.

use crate::mqtt_client::event::{LifecycleEvent, ListenerId};
use crate::mqtt_client::packet::PublishPacket;
use crate::mqtt_client::websocket::{HandshakeDone, HandshakeRequest, HandshakeTransform};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

pub(crate) type LifecycleListener = Box<dyn FnMut(&LifecycleEvent) + Send>;
pub(crate) type PublishListener = Box<dyn FnMut(&PublishPacket) + Send>;

pub(crate) enum DispatchCommand {
    AddLifecycleListener(ListenerId, LifecycleListener),
    AddPublishListener(ListenerId, PublishListener),
    RemoveListener(ListenerId),
    Lifecycle(LifecycleEvent),
    Publish(PublishPacket),
    TransformHandshake {
        transform: HandshakeTransform,
        request: HandshakeRequest,
        done: HandshakeDone,
    },
}

/// Sending side of a client's dispatcher. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchCommand>,
    next_listener_id: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Spawns the dispatcher task. It ends once every `Dispatcher` clone is gone.
    pub(crate) fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_loop(rx));
        Self {
            tx,
            next_listener_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn add_lifecycle_listener(&self, listener: LifecycleListener) -> ListenerId {
        let id = self.allocate_id();
        self.send(DispatchCommand::AddLifecycleListener(id, listener));
        id
    }

    pub(crate) fn add_publish_listener(&self, listener: PublishListener) -> ListenerId {
        let id = self.allocate_id();
        self.send(DispatchCommand::AddPublishListener(id, listener));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) {
        self.send(DispatchCommand::RemoveListener(id));
    }

    pub(crate) fn lifecycle(&self, event: LifecycleEvent) {
        trace!(?event, "dispatching lifecycle event");
        self.send(DispatchCommand::Lifecycle(event));
    }

    pub(crate) fn publish(&self, publish: PublishPacket) {
        self.send(DispatchCommand::Publish(publish));
    }

    pub(crate) fn transform_handshake(
        &self,
        transform: HandshakeTransform,
        request: HandshakeRequest,
        done: HandshakeDone,
    ) {
        self.send(DispatchCommand::TransformHandshake {
            transform,
            request,
            done,
        });
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: DispatchCommand) {
        if self.tx.send(command).is_err() {
            warn!("event dispatcher is gone, dropping command");
        }
    }
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<DispatchCommand>) {
    let mut lifecycle_listeners: Vec<(ListenerId, LifecycleListener)> = Vec::new();
    let mut publish_listeners: Vec<(ListenerId, PublishListener)> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            DispatchCommand::AddLifecycleListener(id, listener) => {
                lifecycle_listeners.push((id, listener));
            }
            DispatchCommand::AddPublishListener(id, listener) => {
                publish_listeners.push((id, listener));
            }
            DispatchCommand::RemoveListener(id) => {
                lifecycle_listeners.retain(|(listener_id, _)| *listener_id != id);
                publish_listeners.retain(|(listener_id, _)| *listener_id != id);
            }
            DispatchCommand::Lifecycle(event) => {
                for (id, listener) in lifecycle_listeners.iter_mut() {
                    if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                        warn!(listener = id.0, ?event, "lifecycle listener panicked");
                    }
                }
            }
            DispatchCommand::Publish(publish) => {
                for (id, listener) in publish_listeners.iter_mut() {
                    if catch_unwind(AssertUnwindSafe(|| listener(&publish))).is_err() {
                        warn!(listener = id.0, topic = %publish.topic, "publish listener panicked");
                    }
                }
            }
            DispatchCommand::TransformHandshake {
                transform,
                request,
                done,
            } => {
                // a panic drops `done`, which fails the connection attempt
                if catch_unwind(AssertUnwindSafe(|| transform.call(request, done))).is_err() {
                    warn!("websocket handshake transform panicked");
                }
            }
        }
    }
    trace!("event dispatcher finished");
}
