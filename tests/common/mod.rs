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
use mqtt5_client_tokio::mqtt_client::packet::{
    ConnackPacket, ConnectPacket, DisconnectPacket, PublishPacket,
};
use mqtt5_client_tokio::mqtt_client::{
    Client, ClientConfig, ClientConfigBuilder, ClientError, LifecycleEvent, NegotiatedSettings,
    OperationStatistics,
};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod broker;

pub use broker::MockBroker;

static INIT: Once = Once::new();

/// Automatic tracing initialization for ALL tests
///
/// Environment variables:
/// - `RUST_LOG`: Standard Rust logging (takes precedence if set)
/// - `MQTT_LOG_LEVEL`: Set log level (trace, debug, info, warn, error). Default: warn
///
/// Usage examples:
/// - `cargo test` (default warn level)
/// - `MQTT_LOG_LEVEL=trace cargo test`
/// - `RUST_LOG=debug cargo test`
fn auto_init_tracing() {
    INIT.call_once(|| {
        // Try RUST_LOG first, then MQTT_LOG_LEVEL, then default to warn
        let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
            tracing_subscriber::EnvFilter::new(rust_log)
        } else {
            let level = std::env::var("MQTT_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
            tracing_subscriber::EnvFilter::new(format!("mqtt5_client_tokio={level}"))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .init();
    });
}

pub fn init_tracing() {
    auto_init_tracing();
}

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Lifecycle event reduced to data a test can keep
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Observed {
    AttemptingConnect,
    ConnectionSuccess {
        connack: ConnackPacket,
        settings: NegotiatedSettings,
    },
    ConnectionFailure {
        error: &'static str,
        connack: Option<ConnackPacket>,
    },
    Disconnection {
        error: &'static str,
        disconnect: Option<DisconnectPacket>,
    },
    Stopped,
}

#[allow(dead_code)]
impl Observed {
    pub fn name(&self) -> &'static str {
        match self {
            Observed::AttemptingConnect => "AttemptingConnect",
            Observed::ConnectionSuccess { .. } => "ConnectionSuccess",
            Observed::ConnectionFailure { .. } => "ConnectionFailure",
            Observed::Disconnection { .. } => "Disconnection",
            Observed::Stopped => "Stopped",
        }
    }

    pub fn error(&self) -> Option<&'static str> {
        match self {
            Observed::ConnectionFailure { error, .. } | Observed::Disconnection { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// Name of the error variant, for assertions
pub fn error_kind(error: &ClientError) -> &'static str {
    match error {
        ClientError::Validation(_) => "Validation",
        ClientError::Transport(_) => "Transport",
        ClientError::ConnackRejected { .. } => "ConnackRejected",
        ClientError::ConnackTimeout => "ConnackTimeout",
        ClientError::PingTimeout => "PingTimeout",
        ClientError::ServerDisconnect { .. } => "ServerDisconnect",
        ClientError::AckTimeout => "AckTimeout",
        ClientError::Interrupted => "Interrupted",
        ClientError::OfflineQueuePolicy => "OfflineQueuePolicy",
        ClientError::ProtocolViolation { .. } => "ProtocolViolation",
        ClientError::UserInitiatedStop => "UserInitiatedStop",
        ClientError::WebsocketHandshake(_) => "WebsocketHandshake",
        ClientError::ChannelClosed => "ChannelClosed",
    }
}

fn observe(event: &LifecycleEvent) -> Observed {
    match event {
        LifecycleEvent::AttemptingConnect => Observed::AttemptingConnect,
        LifecycleEvent::ConnectionSuccess { connack, settings } => Observed::ConnectionSuccess {
            connack: connack.clone(),
            settings: settings.clone(),
        },
        LifecycleEvent::ConnectionFailure { error, connack } => Observed::ConnectionFailure {
            error: error_kind(error),
            connack: connack.clone(),
        },
        LifecycleEvent::Disconnection { error, disconnect } => Observed::Disconnection {
            error: error_kind(error),
            disconnect: disconnect.clone(),
        },
        LifecycleEvent::Stopped => Observed::Stopped,
    }
}

/// Lifecycle events of one client, in emission order
pub struct Events {
    rx: mpsc::UnboundedReceiver<Observed>,
}

#[allow(dead_code)]
impl Events {
    pub fn attach(client: &Client) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        client.on_lifecycle_event(move |event| {
            let _ = tx.send(observe(event));
        });
        Self { rx }
    }

    pub async fn next(&mut self) -> Observed {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a lifecycle event")
            .expect("lifecycle listener dropped")
    }

    /// Skips events until one named `name` arrives
    pub async fn wait_for(&mut self, name: &str) -> Observed {
        loop {
            let event = self.next().await;
            if event.name() == name {
                return event;
            }
        }
    }

    /// Collects events up to and including the first one named `name`
    pub async fn collect_until(&mut self, name: &str) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            let event = self.next().await;
            names.push(event.name().to_string());
            if event.name() == name {
                return names;
            }
        }
    }

    /// Returns an event only if one is already pending
    pub fn try_next(&mut self) -> Option<Observed> {
        self.rx.try_recv().ok()
    }
}

/// Config aimed at `broker` with short delays
pub fn config() -> ClientConfigBuilder {
    ClientConfig::builder()
        .host("broker.test")
        .port(1883u16)
        .min_reconnect_delay_ms(10u64)
        .max_reconnect_delay_ms(40u64)
        .connack_timeout_ms(2_000u64)
}

pub fn connect_with_id(client_id: &str) -> ConnectPacket {
    ConnectPacket::builder()
        .client_id(client_id)
        .build()
        .unwrap()
}

pub fn client(broker: &MockBroker, config: ClientConfigBuilder) -> Client {
    Client::new(config.build().unwrap(), broker.connector()).unwrap()
}

/// Starts a client and waits for its first successful connection
pub async fn connected(broker: &MockBroker, config: ClientConfigBuilder) -> (Client, Events) {
    let client = client(broker, config);
    let mut events = Events::attach(&client);
    client.start().unwrap();
    events.wait_for("ConnectionSuccess").await;
    (client, events)
}

/// Receiver of every publish the client delivers to listeners
pub fn publishes(client: &Client) -> mpsc::UnboundedReceiver<PublishPacket> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_publish_received(move |publish| {
        let _ = tx.send(publish.clone());
    });
    rx
}

pub async fn next_publish(rx: &mut mpsc::UnboundedReceiver<PublishPacket>) -> PublishPacket {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a publish")
        .expect("publish listener dropped")
}

/// Polls until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_stats(
    client: &Client,
    condition: impl Fn(&OperationStatistics) -> bool,
) -> OperationStatistics {
    wait_until(|| condition(&client.get_stats())).await;
    client.get_stats()
}

