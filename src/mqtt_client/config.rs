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

use crate::mqtt_client::packet::ConnectPacket;
use crate::mqtt_client::transport::{HttpProxyOptions, TlsOptions};
use crate::mqtt_client::websocket::WebsocketOptions;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};

/// How `clean_start` is chosen for each CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionBehavior {
    /// Always start a clean session.
    Clean,
    /// Clean session until the first successful connection, then rejoin.
    #[default]
    RejoinPostSuccess,
    /// Always attempt to rejoin an existing session.
    RejoinAlways,
}

/// What happens to operations while the client is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfflineQueueBehavior {
    /// Keep everything except QoS 0 publishes.
    #[default]
    FailQos0PublishOnDisconnect,
    /// Keep only QoS 1 and QoS 2 publishes.
    FailNonQos1PublishOnDisconnect,
    /// Keep nothing.
    FailAllOnDisconnect,
}

/// Randomization applied to the reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    None,
    #[default]
    Full,
    Decorrelated,
}

/// Additional client-side limits checked on top of the protocol rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedValidation {
    #[default]
    None,
    AwsIotCoreDefaults,
}

/// MQTT Client Configuration
///
/// Immutable once handed to [`Client::new`](crate::mqtt_client::Client::new).
/// Only `host` and `port` are required; every other field has a default.
///
/// # Usage
///
/// ```ignore
/// use mqtt5_client_tokio::mqtt_client::{ClientConfig, JitterMode, SessionBehavior};
///
/// let config = ClientConfig::builder()
///     .host("broker.example.com")
///     .port(1883u16)
///     .session_behavior(SessionBehavior::RejoinAlways)
///     .retry_jitter_mode(JitterMode::Decorrelated)
///     .ack_timeout_sec(30u64)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, Getters, CopyGetters)]
#[builder(
    derive(Debug),
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct ClientConfig {
    /// Broker host name.
    #[getset(get = "pub")]
    host: String,

    /// Broker port.
    #[getset(get_copy = "pub")]
    port: u16,

    /// CONNECT sent on every attempt.
    ///
    /// `clean_start` is overwritten according to `session_behavior`, and the
    /// client id is replaced by a server-assigned one once the server hands
    /// one out.
    ///
    /// # Default
    /// An empty CONNECT: server-assigned client id, keep alive disabled.
    #[builder(default)]
    #[getset(get = "pub")]
    connect: ConnectPacket,

    /// # Default
    /// [`SessionBehavior::RejoinPostSuccess`]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    session_behavior: SessionBehavior,

    /// # Default
    /// [`OfflineQueueBehavior::FailQos0PublishOnDisconnect`]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    offline_queue_behavior: OfflineQueueBehavior,

    /// # Default
    /// [`JitterMode::Full`]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    retry_jitter_mode: JitterMode,

    /// Lower bound of the reconnect delay in milliseconds.
    ///
    /// # Default
    /// 1000
    #[builder(default = "1000")]
    #[getset(get_copy = "pub")]
    min_reconnect_delay_ms: u64,

    /// Upper bound of the reconnect delay in milliseconds.
    ///
    /// # Default
    /// 120000
    #[builder(default = "120_000")]
    #[getset(get_copy = "pub")]
    max_reconnect_delay_ms: u64,

    /// A connection that stays up at least this long resets the reconnect
    /// delay to its minimum.
    ///
    /// # Default
    /// 30000
    #[builder(default = "30_000")]
    #[getset(get_copy = "pub")]
    min_connected_time_to_reset_reconnect_delay_ms: u64,

    /// Time allowed for the connector to open the transport.
    ///
    /// # Default
    /// 10000
    #[builder(default = "10_000")]
    #[getset(get_copy = "pub")]
    connect_timeout_ms: u64,

    /// Time allowed between sending CONNECT and receiving CONNACK.
    ///
    /// # Default
    /// 20000
    #[builder(default = "20_000")]
    #[getset(get_copy = "pub")]
    connack_timeout_ms: u64,

    /// Time allowed between sending PINGREQ and receiving PINGRESP.
    ///
    /// # Default
    /// 30000
    #[builder(default = "30_000")]
    #[getset(get_copy = "pub")]
    ping_timeout_ms: u64,

    /// Time an operation may wait for its acknowledgement. 0 disables it.
    ///
    /// # Default
    /// 0 (disabled)
    #[builder(default = "0")]
    #[getset(get_copy = "pub")]
    ack_timeout_sec: u64,

    /// Time allowed for a transport to shut down.
    ///
    /// # Default
    /// 5000
    #[builder(default = "5_000")]
    #[getset(get_copy = "pub")]
    shutdown_timeout_ms: u64,

    /// # Default
    /// [`ExtendedValidation::None`]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    extended_validation: ExtendedValidation,

    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    tls: Option<TlsOptions>,

    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    http_proxy: Option<HttpProxyOptions>,

    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    websocket: Option<WebsocketOptions>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

impl ClientConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.host.as_deref().is_some_and(str::is_empty) {
            return Err("host must not be empty".to_string());
        }
        let min = self.min_reconnect_delay_ms.unwrap_or(1000);
        let max = self.max_reconnect_delay_ms.unwrap_or(120_000);
        if min > max {
            return Err(format!(
                "min_reconnect_delay_ms ({min}) exceeds max_reconnect_delay_ms ({max})"
            ));
        }
        if self.connack_timeout_ms == Some(0) {
            return Err("connack_timeout_ms must not be zero".to_string());
        }
        Ok(())
    }
}
