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

use crate::mqtt_client::error::ValidationError;
use crate::mqtt_client::packet::{
    narrow_u16, narrow_u32, opt_bin_prop, opt_str_prop, opt_u16_prop, opt_u32_prop, opt_u8_prop,
    str_len, user_props_len, with_len_prefix, ConnectReasonCode, PublishPacket, Qos,
    UserProperty,
};

/// CONNECT packet.
///
/// `clean_start` is owned by the client: it is recomputed from the configured
/// session behavior before every connection attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectPacket {
    pub client_id: Option<String>,
    pub keep_alive_interval_sec: u16,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub session_expiry_interval_sec: Option<u32>,
    pub request_response_information: Option<bool>,
    pub request_problem_information: Option<bool>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    pub will_delay_interval_sec: Option<u32>,
    pub will: Option<PublishPacket>,
    pub user_properties: Vec<UserProperty>,
}

impl ConnectPacket {
    pub fn builder() -> ConnectPacketBuilder {
        ConnectPacketBuilder::default()
    }

    pub(crate) fn remaining_len(&self) -> usize {
        let props = opt_u32_prop(self.session_expiry_interval_sec)
            + opt_u16_prop(self.receive_maximum)
            + opt_u32_prop(self.maximum_packet_size)
            + opt_u16_prop(self.topic_alias_maximum)
            + opt_u8_prop(self.request_response_information)
            + opt_u8_prop(self.request_problem_information)
            + user_props_len(&self.user_properties);
        let mut payload = str_len(self.client_id.as_deref().unwrap_or(""));
        if let Some(will) = &self.will {
            let will_props = opt_u32_prop(self.will_delay_interval_sec)
                + opt_u8_prop(will.payload_format_indicator)
                + opt_u32_prop(will.message_expiry_interval_sec)
                + opt_str_prop(will.content_type.as_deref())
                + opt_str_prop(will.response_topic.as_deref())
                + opt_bin_prop(will.correlation_data.as_deref())
                + user_props_len(&will.user_properties);
            payload += with_len_prefix(will_props) + str_len(&will.topic) + 2 + will.payload.len();
        }
        if let Some(username) = &self.username {
            payload += str_len(username);
        }
        if let Some(password) = &self.password {
            payload += 2 + password.len();
        }
        // protocol name, level, flags and keep alive
        10 + with_len_prefix(props) + payload
    }
}

/// Builder for [`ConnectPacket`].
///
/// Numeric setters take `i64` so that out-of-range input is reported as a
/// [`ValidationError`] by [`build`](Self::build) instead of silently wrapping.
#[derive(Debug, Default)]
pub struct ConnectPacketBuilder {
    client_id: Option<String>,
    keep_alive_interval_sec: Option<i64>,
    username: Option<String>,
    password: Option<Vec<u8>>,
    session_expiry_interval_sec: Option<i64>,
    request_response_information: Option<bool>,
    request_problem_information: Option<bool>,
    receive_maximum: Option<i64>,
    maximum_packet_size: Option<i64>,
    topic_alias_maximum: Option<i64>,
    will_delay_interval_sec: Option<i64>,
    will: Option<PublishPacket>,
    user_properties: Vec<UserProperty>,
}

impl ConnectPacketBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn keep_alive_interval_sec(mut self, value: i64) -> Self {
        self.keep_alive_interval_sec = Some(value);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn session_expiry_interval_sec(mut self, value: i64) -> Self {
        self.session_expiry_interval_sec = Some(value);
        self
    }

    pub fn request_response_information(mut self, value: bool) -> Self {
        self.request_response_information = Some(value);
        self
    }

    pub fn request_problem_information(mut self, value: bool) -> Self {
        self.request_problem_information = Some(value);
        self
    }

    pub fn receive_maximum(mut self, value: i64) -> Self {
        self.receive_maximum = Some(value);
        self
    }

    pub fn maximum_packet_size(mut self, value: i64) -> Self {
        self.maximum_packet_size = Some(value);
        self
    }

    pub fn topic_alias_maximum(mut self, value: i64) -> Self {
        self.topic_alias_maximum = Some(value);
        self
    }

    pub fn will_delay_interval_sec(mut self, value: i64) -> Self {
        self.will_delay_interval_sec = Some(value);
        self
    }

    pub fn will(mut self, will: PublishPacket) -> Self {
        self.will = Some(will);
        self
    }

    pub fn user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.push(UserProperty::new(name, value));
        self
    }

    pub fn build(self) -> Result<ConnectPacket, ValidationError> {
        let receive_maximum = self
            .receive_maximum
            .map(|v| narrow_u16("receive_maximum", v))
            .transpose()?;
        if receive_maximum == Some(0) {
            return Err(ValidationError::Zero("receive_maximum"));
        }
        let maximum_packet_size = self
            .maximum_packet_size
            .map(|v| narrow_u32("maximum_packet_size", v))
            .transpose()?;
        if maximum_packet_size == Some(0) {
            return Err(ValidationError::Zero("maximum_packet_size"));
        }
        Ok(ConnectPacket {
            client_id: self.client_id,
            keep_alive_interval_sec: self
                .keep_alive_interval_sec
                .map(|v| narrow_u16("keep_alive_interval_sec", v))
                .transpose()?
                .unwrap_or(0),
            clean_start: true,
            username: self.username,
            password: self.password,
            session_expiry_interval_sec: self
                .session_expiry_interval_sec
                .map(|v| narrow_u32("session_expiry_interval_sec", v))
                .transpose()?,
            request_response_information: self.request_response_information,
            request_problem_information: self.request_problem_information,
            receive_maximum,
            maximum_packet_size,
            topic_alias_maximum: self
                .topic_alias_maximum
                .map(|v| narrow_u16("topic_alias_maximum", v))
                .transpose()?,
            will_delay_interval_sec: self
                .will_delay_interval_sec
                .map(|v| narrow_u32("will_delay_interval_sec", v))
                .transpose()?,
            will: self.will,
            user_properties: self.user_properties,
        })
    }
}

/// CONNACK packet, as decoded from the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnackPacket {
    pub session_present: bool,
    pub reason_code: ConnectReasonCode,
    pub session_expiry_interval_sec: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_qos: Option<Qos>,
    pub retain_available: Option<bool>,
    pub maximum_packet_size: Option<u32>,
    pub assigned_client_identifier: Option<String>,
    pub topic_alias_maximum: Option<u16>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<UserProperty>,
    pub wildcard_subscriptions_available: Option<bool>,
    pub subscription_identifiers_available: Option<bool>,
    pub shared_subscriptions_available: Option<bool>,
    pub server_keep_alive_sec: Option<u16>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
}

impl ConnackPacket {
    pub(crate) fn remaining_len(&self) -> usize {
        let props = opt_u32_prop(self.session_expiry_interval_sec)
            + opt_u16_prop(self.receive_maximum)
            + opt_u8_prop(self.maximum_qos)
            + opt_u8_prop(self.retain_available)
            + opt_u32_prop(self.maximum_packet_size)
            + opt_str_prop(self.assigned_client_identifier.as_deref())
            + opt_u16_prop(self.topic_alias_maximum)
            + opt_str_prop(self.reason_string.as_deref())
            + user_props_len(&self.user_properties)
            + opt_u8_prop(self.wildcard_subscriptions_available)
            + opt_u8_prop(self.subscription_identifiers_available)
            + opt_u8_prop(self.shared_subscriptions_available)
            + opt_u16_prop(self.server_keep_alive_sec)
            + opt_str_prop(self.response_information.as_deref())
            + opt_str_prop(self.server_reference.as_deref());
        2 + with_len_prefix(props)
    }
}
