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
    str_len, user_props_len, vbi_len, with_len_prefix, PubackReasonCode, PubrelReasonCode, Qos,
    UserProperty,
};

/// Payload format indicator property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormatIndicator {
    Bytes,
    Utf8,
}

/// PUBLISH packet, in either direction.
///
/// `packet_id` and `dup` are assigned by the client when the packet is sent;
/// values set by the application are overwritten.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishPacket {
    pub packet_id: u16,
    pub dup: bool,
    pub topic: String,
    pub qos: Qos,
    pub retain: bool,
    pub payload: Vec<u8>,
    pub payload_format_indicator: Option<PayloadFormatIndicator>,
    pub message_expiry_interval_sec: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub subscription_identifiers: Vec<u32>,
    pub content_type: Option<String>,
    pub user_properties: Vec<UserProperty>,
}

impl PublishPacket {
    pub fn builder(topic: impl Into<String>, qos: Qos) -> PublishPacketBuilder {
        PublishPacketBuilder {
            topic: topic.into(),
            qos,
            ..PublishPacketBuilder::default()
        }
    }

    pub(crate) fn remaining_len(&self) -> usize {
        let props = opt_u8_prop(self.payload_format_indicator)
            + opt_u32_prop(self.message_expiry_interval_sec)
            + opt_u16_prop(self.topic_alias)
            + opt_str_prop(self.response_topic.as_deref())
            + opt_bin_prop(self.correlation_data.as_deref())
            + self
                .subscription_identifiers
                .iter()
                .map(|id| 1 + vbi_len(*id as usize))
                .sum::<usize>()
            + opt_str_prop(self.content_type.as_deref())
            + user_props_len(&self.user_properties);
        let packet_id = if self.qos == Qos::AtMostOnce { 0 } else { 2 };
        str_len(&self.topic) + packet_id + with_len_prefix(props) + self.payload.len()
    }
}

/// Builder for [`PublishPacket`].
#[derive(Debug, Default)]
pub struct PublishPacketBuilder {
    topic: String,
    qos: Qos,
    retain: bool,
    payload: Vec<u8>,
    payload_format_indicator: Option<PayloadFormatIndicator>,
    message_expiry_interval_sec: Option<i64>,
    topic_alias: Option<i64>,
    response_topic: Option<String>,
    correlation_data: Option<Vec<u8>>,
    content_type: Option<String>,
    user_properties: Vec<UserProperty>,
}

impl PublishPacketBuilder {
    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn payload_format_indicator(mut self, value: PayloadFormatIndicator) -> Self {
        self.payload_format_indicator = Some(value);
        self
    }

    pub fn message_expiry_interval_sec(mut self, value: i64) -> Self {
        self.message_expiry_interval_sec = Some(value);
        self
    }

    pub fn topic_alias(mut self, value: i64) -> Self {
        self.topic_alias = Some(value);
        self
    }

    pub fn response_topic(mut self, topic: impl Into<String>) -> Self {
        self.response_topic = Some(topic.into());
        self
    }

    pub fn correlation_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.correlation_data = Some(data.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.push(UserProperty::new(name, value));
        self
    }

    pub fn build(self) -> Result<PublishPacket, ValidationError> {
        Ok(PublishPacket {
            packet_id: 0,
            dup: false,
            topic: self.topic,
            qos: self.qos,
            retain: self.retain,
            payload: self.payload,
            payload_format_indicator: self.payload_format_indicator,
            message_expiry_interval_sec: self
                .message_expiry_interval_sec
                .map(|v| narrow_u32("message_expiry_interval_sec", v))
                .transpose()?,
            topic_alias: self
                .topic_alias
                .map(|v| narrow_u16("topic_alias", v))
                .transpose()?,
            response_topic: self.response_topic,
            correlation_data: self.correlation_data,
            subscription_identifiers: Vec::new(),
            content_type: self.content_type,
            user_properties: self.user_properties,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PubackPacket {
    pub packet_id: u16,
    pub reason_code: PubackReasonCode,
    pub reason_string: Option<String>,
    pub user_properties: Vec<UserProperty>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PubrecPacket {
    pub packet_id: u16,
    pub reason_code: PubackReasonCode,
    pub reason_string: Option<String>,
    pub user_properties: Vec<UserProperty>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PubrelPacket {
    pub packet_id: u16,
    pub reason_code: PubrelReasonCode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PubcompPacket {
    pub packet_id: u16,
    pub reason_code: PubrelReasonCode,
}
