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
    str_len, user_props_len, vbi_len, with_len_prefix, Qos, SubackReasonCode,
    UnsubackReasonCode, UserProperty,
};

/// Largest value a variable byte integer property can carry.
pub(crate) const MAX_SUBSCRIPTION_IDENTIFIER: i64 = 268_435_455;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetainHandling {
    #[default]
    SendOnSubscribe,
    SendOnSubscribeIfNew,
    DontSend,
}

/// One topic filter entry of a SUBSCRIBE.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub topic_filter: String,
    pub qos: Qos,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl Subscription {
    pub fn new(topic_filter: impl Into<String>, qos: Qos) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
    pub subscription_identifier: Option<u32>,
    pub user_properties: Vec<UserProperty>,
}

impl SubscribePacket {
    pub fn builder() -> SubscribePacketBuilder {
        SubscribePacketBuilder::default()
    }

    pub(crate) fn remaining_len(&self) -> usize {
        let props = self
            .subscription_identifier
            .map_or(0, |id| 1 + vbi_len(id as usize))
            + user_props_len(&self.user_properties);
        let payload: usize = self
            .subscriptions
            .iter()
            .map(|s| str_len(&s.topic_filter) + 1)
            .sum();
        2 + with_len_prefix(props) + payload
    }
}

/// Builder for [`SubscribePacket`].
#[derive(Debug, Default)]
pub struct SubscribePacketBuilder {
    subscriptions: Vec<Subscription>,
    subscription_identifier: Option<i64>,
    user_properties: Vec<UserProperty>,
}

impl SubscribePacketBuilder {
    pub fn subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn subscription_identifier(mut self, value: i64) -> Self {
        self.subscription_identifier = Some(value);
        self
    }

    pub fn user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.push(UserProperty::new(name, value));
        self
    }

    pub fn build(self) -> Result<SubscribePacket, ValidationError> {
        let subscription_identifier = match self.subscription_identifier {
            Some(v) if !(1..=MAX_SUBSCRIPTION_IDENTIFIER).contains(&v) => {
                return Err(ValidationError::OutOfRange {
                    field: "subscription_identifier",
                    value: v,
                    max: MAX_SUBSCRIPTION_IDENTIFIER as u64,
                });
            }
            Some(v) => Some(v as u32),
            None => None,
        };
        Ok(SubscribePacket {
            packet_id: 0,
            subscriptions: self.subscriptions,
            subscription_identifier,
            user_properties: self.user_properties,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubackPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<SubackReasonCode>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<UserProperty>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
    pub user_properties: Vec<UserProperty>,
}

impl UnsubscribePacket {
    pub fn new<I, S>(topic_filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packet_id: 0,
            topic_filters: topic_filters.into_iter().map(Into::into).collect(),
            user_properties: Vec::new(),
        }
    }

    pub(crate) fn remaining_len(&self) -> usize {
        let payload: usize = self.topic_filters.iter().map(|f| str_len(f)).sum();
        2 + with_len_prefix(user_props_len(&self.user_properties)) + payload
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnsubackPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<UnsubackReasonCode>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<UserProperty>,
}
