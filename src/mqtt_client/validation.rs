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

//! Packet validation.
//!
//! Two stages: the `validate_*` functions run synchronously in the API before a
//! request reaches the client task, and [`validate_for_connection`] runs inside
//! the task right before a queued operation is written, against the settings
//! of the connection it is about to use.

use crate::mqtt_client::config::ExtendedValidation;
use crate::mqtt_client::error::ValidationError;
use crate::mqtt_client::negotiate::NegotiatedSettings;
use crate::mqtt_client::packet::{
    ConnectPacket, DisconnectPacket, Packet, PublishPacket, SubscribePacket, UnsubscribePacket,
};

const AWS_MAX_TOPIC_LEN: usize = 256;
const AWS_MAX_TOPIC_SLASHES: usize = 7;
const AWS_MAX_CLIENT_ID_LEN: usize = 128;
const AWS_MAX_SUBSCRIPTIONS: usize = 8;
const AWS_KEEP_ALIVE_RANGE: std::ops::RangeInclusive<u16> = 30..=1200;

const SHARED_PREFIX: &str = "$share/";

pub(crate) fn validate_connect(
    connect: &ConnectPacket,
    mode: ExtendedValidation,
) -> Result<(), ValidationError> {
    if connect.receive_maximum == Some(0) {
        return Err(ValidationError::Zero("receive_maximum"));
    }
    if connect.maximum_packet_size == Some(0) {
        return Err(ValidationError::Zero("maximum_packet_size"));
    }
    if let Some(will) = &connect.will {
        validate_publish(will, mode)?;
    }
    if mode == ExtendedValidation::AwsIotCoreDefaults {
        if let Some(id) = &connect.client_id {
            check_len("client_id", id.len(), AWS_MAX_CLIENT_ID_LEN)?;
        }
        if !AWS_KEEP_ALIVE_RANGE.contains(&connect.keep_alive_interval_sec) {
            return Err(ValidationError::KeepAlive(connect.keep_alive_interval_sec));
        }
    }
    Ok(())
}

pub(crate) fn validate_publish(
    publish: &PublishPacket,
    mode: ExtendedValidation,
) -> Result<(), ValidationError> {
    if publish.topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if !is_valid_topic(&publish.topic) {
        return Err(ValidationError::InvalidTopic(publish.topic.clone()));
    }
    if !publish.subscription_identifiers.is_empty() {
        return Err(ValidationError::SubscriptionIdentifierOnPublish);
    }
    if publish.topic_alias == Some(0) {
        return Err(ValidationError::Zero("topic_alias"));
    }
    if mode == ExtendedValidation::AwsIotCoreDefaults {
        check_aws_topic(&publish.topic)?;
    }
    Ok(())
}

pub(crate) fn validate_subscribe(
    subscribe: &SubscribePacket,
    mode: ExtendedValidation,
) -> Result<(), ValidationError> {
    if subscribe.subscriptions.is_empty() {
        return Err(ValidationError::EmptySubscriptions);
    }
    for subscription in &subscribe.subscriptions {
        if !is_valid_topic_filter(&subscription.topic_filter) {
            return Err(ValidationError::InvalidTopicFilter(
                subscription.topic_filter.clone(),
            ));
        }
    }
    if mode == ExtendedValidation::AwsIotCoreDefaults {
        check_len(
            "subscriptions",
            subscribe.subscriptions.len(),
            AWS_MAX_SUBSCRIPTIONS,
        )?;
        for subscription in &subscribe.subscriptions {
            check_aws_topic(strip_shared_prefix(&subscription.topic_filter))?;
        }
    }
    Ok(())
}

pub(crate) fn validate_unsubscribe(
    unsubscribe: &UnsubscribePacket,
    mode: ExtendedValidation,
) -> Result<(), ValidationError> {
    if unsubscribe.topic_filters.is_empty() {
        return Err(ValidationError::EmptyTopicFilters);
    }
    for filter in &unsubscribe.topic_filters {
        if !is_valid_topic_filter(filter) {
            return Err(ValidationError::InvalidTopicFilter(filter.clone()));
        }
        if mode == ExtendedValidation::AwsIotCoreDefaults {
            check_aws_topic(strip_shared_prefix(filter))?;
        }
    }
    Ok(())
}

pub(crate) fn validate_disconnect(
    disconnect: &DisconnectPacket,
    connect: &ConnectPacket,
) -> Result<(), ValidationError> {
    if !disconnect.reason_code.is_client_sendable() {
        return Err(ValidationError::DisconnectReasonCode(disconnect.reason_code));
    }
    let requested_zero = connect.session_expiry_interval_sec.unwrap_or(0) == 0;
    if requested_zero && disconnect.session_expiry_interval_sec.is_some_and(|v| v > 0) {
        return Err(ValidationError::DisconnectSessionExpiry);
    }
    Ok(())
}

/// Checks an outbound packet against what the server accepted for the current connection.
pub(crate) fn validate_for_connection(
    packet: &Packet,
    settings: &NegotiatedSettings,
) -> Result<(), ValidationError> {
    match packet {
        Packet::Publish(publish) => {
            if publish.qos > settings.maximum_qos() {
                return Err(ValidationError::QosNotSupported {
                    requested: publish.qos,
                    maximum: settings.maximum_qos(),
                });
            }
            if publish.retain && !settings.retain_available() {
                return Err(ValidationError::RetainNotAvailable);
            }
            if let Some(alias) = publish.topic_alias {
                if alias > settings.topic_alias_maximum_to_server() {
                    return Err(ValidationError::TopicAliasOutOfRange {
                        alias,
                        max: settings.topic_alias_maximum_to_server(),
                    });
                }
            }
        }
        Packet::Subscribe(subscribe) => {
            for subscription in &subscribe.subscriptions {
                let filter = subscription.topic_filter.as_str();
                if filter.starts_with(SHARED_PREFIX) && !settings.shared_subscriptions_available() {
                    return Err(ValidationError::SharedSubscriptionsNotAvailable);
                }
                if filter.contains(['+', '#']) && !settings.wildcard_subscriptions_available() {
                    return Err(ValidationError::WildcardSubscriptionsNotAvailable);
                }
            }
            if subscribe.subscription_identifier.is_some()
                && !settings.subscription_identifiers_available()
            {
                return Err(ValidationError::SubscriptionIdentifiersNotAvailable);
            }
        }
        _ => {}
    }
    let size = packet.encoded_len();
    let max = settings.maximum_packet_size_to_server();
    if size > max as usize {
        return Err(ValidationError::PacketTooLarge { size, max });
    }
    Ok(())
}

fn is_valid_topic(topic: &str) -> bool {
    !topic.contains(['+', '#', '\0'])
}

fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let filter = if let Some(rest) = filter.strip_prefix(SHARED_PREFIX) {
        match rest.split_once('/') {
            Some((group, inner)) if !group.is_empty() && !group.contains(['+', '#']) => {
                if inner.is_empty() {
                    return false;
                }
                inner
            }
            _ => return false,
        }
    } else {
        filter
    };
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(i, level)| {
        if level.contains('#') {
            *level == "#" && i == last
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}

fn strip_shared_prefix(filter: &str) -> &str {
    filter
        .strip_prefix(SHARED_PREFIX)
        .and_then(|rest| rest.split_once('/'))
        .map_or(filter, |(_, inner)| inner)
}

fn check_aws_topic(topic: &str) -> Result<(), ValidationError> {
    check_len("topic", topic.len(), AWS_MAX_TOPIC_LEN)?;
    check_len(
        "topic levels",
        topic.matches('/').count(),
        AWS_MAX_TOPIC_SLASHES,
    )
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}
