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

//! Typed MQTT v5.0 control packets.
//!
//! The client engine never touches bytes; it hands these structs to a
//! [`PacketTransport`](crate::mqtt_client::transport::PacketTransport) which owns the codec.
//! Builders for the packets an application constructs narrow `i64` inputs into the
//! protocol field widths and reject anything that does not fit.

mod connect;
mod disconnect;
mod publish;
pub mod reason_code;
mod subscribe;

pub use connect::{ConnackPacket, ConnectPacket, ConnectPacketBuilder};
pub use disconnect::{DisconnectPacket, DisconnectPacketBuilder};
pub use publish::{
    PayloadFormatIndicator, PubackPacket, PubcompPacket, PublishPacket, PublishPacketBuilder,
    PubrecPacket, PubrelPacket,
};
pub use reason_code::{
    ConnectReasonCode, DisconnectReasonCode, PubackReasonCode, PubrelReasonCode,
    SubackReasonCode, UnsubackReasonCode,
};
pub use subscribe::{
    RetainHandling, SubackPacket, SubscribePacket, SubscribePacketBuilder, Subscription,
    UnsubackPacket, UnsubscribePacket,
};

use crate::mqtt_client::error::ValidationError;

/// Quality of service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Qos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for Qos {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(other),
        }
    }
}

/// A single MQTT v5.0 user property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProperty {
    pub name: String,
    pub value: String,
}

impl UserProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Control packet type, used in logs and protocol-violation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Connack,
    Publish,
    Puback,
    Pubrec,
    Pubrel,
    Pubcomp,
    Subscribe,
    Suback,
    Unsubscribe,
    Unsuback,
    Pingreq,
    Pingresp,
    Disconnect,
}

/// Any control packet exchanged with the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Puback(PubackPacket),
    Pubrec(PubrecPacket),
    Pubrel(PubrelPacket),
    Pubcomp(PubcompPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubackPacket),
    Pingreq,
    Pingresp,
    Disconnect(DisconnectPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback(_) => PacketType::Puback,
            Packet::Pubrec(_) => PacketType::Pubrec,
            Packet::Pubrel(_) => PacketType::Pubrel,
            Packet::Pubcomp(_) => PacketType::Pubcomp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Suback(_) => PacketType::Suback,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Unsuback(_) => PacketType::Unsuback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// Estimated size of the packet on the wire, fixed header included.
    pub fn encoded_len(&self) -> usize {
        let remaining = match self {
            Packet::Connect(p) => p.remaining_len(),
            Packet::Connack(p) => p.remaining_len(),
            Packet::Publish(p) => p.remaining_len(),
            Packet::Puback(p) => ack_len(p.reason_string.as_deref(), &p.user_properties),
            Packet::Pubrec(p) => ack_len(p.reason_string.as_deref(), &p.user_properties),
            Packet::Pubrel(_) | Packet::Pubcomp(_) => 3,
            Packet::Subscribe(p) => p.remaining_len(),
            Packet::Suback(p) => {
                2 + with_len_prefix(opt_str_prop(p.reason_string.as_deref()) + user_props_len(&p.user_properties))
                    + p.reason_codes.len()
            }
            Packet::Unsubscribe(p) => p.remaining_len(),
            Packet::Unsuback(p) => {
                2 + with_len_prefix(opt_str_prop(p.reason_string.as_deref()) + user_props_len(&p.user_properties))
                    + p.reason_codes.len()
            }
            Packet::Pingreq | Packet::Pingresp => 0,
            Packet::Disconnect(p) => p.remaining_len(),
        };
        1 + vbi_len(remaining) + remaining
    }
}

impl From<PublishPacket> for Packet {
    fn from(p: PublishPacket) -> Self {
        Packet::Publish(p)
    }
}

impl From<SubscribePacket> for Packet {
    fn from(p: SubscribePacket) -> Self {
        Packet::Subscribe(p)
    }
}

impl From<UnsubscribePacket> for Packet {
    fn from(p: UnsubscribePacket) -> Self {
        Packet::Unsubscribe(p)
    }
}

impl From<DisconnectPacket> for Packet {
    fn from(p: DisconnectPacket) -> Self {
        Packet::Disconnect(p)
    }
}

pub(crate) fn narrow_u16(field: &'static str, value: i64) -> Result<u16, ValidationError> {
    u16::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value,
        max: u64::from(u16::MAX),
    })
}

pub(crate) fn narrow_u32(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value,
        max: u64::from(u32::MAX),
    })
}

// Wire size helpers shared by the packet modules.

pub(crate) fn vbi_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

pub(crate) fn str_len(s: &str) -> usize {
    2 + s.len()
}

pub(crate) fn opt_str_prop(s: Option<&str>) -> usize {
    s.map_or(0, |s| 1 + str_len(s))
}

pub(crate) fn opt_bin_prop(b: Option<&[u8]>) -> usize {
    b.map_or(0, |b| 1 + 2 + b.len())
}

pub(crate) fn opt_u32_prop(v: Option<u32>) -> usize {
    v.map_or(0, |_| 5)
}

pub(crate) fn opt_u16_prop(v: Option<u16>) -> usize {
    v.map_or(0, |_| 3)
}

pub(crate) fn opt_u8_prop<T>(v: Option<T>) -> usize {
    v.map_or(0, |_| 2)
}

pub(crate) fn user_props_len(props: &[UserProperty]) -> usize {
    props
        .iter()
        .map(|p| 1 + str_len(&p.name) + str_len(&p.value))
        .sum()
}

pub(crate) fn with_len_prefix(props: usize) -> usize {
    vbi_len(props) + props
}

fn ack_len(reason_string: Option<&str>, user_properties: &[UserProperty]) -> usize {
    2 + 1 + with_len_prefix(opt_str_prop(reason_string) + user_props_len(user_properties))
}
