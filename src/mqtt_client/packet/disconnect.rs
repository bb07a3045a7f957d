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
    narrow_u32, opt_str_prop, opt_u32_prop, user_props_len, with_len_prefix, DisconnectReasonCode,
    UserProperty,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisconnectPacket {
    pub reason_code: DisconnectReasonCode,
    pub session_expiry_interval_sec: Option<u32>,
    pub reason_string: Option<String>,
    pub server_reference: Option<String>,
    pub user_properties: Vec<UserProperty>,
}

impl DisconnectPacket {
    pub fn builder() -> DisconnectPacketBuilder {
        DisconnectPacketBuilder::default()
    }

    pub(crate) fn remaining_len(&self) -> usize {
        let props = opt_u32_prop(self.session_expiry_interval_sec)
            + opt_str_prop(self.reason_string.as_deref())
            + opt_str_prop(self.server_reference.as_deref())
            + user_props_len(&self.user_properties);
        1 + with_len_prefix(props)
    }
}

/// Builder for [`DisconnectPacket`].
#[derive(Debug, Default)]
pub struct DisconnectPacketBuilder {
    reason_code: DisconnectReasonCode,
    session_expiry_interval_sec: Option<i64>,
    reason_string: Option<String>,
    user_properties: Vec<UserProperty>,
}

impl DisconnectPacketBuilder {
    pub fn reason_code(mut self, reason_code: DisconnectReasonCode) -> Self {
        self.reason_code = reason_code;
        self
    }

    pub fn session_expiry_interval_sec(mut self, value: i64) -> Self {
        self.session_expiry_interval_sec = Some(value);
        self
    }

    pub fn reason_string(mut self, reason: impl Into<String>) -> Self {
        self.reason_string = Some(reason.into());
        self
    }

    pub fn user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.push(UserProperty::new(name, value));
        self
    }

    pub fn build(self) -> Result<DisconnectPacket, ValidationError> {
        Ok(DisconnectPacket {
            reason_code: self.reason_code,
            session_expiry_interval_sec: self
                .session_expiry_interval_sec
                .map(|v| narrow_u32("session_expiry_interval_sec", v))
                .transpose()?,
            reason_string: self.reason_string,
            server_reference: None,
            user_properties: self.user_properties,
        })
    }
}
