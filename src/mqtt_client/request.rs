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

use crate::mqtt_client::error::ClientError;
use crate::mqtt_client::event::PublishOutcome;
use crate::mqtt_client::packet::{
    DisconnectPacket, PublishPacket, SubackPacket, SubscribePacket, UnsubackPacket,
    UnsubscribePacket,
};
use tokio::sync::oneshot;

/// API calls forwarded to the client task.
pub(crate) enum Request {
    Start,
    Stop {
        disconnect: Option<DisconnectPacket>,
    },
    Publish {
        packet: PublishPacket,
        response_tx: oneshot::Sender<Result<PublishOutcome, ClientError>>,
    },
    Subscribe {
        packet: SubscribePacket,
        response_tx: oneshot::Sender<Result<SubackPacket, ClientError>>,
    },
    Unsubscribe {
        packet: UnsubscribePacket,
        response_tx: oneshot::Sender<Result<UnsubackPacket, ClientError>>,
    },
}
