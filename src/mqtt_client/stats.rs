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

//! Operation statistics.

use tokio::sync::watch;

/// Point-in-time view of the operations a client is holding.
///
/// *Incomplete* operations are everything accepted and not yet resolved,
/// queued ones included. *Unacked* operations are the subset that has been
/// written and is waiting for the server's acknowledgement. Sizes are the
/// estimated encoded packet sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationStatistics {
    pub incomplete_operation_count: u64,
    pub incomplete_operation_size: u64,
    pub unacked_operation_count: u64,
    pub unacked_operation_size: u64,
}

/// Incrementally maintained statistics, published through a watch channel so
/// readers never wait on the client task.
#[derive(Debug)]
pub(crate) struct StatisticsAggregator {
    current: OperationStatistics,
    tx: watch::Sender<OperationStatistics>,
}

impl StatisticsAggregator {
    pub(crate) fn new() -> (Self, watch::Receiver<OperationStatistics>) {
        let (tx, rx) = watch::channel(OperationStatistics::default());
        (
            Self {
                current: OperationStatistics::default(),
                tx,
            },
            rx,
        )
    }

    pub(crate) fn on_incomplete_added(&mut self, size: usize) {
        self.current.incomplete_operation_count += 1;
        self.current.incomplete_operation_size += size as u64;
    }

    pub(crate) fn on_incomplete_removed(&mut self, size: usize) {
        self.current.incomplete_operation_count =
            self.current.incomplete_operation_count.saturating_sub(1);
        self.current.incomplete_operation_size = self
            .current
            .incomplete_operation_size
            .saturating_sub(size as u64);
    }

    pub(crate) fn on_unacked_added(&mut self, size: usize) {
        self.current.unacked_operation_count += 1;
        self.current.unacked_operation_size += size as u64;
    }

    pub(crate) fn on_unacked_removed(&mut self, size: usize) {
        self.current.unacked_operation_count =
            self.current.unacked_operation_count.saturating_sub(1);
        self.current.unacked_operation_size = self
            .current
            .unacked_operation_size
            .saturating_sub(size as u64);
    }

    /// Makes the accumulated changes visible to readers as one snapshot.
    pub(crate) fn publish(&self) {
        self.tx.send_replace(self.current);
    }
}
