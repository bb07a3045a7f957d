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
mod common;

use common::MockBroker;
use mqtt5_client_tokio::mqtt_client::packet::{
    ConnackPacket, Packet, PacketType, PubackPacket, PubcompPacket, PublishPacket, PubrecPacket, Qos, SubscribePacket, Subscription,
    UnsubscribePacket,
};
use mqtt5_client_tokio::mqtt_client::OperationStatistics;

fn publish(qos: Qos, payload: &str) -> PublishPacket {
    PublishPacket::builder("metrics/load", qos)
        .payload(payload)
        .build()
        .unwrap()
}

fn size_of(publish: &PublishPacket) -> u64 {
    Packet::from(publish.clone()).encoded_len() as u64
}

#[tokio::test]
async fn queued_operations_count_as_incomplete_only() {
    common::init_tracing();

    let broker = MockBroker::new();
    let client = common::client(&broker, common::config());

    let packets = [
        publish(Qos::AtLeastOnce, "1"),
        publish(Qos::AtLeastOnce, "22"),
        publish(Qos::ExactlyOnce, "333"),
    ];
    let expected_size: u64 = packets.iter().map(size_of).sum();
    let completions: Vec<_> = packets
        .into_iter()
        .map(|p| client.publish(p).unwrap())
        .collect();

    let stats = common::wait_for_stats(&client, |s| s.incomplete_operation_count == 3).await;
    assert_eq!(stats.incomplete_operation_size, expected_size);
    assert_eq!(stats.unacked_operation_count, 0);
    assert_eq!(stats.unacked_operation_size, 0);

    client.start().unwrap();
    for completion in completions {
        assert!(completion.await.is_ok());
    }
    common::wait_for_stats(&client, |s| *s == OperationStatistics::default()).await;
}

#[tokio::test]
async fn written_operations_count_as_unacked_until_acknowledged() {
    common::init_tracing();

    let broker = MockBroker::new();
    broker.behave(|b| b.suppress_acks = true);
    let (client, _events) = common::connected(&broker, common::config()).await;

    let packet = publish(Qos::AtLeastOnce, "payload");
    let size = size_of(&packet);
    let completion = client.publish(packet).unwrap();

    let stats = common::wait_for_stats(&client, |s| s.unacked_operation_count == 1).await;
    assert_eq!(
        stats,
        OperationStatistics {
            incomplete_operation_count: 1,
            incomplete_operation_size: size,
            unacked_operation_count: 1,
            unacked_operation_size: size,
        }
    );

    let packet_id = broker.received_publishes()[0].packet_id;
    broker.inject(Packet::Puback(PubackPacket {
        packet_id,
        ..PubackPacket::default()
    }));
    assert!(completion.await.is_ok());
    common::wait_for_stats(&client, |s| *s == OperationStatistics::default()).await;
}

#[tokio::test]
async fn qos0_publishes_are_never_unacked() {
    common::init_tracing();

    let broker = MockBroker::new();
    broker.behave(|b| b.suppress_acks = true);
    let (client, _events) = common::connected(&broker, common::config()).await;

    client
        .publish(publish(Qos::AtMostOnce, "fire"))
        .unwrap()
        .await
        .unwrap();
    common::wait_for_stats(&client, |s| *s == OperationStatistics::default()).await;
    assert_eq!(broker.received_publishes().len(), 1);
}

#[tokio::test]
async fn receive_maximum_limits_publishes_in_flight() {
    common::init_tracing();

    let broker = MockBroker::new();
    broker.behave(|b| {
        b.suppress_acks = true;
        b.connack = ConnackPacket {
            receive_maximum: Some(2),
            ..ConnackPacket::default()
        };
    });
    let (client, _events) = common::connected(&broker, common::config()).await;

    let completions: Vec<_> = (0..5)
        .map(|i| {
            client
                .publish(publish(Qos::AtLeastOnce, &i.to_string()))
                .unwrap()
        })
        .collect();

    let stats = common::wait_for_stats(&client, |s| {
        s.incomplete_operation_count == 5 && s.unacked_operation_count == 2
    })
    .await;
    assert_eq!(stats.unacked_operation_count, 2);
    assert_eq!(broker.received_publishes().len(), 2);

    // Subscriptions are not subject to the publish window.
    let subscribe = SubscribePacket::builder()
        .subscription(Subscription::new("metrics/#", Qos::AtMostOnce))
        .build()
        .unwrap();
    let _suback = client.subscribe(subscribe).unwrap();
    common::wait_for_stats(&client, |s| s.unacked_operation_count == 3).await;

    let first = broker.received_publishes()[0].packet_id;
    broker.inject(Packet::Puback(PubackPacket {
        packet_id: first,
        ..PubackPacket::default()
    }));
    common::wait_until(|| broker.received_publishes().len() == 3).await;
    let stats = common::wait_for_stats(&client, |s| s.incomplete_operation_count == 5).await;
    assert_eq!(stats.unacked_operation_count, 3);

    broker.behave(|b| b.suppress_acks = false);
    for publish in broker.received_publishes().into_iter().skip(1) {
        broker.inject(Packet::Puback(PubackPacket {
            packet_id: publish.packet_id,
            ..PubackPacket::default()
        }));
    }
    for completion in completions {
        assert!(completion.await.is_ok());
    }
    assert_eq!(broker.received_publishes().len(), 5);
}

#[tokio::test]
async fn released_qos2_publish_is_counted_once_across_reconnect() {
    common::init_tracing();

    let broker = MockBroker::new();
    broker.behave(|b| b.suppress_acks = true);
    let (client, mut events) = common::connected(&broker, common::config()).await;

    let packets = [publish(Qos::ExactlyOnce, "1"), publish(Qos::ExactlyOnce, "22")];
    let second_size = size_of(&packets[1]);
    let completions: Vec<_> = packets
        .into_iter()
        .map(|p| client.publish(p).unwrap())
        .collect();
    common::wait_for_stats(&client, |s| s.unacked_operation_count == 2).await;

    // first publish moves on to PUBREL, whose PUBCOMP is withheld
    let first = broker.received_publishes()[0].packet_id;
    let second = broker.received_publishes()[1].packet_id;
    broker.inject(Packet::Pubrec(PubrecPacket {
        packet_id: first,
        ..PubrecPacket::default()
    }));
    common::wait_until(|| broker.received_count(PacketType::Pubrel) == 1).await;

    broker.behave(|b| b.fail_connects = usize::MAX);
    broker.drop_connections();
    events.wait_for("Disconnection").await;
    let stats = common::wait_for_stats(&client, |s| s.unacked_operation_count == 0).await;
    assert_eq!(stats.incomplete_operation_count, 2);
    assert_eq!(stats.unacked_operation_size, 0);

    broker.behave(|b| {
        b.fail_connects = 0;
        b.force_session_present = true;
    });
    events.wait_for("ConnectionSuccess").await;
    common::wait_until(|| broker.received_count(PacketType::Pubrel) == 2).await;
    let stats = common::wait_for_stats(&client, |s| s.unacked_operation_count == 2).await;
    assert_eq!(stats.incomplete_operation_count, 2);

    broker.inject(Packet::Pubcomp(PubcompPacket {
        packet_id: first,
        ..PubcompPacket::default()
    }));
    let stats = common::wait_for_stats(&client, |s| s.incomplete_operation_count == 1).await;
    assert_eq!(
        stats,
        OperationStatistics {
            incomplete_operation_count: 1,
            incomplete_operation_size: second_size,
            unacked_operation_count: 1,
            unacked_operation_size: second_size,
        }
    );

    broker.behave(|b| b.suppress_acks = false);
    broker.inject(Packet::Pubrec(PubrecPacket {
        packet_id: second,
        ..PubrecPacket::default()
    }));
    for completion in completions {
        assert!(completion.await.is_ok());
    }
    common::wait_for_stats(&client, |s| *s == OperationStatistics::default()).await;
}

#[tokio::test]
async fn stop_clears_statistics() {
    common::init_tracing();

    let broker = MockBroker::new();
    broker.behave(|b| b.suppress_acks = true);
    let (client, mut events) = common::connected(&broker, common::config()).await;

    let _publish = client.publish(publish(Qos::AtLeastOnce, "x")).unwrap();
    let _unsubscribe = client
        .unsubscribe(UnsubscribePacket::new(["metrics/#"]))
        .unwrap();
    common::wait_for_stats(&client, |s| s.unacked_operation_count == 2).await;

    client.stop(None).unwrap();
    events.wait_for("Stopped").await;
    common::wait_for_stats(&client, |s| *s == OperationStatistics::default()).await;
}
