//! End-to-end scenarios over a real loopback publisher/subscriber pair.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use fanio::wire::value::Value;
use fanio::{NoopPublisherHandler, Payload, Publisher, PublisherOptions, Subscriber, SubscriberOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct CollectingHandler {
    tx: mpsc::UnboundedSender<(Payload, String)>,
}

impl fanio::SubscriberHandler for CollectingHandler {
    fn process(&self, payload: Payload, tag: String) {
        let _ = self.tx.send((payload, tag));
    }
}

async fn publisher_on_ephemeral_port(timeout_ack: Option<Duration>) -> Publisher {
    let publisher = Publisher::new(
        0,
        5,
        PublisherOptions {
            timeout_ack,
            handler: Arc::new(NoopPublisherHandler),
            ..Default::default()
        },
    );
    publisher.start().await.expect("publisher should bind");
    publisher
}

fn subscriber(port: u16, name: &str, tx: mpsc::UnboundedSender<(Payload, String)>) -> Subscriber {
    Subscriber::new(
        port,
        name,
        SubscriberOptions {
            connect_wait: Duration::from_millis(50),
            handler: Arc::new(CollectingHandler { tx }),
            ..Default::default()
        },
    )
    .expect("valid subscriber name")
}

async fn wait_connected(sub: &Subscriber) {
    timeout(Duration::from_secs(2), async {
        while !sub.connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber should connect");
}

#[tokio::test]
async fn raw_broadcast_delivers_payload_and_tag_exactly_once() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_secs(1))).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscriber(publisher.port(), "A", tx);
    sub.connect().await;
    wait_connected(&sub).await;

    assert!(publisher.tell_raw(b"hello", Some("t")).await);

    let (payload, tag) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("recv timeout")
        .expect("channel open");
    match payload {
        Payload::Raw(bytes) => assert_eq!(bytes, b"hello"),
        other => panic!("expected Raw payload, got {other:?}"),
    }
    assert_eq!(tag, "t");

    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "handler should have been invoked exactly once"
    );
}

#[tokio::test]
async fn typed_value_roundtrips_through_decoded_payload() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_secs(1))).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscriber(publisher.port(), "A", tx);
    sub.connect().await;
    wait_connected(&sub).await;

    let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    let sent = Value::Map(vec![
        ("n".to_string(), Value::Int(3)),
        ("x".to_string(), Value::Float(1.5)),
        ("ok".to_string(), Value::Bool(true)),
        ("ts".to_string(), Value::DateTime(ts, None)),
    ]);

    assert!(publisher.tell(&sent, None, true).await);

    let (payload, _tag) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("recv timeout")
        .expect("channel open");
    match payload {
        Payload::Decoded(value) => assert_eq!(value, sent),
        other => panic!("expected Decoded payload, got {other:?}"),
    }
}

#[tokio::test]
async fn embedded_end_markers_survive_framing() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_secs(1))).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscriber(publisher.port(), "A", tx);
    sub.connect().await;
    wait_connected(&sub).await;

    assert!(publisher.tell_raw(b"\xac\x96", None).await);
    assert!(publisher.tell_raw(b"\xac\x96\xac\x96", None).await);

    let (first, _) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    let (second, _) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

    match (first, second) {
        (Payload::Raw(a), Payload::Raw(b)) => {
            assert_eq!(a, b"\xac\x96".to_vec());
            assert_eq!(b, b"\xac\x96\xac\x96".to_vec());
        }
        other => panic!("expected two Raw payloads, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_reports_dead_subscriber_and_drops_it_from_the_registry() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_millis(200))).await;
    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();
    let sub_a = subscriber(publisher.port(), "A", tx_a);
    let sub_b = subscriber(publisher.port(), "B", tx_b);
    sub_a.connect().await;
    sub_b.connect().await;
    wait_connected(&sub_a).await;
    wait_connected(&sub_b).await;
    assert_eq!(publisher.nreceivers().await, 2);

    sub_b.close().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = publisher.ping().await;
    assert_eq!(result.get("A").copied().flatten(), Some(true));
    assert_eq!(result.get("B").copied().flatten(), Some(false));
    assert_eq!(publisher.nreceivers().await, 1);
}

#[tokio::test]
async fn ping_leaves_live_subscribers_in_the_registry() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_millis(200))).await;
    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();
    let sub_a = subscriber(publisher.port(), "A", tx_a);
    let sub_b = subscriber(publisher.port(), "B", tx_b);
    sub_a.connect().await;
    sub_b.connect().await;
    wait_connected(&sub_a).await;
    wait_connected(&sub_b).await;
    assert_eq!(publisher.nreceivers().await, 2);

    let result = publisher.ping().await;
    assert_eq!(result.get("A").copied().flatten(), Some(true));
    assert_eq!(result.get("B").copied().flatten(), Some(true));
    assert_eq!(publisher.nreceivers().await, 2);
    let mut names = publisher.receivers().await;
    names.sort();
    assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn duplicate_name_is_refused_while_incumbent_is_alive() {
    let publisher = publisher_on_ephemeral_port(Some(Duration::from_secs(1))).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let incumbent = subscriber(publisher.port(), "A", tx);
    incumbent.connect().await;
    wait_connected(&incumbent).await;

    let mut candidate = TcpStream::connect(("127.0.0.1", publisher.port())).await.unwrap();
    let mut ack = [0u8; 1];
    timeout(Duration::from_secs(1), candidate.read_exact(&mut ack))
        .await
        .expect("initial ack")
        .unwrap();
    candidate.write_all(b"A").await.unwrap();

    let second_ack = timeout(Duration::from_millis(500), candidate.read_exact(&mut ack)).await;
    assert!(second_ack.is_err() || second_ack.unwrap().is_err(), "collision candidate must not be admitted");
    assert_eq!(publisher.nreceivers().await, 1);
}

#[tokio::test]
async fn subscriber_reconnects_after_publisher_restarts_on_the_same_port() {
    let port = 18765;
    let publisher = Publisher::new(port, 5, PublisherOptions::default());
    publisher.start().await.expect("bind");

    let (tx, _rx) = mpsc::unbounded_channel();
    let sub = subscriber(port, "A", tx);
    sub.connect().await;
    wait_connected(&sub).await;

    publisher.close().await;
    timeout(Duration::from_secs(2), async {
        while sub.connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber should notice the drop");

    publisher.start().await.expect("rebind");
    // Subscriber's connect_wait is 50ms; allow generous headroom for
    // scheduling jitter across a couple of reconnect attempts.
    timeout(Duration::from_secs(2), async {
        while !sub.connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber should reconnect");
}
