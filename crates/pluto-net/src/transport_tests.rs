use super::*;
use crate::codec::MessageWriter;
use tokio::io::AsyncWriteExt;

fn packet(token: u8, value: u32) -> Packet {
    let mut writer = MessageWriter::new(token);
    writer.u32(value).string("payload");
    writer.finish().unwrap()
}

fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Polls the server side until an event matching `pred` shows up.
async fn server_until(t: &mut Transport, pred: impl Fn(&NetEvent) -> bool) -> Vec<NetEvent> {
    let mut seen = Vec::new();
    for _ in 0..400 {
        seen.extend(t.poll_server());
        if seen.iter().any(&pred) {
            return seen;
        }
        settle().await;
    }
    panic!("server never saw the expected event; saw {seen:?}");
}

/// Polls the client side until an event matching `pred` shows up.
async fn client_until(t: &mut Transport, pred: impl Fn(&NetEvent) -> bool) -> Vec<NetEvent> {
    let mut seen = Vec::new();
    for _ in 0..400 {
        seen.extend(t.poll_client());
        if seen.iter().any(&pred) {
            return seen;
        }
        settle().await;
    }
    panic!("client never saw the expected event; saw {seen:?}");
}

/// A host plus one connected remote client, both past their Connected events.
async fn host_and_client() -> (Transport, Transport, PeerId) {
    let mut host = Transport::default();
    let addr = host.start_server(localhost()).unwrap();
    host.poll_server();
    host.poll_client();

    let mut client = Transport::default();
    client.connect(&addr.to_string()).unwrap();
    client_until(&mut client, |e| *e == NetEvent::Connected(PeerId::SERVER)).await;

    let events = server_until(&mut host, |e| matches!(e, NetEvent::Connected(_))).await;
    let peer = events
        .iter()
        .find_map(|e| match e {
            NetEvent::Connected(peer) => Some(*peer),
            _ => None,
        })
        .unwrap();
    (host, client, peer)
}

fn messages(events: &[NetEvent]) -> Vec<(PeerId, Packet)> {
    events
        .iter()
        .filter_map(|e| match e {
            NetEvent::Message(from, packet) => Some((*from, packet.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_host_brings_up_loopback_slots() {
    let mut host = Transport::default();
    host.start_server(localhost()).unwrap();

    assert_eq!(host.poll_server(), vec![NetEvent::Connected(PeerId::HOST)]);
    assert_eq!(host.poll_client(), vec![NetEvent::Connected(PeerId::SERVER)]);
    assert!(host.is_connected(PeerId::HOST));
    assert!(host.is_connected(PeerId::SERVER));
    assert_eq!(host.population(), 1);
}

#[tokio::test]
async fn test_loopback_preserves_order_both_ways() {
    let mut host = Transport::default();
    host.start_server(localhost()).unwrap();
    host.poll_server();
    host.poll_client();

    let down: Vec<_> = (0..3).map(|i| packet(10 + i, u32::from(i))).collect();
    for p in &down {
        host.send(PeerId::HOST, p);
    }
    let up = packet(42, 7);
    host.send(PeerId::SERVER, &up);

    let received = messages(&host.poll_client());
    assert_eq!(
        received,
        down.iter().map(|p| (PeerId::SERVER, p.clone())).collect::<Vec<_>>()
    );
    assert_eq!(messages(&host.poll_server()), vec![(PeerId::HOST, up)]);
    assert_eq!(host.stats().bytes_sent, 0, "loopback never touches a socket");
}

#[tokio::test]
async fn test_socket_round_trip() {
    let (mut host, mut client, peer) = host_and_client().await;
    assert_eq!(peer, PeerId(1));

    let up = packet(3, 99);
    client.send(PeerId::SERVER, &up);
    let events = server_until(&mut host, |e| matches!(e, NetEvent::Message(..))).await;
    assert_eq!(messages(&events), vec![(peer, up)]);

    let down = packet(4, 100);
    host.send(peer, &down);
    let events = client_until(&mut client, |e| matches!(e, NetEvent::Message(..))).await;
    assert_eq!(messages(&events), vec![(PeerId::SERVER, down)]);
}

#[tokio::test]
async fn test_loopback_and_socket_deliver_identical_messages() {
    let (mut host, mut client, _) = host_and_client().await;
    host.poll_client();

    let sent = packet(17, 0xdead_beef);
    host.send(Target::Broadcast, &sent);

    let via_loopback = messages(&host.poll_client());
    let via_socket = messages(
        &client_until(&mut client, |e| matches!(e, NetEvent::Message(..))).await,
    );
    assert_eq!(via_loopback, via_socket);
    assert_eq!(via_socket[0].1.as_bytes(), sent.as_bytes());
}

#[tokio::test]
async fn test_partial_frame_waits_for_rest() {
    let mut host = Transport::default();
    let addr = host.start_server(localhost()).unwrap();
    host.poll_server();

    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    let events = server_until(&mut host, |e| matches!(e, NetEvent::Connected(_))).await;
    assert!(events.contains(&NetEvent::Connected(PeerId(1))));

    let full = packet(5, 5);
    let bytes = full.as_bytes();
    raw.write_all(&bytes[..3]).await.unwrap();
    for _ in 0..10 {
        assert!(messages(&host.poll_server()).is_empty());
        settle().await;
    }

    raw.write_all(&bytes[3..]).await.unwrap();
    let events = server_until(&mut host, |e| matches!(e, NetEvent::Message(..))).await;
    assert_eq!(messages(&events), vec![(PeerId(1), full)]);
}

#[tokio::test]
async fn test_bad_length_prefix_drops_only_that_peer() {
    let (mut host, mut client, good) = host_and_client().await;

    let mut raw = tokio::net::TcpStream::connect(host.local_addr().unwrap())
        .await
        .unwrap();
    server_until(&mut host, |e| *e == NetEvent::Connected(PeerId(2))).await;

    raw.write_all(&[1, 0, 0, 0]).await.unwrap();
    server_until(&mut host, |e| *e == NetEvent::Disconnected(PeerId(2))).await;
    assert!(!host.is_connected(PeerId(2)));
    assert!(host.is_connected(good));

    let still_works = packet(6, 6);
    client.send(PeerId::SERVER, &still_works);
    let events = server_until(&mut host, |e| matches!(e, NetEvent::Message(..))).await;
    assert_eq!(messages(&events), vec![(good, still_works)]);
}

#[tokio::test]
async fn test_data_before_shutdown_is_delivered_first() {
    let mut host = Transport::default();
    let addr = host.start_server(localhost()).unwrap();
    host.poll_server();

    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    let last = packet(8, 8);
    raw.write_all(last.as_bytes()).await.unwrap();
    drop(raw);

    let events = server_until(&mut host, |e| matches!(e, NetEvent::Disconnected(_))).await;
    let message_at = events
        .iter()
        .position(|e| matches!(e, NetEvent::Message(..)))
        .unwrap();
    let gone_at = events
        .iter()
        .position(|e| *e == NetEvent::Disconnected(PeerId(1)))
        .unwrap();
    assert!(message_at < gone_at);
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let vacant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = vacant.local_addr().unwrap();
    drop(vacant);

    let mut client = Transport::default();
    client.connect(&addr.to_string()).unwrap();
    client_until(&mut client, |e| *e == NetEvent::ConnectFailed).await;
    assert_eq!(client.role(), Role::Idle);
}

#[tokio::test]
async fn test_farewell_arrives_before_disconnect() {
    let (mut host, mut client, peer) = host_and_client().await;

    let farewell = packet(12, 1);
    host.send(peer, &packet(11, 0));
    host.drop_peer(peer, Some(&farewell));
    assert!(!host.is_connected(peer));
    assert_eq!(
        host.poll_server().first(),
        Some(&NetEvent::Disconnected(peer))
    );

    let mut seen = Vec::new();
    for _ in 0..400 {
        host.poll_server();
        seen.extend(client.poll_client());
        if seen.contains(&NetEvent::Disconnected(PeerId::SERVER)) {
            break;
        }
        settle().await;
    }
    let received = messages(&seen);
    assert_eq!(received.last().map(|(_, p)| p.clone()), Some(farewell));
    assert_eq!(
        seen.last(),
        Some(&NetEvent::Disconnected(PeerId::SERVER))
    );
}

#[tokio::test]
async fn test_overflow_drops_only_that_peer() {
    let mut host = Transport::new(TransportConfig {
        outgoing_max: 8,
        ..Default::default()
    });
    let addr = host.start_server(localhost()).unwrap();
    host.poll_server();
    host.poll_client();

    let mut client = Transport::default();
    client.connect(&addr.to_string()).unwrap();
    client_until(&mut client, |e| *e == NetEvent::Connected(PeerId::SERVER)).await;
    server_until(&mut host, |e| *e == NetEvent::Connected(PeerId(1))).await;

    host.send(Target::Broadcast, &packet(1, 1));
    assert!(!host.is_connected(PeerId(1)));
    assert!(host.is_connected(PeerId::HOST), "loopback has no queue cap");
    let events = host.poll_server();
    assert!(events.contains(&NetEvent::Disconnected(PeerId(1))));
}

#[tokio::test]
async fn test_addressing_except_and_selected() {
    let (mut host, mut first, a) = host_and_client().await;
    let mut second = Transport::default();
    second
        .connect(&host.local_addr().unwrap().to_string())
        .unwrap();
    client_until(&mut second, |e| *e == NetEvent::Connected(PeerId::SERVER)).await;
    server_until(&mut host, |e| *e == NetEvent::Connected(PeerId(2))).await;
    host.poll_client();

    host.send(Target::BroadcastExcept(a), &packet(20, 0));
    host.select_mask(a.bit());
    host.send(Target::Selected, &packet(21, 0));

    let to_first = messages(&client_until(&mut first, |e| matches!(e, NetEvent::Message(..))).await);
    let to_second = messages(&client_until(&mut second, |e| matches!(e, NetEvent::Message(..))).await);
    let to_host: Vec<u8> = messages(&host.poll_client())
        .iter()
        .map(|(_, p)| p.token())
        .collect();

    assert_eq!(to_first.iter().map(|(_, p)| p.token()).collect::<Vec<_>>(), vec![21]);
    assert_eq!(to_second.iter().map(|(_, p)| p.token()).collect::<Vec<_>>(), vec![20]);
    assert_eq!(to_host, vec![20]);
}

#[tokio::test]
async fn test_client_may_only_address_server() {
    let (mut host, mut client, _) = host_and_client().await;
    client.send(Target::Broadcast, &packet(1, 1));
    client.send(PeerId(3), &packet(1, 1));
    client.flush();
    for _ in 0..10 {
        assert!(messages(&host.poll_server()).is_empty());
        settle().await;
    }
    assert_eq!(client.stats().messages_sent, 0);
}

#[tokio::test]
async fn test_stop_server_reports_both_sides() {
    let mut host = Transport::default();
    host.start_server(localhost()).unwrap();
    host.poll_server();
    host.poll_client();

    host.stop_server();
    assert_eq!(host.role(), Role::Idle);
    assert_eq!(host.poll_server(), vec![NetEvent::Disconnected(PeerId::HOST)]);
    assert_eq!(host.poll_client(), vec![NetEvent::Disconnected(PeerId::SERVER)]);
    assert!(host.local_addr().is_none());
}

#[test]
fn test_default_port_applied() {
    assert_eq!(with_default_port("example.org", 32500).unwrap(), "example.org:32500");
    assert_eq!(with_default_port("example.org:80", 32500).unwrap(), "example.org:80");
    assert_eq!(with_default_port("10.0.0.1", 7).unwrap(), "10.0.0.1:7");
    assert_eq!(with_default_port("::1", 7).unwrap(), "[::1]:7");
    assert!(with_default_port("  ", 7).is_err());
    assert!(with_default_port("host:notaport", 7).is_err());
}
