//! End-to-end tests: two connections exchanging segments in virtual time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use tcp_transport::simulator::{Endpoints, SimulatorConfig};
use tcp_transport::{Connection, ConnectionState, Segment, SeqNum, TcpConfig};

const DT: Duration = Duration::from_millis(10);

fn cfg(isn: u32) -> TcpConfig {
    TcpConfig {
        recv_capacity: 4000,
        send_capacity: 4000,
        rt_timeout: Duration::from_millis(100),
        fixed_isn: Some(SeqNum::new(isn)),
        ..TcpConfig::default()
    }
}

fn endpoints(faults: SimulatorConfig) -> Endpoints {
    let client = Connection::new(cfg(1_000), VecDeque::new()).unwrap();
    let server = Connection::new(cfg(u32::MAX - 2_000), VecDeque::new()).unwrap();
    Endpoints::new(client, server, faults).unwrap()
}

fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Client sends `data` and closes; server reads everything and closes once
/// the client has.
struct Outcome {
    received: Vec<u8>,
    /// Step at which the client's close prerequisites were first met.
    finished_at: Option<usize>,
    /// Step at which both sides were inactive.
    ended_at: Option<usize>,
}

fn transfer(net: &mut Endpoints, data: &[u8], max_steps: usize) -> Outcome {
    let mut written = 0;
    let mut client_closed = false;
    let mut server_closed = false;
    let mut received = Vec::new();
    let mut finished_at = None;
    let mut ended_at = None;

    net.client.connect();
    for step in 0..max_steps {
        if written < data.len() {
            written += net.client.write(&data[written..]);
        }
        if written == data.len() && !client_closed {
            net.client.end_input_stream();
            client_closed = true;
        }

        let available = net.server.inbound_stream().buffer_size();
        received.extend(net.server.read(available));
        if net.server.inbound_stream().eof() && !server_closed {
            net.server.end_input_stream();
            server_closed = true;
        }

        if finished_at.is_none() && net.client.prerequisites_met() {
            finished_at = Some(step);
        }
        if !net.client.active() && !net.server.active() {
            ended_at = Some(step);
            break;
        }
        net.step(DT);
    }
    Outcome {
        received,
        finished_at,
        ended_at,
    }
}

#[test]
fn clean_transfer_closes_without_reset() {
    let mut net = endpoints(SimulatorConfig::default());
    let data = payload(10_000, 1);
    let outcome = transfer(&mut net, &data, 5_000);

    assert_eq!(outcome.received, data);
    assert!(!net.client.active());
    assert!(!net.server.active());
    assert_eq!(net.client.state(), ConnectionState::FinAcked);
    assert_eq!(net.server.state(), ConnectionState::FinAcked);
    assert!(!net.client.inbound_stream().error());
    assert!(!net.server.inbound_stream().error());

    // The client closed first, so it lingers for ten RTOs and no longer.
    let lingered = outcome.ended_at.unwrap() - outcome.finished_at.unwrap();
    let linger_steps = (net.client.config().linger_timeout().as_millis() / DT.as_millis()) as usize;
    assert!((linger_steps - 1..=linger_steps + 1).contains(&lingered));
    assert!(net.client.time_since_last_segment_received() >= net.client.config().linger_timeout());
}

#[test]
fn lossy_transfer_delivers_every_byte_in_order() {
    let mut net = endpoints(SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.05,
        reorder_rate: 0.1,
        seed: 3,
    });
    let data = payload(60_000, 2);
    let outcome = transfer(&mut net, &data, 50_000);

    assert!(outcome.ended_at.is_some());
    assert_eq!(outcome.received, data);
    assert!(!net.client.active());
    assert!(!net.server.active());
    assert_ne!(net.client.state(), ConnectionState::Reset);
    assert_ne!(net.server.state(), ConnectionState::Reset);

    // Faults happened somewhere along the way.
    let (up, down) = net.stats();
    assert!(up.dropped + down.dropped > 0);
    assert!(up.reordered + down.reordered > 0);
}

#[test]
fn unreachable_peer_resets_after_retransmission_limit() {
    let mut net = endpoints(SimulatorConfig {
        loss_rate: 1.0,
        ..SimulatorConfig::default()
    });
    net.client.connect();
    let gave_up = net.run_until(|n| !n.client.active(), DT, 20_000);

    assert!(gave_up);
    assert_eq!(net.client.state(), ConnectionState::Reset);
    assert!(net.client.inbound_stream().error());
    // The server never heard anything.
    assert_eq!(net.server.state(), ConnectionState::Closed);
    assert!(net.server.active());
}

/// Move every queued segment from `from` to `to`.
fn deliver(from: &Rc<RefCell<VecDeque<Segment>>>, to: &mut Connection<Rc<RefCell<VecDeque<Segment>>>>) {
    let segs: Vec<Segment> = from.borrow_mut().drain(..).collect();
    for seg in segs {
        to.on_segment(&seg);
    }
}

#[test]
fn abandoned_connection_resets_peer() {
    let client_out: Rc<RefCell<VecDeque<Segment>>> = Rc::default();
    let server_out: Rc<RefCell<VecDeque<Segment>>> = Rc::default();
    let mut client = Connection::new(cfg(7), Rc::clone(&client_out)).unwrap();
    let mut server = Connection::new(cfg(9), Rc::clone(&server_out)).unwrap();

    client.connect();
    for _ in 0..3 {
        deliver(&client_out, &mut server);
        deliver(&server_out, &mut client);
    }
    assert_eq!(client.state(), ConnectionState::Established);
    client.write(b"partial");
    deliver(&client_out, &mut server);
    assert_eq!(server.read(100), b"partial");

    drop(client);
    assert!(client_out.borrow().back().is_some_and(|s| s.header.rst));
    deliver(&client_out, &mut server);

    assert!(!server.active());
    assert_eq!(server.state(), ConnectionState::Reset);
    assert!(server.inbound_stream().error());
    // A reset connection neither answers nor resets again when dropped.
    drop(server);
    assert!(server_out.borrow().iter().all(|s| !s.header.rst));
}

#[tokio::test]
async fn connections_over_channels() {
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Segment>();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<Segment>();
    let mut client = Connection::new(cfg(100), client_tx).unwrap();
    let mut server = Connection::new(cfg(200), server_tx).unwrap();

    client.connect();
    client.write(b"over the channel");
    client.end_input_stream();

    let mut received = Vec::new();
    for _ in 0..100 {
        while let Ok(seg) = client_rx.try_recv() {
            server.on_segment(&seg);
        }
        while let Ok(seg) = server_rx.try_recv() {
            client.on_segment(&seg);
        }
        let available = server.inbound_stream().buffer_size();
        received.extend(server.read(available));
        if server.inbound_stream().eof() {
            break;
        }
        client.tick(DT);
        server.tick(DT);
        tokio::task::yield_now().await;
    }
    assert_eq!(received, b"over the channel");

    // A closed channel is logged and swallowed, including the RST on drop.
    drop(server_rx);
    server.end_input_stream();
    drop(server);
    drop(client);
}
