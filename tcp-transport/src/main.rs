//! Entry point for `tcp-transport`.
//!
//! Runs a client and a server connection in one process, joined by tokio
//! channels and a seeded fault simulator, and transfers a random payload
//! from client to server.  All protocol work is delegated to the library;
//! `main.rs` owns only process setup (logging, argument parsing) and the
//! event loop that moves segments and time between the two endpoints.

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;

use tcp_transport::seqnum::RandomIsn;
use tcp_transport::simulator::{Simulator, SimulatorConfig};
use tcp_transport::{Connection, Segment, TcpConfig};

/// Reliable byte-stream transfer over a simulated lossy network.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Number of bytes to transfer from client to server.
    #[arg(long, default_value_t = 100_000)]
    bytes: usize,
    /// Probability that a segment is lost.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,
    /// Probability that a segment is duplicated.
    #[arg(long, default_value_t = 0.05)]
    duplicate: f64,
    /// Probability that a segment is reordered.
    #[arg(long, default_value_t = 0.05)]
    reorder: f64,
    /// Seed for the payload, the ISNs and the fault model.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Timer tick interval in milliseconds.
    #[arg(long, default_value_t = 5)]
    tick_ms: u64,
    /// Initial retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 50)]
    rto_ms: u64,
    /// Capacity of each stream in bytes.
    #[arg(long, default_value_t = 16_000)]
    capacity: usize,
    /// Largest payload per segment in bytes.
    #[arg(long, default_value_t = 1_000)]
    payload: usize,
    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    log::info!("Starting transfer: {cli:?}");
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = TcpConfig {
        recv_capacity: cli.capacity,
        send_capacity: cli.capacity,
        rt_timeout: Duration::from_millis(cli.rto_ms),
        max_payload_size: cli.payload,
        ..TcpConfig::default()
    };
    let faults = SimulatorConfig {
        loss_rate: cli.loss,
        duplicate_rate: cli.duplicate,
        reorder_rate: cli.reorder,
        seed: cli.seed,
    };

    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Segment>();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<Segment>();
    let mut to_server = Simulator::new(faults.clone()).context("invalid fault model")?;
    let mut to_client = Simulator::new(SimulatorConfig {
        seed: cli.seed.wrapping_add(1),
        ..faults
    })
    .context("invalid fault model")?;

    let mut client =
        Connection::with_isn_source(cfg.clone(), client_tx, &mut RandomIsn::seeded(cli.seed))
            .context("invalid client configuration")?;
    let mut server = Connection::with_isn_source(
        cfg,
        server_tx,
        &mut RandomIsn::seeded(cli.seed.wrapping_add(1)),
    )
    .context("invalid server configuration")?;

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let data: Vec<u8> = (0..cli.bytes).map(|_| rng.gen()).collect();
    let mut written = 0;
    let mut client_closed = false;
    let mut server_closed = false;
    let mut received = Vec::with_capacity(cli.bytes);

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms.max(1)));
    let mut last_tick = Instant::now();
    let started = last_tick;
    let deadline = tokio::time::sleep(Duration::from_secs(cli.timeout_secs));
    tokio::pin!(deadline);

    client.connect();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                bail!(
                    "transfer timed out after {}s: {} of {} bytes received",
                    cli.timeout_secs,
                    received.len(),
                    data.len()
                );
            }
            Some(seg) = client_rx.recv() => {
                for seg in to_server.carry([seg]) {
                    server.on_segment(&seg);
                }
            }
            Some(seg) = server_rx.recv() => {
                for seg in to_client.carry([seg]) {
                    client.on_segment(&seg);
                }
            }
            now = ticker.tick() => {
                let dt = now.duration_since(last_tick);
                last_tick = now;
                // Release anything the simulators are holding back.
                for seg in to_server.carry(Vec::new()) {
                    server.on_segment(&seg);
                }
                for seg in to_client.carry(Vec::new()) {
                    client.on_segment(&seg);
                }
                client.tick(dt);
                server.tick(dt);
            }
        }

        if written < data.len() {
            written += client.write(&data[written..]);
        }
        if written == data.len() && !client_closed {
            log::info!("client: all {written} bytes queued, closing");
            client.end_input_stream();
            client_closed = true;
        }

        let available = server.inbound_stream().buffer_size();
        received.extend(server.read(available));
        if server.inbound_stream().eof() && !server_closed {
            log::info!("server: peer closed after {} bytes, closing", received.len());
            server.end_input_stream();
            server_closed = true;
        }

        if !client.active() && !server.active() {
            break;
        }
    }

    if received != data {
        bail!(
            "received {} bytes that differ from the {} bytes sent",
            received.len(),
            data.len()
        );
    }

    let (up, down) = (to_server.stats(), to_client.stats());
    println!(
        "transferred {} bytes in {:.2?}\n  client → server: {up:?}\n  server → client: {down:?}",
        received.len(),
        started.elapsed()
    );
    Ok(())
}
