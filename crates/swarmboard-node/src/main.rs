//! SwarmBoard Peer Node
//!
//! A headless peer in the SwarmBoard mesh. Every node listens for
//! inbound peer connections, dials the peers given on the command line,
//! and runs one synchronization engine over the resulting links. There
//! is no central server: any node can come and go, and any pair of
//! connected nodes converges through the join handshake and the live
//! operation stream.
//!
//! ## Wire format
//!
//! Newline-delimited JSON envelopes tagged by `t`:
//! ```json
//! { "t": "hello", "from": "<peer-uuid>", "doc": { ... } }
//! { "t": "update", "id": "<object-uuid>", "patch": { "w": 20, "rev": 1 } }
//! { "t": "clear" }
//! ```

use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use swarmboard_core::{CheckpointCoordinator, Engine, FileLog, PeerId, Target};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;
const WRITE_CAPACITY: usize = 256;
const REDIAL_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "swarmboard-node", about = "SwarmBoard collaborative whiteboard peer node")]
struct Cli {
    /// Address to accept peer connections on.
    #[arg(long, default_value = "0.0.0.0:9090")]
    listen: SocketAddr,

    /// Peer address to dial at startup. Repeatable.
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Room name, used to tag and filter checkpoint records.
    #[arg(long, default_value = "main")]
    room: String,

    /// Checkpoint log directory. Defaults to the platform data dir.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds between periodic checkpoints. 0 disables them.
    #[arg(long, default_value_t = 30)]
    checkpoint_secs: u64,

    /// What to replay from the checkpoint log at startup.
    #[arg(long, value_enum, default_value = "latest")]
    restore: RestoreMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RestoreMode {
    /// Merge the most recent checkpoint for the room.
    Latest,
    /// Replay every checkpoint for the room, oldest first.
    All,
    /// Start from an empty document.
    None,
}

/// Events funneled from connection tasks into the engine loop.
enum Event {
    Connected {
        conn_id: PeerId,
        tx: mpsc::Sender<Vec<u8>>,
    },
    Message {
        conn_id: PeerId,
        payload: Vec<u8>,
    },
    Disconnected {
        conn_id: PeerId,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarmboard_node=info,swarmboard_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let log = match &cli.data_dir {
        Some(dir) => FileLog::new(dir.clone(), &cli.room),
        None => FileLog::default_location(&cli.room),
    };
    let log = log.unwrap_or_else(|e| {
        eprintln!("failed to open checkpoint log: {}", e);
        std::process::exit(1);
    });
    info!("checkpoint log at {}", log.path().display());
    let coordinator = CheckpointCoordinator::new(cli.room.clone(), Box::new(log));

    let mut engine = Engine::new();
    info!("node {} in room {}", engine.peer_id(), cli.room);

    restore(&mut engine, &coordinator, cli.restore).await;
    engine.take_render_request();

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CAPACITY);

    let listener = TcpListener::bind(cli.listen).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {}", cli.listen, e);
        std::process::exit(1);
    });
    info!("listening on {}", cli.listen);
    tokio::spawn(accept_loop(listener, event_tx.clone()));

    for addr in &cli.peers {
        tokio::spawn(dial_loop(*addr, event_tx.clone()));
    }

    let mut writers: HashMap<PeerId, mpsc::Sender<Vec<u8>>> = HashMap::new();
    let checkpoints_enabled = cli.checkpoint_secs > 0;
    let mut checkpoint_timer =
        tokio::time::interval(Duration::from_secs(cli.checkpoint_secs.max(1)));
    checkpoint_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so an empty document is
    // not checkpointed at startup.
    checkpoint_timer.tick().await;

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::Connected { conn_id, tx } => {
                    writers.insert(conn_id, tx);
                    engine.handle_connect(conn_id);
                }
                Event::Message { conn_id, payload } => {
                    engine.handle_message(conn_id, &payload);
                }
                Event::Disconnected { conn_id } => {
                    writers.remove(&conn_id);
                    engine.handle_disconnect(conn_id);
                }
            },
            _ = checkpoint_timer.tick(), if checkpoints_enabled => {
                if let Err(e) = coordinator.checkpoint(engine.document(), engine.peer_id()).await {
                    warn!("checkpoint failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                if checkpoints_enabled {
                    if let Err(e) = coordinator.checkpoint(engine.document(), engine.peer_id()).await {
                        warn!("final checkpoint failed: {}", e);
                    }
                }
                break;
            }
        }

        fan_out(&engine.take_outgoing(), &writers);

        if engine.take_render_request() {
            debug!(
                "document changed: version {}, {} objects",
                engine.version(),
                engine.document().len()
            );
        }
    }
}

/// Merge checkpointed state into a fresh engine per the restore mode.
async fn restore(engine: &mut Engine, coordinator: &CheckpointCoordinator, mode: RestoreMode) {
    match mode {
        RestoreMode::Latest => match coordinator.latest().await {
            Ok(Some(record)) => {
                engine.restore_from(&record);
                info!(
                    "restored checkpoint: version {}, {} objects",
                    record.version,
                    record.objects.len()
                );
            }
            Ok(None) => info!("no checkpoint to restore"),
            Err(e) => warn!("checkpoint restore failed: {}", e),
        },
        RestoreMode::All => match coordinator.history().await {
            Ok(records) => {
                let count = records.len();
                for record in &records {
                    engine.restore_from(record);
                }
                info!("replayed {} checkpoint records", count);
            }
            Err(e) => warn!("checkpoint replay failed: {}", e),
        },
        RestoreMode::None => {}
    }
}

/// Write each frame to the connections its target names. A full send
/// queue drops the frame for that connection; the version-gated snapshot
/// exchange on reconnect recovers whatever was missed.
fn fan_out(frames: &[swarmboard_core::Frame], writers: &HashMap<PeerId, mpsc::Sender<Vec<u8>>>) {
    for frame in frames {
        match frame.target {
            Target::All => {
                for tx in writers.values() {
                    if tx.try_send(frame.payload.clone()).is_err() {
                        debug!("dropping frame for a saturated connection");
                    }
                }
            }
            Target::Peer(conn_id) => {
                if let Some(tx) = writers.get(&conn_id) {
                    if tx.try_send(frame.payload.clone()).is_err() {
                        debug!("dropping direct frame for {}", conn_id);
                    }
                }
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("accepted connection from {}", addr);
                tokio::spawn(run_connection(stream, events.clone()));
            }
            Err(e) => {
                warn!("accept failed: {}", e);
            }
        }
    }
}

/// Dial a configured peer and keep redialing when the link drops. Each
/// successful connection gets a fresh connection id, so the handshake
/// runs again and catches both sides up.
async fn dial_loop(addr: SocketAddr, events: mpsc::Sender<Event>) {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("connected to peer {}", addr);
                run_connection(stream, events.clone()).await;
                info!("lost connection to peer {}", addr);
            }
            Err(e) => {
                debug!("dial {} failed: {}", addr, e);
            }
        }
        if events.is_closed() {
            return;
        }
        tokio::time::sleep(REDIAL_DELAY).await;
    }
}

/// Drive one TCP link: a write task draining the per-connection queue
/// and a read loop forwarding newline-delimited payloads to the engine.
async fn run_connection(stream: TcpStream, events: mpsc::Sender<Event>) {
    let conn_id = Uuid::new_v4();
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(WRITE_CAPACITY);

    if events.send(Event::Connected { conn_id, tx }).await.is_err() {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(mut payload) = rx.recv().await {
            payload.push(b'\n');
            if write_half.write_all(&payload).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let event = Event::Message {
                    conn_id,
                    payload: line.into_bytes(),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("read error on {}: {}", conn_id, e);
                break;
            }
        }
    }

    let _ = events.send(Event::Disconnected { conn_id }).await;
    writer.abort();
}
