use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tangle_protocol::{
    Milestone, NodeEvent, NodeRequest, NodeResponse, NodeStatus, MAX_SUBSCRIBERS,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{runtime_dir, LogLevel, NodeConfig};
use crate::daemon::pipeline::ConfirmationPipeline;
use crate::daemon::socket_path;
use crate::data::{NodeStore, StoreError};
use crate::params::{Manager, ManagerError, ProtocolEvent};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Protocol parameters error: {0}")]
    Params(#[from] ManagerError),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Failed to daemonize: {0}")]
    Daemonize(String),

    #[error("Halted after critical error: {0}")]
    Halted(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

type ClientId = u64;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

enum ClientMessage {
    Request(NodeRequest),
    Disconnect,
}

struct ClientHandle {
    response_tx: mpsc::Sender<NodeResponse>,
    is_subscriber: bool,
}

/// State read by client tasks without going through the writer loop.
struct NodeShared {
    store: Arc<NodeStore>,
    manager: Arc<Manager<NodeStore>>,
    start_time: Instant,
    subscriber_count: AtomicUsize,
}

impl NodeShared {
    fn status(&self) -> NodeStatus {
        let stats = self.store.stats().ok();
        let current = self.manager.current();

        NodeStatus {
            running: true,
            uptime_secs: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_index: stats.as_ref().and_then(|s| s.ledger_index).unwrap_or(0),
            last_confirmed_at: stats.as_ref().and_then(|s| s.last_confirmed_at),
            protocol_version: current.version,
            network_name: current.network_name.clone(),
            pending_changes: self.manager.pending().len(),
            next_pending_supported: self.manager.next_pending_supported(),
            database_size_bytes: stats.map(|s| s.size_bytes).unwrap_or(0),
            subscriber_count: self.subscriber_count.load(Ordering::Relaxed),
            ..NodeStatus::default()
        }
    }

    /// Answers requests that only read state. Returns `None` for requests the
    /// writer loop must handle.
    fn answer(&self, request: &NodeRequest) -> Option<NodeResponse> {
        let response = match request {
            NodeRequest::GetStatus => NodeResponse::Status(self.status()),
            NodeRequest::GetProtocolParameters => {
                NodeResponse::ProtocolParameters(self.manager.current().as_ref().clone())
            }
            NodeRequest::GetPendingChanges => NodeResponse::PendingChanges(self.manager.pending()),
            NodeRequest::GetSupportedVersions => {
                NodeResponse::SupportedVersions(self.manager.supported_versions().clone())
            }
            NodeRequest::ConfirmMilestone(_)
            | NodeRequest::Subscribe
            | NodeRequest::Unsubscribe
            | NodeRequest::Shutdown => return None,
        };
        Some(response)
    }
}

async fn client_reader_task(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    shared: Arc<NodeShared>,
    response_tx: mpsc::Sender<NodeResponse>,
    msg_tx: mpsc::Sender<(ClientId, ClientMessage)>,
    client_id: ClientId,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
            Ok(_) => match NodeRequest::from_json(line.trim()) {
                Ok(request) => {
                    if let Some(response) = shared.answer(&request) {
                        if response_tx.send(response).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    if msg_tx
                        .send((client_id, ClientMessage::Request(request)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id, error = %e, "Invalid request from client");
                    let reply = NodeResponse::Error(format!("Invalid request: {e}"));
                    if response_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Err(e) => {
                debug!(client_id, error = %e, "Client read error");
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
        }
    }
}

async fn client_writer_task(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut response_rx: mpsc::Receiver<NodeResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let json = match response.to_json() {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "Failed to encode response");
                continue;
            }
        };
        if writer
            .write_all(format!("{}\n", json).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Starts the node, detaching from the terminal unless `foreground` is set.
pub fn run_node(
    foreground: bool,
    config: NodeConfig,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    let socket = socket_path();

    if socket.exists() {
        if crate::daemon::is_node_running() {
            return Err(DaemonError::AlreadyRunning);
        }
        fs::remove_file(&socket)?;
    }

    fs::create_dir_all(runtime_dir())?;

    let _guard = if foreground {
        crate::logging::init(
            config.log_level,
            crate::logging::LogMode::Both,
            log_level_override,
        )
    } else {
        daemonize::Daemonize::new()
            .working_directory(runtime_dir())
            .start()
            .map_err(|e| DaemonError::Daemonize(e.to_string()))?;
        crate::logging::init(
            config.log_level,
            crate::logging::LogMode::File,
            log_level_override,
        )
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Node starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run_node_async(socket, config));
    if let Err(e) = &result {
        error!(error = %e, "Node stopped with error");
    }
    result
}

async fn run_node_async(socket: PathBuf, config: NodeConfig) -> Result<()> {
    debug!(gossip = ?config.gossip, faucet = ?config.faucet, "Loaded configuration");

    let store = Arc::new(NodeStore::open(&config.database_path())?);
    if store.seed_genesis(&config.protocol.genesis)? {
        info!(
            version = config.protocol.genesis.version,
            network = %config.protocol.genesis.network_name,
            "Seeded genesis protocol parameters"
        );
    }
    let stats = store.stats()?;
    info!(
        changes = stats.change_count,
        milestones = stats.milestone_count,
        size = %stats.size_formatted(),
        "Node store opened"
    );
    let ledger_index = stats.ledger_index.unwrap_or(0);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProtocolEvent>();
    let manager = Arc::new(Manager::new(
        Arc::clone(&store),
        ledger_index,
        Arc::new(event_tx),
    )?);
    let mut pipeline =
        ConfirmationPipeline::new(Arc::clone(&store), Arc::clone(&manager), ledger_index);

    let shared = Arc::new(NodeShared {
        store,
        manager,
        start_time: Instant::now(),
        subscriber_count: AtomicUsize::new(0),
    });

    let listener = UnixListener::bind(&socket)?;
    info!(socket = ?socket, ledger_index, "Listening for connections");

    let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, ClientMessage)>(256);
    let mut clients: HashMap<ClientId, ClientHandle> = HashMap::new();
    let mut next_client_id: ClientId = 1;
    let mut halted: Option<String> = None;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!(client_id, "Client connected");

                        let (reader, writer) = stream.into_split();
                        let (response_tx, response_rx) = mpsc::channel::<NodeResponse>(64);

                        clients.insert(client_id, ClientHandle {
                            response_tx: response_tx.clone(),
                            is_subscriber: false,
                        });

                        tokio::spawn(client_reader_task(
                            BufReader::new(reader),
                            Arc::clone(&shared),
                            response_tx,
                            msg_tx.clone(),
                            client_id,
                        ));
                        tokio::spawn(client_writer_task(writer, response_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Socket accept error");
                    }
                }
            }
            Some(event) = event_rx.recv() => {
                let node_event = event.to_node_event();
                match &event {
                    ProtocolEvent::NextMilestoneUnsupported(change) => {
                        warn!(
                            target_index = change.target_milestone_index,
                            version = change.protocol_version,
                            supported = %shared.manager.supported_versions(),
                            "Next milestone runs an unsupported protocol version, update the node"
                        );
                    }
                    ProtocolEvent::CriticalError(e) => {
                        error!(error = %e, "Critical protocol parameters error");
                        if config.protocol.halt_on_critical_error {
                            halted = Some(e.to_string());
                        }
                    }
                }
                broadcast(&mut clients, &shared, node_event).await;
                if halted.is_some() {
                    break;
                }
            }
            Some((client_id, msg)) = msg_rx.recv() => {
                match msg {
                    ClientMessage::Disconnect => {
                        if let Some(client) = clients.remove(&client_id) {
                            if client.is_subscriber {
                                shared.subscriber_count.fetch_sub(1, Ordering::Relaxed);
                            }
                            debug!(client_id, count = clients.len(), "Client disconnected");
                        }
                    }
                    ClientMessage::Request(request) => {
                        debug!(client_id, request = ?request, "Handling request");

                        let mut shutdown_requested = false;
                        let mut confirmed = Vec::new();

                        let response = match request {
                            NodeRequest::Subscribe => {
                                let subscriber_count = shared.subscriber_count.load(Ordering::Relaxed);
                                if subscriber_count >= MAX_SUBSCRIBERS {
                                    NodeResponse::SubscriptionRejected {
                                        reason: format!("Maximum subscribers ({}) reached", MAX_SUBSCRIBERS),
                                    }
                                } else if let Some(client) = clients.get_mut(&client_id) {
                                    if !client.is_subscriber {
                                        client.is_subscriber = true;
                                        shared.subscriber_count.fetch_add(1, Ordering::Relaxed);
                                        info!(client_id, count = subscriber_count + 1, "Subscriber added");
                                    }
                                    NodeResponse::Subscribed
                                } else {
                                    NodeResponse::Error("Client not found".to_string())
                                }
                            }
                            NodeRequest::Unsubscribe => {
                                if let Some(client) = clients.get_mut(&client_id) {
                                    if client.is_subscriber {
                                        client.is_subscriber = false;
                                        let count = shared.subscriber_count.fetch_sub(1, Ordering::Relaxed) - 1;
                                        info!(client_id, count, "Subscriber removed");
                                    }
                                }
                                NodeResponse::Unsubscribed
                            }
                            NodeRequest::Shutdown => {
                                info!("Shutdown requested by client");
                                shutdown_requested = true;
                                NodeResponse::Ok
                            }
                            NodeRequest::ConfirmMilestone(milestone) => {
                                confirm(&mut pipeline, &milestone, &mut confirmed)
                            }
                            other => shared
                                .answer(&other)
                                .unwrap_or_else(|| NodeResponse::Error("Unhandled request".to_string())),
                        };

                        if let Some(client) = clients.get(&client_id) {
                            let _ = client.response_tx.send(response).await;
                        }

                        for event in confirmed {
                            broadcast(&mut clients, &shared, event).await;
                        }

                        if shutdown_requested {
                            // let the writer task flush the reply
                            tokio::time::sleep(SHUTDOWN_GRACE).await;
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!(ledger_index = pipeline.ledger_index(), "Node shutting down");
    fs::remove_file(&socket).ok();

    match halted {
        Some(reason) => Err(DaemonError::Halted(reason)),
        None => Ok(()),
    }
}

fn confirm(
    pipeline: &mut ConfirmationPipeline,
    milestone: &Milestone,
    events: &mut Vec<NodeEvent>,
) -> NodeResponse {
    match pipeline.confirm(milestone) {
        Ok(confirmation) => {
            if confirmation.activated {
                events.push(NodeEvent::ProtocolParametersActivated {
                    index: confirmation.index,
                    protocol_version: confirmation.protocol_version,
                });
            }
            events.push(NodeEvent::MilestoneConfirmed {
                index: confirmation.index,
                protocol_version: confirmation.protocol_version,
            });
            NodeResponse::MilestoneConfirmed {
                index: confirmation.index,
            }
        }
        Err(e) => {
            warn!(index = milestone.index, error = %e, "Milestone rejected");
            NodeResponse::Error(e.to_string())
        }
    }
}

async fn broadcast(
    clients: &mut HashMap<ClientId, ClientHandle>,
    shared: &NodeShared,
    event: NodeEvent,
) {
    let update = NodeResponse::Event(event);

    let mut disconnected = Vec::new();
    for (id, client) in clients.iter() {
        if client.is_subscriber && client.response_tx.send(update.clone()).await.is_err() {
            disconnected.push(*id);
        }
    }
    for id in disconnected {
        if clients.remove(&id).is_some() {
            shared.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            debug!(client_id = id, "Removed disconnected subscriber");
        }
    }
}
