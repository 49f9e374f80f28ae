//! RootSupervisor: owns the worker tree, applies the fault policy and routes
//! client requests
//!
//! The supervisor is itself a task. It never waits on a child: requests are
//! enqueued with `try_tell` and answers are relayed by short-lived tasks, so
//! a child blocked on a fault report can always reach it.

use super::channel_profile::{ChannelMsg, ChannelProfileWorker};
use super::coordinator::{Backends, CoordinatorMsg, RequestCoordinator};
use super::mailbox::{
    spawn_worker, ChildStatus, ChildStatusSnapshot, DeliveryError, FaultReport, FaultReporter,
    WeakWorkerRef, Worker, WorkerRef,
};
use super::messages::{ClientChannel, ClientReply, Inbound};
use super::policy::directive_for;
use super::readability::{ReadabilityMsg, ReadabilityWorker};
use super::search::{SearchMsg, SearchWorker};
use super::sentiment::{SentimentMsg, SentimentWorker};
use super::tags::{TagLookupWorker, TagMsg};
use super::word_stats::{WordFrequencyAggregator, WordStatsMsg};
use crate::youtube::VideoSource;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vidlens_common::config::ServiceConfig;
use vidlens_common::events::{EventBus, ServiceEvent};
use vidlens_common::SearchBatch;

/// How long shutdown waits for children to drain their mailboxes
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Videos searched for a per-query word statistics request
pub const QUERY_STATS_VIDEOS: usize = 50;

/// Per-worker tuning taken from the service configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub mailbox_capacity: usize,
    pub search_limit: usize,
    pub tag_limit: usize,
    pub channel_video_limit: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for WorkerSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity,
            search_limit: config.search_limit,
            tag_limit: config.tag_limit,
            channel_video_limit: config.channel_video_limit,
        }
    }
}

/// Builds one incarnation of a worker; called again on every restart
pub type WorkerFactory<M> = Arc<dyn Fn() -> Box<dyn Worker<Message = M>> + Send + Sync>;

pub fn worker_factory<W, F>(make: F) -> WorkerFactory<W::Message>
where
    W: Worker,
    F: Fn() -> W + Send + Sync + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn Worker<Message = W::Message>>)
}

/// Replacements for the built-in workers
///
/// Entries left `None` get the standard implementation. The replacement still
/// runs under the same name, mailbox capacity and fault policy.
#[derive(Clone, Default)]
pub struct WorkerOverrides {
    pub search: Option<WorkerFactory<SearchMsg>>,
    pub readability: Option<WorkerFactory<ReadabilityMsg>>,
    pub sentiment: Option<WorkerFactory<SentimentMsg>>,
    pub word_stats: Option<WorkerFactory<WordStatsMsg>>,
    pub tags: Option<WorkerFactory<TagMsg>>,
    pub channel: Option<WorkerFactory<ChannelMsg>>,
}

enum SupervisorMsg {
    Route {
        session_id: String,
        message: Inbound,
        client: ClientChannel,
    },
    Connect {
        client: ClientChannel,
        reply: oneshot::Sender<String>,
    },
    Disconnect {
        session_id: String,
    },
    Register {
        status: Arc<ChildStatus>,
        handle: JoinHandle<()>,
    },
    Status {
        reply: oneshot::Sender<Vec<ChildStatusSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct Children {
    backends: Backends,
    tags: WorkerRef<TagMsg>,
    channel: WorkerRef<ChannelMsg>,
}

struct Session {
    coordinator: WorkerRef<CoordinatorMsg>,
    handle: JoinHandle<()>,
}

struct SupervisorTask {
    settings: WorkerSettings,
    events: EventBus,
    faults: FaultReporter,
    /// `None` once shutdown has begun
    children: Option<Children>,
    statuses: Vec<Arc<ChildStatus>>,
    sessions: HashMap<String, Session>,
    /// Built-in and registered children; session tasks live in `sessions`
    handles: Vec<JoinHandle<()>>,
}

/// Handle to the running supervisor
#[derive(Clone)]
pub struct Supervisor {
    inbox: mpsc::Sender<SupervisorMsg>,
    faults: FaultReporter,
    settings: WorkerSettings,
    events: EventBus,
}

impl Supervisor {
    /// Create the worker tree and start supervising it
    pub fn start(settings: WorkerSettings, source: Arc<dyn VideoSource>, events: EventBus) -> Self {
        Self::start_with(settings, source, events, WorkerOverrides::default())
    }

    /// Like [`Supervisor::start`], with some built-in workers replaced
    pub fn start_with(
        settings: WorkerSettings,
        source: Arc<dyn VideoSource>,
        events: EventBus,
        overrides: WorkerOverrides,
    ) -> Self {
        let capacity = settings.mailbox_capacity.max(1);
        let (fault_tx, fault_rx) = mpsc::channel::<FaultReport>(capacity);
        let (inbox_tx, inbox_rx) = mpsc::channel::<SupervisorMsg>(capacity);
        let faults = FaultReporter::new(fault_tx);

        let task = SupervisorTask::new(settings, source, events.clone(), faults.clone(), overrides);
        info!("Supervisor started with {} workers", task.statuses.len());
        tokio::spawn(task.run(inbox_rx, fault_rx));

        Self {
            inbox: inbox_tx,
            faults,
            settings,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> SupervisorMsg,
    ) -> Result<R, DeliveryError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(make(tx))
            .await
            .map_err(|_| DeliveryError::Stopped("supervisor".to_string()))?;
        rx.await
            .map_err(|_| DeliveryError::NoReply("supervisor".to_string()))
    }

    /// Open a client session with its own RequestCoordinator
    pub async fn connect(&self, client: mpsc::Sender<ClientReply>) -> Result<ClientSession, DeliveryError> {
        let client = ClientChannel::new(client);
        let session_id = self
            .request(|reply| SupervisorMsg::Connect {
                client: client.clone(),
                reply,
            })
            .await?;
        Ok(ClientSession {
            id: session_id,
            inbox: self.inbox.clone(),
            client,
            closed: false,
        })
    }

    /// One request, one reply, through a throwaway session
    pub async fn ask(&self, message: Inbound) -> Result<ClientReply, DeliveryError> {
        let (tx, mut rx) = mpsc::channel(1);
        let session = self.connect(tx).await?;
        session.send(message).await?;
        let reply = rx
            .recv()
            .await
            .ok_or_else(|| DeliveryError::NoReply("supervisor".to_string()));
        session.close().await;
        reply
    }

    /// Lifecycle counters of every supervised child, sessions included
    pub async fn status(&self) -> Result<Vec<ChildStatusSnapshot>, DeliveryError> {
        self.request(|reply| SupervisorMsg::Status { reply }).await
    }

    /// Start an extra child under this supervisor's fault policy
    pub async fn spawn_child<W, F>(&self, name: &str, factory: F) -> Result<WorkerRef<W::Message>, DeliveryError>
    where
        W: Worker,
        F: Fn(&WeakWorkerRef<W::Message>) -> W + Send + 'static,
    {
        let (child, handle) =
            spawn_worker(name, self.settings.mailbox_capacity, self.faults.clone(), factory);
        self.inbox
            .send(SupervisorMsg::Register {
                status: child.status(),
                handle,
            })
            .await
            .map_err(|_| DeliveryError::Stopped("supervisor".to_string()))?;
        Ok(child)
    }

    /// Stop all children and wait (bounded) for them to drain
    pub async fn shutdown(&self) {
        if self.request(|reply| SupervisorMsg::Shutdown { reply }).await.is_err() {
            debug!("Supervisor already stopped");
        }
    }
}

/// One connected client
///
/// Dropping the session disconnects it; [`ClientSession::close`] does the same
/// but waits for the supervisor to accept the request.
pub struct ClientSession {
    id: String,
    inbox: mpsc::Sender<SupervisorMsg>,
    client: ClientChannel,
    closed: bool,
}

impl ClientSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn send(&self, message: Inbound) -> Result<(), DeliveryError> {
        self.inbox
            .send(SupervisorMsg::Route {
                session_id: self.id.clone(),
                message,
                client: self.client.clone(),
            })
            .await
            .map_err(|_| DeliveryError::Stopped("supervisor".to_string()))
    }

    pub async fn close(mut self) {
        self.closed = true;
        let _ = self
            .inbox
            .send(SupervisorMsg::Disconnect {
                session_id: self.id.clone(),
            })
            .await;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let disconnect = SupervisorMsg::Disconnect {
            session_id: self.id.clone(),
        };
        match self.inbox.try_send(disconnect) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(disconnect)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let inbox = self.inbox.clone();
                        runtime.spawn(async move {
                            let _ = inbox.send(disconnect).await;
                        });
                    }
                    Err(_) => warn!(
                        session = %self.id,
                        "Session dropped outside the runtime, its coordinator stays open"
                    ),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session = %self.id, "Supervisor already stopped");
            }
        }
    }
}

/// Wait for a child's answer off the supervisor task and hand it to the client
fn relay<R, F>(client: ClientChannel, worker: &str, rx: oneshot::Receiver<R>, into_reply: F)
where
    R: Send + 'static,
    F: FnOnce(R) -> ClientReply + Send + 'static,
{
    let worker = worker.to_string();
    tokio::spawn(async move {
        let reply = match rx.await {
            Ok(value) => into_reply(value),
            Err(_) => ClientReply::error(format!("Worker '{}' failed to reply", worker)),
        };
        client.deliver(reply).await;
    });
}

async fn reply_now(client: ClientChannel, reply: ClientReply) {
    client.deliver(reply).await;
}

/// Merge one query's videos into the word table and answer with the snapshot
async fn query_word_stats(
    client: ClientChannel,
    word_stats: WorkerRef<WordStatsMsg>,
    search_term: String,
    batch: oneshot::Receiver<SearchBatch>,
) {
    let reply = match batch.await {
        Ok(batch) => {
            let merged = word_stats
                .ask(|reply| WordStatsMsg::Merge {
                    texts: batch.texts(),
                    reply: Some(reply),
                })
                .await;
            match merged {
                Ok(word_stats) => ClientReply::QueryWordStats {
                    search_term,
                    word_stats,
                },
                Err(e) => ClientReply::error(e.to_string()),
            }
        }
        Err(_) => ClientReply::error("Worker 'search' failed to reply"),
    };
    client.deliver(reply).await;
}

impl SupervisorTask {
    fn new(
        settings: WorkerSettings,
        source: Arc<dyn VideoSource>,
        events: EventBus,
        faults: FaultReporter,
        overrides: WorkerOverrides,
    ) -> Self {
        let mut task = Self {
            settings,
            events,
            faults,
            children: None,
            statuses: Vec::new(),
            sessions: HashMap::new(),
            handles: Vec::new(),
        };

        let search_source = source.clone();
        let search = task.spawn_builtin(
            "search",
            overrides.search.unwrap_or_else(|| {
                worker_factory(move || SearchWorker::new(search_source.clone(), settings.search_limit))
            }),
        );
        let readability = task.spawn_builtin(
            "readability",
            overrides
                .readability
                .unwrap_or_else(|| worker_factory(ReadabilityWorker::new)),
        );
        let sentiment = task.spawn_builtin(
            "sentiment",
            overrides
                .sentiment
                .unwrap_or_else(|| worker_factory(SentimentWorker::new)),
        );
        let word_stats = task.spawn_builtin(
            "word-stats",
            overrides
                .word_stats
                .unwrap_or_else(|| worker_factory(WordFrequencyAggregator::new)),
        );
        let tag_source = source.clone();
        let tags = task.spawn_builtin(
            "tags",
            overrides.tags.unwrap_or_else(|| {
                worker_factory(move || TagLookupWorker::new(tag_source.clone(), settings.tag_limit))
            }),
        );
        let channel = task.spawn_builtin(
            "channel-profile",
            overrides.channel.unwrap_or_else(|| {
                worker_factory(move || {
                    ChannelProfileWorker::new(source.clone(), settings.channel_video_limit)
                })
            }),
        );

        task.children = Some(Children {
            backends: Backends {
                search,
                readability,
                sentiment,
                word_stats,
            },
            tags,
            channel,
        });
        task
    }

    fn spawn_builtin<M: Send + 'static>(&mut self, name: &str, factory: WorkerFactory<M>) -> WorkerRef<M> {
        let capacity = self.settings.mailbox_capacity;
        let (worker, handle) = spawn_worker::<Box<dyn Worker<Message = M>>, _>(
            name,
            capacity,
            self.faults.clone(),
            move |_| factory(),
        );
        self.statuses.push(worker.status());
        self.handles.push(handle);
        worker
    }

    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<SupervisorMsg>,
        mut faults: mpsc::Receiver<FaultReport>,
    ) {
        loop {
            tokio::select! {
                Some(report) = faults.recv() => self.on_fault(report),
                msg = inbox.recv() => match msg {
                    Some(SupervisorMsg::Shutdown { reply }) => {
                        // Children reporting from here on apply the policy themselves
                        drop(faults);
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(msg) => self.on_message(msg),
                    None => {
                        drop(faults);
                        self.shutdown().await;
                        return;
                    }
                },
            }
        }
    }

    fn on_fault(&mut self, report: FaultReport) {
        let FaultReport { event, reply } = report;
        let directive = directive_for(event.kind);

        error!(
            worker = %event.worker,
            kind = %event.kind,
            directive = %directive,
            "Supervising fault: {}",
            event.detail
        );
        self.events.emit_lossy(ServiceEvent::FaultHandled {
            worker: event.worker,
            kind: event.kind,
            directive,
            detail: event.detail,
            timestamp: event.timestamp,
        });

        if reply.send(directive).is_err() {
            warn!("Faulted worker went away before receiving its directive");
        }
    }

    fn on_message(&mut self, msg: SupervisorMsg) {
        match msg {
            SupervisorMsg::Route {
                session_id,
                message,
                client,
            } => self.route(&session_id, message, client),
            SupervisorMsg::Connect { client, reply } => {
                // Dropping `reply` without an id tells the caller the tree is down
                if let Some(session_id) = self.open_session(client) {
                    let _ = reply.send(session_id);
                }
            }
            SupervisorMsg::Disconnect { session_id } => self.close_session(&session_id),
            SupervisorMsg::Register { status, handle } => {
                debug!(worker = %status.name(), "Registered child");
                self.statuses.push(status);
                self.handles.push(handle);
            }
            SupervisorMsg::Status { reply } => {
                let mut snapshot: Vec<_> = self.statuses.iter().map(|s| s.snapshot()).collect();
                let mut sessions: Vec<_> = self
                    .sessions
                    .values()
                    .map(|s| s.coordinator.status().snapshot())
                    .collect();
                sessions.sort_by(|a, b| a.name.cmp(&b.name));
                snapshot.extend(sessions);
                let _ = reply.send(snapshot);
            }
            SupervisorMsg::Shutdown { .. } => {}
        }
    }

    fn open_session(&mut self, client: ClientChannel) -> Option<String> {
        let backends = self.children.as_ref()?.backends.clone();
        let session_id = Uuid::new_v4().simple().to_string();
        let name = format!("coordinator-{}", &session_id[..8]);
        let events = self.events.clone();
        let id = session_id.clone();

        let (coordinator, handle) = spawn_worker(
            &name,
            self.settings.mailbox_capacity,
            self.faults.clone(),
            move |self_ref| {
                RequestCoordinator::new(
                    id.clone(),
                    self_ref.clone(),
                    backends.clone(),
                    client.clone(),
                    events.clone(),
                )
            },
        );
        self.sessions
            .insert(session_id.clone(), Session { coordinator, handle });

        info!(session = %session_id, "Client session opened");
        self.events.emit_lossy(ServiceEvent::SessionChanged {
            session_id: session_id.clone(),
            connected: true,
            timestamp: Utc::now(),
        });
        Some(session_id)
    }

    /// The coordinator drains and exits once its last strong address is gone
    fn close_session(&mut self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            info!(session = %session_id, "Client session closed");
            self.events.emit_lossy(ServiceEvent::SessionChanged {
                session_id: session_id.to_string(),
                connected: false,
                timestamp: Utc::now(),
            });
        }
    }

    fn route(&mut self, session_id: &str, message: Inbound, client: ClientChannel) {
        debug!(session = %session_id, kind = message.kind(), "Routing message");

        let Some(children) = &self.children else {
            tokio::spawn(reply_now(client, ClientReply::error("Service is shutting down")));
            return;
        };

        match message {
            Inbound::RawQuery(term) => {
                self.tell_coordinator(session_id, CoordinatorMsg::Query(term), client)
            }
            Inbound::SearchHistory => self.tell_coordinator(session_id, CoordinatorMsg::History, client),
            Inbound::WordStatsForQuery(term) => {
                let (tx, rx) = oneshot::channel();
                let search = SearchMsg::Search {
                    term: term.clone(),
                    limit: Some(QUERY_STATS_VIDEOS),
                    reply: tx,
                };
                match children.backends.search.try_tell(search) {
                    Ok(()) => {
                        let word_stats = children.backends.word_stats.clone();
                        tokio::spawn(query_word_stats(client, word_stats, term, rx));
                    }
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::VideoDetailsRequest(video_id) => {
                let (tx, rx) = oneshot::channel();
                let requested = video_id.clone();
                match children
                    .tags
                    .try_tell(TagMsg::VideoDetails { video_id, reply: tx })
                {
                    Ok(()) => relay(client, "tags", rx, move |video| ClientReply::VideoDetails {
                        video_id: requested,
                        video,
                    }),
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::TagLookup(tag) => {
                let (tx, rx) = oneshot::channel();
                match children.tags.try_tell(TagMsg::Lookup { tag, reply: tx }) {
                    Ok(()) => relay(client, "tags", rx, |found| ClientReply::TagResults {
                        tag: found.tag,
                        videos: found.videos,
                    }),
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::ChannelProfileRequest(channel_id) => {
                let (tx, rx) = oneshot::channel();
                match children
                    .channel
                    .try_tell(ChannelMsg::Fetch { channel_id, reply: tx })
                {
                    Ok(()) => relay(client, "channel-profile", rx, |data| ClientReply::ChannelProfile {
                        channel_info: data.channel_info,
                        videos: data.videos,
                    }),
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::WordFrequencyBatch(texts) => {
                let (tx, rx) = oneshot::channel();
                let merge = WordStatsMsg::Merge {
                    texts,
                    reply: Some(tx),
                };
                match children.backends.word_stats.try_tell(merge) {
                    Ok(()) => relay(client, "word-stats", rx, |word_stats| ClientReply::WordStats {
                        word_stats,
                    }),
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::CumulativeStatsRequest => {
                let (tx, rx) = oneshot::channel();
                match children
                    .backends
                    .word_stats
                    .try_tell(WordStatsMsg::Snapshot { reply: tx })
                {
                    Ok(()) => relay(client, "word-stats", rx, |word_stats| ClientReply::WordStats {
                        word_stats,
                    }),
                    Err(e) => {
                        tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
                    }
                }
            }
            Inbound::Unrecognized(type_name) => {
                warn!(session = %session_id, "Unknown message type '{}'", type_name);
                tokio::spawn(reply_now(client, ClientReply::unknown_message_type()));
            }
        }
    }

    fn tell_coordinator(&self, session_id: &str, msg: CoordinatorMsg, client: ClientChannel) {
        let Some(session) = self.sessions.get(session_id) else {
            tokio::spawn(reply_now(client, ClientReply::error("Unknown session")));
            return;
        };
        if let Err(e) = session.coordinator.try_tell(msg) {
            warn!(session = %session_id, "Request not accepted: {}", e);
            tokio::spawn(reply_now(client, ClientReply::error(e.to_string())));
        }
    }

    async fn shutdown(&mut self) {
        info!("Supervisor shutting down");

        // Dropping the last strong addresses lets every mailbox drain and close
        let session_handles: Vec<_> = self.sessions.drain().map(|(_, s)| s.handle).collect();
        self.children = None;

        let mut handles = std::mem::take(&mut self.handles);
        handles.extend(session_handles);
        match tokio::time::timeout(SHUTDOWN_GRACE, join_all(handles)).await {
            Ok(_) => info!("All workers stopped"),
            Err(_) => warn!(
                "Workers still running after {:?}: {}",
                SHUTDOWN_GRACE,
                self.statuses
                    .iter()
                    .filter(|s| !s.is_stopped())
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}
