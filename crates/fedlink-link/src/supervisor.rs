//! Owns one link task per enabled peer and keeps the set in line with the
//! registry.

use crate::config::LinkSettings;
use crate::fingerprint::fingerprint;
use crate::session::{run_link, LinkContext, LinkTarget, StatusReport};
use crate::stats::{LinkCounters, LinkShared};
use fedlink_registry::{PeerSnapshot, StatusChange};
use fedlink_types::ConnectionStatus;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

pub(crate) type RouteTable = Arc<RwLock<HashMap<i64, Arc<LinkShared>>>>;

struct LinkHandle {
    fingerprint: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    shared: Arc<LinkShared>,
}

/// Links to stop and links to (re)start, in that order.
#[derive(Default)]
struct Plan {
    stop: Vec<i64>,
    start: Vec<(PeerSnapshot, String, Arc<LinkShared>)>,
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<i64>,
    pub restarted: Vec<i64>,
    pub stopped: Vec<i64>,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.restarted.is_empty() && self.stopped.is_empty()
    }
}

/// The connection supervisor.
///
/// Cheap to clone; all clones drive the same set of links.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Arc<LinkSettings>,
    links: Mutex<HashMap<i64, LinkHandle>>,
    routes: RouteTable,
    reports: mpsc::UnboundedSender<StatusReport>,
}

impl Supervisor {
    /// Creates a supervisor that sends link status changes to `reports`.
    pub fn new(settings: LinkSettings, reports: mpsc::UnboundedSender<StatusReport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Arc::new(settings),
                links: Mutex::new(HashMap::new()),
                routes: Arc::new(RwLock::new(HashMap::new())),
                reports,
            }),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.inner.settings
    }

    pub(crate) fn routes(&self) -> RouteTable {
        Arc::clone(&self.inner.routes)
    }

    /// Brings one peer's link in line with its snapshot.
    ///
    /// Starts the link if the peer is enabled and none is running, restarts
    /// it if the connection fingerprint changed, and stops it if the peer is
    /// disabled. Other peers are left alone.
    pub async fn reconcile(&self, snapshot: &PeerSnapshot) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut links = self.inner.links.lock().await;

        let mut plan = Plan::default();
        self.plan_peer(snapshot, &links, &mut plan, &mut summary);
        self.apply(plan, &mut links).await;
        summary
    }

    /// Brings running links in line with the full set of peers.
    ///
    /// - Peers missing from `snapshots` are stopped and their statistics
    ///   dropped.
    /// - Disabled peers are stopped; their statistics are kept.
    /// - Enabled peers without a link get one. A link whose connection
    ///   fingerprint changed is restarted; a changed routing filter is
    ///   applied in place.
    pub async fn reconcile_all(&self, snapshots: &[PeerSnapshot]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut links = self.inner.links.lock().await;

        let known: HashSet<i64> = snapshots.iter().map(|s| s.id).collect();
        let mut plan = Plan::default();
        plan.stop.extend(links.keys().copied().filter(|id| !known.contains(id)));
        summary.stopped.extend(plan.stop.iter().copied());

        for snapshot in snapshots {
            self.plan_peer(snapshot, &links, &mut plan, &mut summary);
        }

        self.write_routes().retain(|id, _| known.contains(id));
        self.apply(plan, &mut links).await;

        if !summary.is_empty() {
            tracing::info!(
                started = summary.started.len(),
                restarted = summary.restarted.len(),
                stopped = summary.stopped.len(),
                running = links.len(),
                "reconciled federation links"
            );
        }
        summary
    }

    /// Decides what one peer needs without touching any task.
    fn plan_peer(
        &self,
        snapshot: &PeerSnapshot,
        links: &HashMap<i64, LinkHandle>,
        plan: &mut Plan,
        summary: &mut ReconcileSummary,
    ) {
        if !snapshot.enabled {
            if links.contains_key(&snapshot.id) {
                plan.stop.push(snapshot.id);
                summary.stopped.push(snapshot.id);
            }
            return;
        }

        let shared = self.shared_for(snapshot);
        let fp = fingerprint(snapshot);
        match links.get(&snapshot.id) {
            Some(handle) if handle.fingerprint == fp && !handle.task.is_finished() => return,
            Some(_) => {
                plan.stop.push(snapshot.id);
                summary.restarted.push(snapshot.id);
            }
            None => summary.started.push(snapshot.id),
        }
        plan.start.push((snapshot.clone(), fp, shared));
    }

    async fn apply(&self, plan: Plan, links: &mut HashMap<i64, LinkHandle>) {
        let stopping: Vec<(i64, LinkHandle)> = plan
            .stop
            .into_iter()
            .filter_map(|id| links.remove(&id).map(|handle| (id, handle)))
            .collect();
        // Predecessors must be gone before replacements start, so the
        // status reports of one peer never interleave.
        self.stop_links(stopping).await;

        for (snapshot, fp, shared) in plan.start {
            links.insert(snapshot.id, self.spawn_link(&snapshot, fp, shared));
        }
    }

    /// Stops a single peer's link, if running. Idempotent.
    pub async fn disconnect(&self, peer_id: i64) -> bool {
        let handle = self.inner.links.lock().await.remove(&peer_id);
        match handle {
            Some(handle) => {
                self.stop_links(vec![(peer_id, handle)]).await;
                true
            }
            None => false,
        }
    }

    /// Stops every link. Used at shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<(i64, LinkHandle)> = self.inner.links.lock().await.drain().collect();
        let count = handles.len();
        self.stop_links(handles).await;
        tracing::info!(count, "federation links stopped");
    }

    /// Live counters of every peer the supervisor has seen.
    pub fn counters(&self) -> HashMap<i64, LinkCounters> {
        self.read_routes()
            .iter()
            .map(|(id, shared)| (*id, shared.counters()))
            .collect()
    }

    /// Live counters of one peer.
    pub fn counters_for(&self, peer_id: i64) -> Option<LinkCounters> {
        self.read_routes().get(&peer_id).map(|shared| shared.counters())
    }

    /// Number of running link tasks.
    pub async fn running(&self) -> usize {
        self.inner.links.lock().await.len()
    }

    fn read_routes(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, Arc<LinkShared>>> {
        self.inner.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_routes(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, Arc<LinkShared>>> {
        self.inner.routes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the peer's shared state, creating it on first sight.
    fn shared_for(&self, snapshot: &PeerSnapshot) -> Arc<LinkShared> {
        let mut routes = self.write_routes();
        let shared = routes.entry(snapshot.id).or_insert_with(|| {
            Arc::new(LinkShared::new(
                snapshot.messages_sent,
                snapshot.messages_failed,
                snapshot.push_data_types,
            ))
        });
        shared.set_filter(snapshot.push_data_types);
        shared.seed(snapshot.messages_sent, snapshot.messages_failed);
        Arc::clone(shared)
    }

    fn spawn_link(&self, snapshot: &PeerSnapshot, fingerprint: String, shared: Arc<LinkShared>) -> LinkHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = LinkContext {
            peer_id: snapshot.id,
            target: LinkTarget::from(snapshot),
            settings: Arc::clone(&self.inner.settings),
            shared: Arc::clone(&shared),
            reports: self.inner.reports.clone(),
        };
        tracing::debug!(peer_id = snapshot.id, address = %snapshot.address, port = snapshot.port, "starting federation link");
        LinkHandle {
            fingerprint,
            stop: stop_tx,
            task: tokio::spawn(run_link(ctx, stop_rx)),
            shared,
        }
    }

    /// Signals every handle, then waits for them within one grace period.
    async fn stop_links(&self, handles: Vec<(i64, LinkHandle)>) {
        if handles.is_empty() {
            return;
        }
        for (_, handle) in &handles {
            let _ = handle.stop.send_replace(true);
        }

        let deadline = tokio::time::Instant::now() + self.inner.settings.shutdown_grace;
        for (peer_id, mut handle) in handles {
            if tokio::time::timeout_at(deadline, &mut handle.task).await.is_err() {
                tracing::warn!(peer_id, "federation link did not stop in time; aborting");
                handle.task.abort();
                let _ = handle.task.await;
            }
            handle.shared.set_status(ConnectionStatus::Disconnected);
            let _ = self.inner.reports.send(StatusReport {
                peer_id,
                change: StatusChange::Disconnected,
            });
        }
    }
}
