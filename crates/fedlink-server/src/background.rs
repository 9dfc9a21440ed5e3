//! Background tasks for the fedlink server.
//!
//! Includes:
//! - The reconcile loop, which flushes live counters to the registry and
//!   brings the supervisor's links in line with it.
//! - The status writer, the only task that writes link status fields.

use crate::{record_audit, AppState};
use fedlink_db::DbPool;
use fedlink_link::{ReconcileSummary, StatusReport, Supervisor};
use fedlink_observe::EventPayload;
use fedlink_registry::{RegistryError, StatusChange};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Most status reports applied per database round trip.
const STATUS_BATCH: usize = 256;

/// Errors from a single background pass.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("db connection failed: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Starts the reconcile loop.
///
/// Runs once immediately, then every `interval` and whenever a Control API
/// mutation calls [`AppState::request_reconcile`], until `shutdown` flips
/// to `true`.
pub async fn start_reconcile_task(
    state: Arc<AppState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "starting federation reconcile task");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {}
            _ = state.reconcile.notified() => {}
        }

        match reconcile_once(&state).await {
            Ok(summary) => {
                if !summary.is_empty() {
                    tracing::debug!(?summary, "reconcile pass changed links");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "federation reconcile pass failed");
            }
        }
    }

    tracing::info!("federation reconcile task stopped");
}

/// One reconcile pass: persist counters, re-read the registry, apply it.
pub async fn reconcile_once(state: &AppState) -> Result<ReconcileSummary, TaskError> {
    if let Err(e) = flush_counters(&state.pool, &state.supervisor).await {
        tracing::warn!(error = %e, "failed to flush link counters");
    }

    let pool = state.pool.clone();
    let snapshots = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        Ok::<_, TaskError>(fedlink_registry::load_snapshots(&conn)?)
    })
    .await??;

    Ok(state.supervisor.reconcile_all(&snapshots).await)
}

/// Writes the supervisor's live counters to the registry.
///
/// Returns how many peers were updated; peers deleted in the meantime are
/// skipped.
pub async fn flush_counters(pool: &DbPool, supervisor: &Supervisor) -> Result<usize, TaskError> {
    let counters = supervisor.counters();
    if counters.is_empty() {
        return Ok(0);
    }

    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut updated = 0;
        for (peer_id, c) in counters {
            if fedlink_registry::record_counters(&conn, peer_id, c.messages_sent, c.messages_failed)? {
                updated += 1;
            }
        }
        Ok::<_, TaskError>(updated)
    })
    .await?
}

/// Audit entry owed for a status report, decided before the write.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkAudit {
    Connected,
    Failed(String),
    Disconnected,
}

/// Decides whether a report deserves an audit entry.
///
/// `Connecting` never does. A failure repeating the previous one for the
/// same peer is suppressed so a peer stuck in its retry loop does not flood
/// the log.
fn link_audit(last_failure: &mut HashMap<i64, String>, report: &StatusReport) -> Option<LinkAudit> {
    match &report.change {
        StatusChange::Connecting => None,
        StatusChange::Connected { .. } => {
            last_failure.remove(&report.peer_id);
            Some(LinkAudit::Connected)
        }
        StatusChange::Failed { error } => {
            if last_failure.get(&report.peer_id) == Some(error) {
                return None;
            }
            last_failure.insert(report.peer_id, error.clone());
            Some(LinkAudit::Failed(error.clone()))
        }
        StatusChange::Disconnected => {
            last_failure.remove(&report.peer_id);
            Some(LinkAudit::Disconnected)
        }
    }
}

fn apply_status_reports(
    pool: &DbPool,
    work: &[(StatusReport, Option<LinkAudit>)],
) -> Result<usize, TaskError> {
    let conn = pool.get()?;
    let mut applied = 0;
    for (report, audit) in work {
        let peer_id = report.peer_id;
        if !fedlink_registry::record_status(&conn, peer_id, &report.change)? {
            tracing::debug!(peer_id, "status report for deleted peer ignored");
            continue;
        }
        applied += 1;

        let payload = match audit {
            None => continue,
            Some(LinkAudit::Connected) => {
                let peer = fedlink_registry::get_peer(&conn, peer_id)?;
                EventPayload::LinkConnected {
                    address: peer.address,
                    port: peer.port,
                }
            }
            Some(LinkAudit::Failed(error)) => EventPayload::LinkFailed {
                error: error.clone(),
            },
            Some(LinkAudit::Disconnected) => EventPayload::LinkDisconnected,
        };
        record_audit(&conn, Some(peer_id), &payload);
    }
    Ok(applied)
}

/// Starts the status writer.
///
/// Applies link status reports to the registry in arrival order. Exits once
/// every sender (the supervisor and its links) is gone and the queue is
/// drained.
pub async fn start_status_writer(pool: DbPool, mut reports: mpsc::UnboundedReceiver<StatusReport>) {
    tracing::info!("starting federation status writer");
    let mut last_failure: HashMap<i64, String> = HashMap::new();

    while let Some(first) = reports.recv().await {
        let mut batch = vec![first];
        while batch.len() < STATUS_BATCH {
            match reports.try_recv() {
                Ok(report) => batch.push(report),
                Err(_) => break,
            }
        }

        let work: Vec<(StatusReport, Option<LinkAudit>)> = batch
            .into_iter()
            .map(|report| {
                let audit = link_audit(&mut last_failure, &report);
                (report, audit)
            })
            .collect();
        let count = work.len();

        let pool = pool.clone();
        let result = tokio::task::spawn_blocking(move || apply_status_reports(&pool, &work)).await;
        match result {
            Ok(Ok(applied)) => {
                tracing::trace!(received = count, applied, "applied link status reports");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, dropped = count, "failed to apply link status reports");
            }
            Err(e) => {
                tracing::error!(error = %e, "status writer task panicked or was cancelled");
            }
        }
    }

    tracing::info!("federation status writer stopped");
}
