//! The per-peer link task: connect, authenticate, stream, retry.

use crate::config::LinkSettings;
use crate::error::{LinkError, WireError};
use crate::stats::LinkShared;
use crate::tls::build_connector;
use crate::wire::{read_frame, write_encoded, write_frame, EncodedFrame, Frame};
use fedlink_registry::{PeerCredentials, PeerSnapshot, StatusChange};
use fedlink_types::Protocol;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};

/// A status transition reported by a link to the status writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub peer_id: i64,
    pub change: StatusChange,
}

/// Where and how to connect. Built from a snapshot when the link starts.
#[derive(Clone)]
pub(crate) struct LinkTarget {
    pub(crate) address: String,
    pub(crate) port: u16,
    pub(crate) protocol: Protocol,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) credentials: PeerCredentials,
}

impl From<&PeerSnapshot> for LinkTarget {
    fn from(snapshot: &PeerSnapshot) -> Self {
        Self {
            address: snapshot.address.clone(),
            port: snapshot.port,
            protocol: snapshot.protocol,
            username: snapshot.username.clone(),
            password: snapshot.password.clone(),
            credentials: snapshot.credentials.clone(),
        }
    }
}

pub(crate) struct LinkContext {
    pub(crate) peer_id: i64,
    pub(crate) target: LinkTarget,
    pub(crate) settings: Arc<LinkSettings>,
    pub(crate) shared: Arc<LinkShared>,
    pub(crate) reports: mpsc::UnboundedSender<StatusReport>,
}

impl LinkContext {
    fn report(&self, change: StatusChange) {
        self.shared.set_status(change.status());
        let _ = self.reports.send(StatusReport {
            peer_id: self.peer_id,
            change,
        });
    }
}

trait PeerIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> PeerIo for T {}

type PeerStream = Box<dyn PeerIo>;

/// Resolves when the supervisor asks the link to stop, or drops the sender.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

/// Runs until stopped, reconnecting with backoff after every failure.
///
/// Never reports `Disconnected` itself: the supervisor does that after the
/// task has exited, so it is always the last report for this run.
pub(crate) async fn run_link(ctx: LinkContext, mut stop: watch::Receiver<bool>) {
    let addr = format!("{}:{}", ctx.target.address, ctx.target.port);
    let mut failures: u32 = 0;

    loop {
        ctx.report(StatusChange::Connecting);

        let mut connected_at = None;
        let error = tokio::select! {
            _ = stopped(&mut stop) => break,
            result = attempt(&ctx, &mut connected_at) => match result {
                Ok(never) => match never {},
                Err(e) => e,
            },
        };

        let lived = connected_at.map(|t: Instant| t.elapsed());
        if lived.is_some_and(|d| d >= ctx.settings.heartbeat_interval) {
            failures = 0;
        }

        if failures < 3 || failures % 30 == 0 {
            tracing::warn!(
                peer_id = ctx.peer_id,
                %addr,
                attempt = failures + 1,
                lived_secs = lived.map(|d| d.as_secs()),
                "federation link failed: {error}"
            );
        } else {
            tracing::debug!(peer_id = ctx.peer_id, %addr, attempt = failures + 1, "federation link still failing: {error}");
        }
        ctx.report(StatusChange::Failed {
            error: error.to_string(),
        });

        let delay = ctx.settings.backoff.delay(failures, &mut rand::thread_rng());
        failures = failures.saturating_add(1);
        tokio::select! {
            _ = stopped(&mut stop) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(peer_id = ctx.peer_id, %addr, "federation link stopped");
}

/// One connect attempt and, if it succeeds, the whole session.
///
/// Only ever returns an error: a session that ends cleanly is still a
/// session that needs a reconnect.
async fn attempt(ctx: &LinkContext, connected_at: &mut Option<Instant>) -> Result<Infallible, LinkError> {
    let settings = &ctx.settings;
    let target = &ctx.target;

    let tcp = timeout(
        settings.connect_timeout,
        TcpStream::connect((target.address.as_str(), target.port)),
    )
    .await
    .map_err(|_| LinkError::ConnectTimeout(settings.connect_timeout))?
    .map_err(|source| LinkError::Connect {
        address: format!("{}:{}", target.address, target.port),
        source,
    })?;
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(peer_id = ctx.peer_id, "failed to set TCP_NODELAY: {e}");
    }

    let stream = timeout(
        settings.handshake_timeout,
        handshake(tcp, target, settings.max_frame_bytes),
    )
        .await
        .map_err(|_| LinkError::HandshakeTimeout(settings.handshake_timeout))??;

    *connected_at = Some(Instant::now());
    run_session(ctx, stream).await
}

async fn handshake(
    tcp: TcpStream,
    target: &LinkTarget,
    max_frame_bytes: usize,
) -> Result<PeerStream, LinkError> {
    let mut stream: PeerStream = match target.protocol {
        Protocol::Tcp => Box::new(tcp),
        Protocol::Ssl => {
            let connector = build_connector(&target.credentials, target.password.as_deref())?;
            Box::new(connector.connect(&target.address, tcp).await?)
        }
    };

    if let Some(username) = &target.username {
        write_frame(
            &mut stream,
            &Frame::Auth {
                username: username.clone(),
                password: target.password.clone().unwrap_or_default(),
            },
        )
        .await?;

        match read_frame(&mut stream, max_frame_bytes).await? {
            Frame::AuthResult { ok: true, .. } => {}
            Frame::AuthResult { ok: false, reason } => {
                return Err(LinkError::AuthRejected(
                    reason.unwrap_or_else(|| "no reason given".to_string()),
                ))
            }
            other => {
                return Err(LinkError::Protocol(format!(
                    "expected auth_result, got {other:?}"
                )))
            }
        }
    }

    Ok(stream)
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A session's outbound queue, published to the router while it lives.
///
/// On drop the queue is withdrawn and whatever is still in it is counted
/// as failed, however the session ended.
struct OutboundQueue {
    shared: Arc<LinkShared>,
    rx: mpsc::Receiver<EncodedFrame>,
}

impl OutboundQueue {
    fn open(shared: Arc<LinkShared>, depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        shared.attach(tx);
        Self { shared, rx }
    }
}

impl Drop for OutboundQueue {
    fn drop(&mut self) {
        self.shared.detach();
        self.rx.close();
        let mut dropped = 0u64;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued events of closed session");
        }
        self.shared.record_failed(dropped);
    }
}

async fn read_loop(
    mut reader: ReadHalf<PeerStream>,
    inbound: mpsc::Sender<Result<Frame, WireError>>,
    max_frame_bytes: usize,
) {
    loop {
        let frame = read_frame(&mut reader, max_frame_bytes).await;
        let failed = frame.is_err();
        if inbound.send(frame).await.is_err() || failed {
            return;
        }
    }
}

async fn run_session(ctx: &LinkContext, stream: PeerStream) -> Result<Infallible, LinkError> {
    let settings = &ctx.settings;
    let (reader, mut writer) = tokio::io::split(stream);

    let (inbound_tx, mut inbound) = mpsc::channel(16);
    let _reader = AbortOnDrop(tokio::spawn(read_loop(
        reader,
        inbound_tx,
        settings.max_frame_bytes,
    )));

    let mut queue = OutboundQueue::open(Arc::clone(&ctx.shared), settings.queue_depth);
    ctx.report(StatusChange::Connected {
        at: chrono::Utc::now().to_rfc3339(),
    });
    tracing::info!(
        peer_id = ctx.peer_id,
        address = %ctx.target.address,
        port = ctx.target.port,
        protocol = %ctx.target.protocol,
        "federation link established"
    );

    let ping = crate::wire::encode_frame(&Frame::Ping, settings.max_frame_bytes)?;
    let pong = crate::wire::encode_frame(&Frame::Pong, settings.max_frame_bytes)?;

    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            Some(event) = queue.rx.recv() => {
                match timeout(settings.write_timeout, write_encoded(&mut writer, &event)).await {
                    Ok(Ok(())) => ctx.shared.record_sent(),
                    Ok(Err(e)) => {
                        ctx.shared.record_failed(1);
                        return Err(e.into());
                    }
                    Err(_) => {
                        ctx.shared.record_failed(1);
                        return Err(LinkError::WriteTimeout(settings.write_timeout));
                    }
                }
            }

            frame = inbound.recv() => {
                match frame {
                    Some(Ok(Frame::Ping)) => {
                        last_inbound = Instant::now();
                        timeout(settings.write_timeout, write_encoded(&mut writer, &pong))
                            .await
                            .map_err(|_| LinkError::WriteTimeout(settings.write_timeout))??;
                    }
                    Some(Ok(Frame::Pong)) | Some(Ok(Frame::Event { .. })) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(other)) => {
                        return Err(LinkError::Protocol(format!("unexpected frame {other:?}")));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(WireError::Closed.into()),
                }
            }

            _ = heartbeat.tick() => {
                if last_inbound.elapsed() >= settings.heartbeat_timeout {
                    let _ = writer.shutdown().await;
                    return Err(LinkError::HeartbeatTimeout(settings.heartbeat_timeout));
                }
                timeout(settings.write_timeout, write_encoded(&mut writer, &ping))
                    .await
                    .map_err(|_| LinkError::WriteTimeout(settings.write_timeout))??;
            }
        }
    }
}
