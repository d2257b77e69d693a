//! Connection broker.
//!
//! One per process. Publishes a rendezvous on the primary output, then runs
//! the primary pipeline and an accept loop side by side. Every accepted
//! socket gets its own thread: token check first, then a private pipeline
//! with a freshly built processor. The broker returns as soon as the
//! primary pipeline is done.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, never, select, Sender};

use crate::constants::{env as env_keys, ACCEPT_BACKOFF_MAX, ACCEPT_BACKOFF_MIN, DEFAULT_PATH_PREFIX};
use crate::server::auth::authenticate;
use crate::server::rendezvous::{Rendezvous, Token};
use crate::server::types::BrokerError;
use crate::stream::pipeline::run_pipeline;
use crate::stream::processor::ProcessorFactory;
use crate::stream::types::{PipelineConfig, PipelineError};
use crate::telemetry::{PipelineCounters, PipelineReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub pipeline: PipelineConfig,
    /// Directory plus file stem for the socket; must be 8 bytes.
    pub path_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, BrokerError> {
        Ok(Self {
            pipeline: PipelineConfig::from_env()?,
            path_prefix: env::var(env_keys::PATH_PREFIX).unwrap_or_else(|_| DEFAULT_PATH_PREFIX.to_string()),
        })
    }
}

/// Outcome of one `serve` call.
#[derive(Debug)]
pub struct BrokerReport {
    pub primary: Result<PipelineReport, PipelineError>,
    /// Socket connections that presented the right token.
    pub admitted: u64,
    pub rejected: u64,
    /// Summed counters of client pipelines that finished before shutdown.
    pub clients: PipelineCounters,
}

#[derive(Debug, Default)]
struct Admissions {
    admitted: AtomicU64,
    rejected: AtomicU64,
    traffic: Mutex<PipelineCounters>,
}

/// Clones of live client sockets, kept so shutdown can close them.
type Registry = Arc<Mutex<HashMap<u64, UnixStream>>>;

/// Removes the socket path when dropped.
struct EndpointGuard {
    path: PathBuf,
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "[BROKER] failed to remove socket path");
            }
        }
    }
}

enum Event {
    PrimaryDone(Result<PipelineReport, PipelineError>),
    Accepted(UnixStream),
    AcceptLoopGone,
}

pub struct ConnectionBroker<F> {
    config: BrokerConfig,
    factory: Arc<F>,
    rendezvous: Arc<Rendezvous>,
}

impl<F> ConnectionBroker<F>
where
    F: ProcessorFactory + 'static,
{
    /// Validate the config and draw the address and token.
    ///
    /// `BrokerError::InvariantViolation` here means the address could not
    /// be rendered at its fixed width; callers treat it as fatal.
    pub fn new(config: BrokerConfig, factory: F) -> Result<Self, BrokerError> {
        config.pipeline.validate()?;
        let rendezvous = Rendezvous::generate(&config.path_prefix)?;
        Ok(Self {
            config,
            factory: Arc::new(factory),
            rendezvous: Arc::new(rendezvous),
        })
    }

    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Bind, announce on `primary_out`, and serve until the primary pipeline
    /// over `primary_in`/`primary_out` finishes.
    ///
    /// Client connections still open at that point are shut down in both
    /// directions and the socket path is removed.
    pub fn serve<R, W>(self, primary_in: R, mut primary_out: W) -> Result<BrokerReport, BrokerError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let path = self.rendezvous.address.path().to_path_buf();
        let listener = UnixListener::bind(&path).map_err(|source| BrokerError::Bind {
            path: path.clone(),
            source,
        })?;
        let _endpoint = EndpointGuard { path: path.clone() };

        primary_out
            .write_all(&self.rendezvous.encode())
            .and_then(|_| primary_out.flush())
            .map_err(BrokerError::Publish)?;
        tracing::info!(path = %path.display(), "[BROKER] listening");

        // ---- Primary pipeline ----
        let (done_tx, done_rx) = bounded::<Result<PipelineReport, PipelineError>>(1);
        let factory = Arc::clone(&self.factory);
        let pipeline = self.config.pipeline;
        thread::Builder::new()
            .name("batchpipe-primary".into())
            .spawn(move || {
                let span = tracing::info_span!("pipeline", conn = "primary");
                let _enter = span.enter();
                let _ = done_tx.send(run_pipeline(primary_in, primary_out, factory.as_ref(), &pipeline));
            })
            .map_err(|source| BrokerError::Spawn { task: "primary", source })?;

        // ---- Accept loop ----
        let (conn_tx, conn_rx) = bounded::<UnixStream>(0);
        let closing = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let closing = Arc::clone(&closing);
            thread::Builder::new()
                .name("batchpipe-accept".into())
                .spawn(move || accept_loop(listener, conn_tx, closing))
                .map_err(|source| BrokerError::Spawn { task: "accept", source })?
        };

        // ---- Broker loop ----
        let registry: Registry = Arc::default();
        let admissions = Arc::new(Admissions::default());
        let idle = never::<UnixStream>();
        let mut accepting = true;
        let mut next_id = 0u64;

        let primary = loop {
            let incoming = if accepting { &conn_rx } else { &idle };
            let event = select! {
                recv(done_rx) -> msg => Event::PrimaryDone(
                    msg.unwrap_or(Err(PipelineError::Panicked("primary pipeline"))),
                ),
                recv(incoming) -> msg => match msg {
                    Ok(stream) => Event::Accepted(stream),
                    Err(_) => Event::AcceptLoopGone,
                },
            };

            match event {
                Event::PrimaryDone(result) => break result,
                Event::Accepted(stream) => {
                    next_id += 1;
                    self.spawn_client(next_id, stream, &registry, &admissions);
                }
                Event::AcceptLoopGone => {
                    tracing::warn!("[BROKER] accept loop ended, serving primary channel only");
                    accepting = false;
                }
            }
        };

        // ---- Shutdown ----
        closing.store(true, Ordering::SeqCst);
        drop(conn_rx);
        match UnixStream::connect(&path) {
            Ok(_) => {
                if acceptor.join().is_err() {
                    tracing::warn!("[BROKER] accept thread panicked");
                }
            }
            Err(e) => tracing::debug!(error = %e, "[BROKER] could not wake accept loop, leaving it detached"),
        }

        let open: Vec<(u64, UnixStream)> = registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (id, stream) in open {
            tracing::debug!(id, "[BROKER] force-closing client connection");
            let _ = stream.shutdown(Shutdown::Both);
        }

        let report = BrokerReport {
            primary,
            admitted: admissions.admitted.load(Ordering::SeqCst),
            rejected: admissions.rejected.load(Ordering::SeqCst),
            clients: admissions.traffic.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        };
        tracing::info!(
            admitted = report.admitted,
            rejected = report.rejected,
            client_bytes = report.clients.bytes_written,
            primary_ok = report.primary.is_ok(),
            "[BROKER] shut down"
        );
        Ok(report)
    }

    fn spawn_client(&self, id: u64, stream: UnixStream, registry: &Registry, admissions: &Arc<Admissions>) {
        match stream.try_clone() {
            Ok(handle) => {
                registry.lock().unwrap_or_else(PoisonError::into_inner).insert(id, handle);
            }
            Err(e) => tracing::warn!(id, error = %e, "[BROKER] cannot track connection for shutdown"),
        }

        let rendezvous = Arc::clone(&self.rendezvous);
        let factory = Arc::clone(&self.factory);
        let pipeline = self.config.pipeline;
        let admissions = Arc::clone(admissions);
        let thread_registry = Arc::clone(registry);

        let spawned = thread::Builder::new()
            .name(format!("batchpipe-conn-{id}"))
            .spawn(move || {
                let span = tracing::info_span!("connection", id);
                let _enter = span.enter();
                handle_connection(stream, &rendezvous.token, factory.as_ref(), &pipeline, &admissions);
                // A reader left behind by a failed writer still owns the
                // socket; shutting it down here lets that thread see EOF.
                let handle = thread_registry.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
                if let Some(handle) = handle {
                    let _ = handle.shutdown(Shutdown::Both);
                }
            });

        if let Err(e) = spawned {
            tracing::warn!(id, error = %e, "[BROKER] failed to spawn connection thread");
            registry.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        }
    }
}

/// Stdio flavour: stdin/stdout are the primary channel.
pub fn serve_stdio<F>(config: BrokerConfig, factory: F) -> Result<BrokerReport, BrokerError>
where
    F: ProcessorFactory + 'static,
{
    ConnectionBroker::new(config, factory)?.serve(io::stdin(), io::stdout())
}

/// Delay before retrying after `failures` consecutive accept errors:
/// doubles from `ACCEPT_BACKOFF_MIN` and saturates at `ACCEPT_BACKOFF_MAX`.
fn accept_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_MIN.saturating_mul(factor).min(ACCEPT_BACKOFF_MAX)
}

fn accept_loop(listener: UnixListener, conn_tx: Sender<UnixStream>, closing: Arc<AtomicBool>) {
    let mut failures = 0u32;
    loop {
        let accepted = listener.accept();
        if closing.load(Ordering::SeqCst) {
            break;
        }
        match accepted {
            Ok((stream, _)) => {
                failures = 0;
                if conn_tx.send(stream).is_err() {
                    break;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                tracing::warn!(error = %e, failures, ?delay, "[ACCEPT] accept error, backing off");
                thread::sleep(delay);
            }
        }
    }
    tracing::debug!("[ACCEPT] loop finished");
}

fn handle_connection<F>(
    mut stream: UnixStream,
    token: &Token,
    factory: &F,
    config: &PipelineConfig,
    admissions: &Admissions,
) where
    F: ProcessorFactory + ?Sized,
{
    if let Err(e) = authenticate(&mut stream, token) {
        admissions.rejected.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(error = %e, "[AUTH] rejecting connection");
        return;
    }
    admissions.admitted.fetch_add(1, Ordering::SeqCst);

    let sink = match stream.try_clone() {
        Ok(sink) => sink,
        Err(e) => {
            tracing::warn!(error = %e, "[BROKER] cannot split connection");
            return;
        }
    };

    match run_pipeline(stream, sink, factory, config) {
        Ok(report) => {
            tracing::debug!(report = %report.to_json(), "[BROKER] connection finished");
            *admissions.traffic.lock().unwrap_or_else(PoisonError::into_inner) += report.counters;
        }
        Err(e) => tracing::warn!(error = %e, "[BROKER] connection pipeline failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_backoff_doubles_then_saturates() {
        assert_eq!(accept_backoff(1), ACCEPT_BACKOFF_MIN);
        assert_eq!(accept_backoff(2), ACCEPT_BACKOFF_MIN * 2);
        assert_eq!(accept_backoff(3), ACCEPT_BACKOFF_MIN * 4);
        assert_eq!(accept_backoff(40), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
        assert!((1..64).all(|n| accept_backoff(n) >= ACCEPT_BACKOFF_MIN));
    }
}
