//! The Lifecycle Supervisor: starts every long-running [`Service`] in
//! parallel, waits for an interrupt/term signal or an explicit [`close`],
//! broadcasts shutdown, and tears down shared resources exactly once.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::GeoError;

/// The default grace period the Supervisor waits for every service's done
/// signal before giving up on it.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// A resource-release hook, run once in registration order after every
/// service has shut down (or the deadline has passed).
pub type ReleaseHook = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Capability the Supervisor requires of anything it starts.
#[async_trait]
pub trait Service: Send {
    /// Label used in logs and in [`GeoError::ShutdownDeadlineExceeded`].
    fn name(&self) -> &str;

    /// Textual address, for logs only.
    fn addr(&self) -> String;

    /// Receive the broadcast shutdown signal. Implementations should hold
    /// onto `shutdown` and observe it (typically via `tokio::select!`)
    /// inside `start`.
    fn bind_shutdown(&mut self, shutdown: CancellationToken);

    /// Block until shutdown completes or an unrecoverable error occurs.
    async fn start(self: Box<Self>) -> Result<(), GeoError>;
}

/// Owns the single broadcast shutdown signal and drives the start/stop
/// sequence for a batch of services.
pub struct Supervisor {
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor { shutdown: CancellationToken::new() }
    }

    /// An external trigger equivalent to a signal. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Starts every service, blocks until a signal or [`Supervisor::close`]
    /// arrives, broadcasts shutdown, waits up to `deadline` for every
    /// service to acknowledge, then runs `release_hooks` in order.
    ///
    /// Returns [`GeoError::ShutdownDeadlineExceeded`] naming the first
    /// service that missed the deadline, or any error a service itself
    /// returned, but always runs every release hook first.
    pub async fn run(
        &self,
        mut services: Vec<Box<dyn Service>>,
        release_hooks: Vec<ReleaseHook>,
        deadline: Duration,
    ) -> Result<(), GeoError> {
        for service in &mut services {
            service.bind_shutdown(self.shutdown.clone());
        }

        let handles: Vec<(String, tokio::task::JoinHandle<Result<(), GeoError>>)> = services
            .into_iter()
            .map(|service| {
                let name = service.name().to_owned();
                info!(service = %name, addr = %service.addr(), "starting service");
                (name, tokio::spawn(service.start()))
            })
            .collect();

        tokio::select! {
            () = wait_for_termination_signal() => {
                info!("received termination signal");
            }
            () = self.shutdown.cancelled() => {
                info!("shutdown requested");
            }
        }
        self.shutdown.cancel();

        let deadline_at = tokio::time::Instant::now() + deadline;
        let outcomes = join_all(handles.into_iter().map(|(name, handle)| async move {
            let remaining = deadline_at.saturating_duration_since(tokio::time::Instant::now());
            let result = match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => {
                    Err(GeoError::Setup(format!("service {} panicked: {}", name, join_err)))
                }
                Err(_elapsed) => Err(GeoError::ShutdownDeadlineExceeded(name.clone())),
            };
            (name, result)
        }))
        .await;

        for hook in release_hooks {
            hook.await;
        }

        let mut first_error = None;
        for (name, result) in outcomes {
            if let Err(err) = result {
                info!(service = %name, error = %err, "service did not shut down cleanly");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Supervisor::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Probe {
        name: &'static str,
        shutdown: Option<CancellationToken>,
    }

    #[async_trait]
    impl Service for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn addr(&self) -> String {
            "n/a".to_owned()
        }

        fn bind_shutdown(&mut self, shutdown: CancellationToken) {
            self.shutdown = Some(shutdown);
        }

        async fn start(self: Box<Self>) -> Result<(), GeoError> {
            self.shutdown.expect("bind_shutdown called before start").cancelled().await;
            Ok(())
        }
    }

    struct NeverShutsDown {
        shutdown: Option<CancellationToken>,
    }

    #[async_trait]
    impl Service for NeverShutsDown {
        fn name(&self) -> &str {
            "laggard"
        }

        fn addr(&self) -> String {
            "n/a".to_owned()
        }

        fn bind_shutdown(&mut self, shutdown: CancellationToken) {
            self.shutdown = Some(shutdown);
        }

        async fn start(self: Box<Self>) -> Result<(), GeoError> {
            // Observes shutdown but never returns in time, simulating a
            // laggard that misses the deadline.
            self.shutdown.expect("bind_shutdown called before start").cancelled().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_unblocks_run() {
        let supervisor = Arc::new(Supervisor::new());

        let services: Vec<Box<dyn Service>> = vec![
            Box::new(Probe { name: "grpc", shutdown: None }),
            Box::new(Probe { name: "rest", shutdown: None }),
        ];

        let run_supervisor = supervisor.clone();
        let run = tokio::spawn(async move {
            run_supervisor.run(services, vec![], Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        supervisor.close();
        supervisor.close();

        let result = tokio::time::timeout(Duration::from_secs(1), run).await;
        assert!(result.is_ok(), "run() should unblock once close() is called");
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn shutdown_deadline_exceeded_names_the_laggard() {
        let supervisor = Supervisor::new();
        let close = supervisor.shutdown.clone();

        let services: Vec<Box<dyn Service>> = vec![Box::new(NeverShutsDown { shutdown: None })];

        let run = tokio::spawn(async move {
            supervisor.run(services, vec![], Duration::from_millis(50)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        close.cancel();

        let result = run.await.unwrap();
        assert_eq!(result.unwrap_err(), GeoError::ShutdownDeadlineExceeded("laggard".to_owned()));
    }

    #[tokio::test]
    async fn all_services_acknowledge_before_release_hooks_run() {
        let supervisor = Supervisor::new();
        let close = supervisor.shutdown.clone();
        let released = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicBool::new(false));

        let services: Vec<Box<dyn Service>> = vec![
            Box::new(Probe { name: "grpc", shutdown: None }),
            Box::new(Probe { name: "rest", shutdown: None }),
        ];

        let hook_released = released.clone();
        let hook_started = started.clone();
        let hooks: Vec<ReleaseHook> = vec![Box::pin(async move {
            hook_started.store(true, Ordering::SeqCst);
            hook_released.fetch_add(1, Ordering::SeqCst);
        })];

        let run =
            tokio::spawn(async move { supervisor.run(services, hooks, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        close.cancel();

        let result = run.await.unwrap();
        assert!(result.is_ok());
        assert!(started.load(Ordering::SeqCst));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
