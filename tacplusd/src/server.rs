//! The listener: accept, resolve policy, and spawn one task per connection.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tracing::{info, info_span, warn, Instrument};

use crate::connection::{Connection, ConnectionSettings};
use crate::metrics::metrics;
use crate::secrets::SecretProvider;

/// Server-level tunables.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// How long one `accept` may block before the loop re-checks for
    /// shutdown; also bounds how stale a cancellation can go unnoticed.
    pub accept_timeout: Duration,

    /// Bounded wait for in-flight connections during graceful shutdown.
    pub shutdown_grace: Duration,

    /// Per-connection deadlines and transport options.
    pub connection: ConnectionSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            accept_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            connection: ConnectionSettings::default(),
        }
    }
}

/// The TACACS+ server: a listener plus the secret provider that equips each
/// accepted connection with its key and root handler.
pub struct Server {
    secrets: Arc<dyn SecretProvider>,
    settings: ServerSettings,
}

impl Server {
    /// Assembles a server from its collaborators.
    pub fn new(secrets: Arc<dyn SecretProvider>, settings: ServerSettings) -> Self {
        Self { secrets, settings }
    }

    /// Accepts connections until cancelled, then drains with a bounded wait.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        let tracker = TaskTracker::new();

        info!(listen = %listener.local_addr()?, "serving TACACS+");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = timeout(self.settings.accept_timeout, listener.accept()) => accepted,
            };

            // the accept deadline lapsed; loop around to observe cancellation
            let Ok(accept_result) = accepted else {
                continue;
            };

            let (stream, remote_address) = match accept_result {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            };

            metrics().connection_accepted();

            // one policy lookup per connection, before any packet is read
            let Some(policy) = self.secrets.get(remote_address) else {
                warn!(remote = %remote_address, "no scope covers client, dropping connection");
                metrics().connection_rejected();
                continue;
            };

            if let Err(error) = stream.set_nodelay(true) {
                warn!(remote = %remote_address, %error, "failed to set TCP_NODELAY");
            }

            let connection = Connection::new(
                stream,
                policy,
                remote_address,
                self.settings.connection.clone(),
                cancel.child_token(),
            );

            let span = info_span!("connection", remote = %remote_address);
            tracker.spawn(connection.run().instrument(span));
        }

        info!(active = tracker.len(), "shutting down, draining connections");
        tracker.close();

        if timeout(self.settings.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                active = tracker.len(),
                "shutdown grace period expired with connections still active"
            );
        }

        Ok(())
    }
}
