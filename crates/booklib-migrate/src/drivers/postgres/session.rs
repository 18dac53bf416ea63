//! A single PostgreSQL connection owned for the duration of a run.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which side of the migration a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Legacy database, read only.
    Source,
    /// New database, append only.
    Target,
}

impl SessionRole {
    fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Source => "source",
            SessionRole::Target => "target",
        }
    }
}

/// One logical connection to a database.
///
/// The connection task is driven in the background and aborted when the
/// session is dropped, so the socket is released on every exit path.
pub struct PgSession {
    client: Client,
    connection: JoinHandle<()>,
    role: SessionRole,
}

impl PgSession {
    /// Open a session using the given configuration.
    pub async fn connect(config: &DatabaseConfig, role: SessionRole) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("booklib-migrate");
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.keepalives(true);

        let connect_err = |e: tokio_postgres::Error| MigrateError::Connection {
            side: role.as_str().to_string(),
            message: format!("{}:{}/{}: {}", config.host, config.port, config.database, e),
        };

        let (client, connection) = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
            None => {
                warn!(
                    "{} TLS is disabled. Credentials will be transmitted in plaintext.",
                    role.as_str()
                );
                let (client, conn) = pg_config.connect(NoTls).await.map_err(connect_err)?;
                (client, tokio::spawn(drive(conn, role)))
            }
            Some(tls) => {
                let (client, conn) = pg_config.connect(tls).await.map_err(connect_err)?;
                (client, tokio::spawn(drive(conn, role)))
            }
        };

        info!(
            "Connected to {} database: {}:{}/{}",
            role.as_str(),
            config.host,
            config.port,
            config.database
        );

        Ok(Self {
            client,
            connection,
            role,
        })
    }

    /// Shared access to the client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Exclusive access to the client, needed to open transactions.
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        debug!("Closing {} session", self.role.as_str());
        self.connection.abort();
    }
}

async fn drive<F>(connection: F, role: SessionRole)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    if let Err(e) = connection.await {
        error!("{} connection closed with error: {}", role.as_str(), e);
    }
}
