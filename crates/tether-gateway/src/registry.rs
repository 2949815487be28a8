//! Identity-keyed connection registry
//!
//! Exactly one [`Connection`] exists per credential identity, including
//! under concurrent connect requests: creation goes through the map's
//! entry API and logins are serialized inside the connection itself.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tether_core::{ConnectStatus, CredentialIdentity, Credentials, LOGIN_SETTLE_MS};

use crate::client::ChatClientFactory;
use crate::connection::{ConnState, Connection, GatewayEvent};
use crate::error::Result;

/// What a `connect` call resolved to. The status string is the only thing
/// that crosses the wire; `error` stays in the broker log.
#[derive(Debug, Clone)]
pub struct ConnectReport {
    pub identity: CredentialIdentity,
    pub status: ConnectStatus,
    pub error: Option<String>,
}

pub struct ConnectionRegistry {
    connections: DashMap<CredentialIdentity, Arc<Connection>>,
    factory: Arc<dyn ChatClientFactory>,
    fanout: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionRegistry {
    /// `fanout` receives every platform event from every connection; the
    /// router owns the other end.
    pub fn new(
        factory: Arc<dyn ChatClientFactory>,
        fanout: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            factory,
            fanout,
        }
    }

    /// Pure lookup, no side effects.
    pub fn get(&self, identity: &CredentialIdentity) -> Option<Arc<Connection>> {
        self.connections.get(identity).map(|c| c.clone())
    }

    /// Get the connection for an identity, creating (but not logging in)
    /// one if none exists. Concurrent callers converge on the same object.
    fn get_or_create(&self, credentials: &Credentials) -> Result<Arc<Connection>> {
        let identity = CredentialIdentity::derive(credentials);
        if let Some(conn) = self.connections.get(&identity) {
            return Ok(conn.clone());
        }
        match self.connections.entry(identity.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (client, events) = self.factory.create(credentials)?;
                info!("creating connection {}", identity);
                let conn = Connection::spawn(
                    identity,
                    credentials.clone(),
                    client,
                    events,
                    self.fanout.clone(),
                );
                entry.insert(conn.clone());
                Ok(conn)
            }
        }
    }

    /// Connect-or-reuse for one credential set.
    ///
    /// Ready → `already` with no side effects. Connecting → wait a bounded
    /// moment for the in-flight login to settle and re-evaluate. Error →
    /// clear it and retry login on the same connection.
    pub async fn connect(&self, credentials: &Credentials) -> ConnectReport {
        let identity = CredentialIdentity::derive(credentials);

        let conn = match self.get_or_create(credentials) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("could not create connection {}: {}", identity, e);
                return ConnectReport {
                    identity,
                    status: ConnectStatus::Error,
                    error: Some(e.to_string()),
                };
            }
        };

        match conn.state() {
            ConnState::Ready => {
                return ConnectReport {
                    identity,
                    status: ConnectStatus::Already,
                    error: None,
                }
            }
            ConnState::Connecting => {
                let settled = conn
                    .wait_settled(Duration::from_millis(LOGIN_SETTLE_MS))
                    .await;
                match settled {
                    ConnState::Ready => {
                        return ConnectReport {
                            identity,
                            status: ConnectStatus::Already,
                            error: None,
                        }
                    }
                    ConnState::Connecting => {
                        return ConnectReport {
                            identity,
                            status: ConnectStatus::Error,
                            error: Some("login in progress, please wait".to_string()),
                        }
                    }
                    ConnState::Error => {
                        info!("retrying connection {} after failed login", identity);
                        conn.clear_error();
                    }
                    ConnState::Idle => {}
                }
            }
            ConnState::Error => {
                info!("retrying connection {} after previous error", identity);
                conn.clear_error();
            }
            ConnState::Idle => {}
        }

        // The login runs detached so its ceiling enforcement survives even
        // if this caller's request is cancelled mid-wait.
        let login = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.login().await })
        };
        match login.await {
            Ok(Ok(())) => ConnectReport {
                identity,
                status: ConnectStatus::Ready,
                error: None,
            },
            Ok(Err(e)) => ConnectReport {
                identity,
                status: ConnectStatus::Error,
                error: Some(conn.last_error().unwrap_or_else(|| e.to_string())),
            },
            Err(join_error) => ConnectReport {
                identity,
                status: ConnectStatus::Error,
                error: Some(format!("login task failed: {}", join_error)),
            },
        }
    }

    /// Resolve a ready connection, connecting on demand if necessary.
    pub async fn resolve_ready(&self, credentials: &Credentials) -> Result<Arc<Connection>> {
        let identity = CredentialIdentity::derive(credentials);
        if let Some(conn) = self.get(&identity) {
            if conn.is_ready() {
                return Ok(conn);
            }
        }
        let report = self.connect(credentials).await;
        match report.status {
            ConnectStatus::Ready | ConnectStatus::Already => self
                .get(&identity)
                .ok_or_else(|| crate::error::GatewayError::NotReady),
            _ => Err(crate::error::GatewayError::Platform(
                report
                    .error
                    .unwrap_or_else(|| "connection not available".to_string()),
            )),
        }
    }

    /// Tear down the client and remove the entry.
    pub async fn disconnect(&self, identity: &CredentialIdentity) {
        if let Some((_, conn)) = self.connections.remove(identity) {
            conn.shutdown().await;
            info!("connection {} disconnected and removed", identity);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{GuildFixture, LoopbackFactory, LoopbackWorld};

    fn world() -> LoopbackWorld {
        LoopbackWorld::new("bot-user")
            .with_guild(GuildFixture::new("g1", "Guild One").with_channel("c1", "general"))
    }

    fn registry(factory: LoopbackFactory) -> (Arc<LoopbackFactory>, ConnectionRegistry) {
        let factory = Arc::new(factory);
        let (fanout, _events) = mpsc::unbounded_channel();
        let registry = ConnectionRegistry::new(factory.clone(), fanout);
        (factory, registry)
    }

    #[tokio::test]
    async fn first_connect_is_ready_second_is_already() {
        let (_factory, registry) = registry(LoopbackFactory::new(world()));
        let creds = Credentials::new("A", "T");

        let first = registry.connect(&creds).await;
        assert_eq!(first.status, ConnectStatus::Ready);

        let second = registry.connect(&creds).await;
        assert_eq!(second.status, ConnectStatus::Already);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_converge_on_one_client_session() {
        let (factory, registry) = registry(LoopbackFactory::new(world()));
        let registry = Arc::new(registry);
        let creds = Credentials::new("A", "T");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let creds = creds.clone();
            handles.push(tokio::spawn(async move { registry.connect(&creds).await }));
        }
        for handle in handles {
            let report = handle.await.unwrap();
            assert!(matches!(
                report.status,
                ConnectStatus::Ready | ConnectStatus::Already
            ));
        }
        assert_eq!(factory.created(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_login_reports_error_and_is_retryable() {
        let (factory, registry) = registry(LoopbackFactory::new(world()).reject_token("bad"));
        let creds = Credentials::new("A", "bad");

        let report = registry.connect(&creds).await;
        assert_eq!(report.status, ConnectStatus::Error);
        assert!(report.error.is_some());

        // The entry survives in Error state so the retry reuses it.
        assert_eq!(registry.len(), 1);
        factory.pardon_token("bad");

        let retry = registry.connect(&creds).await;
        assert_eq!(retry.status, ConnectStatus::Ready);
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn login_in_progress_settles_or_reports_error() {
        let (_factory, registry) = registry(LoopbackFactory::new(world()).silent_token("slow"));
        let registry = Arc::new(registry);
        let creds = Credentials::new("A", "slow");

        let background = {
            let registry = registry.clone();
            let creds = creds.clone();
            tokio::spawn(async move { registry.connect(&creds).await })
        };

        // Let the background login get as far as Connecting.
        let identity = CredentialIdentity::derive(&creds);
        for _ in 0..50 {
            if registry.get(&identity).map(|c| c.state()) == Some(ConnState::Connecting) {
                break;
            }
            tokio::task::yield_now().await;
        }

        // A second connect while the first login hangs: the bounded settle
        // wait expires and the caller is told the login is in progress.
        let report = registry.connect(&creds).await;
        assert_eq!(report.status, ConnectStatus::Error);
        assert_eq!(
            report.error.as_deref(),
            Some("login in progress, please wait")
        );

        // The hanging login itself hits the 30s ceiling and errors out.
        let first = background.await.unwrap();
        assert_eq!(first.status, ConnectStatus::Error);
    }

    #[tokio::test]
    async fn disconnect_removes_the_entry() {
        let (_factory, registry) = registry(LoopbackFactory::new(world()));
        let creds = Credentials::new("A", "T");
        let report = registry.connect(&creds).await;
        assert_eq!(report.status, ConnectStatus::Ready);

        registry.disconnect(&report.identity).await;
        assert!(registry.get(&report.identity).is_none());
        assert!(registry.is_empty());
    }
}
