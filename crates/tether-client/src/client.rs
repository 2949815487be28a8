//! Broker client implementation

use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use tether_core::{
    codec, ActionSpec, ConfirmOutcome, ConnectStatus, Credentials, CredentialsRequest,
    EventEnvelope, ListGuildsRequest, ListOutcome, ListScopedRequest, Message, MessageSpec,
    PerformActionRequest, RegisterTriggerRequest, SendConfirmationRequest, SendMessageRequest,
    SendOutcome, TriggerFilter, UnregisterTriggerRequest, CONFIRM_TIMEOUT_MS, REQUEST_TIMEOUT_MS,
};
use tether_transport::{IpcEvent, IpcReceiver, IpcSender, UnixSocketConnector, UnixSocketSender};

use crate::error::{ClientError, Result};

/// Events delivered to one registered trigger.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl EventStream {
    /// Next event, `None` once the client closes or the trigger is
    /// unregistered.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }
}

/// A connection to the broker socket.
pub struct BrokerClient {
    sender: Arc<UnixSocketSender>,
    connected: Arc<RwLock<bool>>,
    next_seq: AtomicU64,
    /// In-flight requests by seq.
    pending: Arc<DashMap<u64, oneshot::Sender<Message>>>,
    /// Event routes by subscriber id.
    streams: Arc<DashMap<String, mpsc::UnboundedSender<EventEnvelope>>>,
}

impl BrokerClient {
    /// Connect to a broker socket and start the reader task.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let (sender, mut receiver) = UnixSocketConnector::connect(path.as_ref())
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let connected = Arc::new(RwLock::new(true));
        let pending: Arc<DashMap<u64, oneshot::Sender<Message>>> = Arc::new(DashMap::new());
        let streams: Arc<DashMap<String, mpsc::UnboundedSender<EventEnvelope>>> =
            Arc::new(DashMap::new());

        let connected_task = connected.clone();
        let pending_task = pending.clone();
        let streams_task = streams.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    IpcEvent::Frame(line) => match codec::decode(&line) {
                        Ok(message) => route(&pending_task, &streams_task, message),
                        Err(e) => warn!("undecodable frame from broker: {}", e),
                    },
                    IpcEvent::Error(e) => warn!("broker transport error: {}", e),
                    IpcEvent::Disconnected { reason } => {
                        debug!("broker disconnected: {:?}", reason);
                        break;
                    }
                }
            }
            *connected_task.write() = false;
            // Outstanding requests on a dead channel are rejected, not
            // left hanging: dropping the senders wakes every waiter.
            pending_task.clear();
            streams_task.clear();
        });

        Ok(Self {
            sender: Arc::new(sender),
            connected,
            next_seq: AtomicU64::new(1),
            pending,
            streams,
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    /// Close the socket. Registered triggers on the broker side are swept
    /// by its disconnect cleanup.
    pub async fn close(&self) {
        let _ = self.sender.close().await;
        *self.connected.write() = false;
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, message: &Message) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let line = codec::encode(message)?;
        self.sender
            .send(line)
            .await
            .map_err(|e| ClientError::SendFailed(e.to_string()))
    }

    /// Send one request and await its reply under `ceiling`.
    async fn request(&self, seq: u64, message: Message, ceiling: Duration) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        if let Err(e) = self.send(&message).await {
            self.pending.remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(ceiling, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_elapsed) => {
                self.pending.remove(&seq);
                Err(ClientError::Timeout)
            }
        }
    }

    fn request_ceiling() -> Duration {
        Duration::from_millis(REQUEST_TIMEOUT_MS)
    }

    /// Establish (or reuse) the bot connection for `credentials`.
    ///
    /// `ready` and `already` come back as values; `error` and `missing`
    /// are rejections, mirroring how callers branch.
    pub async fn connect_credentials(&self, credentials: &Credentials) -> Result<ConnectStatus> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::Credentials(CredentialsRequest {
                    seq,
                    client_id: credentials.client_id.clone(),
                    token: credentials.token.clone(),
                }),
                Self::request_ceiling(),
            )
            .await?;
        match reply {
            Message::CredentialsAck(ack) => match ack.status {
                ConnectStatus::Ready | ConnectStatus::Already => Ok(ack.status),
                ConnectStatus::Error => Err(ClientError::CredentialsRejected(
                    "invalid credentials or connection error".to_string(),
                )),
                ConnectStatus::Missing => Err(ClientError::CredentialsRejected(
                    "token or client id missing".to_string(),
                )),
            },
            other => Err(ClientError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    pub async fn list_guilds(&self, credentials: &Credentials) -> Result<ListOutcome> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::ListGuilds(ListGuildsRequest {
                    seq,
                    credentials: credentials.clone(),
                }),
                Self::request_ceiling(),
            )
            .await?;
        expect_list(reply)
    }

    pub async fn list_channels(
        &self,
        credentials: &Credentials,
        guild_ids: Vec<String>,
    ) -> Result<ListOutcome> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::ListChannels(ListScopedRequest {
                    seq,
                    credentials: credentials.clone(),
                    guild_ids,
                }),
                Self::request_ceiling(),
            )
            .await?;
        expect_list(reply)
    }

    pub async fn list_roles(
        &self,
        credentials: &Credentials,
        guild_ids: Vec<String>,
    ) -> Result<ListOutcome> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::ListRoles(ListScopedRequest {
                    seq,
                    credentials: credentials.clone(),
                    guild_ids,
                }),
                Self::request_ceiling(),
            )
            .await?;
        expect_list(reply)
    }

    pub async fn send_message(
        &self,
        credentials: &Credentials,
        channel_id: impl Into<String>,
        message: MessageSpec,
    ) -> Result<SendOutcome> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::SendMessage(SendMessageRequest {
                    seq,
                    credentials: credentials.clone(),
                    channel_id: channel_id.into(),
                    message,
                }),
                Self::request_ceiling(),
            )
            .await?;
        match reply {
            Message::SendReply(r) => Ok(r.outcome),
            other => Err(ClientError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    pub async fn perform_action(
        &self,
        credentials: &Credentials,
        action: ActionSpec,
    ) -> Result<tether_core::ActionOutcome> {
        let seq = self.seq();
        let reply = self
            .request(
                seq,
                Message::PerformAction(PerformActionRequest {
                    seq,
                    credentials: credentials.clone(),
                    action,
                }),
                Self::request_ceiling(),
            )
            .await?;
        match reply {
            Message::ActionReply(r) => Ok(r.outcome),
            other => Err(ClientError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    pub async fn send_confirmation(
        &self,
        credentials: &Credentials,
        channel_id: impl Into<String>,
        message: MessageSpec,
        timeout_ms: Option<u64>,
    ) -> Result<ConfirmOutcome> {
        let seq = self.seq();
        // The prompt may legitimately wait its whole deadline; the local
        // ceiling only adds headroom on top.
        let ceiling =
            Duration::from_millis(timeout_ms.unwrap_or(CONFIRM_TIMEOUT_MS)) + Self::request_ceiling();
        let reply = self
            .request(
                seq,
                Message::SendConfirmation(SendConfirmationRequest {
                    seq,
                    credentials: credentials.clone(),
                    channel_id: channel_id.into(),
                    message,
                    timeout_ms,
                }),
                ceiling,
            )
            .await?;
        match reply {
            Message::ConfirmReply(r) => Ok(r.outcome),
            other => Err(ClientError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    /// Register a trigger and get its event stream. Fire-and-forget on
    /// the wire; events start flowing once the bot connection is up.
    pub async fn register_trigger(
        &self,
        subscriber_id: impl Into<String>,
        credentials: &Credentials,
        filter: TriggerFilter,
    ) -> Result<EventStream> {
        let subscriber_id = subscriber_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.insert(subscriber_id.clone(), tx);

        self.send(&Message::RegisterTrigger(RegisterTriggerRequest {
            subscriber_id,
            credentials: credentials.clone(),
            filter,
        }))
        .await?;

        Ok(EventStream { rx })
    }

    pub async fn unregister_trigger(&self, subscriber_id: &str) -> Result<()> {
        self.streams.remove(subscriber_id);
        self.send(&Message::UnregisterTrigger(UnregisterTriggerRequest {
            subscriber_id: subscriber_id.to_string(),
        }))
        .await
    }
}

fn expect_list(reply: Message) -> Result<ListOutcome> {
    match reply {
        Message::ListReply(r) => Ok(r.result),
        other => Err(ClientError::UnexpectedReply(format!("{:?}", other))),
    }
}

/// Route one broker frame to its waiter or subscriber stream.
fn route(
    pending: &DashMap<u64, oneshot::Sender<Message>>,
    streams: &DashMap<String, mpsc::UnboundedSender<EventEnvelope>>,
    message: Message,
) {
    if let Some(seq) = message.reply_seq() {
        if let Some((_, tx)) = pending.remove(&seq) {
            let _ = tx.send(message);
        } else {
            debug!("reply for unknown or expired request {}", seq);
        }
        return;
    }
    match message {
        Message::Event(envelope) => match streams.get(&envelope.subscriber_id) {
            Some(tx) => {
                let _ = tx.send(envelope);
            }
            None => debug!(
                "event for unknown subscriber {}, dropping",
                envelope.subscriber_id
            ),
        },
        other => warn!("unexpected frame from broker: {:?}", other),
    }
}
