//! One graphql-ws connection shared by many subscriptions.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use graphwire_transport::CancellationToken;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::protocol::{Frame, FrameKind};
use super::{Subscription, SubscriptionPayload};
use crate::encode::start_payload;
use crate::{GraphQLError, Logger, Operation, Result, SubscriptionConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Delivery side of one registered subscription.
///
/// `cancelled` fires when the registration is removed, releasing a dispatch
/// task that is waiting on a full buffer.
#[derive(Clone)]
struct Route {
    sender: mpsc::Sender<SubscriptionPayload>,
    cancelled: CancellationToken,
}

impl Route {
    fn new(sender: mpsc::Sender<SubscriptionPayload>) -> Self {
        Self {
            sender,
            cancelled: CancellationToken::new(),
        }
    }
}

/// State shared between the client handle and the dispatch task.
pub(crate) struct Shared {
    registry: Mutex<HashMap<String, Route>>,
    next_id: AtomicU64,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    closed: AtomicBool,
    last_error: Mutex<Option<String>>,
    delivery_buffer: usize,
    logger: Option<Logger>,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("subscriptions", &self.registry.lock().len())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn log(&self, args: fmt::Arguments<'_>) {
        Logger::log_fmt(self.logger.as_ref(), args);
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        let text = frame.encode()?;
        self.log(format_args!(">> {text}"));

        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(GraphQLError::ConnectionClosed)?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(ws_error)
    }

    async fn route(&self, frame: Frame) {
        let kind = frame.kind;
        match kind {
            FrameKind::Data | FrameKind::Error => {
                let Some(id) = frame.id else {
                    warn!(?kind, "Frame without an id");
                    return;
                };
                let route = self.registry.lock().get(&id).cloned();
                let Some(route) = route else {
                    debug!(%id, ?kind, "Dropping frame for unknown subscription");
                    return;
                };

                let payload = frame.payload.unwrap_or(Value::Null);
                let payload = if kind == FrameKind::Data {
                    SubscriptionPayload::Data(payload)
                } else {
                    SubscriptionPayload::Error(payload)
                };

                let delivered = tokio::select! {
                    biased;
                    _ = route.cancelled.cancelled() => {
                        debug!(%id, "Dropping frame for stopped subscription");
                        return;
                    }
                    result = route.sender.send(payload) => result.is_ok(),
                };

                if !delivered {
                    debug!(%id, "Subscriber dropped its handle");
                    if self.deregister(&id) && let Err(err) = self.send(Frame::stop(id)).await {
                        debug!(error = %err, "Failed to stop abandoned subscription");
                    }
                }
            }
            FrameKind::Complete => {
                if let Some(id) = frame.id
                    && self.deregister(&id)
                {
                    debug!(%id, "Subscription completed");
                }
            }
            FrameKind::KeepAlive => {}
            FrameKind::ConnectionError => {
                warn!(payload = ?frame.payload, "Server reported a connection error");
            }
            other => debug!(kind = ?other, "Ignoring frame"),
        }
    }

    /// Remove `id` from the registry. Returns whether it was registered.
    fn deregister(&self, id: &str) -> bool {
        let route = self.registry.lock().remove(id);
        match route {
            Some(route) => {
                route.cancelled.cancel();
                true
            }
            None => false,
        }
    }

    /// Close every still-registered subscription. Each sink is closed once,
    /// by dropping the only sender stored for it.
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.registry.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Closing open subscriptions");
        }
        for (_, route) in drained {
            route.cancelled.cancel();
        }
    }

    fn record_error(&self, err: &WsError) {
        *self.last_error.lock() = Some(err.to_string());
    }
}

/// A graphql-ws connection multiplexing many subscriptions.
///
/// Frames are read by one background dispatch task. Delivery to a
/// subscription waits while that subscription's buffer is full, which delays
/// every other subscription on the connection until the consumer reads or the
/// subscription is stopped; size [`SubscriptionConfig::delivery_buffer`] for
/// the slowest consumer.
pub struct SubscriptionClient {
    shared: Arc<Shared>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl SubscriptionClient {
    /// Connect to `url` and complete the protocol handshake.
    pub async fn connect(url: &str, config: SubscriptionConfig) -> Result<Self> {
        Self::connect_with_logger(url, config, None).await
    }

    /// Connect to `url`, sending frame traces to `logger`.
    pub async fn connect_with_logger(
        url: &str,
        config: SubscriptionConfig,
        logger: Option<Logger>,
    ) -> Result<Self> {
        let mut request = url.into_client_request().map_err(ws_error)?;
        let headers = request.headers_mut();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&config.protocol)
                .map_err(|e| GraphQLError::Config(e.to_string()))?,
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GraphQLError::Config(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| GraphQLError::Config(e.to_string()))?;
            headers.insert(name, value);
        }

        info!(url, protocol = %config.protocol, "Connecting subscription transport");
        let (stream, _) = timeout(config.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| GraphQLError::Timeout("websocket connect"))?
            .map_err(ws_error)?;
        let (mut sink, mut source) = stream.split();

        if let Err(err) = handshake(&mut sink, &mut source, &config, logger.as_ref()).await {
            warn!(error = %err, "Subscription handshake failed");
            let _ = sink.close().await;
            return Err(err);
        }
        debug!("Subscription connection acknowledged");

        let shared = Arc::new(Shared {
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(Some(sink)),
            closed: AtomicBool::new(false),
            last_error: Mutex::new(None),
            delivery_buffer: config.delivery_buffer.max(1),
            logger,
        });
        let dispatch = tokio::spawn(run_dispatch(shared.clone(), source));

        Ok(Self {
            shared,
            dispatch: Mutex::new(Some(dispatch)),
            close_timeout: config.close_timeout,
        })
    }

    /// Start `operation` and return its receiving side.
    pub async fn subscribe(&self, operation: &Operation) -> Result<Subscription> {
        let payload = start_payload(operation)?;
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(GraphQLError::ConnectionClosed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (sender, receiver) = mpsc::channel(self.shared.delivery_buffer);
        self.shared
            .registry
            .lock()
            .insert(id.clone(), Route::new(sender));

        // dispatch may have drained the registry between the check and the insert
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.deregister(&id);
            return Err(GraphQLError::ConnectionClosed);
        }

        if let Err(err) = self.shared.send(Frame::start(id.clone(), payload)).await {
            self.shared.deregister(&id);
            return Err(err);
        }

        info!(%id, "Subscription started");
        Ok(Subscription::new(id, Arc::downgrade(&self.shared), receiver))
    }

    /// Stop `subscription`. A no-op if it already ended or belongs to another
    /// connection.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        if !subscription.belongs_to(&self.shared) {
            return Ok(());
        }

        if !self.shared.deregister(subscription.id()) {
            return Ok(());
        }

        debug!(id = %subscription.id(), "Stopping subscription");
        self.shared.send(Frame::stop(subscription.id())).await
    }

    /// Terminate the connection.
    ///
    /// Sends `connection_terminate`, waits for the dispatch task to observe
    /// the end of the stream, then closes the socket. Every open
    /// subscription ends. Calling `close` again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(mut sink) = self.shared.writer.lock().await.take() else {
            return Ok(());
        };

        let terminate = Frame::terminate();
        self.shared.log(format_args!(">> {}", terminate.encode()?));
        let sent = sink.send(terminate.to_message()?).await;

        let handle = self.dispatch.lock().take();
        if let Some(mut handle) = handle {
            let finished = sent.is_ok() && timeout(self.close_timeout, &mut handle).await.is_ok();
            if !finished {
                let _ = sink.send(Message::Close(None)).await;
                if timeout(self.close_timeout, &mut handle).await.is_err() {
                    warn!("Dispatch task did not stop, aborting");
                    handle.abort();
                }
            }
        }

        self.shared.shutdown();
        if let Err(err) = sink.close().await {
            debug!(error = %err, "Error closing websocket");
        }
        info!("Subscription connection closed");

        match sent {
            Err(err) if !is_clean_close(&err) => Err(ws_error(err)),
            _ => Ok(()),
        }
    }

    /// Whether the connection has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// The read failure that ended the connection, if it did not end cleanly.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Number of subscriptions currently registered.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.registry.lock().len()
    }
}

impl Drop for SubscriptionClient {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch.get_mut().take() {
            handle.abort();
        }
        self.shared.shutdown();
    }
}

async fn handshake(
    sink: &mut WsSink,
    source: &mut WsSource,
    config: &SubscriptionConfig,
    logger: Option<&Logger>,
) -> Result<()> {
    let init = Frame::init(config.init_payload.clone());
    Logger::log_fmt(logger, format_args!(">> {}", init.encode()?));
    sink.send(init.to_message()?).await.map_err(ws_error)?;

    if !config.await_ack {
        return Ok(());
    }

    let frame = timeout(config.handshake_timeout, next_frame(source))
        .await
        .map_err(|_| GraphQLError::Timeout("connection_ack"))??;
    Logger::log_fmt(logger, format_args!("<< {:?}", frame.kind));

    match frame.kind {
        FrameKind::ConnectionAck => Ok(()),
        FrameKind::ConnectionError => Err(GraphQLError::Handshake(
            frame
                .payload
                .map(|p| p.to_string())
                .unwrap_or_else(|| "connection_error".to_string()),
        )),
        _ => Err(GraphQLError::NotAcknowledged),
    }
}

async fn next_frame(source: &mut WsSource) -> Result<Frame> {
    while let Some(message) = source.next().await {
        match message.map_err(ws_error)? {
            Message::Text(text) => return Frame::decode(&text),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(GraphQLError::ConnectionClosed)
}

async fn run_dispatch(shared: Arc<Shared>, mut source: WsSource) {
    loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                if !is_clean_close(&err) {
                    warn!(error = %err, "Subscription connection failed");
                    shared.record_error(&err);
                }
                break;
            }
            None => break,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!(?frame, "Server closed the connection");
                break;
            }
            _ => continue,
        };

        shared.log(format_args!("<< {}", text.as_str()));
        match Frame::decode(&text) {
            Ok(frame) => shared.route(frame).await,
            Err(err) => warn!(error = %err, "Discarding undecodable frame"),
        }
    }

    shared.shutdown();
    debug!("Dispatch loop exited");
}

fn is_clean_close(err: &WsError) -> bool {
    matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

fn ws_error(err: WsError) -> GraphQLError {
    GraphQLError::WebSocket(err.to_string())
}
