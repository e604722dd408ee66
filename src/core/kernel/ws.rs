use crate::core::config::StreamSettings;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::FrameDecoder;
use futures_util::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Connection parameters, fixed once the session starts
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub endpoint: String,
    pub keepalive_enabled: bool,
    /// Ping period; a connection silent for a whole period after a ping is dead
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_settings(endpoint, &StreamSettings::default())
    }

    pub fn from_settings(endpoint: impl Into<String>, settings: &StreamSettings) -> Self {
        Self {
            endpoint: endpoint.into(),
            keepalive_enabled: settings.keepalive_enabled,
            keepalive_interval: settings.keepalive_interval,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_keepalive(mut self, enabled: bool, interval: Duration) -> Self {
        self.keepalive_enabled = enabled;
        self.keepalive_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

pub type EventHandler<E> = Box<dyn FnMut(E) + Send>;
pub type ErrorHandler = Box<dyn FnMut(ExchangeError) + Send>;
pub type OpenHandler = Box<dyn FnMut() + Send>;
pub type CloseHandler = Box<dyn FnMut(u16, String) + Send>;

/// Callbacks invoked from the session task
///
/// Handlers run on the read loop itself: a handler that blocks stalls frame
/// processing (and keepalive) for its own session. Hand heavy work off to a
/// channel or another task.
pub struct StreamHandlers<E> {
    on_event: EventHandler<E>,
    on_error: ErrorHandler,
    on_open: Option<OpenHandler>,
    on_close: Option<CloseHandler>,
}

impl<E> StreamHandlers<E> {
    pub fn new(
        on_event: impl FnMut(E) + Send + 'static,
        on_error: impl FnMut(ExchangeError) + Send + 'static,
    ) -> Self {
        Self {
            on_event: Box::new(on_event),
            on_error: Box::new(on_error),
            on_open: None,
            on_close: None,
        }
    }

    pub fn on_open(mut self, on_open: impl FnMut() + Send + 'static) -> Self {
        self.on_open = Some(Box::new(on_open));
        self
    }

    /// Called with the close code and reason once the session is closed
    pub fn on_close(mut self, on_close: impl FnMut(u16, String) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }
}

enum Exit {
    Cancelled,
    ServerClosed(Option<CloseFrame<'static>>),
    Failed(ExchangeError),
}

/// One WebSocket connection and the loop that drives it
pub struct StreamSession<D: FrameDecoder> {
    config: StreamConfig,
    decoder: D,
    handlers: StreamHandlers<D::Event>,
    state: watch::Sender<SessionState>,
    done: CancellationToken,
}

impl<D: FrameDecoder> StreamSession<D> {
    pub fn new(config: StreamConfig, decoder: D, handlers: StreamHandlers<D::Event>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            decoder,
            handlers,
            state,
            done: CancellationToken::new(),
        }
    }

    /// Use a caller-owned token as the session's done signal
    pub fn with_cancellation(mut self, done: CancellationToken) -> Self {
        self.done = done;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Spawn the read loop and return the caller's handle to it
    pub fn start(self) -> StreamHandle {
        let done = self.done.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run());
        StreamHandle { done, state, task }
    }

    fn set_state(&self, state: SessionState) {
        debug!(url = %self.config.endpoint, ?state, "Stream state changed");
        self.state.send_replace(state);
    }

    fn report_error(&mut self, error: ExchangeError) {
        (self.handlers.on_error)(error);
    }

    fn fail(&mut self, error: ExchangeError) {
        error!(url = %self.config.endpoint, error = %error, "Stream failed");
        self.set_state(SessionState::Failed);
        self.report_error(error);
    }

    fn dispatch(&mut self, payload: &[u8]) {
        match self.decoder.decode(payload) {
            Ok(Some(event)) => (self.handlers.on_event)(event),
            Ok(None) => trace!("Frame skipped by decoder"),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                self.report_error(e);
            }
        }
    }

    /// Write a ping or pong; a failed write is reported but leaves the session open
    async fn send_control<S>(&mut self, write: &mut S, message: Message)
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let kind = if message.is_ping() { "ping" } else { "pong" };
        if let Err(e) = write.send(message).await {
            warn!(error = %e, kind, "Control frame write failed");
            self.report_error(ExchangeError::from(e));
        }
    }

    #[instrument(skip(self), fields(url = %self.config.endpoint))]
    async fn run(mut self) {
        let done = self.done.clone();
        if done.is_cancelled() {
            self.set_state(SessionState::Closed);
            return;
        }

        self.set_state(SessionState::Connecting);
        let endpoint = self.config.endpoint.clone();
        let connected = tokio::select! {
            () = done.cancelled() => None,
            result = tokio::time::timeout(self.config.connect_timeout, connect_async(endpoint.as_str())) => Some(result),
        };

        let ws_stream = match connected {
            None => {
                self.set_state(SessionState::Closed);
                return;
            }
            Some(Ok(Ok((ws_stream, _)))) => ws_stream,
            Some(Ok(Err(e))) => {
                self.fail(ExchangeError::from(e));
                return;
            }
            Some(Err(_)) => {
                self.fail(ExchangeError::ConnectionTimeout(format!(
                    "WebSocket handshake with {} timed out",
                    endpoint
                )));
                return;
            }
        };

        self.set_state(SessionState::Open);
        if let Some(on_open) = self.handlers.on_open.as_mut() {
            on_open();
        }

        let (mut write, mut read) = ws_stream.split();

        let keepalive_enabled =
            self.config.keepalive_enabled && !self.config.keepalive_interval.is_zero();
        let period = if keepalive_enabled {
            self.config.keepalive_interval
        } else {
            Duration::from_secs(3600)
        };
        let mut keepalive = tokio::time::interval(period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();

        let exit = loop {
            tokio::select! {
                () = done.cancelled() => break Exit::Cancelled,
                _ = keepalive.tick(), if keepalive_enabled => {
                    if last_activity.elapsed() > period {
                        break Exit::Failed(ExchangeError::ConnectionTimeout(format!(
                            "No frames received for {:?} after keepalive ping",
                            period
                        )));
                    }
                    trace!("Sending keepalive ping");
                    self.send_control(&mut write, Message::Ping(Vec::new())).await;
                }
                frame = read.next() => {
                    last_activity = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_bytes()),
                        Some(Ok(Message::Binary(data))) => self.dispatch(&data),
                        Some(Ok(Message::Ping(payload))) => {
                            trace!("Ping received");
                            if keepalive_enabled {
                                self.send_control(&mut write, Message::Pong(payload)).await;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => trace!("Pong received"),
                        Some(Ok(Message::Close(frame))) => break Exit::ServerClosed(frame),
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => break Exit::Failed(ExchangeError::from(e)),
                        None => {
                            break Exit::Failed(ExchangeError::NetworkError(
                                "WebSocket stream ended without a close frame".to_string(),
                            ))
                        }
                    }
                }
            }
        };

        match exit {
            Exit::Failed(error) => self.fail(error),
            Exit::Cancelled => {
                self.set_state(SessionState::Closing);
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, async {
                    let _ = write.send(Message::Close(Some(frame))).await;
                    let _ = write.close().await;
                })
                .await;
                drop(read);
                self.set_state(SessionState::Closed);
                if let Some(on_close) = self.handlers.on_close.as_mut() {
                    on_close(u16::from(CloseCode::Normal), String::new());
                }
            }
            Exit::ServerClosed(frame) => {
                self.set_state(SessionState::Closing);
                // the close reply is already queued by the protocol layer
                let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, write.close()).await;
                drop(read);
                let (code, reason) = frame.map_or_else(
                    || (u16::from(CloseCode::Status), String::new()),
                    |f| (u16::from(f.code), f.reason.into_owned()),
                );
                debug!(code, reason = %reason, "Server closed stream");
                self.set_state(SessionState::Closed);
                if let Some(on_close) = self.handlers.on_close.as_mut() {
                    on_close(code, reason);
                }
            }
        }
    }
}

/// Caller side of a running session
///
/// Dropping the handle does not stop the session; call [`close`](Self::close)
/// or cancel the token passed to [`StreamSession::with_cancellation`].
#[derive(Debug)]
pub struct StreamHandle {
    done: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Ask the session to close; safe to call in any state and more than once
    pub fn close(&self) {
        self.done.cancel();
    }

    pub fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the session reaches a state matching `predicate`
    pub async fn wait_for_state(
        &mut self,
        mut predicate: impl FnMut(SessionState) -> bool,
    ) -> SessionState {
        // the sender is gone once the run loop exits; the last value stands
        let reached = self
            .state
            .wait_for(|state| predicate(*state))
            .await
            .map(|state| *state)
            .ok();
        reached.unwrap_or_else(|| *self.state.borrow())
    }

    /// Wait for the session task to finish
    pub async fn join(self) -> Result<(), ExchangeError> {
        self.task
            .await
            .map_err(|e| ExchangeError::Other(format!("Stream task failed: {}", e)))
    }

    /// Close the session and wait for its task to finish
    pub async fn shutdown(self) -> Result<(), ExchangeError> {
        self.close();
        self.join().await
    }
}
