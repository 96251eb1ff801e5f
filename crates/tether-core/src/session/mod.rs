//! One client connection at a time: inbound invocations are dispatched in
//! order, the model is synchronized after each one, and server-initiated
//! frames share the same outbound queue.

mod outbound;

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use self::outbound::Outbound;
use crate::config::{ProtocolConfig, SessionConfig};
use crate::encode::{DiffEncoder, NULL_SYNC};
use crate::error::{Result, TetherError};
use crate::reflect::Reflect;
use crate::rpc::{CallMessage, Dispatcher, EventMessage, Invocation, Remote};

/// Why [`Session::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent the terminate operation.
    Terminated,
    /// The peer went away or [`SessionHandle::close`] was called.
    Closed,
}

/// A model root the session can synchronize without knowing its type.
trait SyncSource: Send + Sync {
    fn reset(&self);

    /// Encode and enqueue a frame. Returns whether a frame was sent.
    fn sync(&self, encoder: &DiffEncoder, outbound: &Outbound, force: bool) -> Result<bool>;
}

impl<M: Reflect> SyncSource for Mutex<M> {
    fn reset(&self) {
        let root = self.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = root.node_model() {
            model.mark_new();
        }
    }

    fn sync(&self, encoder: &DiffEncoder, outbound: &Outbound, force: bool) -> Result<bool> {
        // Held until the frame is queued so frames leave in encode order.
        let root = self.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = encoder.encode(Some(&*root))?;
        if !force && frame.as_ref() == NULL_SYNC {
            return Ok(false);
        }
        if let Err(e) = outbound.send(String::from_utf8_lossy(&frame).into_owned()) {
            // The frame never left, so the next client needs everything.
            if let Some(model) = root.node_model() {
                model.mark_new();
            }
            return Err(e);
        }
        Ok(true)
    }
}

struct Shared {
    id: Uuid,
    encoder: DiffEncoder,
    outbound: Outbound,
    model: Option<Arc<dyn SyncSource>>,
    close: watch::Sender<u64>,
    terminated: watch::Sender<bool>,
}

impl Shared {
    fn sync(&self, force: bool) -> Result<bool> {
        if !self.outbound.is_connected() {
            return Err(TetherError::NotConnected);
        }
        match &self.model {
            Some(model) => model.sync(&self.encoder, &self.outbound, force),
            None if force => {
                self.outbound
                    .send(String::from_utf8_lossy(NULL_SYNC).into_owned())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Synchronize and log failures. Encoding errors leave the model unsynced.
    fn sync_logged(&self, force: bool) {
        match self.sync(force) {
            Ok(_) => {}
            Err(TetherError::NotConnected) => {
                debug!("Session {}: sync skipped, not connected", self.id)
            }
            Err(e) if e.is_encoding_error() => {
                error!("Session {}: failed to encode model: {}", self.id, e)
            }
            Err(e) => warn!("Session {}: sync failed: {}", self.id, e),
        }
    }
}

/// Connection-side state for a remote object and its optional model.
pub struct Session<T: Remote> {
    dispatcher: Dispatcher<T>,
    shared: Arc<Shared>,
}

impl<T: Remote> Session<T> {
    /// A session without a synchronized model. Clients still get an initial
    /// `{"m":null}` frame.
    pub fn new(target: Arc<T>, config: SessionConfig) -> Self {
        Self::build(target, None, config)
    }

    /// A session that synchronizes `model` after every invocation.
    pub fn with_model<M: Reflect>(
        target: Arc<T>,
        model: Arc<Mutex<M>>,
        config: SessionConfig,
    ) -> Self {
        Self::build(target, Some(model as Arc<dyn SyncSource>), config)
    }

    fn build(target: Arc<T>, model: Option<Arc<dyn SyncSource>>, config: SessionConfig) -> Self {
        let (close, _) = watch::channel(0);
        let (terminated, _) = watch::channel(false);
        let shared = Shared {
            id: Uuid::new_v4(),
            encoder: DiffEncoder::new(&config),
            outbound: Outbound::new(),
            model,
            close,
            terminated,
        };
        Self {
            dispatcher: Dispatcher::new(target),
            shared: Arc::new(shared),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.outbound.is_connected()
    }

    /// Resolves once a client has sent the terminate operation.
    pub async fn terminated(&self) {
        let mut rx = self.shared.terminated.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    /// Run one connection until the peer closes it, the client terminates,
    /// or [`SessionHandle::close`] is called.
    ///
    /// Operations run on the calling task one at a time and should not block.
    pub async fn serve<S, E, K>(&self, mut stream: S, sink: K) -> Result<SessionEnd>
    where
        S: Stream<Item = std::result::Result<String, E>> + Unpin,
        E: Display,
        K: Sink<String> + Send + Unpin + 'static,
        K::Error: Display,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = self.shared.outbound.attach(tx)?;
        let mut close_rx = self.shared.close.subscribe();
        info!("Session {}: client connected", self.shared.id);

        let writer = tokio::spawn(write_frames(self.shared.id, rx, sink));

        // A new client has none of the model yet.
        if let Some(model) = &self.shared.model {
            model.reset();
        }
        self.shared.sync_logged(true);

        let end = loop {
            tokio::select! {
                _ = close_rx.changed() => break SessionEnd::Closed,
                frame = stream.next() => match frame {
                    None => break SessionEnd::Closed,
                    Some(Err(e)) => {
                        warn!("Session {}: receive failed: {}", self.shared.id, e);
                        break SessionEnd::Closed;
                    }
                    Some(Ok(text)) => {
                        if let Some(end) = self.handle_frame(&text) {
                            break end;
                        }
                    }
                },
            }
        };

        self.shared.outbound.detach(connection);
        if let Err(e) = writer.await {
            warn!("Session {}: writer task failed: {}", self.shared.id, e);
        }
        info!("Session {}: client disconnected ({:?})", self.shared.id, end);
        Ok(end)
    }

    fn handle_frame(&self, text: &str) -> Option<SessionEnd> {
        let invocation: Invocation = match serde_json::from_str(text) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Session {}: ignoring malformed frame: {}", self.shared.id, e);
                return None;
            }
        };

        if invocation.name == ProtocolConfig::TERMINATE_OPERATION {
            info!("Session {}: client terminated", self.shared.id);
            self.shared.terminated.send_replace(true);
            return Some(SessionEnd::Terminated);
        }

        let result = self.dispatcher.dispatch(&invocation);
        self.shared.sync_logged(false);

        match serde_json::to_string(&result) {
            Ok(frame) => {
                if let Err(e) = self.shared.outbound.send(frame) {
                    debug!(
                        "Session {}: result {} not sent: {}",
                        self.shared.id, invocation.id, e
                    );
                }
            }
            Err(e) => error!("Session {}: failed to encode result: {}", self.shared.id, e),
        }
        None
    }
}

async fn write_frames<K>(id: Uuid, mut rx: mpsc::UnboundedReceiver<String>, mut sink: K)
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!("Session {}: send failed: {}", id, e);
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!("Session {}: close failed: {}", id, e);
    }
}

/// Cloneable access to a session from outside the connection task.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Push `{"ev": payload, "n": name}` to the client.
    pub fn send_event(&self, name: impl Into<String>, payload: impl Serialize) -> Result<()> {
        let message = EventMessage {
            payload: serde_json::to_value(payload)?,
            name: name.into(),
        };
        self.shared.outbound.send(serde_json::to_string(&message)?)
    }

    /// Ask the client to run one of its functions: `{"a": args, "f": function}`.
    pub fn call(&self, function: impl Into<String>, args: Vec<Value>) -> Result<()> {
        let message = CallMessage {
            args,
            function: function.into(),
        };
        self.shared.outbound.send(serde_json::to_string(&message)?)
    }

    /// Send pending model changes now instead of after the next invocation.
    /// Returns whether a frame was sent.
    pub fn sync_model(&self) -> Result<bool> {
        self.shared.sync(false)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.outbound.is_connected()
    }

    /// Drop the current connection, if any.
    pub fn close(&self) {
        if self.shared.outbound.detach_any() {
            debug!("Session {}: closing connection", self.shared.id);
        }
        self.shared.close.send_modify(|generation| *generation += 1);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}
