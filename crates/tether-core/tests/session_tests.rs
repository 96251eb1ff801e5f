//! Session lifecycle over in-memory channels.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::{json, Value};
use tether_core::{
    reflect_struct, Fields, Model, ModelState, Node, Operations, Remote, Session, SessionConfig,
    SessionEnd, Structure, TetherError,
};

#[derive(Default)]
struct Counter {
    model: Model,
    value: i64,
}

impl Structure for Counter {
    fn declare(fields: &mut Fields<Self>) {
        fields.field("Value", |c| &c.value);
    }
}

reflect_struct!(Counter, node = model);

struct App {
    state: Arc<Mutex<Counter>>,
}

impl App {
    fn add(&self, n: i64) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.value += n;
        state.mark_dirty();
        state.value
    }

    fn peek(&self) -> i64 {
        self.state.lock().unwrap().value
    }
}

impl Remote for App {
    fn expose(ops: &mut Operations<Self>) {
        ops.add("Add", App::add).add("Peek", App::peek);
    }
}

type Inbound = UnboundedSender<Result<String, std::io::Error>>;

struct Client {
    tx: Inbound,
    rx: UnboundedReceiver<String>,
}

impl Client {
    fn send(&self, frame: &str) {
        self.tx.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.rx.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        serde_json::from_str(&frame).unwrap()
    }
}

fn session() -> Arc<Session<App>> {
    let state = Arc::new(Mutex::new(Counter::default()));
    let app = Arc::new(App {
        state: state.clone(),
    });
    Arc::new(Session::with_model(app, state, SessionConfig::default()))
}

fn connect(
    session: &Arc<Session<App>>,
) -> (Client, tokio::task::JoinHandle<tether_core::Result<SessionEnd>>) {
    let (in_tx, in_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();
    let session = session.clone();
    let task = tokio::spawn(async move { session.serve(in_rx, out_tx).await });
    (
        Client {
            tx: in_tx,
            rx: out_rx,
        },
        task,
    )
}

#[tokio::test]
async fn test_snapshot_then_invocations() {
    let session = session();
    let (mut client, task) = connect(&session);

    assert_eq!(client.recv().await, json!({"m": {"$m": 1, "Value": 0}}));

    client.send(r#"{"n":"Add","v":[5],"id":1}"#);
    assert_eq!(client.recv().await, json!({"m": {"Value": 5}}));
    assert_eq!(client.recv().await, json!({"v": 5, "id": 1}));

    // No model change: only the result is sent.
    client.send(r#"{"n":"Peek","id":2}"#);
    assert_eq!(client.recv().await, json!({"v": 5, "id": 2}));

    client.send(r#"{"n":"goui:gui_terminated"}"#);
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Terminated);
    session.terminated().await;
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let session = session();
    let (mut client, task) = connect(&session);
    client.recv().await;

    client.send("not json");
    client.send(r#"{"v":[1]}"#);
    client.send(r#"{"n":"Nope","id":3}"#);
    assert_eq!(
        client.recv().await,
        json!({"e": "Unknown operation: Nope", "id": 3})
    );

    drop(client);
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);
}

#[tokio::test]
async fn test_single_connection_and_reconnect() {
    let session = session();
    let (mut client, task) = connect(&session);
    client.recv().await;
    client.send(r#"{"n":"Add","v":[2],"id":1}"#);
    client.recv().await;
    client.recv().await;

    let (_in_tx, in_rx) = unbounded::<Result<String, std::io::Error>>();
    let (out_tx, _out_rx) = unbounded::<String>();
    let err = session.serve(in_rx, out_tx).await.unwrap_err();
    assert!(matches!(err, TetherError::AlreadyConnected));

    session.handle().close();
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);

    // A new client starts from a full snapshot.
    let (mut client, task) = connect(&session);
    assert_eq!(client.recv().await, json!({"m": {"$m": 1, "Value": 2}}));
    drop(client);
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);
}

#[tokio::test]
async fn test_server_initiated_frames() {
    let session = session();
    let handle = session.handle();
    assert!(matches!(
        handle.send_event("tick", 1),
        Err(TetherError::NotConnected)
    ));

    let (mut client, task) = connect(&session);
    client.recv().await;
    assert!(handle.is_connected());

    handle.send_event("tick", json!({"n": 1})).unwrap();
    assert_eq!(client.recv().await, json!({"ev": {"n": 1}, "n": "tick"}));

    handle.call("alert", vec![json!("hi")]).unwrap();
    assert_eq!(client.recv().await, json!({"a": ["hi"], "f": "alert"}));

    assert!(!handle.sync_model().unwrap());
    {
        let app = session.dispatcher().target();
        let mut state = app.state.lock().unwrap();
        state.value = 7;
        state.mark_dirty();
    }
    assert!(handle.sync_model().unwrap());
    assert_eq!(client.recv().await, json!({"m": {"Value": 7}}));

    handle.close();
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);
    assert!(!handle.is_connected());
}

#[tokio::test]
async fn test_sync_without_client_keeps_changes() {
    let session = session();
    let handle = session.handle();
    let (mut client, task) = connect(&session);
    client.recv().await;
    handle.close();
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Closed);

    let state = session.dispatcher().target().state.clone();
    {
        let mut state = state.lock().unwrap();
        state.value = 3;
        state.mark_dirty();
    }
    assert!(matches!(handle.sync_model(), Err(TetherError::NotConnected)));
    assert_eq!(state.lock().unwrap().model_state(), ModelState::Dirty);
}

#[tokio::test]
async fn test_session_without_model() {
    let session = Arc::new(Session::new(
        Arc::new(App {
            state: Arc::new(Mutex::new(Counter::default())),
        }),
        SessionConfig::default(),
    ));
    let (in_tx, in_rx) = unbounded();
    let (out_tx, mut out_rx) = unbounded::<String>();
    let serving = {
        let session = session.clone();
        tokio::spawn(async move { session.serve(in_rx, out_tx).await })
    };

    assert_eq!(out_rx.next().await.unwrap(), r#"{"m":null}"#);
    in_tx
        .unbounded_send(Ok::<_, std::io::Error>(r#"{"n":"Add","v":[1],"id":1}"#.to_string()))
        .unwrap();
    assert_eq!(out_rx.next().await.unwrap(), r#"{"v":1,"id":1}"#);

    drop(in_tx);
    assert_eq!(serving.await.unwrap().unwrap(), SessionEnd::Closed);
}
