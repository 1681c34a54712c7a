// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test fixtures: an in-process StreamMaster backend that serves the
//! REST API and the hub WebSocket on one port, like the real server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use streammaster_protocol::{HandshakeResponse, HubMessage, RecordBuffer};
use streammaster_sdk::{ConnectionState, SdkConfig, StreamMasterSdk};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// How the mock hub answers an invocation.
#[derive(Clone)]
pub enum Reply {
    Value(Value),
    Error(String),
    /// Answer after a delay, without blocking other traffic
    Delayed(Duration, Value),
    /// Never answer
    Never,
}

type Responder = Arc<dyn Fn(&[Value]) -> Reply + Send + Sync>;

enum Outbound {
    Message(HubMessage),
    Drop,
}

/// One recorded REST request.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct BackendState {
    hub_replies: Mutex<HashMap<String, Responder>>,
    hub_calls: Mutex<Vec<(String, Vec<Value>)>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<Outbound>>>,
    connects: AtomicUsize,
    refuse_hub: AtomicBool,
    rest_routes: Mutex<HashMap<(String, String), (u16, Value)>>,
    rest_requests: Mutex<Vec<RestRequest>>,
}

/// In-process backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/hub", get(hub_upgrade))
            .fallback(rest_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Client configuration with test-friendly timings.
    pub fn config(&self) -> SdkConfig {
        SdkConfig::new(&format!("http://{}", self.addr))
            .unwrap()
            .with_connect_timeout_ms(2_000)
            .with_keep_alive_interval_ms(0)
            .with_server_timeout_ms(0)
            .with_reconnect_delays_ms(50, 200)
    }

    pub fn sdk(&self) -> StreamMasterSdk {
        StreamMasterSdk::new(self.config()).unwrap()
    }

    /// Answer a hub method with a function of its arguments.
    pub fn reply<F>(&self, method: &str, responder: F)
    where
        F: Fn(&[Value]) -> Reply + Send + Sync + 'static,
    {
        self.state
            .hub_replies
            .lock()
            .unwrap()
            .insert(method.to_string(), Arc::new(responder));
    }

    /// Answer a hub method with a fixed value.
    pub fn reply_value(&self, method: &str, value: Value) {
        self.reply(method, move |_| Reply::Value(value.clone()));
    }

    /// Push a server event to every live hub connection.
    pub fn push(&self, target: &str, args: Vec<Value>) {
        self.state.connections.lock().unwrap().retain(|conn| {
            conn.send(Outbound::Message(HubMessage::send(target, args.clone())))
                .is_ok()
        });
    }

    /// Kill every live hub connection without a close message.
    pub fn drop_connections(&self) {
        for conn in self.state.connections.lock().unwrap().drain(..) {
            let _ = conn.send(Outbound::Drop);
        }
    }

    /// Reject new hub connections (503) while set.
    pub fn refuse_hub(&self, refuse: bool) {
        self.state.refuse_hub.store(refuse, Ordering::SeqCst);
    }

    /// Number of completed hub handshakes.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Arguments of every hub invocation of `method`, in arrival order.
    pub fn hub_calls(&self, method: &str) -> Vec<Vec<Value>> {
        self.state
            .hub_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == method)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Serve `body` with `status` for `verb path` on the REST side.
    pub fn rest_route(&self, verb: &str, path: &str, status: u16, body: Value) {
        self.state
            .rest_routes
            .lock()
            .unwrap()
            .insert((verb.to_string(), path.to_string()), (status, body));
    }

    pub fn rest_requests(&self) -> Vec<RestRequest> {
        self.state.rest_requests.lock().unwrap().clone()
    }

    pub fn rest_requests_to(&self, path: &str) -> Vec<RestRequest> {
        self.rest_requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn hub_upgrade(State(state): State<Arc<BackendState>>, ws: WebSocketUpgrade) -> Response {
    if state.refuse_hub.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| serve_hub(socket, state))
}

async fn send_record(socket: &mut WebSocket, record: String) -> bool {
    socket.send(Message::Text(record.into())).await.is_ok()
}

async fn serve_hub(mut socket: WebSocket, state: Arc<BackendState>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut buffer = RecordBuffer::new();
    let mut handshaken = false;

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Message(message)) => {
                    if !send_record(&mut socket, message.encode().unwrap()).await {
                        return;
                    }
                }
                Some(Outbound::Drop) | None => return,
            },

            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                };
                let Ok(records) = buffer.push(text.as_str()) else {
                    return;
                };

                for record in records {
                    if !handshaken {
                        handshaken = true;
                        // Registered before the reply so pushes right after connect are delivered
                        state.connections.lock().unwrap().push(tx.clone());
                        state.connects.fetch_add(1, Ordering::SeqCst);
                        if !send_record(&mut socket, HandshakeResponse::ok().encode().unwrap()).await {
                            return;
                        }
                        continue;
                    }

                    let invocation = match HubMessage::decode(&record) {
                        Ok(HubMessage::Invocation(invocation)) => invocation,
                        Ok(HubMessage::Close(_)) => return,
                        _ => continue,
                    };
                    state
                        .hub_calls
                        .lock()
                        .unwrap()
                        .push((invocation.target.clone(), invocation.arguments.clone()));

                    // Fire-and-forget sends carry no id and get no completion
                    let Some(id) = invocation.invocation_id.clone() else {
                        continue;
                    };
                    let responder = state
                        .hub_replies
                        .lock()
                        .unwrap()
                        .get(&invocation.target)
                        .cloned();
                    let reply = match responder {
                        Some(responder) => responder(&invocation.arguments),
                        None => Reply::Error(format!("Method {} not found", invocation.target)),
                    };

                    let completion = match reply {
                        Reply::Value(value) => HubMessage::completion(id, value),
                        Reply::Error(message) => HubMessage::completion_error(id, message),
                        Reply::Delayed(delay, value) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = tx.send(Outbound::Message(HubMessage::completion(id, value)));
                            });
                            continue;
                        }
                        Reply::Never => continue,
                    };
                    if !send_record(&mut socket, completion.encode().unwrap()).await {
                        return;
                    }
                }
            }
        }
    }
}

async fn rest_handler(
    State(state): State<Arc<BackendState>>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let body = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    };

    let path = uri.path().to_string();
    state.rest_requests.lock().unwrap().push(RestRequest {
        method: method.to_string(),
        path: path.clone(),
        query,
        body,
    });

    let route = state
        .rest_routes
        .lock()
        .unwrap()
        .get(&(method.to_string(), path))
        .cloned();
    match route {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), Json(body)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"title": "Not Found"}))).into_response(),
    }
}

/// One page in the backend's paged-response shape.
pub fn page(names: &[&str]) -> Value {
    let data: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"id": i + 1, "name": name}))
        .collect();
    json!({
        "data": data,
        "pageNumber": 1,
        "pageSize": 25,
        "totalPageCount": 1,
        "totalItemCount": names.len(),
    })
}

/// Receive with a timeout, failing the test instead of hanging.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for a value")
        .expect("channel closed")
}

/// Assert that nothing arrives for a while.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(value)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected value: {:?}", value);
    }
}

/// Wait until the session reaches `target`.
pub async fn wait_for_state(sdk: &StreamMasterSdk, target: ConnectionState) {
    let mut states = sdk.session().subscribe_state();
    tokio::time::timeout(Duration::from_secs(3), states.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for session state")
        .expect("state channel closed");
}

/// Wait until `condition` holds, polling.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
