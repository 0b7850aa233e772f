/// In-process mock server speaking the wire protocol, for tests
///
/// Supports PING, AUTH, ECHO, GET, SET, DEL, ASKING, INFO replication,
/// SLAVEOF and CLUSTER NODES. Replies can be scripted ahead of the built-in handling,
/// and the server can be stopped to simulate a node going down.
use crate::core::Endpoint;
use crate::protocol::{Reply, RespReader};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    password: Option<String>,
    role: Mutex<String>,
    upstream: Mutex<Option<String>>,
    cluster_nodes: Mutex<String>,
    store: Mutex<HashMap<Bytes, Bytes>>,
    scripted: Mutex<VecDeque<(String, Reply)>>,
    commands: Mutex<Vec<Vec<String>>>,
}

pub struct MockServer {
    endpoint: Endpoint,
    state: Arc<MockState>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::spawn(MockState {
            role: Mutex::new("master".to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn with_role(role: &str) -> Self {
        Self::spawn(MockState {
            role: Mutex::new(role.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn with_password(password: &str) -> Self {
        Self::spawn(MockState {
            password: Some(password.to_string()),
            role: Mutex::new("master".to_string()),
            ..Default::default()
        })
        .await
    }

    async fn spawn(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(state);
        let tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_state = state.clone();
        let accept_tasks = tasks.clone();
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handle = tokio::spawn(serve(stream, accept_state.clone()));
                accept_tasks.lock().push(handle);
            }
        });
        tasks.lock().push(accept);

        MockServer {
            endpoint: Endpoint::new("127.0.0.1", port),
            state,
            tasks,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    pub fn set_role(&self, role: &str) {
        *self.state.role.lock() = role.to_string();
    }

    pub fn role(&self) -> String {
        self.state.role.lock().clone()
    }

    /// `host:port` passed in the last `SLAVEOF host port`
    pub fn upstream(&self) -> Option<String> {
        self.state.upstream.lock().clone()
    }

    pub fn set_cluster_nodes(&self, text: &str) {
        *self.state.cluster_nodes.lock() = text.to_string();
    }

    /// Queue a reply returned for the next `command` instead of the normal one
    pub fn script(&self, command: &str, reply: Reply) {
        self.state
            .scripted
            .lock()
            .push_back((command.to_ascii_uppercase(), reply));
    }

    /// Every command received so far, uppercased command name first
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.commands.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state
            .commands
            .lock()
            .iter()
            .filter(|c| c.first().map(|n| n == command).unwrap_or(false))
            .count()
    }

    /// Stop accepting and drop every open connection.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        for handle in self.tasks.lock().iter() {
            handle.abort();
        }
    }
}

/// An endpoint nothing listens on
pub async fn unreachable_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

async fn serve(stream: TcpStream, state: Arc<MockState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = RespReader::new(read_half);
    let mut authenticated = state.password.is_none();

    loop {
        let request = match reader.read_reply().await {
            Ok(Reply::Array(items)) => items,
            _ => return,
        };
        let args: Vec<Bytes> = request
            .into_iter()
            .filter_map(|item| match item {
                Reply::Bulk(data) => Some(data),
                _ => None,
            })
            .collect();
        if args.is_empty() {
            return;
        }

        let mut text: Vec<String> = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        text[0] = text[0].to_ascii_uppercase();
        state.commands.lock().push(text.clone());

        let reply = if text[0] == "AUTH" {
            if state.password.as_deref() == text.get(1).map(String::as_str) {
                authenticated = true;
                Reply::Status("OK".to_string())
            } else {
                Reply::Error("WRONGPASS invalid password".to_string())
            }
        } else if !authenticated {
            Reply::Error("NOAUTH Authentication required.".to_string())
        } else if let Some(scripted) = take_scripted(&state, &text[0]) {
            scripted
        } else {
            handle(&state, &text, &args)
        };

        if write_half.write_all(&reply.encode()).await.is_err() {
            return;
        }
    }
}

fn take_scripted(state: &MockState, command: &str) -> Option<Reply> {
    let mut scripted = state.scripted.lock();
    let index = scripted.iter().position(|(c, _)| c == command)?;
    scripted.remove(index).map(|(_, reply)| reply)
}

fn handle(state: &MockState, text: &[String], args: &[Bytes]) -> Reply {
    let ok = || Reply::Status("OK".to_string());
    match text[0].as_str() {
        "PING" => Reply::Status("PONG".to_string()),
        "ASKING" => ok(),
        "ECHO" if args.len() == 2 => Reply::Bulk(args[1].clone()),
        "GET" if args.len() == 2 => state
            .store
            .lock()
            .get(&args[1])
            .cloned()
            .map(Reply::Bulk)
            .unwrap_or(Reply::Nil),
        "SET" if args.len() == 3 => {
            if state.role.lock().as_str() != "master" {
                return Reply::Error("READONLY You can't write against a read only replica.".to_string());
            }
            state.store.lock().insert(args[1].clone(), args[2].clone());
            ok()
        }
        "DEL" => {
            let mut store = state.store.lock();
            let removed = args[1..].iter().filter(|k| store.remove(*k).is_some()).count();
            Reply::Integer(removed as i64)
        }
        "INFO" => {
            let role = state.role.lock().clone();
            Reply::Bulk(Bytes::from(format!(
                "# Replication\r\nrole:{}\r\nconnected_slaves:0\r\n",
                role
            )))
        }
        "SLAVEOF" | "REPLICAOF" if text.len() == 3 => {
            if text[1].eq_ignore_ascii_case("NO") && text[2].eq_ignore_ascii_case("ONE") {
                *state.role.lock() = "master".to_string();
                *state.upstream.lock() = None;
            } else {
                *state.role.lock() = "slave".to_string();
                *state.upstream.lock() = Some(format!("{}:{}", text[1], text[2]));
            }
            ok()
        }
        "CLUSTER" if text.len() == 2 && text[1].eq_ignore_ascii_case("NODES") => {
            Reply::Bulk(Bytes::from(state.cluster_nodes.lock().clone()))
        }
        _ => Reply::Error(format!("ERR unknown command '{}'", text[0])),
    }
}
