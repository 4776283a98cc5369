//! Shared test fixtures: a scripted, recording transport.

#![allow(dead_code, unreachable_pub)]

use apollo_sync::{ApolloError, AppConfig, ConnectConfig, FetchOutcome, RemoteTransport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{collections::HashMap, time::Duration};

/// Scripted reply for one endpoint.
#[derive(Debug, Clone)]
pub enum Reply {
    Changed(String),
    Unchanged,
    Fail,
}

impl Reply {
    fn outcome(&self, uri: &str) -> FetchOutcome {
        match self {
            Self::Changed(body) => FetchOutcome::Changed(Bytes::from(body.clone())),
            Self::Unchanged => FetchOutcome::Unchanged,
            Self::Fail => FetchOutcome::Failed(ApolloError::Transport(format!("refused: {uri}"))),
        }
    }
}

/// Transport answering from a script and recording every request.
#[derive(Debug)]
pub struct MockTransport {
    notify: Mutex<Reply>,
    configs: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<(String, Duration)>>,
}

impl MockTransport {
    pub fn new(notify: Reply) -> Self {
        Self {
            notify: Mutex::new(notify),
            configs: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_config(self, namespace: &str, reply: Reply) -> Self {
        self.set_config(namespace, reply);
        self
    }

    pub fn set_notify(&self, reply: Reply) {
        *self.notify.lock() = reply;
    }

    pub fn set_config(&self, namespace: &str, reply: Reply) {
        self.configs.lock().insert(namespace.to_string(), reply);
    }

    /// All request URIs, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(uri, _)| uri.clone()).collect()
    }

    /// URIs of fetch requests only.
    pub fn fetches(&self) -> Vec<String> {
        self.requests().into_iter().filter(|uri| uri.starts_with("configs/")).collect()
    }

    /// Timeouts of notify requests.
    pub fn notify_timeouts(&self) -> Vec<Duration> {
        self.requests
            .lock()
            .iter()
            .filter(|(uri, _)| uri.starts_with("notifications/v2"))
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn execute(&self, request: &ConnectConfig) -> FetchOutcome {
        self.requests.lock().push((request.uri.clone(), request.timeout));

        if request.uri.starts_with("notifications/v2") {
            return self.notify.lock().outcome(&request.uri);
        }

        // configs/{appId}/{cluster}/{namespace}?...
        let path = request.uri.split('?').next().unwrap_or_default();
        let namespace = path.split('/').nth(3).unwrap_or_default();
        let reply = self.configs.lock().get(namespace).cloned().unwrap_or(Reply::Fail);
        reply.outcome(&request.uri)
    }
}

pub fn notify_body(entries: &[(&str, i64)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(ns, id)| format!(r#"{{"namespaceName":"{ns}","notificationId":{id}}}"#))
        .collect();
    format!("[{}]", items.join(","))
}

pub fn config_body(namespace: &str, release_key: &str, configurations: &[(&str, &str)]) -> String {
    let configurations: serde_json::Map<String, serde_json::Value> = configurations
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
        .collect();
    serde_json::json!({
        "appId": "SampleApp",
        "cluster": "default",
        "namespaceName": namespace,
        "releaseKey": release_key,
        "configurations": configurations,
    })
    .to_string()
}

pub fn app_config(namespaces: &str, backup_dir: &std::path::Path) -> AppConfig {
    AppConfig::new("SampleApp", "http://localhost:8080")
        .with_namespaces(namespaces)
        .with_backup_path(backup_dir)
}
