//! Client configuration.
use crate::retry::RetryPolicy;
use std::time::Duration;

pub const DEFAULT_CONTRACT_INDEX: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the live node RPC, without trailing slash.
    pub node_url: String,
    /// Base URL of the archive service; `None` disables the archival source.
    pub archive_url: Option<String>,
    pub contract_index: u32,
    pub query_path: String,
    pub broadcast_path: String,
    pub archive_path: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Handed to the HTTP client; the retry loop only sees the resulting error.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node_url: "http://127.0.0.1:8000".into(),
            archive_url: None,
            contract_index: DEFAULT_CONTRACT_INDEX,
            query_path: "/v1/querySmartContract".into(),
            broadcast_path: "/v1/broadcast-transaction".into(),
            archive_path: "/v1/bets".into(),
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

impl ClientConfig {
    pub fn query_url(&self) -> String {
        join(&self.node_url, &self.query_path)
    }

    pub fn broadcast_url(&self) -> String {
        join(&self.node_url, &self.broadcast_path)
    }

    pub fn archive_bets_url(&self) -> Option<String> {
        self.archive_url.as_deref().map(|base| join(base, &self.archive_path))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts, delay: self.retry_delay }
    }
}
