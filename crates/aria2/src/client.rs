//! JSON-RPC client for the aria2 download daemon.
//!
//! One [`Aria2Client`] wraps a single daemon endpoint. Every call is an
//! independent HTTP POST carrying a JSON-RPC 2.0 request; when a shared
//! secret is configured it is injected as `token:<secret>` in the first
//! positional parameter, as the aria2 protocol requires.
//!
//! This layer does not retry. Transport failures and daemon error
//! objects are both surfaced as [`Aria2Error`] carrying the daemon's
//! message; "unknown GID" is only distinguishable by message text,
//! which is a property of the daemon protocol the callers rely on.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::status::{StatusSnapshot, STATUS_KEYS};

/// Default daemon endpoint for local development.
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:6800/jsonrpc";

/// Default per-request timeout, bounding how long one unreachable
/// daemon can stall a reconciliation pass.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Errors from the aria2 RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum Aria2Error {
    /// The HTTP request itself failed (connect, DNS, timeout).
    #[error("aria2 unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The daemon answered with a JSON-RPC error object or a non-2xx
    /// status without a parsable body.
    #[error("aria2 RPC error: {message}")]
    Rpc { message: String },
}

impl Aria2Error {
    /// Whether this error is the daemon's "GID ... is not found" reply.
    ///
    /// aria2 gives unknown handles no dedicated error code, so message
    /// matching is the only discriminator available.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Aria2Error::Rpc { message } if message.contains("is not found"))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// An entry from `aria2.getFiles` / the `files` status key.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub path: Option<String>,
}

/// HTTP JSON-RPC client for a single aria2 daemon.
pub struct Aria2Client {
    client: reqwest::Client,
    endpoint: String,
    token_param: Option<String>,
}

impl Aria2Client {
    /// Create a client for the given endpoint.
    ///
    /// An empty `secret` disables token injection entirely.
    pub fn new(endpoint: impl Into<String>, secret: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            endpoint: endpoint.into(),
            token_param: if secret.is_empty() {
                None
            } else {
                Some(format!("token:{secret}"))
            },
        }
    }

    /// Build a client from `ARIA2_RPC_URL`, `ARIA2_RPC_SECRET`, and
    /// `ARIA2_RPC_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let url = std::env::var("ARIA2_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.into());
        let secret = std::env::var("ARIA2_RPC_SECRET").unwrap_or_default();
        let timeout_secs: u64 = std::env::var("ARIA2_RPC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(url, &secret, Duration::from_secs(timeout_secs))
    }

    /// Assemble the JSON-RPC request body, injecting the token
    /// parameter when configured.
    fn request_body(&self, method: &str, mut params: Vec<Value>) -> Value {
        if let Some(token) = &self.token_param {
            params.insert(0, json!(token));
        }
        json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        })
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, Aria2Error> {
        let body = self.request_body(method, params);
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let http_status = response.status();
        let parsed: RpcResponse<T> = match response.json().await {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(Aria2Error::Rpc {
                    message: format!("HTTP {http_status}"),
                })
            }
        };

        if let Some(error) = parsed.error {
            return Err(Aria2Error::Rpc {
                message: error.message,
            });
        }
        if !http_status.is_success() {
            return Err(Aria2Error::Rpc {
                message: format!("HTTP {http_status}"),
            });
        }
        parsed.result.ok_or(Aria2Error::Rpc {
            message: "missing result in RPC response".into(),
        })
    }

    /// Submit one or more URIs (magnet or HTTP). Returns the new GID.
    pub async fn add_uri(&self, uris: &[String]) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.addUri", vec![json!(uris), json!({})])
            .await
    }

    /// Submit a torrent file as a base64 payload. Returns the new GID.
    pub async fn add_torrent(&self, torrent_base64: &str) -> Result<String, Aria2Error> {
        self.rpc_call(
            "aria2.addTorrent",
            vec![json!(torrent_base64), json!([]), json!({})],
        )
        .await
    }

    /// Query the status of a download using the standard key set.
    pub async fn tell_status(&self, gid: &str) -> Result<StatusSnapshot, Aria2Error> {
        self.rpc_call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])
            .await
    }

    /// Query a download's directory and file list, used by cleanup.
    pub async fn tell_files(&self, gid: &str) -> Result<StatusSnapshot, Aria2Error> {
        self.rpc_call("aria2.tellStatus", vec![json!(gid), json!(["dir", "files"])])
            .await
    }

    /// List the files of a download.
    pub async fn get_files(&self, gid: &str) -> Result<Vec<FileEntry>, Aria2Error> {
        self.rpc_call("aria2.getFiles", vec![json!(gid)]).await
    }

    /// List active downloads. Also used as the cheap reachability probe
    /// at the start of every reconciliation pass.
    pub async fn tell_active(&self, keys: &[&str]) -> Result<Vec<Value>, Aria2Error> {
        self.rpc_call("aria2.tellActive", vec![json!(keys)]).await
    }

    /// List waiting downloads in `[offset, offset + num)`.
    pub async fn tell_waiting(&self, offset: i64, num: i64) -> Result<Vec<Value>, Aria2Error> {
        self.rpc_call(
            "aria2.tellWaiting",
            vec![json!(offset), json!(num), json!([] as [&str; 0])],
        )
        .await
    }

    /// Remove a download. Returns the removed GID.
    pub async fn remove(&self, gid: &str) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.remove", vec![json!(gid)]).await
    }

    /// Force-remove a download, skipping the daemon's graceful path.
    pub async fn force_remove(&self, gid: &str) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.forceRemove", vec![json!(gid)]).await
    }

    /// Pause a download.
    pub async fn pause(&self, gid: &str) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.pause", vec![json!(gid)]).await
    }

    /// Force-pause a download.
    pub async fn force_pause(&self, gid: &str) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.forcePause", vec![json!(gid)]).await
    }

    /// Resume a paused download.
    pub async fn unpause(&self, gid: &str) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.unpause", vec![json!(gid)]).await
    }

    /// Pause every active and waiting download.
    pub async fn pause_all(&self) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.pauseAll", vec![]).await
    }

    /// Resume every paused download.
    pub async fn unpause_all(&self) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.unpauseAll", vec![]).await
    }

    /// Purge completed/error/removed results from the daemon's memory.
    pub async fn purge_download_result(&self) -> Result<String, Aria2Error> {
        self.rpc_call("aria2.purgeDownloadResult", vec![]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(secret: &str) -> Aria2Client {
        Aria2Client::new(DEFAULT_RPC_URL, secret, Duration::from_secs(1))
    }

    #[test]
    fn token_is_prepended_when_secret_set() {
        let client = client_with_secret("s3cret");
        let body = client.request_body("aria2.tellStatus", vec![json!("gid1")]);
        let params = body["params"].as_array().unwrap();
        assert_eq!(params[0], json!("token:s3cret"));
        assert_eq!(params[1], json!("gid1"));
    }

    #[test]
    fn no_token_when_secret_empty() {
        let client = client_with_secret("");
        let body = client.request_body("aria2.tellActive", vec![json!(["gid"])]);
        let params = body["params"].as_array().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0], json!(["gid"]));
    }

    #[test]
    fn body_carries_protocol_envelope() {
        let client = client_with_secret("");
        let body = client.request_body("aria2.remove", vec![json!("g")]);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "aria2.remove");
        assert!(body["id"].is_string());
    }

    #[test]
    fn not_found_matches_daemon_message_text() {
        let err = Aria2Error::Rpc {
            message: "GID deadbeef00000000 is not found".into(),
        };
        assert!(err.is_not_found());

        let other = Aria2Error::Rpc {
            message: "Unauthorized".into(),
        };
        assert!(!other.is_not_found());
    }
}
