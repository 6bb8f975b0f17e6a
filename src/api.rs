//! Remote session and the directory-aggregate wire contract.

use crate::error::{QduError, Result};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Entry type literal the cluster uses for directories.
pub const DIRECTORY_TYPE: &str = "FS_FILE_TYPE_DIRECTORY";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Subtree totals for one namespace path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregates {
    pub total_size_bytes: u64,
    pub total_files: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// One batch of children; `next` is the cursor for the following batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPage {
    pub entries: Vec<DirEntry>,
    pub next: Option<String>,
}

/// An authenticated handle to one cluster.
pub trait AggregateApi {
    fn aggregates(&self, path: &str) -> Result<Aggregates>;

    /// List the immediate children of `path`, starting at `cursor` when given.
    fn list_page(&self, path: &str, cursor: Option<&str>) -> Result<DirectoryPage>;
}

/// Produces sessions; each call logs in afresh.
pub trait Connector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<Box<dyn AggregateApi>>;
}

// Counts arrive as JSON strings from current clusters, numbers from some older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn value(&self) -> Option<u64> {
        match self {
            Count::Number(n) => Some(*n),
            Count::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    bearer_token: String,
}

#[derive(Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    total_data: Option<Count>,
    #[serde(default)]
    total_capacity: Option<Count>,
    #[serde(default)]
    total_files: Option<Count>,
}

#[derive(Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    files: Vec<WireEntry>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Deserialize, Default)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct WireEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

fn remote_error(path: &str, reason: impl ToString) -> QduError {
    QduError::RemoteQuery {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Decode an aggregates body; `total_data` wins over the older `total_capacity`.
pub fn parse_aggregates(path: &str, body: &str) -> Result<Aggregates> {
    let response: AggregatesResponse =
        serde_json::from_str(body).map_err(|e| remote_error(path, e))?;
    let size = response
        .total_data
        .as_ref()
        .or(response.total_capacity.as_ref())
        .and_then(Count::value)
        .ok_or_else(|| remote_error(path, "response carries no total_data"))?;
    Ok(Aggregates {
        total_size_bytes: size,
        total_files: response.total_files.as_ref().and_then(Count::value),
    })
}

/// Decode one page of a children listing.
pub fn parse_entries(path: &str, body: &str) -> Result<DirectoryPage> {
    let response: EntriesResponse =
        serde_json::from_str(body).map_err(|e| remote_error(path, e))?;
    Ok(DirectoryPage {
        entries: response
            .files
            .into_iter()
            .map(|f| DirEntry {
                is_directory: f.kind == DIRECTORY_TYPE,
                name: f.name,
            })
            .collect(),
        next: response.paging.next.filter(|next| !next.is_empty()),
    })
}

/// Path reference as used in `/v1/files/<ref>/...` URIs.
pub fn file_ref(path: &str) -> String {
    utf8_percent_encode(path, NON_ALPHANUMERIC).to_string()
}

/// Logs in over the cluster's REST API.
#[derive(Debug, Clone)]
pub struct RestConnector {
    /// `https` for clusters; plain `http` only for local test servers.
    pub scheme: String,
    pub page_size: u32,
    pub timeout: Option<Duration>,
    pub strict_tls: bool,
}

impl Default for RestConnector {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            page_size: 1000,
            timeout: None,
            strict_tls: false,
        }
    }
}

impl Connector for RestConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<Box<dyn AggregateApi>> {
        let auth_error = |reason: String| QduError::Auth {
            host: host.to_string(),
            port,
            reason,
        };

        // The API port was probed directly, so requests go direct as well.
        let mut builder = Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(!self.strict_tls);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| auth_error(e.to_string()))?;

        let base = format!("{}://{}:{}", self.scheme, host, port);
        let response = client
            .post(format!("{}/v1/session/login", base))
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .map_err(|e| auth_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(auth_error(format!("login rejected ({})", response.status())));
        }
        let login: LoginResponse = response.json().map_err(|e| auth_error(e.to_string()))?;

        info!("Logged in to {} as {}", base, credentials.username);
        Ok(Box::new(RestSession {
            client,
            base,
            token: login.bearer_token,
            page_size: self.page_size,
        }))
    }
}

/// Bearer-token session against one cluster.
pub struct RestSession {
    client: Client,
    base: String,
    token: String,
    page_size: u32,
}

impl RestSession {
    fn get(&self, path: &str, uri: &str) -> Result<String> {
        debug!("GET {}", uri);
        let response = self
            .client
            .get(format!("{}{}", self.base, uri))
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| remote_error(path, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(remote_error(path, format!("HTTP {}", status)));
        }
        response.text().map_err(|e| remote_error(path, e))
    }
}

impl AggregateApi for RestSession {
    fn aggregates(&self, path: &str) -> Result<Aggregates> {
        let body = self.get(path, &format!("/v1/files/{}/aggregates/", file_ref(path)))?;
        parse_aggregates(path, &body)
    }

    fn list_page(&self, path: &str, cursor: Option<&str>) -> Result<DirectoryPage> {
        let uri = match cursor {
            Some(next) => next.to_string(),
            None => format!(
                "/v1/files/{}/entries/?limit={}",
                file_ref(path),
                self.page_size
            ),
        };
        let body = self.get(path, &uri)?;
        parse_entries(path, &body)
    }
}
