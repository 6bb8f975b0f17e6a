//! Mount classification: is a local path backed by a cluster export whose
//! API answers, and if so what is the path called inside the cluster?

use crate::error::{QduError, Result};
use std::{
    fs,
    net::{TcpStream, ToSocketAddrs},
    path::{Component, Path, PathBuf},
    process::Command,
    time::Duration,
};
use tracing::{debug, info};

/// One row of the mount table: what backs a path and where it is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
}

/// Answers "which device or export backs this path".
pub trait MountTable {
    fn lookup(&self, path: &Path) -> Result<MountEntry>;
}

/// Answers "does anything accept TCP connections at host:port".
pub trait Reachability {
    fn is_reachable(&self, host: &str, port: u16) -> bool;
}

/// Mount table read through `df -P`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DfMountTable;

impl MountTable for DfMountTable {
    fn lookup(&self, path: &Path) -> Result<MountEntry> {
        let output = Command::new("df")
            .arg("-P")
            .arg(path)
            .output()
            .map_err(|e| QduError::MountQuery {
                path: path.to_path_buf(),
                reason: format!("failed to run df: {}", e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(QduError::MountQuery {
                path: path.to_path_buf(),
                reason: stderr.trim().to_string(),
            });
        }
        parse_df_output(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            QduError::MountQuery {
                path: path.to_path_buf(),
                reason: "unreadable df output".to_string(),
            }
        })
    }
}

/// Pick the device and mountpoint out of `df` output: second line, first and
/// last whitespace-separated fields.
pub fn parse_df_output(output: &str) -> Option<MountEntry> {
    let row = output.lines().nth(1)?;
    let mut fields = row.split_whitespace();
    let device = fields.next()?;
    let mountpoint = fields.next_back()?;
    Some(MountEntry {
        device: device.to_string(),
        mountpoint: mountpoint.to_string(),
    })
}

/// Reachability via a short-lived TCP connect, no data exchanged.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    pub timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
        }
    }
}

impl Reachability for TcpProbe {
    fn is_reachable(&self, host: &str, port: u16) -> bool {
        let addrs = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("Cannot resolve {}: {}", host, e);
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// A cluster export whose API port answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMount {
    pub host: String,
    pub export_root: String,
    pub local_mountpoint: String,
}

/// Classification of a path, with the degraded case kept explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    Local,
    RemoteReachable(RemoteMount),
    /// Exported from `host`, but its API port did not accept a connection.
    RemoteUnreachable { host: String, export_root: String },
}

/// Flat per-path view: the remote fields are present iff `is_remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub is_remote: bool,
    pub remote_host: Option<String>,
    pub remote_export_root: Option<String>,
    pub local_mountpoint: Option<String>,
}

impl From<&MountStatus> for MountInfo {
    fn from(status: &MountStatus) -> Self {
        match status {
            MountStatus::RemoteReachable(mount) => MountInfo {
                is_remote: true,
                remote_host: Some(mount.host.clone()),
                remote_export_root: Some(mount.export_root.clone()),
                local_mountpoint: Some(mount.local_mountpoint.clone()),
            },
            MountStatus::Local | MountStatus::RemoteUnreachable { .. } => MountInfo {
                is_remote: false,
                remote_host: None,
                remote_export_root: None,
                local_mountpoint: None,
            },
        }
    }
}

/// Classify `path`. The probe only runs when the mount table reports a
/// `host:export` device.
pub fn resolve_status(
    path: &Path,
    api_port: u16,
    table: &dyn MountTable,
    probe: &dyn Reachability,
) -> Result<MountStatus> {
    let entry = table.lookup(path)?;
    let Some((host, export_root)) = entry.device.split_once(':') else {
        debug!("{} is on local device {}", path.display(), entry.device);
        return Ok(MountStatus::Local);
    };
    let local_mountpoint = strip_private_prefix(&entry.mountpoint).to_string();

    if !probe.is_reachable(host, api_port) {
        info!(
            "{}:{} does not answer, measuring {} locally",
            host,
            api_port,
            path.display()
        );
        return Ok(MountStatus::RemoteUnreachable {
            host: host.to_string(),
            export_root: export_root.to_string(),
        });
    }

    debug!(
        "{} is {}:{} mounted on {}",
        path.display(),
        host,
        export_root,
        local_mountpoint
    );
    Ok(MountStatus::RemoteReachable(RemoteMount {
        host: host.to_string(),
        export_root: export_root.to_string(),
        local_mountpoint,
    }))
}

pub fn resolve(
    path: &Path,
    api_port: u16,
    table: &dyn MountTable,
    probe: &dyn Reachability,
) -> Result<MountInfo> {
    resolve_status(path, api_port, table, probe).map(|status| MountInfo::from(&status))
}

/// Drop the `/private` prefix some platforms put in front of mountpoints.
pub fn strip_private_prefix(path: &str) -> &str {
    match path.strip_prefix("/private") {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Absolute form of `path` as the mount table sees it: symlinks resolved when
/// the path exists, otherwise lexically normalized against the working
/// directory.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    // df follows symlinks, so the mountpoint it reports is that of the target.
    if let Ok(canonical) = fs::canonicalize(path) {
        return Ok(canonical);
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

impl RemoteMount {
    /// Name of `local_path` (absolute, normalized) inside the cluster namespace.
    pub fn translate(&self, local_path: &str) -> Result<String> {
        let local_path = strip_private_prefix(local_path);
        let mountpoint = self.local_mountpoint.trim_end_matches('/');

        let suffix = match local_path.strip_prefix(mountpoint) {
            Some("/") => "",
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => {
                return Err(QduError::NotUnderMount {
                    path: local_path.to_string(),
                    mountpoint: self.local_mountpoint.clone(),
                });
            }
        };

        let root = self.export_root.trim_end_matches('/');
        if root.is_empty() {
            // Export of the namespace root: no prefix to add.
            return Ok(if suffix.is_empty() {
                "/".to_string()
            } else {
                suffix.to_string()
            });
        }
        Ok(format!("{}{}", root, suffix))
    }
}
