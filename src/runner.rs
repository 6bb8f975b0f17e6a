use crate::{
    api::{AggregateApi, Connector, Credentials, RestConnector},
    args::Args,
    error::Result,
    fallback::{self, LocalFallback},
    format::SizeMode,
    mount::{self, DfMountTable, MountStatus, MountTable, Reachability, TcpProbe},
    traversal::query,
};
use std::{
    collections::{HashMap, hash_map::Entry},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};

/// Settings shared by every input path.
#[derive(Debug, Clone)]
pub struct Options {
    pub size_mode: SizeMode,
    pub recurse: bool,
    pub port: u16,
    pub credentials: Credentials,
}

impl From<&Args> for Options {
    fn from(args: &Args) -> Self {
        Self {
            size_mode: SizeMode::from_flag(args.in_kibibytes),
            recurse: !args.summarize,
            port: args.port,
            credentials: Credentials {
                username: args.user.clone(),
                password: args.password.clone(),
            },
        }
    }
}

/// Measures input paths one after another, remotely when the cluster
/// answers and locally otherwise.
pub struct Qdu {
    options: Options,
    mounts: Box<dyn MountTable>,
    probe: Box<dyn Reachability>,
    connector: Box<dyn Connector>,
    fallback: Box<dyn LocalFallback>,
    sessions: HashMap<(String, u16), Box<dyn AggregateApi>>,
}

impl Qdu {
    pub fn new(
        options: Options,
        mounts: Box<dyn MountTable>,
        probe: Box<dyn Reachability>,
        connector: Box<dyn Connector>,
        fallback: Box<dyn LocalFallback>,
    ) -> Self {
        Self {
            options,
            mounts,
            probe,
            connector,
            fallback,
            sessions: HashMap::new(),
        }
    }

    /// Wire up `df`, a TCP probe, the REST API and `du` (or a walk).
    pub fn from_args(args: &Args) -> Self {
        let connector = RestConnector {
            page_size: args.page_size,
            timeout: args.timeout.map(Duration::from_secs),
            strict_tls: args.strict_tls,
            ..RestConnector::default()
        };
        Self::new(
            Options::from(args),
            Box::new(DfMountTable),
            Box::new(TcpProbe {
                timeout: Duration::from_millis(args.probe_timeout),
            }),
            Box::new(connector),
            fallback::detect(),
        )
    }

    /// Process `paths` in order. Per-path failures go to `diag` as
    /// `qdu: <path>: <error>`; returns how many paths failed.
    pub fn run(&mut self, paths: &[PathBuf], out: &mut dyn Write, diag: &mut dyn Write) -> usize {
        let mut failures = 0;
        for path in paths {
            if let Err(e) = self.process(path, out) {
                failures += 1;
                if let Err(write_error) = writeln!(diag, "qdu: {}: {}", path.display(), e) {
                    warn!("cannot report failure of {}: {} ({})", path.display(), e, write_error);
                }
            }
        }
        if let Err(e) = out.flush() {
            warn!("cannot flush output: {}", e);
        }
        failures
    }

    pub fn process(&mut self, path: &Path, out: &mut dyn Write) -> Result<()> {
        let absolute = mount::absolutize(path)?;
        let status = mount::resolve_status(
            &absolute,
            self.options.port,
            self.mounts.as_ref(),
            self.probe.as_ref(),
        )?;

        let remote = match status {
            MountStatus::RemoteReachable(remote) => remote,
            MountStatus::Local | MountStatus::RemoteUnreachable { .. } => {
                let report = self.fallback.measure(
                    path,
                    self.options.size_mode == SizeMode::Kibibytes,
                    !self.options.recurse,
                )?;
                out.write_all(&report)?;
                return Ok(());
            }
        };

        let namespace_path = remote.translate(&absolute.to_string_lossy())?;
        debug!("{} -> {}:{}", path.display(), remote.host, namespace_path);

        let session = Self::session(
            &mut self.sessions,
            self.connector.as_ref(),
            &self.options,
            &remote.host,
        )?;
        for result in query(session, &namespace_path, self.options.recurse) {
            let result = result?;
            writeln!(
                out,
                "{}\t{}",
                self.options.size_mode.render(result.total_size_bytes),
                display_path(path, &namespace_path, &result.path)
            )?;
        }
        Ok(())
    }

    // One login per cluster for the whole run.
    fn session<'s>(
        sessions: &'s mut HashMap<(String, u16), Box<dyn AggregateApi>>,
        connector: &dyn Connector,
        options: &Options,
        host: &str,
    ) -> Result<&'s dyn AggregateApi> {
        let key = (host.to_string(), options.port);
        let session: &'s Box<dyn AggregateApi> = match sessions.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                info!("Connecting to {}:{}", host, options.port);
                entry.insert(connector.connect(host, options.port, &options.credentials)?)
            }
        };
        Ok(&**session)
    }
}

/// Local spelling of a visited namespace directory: the input path as the
/// user typed it, followed by the part of `visited` below `root`.
pub fn display_path(input: &Path, root: &str, visited: &str) -> String {
    let input = input.display().to_string();
    let suffix = visited
        .strip_prefix(root)
        .unwrap_or(visited)
        .trim_start_matches('/');
    if suffix.is_empty() {
        return input;
    }
    format!("{}/{}", input.trim_end_matches('/'), suffix)
}
