//! Local measurement for paths the cluster API cannot answer for.

use crate::{
    error::{QduError, Result},
    format::SizeMode,
};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, warn};

pub trait LocalFallback {
    /// Report for `path` in `du` output form, as raw bytes.
    fn measure(&self, path: &Path, kibibytes: bool, summarize: bool) -> Result<Vec<u8>>;
}

/// Runs `du` and hands back its stdout untouched.
#[derive(Debug, Clone)]
pub struct DuFallback {
    pub program: PathBuf,
}

impl Default for DuFallback {
    fn default() -> Self {
        Self {
            program: PathBuf::from("du"),
        }
    }
}

impl LocalFallback for DuFallback {
    fn measure(&self, path: &Path, kibibytes: bool, summarize: bool) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        if summarize {
            command.arg("-s");
        }
        if kibibytes {
            command.arg("-k");
        }
        let output = command.arg(path).output().map_err(|e| QduError::Fallback {
            path: path.to_path_buf(),
            reason: format!("failed to run du: {}", e),
        })?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        // du exits non-zero for a single unreadable entry but still reports the rest.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.stdout.is_empty() {
            return Err(QduError::Fallback {
                path: path.to_path_buf(),
                reason: stderr.trim().to_string(),
            });
        }
        warn!("du {}: {}", output.status, stderr.trim());
        Ok(output.stdout)
    }
}

/// In-process walk for systems without `du`. Always summarizes.
#[derive(Debug, Clone, Copy)]
pub struct WalkFallback {
    pub follow_links: bool,
}

/// Get the number of CPUs for parallelism
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

impl WalkFallback {
    /// Sum of file sizes below `path`, plus the number of entries that could
    /// not be read.
    pub fn total_size(&self, path: &Path) -> (u64, usize) {
        use jwalk::WalkDir;

        if let Ok(meta) = fs::symlink_metadata(path)
            && meta.is_file()
        {
            return (meta.len(), 0);
        }

        let walker = WalkDir::new(path)
            .follow_links(self.follow_links)
            .skip_hidden(false)
            .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus()));

        let mut total = 0u64;
        let mut error_count = 0usize;
        for entry_result in walker {
            match entry_result {
                Ok(entry) => {
                    let entry_path = entry.path();
                    let meta = if self.follow_links {
                        fs::metadata(&entry_path)
                    } else {
                        fs::symlink_metadata(&entry_path)
                    };
                    match meta {
                        Ok(m) if m.is_file() => total += m.len(),
                        Ok(_) => {}
                        Err(e) => {
                            error_count += 1;
                            warn!("Could not access {:?}: {}", entry_path, e);
                        }
                    }
                }
                Err(e) => {
                    error_count += 1;
                    warn!("Walk error: {}", e);
                }
            }
        }
        (total, error_count)
    }
}

impl LocalFallback for WalkFallback {
    fn measure(&self, path: &Path, kibibytes: bool, _summarize: bool) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(QduError::Fallback {
                path: path.to_path_buf(),
                reason: "no such file or directory".to_string(),
            });
        }
        let (total, errors) = self.total_size(path);
        debug!("{}: {} bytes, {} unreadable", path.display(), total, errors);
        let size = match SizeMode::from_flag(kibibytes) {
            // du counts partial blocks as whole ones
            SizeMode::Kibibytes => total.div_ceil(1024).to_string(),
            mode => mode.render(total),
        };
        let mut report = size.into_bytes();
        report.push(b'\t');
        report.extend_from_slice(path.as_os_str().as_encoded_bytes());
        report.push(b'\n');
        Ok(report)
    }
}

/// `du` when it is on `PATH`, the in-process walk otherwise.
pub fn detect() -> Box<dyn LocalFallback> {
    match which::which("du") {
        Ok(du) => {
            debug!("Local fallback: {}", du.display());
            Box::new(DuFallback { program: du })
        }
        Err(_) => {
            debug!("Local fallback: directory walk");
            Box::new(WalkFallback {
                follow_links: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut a = fs::File::create(dir.path().join("a.bin")).unwrap();
        a.write_all(&[0u8; 3000]).unwrap();
        let mut b = fs::File::create(dir.path().join("sub").join("b.bin")).unwrap();
        b.write_all(&[0u8; 2000]).unwrap();
        dir
    }

    #[test]
    fn test_walk_sums_nested_files() {
        let dir = tree();
        let walk = WalkFallback { follow_links: false };
        assert_eq!(walk.total_size(dir.path()), (5000, 0));
    }

    #[test]
    fn test_walk_report_shape() {
        let dir = tree();
        let walk = WalkFallback { follow_links: false };
        let report = walk.measure(dir.path(), true, true).unwrap();
        assert_eq!(report, format!("5\t{}\n", dir.path().display()).into_bytes());
        let report = walk.measure(dir.path(), false, true).unwrap();
        assert_eq!(report, format!("5 kB\t{}\n", dir.path().display()).into_bytes());
    }

    #[test]
    fn test_walk_missing_path_is_error() {
        let walk = WalkFallback { follow_links: false };
        let err = walk
            .measure(Path::new("/definitely/not/here"), false, true)
            .unwrap_err();
        assert!(matches!(err, QduError::Fallback { .. }));
    }

    #[cfg(unix)]
    fn fake_du(dir: &Path, script: &str) -> DuFallback {
        use std::os::unix::fs::PermissionsExt;

        let program = dir.join("du");
        fs::write(&program, format!("#!/bin/sh\n{}", script)).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        DuFallback { program }
    }

    #[cfg(unix)]
    #[test]
    fn test_du_partial_failure_keeps_totals() {
        let dir = tempfile::tempdir().unwrap();
        let du = fake_du(
            dir.path(),
            "printf '4\\t/x\\n8\\t/x/ok\\n'\n\
             echo 'du: cannot read directory /x/locked: Permission denied' >&2\n\
             exit 1\n",
        );
        let report = du.measure(Path::new("/x"), true, false).unwrap();
        assert_eq!(report, b"4\t/x\n8\t/x/ok\n".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn test_du_without_output_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let du = fake_du(
            dir.path(),
            "echo 'du: cannot access /x: No such file or directory' >&2\nexit 1\n",
        );
        let err = du.measure(Path::new("/x"), false, true).unwrap_err();
        assert!(matches!(
            err,
            QduError::Fallback { ref reason, .. } if reason.contains("No such file")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_du_flags_and_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let du = fake_du(dir.path(), "printf '%s\\377\\n' \"$*\"\n");
        let report = du.measure(Path::new("/x"), true, true).unwrap();
        assert_eq!(report, b"-s -k /x\xff\n".to_vec());
        let report = du.measure(Path::new("/x"), false, false).unwrap();
        assert_eq!(report, b"/x\xff\n".to_vec());
    }

    #[test]
    fn test_du_missing_program_is_error() {
        let du = DuFallback {
            program: PathBuf::from("/definitely/not/du"),
        };
        let err = du.measure(Path::new("/x"), false, true).unwrap_err();
        assert!(matches!(err, QduError::Fallback { .. }));
    }
}
