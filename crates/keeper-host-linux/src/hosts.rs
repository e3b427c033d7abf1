//! Hosts-file website blocking
//!
//! Each blocked domain is one line redirecting it to a local address, tagged
//! with [`BLOCK_MARKER`]. Only tagged lines are ever read back or removed, so
//! entries the user wrote by hand are left alone.

use async_trait::async_trait;
use keeper_host_api::{HostError, HostResult, NetworkEnforcer};
use std::io::{ErrorKind, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Comment that tags lines written by keeperd
pub const BLOCK_MARKER: &str = "# Focus Keeper Block";

pub struct HostsFileEnforcer {
    path: PathBuf,
    redirect: IpAddr,
    /// Held for the whole read-modify-write, including after the caller gives
    /// up waiting on it
    file_lock: Arc<Mutex<()>>,
}

impl HostsFileEnforcer {
    pub fn new(path: impl Into<PathBuf>, redirect: IpAddr) -> Self {
        Self {
            path: path.into(),
            redirect,
            file_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_for(&self, domain: &str) -> String {
        format!("{} {} {}", self.redirect, domain, BLOCK_MARKER)
    }

    /// Apply `edit` to the file contents on a blocking thread. `edit` returns
    /// the new contents, or `None` to leave the file alone. The update runs to
    /// completion even if the returned future is dropped.
    async fn update<F>(&self, edit: F) -> HostResult<bool>
    where
        F: FnOnce(String) -> Option<String> + Send + 'static,
    {
        let guard = self.file_lock.clone().lock_owned().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let content = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            match edit(content) {
                Some(updated) => {
                    replace_file(&path, &updated).map_err(|e| io_error(&path, e))?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
        .map_err(|e| HostError::Internal(format!("hosts update task failed: {}", e)))?
    }
}

/// Write `content` to a sibling file and rename it over `path`, so readers
/// see either the old file or the new one. Falls back to an in-place write
/// where the file cannot be replaced, such as a bind-mounted hosts file.
fn replace_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".keeper-tmp");
    let tmp = path.with_file_name(tmp_name);

    let staged = (|| {
        let permissions = std::fs::metadata(path)?.permissions();
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::set_permissions(&tmp, permissions)
    })();
    if let Err(e) = staged {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(e);
            }
            warn!(path = %path.display(), error = %e, "Cannot replace hosts file, writing in place");
            std::fs::write(path, content)
        }
    }
}

/// Domain of a keeperd-tagged line, if it is one
fn tagged_domain(line: &str) -> Option<&str> {
    let (entry, _) = line.split_once(BLOCK_MARKER)?;
    let mut fields = entry.split_whitespace();
    let _address = fields.next()?;
    fields.next()
}

fn io_error(path: &Path, e: std::io::Error) -> HostError {
    if e.kind() == ErrorKind::PermissionDenied {
        HostError::PermissionDenied(format!("{}: {}", path.display(), e))
    } else {
        HostError::Io(e)
    }
}

#[async_trait]
impl NetworkEnforcer for HostsFileEnforcer {
    async fn block(&self, domain: &str) -> HostResult<()> {
        let entry = self.entry_for(domain);
        let target = domain.to_string();

        let changed = self
            .update(move |mut content| {
                if content.lines().any(|line| tagged_domain(line) == Some(target.as_str())) {
                    return None;
                }
                if !content.is_empty() && !content.ends_with('\n') {
                    content.push('\n');
                }
                content.push_str(&entry);
                content.push('\n');
                Some(content)
            })
            .await?;

        if changed {
            info!(domain = %domain, path = %self.path.display(), "Hosts entry added");
        } else {
            debug!(domain = %domain, "Already in hosts file");
        }
        Ok(())
    }

    async fn unblock(&self, domain: &str) -> HostResult<()> {
        let target = domain.to_string();

        let changed = self
            .update(move |content| {
                let mut removed = false;
                let mut kept = String::with_capacity(content.len());
                for line in content.lines() {
                    if tagged_domain(line) == Some(target.as_str()) {
                        removed = true;
                        continue;
                    }
                    kept.push_str(line);
                    kept.push('\n');
                }
                removed.then_some(kept)
            })
            .await?;

        if changed {
            info!(domain = %domain, path = %self.path.display(), "Hosts entry removed");
        }
        Ok(())
    }

    async fn enforced(&self) -> HostResult<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        let mut domains: Vec<String> = content
            .lines()
            .filter_map(tagged_domain)
            .map(str::to_string)
            .collect();
        domains.sort();
        domains.dedup();
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const BASE: &str = "127.0.0.1 localhost\n::1 localhost\n127.0.0.1 reddit.com\n";

    fn enforcer_with(content: &str) -> (tempfile::TempDir, HostsFileEnforcer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, content).unwrap();
        let enforcer = HostsFileEnforcer::new(path, IpAddr::V4(Ipv4Addr::LOCALHOST));
        (dir, enforcer)
    }

    #[tokio::test]
    async fn block_appends_tagged_line_once() {
        let (_dir, enforcer) = enforcer_with(BASE);
        enforcer.block("youtube.com").await.unwrap();
        enforcer.block("youtube.com").await.unwrap();

        let content = std::fs::read_to_string(enforcer.path()).unwrap();
        assert!(content.starts_with(BASE));
        assert_eq!(
            content.matches("127.0.0.1 youtube.com # Focus Keeper Block").count(),
            1
        );
        assert_eq!(enforcer.enforced().await.unwrap(), vec!["youtube.com"]);
    }

    #[tokio::test]
    async fn unblock_leaves_foreign_lines() {
        let (_dir, enforcer) = enforcer_with(BASE);
        enforcer.block("reddit.com").await.unwrap();
        enforcer.unblock("reddit.com").await.unwrap();

        // The hand-written reddit.com line survives
        let content = std::fs::read_to_string(enforcer.path()).unwrap();
        assert_eq!(content, BASE);
        assert!(enforcer.enforced().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unblock_absent_is_noop() {
        let (_dir, enforcer) = enforcer_with(BASE);
        enforcer.unblock("example.com").await.unwrap();
        assert_eq!(std::fs::read_to_string(enforcer.path()).unwrap(), BASE);
    }

    #[tokio::test]
    async fn block_handles_missing_trailing_newline() {
        let (_dir, enforcer) = enforcer_with("127.0.0.1 localhost");
        enforcer.block("x.com").await.unwrap();
        let content = std::fs::read_to_string(enforcer.path()).unwrap();
        assert_eq!(
            content,
            "127.0.0.1 localhost\n127.0.0.1 x.com # Focus Keeper Block\n"
        );
    }

    #[tokio::test]
    async fn update_replaces_file_and_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, enforcer) = enforcer_with(BASE);
        std::fs::set_permissions(enforcer.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        enforcer.block("x.com").await.unwrap();

        let mode = std::fs::metadata(enforcer.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        // No staging file left behind
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("hosts")]);
    }

    #[tokio::test]
    async fn abandoned_block_still_lands_whole() {
        let (_dir, enforcer) = enforcer_with(BASE);

        // The caller stops waiting, but the edit finishes under the file lock
        let _ = tokio::time::timeout(std::time::Duration::ZERO, enforcer.block("a.com")).await;
        enforcer.block("b.com").await.unwrap();

        let content = std::fs::read_to_string(enforcer.path()).unwrap();
        assert!(content.starts_with(BASE));
        assert_eq!(enforcer.enforced().await.unwrap(), vec!["a.com", "b.com"]);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let enforcer = HostsFileEnforcer::new(
            "/nonexistent/keeper/hosts",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert!(enforcer.block("x.com").await.is_err());
    }

    #[test]
    fn tagged_domain_parsing() {
        assert_eq!(
            tagged_domain("0.0.0.0 a.com # Focus Keeper Block"),
            Some("a.com")
        );
        assert_eq!(tagged_domain("127.0.0.1 a.com"), None);
        assert_eq!(tagged_domain("# Focus Keeper Block"), None);
    }
}
