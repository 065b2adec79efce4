//! Disk space and connectivity checks

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use super::HostProbe;
use crate::error::{SkillvaultError, SkillvaultResult};

/// Probes the real host
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }
}

impl HostProbe for SystemProbe {
    fn free_space(&self, path: &Path) -> SkillvaultResult<u64> {
        // The backup dir may not exist yet; measure the volume it will live on.
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("/"));

        let stat = nix::sys::statvfs::statvfs(existing).map_err(|e| {
            SkillvaultError::Io(format!("statvfs {} failed: {}", existing.display(), e))
        })?;

        Ok((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
    }

    fn check_connectivity(&self, host: &str, timeout: Duration) -> SkillvaultResult<()> {
        let addrs = host
            .to_socket_addrs()
            .map_err(|e| SkillvaultError::Io(format!("cannot resolve {}: {}", host, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }

        Err(SkillvaultError::Io(match last_err {
            Some(e) => format!("{} unreachable: {}", host, e),
            None => format!("{} resolved to no addresses", host),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_free_space_of_missing_dir_uses_ancestor() {
        let temp = tempfile::TempDir::new().unwrap();
        let probe = SystemProbe::new();
        let free = probe
            .free_space(&temp.path().join("not").join("yet"))
            .unwrap();
        assert!(free > 0);
    }

    #[test]
    fn test_connectivity_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = SystemProbe::new();
        probe
            .check_connectivity(&addr.to_string(), Duration::from_secs(2))
            .unwrap();
    }

    #[test]
    fn test_connectivity_rejects_unresolvable_host() {
        let probe = SystemProbe::new();
        assert!(probe
            .check_connectivity("not a host", Duration::from_millis(100))
            .is_err());
    }
}
