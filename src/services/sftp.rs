use super::PipelineError;
use super::source::{SourceArtifact, SourceHost, TimestampConfidence};
use crate::config::RelayConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::{FileStat, Session};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SFTP-backed source host.
///
/// ssh2 is a blocking library, so every operation opens its own session
/// inside `spawn_blocking` and drops it when the call returns. That keeps
/// source connections scoped to exactly one stage of one run.
#[derive(Clone)]
pub struct SftpSource {
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_dir: String,
    timeout: Duration,
}

impl SftpSource {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            host: config.sftp_host.clone(),
            port: config.sftp_port,
            username: config.sftp_username.clone(),
            password: config.sftp_password.clone(),
            remote_dir: config.sftp_dir.clone(),
            timeout: config.network_timeout(),
        }
    }

    fn connect(&self) -> Result<(Session, ssh2::Sftp), PipelineError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| PipelineError::Transfer(format!("resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| {
                PipelineError::Transfer(format!("no address for {}", self.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| PipelineError::Transfer(format!("connect {}: {}", addr, e)))?;

        let mut session =
            Session::new().map_err(|e| PipelineError::Transfer(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| PipelineError::Transfer(format!("ssh handshake: {}", e)))?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| PipelineError::Transfer(format!("ssh auth: {}", e)))?;

        let sftp = session
            .sftp()
            .map_err(|e| PipelineError::Transfer(format!("sftp channel: {}", e)))?;
        Ok((session, sftp))
    }

    fn remote_path(&self, name: &str) -> PathBuf {
        Path::new(&self.remote_dir).join(name)
    }

    fn to_artifact(name: String, stat: &FileStat, confidence: TimestampConfidence) -> SourceArtifact {
        let modified_at = stat
            .mtime
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        SourceArtifact {
            name,
            size_bytes: stat.size.unwrap_or(0),
            modified_at,
            confidence,
        }
    }

    fn list_blocking(&self) -> Result<Vec<SourceArtifact>, PipelineError> {
        let (_session, sftp) = self.connect()?;
        let entries = sftp
            .readdir(Path::new(&self.remote_dir))
            .map_err(|e| PipelineError::Transfer(format!("readdir {}: {}", self.remote_dir, e)))?;

        let mut artifacts = Vec::new();
        for (path, stat) in entries {
            if stat.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            artifacts.push(Self::to_artifact(
                name.to_string(),
                &stat,
                TimestampConfidence::Degraded,
            ));
        }
        Ok(artifacts)
    }

    fn stat_blocking(&self, name: &str) -> Result<SourceArtifact, PipelineError> {
        let (_session, sftp) = self.connect()?;
        let stat = sftp
            .stat(&self.remote_path(name))
            .map_err(|e| PipelineError::Transfer(format!("stat {}: {}", name, e)))?;
        Ok(Self::to_artifact(
            name.to_string(),
            &stat,
            TimestampConfidence::Exact,
        ))
    }

    fn download_blocking(&self, name: &str, dest: &Path) -> Result<u64, PipelineError> {
        let (_session, sftp) = self.connect()?;
        let mut remote = sftp
            .open(&self.remote_path(name))
            .map_err(|e| PipelineError::Transfer(format!("open {}: {}", name, e)))?;
        let mut local = std::fs::File::create(dest)
            .map_err(|e| PipelineError::Transfer(format!("create {}: {}", dest.display(), e)))?;
        let written = std::io::copy(&mut remote, &mut local)
            .map_err(|e| PipelineError::Transfer(format!("download {}: {}", name, e)))?;
        Ok(written)
    }
}

#[async_trait]
impl SourceHost for SftpSource {
    async fn list(&self) -> Result<Vec<SourceArtifact>, PipelineError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.list_blocking())
            .await
            .map_err(|e| PipelineError::Transfer(format!("sftp task: {}", e)))?
    }

    async fn stat(&self, name: &str) -> Result<SourceArtifact, PipelineError> {
        let this = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || this.stat_blocking(&name))
            .await
            .map_err(|e| PipelineError::Transfer(format!("sftp task: {}", e)))?
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<u64, PipelineError> {
        let this = self.clone();
        let name = name.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || this.download_blocking(&name, &dest))
            .await
            .map_err(|e| PipelineError::Transfer(format!("sftp task: {}", e)))?
    }
}
