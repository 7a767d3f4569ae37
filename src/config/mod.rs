use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Relay configuration, loaded once at startup and passed into the
/// pipeline as an immutable value. No component reads the environment
/// after this point.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// SFTP source host (default: "localhost")
    pub sftp_host: String,

    /// SFTP source port (default: 22)
    pub sftp_port: u16,

    /// SFTP username
    pub sftp_username: String,

    /// SFTP password
    pub sftp_password: String,

    /// Remote directory on the source host to list for artifacts (default: "/")
    pub sftp_dir: String,

    /// WebDAV collection URL the artifacts are published into
    pub webdav_url: String,

    /// WebDAV username (optional, anonymous if unset)
    pub webdav_username: Option<String>,

    /// WebDAV password
    pub webdav_password: Option<String>,

    /// Name suffix identifying backup artifacts (default: ".zpaq")
    pub artifact_suffix: String,

    /// Local staging directory for downloads (default: /tmp/backups)
    pub staging_dir: PathBuf,

    /// Number of most-recent destination artifacts to preserve (default: 3)
    pub keep_count: usize,

    /// Per-network-call timeout in seconds (default: 30)
    pub network_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sftp_host: "localhost".to_string(),
            sftp_port: 22,
            sftp_username: String::new(),
            sftp_password: String::new(),
            sftp_dir: "/".to_string(),
            webdav_url: "http://localhost:8080/backups/".to_string(),
            webdav_username: None,
            webdav_password: None,
            artifact_suffix: ".zpaq".to_string(),
            staging_dir: PathBuf::from("/tmp/backups"),
            keep_count: 3,
            network_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            sftp_host: env::var("SFTP_HOST").unwrap_or(default.sftp_host),

            sftp_port: env::var("SFTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sftp_port),

            sftp_username: env::var("SFTP_USER").unwrap_or(default.sftp_username),

            sftp_password: env::var("SFTP_PASS").unwrap_or(default.sftp_password),

            sftp_dir: env::var("SFTP_DIR").unwrap_or(default.sftp_dir),

            webdav_url: env::var("WEBDAV_URL").unwrap_or(default.webdav_url),

            webdav_username: env::var("WEBDAV_USER").ok(),
            webdav_password: env::var("WEBDAV_PASS").ok(),

            artifact_suffix: env::var("ARTIFACT_SUFFIX").unwrap_or(default.artifact_suffix),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            keep_count: env::var("KEEP_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.keep_count),

            network_timeout_secs: env::var("NETWORK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.network_timeout_secs),
        }
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.sftp_port, 22);
        assert_eq!(config.artifact_suffix, ".zpaq");
        assert_eq!(config.keep_count, 3);
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/backups"));
        assert_eq!(config.network_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_env_overrides() {
        unsafe {
            env::set_var("ARTIFACT_SUFFIX", ".tar.gz");
            env::set_var("KEEP_COUNT", "7");
        }
        let config = RelayConfig::from_env();
        unsafe {
            env::remove_var("ARTIFACT_SUFFIX");
            env::remove_var("KEEP_COUNT");
        }
        assert_eq!(config.artifact_suffix, ".tar.gz");
        assert_eq!(config.keep_count, 7);
    }

    #[test]
    fn test_from_env_bad_number_falls_back() {
        unsafe { env::set_var("SFTP_PORT", "not-a-port") };
        let config = RelayConfig::from_env();
        unsafe { env::remove_var("SFTP_PORT") };
        assert_eq!(config.sftp_port, 22);
    }
}
