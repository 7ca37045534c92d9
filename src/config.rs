use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub socket_path: String,
    pub sink: SinkConfig,
    #[serde(default)]
    pub worker: WorkerIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Reporting endpoint that receives the JSON payload
    pub endpoint: String,
    /// Hard deadline on the first delivery attempt
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// HTTP client limit applied to every request, the retry included
    #[serde(default = "default_client_timeout_seconds")]
    pub client_timeout_seconds: u64,
}

/// Version and source tags stamped onto every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub version: String,
    pub source: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_client_timeout_seconds() -> u64 {
    60
}

impl WorkerIdentity {
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.source, self.version)
    }
}

impl Default for WorkerIdentity {
    fn default() -> Self {
        WorkerIdentity {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: "dmarc-milter".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: "/var/run/dmarc-milter.sock".to_string(),
            sink: SinkConfig {
                endpoint: "https://reports.example.com/api/dmarc".to_string(),
                timeout_seconds: default_timeout_seconds(),
                client_timeout_seconds: default_client_timeout_seconds(),
            },
            worker: WorkerIdentity::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let endpoint = Url::parse(&self.sink.endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid sink endpoint '{}': {e}", self.sink.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("Sink endpoint must be http or https, got '{}'", endpoint.scheme());
        }
        if self.sink.timeout_seconds == 0 || self.sink.client_timeout_seconds == 0 {
            anyhow::bail!("sink.timeout_seconds and sink.client_timeout_seconds must be greater than zero");
        }
        if self.worker.version.trim().is_empty() || self.worker.source.trim().is_empty() {
            anyhow::bail!("worker.version and worker.source must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sink.timeout_seconds, 30);
        assert!(config.worker.user_agent().starts_with("dmarc-milter/"));
    }

    #[test]
    fn test_yaml_defaults_fill_in() {
        let yaml = "socket_path: /tmp/dmarc.sock\nsink:\n  endpoint: http://localhost:8080/ingest\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sink.timeout_seconds, 30);
        assert_eq!(config.sink.client_timeout_seconds, 60);
        assert_eq!(config.worker, WorkerIdentity::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let mut config = Config::default();
        config.sink.endpoint = "ftp://reports.example.com".to_string();
        assert!(config.validate().is_err());

        config.sink.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sink.client_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_file() {
        let path = std::env::temp_dir().join(format!("dmarc-milter-{}.yaml", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let config = Config::default();
        config.to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.sink.endpoint, config.sink.endpoint);
        assert_eq!(loaded.socket_path, config.socket_path);
    }
}
