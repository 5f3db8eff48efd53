//! Cluster connectors - probing tenant clusters from decrypted credentials.
//!
//! The production connector shells out to `kubectl` against a scoped
//! temporary kubeconfig, so the plaintext credentials never outlive the
//! probe that needed them.

use std::io::Write;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::models::ConnectionTestResult;

/// Probes a cluster's API server from plaintext credentials.
///
/// Implementations must not retain the kubeconfig after the call returns.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Probe the API server the kubeconfig points at. An empty `context`
    /// means the kubeconfig's current context.
    async fn probe(&self, kubeconfig: &str, context: &str) -> ConnectionTestResult;
}

/// Connector backed by the `kubectl` binary.
#[derive(Clone)]
pub struct KubectlConnector {
    timeout: Duration,
}

impl KubectlConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Materialize a kubeconfig as a temp file. The file is removed when the
    /// returned handle drops, on every exit path.
    fn write_kubeconfig(kubeconfig: &str) -> Result<NamedTempFile, std::io::Error> {
        let mut file = NamedTempFile::new()?;
        file.write_all(kubeconfig.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

impl Default for KubectlConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ClusterConnector for KubectlConnector {
    async fn probe(&self, kubeconfig: &str, context: &str) -> ConnectionTestResult {
        let file = match Self::write_kubeconfig(kubeconfig) {
            Ok(file) => file,
            Err(e) => {
                return ConnectionTestResult::unreachable(format!("Connection failed: {}", e));
            }
        };

        let mut cmd = Command::new("kubectl");
        cmd.arg("version")
            .arg("--output")
            .arg("json")
            .arg("--kubeconfig")
            .arg(file.path())
            .arg("--request-timeout")
            .arg(format!("{}s", self.timeout.as_secs()));
        if !context.is_empty() {
            cmd.arg("--context").arg(context);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::debug!(
            context = %context,
            timeout_secs = %self.timeout.as_secs(),
            "Probing cluster API server"
        );

        // kubectl enforces the request timeout itself; the outer deadline
        // only catches a hung binary.
        let deadline = self.timeout + Duration::from_secs(5);
        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ConnectionTestResult::unreachable(format!("Connection failed: {}", e));
            }
            Err(_) => {
                return ConnectionTestResult::unreachable(format!(
                    "Connection failed: probe timed out after {}s",
                    deadline.as_secs()
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().next().unwrap_or("probe failed").trim();
            tracing::debug!(context = %context, reason = %reason, "Cluster probe failed");
            return ConnectionTestResult::unreachable(format!("Connection failed: {}", reason));
        }

        ConnectionTestResult::reachable(parse_server_version(&output.stdout))
    }
}

/// Extract `serverVersion.gitVersion` from `kubectl version --output json`.
fn parse_server_version(stdout: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(stdout)
        .ok()?
        .get("serverVersion")?
        .get("gitVersion")?
        .as_str()
        .map(str::to_owned)
}

/// Scripted connector for tests. Records every probe it receives; with no
/// scripted result it reports a reachable v1.29.2 server.
#[derive(Default)]
pub struct MockConnector {
    pub result: Mutex<Option<ConnectionTestResult>>,
    pub probes: Mutex<Vec<(String, String)>>,
}

impl MockConnector {
    pub fn reachable(version: &str) -> Self {
        Self {
            result: Mutex::new(Some(ConnectionTestResult::reachable(Some(
                version.to_string(),
            )))),
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable(error: &str) -> Self {
        Self {
            result: Mutex::new(Some(ConnectionTestResult::unreachable(error))),
            probes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClusterConnector for MockConnector {
    async fn probe(&self, kubeconfig: &str, context: &str) -> ConnectionTestResult {
        if let Ok(mut probes) = self.probes.lock() {
            probes.push((kubeconfig.to_string(), context.to_string()));
        }
        match self.result.lock() {
            Ok(result) => result
                .clone()
                .unwrap_or_else(|| ConnectionTestResult::reachable(Some("v1.29.2".to_string()))),
            Err(_) => ConnectionTestResult::unreachable("mock lock poisoned"),
        }
    }
}
