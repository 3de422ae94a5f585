//! Provider plugin metadata
//!
//! Every declared provider is backed by a plugin executable (`pulumi-resource-<name>` by default). Invoked with
//! [PROVIDER_INFO_FLAG] a plugin writes its [ProviderInfo] as JSON to stdout and exits.
//!
//! Both the payload and the exit status are checked:
//!
//! | exit status | payload   | result                                              |
//! |-------------|-----------|-----------------------------------------------------|
//! | success     | valid     | `Ok(info)`                                          |
//! | success     | malformed | [PluginError::Decode]                               |
//! | failure     | any       | [PluginError::Execution] (carrying any decode error) |
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

pub const PROVIDER_INFO_FLAG: &str = "-get-provider-info";
pub const DEFAULT_PLUGIN_PREFIX: &str = "pulumi-resource-";
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Schema metadata of a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Per resource type metadata
    #[serde(default)]
    pub resources: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub data_sources: IndexMap<String, serde_json::Value>,
    /// Provider configuration schema
    #[serde(default)]
    pub config: IndexMap<String, serde_json::Value>,
}

impl ProviderInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Source of provider metadata
///
/// Called once per declared provider, possibly from several threads at once.
pub trait ProviderInfoLoader: Sync {
    fn load(&self, provider: &str) -> Result<ProviderInfo, PluginError>;
}

/// Loader that does not run any plugins and reports name-only metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLoader;

impl ProviderInfoLoader for OfflineLoader {
    fn load(&self, provider: &str) -> Result<ProviderInfo, PluginError> {
        Ok(ProviderInfo::named(provider))
    }
}

/// Loads provider metadata by running plugin executables
#[derive(Debug, Clone)]
pub struct PluginLoader {
    search_dirs: Vec<PathBuf>,
    system_path: bool,
    prefix: String,
    timeout: Duration,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self {
            search_dirs: vec![],
            system_path: true,
            prefix: DEFAULT_PLUGIN_PREFIX.to_string(),
            timeout: DEFAULT_PLUGIN_TIMEOUT,
        }
    }
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory searched before `PATH`, in the order added
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Whether to fall back to `PATH`
    pub fn system_path(mut self, enabled: bool) -> Self {
        self.system_path = enabled;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finds the plugin executable of a provider
    pub fn locate(&self, provider: &str) -> Result<PathBuf, PluginError> {
        let executable = format!("{}{}", self.prefix, provider);

        for dir in &self.search_dirs {
            if let Ok(path) = which::which_in(&executable, Some(dir), dir) {
                return Ok(path);
            }
        }

        if self.system_path {
            if let Ok(path) = which::which(&executable) {
                return Ok(path);
            }
        }

        Err(PluginError::NotFound {
            provider: provider.to_string(),
            executable,
        })
    }

    /// Runs a plugin and decodes its metadata
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn invoke(&self, path: &Path) -> Result<ProviderInfo, PluginError> {
        let execution_error = |failure, decode| PluginError::Execution {
            path: path.to_owned(),
            failure,
            decode,
        };

        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(path)
            .arg(PROVIDER_INFO_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| execution_error(ExecutionFailure::Spawn(source), None))?;

        let Some(stdout) = child.stdout.take() else {
            // stdout is piped above
            let _ = child.kill();
            return Err(execution_error(ExecutionFailure::MissingStdout, None));
        };

        // decode while the plugin is still running. The pipe only closes once every process holding it is gone, which
        // may be long after the plugin itself exited, so the decoder is abandoned at the deadline.
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let decoded = serde_json::from_reader::<_, ProviderInfo>(BufReader::new(stdout));
            // the receiver is gone after a timeout
            let _ = sender.send(decoded);
        });

        let status = wait_with_deadline(&mut child, deadline, self.timeout)
            .map_err(|failure| execution_error(failure, None))?;

        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(POLL_INTERVAL);
        let decoded = match receiver.recv_timeout(remaining) {
            Ok(decoded) => decoded,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(?status, "plugin exited but its output is still held open");
                let failure = if status.success() {
                    ExecutionFailure::TimedOut(self.timeout)
                } else {
                    ExecutionFailure::Exit(status)
                };
                return Err(execution_error(failure, None));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(execution_error(ExecutionFailure::MissingStdout, None))
            }
        };

        tracing::debug!(?status, decoded = decoded.is_ok(), "plugin finished");

        match decoded {
            Ok(info) if status.success() => Ok(info),
            Err(source) if status.success() => Err(PluginError::Decode {
                path: path.to_owned(),
                source,
            }),
            decoded => Err(execution_error(
                ExecutionFailure::Exit(status),
                decoded.err(),
            )),
        }
    }
}

impl ProviderInfoLoader for PluginLoader {
    fn load(&self, provider: &str) -> Result<ProviderInfo, PluginError> {
        let path = self.locate(provider)?;
        tracing::info!(provider, path = %path.display(), "loading provider info");
        self.invoke(&path)
    }
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, ExecutionFailure> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(?timeout, "plugin timed out, killing it");
                // fails only if the process already exited
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionFailure::TimedOut(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(ExecutionFailure::Wait(source)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    #[error("could not find plugin `{executable}` for provider `{provider}`")]
    NotFound {
        provider: String,
        executable: String,
    },
    #[error("plugin {} failed: {failure}", .path.display())]
    Execution {
        path: PathBuf,
        failure: ExecutionFailure,
        /// Set when the output could not be decoded either
        #[source]
        decode: Option<serde_json::Error>,
    },
    #[error("plugin {} returned malformed provider info", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutionFailure {
    #[error("unable to start process ({0})")]
    Spawn(std::io::Error),
    #[error("stdout could not be read")]
    MissingStdout,
    #[error("unable to wait for process ({0})")]
    Wait(std::io::Error),
    #[error("{0}")]
    Exit(ExitStatus),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Creates `pulumi-resource-<provider>` running the given shell script
    fn plugin(dir: &Path, provider: &str, script: &str) {
        let path = dir.join(format!("{DEFAULT_PLUGIN_PREFIX}{provider}"));
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn loader(dir: &Path) -> PluginLoader {
        PluginLoader::new().search_dir(dir).system_path(false)
    }

    #[test]
    fn loads_provider_info() {
        let dir = tempfile::tempdir().unwrap();
        plugin(
            dir.path(),
            "aws",
            r#"[ "$1" = "-get-provider-info" ] || exit 3
echo '{"Name": "aws", "Version": "1.2.3", "Resources": {"aws_instance": {"Tok": "aws:ec2/instance:Instance"}}}'"#,
        );

        let info = loader(dir.path()).load("aws").unwrap();
        assert_eq!(info.name, "aws");
        assert_eq!(info.version.as_deref(), Some("1.2.3"));
        assert!(info.resources.contains_key("aws_instance"));
        assert!(info.data_sources.is_empty());
    }

    #[test]
    fn missing_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader(dir.path()).load("aws").unwrap_err();
        assert!(matches!(
            err,
            PluginError::NotFound { provider, executable }
                if provider == "aws" && executable == "pulumi-resource-aws"
        ));
    }

    #[test]
    fn malformed_payload_after_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "echo 'not json'");

        let err = loader(dir.path()).load("aws").unwrap_err();
        assert!(matches!(err, PluginError::Decode { .. }), "{err:?}");
    }

    #[test]
    fn failed_exit_with_valid_payload() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "echo '{\"Name\": \"aws\"}'\nexit 1");

        let err = loader(dir.path()).load("aws").unwrap_err();
        let PluginError::Execution {
            failure, decode, ..
        } = err
        else {
            panic!("unexpected error {err:?}");
        };
        assert!(matches!(failure, ExecutionFailure::Exit(status) if status.code() == Some(1)));
        assert!(decode.is_none());
    }

    #[test]
    fn failed_exit_and_malformed_payload_are_both_reported() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "echo 'garbage'\nexit 2");

        let err = loader(dir.path()).load("aws").unwrap_err();
        let PluginError::Execution {
            failure, decode, ..
        } = err
        else {
            panic!("unexpected error {err:?}");
        };
        assert!(matches!(failure, ExecutionFailure::Exit(status) if status.code() == Some(2)));
        assert!(decode.is_some());
    }

    #[test]
    fn hanging_plugins_time_out() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "exec sleep 30");

        let err = loader(dir.path())
            .timeout(Duration::from_millis(200))
            .load("aws")
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Execution {
                failure: ExecutionFailure::TimedOut(_),
                ..
            }
        ));
    }

    #[test]
    fn child_processes_holding_stdout_do_not_block() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "sleep 5");

        let started = Instant::now();
        let err = loader(dir.path())
            .timeout(Duration::from_millis(200))
            .load("aws")
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(
            err,
            PluginError::Execution {
                failure: ExecutionFailure::TimedOut(_),
                ..
            }
        ));
    }

    #[test]
    fn background_processes_holding_stdout_time_out() {
        let dir = tempfile::tempdir().unwrap();
        plugin(dir.path(), "aws", "echo '{\"Name\": \"aws\"}'\nsleep 5 &");

        let started = Instant::now();
        let err = loader(dir.path())
            .timeout(Duration::from_millis(200))
            .load("aws")
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(
            err,
            PluginError::Execution {
                failure: ExecutionFailure::TimedOut(_),
                ..
            }
        ));
    }

    #[test]
    fn search_dirs_come_first() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        plugin(second.path(), "aws", "true");
        plugin(first.path(), "aws", "true");

        let located = PluginLoader::new()
            .search_dir(first.path())
            .search_dir(second.path())
            .system_path(false)
            .locate("aws")
            .unwrap();
        assert_eq!(located.parent(), Some(first.path()));
    }

    #[test]
    fn offline_loader_reports_names() {
        assert_eq!(OfflineLoader.load("aws").unwrap(), ProviderInfo::named("aws"));
    }
}
