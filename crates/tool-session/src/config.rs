use std::error::Error as StdError;
use std::ffi::OsString;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_MODULE: &str = "barry_server.server";
const DEFAULT_SEARCH_PATH_VAR: &str = "PYTHONPATH";
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The error returned when a [`WorkerConfigBuilder`] holds invalid values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The interpreter path is empty.
    EmptyInterpreter,
    /// The worker source root does not exist or is not a directory.
    InvalidSourceRoot(PathBuf),
    /// The handshake timeout is zero.
    ZeroTimeout,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyInterpreter => {
                write!(f, "The worker interpreter must not be empty")
            }
            ConfigError::InvalidSourceRoot(path) => write!(
                f,
                "The worker source root `{}` is not a directory",
                path.display()
            ),
            ConfigError::ZeroTimeout => {
                write!(f, "The handshake timeout must not be zero")
            }
        }
    }
}

impl StdError for ConfigError {}

/// Builder for [`WorkerConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerConfigBuilder {
    source_root: PathBuf,
    interpreter: Option<PathBuf>,
    args: Option<Vec<String>>,
    working_dir: Option<PathBuf>,
    search_path_var: Option<String>,
    env: Vec<(String, String)>,
    handshake_timeout: Option<Duration>,
}

impl WorkerConfigBuilder {
    /// Creates a builder for a worker whose sources live in `source_root`.
    #[inline]
    pub fn with_source_root<P: Into<PathBuf>>(source_root: P) -> Self {
        Self {
            source_root: source_root.into(),
            interpreter: None,
            args: None,
            working_dir: None,
            search_path_var: None,
            env: vec![],
            handshake_timeout: None,
        }
    }

    /// Sets the interpreter used to run the worker.
    #[inline]
    pub fn with_interpreter<P: Into<PathBuf>>(
        mut self,
        interpreter: P,
    ) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Replaces the entry arguments passed to the interpreter.
    #[inline]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the working directory of the worker process.
    #[inline]
    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the name of the module search path variable.
    #[inline]
    pub fn with_search_path_var<S: Into<String>>(mut self, name: S) -> Self {
        self.search_path_var = Some(name.into());
        self
    }

    /// Adds an environment variable for the worker process.
    #[inline]
    pub fn with_env<K: Into<String>, V: Into<String>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets how long the capability handshake may take.
    #[inline]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Validates the values and builds the configuration.
    pub fn build(self) -> Result<WorkerConfig, ConfigError> {
        let interpreter = self
            .interpreter
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER));
        if interpreter.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInterpreter);
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError::InvalidSourceRoot(self.source_root));
        }
        let handshake_timeout =
            self.handshake_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);
        if handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(WorkerConfig {
            interpreter,
            args: self.args.unwrap_or_else(|| {
                vec!["-m".to_owned(), DEFAULT_MODULE.to_owned()]
            }),
            working_dir: self.working_dir,
            search_path_var: self
                .search_path_var
                .unwrap_or_else(|| DEFAULT_SEARCH_PATH_VAR.to_owned()),
            source_root: self.source_root,
            env: self.env,
            handshake_timeout,
        })
    }
}

/// Describes how to start a worker process.
///
/// Values are checked by [`WorkerConfigBuilder::build`], so a config that
/// exists is always usable for spawning.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerConfig {
    interpreter: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    source_root: PathBuf,
    search_path_var: String,
    env: Vec<(String, String)>,
    handshake_timeout: Duration,
}

impl WorkerConfig {
    /// Returns the interpreter path.
    #[inline]
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Returns the entry arguments.
    #[inline]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, if one was set.
    #[inline]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Returns the worker source root.
    #[inline]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Returns the handshake timeout.
    #[inline]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns all environment variables set for the worker, the module
    /// search path first.
    pub fn envs(&self) -> Vec<(OsString, OsString)> {
        let search_path = self.source_root.join("src");
        let mut envs = vec![(
            OsString::from(&self.search_path_var),
            search_path.into_os_string(),
        )];
        envs.extend(
            self.env
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v))),
        );
        envs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfigBuilder::with_source_root(source_root())
            .build()
            .unwrap();
        assert_eq!(config.interpreter(), Path::new("python3"));
        assert_eq!(config.args(), ["-m", "barry_server.server"]);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.working_dir(), None);

        let envs = config.envs();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].0, "PYTHONPATH");
        assert_eq!(envs[0].1, source_root().join("src").into_os_string());
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfigBuilder::with_source_root(source_root())
            .with_interpreter("/opt/venv/bin/python")
            .with_args(["-u", "-m", "worker"])
            .with_search_path_var("NODE_PATH")
            .with_env("BARRY_DATA", "/data")
            .with_handshake_timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(config.args(), ["-u", "-m", "worker"]);
        assert_eq!(config.handshake_timeout(), Duration::from_millis(250));

        let envs = config.envs();
        assert_eq!(envs[0].0, "NODE_PATH");
        assert_eq!(envs[1], ("BARRY_DATA".into(), "/data".into()));
    }

    #[test]
    fn test_validation() {
        let err = WorkerConfigBuilder::with_source_root(source_root())
            .with_interpreter("")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyInterpreter);

        let missing = source_root().join("no-such-directory");
        let err = WorkerConfigBuilder::with_source_root(&missing)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidSourceRoot(missing));

        let file = source_root().join("Cargo.toml");
        let err = WorkerConfigBuilder::with_source_root(&file)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSourceRoot(_)));

        let err = WorkerConfigBuilder::with_source_root(source_root())
            .with_handshake_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroTimeout);
    }
}
