use std::path::PathBuf;
use std::time::Duration;

/// Default lock marker file name inside the system temp directory.
const DEFAULT_LOCK_FILE: &str = "geogrid-orchestrator.lock";

/// Configuration errors are fatal: the process exits before touching the
/// lock or the database.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// How unranked points of a run are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Bounded pool of isolated tasks, failures contained per point.
    Pool,
    /// One point at a time in this process; an exhausted point fails the run.
    Sequential,
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// The rank-resolver executable and its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ResolverCommand {
    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub lock_path: PathBuf,
    /// Upper bound on in-flight measurement tasks per run. Always >= 1.
    pub max_concurrency: usize,
    pub execution_mode: ExecutionMode,
    pub resolver: ResolverCommand,
    /// Wall-clock limit for one measurement attempt.
    pub task_timeout: Duration,
    /// Proxy handed through to the rank resolver.
    pub proxy_url: Option<String>,
    pub run_migrations: bool,
    pub log_format: LogFormat,
}

impl OrchestratorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                           |
    /// |-----------------------------|-----------------------------------|
    /// | `DATABASE_URL`              | required                          |
    /// | `DB_MAX_CONNECTIONS`        | `10`                              |
    /// | `GEOGRID_LOCK_PATH`         | `<tmp>/geogrid-orchestrator.lock` |
    /// | `GEOGRID_MAX_CONCURRENCY`   | `1`                               |
    /// | `GEOGRID_EXECUTION_MODE`    | `pool` (or `sequential`)          |
    /// | `RANK_RESOLVER_CMD`         | required                          |
    /// | `GEOGRID_TASK_TIMEOUT_SECS` | `300`                             |
    /// | `GEOGRID_PROXY_URL`         | unset                             |
    /// | `GEOGRID_RUN_MIGRATIONS`    | `false`                           |
    /// | `LOG_FORMAT`                | `text` (or `json`)                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let resolver = match var("RANK_RESOLVER_CMD") {
            Some(line) => ResolverCommand::parse(&line).ok_or(ConfigError::Missing("RANK_RESOLVER_CMD"))?,
            None => return Err(ConfigError::Missing("RANK_RESOLVER_CMD")),
        };

        let db_max_connections: u32 = parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 10)?;
        let max_concurrency: usize =
            parse_or("GEOGRID_MAX_CONCURRENCY", var("GEOGRID_MAX_CONCURRENCY"), 1)?;
        let timeout_secs: u64 =
            parse_or("GEOGRID_TASK_TIMEOUT_SECS", var("GEOGRID_TASK_TIMEOUT_SECS"), 300)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "GEOGRID_TASK_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be at least 1 second",
            });
        }

        let execution_mode = match var("GEOGRID_EXECUTION_MODE").as_deref() {
            None | Some("pool") => ExecutionMode::Pool,
            Some("sequential") => ExecutionMode::Sequential,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "GEOGRID_EXECUTION_MODE",
                    value: other.to_string(),
                    reason: "expected `pool` or `sequential`",
                })
            }
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected `text` or `json`",
                })
            }
        };

        let run_migrations = match var("GEOGRID_RUN_MIGRATIONS").as_deref() {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "GEOGRID_RUN_MIGRATIONS",
                    value: other.to_string(),
                    reason: "expected a boolean",
                })
            }
        };

        let lock_path = var("GEOGRID_LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOCK_FILE));

        Ok(Self {
            database_url,
            db_max_connections: db_max_connections.max(1),
            lock_path,
            max_concurrency: max_concurrency.max(1),
            execution_mode,
            resolver,
            task_timeout: Duration::from_secs(timeout_secs),
            proxy_url: var("GEOGRID_PROXY_URL"),
            run_migrations,
            log_format,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value,
            reason: "expected a non-negative integer",
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
