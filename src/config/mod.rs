pub mod memory;
pub mod plancake;
pub mod preflight;

pub use memory::MemorySize;

use crate::error::{PmError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Signals accepted as `stop_signal`
pub const VALID_STOP_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
];

/// One supervised process record of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Supervision handle, unique within a manifest
    pub name: String,

    /// Executable to launch: absolute, relative to `cwd`, or looked up on PATH
    pub script: PathBuf,

    /// Argument string passed to the executable
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: String,

    /// Working directory; relative paths resolve against the manifest directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Environment overrides merged over the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Number of concurrent copies to run
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Whether to relaunch the process after it exits for any reason
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Resident-memory ceiling; exceeding it restarts the process
    #[serde(default)]
    pub max_memory_restart: Option<MemorySize>,

    /// Maximum number of automatic restarts within the restart window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Delay before the first automatic restart (in seconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    /// Signal to send on stop
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,

    /// Timeout before force kill (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// dotenv file the process reads on its own, consulted by preflight
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    /// Variables that must be set for the process to boot
    #[serde(default)]
    pub required_env: Vec<String>,
}

fn default_instances() -> usize {
    1
}

fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> usize {
    10
}

fn default_restart_delay() -> u64 {
    1
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

/// Accept `args` either as one string or as a list of arguments
fn deserialize_args<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ArgsRepr {
        Line(String),
        List(Vec<String>),
    }

    Ok(match ArgsRepr::deserialize(deserializer)? {
        ArgsRepr::Line(line) => line,
        ArgsRepr::List(items) => join_args(&items),
    })
}

/// Join arguments into one string that `split_args` turns back into `items`
pub fn join_args(items: &[String]) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_empty() || item.chars().any(|c| c.is_whitespace() || c == '"') {
                if item.contains('\'') {
                    format!("\"{}\"", item)
                } else {
                    format!("'{}'", item)
                }
            } else {
                item.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split an argument string on whitespace, keeping quoted runs together
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }

    args
}

impl ProcessSpec {
    /// Create a record with every optional field at its default
    pub fn new(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            args: String::new(),
            cwd: None,
            env: HashMap::new(),
            instances: default_instances(),
            autorestart: default_autorestart(),
            max_memory_restart: None,
            max_restarts: default_max_restarts(),
            restart_delay_secs: default_restart_delay(),
            stop_signal: default_stop_signal(),
            stop_timeout_secs: default_stop_timeout(),
            env_file: None,
            required_env: Vec::new(),
        }
    }

    /// Validate a single record
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PmError::MissingConfigField("name".to_string()));
        }

        if self.script.as_os_str().is_empty() {
            return Err(PmError::MissingConfigField(format!(
                "script (process '{}')",
                self.name
            )));
        }

        if self.instances == 0 {
            return Err(PmError::ConfigValidationError(format!(
                "{}: instances must be at least 1",
                self.name
            )));
        }

        if self.instances > 100 {
            return Err(PmError::ConfigValidationError(format!(
                "{}: instances cannot exceed 100",
                self.name
            )));
        }

        if self.max_restarts == 0 {
            return Err(PmError::ConfigValidationError(format!(
                "{}: max_restarts must be at least 1",
                self.name
            )));
        }

        if !VALID_STOP_SIGNALS.contains(&self.stop_signal.as_str()) {
            return Err(PmError::ConfigValidationError(format!(
                "{}: invalid stop_signal {}. Must be one of: {}",
                self.name,
                self.stop_signal,
                VALID_STOP_SIGNALS.join(", ")
            )));
        }

        if let Some(limit) = self.max_memory_restart {
            if limit.is_zero() {
                return Err(PmError::ConfigValidationError(format!(
                    "{}: max_memory_restart must be greater than zero",
                    self.name
                )));
            }
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.exists() {
                return Err(PmError::ConfigValidationError(format!(
                    "{}: working directory does not exist: {}",
                    self.name,
                    cwd.display()
                )));
            }
            if !cwd.is_dir() {
                return Err(PmError::ConfigValidationError(format!(
                    "{}: working directory is not a directory: {}",
                    self.name,
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    /// Arguments split into an argv vector
    pub fn argv(&self) -> Vec<String> {
        split_args(&self.args)
    }

    /// Script and arguments as one line, for display
    pub fn command_line(&self) -> String {
        if self.args.trim().is_empty() {
            self.script.display().to_string()
        } else {
            format!("{} {}", self.script.display(), self.args.trim())
        }
    }

    /// Names of the processes this record expands to
    pub fn instance_names(&self) -> Vec<String> {
        if self.instances <= 1 {
            vec![self.name.clone()]
        } else {
            (0..self.instances)
                .map(|i| format!("{}-{}", self.name, i))
                .collect()
        }
    }

    /// Resolve relative `cwd` and `env_file` against `base`
    fn resolve_paths(&mut self, base: &Path) {
        self.cwd = Some(match self.cwd.take() {
            Some(cwd) if cwd.is_relative() => base.join(cwd),
            Some(cwd) => cwd,
            None => base.to_path_buf(),
        });

        if let Some(env_file) = self.env_file.take() {
            self.env_file = Some(if env_file.is_relative() {
                base.join(env_file)
            } else {
                env_file
            });
        }
    }

    /// Expand environment variables in configuration fields
    fn expand_env_vars(&mut self) {
        self.script = expand_env_in_path(&self.script);

        if let Some(ref cwd) = self.cwd {
            self.cwd = Some(expand_env_in_path(cwd));
        }

        self.args = expand_env_in_string(&self.args);

        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Expand `$VAR` and `${VAR}` from the current environment
fn expand_env_in_string(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

/// Expand variable references using `lookup`.
///
/// A bare `$NAME` runs to the end of the identifier. Unset variables and
/// unterminated `${` are left as written.
fn expand_with<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after.find(|c: char| !is_ident(c)).unwrap_or(after.len());
            (&after[..end], end)
        };

        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => result.push_str(&value),
            None => {
                result.push('$');
                result.push_str(&after[..consumed]);
            }
        }

        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}

/// Supervisor settings carried by the manifest's optional `[supervisor]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// How often processes are checked (milliseconds)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Directory for captured process output
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Where the running supervisor publishes its status snapshot
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// PID file of the running supervisor
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Size in bytes after which a log file is rotated
    #[serde(default = "default_max_log_size")]
    pub max_log_size: MemorySize,
}

fn default_check_interval_ms() -> u64 {
    500
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/plancake-pm/logs")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/tmp/plancake-pm/state.json")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/plancake-pm/supervisor.pid")
}

fn default_max_log_size() -> MemorySize {
    MemorySize::from_megabytes(10)
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            log_dir: default_log_dir(),
            state_file: default_state_file(),
            pid_file: default_pid_file(),
            max_log_size: default_max_log_size(),
        }
    }
}

impl SupervisorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

/// The full set of process records consumed by the supervisor
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub processes: Vec<ProcessSpec>,
    pub supervisor: SupervisorSettings,
    /// Directory relative paths were resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Deserialize)]
struct ManifestFile {
    #[serde(default, alias = "apps")]
    processes: Vec<ProcessSpec>,
    #[serde(default)]
    supervisor: SupervisorSettings,
    #[serde(flatten)]
    single: Option<ProcessSpec>,
}

impl Manifest {
    /// Load a manifest file (TOML or JSON), resolve paths and validate it
    pub fn from_file(path: &Path) -> Result<Manifest> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PmError::ConfigError(format!(
                "Failed to read manifest {}: {}",
                path.display(),
                e
            ))
        })?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let manifest = match extension {
            "toml" => Self::from_toml_str(&contents, &base_dir)?,
            "json" => Self::from_json_str(&contents, &base_dir)?,
            _ => {
                return Err(PmError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        tracing::debug!(
            "Loaded manifest {} with {} process(es)",
            path.display(),
            manifest.processes.len()
        );

        Ok(manifest)
    }

    /// Parse and validate a TOML manifest
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Manifest> {
        let file: ManifestFile = toml::from_str(contents)
            .map_err(|e| PmError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?;
        Self::build(file, base_dir)
    }

    /// Parse and validate a JSON manifest
    pub fn from_json_str(contents: &str, base_dir: &Path) -> Result<Manifest> {
        let file: ManifestFile = serde_json::from_str(contents)
            .map_err(|e| PmError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?;
        Self::build(file, base_dir)
    }

    fn build(file: ManifestFile, base_dir: &Path) -> Result<Manifest> {
        let processes = if !file.processes.is_empty() {
            file.processes
        } else if let Some(single) = file.single {
            vec![single]
        } else {
            return Err(PmError::InvalidConfig(
                "No process configuration found in file".to_string(),
            ));
        };

        let processes = processes
            .into_iter()
            .map(|mut spec| {
                spec.expand_env_vars();
                spec.resolve_paths(base_dir);
                spec
            })
            .collect();

        let mut supervisor = file.supervisor;
        for path in [
            &mut supervisor.log_dir,
            &mut supervisor.state_file,
            &mut supervisor.pid_file,
        ] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }

        let manifest = Manifest {
            processes,
            supervisor,
            base_dir: base_dir.to_path_buf(),
        };

        manifest.validate()?;

        Ok(manifest)
    }

    /// Validate every record and the uniqueness of names
    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            return Err(PmError::InvalidConfig(
                "Manifest declares no processes".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.processes {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(PmError::DuplicateProcessName(spec.name.clone()));
            }
        }

        // Expanded instance names must not collide with another record either
        let mut instance_names = HashSet::new();
        for spec in &self.processes {
            for name in spec.instance_names() {
                if !instance_names.insert(name.clone()) {
                    return Err(PmError::DuplicateProcessName(name));
                }
            }
        }

        Ok(())
    }

    /// Record names in manifest order
    pub fn names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Look up a record by name
    pub fn get(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.name == name)
    }

    /// Keep only the named records; errors on an unknown name
    pub fn select(&self, names: &[String]) -> Result<Vec<ProcessSpec>> {
        if names.is_empty() {
            return Ok(self.processes.clone());
        }

        names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| PmError::ProcessNotFound(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_process_spec_defaults() {
        let spec = ProcessSpec::new("test", "/bin/echo");

        assert_eq!(spec.instances, 1);
        assert!(spec.autorestart);
        assert_eq!(spec.max_restarts, 10);
        assert_eq!(spec.restart_delay_secs, 1);
        assert_eq!(spec.stop_signal, "SIGTERM");
        assert_eq!(spec.stop_timeout_secs, 10);
        assert!(spec.max_memory_restart.is_none());
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_validate_valid_spec() {
        assert!(ProcessSpec::new("test", "/bin/echo").validate().is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let spec = ProcessSpec::new("", "/bin/echo");
        assert!(matches!(
            spec.validate(),
            Err(PmError::MissingConfigField(_))
        ));
    }

    #[test]
    fn test_validate_zero_instances() {
        let mut spec = ProcessSpec::new("test", "/bin/echo");
        spec.instances = 0;
        assert!(matches!(
            spec.validate(),
            Err(PmError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_invalid_signal() {
        let mut spec = ProcessSpec::new("test", "/bin/echo");
        spec.stop_signal = "INVALID".to_string();
        assert!(matches!(
            spec.validate(),
            Err(PmError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_missing_cwd() {
        let mut spec = ProcessSpec::new("test", "/bin/echo");
        spec.cwd = Some(PathBuf::from("/nonexistent/plancake/dir"));
        assert!(matches!(
            spec.validate(),
            Err(PmError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_memory_limit() {
        let mut spec = ProcessSpec::new("test", "/bin/echo");
        spec.max_memory_restart = Some(MemorySize::from_bytes(0));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args("-A api worker --loglevel=info"),
            vec!["-A", "api", "worker", "--loglevel=info"]
        );
        assert_eq!(
            split_args(r#"-c "echo hello world"  'x y'"#),
            vec!["-c", "echo hello world", "x y"]
        );
        assert_eq!(split_args(r#"--name """#), vec!["--name", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_join_args_round_trips_through_split() {
        let items = vec![
            "-c".to_string(),
            "echo hello".to_string(),
            "say \"hi\"".to_string(),
        ];
        assert_eq!(split_args(&join_args(&items)), items);
    }

    #[test]
    fn test_instance_names() {
        let mut spec = ProcessSpec::new("web", "/bin/echo");
        assert_eq!(spec.instance_names(), vec!["web"]);

        spec.instances = 3;
        assert_eq!(spec.instance_names(), vec!["web-0", "web-1", "web-2"]);
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("PLANCAKE_TEST_VAR", "test_value");
        std::env::set_var("PLANCAKE_TEST_PATH", "/tmp");

        let mut spec = ProcessSpec::new("test", "$PLANCAKE_TEST_PATH/script.sh");
        spec.args = "--arg=${PLANCAKE_TEST_VAR}".to_string();
        spec.cwd = Some(PathBuf::from("${PLANCAKE_TEST_PATH}"));
        spec.env
            .insert("KEY".to_string(), "$PLANCAKE_TEST_VAR".to_string());

        spec.expand_env_vars();

        assert_eq!(spec.script, PathBuf::from("/tmp/script.sh"));
        assert_eq!(spec.args, "--arg=test_value");
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.env.get("KEY"), Some(&"test_value".to_string()));
    }

    #[test]
    fn test_expand_stops_at_identifier_boundary() {
        let lookup = |name: &str| match name {
            "HOME" => Some("/home/plancake".to_string()),
            "PORT" => Some("3000".to_string()),
            _ => None,
        };

        assert_eq!(expand_with("$HOMEX/bin", lookup), "$HOMEX/bin");
        assert_eq!(expand_with("$HOME/bin", lookup), "/home/plancake/bin");
        assert_eq!(expand_with("${HOME}X", lookup), "/home/plancakeX");
        assert_eq!(expand_with("--port=$PORT.", lookup), "--port=3000.");
        assert_eq!(expand_with("${MISSING} $ ${HOME", lookup), "${MISSING} $ ${HOME");
        assert_eq!(expand_with("cost: 5$", lookup), "cost: 5$");
    }

    #[test]
    fn test_parse_toml_multiple() {
        let temp_dir = TempDir::new().unwrap();
        let toml_content = r#"
            [[processes]]
            name = "app1"
            script = "/usr/bin/node"
            args = "server.js"
            max_memory_restart = "150M"

            [[processes]]
            name = "app2"
            script = "/usr/bin/python"
            args = ["worker.py", "--queue", "default"]
        "#;

        let manifest = Manifest::from_toml_str(toml_content, temp_dir.path()).unwrap();
        assert_eq!(manifest.names(), vec!["app1", "app2"]);

        let app1 = manifest.get("app1").unwrap();
        assert_eq!(app1.max_memory_restart, Some(MemorySize::from_megabytes(150)));
        assert_eq!(app1.cwd.as_deref(), Some(temp_dir.path()));

        let app2 = manifest.get("app2").unwrap();
        assert_eq!(app2.args, "worker.py --queue default");
        assert_eq!(app2.argv(), vec!["worker.py", "--queue", "default"]);
    }

    #[test]
    fn test_parse_toml_single_record() {
        let temp_dir = TempDir::new().unwrap();
        let toml_content = r#"
            name = "my-app"
            script = "/usr/bin/node"
            args = "server.js"
            instances = 2
        "#;

        let manifest = Manifest::from_toml_str(toml_content, temp_dir.path()).unwrap();
        assert_eq!(manifest.processes.len(), 1);
        assert_eq!(manifest.processes[0].name, "my-app");
        assert_eq!(manifest.processes[0].instances, 2);
    }

    #[test]
    fn test_parse_json_apps_alias() {
        let temp_dir = TempDir::new().unwrap();
        let json_content = r#"
            {
                "apps": [
                    {
                        "name": "site",
                        "script": "npm",
                        "args": "start",
                        "env": { "NODE_ENV": "production", "PORT": "3000" },
                        "max_memory_restart": "300M"
                    },
                    {
                        "name": "api",
                        "script": "/usr/bin/python3",
                        "args": "manage.py runserver",
                        "autorestart": false
                    }
                ]
            }
        "#;

        let manifest = Manifest::from_json_str(json_content, temp_dir.path()).unwrap();
        assert_eq!(manifest.names(), vec!["site", "api"]);
        assert_eq!(
            manifest.get("site").unwrap().env.get("PORT"),
            Some(&"3000".to_string())
        );
        assert!(!manifest.get("api").unwrap().autorestart);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let toml_content = r#"
            [[processes]]
            name = "dup"
            script = "/bin/echo"

            [[processes]]
            name = "dup"
            script = "/bin/true"
        "#;

        let result = Manifest::from_toml_str(toml_content, temp_dir.path());
        assert!(matches!(result, Err(PmError::DuplicateProcessName(name)) if name == "dup"));
    }

    #[test]
    fn test_instance_name_collision_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let toml_content = r#"
            [[processes]]
            name = "web"
            script = "/bin/echo"
            instances = 2

            [[processes]]
            name = "web-1"
            script = "/bin/echo"
        "#;

        let result = Manifest::from_toml_str(toml_content, temp_dir.path());
        assert!(matches!(result, Err(PmError::DuplicateProcessName(_))));
    }

    #[test]
    fn test_relative_cwd_resolves_against_base() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("backend")).unwrap();

        let toml_content = r#"
            [[processes]]
            name = "api"
            script = "/bin/echo"
            cwd = "backend"
            env_file = "backend/.env"
        "#;

        let manifest = Manifest::from_toml_str(toml_content, temp_dir.path()).unwrap();
        let api = manifest.get("api").unwrap();
        assert_eq!(api.cwd, Some(temp_dir.path().join("backend")));
        assert_eq!(api.env_file, Some(temp_dir.path().join("backend/.env")));
    }

    #[test]
    fn test_supervisor_table() {
        let temp_dir = TempDir::new().unwrap();
        let toml_content = r#"
            [supervisor]
            check_interval_ms = 250
            log_dir = "logs"
            max_log_size = "1M"

            [[processes]]
            name = "api"
            script = "/bin/echo"
        "#;

        let manifest = Manifest::from_toml_str(toml_content, temp_dir.path()).unwrap();
        assert_eq!(manifest.supervisor.check_interval_ms, 250);
        assert_eq!(manifest.supervisor.log_dir, temp_dir.path().join("logs"));
        assert_eq!(manifest.supervisor.max_log_size, MemorySize::from_megabytes(1));
        assert_eq!(
            manifest.supervisor.state_file,
            PathBuf::from("/tmp/plancake-pm/state.json")
        );
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = Manifest::from_toml_str("", temp_dir.path());
        assert!(matches!(result, Err(PmError::InvalidConfig(_))));
    }

    #[test]
    fn test_select_unknown_name() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = Manifest::from_toml_str(
            "name = \"api\"\nscript = \"/bin/echo\"\n",
            temp_dir.path(),
        )
        .unwrap();

        assert_eq!(manifest.select(&[]).unwrap().len(), 1);
        assert!(matches!(
            manifest.select(&["nope".to_string()]),
            Err(PmError::ProcessNotFound(_))
        ));
    }

    #[test]
    fn test_from_file_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ecosystem.yaml");
        fs::write(&config_path, "name: test").unwrap();

        let result = Manifest::from_file(&config_path);
        assert!(matches!(result, Err(PmError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ecosystem.toml");
        fs::write(
            &config_path,
            "name = \"test-app\"\nscript = \"/bin/echo\"\nargs = \"hello\"\n",
        )
        .unwrap();

        let manifest = Manifest::from_file(&config_path).unwrap();
        assert_eq!(manifest.names(), vec!["test-app"]);
        assert_eq!(manifest.base_dir, temp_dir.path());
    }
}
