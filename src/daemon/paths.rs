//! Project layout and runtime artifact paths
//!
//! ```text
//! <root>/.claude/
//!   hooks-daemon.toml              project config
//!   hooks-daemon/untracked/
//!     daemon[-<env|host>].sock     IPC socket
//!     daemon[-<env|host>].pid      PID file
//!     daemon[-<env|host>].log      daemon log
//!     audit.jsonl, workflow-state.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::DaemonConfig;

use super::environment;
use super::lifecycle::LifecycleError;

/// Directory that marks a project root
pub const MARKER_DIR: &str = ".claude";
pub const CONFIG_FILE: &str = "hooks-daemon.toml";
const INSTALL_DIR: &str = "hooks-daemon";
const STATE_DIR: &str = "untracked";

/// Unix socket paths are limited to ~108 bytes; stay well below
pub const MAX_SOCKET_PATH_LEN: usize = 100;

pub const ENV_PROJECT_ROOT: &str = "HOOKS_DAEMON_PROJECT_ROOT";
pub const ENV_SOCKET_PATH: &str = "HOOKS_DAEMON_SOCKET_PATH";
pub const ENV_PID_PATH: &str = "HOOKS_DAEMON_PID_PATH";
pub const ENV_LOG_PATH: &str = "HOOKS_DAEMON_LOG_PATH";
pub const ENV_DISCRIMINATOR: &str = "HOOKS_DAEMON_ENV";

/// Well-known locations inside a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn claude_dir(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.claude_dir().join(CONFIG_FILE)
    }

    pub fn install_dir(&self) -> PathBuf {
        self.claude_dir().join(INSTALL_DIR)
    }

    /// Daemon-owned files that are never committed
    pub fn state_dir(&self) -> PathBuf {
        self.install_dir().join(STATE_DIR)
    }
}

/// Pick the project root: explicit path, then the environment, then the
/// nearest ancestor of `cwd` holding a `.claude` directory
pub fn resolve_project_root(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, LifecycleError> {
    let env_root = env::var_os(ENV_PROJECT_ROOT)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let root = match explicit.map(Path::to_path_buf).or(env_root) {
        Some(root) => {
            let root = if root.is_absolute() { root } else { cwd.join(root) };
            if !root.is_dir() {
                return Err(LifecycleError::NoProjectRoot(root));
            }
            root
        }
        None => find_project_root(cwd).ok_or_else(|| LifecycleError::NoProjectRoot(cwd.to_path_buf()))?,
    };
    Ok(root.canonicalize().unwrap_or(root))
}

/// Nearest ancestor (inclusive) containing the marker directory
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MARKER_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Refuse roots that sit inside another installation
pub fn check_nested_install(root: &Path) -> Result<(), LifecycleError> {
    let enclosing = root.ancestors().find(|dir| {
        dir.file_name().is_some_and(|name| name == MARKER_DIR) && dir.join(INSTALL_DIR).is_dir()
    });
    if let Some(marker) = enclosing {
        return Err(LifecycleError::NestedInstall {
            root: root.to_path_buf(),
            reason: format!("the project root lies inside {}, which holds an installation", marker.display()),
        });
    }
    let inner = ProjectLayout::new(root.to_path_buf())
        .install_dir()
        .join(MARKER_DIR);
    if inner.exists() {
        return Err(LifecycleError::NestedInstall {
            root: root.to_path_buf(),
            reason: format!("{} exists; remove the nested installation", inner.display()),
        });
    }
    Ok(())
}

/// Environment-level artifact overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactOverrides {
    pub socket_path: Option<PathBuf>,
    pub pid_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub discriminator: Option<String>,
    /// Fallback discriminator when none is set explicitly
    pub hostname: Option<String>,
}

impl ArtifactOverrides {
    pub fn from_env() -> Self {
        let path = |key| env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            socket_path: path(ENV_SOCKET_PATH),
            pid_path: path(ENV_PID_PATH),
            log_path: path(ENV_LOG_PATH),
            discriminator: env::var(ENV_DISCRIMINATOR).ok().filter(|v| !v.is_empty()),
            hostname: environment::hostname(),
        }
    }
}

/// Resolved socket, PID file and log locations
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RuntimeArtifacts {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
    pub discriminator: Option<String>,
}

impl RuntimeArtifacts {
    /// Precedence per artifact: environment, then config, then a name under
    /// the project state directory namespaced by `HOOKS_DAEMON_ENV` or, failing
    /// that, the hostname. The bare `daemon.*` name is used only when neither
    /// is known.
    pub fn resolve(layout: &ProjectLayout, config: &DaemonConfig, overrides: &ArtifactOverrides) -> Self {
        let discriminator = overrides
            .discriminator
            .as_deref()
            .or(overrides.hostname.as_deref())
            .map(sanitize)
            .filter(|d| !d.is_empty());
        let stem = match &discriminator {
            Some(d) => format!("daemon-{}", d),
            None => "daemon".to_string(),
        };
        let state_dir = layout.state_dir();
        let pick = |env: &Option<PathBuf>, cfg: &Option<PathBuf>, ext: &str| {
            env.clone()
                .or_else(|| cfg.clone())
                .map(|p| if p.is_absolute() { p } else { layout.root().join(p) })
                .unwrap_or_else(|| state_dir.join(format!("{}.{}", stem, ext)))
        };

        Self {
            socket_path: shorten_socket_path(pick(&overrides.socket_path, &config.socket_path, "sock")),
            pid_path: pick(&overrides.pid_path, &config.pid_path, "pid"),
            log_path: pick(&overrides.log_path, &config.log_path, "log"),
            discriminator,
        }
    }

    /// Create the directories the artifacts live in
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for path in [&self.socket_path, &self.pid_path, &self.log_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn sanitize(discriminator: &str) -> String {
    discriminator
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Replace an over-long socket path with a short hashed one in the runtime dir
pub fn shorten_socket_path(path: PathBuf) -> PathBuf {
    if path.as_os_str().len() <= MAX_SOCKET_PATH_LEN {
        return path;
    }
    let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
    let name: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    let base = directories::BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .filter(|dir| dir.as_os_str().len() + 40 <= MAX_SOCKET_PATH_LEN)
        .unwrap_or_else(env::temp_dir);
    let short = base.join(format!("hooks-daemon-{}.sock", name));
    debug!("Socket path {} too long, using {}", path.display(), short.display());
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_project_root_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".claude")).unwrap();
        let deep = tmp.path().join("src/a/b");
        fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_project_root(&deep).as_deref(), Some(tmp.path()));
    }

    #[test]
    fn test_explicit_root_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let root = resolve_project_root(Some(tmp.path()), Path::new("/")).unwrap();
        assert_eq!(root, tmp.path().canonicalize().unwrap());

        let missing = tmp.path().join("nope");
        assert!(matches!(
            resolve_project_root(Some(&missing), Path::new("/")),
            Err(LifecycleError::NoProjectRoot(_))
        ));
    }

    #[test]
    fn test_nested_install_detection() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(check_nested_install(tmp.path()).is_ok());

        let inside = tmp.path().join(".claude/hooks-daemon");
        fs::create_dir_all(&inside).unwrap();
        assert!(matches!(
            check_nested_install(&inside),
            Err(LifecycleError::NestedInstall { .. })
        ));

        fs::create_dir_all(tmp.path().join(".claude/hooks-daemon/.claude")).unwrap();
        let err = check_nested_install(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("nested"));
    }

    #[test]
    fn test_project_under_foreign_marker_dir_is_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join(".claude/projects/notes");
        fs::create_dir_all(project.join(".claude")).unwrap();
        assert!(check_nested_install(&project).is_ok());

        fs::create_dir_all(tmp.path().join(".claude/hooks-daemon")).unwrap();
        assert!(matches!(
            check_nested_install(&project),
            Err(LifecycleError::NestedInstall { .. })
        ));
    }

    #[test]
    fn test_artifact_precedence() {
        let layout = ProjectLayout::new(PathBuf::from("/p"));
        let mut config = DaemonConfig::default();
        let state = PathBuf::from("/p/.claude/hooks-daemon/untracked");

        // Nothing known: bare default
        let defaults = RuntimeArtifacts::resolve(&layout, &config, &ArtifactOverrides::default());
        assert_eq!(defaults.socket_path, state.join("daemon.sock"));
        assert_eq!(defaults.pid_path, state.join("daemon.pid"));
        assert_eq!(defaults.discriminator, None);

        // Hostname namespaces the defaults
        let host = ArtifactOverrides {
            hostname: Some("build.box-7".into()),
            ..Default::default()
        };
        let by_host = RuntimeArtifacts::resolve(&layout, &config, &host);
        assert_eq!(by_host.socket_path, state.join("daemon-build_box-7.sock"));
        assert_eq!(by_host.pid_path, state.join("daemon-build_box-7.pid"));
        assert_eq!(by_host.discriminator.as_deref(), Some("build_box-7"));

        // An explicit discriminator beats the hostname
        let overrides = ArtifactOverrides {
            discriminator: Some("ci/job 1".into()),
            ..host
        };
        let derived = RuntimeArtifacts::resolve(&layout, &config, &overrides);
        assert_eq!(derived.log_path, state.join("daemon-ci_job_1.log"));

        // Explicit paths beat both, environment over config
        config.pid_path = Some(PathBuf::from("run/d.pid"));
        config.socket_path = Some(PathBuf::from("/cfg.sock"));
        let overrides = ArtifactOverrides {
            socket_path: Some(PathBuf::from("/env.sock")),
            ..overrides
        };
        let explicit = RuntimeArtifacts::resolve(&layout, &config, &overrides);
        assert_eq!(explicit.socket_path, PathBuf::from("/env.sock"));
        assert_eq!(explicit.pid_path, PathBuf::from("/p/run/d.pid"));
        assert_eq!(explicit.log_path, state.join("daemon-ci_job_1.log"));
    }

    #[test]
    fn test_environments_sharing_a_checkout_get_distinct_artifacts() {
        let layout = ProjectLayout::new(PathBuf::from("/shared"));
        let config = DaemonConfig::default();
        let resolve = |host: &str| {
            let overrides = ArtifactOverrides {
                hostname: Some(host.into()),
                ..Default::default()
            };
            RuntimeArtifacts::resolve(&layout, &config, &overrides)
        };
        let a = resolve("laptop");
        let b = resolve("3f2a9c1d7e4b");
        assert_ne!(a.socket_path, b.socket_path);
        assert_ne!(a.pid_path, b.pid_path);
    }

    #[test]
    fn test_long_socket_path_is_shortened() {
        let long = PathBuf::from(format!("/{}/daemon.sock", "x".repeat(150)));
        let short = shorten_socket_path(long.clone());
        assert!(short.as_os_str().len() <= MAX_SOCKET_PATH_LEN);
        assert_eq!(short, shorten_socket_path(long));
        let name = short.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("hooks-daemon-"));
    }
}
