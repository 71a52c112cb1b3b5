//! Appliance Configuration
//!
//! Environment-specific defaults (volume group, thin pool, DRBD resource,
//! parent interface, export roots) are read once at startup from two
//! optional YAML files and frozen into an [`ArcaConfig`] that every
//! component receives through its constructor.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default location of the bootstrap (install-time) configuration
pub const DEFAULT_BOOTSTRAP_CONFIG_PATH: &str = "/etc/arca-storage/storage-bootstrap.yaml";

/// Default location of the runtime (operator-tunable) configuration
pub const DEFAULT_RUNTIME_CONFIG_PATH: &str = "/etc/arca-storage/storage-runtime.yaml";

// =============================================================================
// NFS Protocol Set
// =============================================================================

/// Normalized set of enabled NFS major versions
///
/// Only v3 and v4 are recognized; v4 is always enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsProtocols(Vec<u8>);

impl NfsProtocols {
    /// Parse a comma separated list such as `"3,4"`, dropping unknown tokens
    pub fn parse(raw: &str) -> Self {
        let mut versions: Vec<u8> = raw
            .split(',')
            .filter_map(|t| t.trim().parse::<u8>().ok())
            .filter(|v| matches!(v, 3 | 4))
            .collect();
        if !versions.contains(&4) {
            versions.push(4);
        }
        versions.sort_unstable();
        versions.dedup();
        Self(versions)
    }

    /// Whether NFSv3 (and with it MOUNT/NLM) is enabled
    pub fn v3_enabled(&self) -> bool {
        self.0.contains(&3)
    }

    pub fn versions(&self) -> &[u8] {
        &self.0
    }

    /// Rendered as `"3, 4"` to match ganesha.conf conventions
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for NfsProtocols {
    fn default() -> Self {
        Self(vec![4])
    }
}

// =============================================================================
// On-disk Sections
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BootstrapFile {
    vg_name: Option<String>,
    thinpool_name: Option<String>,
    parent_if: Option<String>,
    drbd_resource: Option<String>,
    pacemaker_ra_vendor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuntimeFile {
    state_dir: Option<PathBuf>,
    export_dir: Option<String>,
    ganesha_config_dir: Option<PathBuf>,
    ganesha_protocols: Option<String>,
    ganesha_mountd_port: Option<u16>,
    ganesha_nlm_port: Option<u16>,
}

/// Both files share a top-level `storage:` key
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document<T: Default> {
    storage: T,
}

// =============================================================================
// Configuration
// =============================================================================

/// Immutable appliance configuration
#[derive(Debug, Clone)]
pub struct ArcaConfig {
    /// Directory holding the state collections, export lists and config snapshots
    pub state_dir: PathBuf,
    /// Root under which volumes are mounted and exported (`<export_dir>/<svm>/<volume>`)
    pub export_dir: String,
    /// Directory receiving the live `ganesha.<svm>.conf` documents
    pub ganesha_config_dir: PathBuf,
    /// Enabled NFS versions
    pub ganesha_protocols: NfsProtocols,
    /// MOUNT protocol port (NFSv3 only)
    pub ganesha_mountd_port: u16,
    /// Lock manager port (NFSv3 only)
    pub ganesha_nlm_port: u16,
    /// Volume group hosting every logical volume
    pub vg_name: String,
    /// Thin pool inside `vg_name`
    pub thinpool_name: String,
    /// Parent interface for VLAN sub-interfaces
    pub parent_if: String,
    /// DRBD resource replicating the volume group
    pub drbd_resource: String,
    /// OCF vendor providing the NetnsVlan resource agent
    pub pacemaker_ra_vendor: String,
}

impl Default for ArcaConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/arca"),
            export_dir: "/exports".to_string(),
            ganesha_config_dir: PathBuf::from("/etc/ganesha"),
            ganesha_protocols: NfsProtocols::default(),
            ganesha_mountd_port: 20048,
            ganesha_nlm_port: 32768,
            vg_name: "vg_pool_01".to_string(),
            thinpool_name: "pool".to_string(),
            parent_if: "bond0".to_string(),
            drbd_resource: "r0".to_string(),
            pacemaker_ra_vendor: "local".to_string(),
        }
    }
}

impl ArcaConfig {
    /// Load configuration from the bootstrap and runtime files
    ///
    /// Missing files are not an error; defaults are used instead.
    pub fn load(bootstrap_path: &Path, runtime_path: &Path) -> Result<Self> {
        let bootstrap: Document<BootstrapFile> = read_yaml(bootstrap_path)?;
        let runtime: Document<RuntimeFile> = read_yaml(runtime_path)?;
        let (bootstrap, runtime) = (bootstrap.storage, runtime.storage);

        let defaults = Self::default();
        let state_dir = resolve_state_dir(
            std::env::var_os("ARCA_STATE_DIR").map(PathBuf::from),
            runtime.state_dir,
        );

        let config = Self {
            state_dir,
            export_dir: runtime
                .export_dir
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or(defaults.export_dir),
            ganesha_config_dir: runtime
                .ganesha_config_dir
                .unwrap_or(defaults.ganesha_config_dir),
            ganesha_protocols: runtime
                .ganesha_protocols
                .map(|p| NfsProtocols::parse(&p))
                .unwrap_or_default(),
            ganesha_mountd_port: runtime
                .ganesha_mountd_port
                .unwrap_or(defaults.ganesha_mountd_port),
            ganesha_nlm_port: runtime.ganesha_nlm_port.unwrap_or(defaults.ganesha_nlm_port),
            vg_name: non_empty(bootstrap.vg_name).unwrap_or(defaults.vg_name),
            thinpool_name: non_empty(bootstrap.thinpool_name).unwrap_or(defaults.thinpool_name),
            parent_if: non_empty(bootstrap.parent_if).unwrap_or(defaults.parent_if),
            drbd_resource: non_empty(bootstrap.drbd_resource).unwrap_or(defaults.drbd_resource),
            pacemaker_ra_vendor: non_empty(bootstrap.pacemaker_ra_vendor)
                .unwrap_or(defaults.pacemaker_ra_vendor),
        };

        debug!(
            "Loaded configuration: state_dir={}, vg={}, parent_if={}",
            config.state_dir.display(),
            config.vg_name,
            config.parent_if
        );
        Ok(config)
    }

    /// Configuration rooted in a scratch directory (state and ganesha dirs below it)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            state_dir: root.join("state"),
            ganesha_config_dir: root.join("ganesha"),
            ..Self::default()
        }
    }

    /// Export root without a trailing slash
    pub fn export_root(&self) -> &str {
        let trimmed = self.export_dir.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }

    /// Mount/export path of a volume
    pub fn volume_path(&self, svm: &str, volume: &str) -> String {
        format!("{}/{}/{}", self.export_root(), svm, volume)
    }

    /// Mount path of an SVM's root volume
    pub fn svm_root_path(&self, svm: &str) -> String {
        format!("{}/{}", self.export_root(), svm)
    }

    /// Device path of a logical volume in the configured volume group
    pub fn lv_path(&self, lv_name: &str) -> String {
        format!("/dev/{}/{}", self.vg_name, lv_name)
    }

    /// Directory holding rendered export configuration snapshots
    pub fn config_snapshot_dir(&self) -> PathBuf {
        self.state_dir.join("config")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_yaml<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(T::default()),
        Ok(raw) => serde_yaml::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("{}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Config file {} not present, using defaults", path.display());
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the state directory
///
/// Priority: explicit override, configured value, `/var/lib/arca` when
/// writable, the XDG state directory, and finally `.arca-state`.
fn resolve_state_dir(env_override: Option<PathBuf>, configured: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    if let Some(dir) = configured.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }

    let mut candidates = vec![PathBuf::from("/var/lib/arca")];
    match std::env::var_os("XDG_STATE_HOME") {
        Some(xdg) => candidates.push(PathBuf::from(xdg).join("arca")),
        None => {
            if let Some(home) = std::env::var_os("HOME") {
                candidates.push(PathBuf::from(home).join(".local/state/arca"));
            }
        }
    }

    for candidate in candidates {
        if is_writable_dir(&candidate) {
            return candidate;
        }
    }

    warn!("No writable state directory found, falling back to .arca-state");
    PathBuf::from(".arca-state")
}

fn is_writable_dir(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".write_test");
    let ok = std::fs::write(&marker, b"ok").is_ok();
    let _ = std::fs::remove_file(&marker);
    ok
}
