//! User configuration (`~/.config/provisio/config.toml`).
//!
//! Every key is optional. Resolution order for each setting is command-line
//! flag, then environment, then this file, then the built-in default.

use provisio_runtime::ProvisionerKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "PROVISIO_CONFIG";
pub const HOME_ENV: &str = "PROVISIO_HOME";
const HOME_DIR_NAME: &str = ".provisio";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot determine the home directory; set PROVISIO_HOME or pass --home")]
    NoHomeDir,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisioConfig {
    /// Root for workspaces and the module clone cache.
    pub home: Option<PathBuf>,
    /// Git URL of the module repository.
    pub module_repo: Option<String>,
    pub pulumi_binary: Option<PathBuf>,
    pub tofu_binary: Option<PathBuf>,
    pub terraform_binary: Option<PathBuf>,
    pub git_binary: Option<PathBuf>,
    pub kustomize_binary: Option<PathBuf>,
    /// Extra kind catalog merged over the built-in one.
    pub catalog: Option<PathBuf>,
}

impl ProvisioConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config from `explicit`, `$PROVISIO_CONFIG`, or the default
    /// location. Only an explicitly named file has to exist.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(explicit, env.as_deref(), default_config_path().as_deref())
    }

    fn discover_from(
        explicit: Option<&Path>,
        env: Option<&Path>,
        default: Option<&Path>,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit.or(env) {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        match default {
            Some(path) if path.is_file() => Ok((Self::load(path)?, Some(path.to_path_buf()))),
            _ => Ok((Self::default(), None)),
        }
    }

    /// Workspace root: `flag`, then `$PROVISIO_HOME`, then `home`, then
    /// `~/.provisio`.
    pub fn resolve_home(&self, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let env = std::env::var_os(HOME_ENV).map(PathBuf::from);
        self.resolve_home_from(flag, env.as_deref(), dirs::home_dir().as_deref())
    }

    fn resolve_home_from(
        &self,
        flag: Option<&Path>,
        env: Option<&Path>,
        user_home: Option<&Path>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(path) = flag.or(env).or(self.home.as_deref()) {
            return Ok(path.to_path_buf());
        }
        user_home
            .map(|h| h.join(HOME_DIR_NAME))
            .ok_or(ConfigError::NoHomeDir)
    }

    pub fn binaries(&self) -> Binaries {
        let pick = |configured: &Option<PathBuf>, default: &str| {
            configured.clone().unwrap_or_else(|| PathBuf::from(default))
        };
        Binaries {
            pulumi: pick(&self.pulumi_binary, "pulumi"),
            tofu: pick(&self.tofu_binary, "tofu"),
            terraform: pick(&self.terraform_binary, "terraform"),
            git: pick(&self.git_binary, "git"),
            kustomize: pick(&self.kustomize_binary, "kustomize"),
        }
    }
}

/// Executables provisio shells out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    pub pulumi: PathBuf,
    pub tofu: PathBuf,
    pub terraform: PathBuf,
    pub git: PathBuf,
    pub kustomize: PathBuf,
}

impl Default for Binaries {
    fn default() -> Self {
        ProvisioConfig::default().binaries()
    }
}

impl Binaries {
    pub fn engine(&self, kind: ProvisionerKind) -> &Path {
        match kind {
            ProvisionerKind::Pulumi => &self.pulumi,
            ProvisionerKind::Tofu => &self.tofu,
            ProvisionerKind::Terraform => &self.terraform,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("provisio").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_loads_known_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "module_repo = \"https://git.example.com/modules.git\"\ntofu_binary = \"/opt/tofu/bin/tofu\"\n",
        )
        .unwrap();
        let config = ProvisioConfig {
            module_repo: Some("https://git.example.com/modules.git".to_owned()),
            tofu_binary: Some(PathBuf::from("/opt/tofu/bin/tofu")),
            ..ProvisioConfig::default()
        };
        assert_eq!(ProvisioConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "modul_repo = \"x\"\n").unwrap();
        let err = ProvisioConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(ProvisioConfig::discover_from(Some(missing.as_path()), None, None).is_err());
    }

    #[test]
    fn missing_default_config_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) =
            ProvisioConfig::discover_from(None, None, Some(dir.path().join("config.toml").as_path()))
                .unwrap();
        assert_eq!(config, ProvisioConfig::default());
        assert!(path.is_none());
    }

    #[test]
    fn env_config_beats_default() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("env.toml");
        let default = dir.path().join("default.toml");
        std::fs::write(&env, "git_binary = \"/env/git\"\n").unwrap();
        std::fs::write(&default, "git_binary = \"/default/git\"\n").unwrap();
        let (config, path) =
            ProvisioConfig::discover_from(None, Some(env.as_path()), Some(default.as_path())).unwrap();
        assert_eq!(config.binaries().git, PathBuf::from("/env/git"));
        assert_eq!(path.as_deref(), Some(env.as_path()));
    }

    #[test]
    fn home_precedence() {
        let config = ProvisioConfig {
            home: Some(PathBuf::from("/from/config")),
            ..ProvisioConfig::default()
        };
        let flag = Path::new("/from/flag");
        let env = Path::new("/from/env");
        let user = Path::new("/home/op");
        assert_eq!(
            config.resolve_home_from(Some(flag), Some(env), Some(user)).unwrap(),
            flag
        );
        assert_eq!(
            config.resolve_home_from(None, Some(env), Some(user)).unwrap(),
            env
        );
        assert_eq!(
            config.resolve_home_from(None, None, Some(user)).unwrap(),
            Path::new("/from/config")
        );
        assert_eq!(
            ProvisioConfig::default()
                .resolve_home_from(None, None, Some(user))
                .unwrap(),
            Path::new("/home/op/.provisio")
        );
        assert!(matches!(
            ProvisioConfig::default().resolve_home_from(None, None, None),
            Err(ConfigError::NoHomeDir)
        ));
    }

    #[test]
    fn default_binaries() {
        let b = Binaries::default();
        assert_eq!(b.engine(ProvisionerKind::Pulumi), Path::new("pulumi"));
        assert_eq!(b.engine(ProvisionerKind::Terraform), Path::new("terraform"));
        assert_eq!(b.kustomize, PathBuf::from("kustomize"));
    }
}
