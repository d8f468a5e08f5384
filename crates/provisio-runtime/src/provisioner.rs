use crate::operation::Operation;
use crate::process::{Invocation, IoMode};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which external engine drives a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    Pulumi,
    Tofu,
    Terraform,
}

impl ProvisionerKind {
    pub const ALL: [ProvisionerKind; 3] = [
        ProvisionerKind::Pulumi,
        ProvisionerKind::Tofu,
        ProvisionerKind::Terraform,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisionerKind::Pulumi => "pulumi",
            ProvisionerKind::Tofu => "tofu",
            ProvisionerKind::Terraform => "terraform",
        }
    }

    pub fn default_binary(self) -> &'static str {
        self.as_str()
    }

    /// Tofu and Terraform consume the same module layout and inputs.
    pub fn is_declarative(self) -> bool {
        !matches!(self, ProvisionerKind::Pulumi)
    }

    /// Directory under the provisio home that namespaces this engine.
    pub fn home_namespace(self) -> &'static str {
        if self.is_declarative() {
            "tofu"
        } else {
            "pulumi"
        }
    }
}

impl fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulumi" => Ok(ProvisionerKind::Pulumi),
            "tofu" | "opentofu" => Ok(ProvisionerKind::Tofu),
            "terraform" => Ok(ProvisionerKind::Terraform),
            other => Err(format!(
                "unknown provisioner '{other}' (expected pulumi, tofu or terraform)"
            )),
        }
    }
}

/// Compiled input handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// Stack Input Document as YAML.
    StackInput(String),
    /// tfvars value document.
    Tfvars(String),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pulumi stack FQDN (`org/project/stack`).
    pub stack: Option<String>,
    pub auto_approve: bool,
    pub force: bool,
    /// Plan a destroy instead of an update.
    pub destroy_plan: bool,
    pub diff: bool,
    pub io_mode: IoMode,
    /// `key=value` pairs passed to `init -backend-config`.
    pub backend_config: Vec<String>,
    /// Extra environment for every engine process.
    pub env: Vec<(String, String)>,
}

pub trait Provisioner {
    fn kind(&self) -> ProvisionerKind;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn binary(&self) -> &Path;

    /// Module subdirectory under `<provider>/<kind>/` for this engine.
    fn engine_subdir(&self) -> &'static str;

    /// Whether `dir` already holds a module this engine can run.
    fn is_module_dir(&self, dir: &Path) -> bool;

    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    /// Write whatever the engine expects on disk before it runs.
    fn prepare(
        &self,
        _module_dir: &Path,
        _input: &EngineInput,
        _options: &RunOptions,
    ) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Process invocations for `operation`, in execution order.
    fn invocations(
        &self,
        module_dir: &Path,
        operation: Operation,
        input: &EngineInput,
        options: &RunOptions,
    ) -> Result<Vec<Invocation>, RuntimeError>;
}

pub fn select_provisioner(
    kind: ProvisionerKind,
    binary: Option<&Path>,
) -> Box<dyn Provisioner> {
    let binary = binary.map_or_else(|| PathBuf::from(kind.default_binary()), Path::to_path_buf);
    match kind {
        ProvisionerKind::Pulumi => Box::new(crate::pulumi::PulumiProvisioner::new(binary)),
        ProvisionerKind::Tofu | ProvisionerKind::Terraform => {
            Box::new(crate::tofu::TofuProvisioner::new(kind, binary))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kinds() {
        assert_eq!("Pulumi".parse::<ProvisionerKind>(), Ok(ProvisionerKind::Pulumi));
        assert_eq!("opentofu".parse::<ProvisionerKind>(), Ok(ProvisionerKind::Tofu));
        assert_eq!(
            "terraform".parse::<ProvisionerKind>(),
            Ok(ProvisionerKind::Terraform)
        );
        assert!("ansible".parse::<ProvisionerKind>().is_err());
    }

    #[test]
    fn terraform_shares_the_tofu_namespace() {
        assert_eq!(ProvisionerKind::Terraform.home_namespace(), "tofu");
        assert_eq!(ProvisionerKind::Pulumi.home_namespace(), "pulumi");
    }

    #[test]
    fn select_uses_default_binaries() {
        for kind in ProvisionerKind::ALL {
            let p = select_provisioner(kind, None);
            assert_eq!(p.kind(), kind);
            assert_eq!(p.binary(), Path::new(kind.default_binary()));
        }
        let p = select_provisioner(ProvisionerKind::Tofu, Some(Path::new("/opt/bin/tofu")));
        assert_eq!(p.binary(), Path::new("/opt/bin/tofu"));
    }
}
