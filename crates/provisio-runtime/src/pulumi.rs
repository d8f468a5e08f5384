use crate::operation::Operation;
use crate::process::{Invocation, IoMode};
use crate::provisioner::{EngineInput, Provisioner, ProvisionerKind, RunOptions};
use crate::RuntimeError;
use provisio_schema::StackFqdn;
use std::path::{Path, PathBuf};

/// Environment variable carrying the Stack Input Document.
pub const STACK_INPUT_ENV: &str = "STACK_INPUT_YAML";
const PROJECT_FILE: &str = "Pulumi.yaml";

pub struct PulumiProvisioner {
    binary: PathBuf,
}

impl PulumiProvisioner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn stack(options: &RunOptions) -> Result<StackFqdn, RuntimeError> {
        let stack = options
            .stack
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RuntimeError::MissingStack)?;
        let fqdn = StackFqdn::new(stack);
        if stack.contains('/') && fqdn.parts().is_none() {
            return Err(RuntimeError::InvalidStack(stack.to_owned()));
        }
        Ok(fqdn)
    }
}

impl Provisioner for PulumiProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Pulumi
    }

    fn binary(&self) -> &Path {
        &self.binary
    }

    fn engine_subdir(&self) -> &'static str {
        "iac/pulumi"
    }

    fn is_module_dir(&self, dir: &Path) -> bool {
        dir.join(PROJECT_FILE).is_file()
    }

    /// Point the module's project name at the stack's project.
    fn prepare(
        &self,
        module_dir: &Path,
        _input: &EngineInput,
        options: &RunOptions,
    ) -> Result<(), RuntimeError> {
        let stack = Self::stack(options)?;
        let Some(project) = stack.project() else {
            return Ok(());
        };
        let path = module_dir.join(PROJECT_FILE);
        if !path.is_file() {
            tracing::debug!("no {PROJECT_FILE} in {}", module_dir.display());
            return Ok(());
        }
        let content = std::fs::read_to_string(&path)?;
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|source| RuntimeError::ProjectFile {
                path: path.clone(),
                source,
            })?;
        let Some(map) = doc.as_mapping_mut() else {
            return Ok(());
        };
        if map.get("name").and_then(serde_yaml::Value::as_str) == Some(project) {
            return Ok(());
        }
        map.insert("name".into(), project.into());
        let rendered = serde_yaml::to_string(&doc).map_err(|source| RuntimeError::ProjectFile {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, rendered)?;
        tracing::debug!("set project name in {} to {project}", path.display());
        Ok(())
    }

    fn invocations(
        &self,
        module_dir: &Path,
        operation: Operation,
        input: &EngineInput,
        options: &RunOptions,
    ) -> Result<Vec<Invocation>, RuntimeError> {
        let EngineInput::StackInput(stack_input) = input else {
            return Err(RuntimeError::InputMismatch(self.name().to_owned()));
        };
        let stack = Self::stack(options)?;
        let captured = options.io_mode == IoMode::Captured;
        let yes: &[&str] = if options.auto_approve {
            &["--yes", "--skip-preview"]
        } else {
            &[]
        };

        let mut inv = Invocation::new(&self.binary, module_dir);
        inv = match operation {
            Operation::Init => inv.args(["stack", "select", stack.as_str(), "--create"]),
            Operation::Plan => {
                let inv = if options.destroy_plan {
                    inv.args(["destroy", "--preview-only"])
                } else {
                    inv.arg("preview")
                };
                inv.args(["--stack", stack.as_str()])
            }
            Operation::Apply => inv.args(["up", "--stack", stack.as_str()]).args(yes.iter().copied()),
            Operation::Destroy => inv
                .args(["destroy", "--stack", stack.as_str()])
                .args(yes.iter().copied()),
            Operation::Refresh => inv
                .args(["refresh", "--stack", stack.as_str()])
                .args(yes.iter().copied()),
            Operation::Cancel => inv.args(["cancel", "--stack", stack.as_str(), "--yes"]),
            Operation::Remove => {
                let inv = inv.args(["stack", "rm", stack.as_str(), "--yes"]);
                if options.force {
                    inv.arg("--force")
                } else {
                    inv
                }
            }
        };
        if options.diff && matches!(operation, Operation::Plan | Operation::Apply) {
            inv = inv.arg("--diff");
        }
        if captured {
            inv = inv.arg("--non-interactive");
            if matches!(operation, Operation::Plan) {
                inv = inv.arg("--json");
            }
        }
        inv = inv.env(STACK_INPUT_ENV, stack_input.as_str());
        for (k, v) in &options.env {
            inv = inv.env(k.as_str(), v.as_str());
        }
        Ok(vec![inv])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(stack: &str) -> RunOptions {
        RunOptions {
            stack: Some(stack.to_owned()),
            ..RunOptions::default()
        }
    }

    fn args(op: Operation, options: &RunOptions) -> Vec<String> {
        let p = PulumiProvisioner::new("pulumi");
        let input = EngineInput::StackInput("target: {}\n".to_owned());
        let mut invs = p.invocations(Path::new("/m"), op, &input, options).unwrap();
        assert_eq!(invs.len(), 1);
        invs.remove(0).args
    }

    #[test]
    fn operations_map_to_pulumi_verbs() {
        let o = opts("acme/net/prod");
        assert_eq!(args(Operation::Init, &o), ["stack", "select", "acme/net/prod", "--create"]);
        assert_eq!(args(Operation::Plan, &o), ["preview", "--stack", "acme/net/prod"]);
        assert_eq!(args(Operation::Apply, &o), ["up", "--stack", "acme/net/prod"]);
        assert_eq!(args(Operation::Cancel, &o), ["cancel", "--stack", "acme/net/prod", "--yes"]);
        assert_eq!(args(Operation::Remove, &o), ["stack", "rm", "acme/net/prod", "--yes"]);
    }

    #[test]
    fn auto_approve_skips_preview() {
        let o = RunOptions {
            auto_approve: true,
            ..opts("dev")
        };
        assert_eq!(
            args(Operation::Apply, &o),
            ["up", "--stack", "dev", "--yes", "--skip-preview"]
        );
        assert_eq!(
            args(Operation::Destroy, &o),
            ["destroy", "--stack", "dev", "--yes", "--skip-preview"]
        );
    }

    #[test]
    fn destroy_plan_and_captured_mode() {
        let o = RunOptions {
            destroy_plan: true,
            diff: true,
            io_mode: IoMode::Captured,
            ..opts("dev")
        };
        assert_eq!(
            args(Operation::Plan, &o),
            [
                "destroy",
                "--preview-only",
                "--stack",
                "dev",
                "--diff",
                "--non-interactive",
                "--json"
            ]
        );
    }

    #[test]
    fn force_remove() {
        let o = RunOptions {
            force: true,
            ..opts("dev")
        };
        assert_eq!(args(Operation::Remove, &o), ["stack", "rm", "dev", "--yes", "--force"]);
    }

    #[test]
    fn stack_input_travels_in_env() {
        let p = PulumiProvisioner::new("pulumi");
        let input = EngineInput::StackInput("target:\n  spec: {}\n".to_owned());
        let o = RunOptions {
            env: vec![("PULUMI_CONFIG_PASSPHRASE".to_owned(), "x".to_owned())],
            ..opts("dev")
        };
        let invs = p.invocations(Path::new("/m"), Operation::Apply, &input, &o).unwrap();
        assert_eq!(
            invs[0].env,
            [
                (STACK_INPUT_ENV.to_owned(), "target:\n  spec: {}\n".to_owned()),
                ("PULUMI_CONFIG_PASSPHRASE".to_owned(), "x".to_owned())
            ]
        );
    }

    #[test]
    fn stack_is_required() {
        let p = PulumiProvisioner::new("pulumi");
        let input = EngineInput::StackInput(String::new());
        assert!(matches!(
            p.invocations(Path::new("/m"), Operation::Plan, &input, &RunOptions::default()),
            Err(RuntimeError::MissingStack)
        ));
        assert!(matches!(
            p.invocations(Path::new("/m"), Operation::Plan, &input, &opts("a//c")),
            Err(RuntimeError::InvalidStack(_))
        ));
    }

    #[test]
    fn tfvars_input_is_rejected() {
        let p = PulumiProvisioner::new("pulumi");
        let input = EngineInput::Tfvars(String::new());
        assert!(matches!(
            p.invocations(Path::new("/m"), Operation::Plan, &input, &opts("dev")),
            Err(RuntimeError::InputMismatch(_))
        ));
    }

    #[test]
    fn prepare_rewrites_project_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Pulumi.yaml"),
            "name: awsvpc\nruntime: go\ndescription: vpc module\n",
        )
        .unwrap();
        let p = PulumiProvisioner::new("pulumi");
        assert!(p.is_module_dir(dir.path()));
        p.prepare(
            dir.path(),
            &EngineInput::StackInput(String::new()),
            &opts("acme/network/prod"),
        )
        .unwrap();
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(dir.path().join("Pulumi.yaml")).unwrap())
                .unwrap();
        assert_eq!(doc["name"], serde_yaml::Value::from("network"));
        assert_eq!(doc["runtime"], serde_yaml::Value::from("go"));
    }

    #[test]
    fn prepare_leaves_bare_stack_alone() {
        let dir = tempfile::tempdir().unwrap();
        let original = "name: awsvpc\nruntime: go\n";
        std::fs::write(dir.path().join("Pulumi.yaml"), original).unwrap();
        let p = PulumiProvisioner::new("pulumi");
        p.prepare(dir.path(), &EngineInput::StackInput(String::new()), &opts("dev"))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Pulumi.yaml")).unwrap(),
            original
        );
    }
}
