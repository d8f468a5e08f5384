use crate::operation::Operation;
use crate::process::{Invocation, IoMode};
use crate::provisioner::{EngineInput, Provisioner, ProvisionerKind, RunOptions};
use crate::RuntimeError;
use std::path::{Path, PathBuf};

/// Var-file location, relative to the module directory.
pub const TFVARS_FILE: &str = ".terraform/provisio.tfvars";

/// OpenTofu, or Terraform driven through the same CLI surface.
pub struct TofuProvisioner {
    kind: ProvisionerKind,
    binary: PathBuf,
}

impl TofuProvisioner {
    pub fn new(kind: ProvisionerKind, binary: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            binary: binary.into(),
        }
    }

    fn init(&self, module_dir: &Path, options: &RunOptions) -> Invocation {
        let mut inv = Invocation::new(&self.binary, module_dir).arg("init");
        if options.io_mode == IoMode::Captured {
            inv = inv.arg("-input=false");
        }
        for pair in &options.backend_config {
            inv = inv.arg(format!("-backend-config={pair}"));
        }
        inv
    }
}

impl Provisioner for TofuProvisioner {
    fn kind(&self) -> ProvisionerKind {
        self.kind
    }

    fn binary(&self) -> &Path {
        &self.binary
    }

    fn engine_subdir(&self) -> &'static str {
        "iac/tf"
    }

    fn is_module_dir(&self, dir: &Path) -> bool {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        entries.filter_map(Result::ok).any(|e| {
            let path = e.path();
            path.extension().is_some_and(|ext| ext == "tf") && path.is_file()
        })
    }

    fn supports(&self, operation: Operation) -> bool {
        !matches!(operation, Operation::Cancel | Operation::Remove)
    }

    /// Materialize the value document as the module's var-file.
    fn prepare(
        &self,
        module_dir: &Path,
        input: &EngineInput,
        _options: &RunOptions,
    ) -> Result<(), RuntimeError> {
        let EngineInput::Tfvars(tfvars) = input else {
            return Err(RuntimeError::InputMismatch(self.name().to_owned()));
        };
        let path = module_dir.join(TFVARS_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, tfvars)?;
        tracing::debug!("wrote var-file {}", path.display());
        Ok(())
    }

    fn invocations(
        &self,
        module_dir: &Path,
        operation: Operation,
        input: &EngineInput,
        options: &RunOptions,
    ) -> Result<Vec<Invocation>, RuntimeError> {
        if !matches!(input, EngineInput::Tfvars(_)) {
            return Err(RuntimeError::InputMismatch(self.name().to_owned()));
        }
        let captured = options.io_mode == IoMode::Captured;
        let var_file = format!("-var-file={}", module_dir.join(TFVARS_FILE).display());
        let base = || Invocation::new(&self.binary, module_dir);

        let mut op = match operation {
            Operation::Init => None,
            Operation::Plan => {
                let mut inv = base().args(["plan", var_file.as_str()]);
                if options.destroy_plan {
                    inv = inv.arg("-destroy");
                }
                Some(inv)
            }
            Operation::Apply => Some(base().args(["apply", var_file.as_str()])),
            Operation::Destroy => Some(base().args(["destroy", var_file.as_str()])),
            Operation::Refresh => Some(base().args(["apply", "-refresh-only", var_file.as_str()])),
            Operation::Cancel | Operation::Remove => {
                return Err(RuntimeError::UnsupportedOperation {
                    engine: self.name().to_owned(),
                    operation: operation.as_str().to_owned(),
                })
            }
        };

        if let Some(inv) = op.as_mut() {
            if operation != Operation::Plan && options.auto_approve {
                inv.args.push("-auto-approve".to_owned());
            }
            if captured {
                inv.args.push("-input=false".to_owned());
                // -json on apply-style commands requires -auto-approve.
                if operation == Operation::Plan || options.auto_approve {
                    inv.args.push("-json".to_owned());
                }
            }
        }

        let mut invocations = vec![self.init(module_dir, options)];
        invocations.extend(op);
        for inv in &mut invocations {
            inv.env.extend(options.env.iter().cloned());
        }
        Ok(invocations)
    }
}
