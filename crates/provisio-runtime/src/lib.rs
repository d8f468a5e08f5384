//! Engine adapters and process orchestration for provisio.
//!
//! This crate is the execution layer: the `Provisioner` trait with Pulumi and
//! OpenTofu/Terraform implementations that turn an `Operation` into concrete
//! process invocations, the `process` module that spawns them with an explicit
//! `IoMode`, and prerequisite checks for the external binaries.

pub mod operation;
pub mod prereq;
pub mod process;
pub mod provisioner;
pub mod pulumi;
pub mod tofu;

pub use operation::Operation;
pub use prereq::{binary_available, check_prereqs, format_missing, MissingPrereq, PrereqRequest};
pub use process::{execute, run, EngineOutput, Invocation, IoMode};
pub use provisioner::{
    select_provisioner, EngineInput, Provisioner, ProvisionerKind, RunOptions,
};
pub use pulumi::{PulumiProvisioner, STACK_INPUT_ENV};
pub use tofu::{TofuProvisioner, TFVARS_FILE};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine binary '{0}' not found; install it or point provisio at it in the config file")]
    BinaryNotFound(String),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed in {}: {}", .dir.display(), describe_exit(.code))]
    EngineFailed {
        command: String,
        dir: PathBuf,
        code: Option<i32>,
    },
    #[error("{engine} does not support the '{operation}' operation")]
    UnsupportedOperation { engine: String, operation: String },
    #[error("engine input does not match the {0} engine")]
    InputMismatch(String),
    #[error("a Pulumi stack is required; pass --stack or set the pulumi.project-planton.org/stack.fqdn label")]
    MissingStack,
    #[error("invalid Pulumi stack '{0}': expected <organization>/<project>/<stack>")]
    InvalidStack(String),
    #[error("failed to update {}: {source}", .path.display())]
    ProjectFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

impl RuntimeError {
    /// Exit code reported by the engine, if the engine ran and failed.
    pub fn engine_exit_code(&self) -> Option<i32> {
        match self {
            RuntimeError::EngineFailed { code, .. } => *code,
            _ => None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_names_command_dir_and_code() {
        let e = RuntimeError::EngineFailed {
            command: "tofu apply -auto-approve".to_owned(),
            dir: PathBuf::from("/m/aws/awsvpc/iac/tf"),
            code: Some(1),
        };
        assert_eq!(
            e.to_string(),
            "`tofu apply -auto-approve` failed in /m/aws/awsvpc/iac/tf: exited with code 1"
        );
        assert_eq!(e.engine_exit_code(), Some(1));
    }

    #[test]
    fn signal_exit_display() {
        let e = RuntimeError::EngineFailed {
            command: "pulumi up".to_owned(),
            dir: PathBuf::from("/m"),
            code: None,
        };
        assert!(e.to_string().ends_with("terminated by signal"));
    }
}
