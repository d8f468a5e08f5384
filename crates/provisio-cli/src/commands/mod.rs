pub mod completions;
pub mod doctor;
pub mod man_pages;
pub mod run;
pub mod tfvars;
pub mod validate;
pub mod variables;

use indicatif::{ProgressBar, ProgressStyle};
use provisio_core::{
    CoreError, CredentialPaths, Engine, ErrorCategory, ManifestRequest, ManifestSource,
    PreparedManifest,
};
use provisio_runtime::ProvisionerKind;
use provisio_schema::{Override, Provider};
use std::io::{stderr, stdin, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_RESOLUTION_ERROR: u8 = 3;
pub const EXIT_ENGINE_ERROR: u8 = 4;

const INPUT_PREFIX: &str = "invalid input: ";
const RESOLUTION_PREFIX: &str = "module resolution: ";
const ENGINE_PREFIX: &str = "engine: ";

pub const BIN_NAME: &str = "provisio";
pub const SKIP_PREREQS_ENV: &str = "PROVISIO_SKIP_PREREQS";

/// Render a core error for the operator, prefixed with its category so
/// `exit_code_for` can recover the exit code.
pub fn core_err(e: &CoreError) -> String {
    let prefix = match e.category() {
        ErrorCategory::Input => INPUT_PREFIX,
        ErrorCategory::Resolution => RESOLUTION_PREFIX,
        ErrorCategory::Engine => ENGINE_PREFIX,
        ErrorCategory::Other => "",
    };
    format!("{prefix}{e}")
}

pub fn input_err(msg: impl std::fmt::Display) -> String {
    format!("{INPUT_PREFIX}{msg}")
}

pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with(INPUT_PREFIX) {
        EXIT_INPUT_ERROR
    } else if msg.starts_with(RESOLUTION_PREFIX) {
        EXIT_RESOLUTION_ERROR
    } else if msg.starts_with(ENGINE_PREFIX) {
        EXIT_ENGINE_ERROR
    } else {
        EXIT_FAILURE
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn styled(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        styled("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(styled("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(styled("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn is_interactive() -> bool {
    stdin().is_terminal() && stderr().is_terminal()
}

/// Where the manifest comes from, as given on the command line.
#[derive(Debug, Clone, clap::Args)]
pub struct ManifestArgs {
    /// Manifest file.
    #[arg(short = 'f', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,
    /// Directory holding target.yaml and <provider>-provider-config.yaml files.
    #[arg(long, value_name = "DIR", conflicts_with = "manifest")]
    pub input_dir: Option<PathBuf>,
    /// Kustomize base directory; the manifest is built from an overlay.
    #[arg(
        long,
        value_name = "DIR",
        requires = "overlay",
        conflicts_with_all = ["manifest", "input_dir"]
    )]
    pub kustomize_dir: Option<PathBuf>,
    /// Overlay under <kustomize-dir>/overlays.
    #[arg(long, requires = "kustomize_dir")]
    pub overlay: Option<String>,
    /// Override a manifest field (repeatable), e.g. --set spec.region=us-west-2.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub overrides: Vec<Override>,
}

impl ManifestArgs {
    pub fn source(&self) -> Result<ManifestSource, String> {
        match (&self.manifest, &self.input_dir, &self.kustomize_dir, &self.overlay) {
            (Some(path), _, _, _) => Ok(ManifestSource::File(path.clone())),
            (_, Some(dir), _, _) => Ok(ManifestSource::InputDir(dir.clone())),
            (_, _, Some(dir), Some(overlay)) => Ok(ManifestSource::Kustomize {
                dir: dir.clone(),
                overlay: overlay.clone(),
            }),
            _ => Err(format!(
                "{INPUT_PREFIX}no manifest given; use --manifest, --input-dir or --kustomize-dir with --overlay"
            )),
        }
    }

    pub fn is_given(&self) -> bool {
        self.manifest.is_some() || self.input_dir.is_some() || self.kustomize_dir.is_some()
    }

    pub fn request(&self) -> Result<ManifestRequest, String> {
        Ok(ManifestRequest {
            source: self.source()?,
            overrides: self.overrides.clone(),
        })
    }
}

/// Credential file flags, one per provider.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CredentialArgs {
    #[arg(long, value_name = "FILE")]
    pub atlas_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub auth0_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub aws_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub azure_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub cloudflare_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub confluent_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub gcp_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub kubernetes_provider_config: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub snowflake_provider_config: Option<PathBuf>,
}

impl CredentialArgs {
    pub fn paths(&self) -> CredentialPaths {
        let mut paths = CredentialPaths::default();
        let flags = [
            (Provider::Atlas, &self.atlas_provider_config),
            (Provider::Auth0, &self.auth0_provider_config),
            (Provider::Aws, &self.aws_provider_config),
            (Provider::Azure, &self.azure_provider_config),
            (Provider::Cloudflare, &self.cloudflare_provider_config),
            (Provider::Confluent, &self.confluent_provider_config),
            (Provider::Gcp, &self.gcp_provider_config),
            (Provider::Kubernetes, &self.kubernetes_provider_config),
            (Provider::Snowflake, &self.snowflake_provider_config),
        ];
        for (provider, path) in flags {
            if let Some(path) = path {
                paths.insert(provider, path);
            }
        }
        paths
    }
}

/// Load, override, default and validate, with a spinner unless `json`.
pub fn prepare(
    engine: &Engine,
    args: &ManifestArgs,
    json: bool,
) -> Result<PreparedManifest, String> {
    let request = args.request()?;
    let pb = (!json).then(|| spinner("validating manifest..."));
    match engine.prepare(request) {
        Ok(prepared) => {
            if let Some(pb) = &pb {
                spin_ok(
                    pb,
                    &format!(
                        "{} {} is valid",
                        prepared.kind.kind,
                        prepared.name().unwrap_or("<unnamed>")
                    ),
                );
            }
            Ok(prepared)
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "manifest rejected");
            }
            Err(core_err(&e))
        }
    }
}

/// Flag, then manifest label, then an interactive prompt.
pub fn choose_provisioner(
    engine: &Engine,
    prepared: &PreparedManifest,
    flag: Option<ProvisionerKind>,
) -> Result<ProvisionerKind, String> {
    if let Some(kind) = engine
        .provisioner_kind(prepared, flag)
        .map_err(|e| core_err(&e))?
    {
        return Ok(kind);
    }
    if !is_interactive() {
        return Err(format!(
            "{INPUT_PREFIX}no provisioner selected; pass --provisioner or set the {} label",
            provisio_core::labels::PROVISIONER_LABEL
        ));
    }
    let names: Vec<&str> = ProvisionerKind::ALL.iter().map(|k| k.as_str()).collect();
    let idx = dialoguer::Select::new()
        .with_prompt("provisioner")
        .items(&names)
        .default(0)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    Ok(ProvisionerKind::ALL[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::{LabelError, ResolveError};

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_INPUT_ERROR,
            EXIT_RESOLUTION_ERROR,
            EXIT_ENGINE_ERROR,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn error_prefix_maps_back_to_exit_code() {
        let input = core_err(&CoreError::Label(LabelError::BackendIncomplete));
        assert_eq!(exit_code_for(&input), EXIT_INPUT_ERROR);
        let resolve = core_err(&CoreError::Resolve(ResolveError::NoRepository));
        assert_eq!(exit_code_for(&resolve), EXIT_RESOLUTION_ERROR);
        let engine = core_err(&CoreError::Runtime(
            provisio_runtime::RuntimeError::EngineFailed {
                command: "tofu plan".to_owned(),
                dir: PathBuf::from("/m"),
                code: Some(1),
            },
        ));
        assert_eq!(exit_code_for(&engine), EXIT_ENGINE_ERROR);
        assert_eq!(exit_code_for("config error: bad"), EXIT_FAILURE);
    }

    #[test]
    fn manifest_source_required() {
        let args = ManifestArgs {
            manifest: None,
            input_dir: None,
            kustomize_dir: None,
            overlay: None,
            overrides: Vec::new(),
        };
        let err = args.source().unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_INPUT_ERROR);
        assert!(!args.is_given());
    }

    #[test]
    fn credential_flags_map_to_providers() {
        let args = CredentialArgs {
            aws_provider_config: Some(PathBuf::from("/c/aws.yaml")),
            kubernetes_provider_config: Some(PathBuf::from("/c/kube.yaml")),
            ..CredentialArgs::default()
        };
        let paths = args.paths();
        assert_eq!(
            paths.get(Provider::Aws),
            Some(std::path::Path::new("/c/aws.yaml"))
        );
        assert!(paths.get(Provider::Kubernetes).is_some());
        assert!(paths.get(Provider::Gcp).is_none());
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
