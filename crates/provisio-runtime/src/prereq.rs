use crate::provisioner::ProvisionerKind;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Whether `binary` can be executed: an existing file when it is a path,
/// otherwise a hit on `PATH`.
pub fn binary_available(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    Command::new("which")
        .arg(binary)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn engine_hint(kind: ProvisionerKind) -> &'static str {
    match kind {
        ProvisionerKind::Pulumi => "curl -fsSL https://get.pulumi.com | sh",
        ProvisionerKind::Tofu => "brew install opentofu | see https://opentofu.org/docs/intro/install/",
        ProvisionerKind::Terraform => {
            "brew install terraform | see https://developer.hashicorp.com/terraform/install"
        }
    }
}

/// Binaries one run needs.
pub struct PrereqRequest<'a> {
    pub engine: Option<(ProvisionerKind, &'a Path)>,
    /// Needed unless the module directory is already local.
    pub git: Option<&'a Path>,
    /// Needed for kustomize overlay manifests.
    pub kustomize: Option<&'a Path>,
}

/// Returns the missing items; empty means everything is present.
pub fn check_prereqs(request: &PrereqRequest<'_>) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if let Some((kind, binary)) = request.engine {
        if !binary_available(binary) {
            missing.push(MissingPrereq {
                name: binary.display().to_string(),
                purpose: if kind.is_declarative() {
                    "running declarative engine modules"
                } else {
                    "running Pulumi modules"
                },
                install_hint: engine_hint(kind),
            });
        }
    }

    if let Some(git) = request.git {
        if !binary_available(git) {
            missing.push(MissingPrereq {
                name: git.display().to_string(),
                purpose: "cloning the module repository",
                install_hint: "zypper install git | apt install git | dnf install git | brew install git",
            });
        }
    }

    if let Some(kustomize) = request.kustomize {
        if !binary_available(kustomize) {
            missing.push(MissingPrereq {
                name: kustomize.display().to_string(),
                purpose: "building manifests from kustomize overlays",
                install_hint: "brew install kustomize | see https://kubectl.docs.kubernetes.io/installation/kustomize/",
            });
        }
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nSet PROVISIO_SKIP_PREREQS=1 to bypass this check.");
    msg
}
