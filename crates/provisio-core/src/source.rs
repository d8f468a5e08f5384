//! Where a manifest comes from.

use provisio_schema::ManifestFile;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Manifest file name inside an input directory.
pub const INPUT_DIR_MANIFEST: &str = "target.yaml";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("manifest {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("kustomize overlay {} does not exist", .0.display())]
    OverlayNotFound(PathBuf),
    #[error("cannot run {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
    #[error("kustomize build {} failed: {stderr}", .overlay.display())]
    Kustomize { overlay: PathBuf, stderr: String },
    #[error("failed to write built manifest: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    File(PathBuf),
    /// Directory holding `target.yaml` and, optionally, credential files.
    InputDir(PathBuf),
    Kustomize { dir: PathBuf, overlay: String },
}

impl ManifestSource {
    /// Credential files are discovered next to the manifest only for input
    /// directories.
    pub fn input_dir(&self) -> Option<&Path> {
        match self {
            Self::InputDir(dir) => Some(dir),
            _ => None,
        }
    }

    /// Produce a manifest file on disk. Overlays are built into a temp file
    /// under `temp_dir`.
    pub fn materialize(&self, kustomize: &Path, temp_dir: &Path) -> Result<ManifestFile, SourceError> {
        match self {
            Self::File(path) => existing(path),
            Self::InputDir(dir) => existing(&dir.join(INPUT_DIR_MANIFEST)),
            Self::Kustomize { dir, overlay } => {
                let overlay_dir = dir.join("overlays").join(overlay);
                if !overlay_dir.is_dir() {
                    return Err(SourceError::OverlayNotFound(overlay_dir));
                }
                build_overlay(kustomize, &overlay_dir, temp_dir)
            }
        }
    }
}

fn existing(path: &Path) -> Result<ManifestFile, SourceError> {
    if path.is_file() {
        Ok(ManifestFile::original(path))
    } else {
        Err(SourceError::NotFound(path.to_path_buf()))
    }
}

fn build_overlay(kustomize: &Path, overlay: &Path, temp_dir: &Path) -> Result<ManifestFile, SourceError> {
    tracing::debug!("kustomize build {}", overlay.display());
    let output = Command::new(kustomize)
        .arg("build")
        .arg(overlay)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| SourceError::Spawn {
            binary: kustomize.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(SourceError::Kustomize {
            overlay: overlay.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    std::fs::create_dir_all(temp_dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("kustomize-")
        .suffix(".yaml")
        .tempfile_in(temp_dir)?;
    file.write_all(&output.stdout)?;
    file.flush()?;
    Ok(ManifestFile::temporary(file.into_temp_path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_dir_reads_target_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let source = ManifestSource::InputDir(dir.path().to_path_buf());
        assert!(matches!(
            source.materialize(Path::new("kustomize"), dir.path()),
            Err(SourceError::NotFound(p)) if p.ends_with(INPUT_DIR_MANIFEST)
        ));
        std::fs::write(dir.path().join(INPUT_DIR_MANIFEST), "kind: AwsVpc\n").unwrap();
        let file = source.materialize(Path::new("kustomize"), dir.path()).unwrap();
        assert!(!file.is_temp());
        assert_eq!(file.path(), dir.path().join(INPUT_DIR_MANIFEST));
        assert_eq!(source.input_dir(), Some(dir.path()));
    }

    #[test]
    fn missing_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let source = ManifestSource::Kustomize {
            dir: dir.path().to_path_buf(),
            overlay: "prod".to_owned(),
        };
        assert!(matches!(
            source.materialize(Path::new("kustomize"), dir.path()),
            Err(SourceError::OverlayNotFound(_))
        ));
        assert!(source.input_dir().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn overlay_output_lands_in_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("overlays").join("dev");
        std::fs::create_dir_all(&overlay).unwrap();
        let fake = dir.path().join("kustomize");
        std::fs::write(&fake, "#!/bin/sh\necho \"kind: AwsVpc\"\necho \"# $2\"\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = ManifestSource::Kustomize {
            dir: dir.path().to_path_buf(),
            overlay: "dev".to_owned(),
        };
        let tmp = dir.path().join("tmp");
        let file = source.materialize(&fake, &tmp).unwrap();
        assert!(file.is_temp());
        let built = std::fs::read_to_string(file.path()).unwrap();
        assert!(built.starts_with("kind: AwsVpc\n"));
        assert!(built.contains("overlays/dev"));
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }
}
