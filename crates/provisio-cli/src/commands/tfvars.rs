use super::{core_err, prepare, ManifestArgs, EXIT_SUCCESS};
use provisio_core::Engine;
use std::path::Path;

/// Print (or write to `output`) the tfvars document a Tofu run would use.
pub fn run(engine: &Engine, args: &ManifestArgs, output: Option<&Path>) -> Result<u8, String> {
    // Spinner output would interleave with the document on a terminal.
    let prepared = prepare(engine, args, true)?;
    let doc = engine.tfvars(&prepared).map_err(|e| core_err(&e))?;
    match output {
        Some(path) => {
            std::fs::write(path, &doc)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            eprintln!("tfvars written to {}", path.display());
        }
        None => print!("{doc}"),
    }
    Ok(EXIT_SUCCESS)
}
