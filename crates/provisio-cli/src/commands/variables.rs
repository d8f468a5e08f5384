use super::{core_err, input_err, prepare, ManifestArgs, EXIT_SUCCESS};
use provisio_core::Engine;

/// Print the Tofu variable declarations for a kind, named directly or taken
/// from a manifest.
pub fn run(engine: &Engine, kind: Option<&str>, args: &ManifestArgs) -> Result<u8, String> {
    let doc = match kind {
        Some(name) => {
            let kind = engine.catalog().get(name).map_err(input_err)?;
            engine.variables(kind)
        }
        None if args.is_given() => {
            let prepared = prepare(engine, args, true)?;
            engine.variables(&prepared.kind)
        }
        None => return Err(input_err("pass --kind or a manifest")),
    }
    .map_err(|e| core_err(&e))?;
    print!("{doc}");
    Ok(EXIT_SUCCESS)
}
