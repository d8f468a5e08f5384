use super::{json_pretty, prepare, ManifestArgs, EXIT_SUCCESS};
use provisio_core::Engine;

pub fn run(engine: &Engine, args: &ManifestArgs, json: bool) -> Result<u8, String> {
    let prepared = prepare(engine, args, json)?;
    if json {
        let payload = serde_json::json!({
            "valid": true,
            "kind": prepared.kind.kind,
            "provider": prepared.kind.provider,
            "name": prepared.name(),
            "defaults_applied": prepared.defaults_applied,
        });
        println!("{}", json_pretty(&payload)?);
    } else if prepared.defaults_applied > 0 {
        eprintln!("{} default value(s) filled in", prepared.defaults_applied);
    }
    Ok(EXIT_SUCCESS)
}
