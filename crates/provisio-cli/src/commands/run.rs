use super::{
    choose_provisioner, core_err, json_pretty, prepare, CredentialArgs, ManifestArgs,
    EXIT_SUCCESS, SKIP_PREREQS_ENV,
};
use provisio_core::{Engine, ManifestSource, RunOutcome, RunSpec};
use provisio_runtime::{
    check_prereqs, format_missing, IoMode, Operation, PrereqRequest, ProvisionerKind,
};
use std::path::PathBuf;

/// Arguments shared by every engine operation.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,
    /// Engine to run; defaults to the manifest's provisioner label.
    #[arg(long, value_name = "pulumi|tofu|terraform")]
    pub provisioner: Option<ProvisionerKind>,
    /// Pulumi stack as <organization>/<project>/<stack>.
    #[arg(long)]
    pub stack: Option<String>,
    /// Local module directory (or module repository checkout) to use instead
    /// of cloning the module repository.
    #[arg(long, value_name = "DIR")]
    pub module_dir: Option<PathBuf>,
    /// Git ref of the module repository to check out.
    #[arg(long, value_name = "REF")]
    pub module_version: Option<String>,
    /// Keep the workspace directory after the run.
    #[arg(long, default_value_t = false)]
    pub no_cleanup: bool,
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Per-operation switches on top of [`RunArgs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Switches {
    pub yes: bool,
    pub force: bool,
    pub destroy_plan: bool,
    pub diff: bool,
}

pub fn run(
    engine: &Engine,
    operation: Operation,
    args: &RunArgs,
    switches: Switches,
    json: bool,
) -> Result<u8, String> {
    let prepared = prepare(engine, &args.manifest, json)?;
    let kind = choose_provisioner(engine, &prepared, args.provisioner)?;

    if std::env::var(SKIP_PREREQS_ENV).as_deref() != Ok("1") {
        let missing = check_prereqs(&PrereqRequest {
            engine: Some((kind, engine.binaries().engine(kind))),
            git: args
                .module_dir
                .is_none()
                .then(|| engine.binaries().git.as_path()),
            kustomize: matches!(prepared.source, ManifestSource::Kustomize { .. })
                .then(|| engine.binaries().kustomize.as_path()),
        });
        if !missing.is_empty() {
            return Err(format_missing(&missing));
        }
    }

    let spec = RunSpec {
        stack: args.stack.clone(),
        module_dir: args.module_dir.clone(),
        module_version: args.module_version.clone(),
        credentials: args.credentials.paths(),
        auto_approve: switches.yes,
        force: switches.force,
        destroy_plan: switches.destroy_plan,
        diff: switches.diff,
        io_mode: if json {
            IoMode::Captured
        } else {
            IoMode::Interactive
        },
        no_cleanup: args.no_cleanup,
        ..RunSpec::new(operation)
    };

    if !json {
        eprintln!(
            "{} {} {} {}",
            console::style("▶").cyan().bold(),
            console::style(kind).bold(),
            operation,
            prepared.name().map_or_else(
                || prepared.kind.kind.to_string(),
                |name| format!("{}/{name}", prepared.kind.kind)
            ),
        );
    }

    let outcome = match engine.run(&prepared, kind, &spec) {
        Ok(outcome) => outcome,
        Err(e) => {
            if json {
                let payload = serde_json::json!({
                    "operation": operation.as_str(),
                    "provisioner": kind,
                    "status": "failed",
                    "error": e.to_string(),
                });
                println!("{}", json_pretty(&payload)?);
            }
            return Err(core_err(&e));
        }
    };

    report(operation, &outcome, json)?;
    Ok(EXIT_SUCCESS)
}

fn report(operation: Operation, outcome: &RunOutcome, json: bool) -> Result<(), String> {
    if json {
        let payload = serde_json::json!({
            "operation": operation.as_str(),
            "provisioner": outcome.provisioner,
            "scope": outcome.scope.as_str(),
            "module": outcome.module.path,
            "workspace": outcome.workspace,
            "status": "ok",
            "output": outcome.output.stdout.as_deref().map(engine_json),
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(());
    }
    eprintln!(
        "{} {} {} finished",
        console::style("✓").green(),
        outcome.provisioner,
        operation
    );
    if let Some(dir) = &outcome.workspace {
        eprintln!("workspace kept at {}", dir.display());
    }
    Ok(())
}

/// Engine stdout as JSON. Output is captured across every invocation, so a
/// plain-text prelude (such as `init` chatter) may precede the JSON the
/// operation itself prints. Text lines are kept as strings alongside the
/// parsed documents; output with no JSON at all stays raw text.
fn engine_json(stdout: &str) -> serde_json::Value {
    use serde_json::Value;

    if let Ok(value) = serde_json::from_str::<Value>(stdout) {
        return value;
    }

    let mut offset = 0;
    let mut prelude = Vec::new();
    for line in stdout.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(doc) = serde_json::from_str::<Value>(&stdout[offset..]) {
                prelude.push(doc);
                return Value::Array(prelude);
            }
            if serde_json::from_str::<Value>(trimmed).is_ok() {
                break;
            }
        }
        if !trimmed.is_empty() {
            prelude.push(Value::String(trimmed.to_owned()));
        }
        offset += line.len();
    }

    let lines: Vec<Value> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str::<Value>(l).unwrap_or_else(|_| Value::String(l.to_owned())))
        .collect();
    if lines.iter().all(Value::is_string) {
        return Value::String(stdout.to_owned());
    }
    Value::Array(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn engine_json_single_document() {
        assert_eq!(engine_json("{\"steps\": []}\n"), json!({"steps": []}));
    }

    #[test]
    fn engine_json_lines() {
        let out = "{\"@level\":\"info\"}\n\n{\"@level\":\"warn\"}\n";
        assert_eq!(
            engine_json(out),
            json!([{"@level": "info"}, {"@level": "warn"}])
        );
    }

    #[test]
    fn engine_json_keeps_text_ahead_of_json_lines() {
        let out = "Initializing modules...\n{\"@level\":\"info\"}\n";
        assert_eq!(
            engine_json(out),
            json!(["Initializing modules...", {"@level": "info"}])
        );
    }

    #[test]
    fn engine_json_keeps_text_ahead_of_document() {
        let out = "Selected stack dev\n{\n  \"steps\": []\n}\n";
        assert_eq!(
            engine_json(out),
            json!(["Selected stack dev", {"steps": []}])
        );
    }

    #[test]
    fn engine_json_falls_back_to_text() {
        assert_eq!(engine_json("Plan: 1 to add\n"), json!("Plan: 1 to add\n"));
        assert_eq!(engine_json(""), json!(""));
    }
}
