use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use provisio_core::Engine;
use provisio_runtime::{binary_available, ProvisionerKind};
use std::path::Path;

pub fn run(engine: &Engine, config_path: Option<&Path>, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    match config_path {
        Some(path) => checks.push(Check::pass(
            "config",
            &format!("Config loaded from {}", path.display()),
        )),
        None => checks.push(Check::info("config", "No config file; using defaults")),
    }

    check_engines(engine, &mut checks, &mut all_pass);
    check_tools(engine, &mut checks, &mut all_pass);
    check_home(engine, &mut checks, &mut all_pass);

    checks.push(Check::info(
        "catalog",
        &format!("{} resource kinds known", engine.catalog().len()),
    ));

    print_results(&checks, all_pass, json_output)
}

fn check_engines(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let mut found = 0;
    for kind in ProvisionerKind::ALL {
        let binary = engine.binaries().engine(kind);
        let name = format!("engine_{kind}");
        if binary_available(binary) {
            found += 1;
            checks.push(Check::pass(
                &name,
                &format!("{kind} available ({})", binary.display()),
            ));
        } else {
            checks.push(Check::warn(
                &name,
                &format!("{kind} not found ({})", binary.display()),
            ));
        }
    }
    if found == 0 {
        *all_pass = false;
        checks.push(Check::fail(
            "engines",
            "No provisioning engine available; install pulumi, tofu or terraform",
        ));
    }
}

fn check_tools(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let git = &engine.binaries().git;
    match (binary_available(git), engine.module_repo()) {
        (true, Some(repo)) => checks.push(Check::pass(
            "module_repo",
            &format!("Module repository {repo} (git available)"),
        )),
        (false, Some(repo)) => {
            *all_pass = false;
            checks.push(Check::fail(
                "module_repo",
                &format!("Module repository {repo} configured but git not found"),
            ));
        }
        (_, None) => checks.push(Check::warn(
            "module_repo",
            "No module_repo configured; runs need --module-dir",
        )),
    }

    let kustomize = &engine.binaries().kustomize;
    if binary_available(kustomize) {
        checks.push(Check::pass("kustomize", "kustomize available"));
    } else {
        checks.push(Check::info(
            "kustomize",
            "kustomize not found (only needed for --kustomize-dir)",
        ));
    }
}

fn check_home(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = engine.layout();
    let root = layout.root();
    if !root.exists() {
        checks.push(Check::info(
            "home",
            &format!(
                "{} not initialized (created on first run)",
                root.display()
            ),
        ));
        return;
    }
    match layout.verify_version() {
        Ok(()) => checks.push(Check::pass(
            "home",
            &format!("{} layout version valid", root.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "home",
                &format!("{} layout check failed: {e}", root.display()),
            ));
        }
    }
    check_disk_space(root, checks);
}

fn check_disk_space(root: &Path, checks: &mut Vec<Check>) {
    let Ok(avail_bytes) = fs2::available_space(root) else {
        return;
    };
    let avail_mb = avail_bytes / (1024 * 1024);

    if avail_mb < 100 {
        checks.push(Check::fail(
            "disk_space",
            &format!("Low disk space: {avail_mb} MB available"),
        ));
    } else if avail_mb < 1024 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Disk space: {avail_mb} MB available (engine plugins need room)"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("provisio doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => console::style("✓").green(),
                "fail" => console::style("✗").red(),
                "warn" => console::style("⚠").yellow(),
                _ => console::style("ℹ").blue(),
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
