use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Keep the first Ctrl-C from killing provisio while an engine runs.
///
/// The engine shares our process group and sees the same interrupt, so it
/// gets to wind down its own operation. A second Ctrl-C exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, waiting for the engine to exit (Ctrl-C again to abort)...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shutdown_by_default() {
        assert!(!shutdown_requested());
    }
}
