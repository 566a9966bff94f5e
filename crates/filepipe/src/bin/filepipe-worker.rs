//! Reference worker speaking the filepipe protocol on stdin/stdout.
//!
//! Logs go to stderr, filtered by `FILEPIPE_LOG` (default `warn`).

use filepipe::frame::FrameConfig;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "FILEPIPE_LOG";

fn main() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();

    match filepipe::worker::serve(stdin, stdout, FrameConfig::default()) {
        Ok(served) => {
            tracing::info!(served, "worker exiting");
        }
        Err(err) => {
            tracing::error!(error = %err, "worker stopped");
            eprintln!("filepipe-worker: {err}");
            std::process::exit(1);
        }
    }
}
