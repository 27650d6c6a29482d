use clap::Parser;
use sous::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    sous::cli::run(cli).await
}

/// Debug logs go to `sous.log` when SOUS_LOG is set; otherwise RUST_LOG
/// drives a stderr logger. Nothing is logged by default.
fn init_logging() {
    if std::env::var("SOUS_LOG").is_ok() {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create("sous.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = tracing_subscriber::EnvFilter::new("sous=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file: {err}");
            }
        }
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }
}
