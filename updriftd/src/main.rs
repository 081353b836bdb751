use std::process::ExitCode;

use updriftd::daemon::{
    DaemonConfig, DaemonRuntime, EXIT_STARTUP_FAILURE, EXIT_STRICT_VIOLATION, RunOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    match parse_cli_mode(std::env::args()) {
        Ok(CliMode::Help) => {
            println!("Usage: updriftd");
            println!("Watches UPDRIFT_WATCH_DIR and mirrors changes to the configured backend.");
            println!("Configuration is environment-driven; see UPDRIFT_* variables.");
            return ExitCode::SUCCESS;
        }
        Ok(CliMode::Run) => {}
        Err(err) => {
            eprintln!("[updriftd] {err}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    }

    let config = match DaemonConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[updriftd] configuration error: {err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let runtime = match DaemonRuntime::bootstrap(config).await {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("[updriftd] startup error: {err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    match runtime.run().await {
        Ok(RunOutcome::Clean) => ExitCode::SUCCESS,
        Ok(RunOutcome::StrictViolation) => ExitCode::from(EXIT_STRICT_VIOLATION),
        Err(err) => {
            eprintln!("[updriftd] runtime error: {err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    }
}
