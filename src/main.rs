use clap::Parser;
use runguard::cli::{Cli, Commands, GuardOptions};
use runguard::error::Result;
use runguard::lifecycle::{Lifecycle, Outcome, run_command};
use runguard::logs::{LogSettings, Logger, StdConsole, follow_log, read_log_lines};
use runguard::process::{SystemProbe, reraise_signal};
use runguard::status::StatusReport;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            options,
            require,
            command,
        } => run(options, require, command).await,
        Commands::Status { options, json } => report(show_status(&options, json)),
        Commands::Logs {
            options,
            lines,
            generation,
            follow,
        } => report(show_logs(&options, lines, generation, follow)),
    };

    std::process::exit(code);
}

async fn run(options: GuardOptions, require: Vec<String>, command: Vec<String>) -> i32 {
    let config = match options.to_config(command.first().map(String::as_str)) {
        Ok(config) => config,
        Err(e) => {
            Logger::stdio(LogSettings::console_only()).error(format!("{}; exiting", e));
            return e.exit_code();
        }
    };

    let lifecycle = match Lifecycle::start(config, Arc::new(StdConsole), &SystemProbe) {
        Ok(lifecycle) => lifecycle,
        Err(e) => return e.exit_code(),
    };

    if let Err(e) = lifecycle.check_dependencies(&require) {
        return e.exit_code();
    }

    let logger = lifecycle.logger();
    let outcome = lifecycle.run(run_command(&command, logger)).await;

    if let Outcome::Signalled(signo) = outcome {
        reraise_signal(signo);
    }
    outcome.exit_code()
}

fn show_status(options: &GuardOptions, json: bool) -> Result<()> {
    let config = options.to_config(None)?.enable_logging(true);
    let report = StatusReport::collect(&config, &SystemProbe)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_details();
    }
    Ok(())
}

fn show_logs(
    options: &GuardOptions,
    lines: usize,
    generation: Option<usize>,
    follow: bool,
) -> Result<()> {
    let config = options.to_config(None)?.enable_logging(true);
    let path = match generation {
        Some(index) => config.log.backup_path(index),
        None => config.log.current_path(),
    };

    println!("=== {} ===", path.display());
    let log_lines = read_log_lines(&path, lines)?;
    if log_lines.is_empty() {
        println!("Log file not found or empty");
    }
    for line in log_lines {
        println!("{}", line);
    }

    if follow {
        println!("\n=== Following {} (Ctrl+C to stop) ===", path.display());
        follow_log(&path)?;
    }
    Ok(())
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("❌ {}", e);
            e.exit_code()
        }
    }
}
