use std::process::ExitCode;

use clap::Parser;
use sheetmap::{AppConfig, CliArgs, FailureReport, LoggingConfig, init_logging, run};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let logging_config = LoggingConfig::from_env();
    let guard = match init_logging(logging_config) {
        Ok(guard) => guard,
        Err(err) => {
            let report = FailureReport::from_error(&err);
            eprintln!("{report}");
            return ExitCode::from(report.exit_code);
        }
    };

    let result = match AppConfig::from_args(CliArgs::parse()) {
        Ok(config) => run(config).await,
        Err(err) => Err(err),
    };

    let status = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = FailureReport::from_error(&err);
            error!(
                exit_code = report.exit_code,
                category = report.category,
                retryable = report.retryable,
                error = %report.message,
                "run failed"
            );
            eprintln!("{report}");
            ExitCode::from(report.exit_code)
        }
    };
    drop(guard);
    status
}
