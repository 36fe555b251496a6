use anyhow::Error;
use service_window::ServiceWindowError;
use service_window_runtime::{ConfigError, ResolveError};
use std::process::ExitCode;
use thiserror::Error as ThisError;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NOT_FOUND: u8 = 2;
pub const EXIT_INVALID_INPUT: u8 = 3;

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub fn invalid_input(message: impl Into<String>) -> Error {
    CliError::InvalidInput(message.into()).into()
}

pub fn report_error(err: &Error, verbose: bool) {
    if verbose {
        eprintln!("error: {err:#}");
    } else {
        eprintln!("error: {err}");
    }
}

pub fn exit_code_for(err: &Error) -> ExitCode {
    for cause in err.chain() {
        if cause.downcast_ref::<CliError>().is_some() {
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
        if let Some(resolve_err) = cause.downcast_ref::<ResolveError>() {
            return ExitCode::from(match resolve_err {
                ResolveError::UnknownFulfillment(_) => EXIT_NOT_FOUND,
                ResolveError::Window(_) => EXIT_INVALID_INPUT,
                ResolveError::Clock(_) => EXIT_FAILURE,
            });
        }
        if let Some(config_err) = cause.downcast_ref::<ConfigError>() {
            return ExitCode::from(match config_err {
                ConfigError::Read { .. } => EXIT_FAILURE,
                _ => EXIT_INVALID_INPUT,
            });
        }
        if cause.downcast_ref::<ServiceWindowError>().is_some() {
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    }
    ExitCode::from(EXIT_FAILURE)
}
