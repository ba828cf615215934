//! Error handling for the `ember` CLI.
//!
//! Only the shell around the interpreter can fail here (reading the
//! script file, reading a REPL line); compile and runtime errors are
//! reported by `ember-vm` itself and surfaced as an `InterpretResult`,
//! not a `CliError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read script '{path}': {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read from stdin: {0}")]
    ReadLine(#[from] std::io::Error),

    #[error("could not initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_script_error_names_the_path() {
        let err = CliError::ReadScript {
            path: PathBuf::from("missing.ember"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("missing.ember"));
    }
}
