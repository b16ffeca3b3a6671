use std::{fmt, path::PathBuf};

pub type PdfResult<T> = anyhow::Result<T>;

/// Failure taxonomy for the driver.
///
/// `WrongDevice`, `FontNotFound` and `StateViolation` are fatal: the run
/// aborts and no further output bytes are written. `Parse` is raised for a
/// malformed or unrecognized line; the interpreter logs it with its line
/// number and skips the line when processing can continue.
#[derive(Debug)]
pub enum DriverError {
    /// The `x T` typesetter identifier named some other output device.
    WrongDevice {
        found: String,
    },
    /// No description file for the font on any candidate path.
    FontNotFound {
        name: String,
        searched: Vec<PathBuf>,
    },
    Parse {
        line: usize,
        what: String,
    },
    /// A command arrived before the state it needs was entered.
    StateViolation {
        line: usize,
        command: char,
        needs: &'static str,
    },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::WrongDevice { found } => {
                write!(
                    f,
                    "intermediate output was formatted for device `{}`, not `pdf`",
                    found
                )
            }
            DriverError::FontNotFound { name, searched } => {
                write!(f, "no description file for font `{}` under", name)?;
                for dir in searched {
                    write!(f, " {}", dir.display())?;
                }
                Ok(())
            }
            DriverError::Parse { line, what } => write!(f, "line {}: {}", line, what),
            DriverError::StateViolation {
                line,
                command,
                needs,
            } => {
                write!(f, "line {}: `{}` requires {}", line, command, needs)
            }
        }
    }
}

impl std::error::Error for DriverError {}
