use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    InvalidArguments = 2,
    Validation = 3,
    Host = 4,
    Io = 5,
    Config = 6,
}

impl ExitCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            2 => Some(Self::InvalidArguments),
            3 => Some(Self::Validation),
            4 => Some(Self::Host),
            5 => Some(Self::Io),
            6 => Some(Self::Config),
            _ => None,
        }
    }
}

/// Which term of the product a variable list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "left side",
            Side::Right => "right side",
        })
    }
}

/// A requested variable that the source dataset does not define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVariable {
    pub name: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for MissingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{suggestion}'?)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("the active dataset must have a dataset name in order to run this command")]
    UnnamedActiveDataset,

    #[error("the two variable lists cannot have any names in common: {}", .names.join(", "))]
    OverlappingVariables { names: Vec<String> },

    #[error("the {side} variable list contains undefined variables:\n{}", join_missing(.missing))]
    UndefinedVariables {
        side: Side,
        missing: Vec<MissingVariable>,
    },

    #[error("invalid variable list: {0}")]
    InvalidVariableList(String),

    #[error("output file {} cannot be the file of the active dataset", .0.display())]
    OutputIsActiveFile(PathBuf),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("there is no active dataset")]
    NoActiveDataset,

    #[error("dataset '{0}' does not exist")]
    UnknownDataset(String),

    #[error("variable '{name}' is not defined in dataset {dataset}")]
    UnknownVariable { name: String, dataset: String },

    #[error("case count of dataset {0} is unavailable after a data pass")]
    CaseCountUnavailable(String),

    #[error("malformed case file {} (line {line}): {message}", .path.display())]
    CaseFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl CartError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::UnnamedActiveDataset
            | Self::OverlappingVariables { .. }
            | Self::UndefinedVariables { .. }
            | Self::InvalidVariableList(_)
            | Self::OutputIsActiveFile(_) => ExitCode::Validation,
            Self::InvalidArguments(_) => ExitCode::InvalidArguments,
            Self::NoActiveDataset
            | Self::UnknownDataset(_)
            | Self::UnknownVariable { .. }
            | Self::CaseCountUnavailable(_)
            | Self::CaseFile { .. } => ExitCode::Host,
            Self::Io(_) => ExitCode::Io,
        }
    }
}

fn join_missing(missing: &[MissingVariable]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type CartResult<T> = Result<T, CartError>;
