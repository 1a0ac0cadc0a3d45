//! Typed commands understood by a [`Host`](crate::host::Host).
//!
//! Each directive renders to a one-line command-syntax form, which is what the
//! engine logs when it executes it.

use std::fmt;
use std::path::PathBuf;

/// One output of a replication pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSink {
    pub outfile: PathBuf,
    pub keep: Vec<String>,
    /// Append the loop counter as the last variable of every written case.
    pub tagged: bool,
}

impl ReplicaSink {
    pub fn new(outfile: impl Into<PathBuf>, keep: Vec<String>) -> Self {
        Self {
            outfile: outfile.into(),
            keep,
            tagged: false,
        }
    }

    pub fn tagged(mut self) -> Self {
        self.tagged = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// For each case of the active dataset, loop `times` times and write the
    /// case to every sink. The active dataset itself is left untouched.
    Replicate {
        times: usize,
        counter: Option<String>,
        sinks: Vec<ReplicaSink>,
    },
    Activate(String),
    /// Open a case file as a dataset under `name` and make it active.
    Get { file: PathBuf, name: String },
    /// Stable ascending sort of the active dataset.
    SortCases { by: String },
    /// Merge `with` into the active dataset by case position.
    MatchFiles { with: String, drop: Vec<String> },
    Close(String),
    EraseFile(PathBuf),
    Save { file: PathBuf },
    /// Force a data pass over the active dataset.
    Execute,
}

impl Directive {
    pub fn replicate(times: usize) -> Self {
        Directive::Replicate {
            times,
            counter: None,
            sinks: Vec::new(),
        }
    }

    /// Name the loop counter of a [`Directive::Replicate`]. No-op otherwise.
    pub fn counter(mut self, name: impl Into<String>) -> Self {
        if let Directive::Replicate { counter, .. } = &mut self {
            *counter = Some(name.into());
        }
        self
    }

    /// Add a sink to a [`Directive::Replicate`]. No-op otherwise.
    pub fn sink(mut self, sink: ReplicaSink) -> Self {
        if let Directive::Replicate { sinks, .. } = &mut self {
            sinks.push(sink);
        }
        self
    }

    pub fn activate(name: impl Into<String>) -> Self {
        Directive::Activate(name.into())
    }

    pub fn get(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Directive::Get {
            file: file.into(),
            name: name.into(),
        }
    }

    pub fn sort_cases(by: impl Into<String>) -> Self {
        Directive::SortCases { by: by.into() }
    }

    pub fn match_files(with: impl Into<String>, drop: Vec<String>) -> Self {
        Directive::MatchFiles {
            with: with.into(),
            drop,
        }
    }

    pub fn close(name: impl Into<String>) -> Self {
        Directive::Close(name.into())
    }

    pub fn erase_file(file: impl Into<PathBuf>) -> Self {
        Directive::EraseFile(file.into())
    }

    pub fn save(file: impl Into<PathBuf>) -> Self {
        Directive::Save { file: file.into() }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Replicate {
                times,
                counter,
                sinks,
            } => {
                let counter = counter.as_deref().unwrap_or("#i");
                write!(f, "LOOP {counter} = 1 TO {times}.")?;
                for sink in sinks {
                    write!(
                        f,
                        " XSAVE OUTFILE=\"{}\" /KEEP={}",
                        sink.outfile.display(),
                        sink.keep.join(" ")
                    )?;
                    if sink.tagged {
                        write!(f, " {counter}")?;
                    }
                    f.write_str(".")?;
                }
                f.write_str(" END LOOP.")
            }
            Directive::Activate(name) => write!(f, "DATASET ACTIVATE {name}."),
            Directive::Get { file, name } => {
                write!(f, "GET FILE=\"{}\". DATASET NAME {name}.", file.display())
            }
            Directive::SortCases { by } => write!(f, "SORT CASES BY {by}."),
            Directive::MatchFiles { with, drop } => {
                write!(f, "MATCH FILES /FILE=* /FILE={with}")?;
                if !drop.is_empty() {
                    write!(f, " /DROP={}", drop.join(" "))?;
                }
                f.write_str(".")
            }
            Directive::Close(name) => write!(f, "DATASET CLOSE {name}."),
            Directive::EraseFile(file) => write!(f, "ERASE FILE=\"{}\".", file.display()),
            Directive::Save { file } => write!(f, "SAVE OUTFILE=\"{}\".", file.display()),
            Directive::Execute => f.write_str("EXECUTE."),
        }
    }
}
