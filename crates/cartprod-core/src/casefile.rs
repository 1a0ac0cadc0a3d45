//! JSON Lines persistence for datasets.
//!
//! The first line is a header object naming the variables; each following line
//! is one case encoded as a JSON array with one cell per variable.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CartError, CartResult};
use crate::fs::write_atomic;
use crate::value::Value;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    variables: Vec<String>,
}

/// Sequential writer, used for loop/xsave style replication.
pub struct CaseFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    width: usize,
    cases: usize,
}

impl CaseFileWriter {
    pub fn create(path: &Path, variables: &[String]) -> CartResult<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let header = Header {
            variables: variables.to_vec(),
        };
        write_json_line(&mut writer, &header, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            width: variables.len(),
            cases: 0,
        })
    }

    pub fn write_case(&mut self, case: &[Value]) -> CartResult<()> {
        if case.len() != self.width {
            return Err(CartError::CaseFile {
                path: self.path.clone(),
                line: self.cases + 2,
                message: format!("expected {} values, got {}", self.width, case.len()),
            });
        }
        write_json_line(&mut self.writer, &case, &self.path)?;
        self.cases += 1;
        Ok(())
    }

    /// Flush and return the number of cases written.
    pub fn finish(mut self) -> CartResult<usize> {
        self.writer.flush()?;
        Ok(self.cases)
    }
}

fn write_json_line<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
    path: &Path,
) -> CartResult<()> {
    serde_json::to_writer(&mut *writer, value).map_err(|err| CartError::CaseFile {
        path: path.to_path_buf(),
        line: 0,
        message: err.to_string(),
    })?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Read only the variable names of a case file.
pub fn read_header(path: &Path) -> CartResult<Vec<String>> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    parse_header(path, lines.next().transpose()?)
}

/// Read the variable names and every case.
pub fn read_case_file(path: &Path) -> CartResult<(Vec<String>, Vec<Vec<Value>>)> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let variables = parse_header(path, lines.next().transpose()?)?;

    let mut cases = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        let line_no = idx + 2;
        if line.trim().is_empty() {
            continue;
        }
        let case: Vec<Value> =
            serde_json::from_str(&line).map_err(|err| CartError::CaseFile {
                path: path.to_path_buf(),
                line: line_no,
                message: err.to_string(),
            })?;
        if case.len() != variables.len() {
            return Err(CartError::CaseFile {
                path: path.to_path_buf(),
                line: line_no,
                message: format!("expected {} values, got {}", variables.len(), case.len()),
            });
        }
        cases.push(case);
    }

    Ok((variables, cases))
}

/// Write a whole dataset, replacing `path` atomically.
pub fn write_case_file(path: &Path, variables: &[String], cases: &[Vec<Value>]) -> CartResult<()> {
    let mut buffer = Vec::new();
    let header = Header {
        variables: variables.to_vec(),
    };
    write_json_line(&mut buffer, &header, path)?;
    for case in cases {
        write_json_line(&mut buffer, case, path)?;
    }
    write_atomic(path, &buffer)
}

fn parse_header(path: &Path, line: Option<String>) -> CartResult<Vec<String>> {
    let line = line.ok_or_else(|| CartError::CaseFile {
        path: path.to_path_buf(),
        line: 1,
        message: "missing header line".to_string(),
    })?;
    let header: Header = serde_json::from_str(&line).map_err(|err| CartError::CaseFile {
        path: path.to_path_buf(),
        line: 1,
        message: format!("invalid header: {err}"),
    })?;
    Ok(header.variables)
}
