//! In-memory host engine backed by case files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::casefile::{read_case_file, read_header, write_case_file, CaseFileWriter};
use crate::directive::{Directive, ReplicaSink};
use crate::error::{CartError, CartResult};
use crate::host::Host;
use crate::value::Value;
use crate::varlist::position_of;

/// A table of cases with a fixed variable schema.
///
/// A dataset opened from a file only knows its variables until the first data
/// pass loads the cases.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    variables: Vec<String>,
    source: Option<PathBuf>,
    cases: Option<Vec<Vec<Value>>>,
}

impl Dataset {
    pub fn new(variables: Vec<String>, cases: Vec<Vec<Value>>) -> CartResult<Self> {
        for (idx, name) in variables.iter().enumerate() {
            if position_of(name, &variables[..idx]).is_some() {
                return Err(CartError::InvalidArguments(format!(
                    "variable '{name}' is defined more than once"
                )));
            }
        }
        if let Some((row, case)) = cases
            .iter()
            .enumerate()
            .find(|(_, case)| case.len() != variables.len())
        {
            return Err(CartError::InvalidArguments(format!(
                "case {} has {} values but the dataset defines {} variables",
                row + 1,
                case.len(),
                variables.len()
            )));
        }

        Ok(Self {
            variables,
            source: None,
            cases: Some(cases),
        })
    }

    /// Open a case file lazily: the header is read now, the cases on demand.
    pub fn open(path: &Path) -> CartResult<Self> {
        let variables = read_header(path)?;
        Ok(Self {
            variables,
            source: Some(path.to_path_buf()),
            cases: None,
        })
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn case_count(&self) -> Option<usize> {
        self.cases.as_ref().map(Vec::len)
    }

    pub fn cases(&self) -> Option<&[Vec<Value>]> {
        self.cases.as_deref()
    }

    /// Values of one variable across all loaded cases.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = position_of(name, &self.variables)?;
        let cases = self.cases.as_ref()?;
        Some(cases.iter().map(|case| case[idx].clone()).collect())
    }

    fn load(&mut self) -> CartResult<&mut Vec<Vec<Value>>> {
        if self.cases.is_none() {
            let path = self.source.clone().ok_or_else(|| {
                CartError::InvalidArguments("dataset has neither cases nor a source file".into())
            })?;
            let (variables, cases) = read_case_file(&path)?;
            if variables != self.variables {
                return Err(CartError::CaseFile {
                    path,
                    line: 1,
                    message: "header changed since the file was opened".to_string(),
                });
            }
            debug!(path = %path.display(), cases = cases.len(), "Loaded case file");
            self.cases = Some(cases);
        }
        Ok(self.cases.get_or_insert_with(Vec::new))
    }

    fn index_of(&self, name: &str, dataset: &str) -> CartResult<usize> {
        position_of(name, &self.variables).ok_or_else(|| CartError::UnknownVariable {
            name: name.to_string(),
            dataset: dataset.to_string(),
        })
    }
}

#[derive(Debug)]
enum ActiveSlot {
    Named(String),
    Unnamed(Dataset),
}

/// Dataset names are case-insensitive; the spelling used at registration is
/// kept for display.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    datasets: BTreeMap<String, (String, Dataset)>,
    active: Option<ActiveSlot>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dataset` under `name`, replacing any dataset of that name.
    pub fn insert(&mut self, name: &str, dataset: Dataset) {
        self.datasets
            .insert(key(name), (name.to_string(), dataset));
    }

    /// Register `dataset` under `name` and make it active.
    pub fn insert_active(&mut self, name: &str, dataset: Dataset) {
        self.insert(name, dataset);
        self.active = Some(ActiveSlot::Named(key(name)));
    }

    /// Make `dataset` the active dataset without giving it a name.
    pub fn set_unnamed_active(&mut self, dataset: Dataset) {
        self.active = Some(ActiveSlot::Unnamed(dataset));
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(&key(name)).map(|(_, dataset)| dataset)
    }

    pub fn active(&self) -> Option<&Dataset> {
        match self.active.as_ref()? {
            ActiveSlot::Named(k) => self.datasets.get(k).map(|(_, dataset)| dataset),
            ActiveSlot::Unnamed(dataset) => Some(dataset),
        }
    }

    /// Registered dataset names, in case-insensitive order.
    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets
            .values()
            .map(|(display, _)| display.clone())
            .collect()
    }

    fn active_mut(&mut self) -> CartResult<(String, &mut Dataset)> {
        match self.active.as_mut() {
            Some(ActiveSlot::Named(k)) => self
                .datasets
                .get_mut(k.as_str())
                .map(|(display, dataset)| (display.clone(), dataset))
                .ok_or(CartError::NoActiveDataset),
            Some(ActiveSlot::Unnamed(dataset)) => Ok(("*".to_string(), dataset)),
            None => Err(CartError::NoActiveDataset),
        }
    }

    fn activate(&mut self, name: &str) -> CartResult<()> {
        let k = key(name);
        if !self.datasets.contains_key(&k) {
            return Err(CartError::UnknownDataset(name.to_string()));
        }
        self.active = Some(ActiveSlot::Named(k));
        Ok(())
    }

    fn replicate(
        &mut self,
        times: usize,
        counter: Option<&str>,
        sinks: &[ReplicaSink],
    ) -> CartResult<()> {
        let (name, dataset) = self.active_mut()?;

        let mut plans = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let columns = sink
                .keep
                .iter()
                .map(|var| dataset.index_of(var, &name))
                .collect::<CartResult<Vec<_>>>()?;
            let mut header: Vec<String> = columns
                .iter()
                .map(|&idx| dataset.variables[idx].clone())
                .collect();
            if sink.tagged {
                let counter = counter.ok_or_else(|| {
                    CartError::InvalidArguments(format!(
                        "sink {} is tagged but the loop has no counter variable",
                        sink.outfile.display()
                    ))
                })?;
                if position_of(counter, &header).is_some() {
                    return Err(CartError::InvalidArguments(format!(
                        "counter variable '{counter}' collides with a kept variable"
                    )));
                }
                header.push(counter.to_string());
            }
            plans.push((columns, sink.tagged, header));
        }

        let cases = dataset.load()?;
        let mut writers = plans
            .iter()
            .zip(sinks)
            .map(|((_, _, header), sink)| CaseFileWriter::create(&sink.outfile, header))
            .collect::<CartResult<Vec<_>>>()?;

        for case in cases.iter() {
            for iteration in 1..=times {
                for ((columns, tagged, _), writer) in plans.iter().zip(writers.iter_mut()) {
                    let mut row: Vec<Value> =
                        columns.iter().map(|&idx| case[idx].clone()).collect();
                    if *tagged {
                        row.push(Value::from(iteration));
                    }
                    writer.write_case(&row)?;
                }
            }
        }

        for writer in writers {
            writer.finish()?;
        }
        Ok(())
    }

    fn get(&mut self, file: &Path, name: &str) -> CartResult<()> {
        let dataset = Dataset::open(file)?;
        self.insert_active(name, dataset);
        Ok(())
    }

    fn sort_cases(&mut self, by: &str) -> CartResult<()> {
        let (name, dataset) = self.active_mut()?;
        let idx = dataset.index_of(by, &name)?;
        let cases = dataset.load()?;
        // `sort_by` is stable, which positional merging relies on.
        cases.sort_by(|a, b| a[idx].total_cmp(&b[idx]));
        Ok(())
    }

    fn match_files(&mut self, with: &str, drop: &[String]) -> CartResult<()> {
        let other_key = key(with);
        let (other_vars, other_cases) = {
            let (_, other) = self
                .datasets
                .get_mut(&other_key)
                .ok_or_else(|| CartError::UnknownDataset(with.to_string()))?;
            let cases = other.load()?.clone();
            (other.variables.clone(), cases)
        };

        let (name, dataset) = self.active_mut()?;
        let first_width = dataset.variables.len();
        let first_cases = dataset.load()?.clone();

        let mut variables = dataset.variables.clone();
        let mut taken_from_other = Vec::new();
        for (idx, var) in other_vars.iter().enumerate() {
            if position_of(var, &variables).is_none() {
                variables.push(var.clone());
                taken_from_other.push(idx);
            }
        }

        let mut keep = vec![true; variables.len()];
        for var in drop {
            let idx = position_of(var, &variables).ok_or_else(|| CartError::UnknownVariable {
                name: var.clone(),
                dataset: name.clone(),
            })?;
            keep[idx] = false;
        }

        let rows = first_cases.len().max(other_cases.len());
        let mut merged = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut case = Vec::with_capacity(variables.len());
            match first_cases.get(row) {
                Some(values) => case.extend(values.iter().cloned()),
                None => case.extend(std::iter::repeat(Value::Missing).take(first_width)),
            }
            for &idx in &taken_from_other {
                let value = other_cases
                    .get(row)
                    .map(|values| values[idx].clone())
                    .unwrap_or(Value::Missing);
                case.push(value);
            }
            merged.push(retain(case, &keep));
        }

        dataset.variables = retain(variables, &keep);
        dataset.cases = Some(merged);
        dataset.source = None;
        Ok(())
    }

    fn close(&mut self, name: &str) -> CartResult<()> {
        let k = key(name);
        if self.datasets.remove(&k).is_none() {
            return Err(CartError::UnknownDataset(name.to_string()));
        }
        if matches!(&self.active, Some(ActiveSlot::Named(active)) if *active == k) {
            self.active = None;
        }
        Ok(())
    }

    fn save(&mut self, file: &Path) -> CartResult<()> {
        let (_, dataset) = self.active_mut()?;
        dataset.load()?;
        let cases = dataset.cases.as_deref().unwrap_or_default();
        write_case_file(file, &dataset.variables, cases)
    }
}

impl Host for MemoryEngine {
    fn active_name(&self) -> CartResult<Option<String>> {
        match &self.active {
            Some(ActiveSlot::Named(k)) => self
                .datasets
                .get(k)
                .map(|(display, _)| Some(display.clone()))
                .ok_or(CartError::NoActiveDataset),
            Some(ActiveSlot::Unnamed(_)) => Ok(None),
            None => Err(CartError::NoActiveDataset),
        }
    }

    fn case_count(&self) -> CartResult<Option<usize>> {
        self.active()
            .map(Dataset::case_count)
            .ok_or(CartError::NoActiveDataset)
    }

    fn variables(&self) -> CartResult<Vec<String>> {
        self.active()
            .map(|dataset| dataset.variables.clone())
            .ok_or(CartError::NoActiveDataset)
    }

    fn active_file(&self) -> CartResult<Option<PathBuf>> {
        self.active()
            .map(|dataset| dataset.source.clone())
            .ok_or(CartError::NoActiveDataset)
    }

    fn has_dataset(&self, name: &str) -> bool {
        self.datasets.contains_key(&key(name))
    }

    fn submit(&mut self, directive: Directive) -> CartResult<()> {
        debug!(directive = %directive, "Submitting directive");
        match &directive {
            Directive::Replicate {
                times,
                counter,
                sinks,
            } => self.replicate(*times, counter.as_deref(), sinks),
            Directive::Activate(name) => self.activate(name),
            Directive::Get { file, name } => self.get(file, name),
            Directive::SortCases { by } => self.sort_cases(by),
            Directive::MatchFiles { with, drop } => self.match_files(with, drop),
            Directive::Close(name) => self.close(name),
            Directive::EraseFile(file) => fs::remove_file(file).map_err(CartError::from),
            Directive::Save { file } => self.save(file),
            Directive::Execute => self.active_mut()?.1.load().map(|_| ()),
        }
    }
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

fn retain<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, &keep)| keep.then_some(item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn numbers(rows: &[&[f64]]) -> Vec<Vec<Value>> {
        rows.iter()
            .map(|row| row.iter().map(|&n| Value::from(n)).collect())
            .collect()
    }

    #[test]
    fn unnamed_active_dataset_reports_no_name() {
        let mut engine = MemoryEngine::new();
        assert!(matches!(
            engine.active_name(),
            Err(CartError::NoActiveDataset)
        ));

        engine.set_unnamed_active(Dataset::new(vars(&["a"]), numbers(&[&[1.0]])).unwrap());
        assert_eq!(engine.active_name().unwrap(), None);
        assert_eq!(engine.case_count().unwrap(), Some(1));
    }

    #[test]
    fn opened_files_have_unknown_count_until_execute() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("left.jsonl");
        write_case_file(&path, &vars(&["a", "b"]), &numbers(&[&[1.0, 2.0], &[3.0, 4.0]]))
            .unwrap();

        let mut engine = MemoryEngine::new();
        engine.insert_active("Left", Dataset::open(&path).unwrap());

        assert_eq!(engine.active_name().unwrap(), Some("Left".to_string()));
        assert_eq!(engine.case_count().unwrap(), None);
        assert_eq!(engine.active_file().unwrap(), Some(path.clone()));

        engine.submit(Directive::Execute).unwrap();
        assert_eq!(engine.case_count().unwrap(), Some(2));
    }

    #[test]
    fn activation_is_case_insensitive_and_checks_existence() {
        let mut engine = MemoryEngine::new();
        engine.insert("Right", Dataset::new(vars(&["y"]), Vec::new()).unwrap());

        engine.submit(Directive::activate("RIGHT")).unwrap();
        assert_eq!(engine.active_name().unwrap(), Some("Right".to_string()));

        let err = engine.submit(Directive::activate("missing")).unwrap_err();
        assert!(matches!(err, CartError::UnknownDataset(name) if name == "missing"));
    }

    #[test]
    fn replicate_writes_each_case_consecutively() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        let tagged = dir.path().join("tagged.jsonl");

        let mut engine = MemoryEngine::new();
        engine.insert_active(
            "src",
            Dataset::new(vars(&["A", "b"]), numbers(&[&[1.0, 10.0], &[2.0, 20.0]])).unwrap(),
        );

        engine
            .submit(
                Directive::replicate(2)
                    .counter("seq")
                    .sink(ReplicaSink::new(&out, vars(&["a"])))
                    .sink(ReplicaSink::new(&tagged, vars(&["B"])).tagged()),
            )
            .unwrap();

        let (out_vars, out_cases) = read_case_file(&out).unwrap();
        assert_eq!(out_vars, vars(&["A"]));
        assert_eq!(out_cases, numbers(&[&[1.0], &[1.0], &[2.0], &[2.0]]));

        let (tag_vars, tag_cases) = read_case_file(&tagged).unwrap();
        assert_eq!(tag_vars, vars(&["b", "seq"]));
        assert_eq!(
            tag_cases,
            numbers(&[&[10.0, 1.0], &[10.0, 2.0], &[20.0, 1.0], &[20.0, 2.0]])
        );

        assert_eq!(engine.variables().unwrap(), vars(&["A", "b"]));
    }

    #[test]
    fn replicate_rejects_unknown_keep_variable() {
        let dir = tempdir().unwrap();
        let mut engine = MemoryEngine::new();
        engine.insert_active("src", Dataset::new(vars(&["a"]), Vec::new()).unwrap());

        let err = engine
            .submit(
                Directive::replicate(1)
                    .sink(ReplicaSink::new(dir.path().join("x.jsonl"), vars(&["zz"]))),
            )
            .unwrap_err();
        assert!(matches!(err, CartError::UnknownVariable { name, .. } if name == "zz"));
    }

    #[test]
    fn sort_is_stable_within_ties() {
        let mut engine = MemoryEngine::new();
        engine.insert_active(
            "t",
            Dataset::new(
                vars(&["k", "order"]),
                numbers(&[&[2.0, 1.0], &[1.0, 2.0], &[2.0, 3.0], &[1.0, 4.0]]),
            )
            .unwrap(),
        );

        engine.submit(Directive::sort_cases("K")).unwrap();

        assert_eq!(
            engine.active().unwrap().column("order").unwrap(),
            vec![
                Value::from(2.0),
                Value::from(4.0),
                Value::from(1.0),
                Value::from(3.0)
            ]
        );
    }

    #[test]
    fn match_files_merges_by_position_and_pads() {
        let mut engine = MemoryEngine::new();
        engine.insert(
            "right",
            Dataset::new(
                vars(&["y", "a", "tag"]),
                numbers(&[&[7.0, 99.0, 1.0], &[8.0, 99.0, 1.0], &[9.0, 99.0, 1.0]]),
            )
            .unwrap(),
        );
        engine.insert_active(
            "left",
            Dataset::new(vars(&["a"]), numbers(&[&[1.0], &[2.0]])).unwrap(),
        );

        engine
            .submit(Directive::match_files("right", vars(&["tag"])))
            .unwrap();

        let merged = engine.active().unwrap();
        assert_eq!(merged.variables(), vars(&["a", "y"]).as_slice());
        assert_eq!(
            merged.cases().unwrap(),
            &[
                vec![Value::from(1.0), Value::from(7.0)],
                vec![Value::from(2.0), Value::from(8.0)],
                vec![Value::Missing, Value::from(9.0)],
            ]
        );
    }

    #[test]
    fn close_and_save_round_trip() {
        let dir = tempdir().unwrap();
        let saved = dir.path().join("saved.jsonl");

        let mut engine = MemoryEngine::new();
        engine.insert_active(
            "t",
            Dataset::new(vars(&["x"]), numbers(&[&[5.0]])).unwrap(),
        );
        engine.submit(Directive::save(&saved)).unwrap();
        engine.submit(Directive::close("t")).unwrap();

        assert!(!engine.has_dataset("t"));
        assert!(matches!(
            engine.case_count(),
            Err(CartError::NoActiveDataset)
        ));

        engine.submit(Directive::get(&saved, "again")).unwrap();
        engine.submit(Directive::Execute).unwrap();
        assert_eq!(engine.case_count().unwrap(), Some(1));

        engine.submit(Directive::erase_file(&saved)).unwrap();
        assert!(!saved.exists());
    }

    #[test]
    fn rejects_duplicate_variables_and_ragged_cases() {
        assert!(Dataset::new(vars(&["a", "A"]), Vec::new()).is_err());
        assert!(Dataset::new(vars(&["a", "b"]), numbers(&[&[1.0]])).is_err());
    }
}
