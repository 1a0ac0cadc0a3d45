use std::path::PathBuf;

use cartprod_config::Config;
use tracing::info;

use crate::check::check_inputs;
use crate::directive::{Directive, ReplicaSink};
use crate::error::{CartError, CartResult};
use crate::fs::same_file;
use crate::host::Host;
use crate::names::NameAllocator;
use crate::varlist::is_valid_name;

const CASE_FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone)]
pub struct CartesianOptions {
    pub temp_dir: PathBuf,
    pub variable_prefix: String,
    pub dataset_prefix: String,
}

impl CartesianOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.storage.temp_dir.clone(),
            variable_prefix: config.naming.variable_prefix.clone(),
            dataset_prefix: config.naming.dataset_prefix.clone(),
        }
    }
}

impl Default for CartesianOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct CartesianRequest {
    pub var1: Vec<String>,
    pub var2: Vec<String>,
    pub outfile: PathBuf,
    pub dsname: Option<String>,
    pub input2: Option<String>,
    pub options: CartesianOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartesianOutcome {
    pub dataset: String,
    pub outfile: PathBuf,
    pub left_cases: usize,
    pub right_cases: usize,
    pub cases: usize,
    pub variables: Vec<String>,
}

/// Build the cartesian product of `var1` (active dataset) and `var2`
/// (`input2`, or the active dataset) as a new active dataset saved to
/// `outfile`.
///
/// 1. Every left case is written right-count times to `outfile`.
/// 2. Every right case is written left-count times to a temporary file,
///    tagged with a 1..left-count counter. Steps 1 and 2 share one pass when
///    both lists come from the active dataset.
/// 3. The temporary file is opened and sorted by the counter, which lines its
///    cases up with the left replica.
/// 4. The left replica is opened as the output dataset and merged with the
///    sorted replica by position, dropping the counter.
///
/// A failure after step 1 leaves the temporary file and dataset behind.
pub fn build_cartesian<H: Host + ?Sized>(
    host: &mut H,
    request: &CartesianRequest,
) -> CartResult<CartesianOutcome> {
    if request.outfile.as_os_str().is_empty() {
        return Err(CartError::InvalidArguments(
            "an output file is required".to_string(),
        ));
    }
    if let Some(dsname) = &request.dsname {
        if !is_valid_name(dsname) {
            return Err(CartError::InvalidArguments(format!(
                "'{dsname}' is not a valid dataset name"
            )));
        }
    }

    let checked = check_inputs(
        host,
        request.input2.as_deref(),
        &request.var1,
        &request.var2,
    )?;

    if let Some(active_file) = host.active_file()? {
        if same_file(&active_file, &request.outfile) {
            return Err(CartError::OutputIsActiveFile(request.outfile.clone()));
        }
    }

    let options = &request.options;
    std::fs::create_dir_all(&options.temp_dir)?;
    let mut names =
        NameAllocator::with_prefixes(&options.variable_prefix, &options.dataset_prefix);
    let counter = names.variable(&checked.defined);
    let temp_file = names.file(&options.temp_dir, CASE_FILE_EXTENSION);
    let reserved: Vec<String> = request.dsname.iter().cloned().collect();
    let temp_dataset = names.dataset(&*host, &reserved);
    let output_dataset = match &request.dsname {
        Some(name) => name.clone(),
        None => names.dataset(&*host, &[temp_dataset.clone()]),
    };

    info!(
        active = %checked.active,
        left_cases = checked.left_cases,
        right_cases = checked.right_cases,
        fused = checked.single_source(),
        "Replicating cases"
    );

    let left_sink = ReplicaSink::new(&request.outfile, checked.left.clone());
    let right_sink = ReplicaSink::new(&temp_file, checked.right.clone()).tagged();

    match &checked.input2 {
        None => host.submit(
            Directive::replicate(checked.left_cases)
                .counter(counter.as_str())
                .sink(left_sink)
                .sink(right_sink),
        )?,
        Some(input2) => {
            host.submit(Directive::replicate(checked.right_cases).sink(left_sink))?;
            host.submit(Directive::activate(input2.as_str()))?;
            host.submit(
                Directive::replicate(checked.left_cases)
                    .counter(counter.as_str())
                    .sink(right_sink),
            )?;
        }
    }

    info!(dataset = %temp_dataset, by = %counter, "Restoring replica order");
    host.submit_all(vec![
        Directive::get(&temp_file, temp_dataset.as_str()),
        Directive::sort_cases(counter.as_str()),
    ])?;

    info!(dataset = %output_dataset, "Merging replicas by position");
    host.submit_all(vec![
        Directive::get(&request.outfile, output_dataset.as_str()),
        Directive::match_files(temp_dataset.as_str(), vec![counter.clone()]),
        Directive::Execute,
        Directive::close(temp_dataset.as_str()),
        Directive::erase_file(&temp_file),
        Directive::save(&request.outfile),
        Directive::activate(output_dataset.as_str()),
    ])?;

    let cases = host
        .case_count()?
        .ok_or_else(|| CartError::CaseCountUnavailable(output_dataset.clone()))?;
    let variables = host.variables()?;

    info!(dataset = %output_dataset, cases, "Cartesian product complete");

    Ok(CartesianOutcome {
        dataset: output_dataset,
        outfile: request.outfile.clone(),
        left_cases: checked.left_cases,
        right_cases: checked.right_cases,
        cases,
        variables,
    })
}
