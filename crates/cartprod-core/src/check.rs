use tracing::debug;

use crate::directive::Directive;
use crate::error::{CartError, CartResult, Side};
use crate::host::Host;
use crate::varlist::{describe_missing, expand, literal_names, overlap};

/// Validated inputs for one cartesian product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedInputs {
    /// Name of the active dataset, which supplies the left-hand variables.
    pub active: String,
    /// Dataset supplying the right-hand variables when it is not the active one.
    pub input2: Option<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub left_cases: usize,
    pub right_cases: usize,
    /// Every variable defined by either source dataset, listed or not.
    pub defined: Vec<String>,
}

impl CheckedInputs {
    /// Both variable sets come from the active dataset.
    pub fn single_source(&self) -> bool {
        self.input2.is_none()
    }
}

/// Check dataset and variable preconditions and resolve both case counts.
///
/// Fails when the active dataset is unnamed, when the lists share a name, or
/// when either list names a variable its dataset does not define. A dataset
/// whose case count is unknown gets a forced data pass. If `input2` is
/// inspected, the originally active dataset is active again on return, also
/// when validation fails.
pub fn check_inputs<H: Host + ?Sized>(
    host: &mut H,
    input2: Option<&str>,
    var1: &[String],
    var2: &[String],
) -> CartResult<CheckedInputs> {
    let active = host.active_name()?.ok_or(CartError::UnnamedActiveDataset)?;

    ensure_disjoint(&literal_names(var1), &literal_names(var2))?;

    let left_available = host.variables()?;
    let left = resolve(var1, &left_available, Side::Left)?;
    let left_cases = known_case_count(host, &active)?;

    let input2 = input2.filter(|name| !name.eq_ignore_ascii_case(&active));

    let mut defined = left_available.clone();
    let (right, right_cases) = match input2 {
        Some(name) => {
            host.submit(Directive::activate(name))?;
            let inspected = inspect_right(host, name, var2);
            host.submit(Directive::activate(active.as_str()))?;
            let (right, right_cases, right_available) = inspected?;
            defined.extend(right_available);
            (right, right_cases)
        }
        None => (resolve(var2, &left_available, Side::Right)?, left_cases),
    };

    ensure_disjoint(&left, &right)?;

    debug!(
        active = %active,
        input2 = ?input2,
        left_cases,
        right_cases,
        "Validated cartesian product inputs"
    );

    Ok(CheckedInputs {
        active,
        input2: input2.map(str::to_string),
        left,
        right,
        left_cases,
        right_cases,
        defined,
    })
}

fn inspect_right<H: Host + ?Sized>(
    host: &mut H,
    name: &str,
    var2: &[String],
) -> CartResult<(Vec<String>, usize, Vec<String>)> {
    let available = host.variables()?;
    let right = resolve(var2, &available, Side::Right)?;
    let cases = known_case_count(host, name)?;
    Ok((right, cases, available))
}

fn resolve(spec: &[String], available: &[String], side: Side) -> CartResult<Vec<String>> {
    let expansion = expand(spec, available)?;
    if !expansion.missing.is_empty() {
        return Err(CartError::UndefinedVariables {
            side,
            missing: describe_missing(&expansion.missing, available),
        });
    }
    Ok(expansion.names)
}

fn ensure_disjoint(left: &[String], right: &[String]) -> CartResult<()> {
    let shared = overlap(left, right);
    if shared.is_empty() {
        Ok(())
    } else {
        Err(CartError::OverlappingVariables { names: shared })
    }
}

fn known_case_count<H: Host + ?Sized>(host: &mut H, dataset: &str) -> CartResult<usize> {
    if let Some(count) = host.case_count()? {
        return Ok(count);
    }
    host.submit(Directive::Execute)?;
    host.case_count()?
        .ok_or_else(|| CartError::CaseCountUnavailable(dataset.to_string()))
}
