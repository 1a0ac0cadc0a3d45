//! Variable lists: case-insensitive lookup, `ALL` and `a TO b` expansion.

use std::sync::OnceLock;

use regex::Regex;
use strsim::normalized_levenshtein;

use crate::error::{CartError, CartResult, MissingVariable};

const KEYWORD_ALL: &str = "ALL";
const KEYWORD_TO: &str = "TO";

/// Result of expanding a variable list against a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Resolved names in the dataset's own spelling, without duplicates.
    pub names: Vec<String>,
    /// Requested names the dataset does not define, as typed.
    pub missing: Vec<String>,
}

pub fn position_of(name: &str, variables: &[String]) -> Option<usize> {
    let wanted = name.to_lowercase();
    variables
        .iter()
        .position(|candidate| candidate.to_lowercase() == wanted)
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z@#$][A-Za-z0-9_.@#$]*$").expect("valid variable name regex")
    })
}

pub fn is_valid_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Split every argument on whitespace so `"x1 TO x3"` and `["x1", "TO", "x3"]`
/// are equivalent.
pub fn tokens(spec: &[String]) -> Vec<String> {
    spec.iter()
        .flat_map(|arg| arg.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Names written literally in a list, keywords excluded.
pub fn literal_names(spec: &[String]) -> Vec<String> {
    tokens(spec)
        .into_iter()
        .filter(|token| !is_keyword(token))
        .collect()
}

fn is_keyword(token: &str) -> bool {
    token.eq_ignore_ascii_case(KEYWORD_ALL) || token.eq_ignore_ascii_case(KEYWORD_TO)
}

pub fn expand(spec: &[String], available: &[String]) -> CartResult<Expansion> {
    let tokens = tokens(spec);
    if tokens.is_empty() {
        return Err(CartError::InvalidVariableList(
            "the variable list is empty".to_string(),
        ));
    }

    let mut expansion = Expansion::default();
    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];

        if token.eq_ignore_ascii_case(KEYWORD_ALL) {
            for name in available {
                push_unique(&mut expansion.names, name);
            }
            idx += 1;
            continue;
        }

        if token.eq_ignore_ascii_case(KEYWORD_TO) {
            return Err(CartError::InvalidVariableList(format!(
                "'{KEYWORD_TO}' must follow a variable name"
            )));
        }

        if !is_valid_name(token) {
            return Err(CartError::InvalidVariableList(format!(
                "'{token}' is not a valid variable name"
            )));
        }

        let is_range = tokens
            .get(idx + 1)
            .is_some_and(|next| next.eq_ignore_ascii_case(KEYWORD_TO));
        if is_range {
            let end = tokens
                .get(idx + 2)
                .filter(|end| !is_keyword(end))
                .ok_or_else(|| {
                    CartError::InvalidVariableList(format!(
                        "'{token} {KEYWORD_TO}' is missing the end of the range"
                    ))
                })?;
            expand_range(token, end, available, &mut expansion)?;
            idx += 3;
            continue;
        }

        match position_of(token, available) {
            Some(pos) => push_unique(&mut expansion.names, &available[pos]),
            None => push_unique(&mut expansion.missing, token),
        }
        idx += 1;
    }

    Ok(expansion)
}

fn expand_range(
    start: &str,
    end: &str,
    available: &[String],
    expansion: &mut Expansion,
) -> CartResult<()> {
    let first = position_of(start, available);
    let last = position_of(end, available);

    match (first, last) {
        (Some(first), Some(last)) if first <= last => {
            for name in &available[first..=last] {
                push_unique(&mut expansion.names, name);
            }
            Ok(())
        }
        (Some(_), Some(_)) => Err(CartError::InvalidVariableList(format!(
            "'{start} {KEYWORD_TO} {end}': {start} comes after {end} in the dataset"
        ))),
        _ => {
            if first.is_none() {
                push_unique(&mut expansion.missing, start);
            }
            if last.is_none() {
                push_unique(&mut expansion.missing, end);
            }
            Ok(())
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if position_of(name, names).is_none() {
        names.push(name.to_string());
    }
}

/// Names present in both lists, compared case-insensitively, in `left` order.
pub fn overlap(left: &[String], right: &[String]) -> Vec<String> {
    let mut shared = Vec::new();
    for name in left {
        if position_of(name, right).is_some() {
            push_unique(&mut shared, &name.to_lowercase());
        }
    }
    shared
}

/// Closest defined variable, if one is similar enough to be a likely typo.
pub fn suggest(name: &str, available: &[String]) -> Option<String> {
    let wanted = name.to_lowercase();
    available
        .iter()
        .map(|candidate| {
            (
                candidate,
                normalized_levenshtein(&wanted, &candidate.to_lowercase()),
            )
        })
        .filter(|(_, score)| *score > 0.6)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(candidate, _)| candidate.clone())
}

pub fn describe_missing(missing: &[String], available: &[String]) -> Vec<MissingVariable> {
    missing
        .iter()
        .map(|name| MissingVariable {
            name: name.clone(),
            suggestion: suggest(name, available),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn resolves_names_case_insensitively_in_dataset_spelling() {
        let available = list(&["Age", "income"]);
        let expansion = expand(&list(&["age", "INCOME"]), &available).unwrap();
        assert_eq!(expansion.names, list(&["Age", "income"]));
        assert!(expansion.missing.is_empty());
    }

    #[test]
    fn expands_all_and_ranges_in_dataset_order() {
        let available = list(&["id", "x1", "x2", "x3", "y"]);

        let all = expand(&list(&["all"]), &available).unwrap();
        assert_eq!(all.names, available);

        let range = expand(&list(&["x1 to x3", "id"]), &available).unwrap();
        assert_eq!(range.names, list(&["x1", "x2", "x3", "id"]));
    }

    #[test]
    fn collects_missing_range_endpoints() {
        let available = list(&["x1", "x2"]);
        let expansion = expand(&list(&["x1", "TO", "x9", "q"]), &available).unwrap();
        assert!(expansion.names.is_empty());
        assert_eq!(expansion.missing, list(&["x9", "q"]));
    }

    #[test]
    fn rejects_malformed_lists() {
        let available = list(&["a", "b"]);
        for spec in [
            list(&[]),
            list(&["TO", "b"]),
            list(&["a", "TO"]),
            list(&["b", "TO", "a"]),
            list(&["1abc"]),
        ] {
            let err = expand(&spec, &available).unwrap_err();
            assert!(
                matches!(err, CartError::InvalidVariableList(_)),
                "{spec:?} gave {err}"
            );
        }
    }

    #[test]
    fn overlap_ignores_case() {
        assert_eq!(
            overlap(&list(&["A", "b", "c"]), &list(&["B", "a"])),
            list(&["a", "b"])
        );
        assert!(overlap(&list(&["a"]), &list(&["b"])).is_empty());
    }

    #[test]
    fn suggests_close_names_only() {
        let available = list(&["income", "age"]);
        assert_eq!(suggest("incme", &available), Some("income".to_string()));
        assert_eq!(suggest("zzz", &available), None);
    }
}
