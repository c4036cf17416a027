//! Sequential `{prefix}-N` container names.
//!
//! Collect numbers already used in the database, merge in numbers observed
//! live from the runtime (catching containers that exist in Docker but were
//! never persisted), and hand back `{prefix}-{max+1}`. A runtime failure
//! degrades to DB-only numbering rather than failing the caller.

use regex::Regex;
use tracing::warn;

use crate::persistence::Repo;
use crate::runtime::RuntimeOps;

pub async fn next_name(repo: &Repo, runtime: &dyn RuntimeOps, prefix: &str) -> String {
    let pattern = Regex::new(&format!("^{}-(\\d+)$", regex::escape(prefix)))
        .expect("prefix-derived pattern is always valid");

    let mut numbers: Vec<u64> = Vec::new();

    match repo.container_names_with_prefix(prefix).await {
        Ok(names) => extract_numbers(&pattern, names.iter().map(String::as_str), &mut numbers),
        Err(e) => warn!(error = %e, "failed to query existing container names from database"),
    }

    match runtime.list_all().await {
        Ok(containers) => {
            extract_numbers(&pattern, containers.iter().map(|c| c.name.as_str()), &mut numbers)
        }
        Err(e) => warn!(error = %e, "failed to list containers from runtime, using database-only numbering"),
    }

    let next = numbers.into_iter().max().map(|n| n + 1).unwrap_or(1);
    format!("{prefix}-{next}")
}

fn extract_numbers<'a>(
    pattern: &Regex,
    names: impl Iterator<Item = &'a str>,
    out: &mut Vec<u64>,
) {
    for name in names {
        if let Some(caps) = pattern.captures(name) {
            if let Ok(n) = caps[1].parse::<u64>() {
                out.push(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_numbers_and_ignores_others() {
        let pattern = Regex::new("^engine-(\\d+)$").unwrap();
        let mut numbers = Vec::new();
        extract_numbers(
            &pattern,
            ["engine-1", "engine-7", "engine-x", "other-3", "engine-07"].into_iter(),
            &mut numbers,
        );
        assert_eq!(numbers, vec![1, 7, 7]);
    }

    #[test]
    fn prefix_is_escaped_for_regex_metacharacters() {
        let pattern = Regex::new(&format!("^{}-(\\d+)$", regex::escape("a.b"))).unwrap();
        assert!(pattern.is_match("a.b-3"));
        assert!(!pattern.is_match("axb-3"));
    }
}
