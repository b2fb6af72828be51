//! Schema definitions are append-only: the engine is the source of truth for
//! `definition`/`relation` blocks, and this kernel is only ever allowed to add
//! new ones, never remove or rename an existing block, since live
//! relationships may still reference it.

use crate::error::AppError;

/// Parses top-level `definition <name> { ... }` blocks out of schema text,
/// returning their names. Good enough for an append-only diff; it does not
/// need to understand the body grammar.
fn definition_names(schema_text: &str) -> Vec<String> {
    schema_text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("definition ")
                .and_then(|rest| rest.split_whitespace().next())
                .map(|name| name.trim_end_matches('{').to_string())
        })
        .collect()
}

/// Returns `Ok(())` if `proposed` is a strict superset of `current`'s
/// definitions, `Err` otherwise.
pub fn assert_append_only(current: &str, proposed: &str) -> Result<(), AppError> {
    let current_defs = definition_names(current);
    let proposed_defs = definition_names(proposed);

    let missing: Vec<&String> = current_defs
        .iter()
        .filter(|name| !proposed_defs.contains(name))
        .collect();

    if !missing.is_empty() {
        return Err(AppError::BusinessRule(format!(
            "schema update would remove existing definitions: {missing:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_removed_definition() {
        let current = "definition user {}\ndefinition workplace {}\n";
        let proposed = "definition user {}\n";
        assert!(assert_append_only(current, proposed).is_err());
    }

    #[test]
    fn allows_pure_additions() {
        let current = "definition user {}\n";
        let proposed = "definition user {}\ndefinition workplace {}\n";
        assert!(assert_append_only(current, proposed).is_ok());
    }

    #[test]
    fn allows_identical_schema() {
        let current = "definition user {}\n";
        assert!(assert_append_only(current, current).is_ok());
    }
}
