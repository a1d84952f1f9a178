//! `${NAME}` placeholder substitution for step table names.

use super::workflow::WorkflowParameters;
use crate::error::{OrchestratorError, Result};

/// Replace every `${NAME}` in `input` with its parameter value
///
/// An unknown name or an unterminated placeholder is an error.
pub fn substitute_placeholders(input: &str, params: &WorkflowParameters) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            OrchestratorError::Catalog(format!("unterminated placeholder in '{input}'"))
        })?;
        let name = &after[..end];
        let value = params.get(name).ok_or_else(|| {
            OrchestratorError::Catalog(format!("unresolved placeholder ${{{name}}} in '{input}'"))
        })?;
        output.push_str(value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

/// Substitute every table name, then sort and de-duplicate the result
pub fn resolve_tables(tables: &[String], params: &WorkflowParameters) -> Result<Vec<String>> {
    let mut resolved = tables
        .iter()
        .map(|table| substitute_placeholders(table, params))
        .collect::<Result<Vec<_>>>()?;
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
}
