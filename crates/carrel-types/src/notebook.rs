//! Structural notebook validation.
//!
//! A notebook is a JSON object with an `nbformat` major version of at
//! least 4, an `nbformat_minor`, a `metadata` object, and a `cells`
//! array whose entries each carry a `cell_type` and a `source`. This is
//! a shape check, not a schema check: cell-level metadata and outputs
//! pass through untouched.

use serde_json::Value;

use crate::error::{ContentsError, ContentsResult};

/// File extension that marks a path as a notebook document.
pub const NOTEBOOK_EXTENSION: &str = ".ipynb";

/// Minimum supported major notebook format version.
pub const MIN_NBFORMAT: i64 = 4;

/// True when the path names a notebook document.
pub fn is_notebook_path(path: &str) -> bool {
    path.ends_with(NOTEBOOK_EXTENSION)
}

/// Validate notebook structure, failing with `InvalidNotebook`.
pub fn validate_notebook(nb: &Value) -> ContentsResult<()> {
    let obj = nb
        .as_object()
        .ok_or_else(|| ContentsError::invalid_notebook("top level is not an object"))?;

    match obj.get("nbformat").and_then(Value::as_i64) {
        Some(v) if v >= MIN_NBFORMAT => {}
        Some(v) => {
            return Err(ContentsError::invalid_notebook(format!(
                "unsupported nbformat {v}, need >= {MIN_NBFORMAT}"
            )));
        }
        None => {
            return Err(ContentsError::invalid_notebook(
                "missing integer field 'nbformat'",
            ));
        }
    }

    if obj.get("nbformat_minor").and_then(Value::as_i64).is_none() {
        return Err(ContentsError::invalid_notebook(
            "missing integer field 'nbformat_minor'",
        ));
    }

    if !obj.get("metadata").is_some_and(Value::is_object) {
        return Err(ContentsError::invalid_notebook(
            "missing object field 'metadata'",
        ));
    }

    let cells = obj
        .get("cells")
        .and_then(Value::as_array)
        .ok_or_else(|| ContentsError::invalid_notebook("missing array field 'cells'"))?;

    for (idx, cell) in cells.iter().enumerate() {
        let cell = cell.as_object().ok_or_else(|| {
            ContentsError::invalid_notebook(format!("cell {idx} is not an object"))
        })?;
        if !cell.get("cell_type").is_some_and(Value::is_string) {
            return Err(ContentsError::invalid_notebook(format!(
                "cell {idx} missing string field 'cell_type'"
            )));
        }
        let source_ok = match cell.get("source") {
            Some(Value::String(_)) => true,
            Some(Value::Array(lines)) => lines.iter().all(Value::is_string),
            _ => false,
        };
        if !source_ok {
            return Err(ContentsError::invalid_notebook(format!(
                "cell {idx} missing string-or-lines field 'source'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "nbformat": 4,
            "nbformat_minor": 5,
            "metadata": {},
            "cells": [
                {"cell_type": "code", "source": "print(1)", "outputs": []},
                {"cell_type": "markdown", "source": ["# title\n", "body"]}
            ]
        })
    }

    #[test]
    fn accepts_minimal_notebook() {
        validate_notebook(&minimal()).unwrap();
    }

    #[test]
    fn accepts_empty_cells() {
        let nb = json!({"nbformat": 4, "nbformat_minor": 0, "metadata": {}, "cells": []});
        validate_notebook(&nb).unwrap();
    }

    #[test]
    fn rejects_old_format() {
        let mut nb = minimal();
        nb["nbformat"] = json!(3);
        let err = validate_notebook(&nb).unwrap_err();
        assert!(matches!(err, ContentsError::InvalidNotebook(_)));
    }

    #[test]
    fn rejects_missing_fields() {
        for field in ["nbformat", "nbformat_minor", "metadata", "cells"] {
            let mut nb = minimal();
            nb.as_object_mut().unwrap().remove(field);
            assert!(
                validate_notebook(&nb).is_err(),
                "expected rejection without {field}"
            );
        }
    }

    #[test]
    fn rejects_malformed_cells() {
        let mut nb = minimal();
        nb["cells"][0] = json!("not a cell");
        assert!(validate_notebook(&nb).is_err());

        let mut nb = minimal();
        nb["cells"][1]["source"] = json!(42);
        assert!(validate_notebook(&nb).is_err());
    }

    #[test]
    fn notebook_path_detection() {
        assert!(is_notebook_path("work/analysis.ipynb"));
        assert!(!is_notebook_path("work/analysis.txt"));
        assert!(!is_notebook_path("ipynb"));
    }
}
