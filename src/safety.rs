//! Guards against overwriting pipeline inputs.
//!
//! Result windows are immutable once written and category link lists are
//! the raw discovery output; an aggregate written over either would lose
//! data that cannot be recomputed without re-crawling.

use anyhow::{bail, Result};
use std::path::Path;

use crate::models::WindowBounds;

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g. "unique", "all_chords")
/// - Output cannot be any of the inputs it is derived from
/// - Output cannot be a result window
pub fn validate_output_path(output: &Path, required_pattern: &str, inputs: &[&Path]) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for input in inputs {
        if output == *input {
            bail!(
                "Safety check failed: output '{}' is also an input",
                output.display()
            );
        }
    }

    if WindowBounds::parse_file_name(output_name).is_some() {
        bail!(
            "Safety check failed: output '{}' would overwrite a result window",
            output.display()
        );
    }

    Ok(())
}
