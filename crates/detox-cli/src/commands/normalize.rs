use std::path::{Path, PathBuf};

use anyhow::Context;

use detox_core::{merge_csv, Label};

/// Merge labeled CSV files into one `text,is_toxic` CSV with normalised labels.
pub fn run(inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    let merged = merge_csv(&refs, output)
        .with_context(|| format!("Failed to write normalised CSV to {}", output.display()))?;

    println!(
        "Wrote {} rows ({} toxic, {} non-toxic) from {} file(s) to {}",
        merged.len(),
        merged.count(Label::Toxic),
        merged.count(Label::NonToxic),
        inputs.len(),
        output.display()
    );
    Ok(())
}
