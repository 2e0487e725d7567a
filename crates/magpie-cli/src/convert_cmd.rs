//! `magpie convert` command: YAML to JSON.

use std::path::Path;

use anyhow::Result;

use magpie_core::convert::convert_file;

pub fn run(input: &Path, output: Option<&Path>, compact: bool) -> Result<()> {
    let (outcome, text) = convert_file(input, output, !compact)?;
    match (output, text) {
        (Some(path), _) => {
            println!(
                "Converted {} -> {} ({}, {} bytes)",
                input.display(),
                path.display(),
                outcome.data_type,
                outcome.size
            );
        }
        (None, Some(json)) => println!("{json}"),
        (None, None) => {}
    }
    Ok(())
}
