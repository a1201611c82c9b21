use std::fs;
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Opens `$EDITOR` (vim if unset) on a temp file seeded with `initial` and
/// returns whatever the user saved.
pub fn open_editor(initial: &str, question_id: &str) -> Result<String> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());

    let safe_id: String = question_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let tmp_file = std::env::temp_dir().join(format!(
        "quizsession_{}_{}.txt",
        std::process::id(),
        safe_id
    ));

    fs::write(&tmp_file, initial).context("cannot write temp file")?;

    let status = Command::new(&editor)
        .arg(&tmp_file)
        .status()
        .with_context(|| format!("cannot open editor '{}'", editor))?;

    if !status.success() {
        let _ = fs::remove_file(&tmp_file);
        bail!("editor exited with {}", status);
    }

    let result = fs::read_to_string(&tmp_file).context("cannot read editor result");
    let _ = fs::remove_file(&tmp_file);
    result
}
