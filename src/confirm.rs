use std::io::{BufRead, Write};

use anyhow::{Context, Result};

pub const CONTINUE_PROMPT: &str = "Do you want to continue with the merging process? (Y/n): ";

/// Asks the operator whether to go ahead. Blank input or `y` continues;
/// anything else, including end of input, aborts.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, prompt_out: &mut W, prompt: &str) -> Result<bool> {
    prompt_out
        .write_all(prompt.as_bytes())
        .and_then(|()| prompt_out.flush())
        .context("failed to write confirmation prompt")?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .context("failed to read confirmation answer")?;
    if read == 0 {
        return Ok(false);
    }

    Ok(matches!(answer.trim().to_lowercase().as_str(), "" | "y"))
}
