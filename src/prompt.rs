use std::io::{BufRead, Write};

use crate::error::DexError;

pub const INVALID_ANSWER: &str = "Invalid input. Please enter 'y' or 'n'.";

/// Asks `question` until the answer is y/yes or n/no, case-insensitively.
///
/// End of input counts as "no".
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<bool, DexError> {
    loop {
        write!(output, "{question} [y/n]: ").map_err(|err| DexError::Prompt(err.to_string()))?;
        output
            .flush()
            .map_err(|err| DexError::Prompt(err.to_string()))?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|err| DexError::Prompt(err.to_string()))?;
        if read == 0 {
            return Ok(false);
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "{INVALID_ANSWER}")
                .map_err(|err| DexError::Prompt(err.to_string()))?,
        }
    }
}
