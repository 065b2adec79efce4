//! Yes/no confirmation before destructive operations

use std::io::{self, BufRead, Write};

use crate::error::{SkillvaultError, SkillvaultResult};

/// Asks the operator to approve an action
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> SkillvaultResult<bool>;
}

/// Prompts on stderr and reads a line from stdin; anything but y/yes declines
#[derive(Debug, Clone, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> SkillvaultResult<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{} [y/N] ", prompt)?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| SkillvaultError::Io(format!("Failed to read confirmation: {}", e)))?;
        Ok(is_yes(&line))
    }
}

/// Always gives the same answer (`--yes`, non-interactive runs, tests)
#[derive(Debug, Clone, Copy)]
pub struct AssumeAnswer(pub bool);

impl Confirm for AssumeAnswer {
    fn confirm(&self, _prompt: &str) -> SkillvaultResult<bool> {
        Ok(self.0)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes("  YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_assume_answer() {
        assert!(AssumeAnswer(true).confirm("go?").unwrap());
        assert!(!AssumeAnswer(false).confirm("go?").unwrap());
    }
}
