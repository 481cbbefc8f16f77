//! Percent extraction from process output lines.
//!
//! External tools report progress in their own dialects; the scanner turns
//! matching lines into 0-100 percents. A plan operation can set an explicit
//! pattern (first capture group is the percent), otherwise the kind default
//! applies.

use regex::Regex;

use crate::plan::{Operation, OperationKind};

/// Default pattern per operation kind.
fn default_pattern(kind: OperationKind) -> &'static str {
    match kind {
        // git reports several counted phases; the last two dominate
        OperationKind::RepositoryClone => {
            r"(?:Receiving objects|Resolving deltas|Checking out files):\s+(\d{1,3})%"
        }
        OperationKind::DependencyInstall
        | OperationKind::ProjectBuild
        | OperationKind::ContainerImageBuild
        | OperationKind::Download
        | OperationKind::EnvironmentSetup
        | OperationKind::CustomScript => r"\b(\d{1,3})(?:\.\d+)?%",
    }
}

/// Compiled per-operation line scanner.
#[derive(Debug)]
pub struct ProgressScanner {
    regex: Regex,
}

impl ProgressScanner {
    /// Scanner for an operation: its explicit pattern, else the kind
    /// default. Returns `None` only for an invalid explicit pattern, which
    /// plan validation already rejects.
    pub fn for_operation(op: &Operation) -> Option<Self> {
        let pattern = op
            .progress_pattern
            .as_deref()
            .unwrap_or_else(|| default_pattern(op.kind));
        Regex::new(pattern).ok().map(|regex| Self { regex })
    }

    /// Extract a percent from one line, clamped to 100. The last match on
    /// the line wins, so carriage-return progress spam resolves to the most
    /// recent value.
    pub fn scan(&self, line: &str) -> Option<u8> {
        let mut latest = None;
        for caps in self.regex.captures_iter(line) {
            let text = caps.get(1).or_else(|| caps.get(0))?.as_str();
            if let Ok(value) = text.trim_end_matches('%').parse::<u16>() {
                latest = Some(value.min(100) as u8);
            }
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(kind: OperationKind) -> ProgressScanner {
        let op = Operation::new("x", kind, "x", vec![]).with_command("true", vec![]);
        ProgressScanner::for_operation(&op).unwrap()
    }

    #[test]
    fn test_git_clone_phases() {
        let s = scanner(OperationKind::RepositoryClone);
        assert_eq!(
            s.scan("Receiving objects:  42% (840/2000), 1.2 MiB | 2.4 MiB/s"),
            Some(42)
        );
        assert_eq!(s.scan("Resolving deltas: 100% (500/500), done."), Some(100));
        assert_eq!(s.scan("remote: Enumerating objects: 2000, done."), None);
    }

    #[test]
    fn test_generic_percent() {
        let s = scanner(OperationKind::Download);
        assert_eq!(s.scan("downloaded 37% of 120MB"), Some(37));
        assert_eq!(s.scan("Step 3/7 : RUN npm ci"), None);
    }

    #[test]
    fn test_last_match_on_line_wins() {
        let s = scanner(OperationKind::Download);
        assert_eq!(s.scan("10%... 20%... 30%"), Some(30));
    }

    #[test]
    fn test_values_above_100_clamp() {
        let s = scanner(OperationKind::Download);
        assert_eq!(s.scan("rate 250% of baseline"), Some(100));
    }

    #[test]
    fn test_fractional_percent() {
        let s = scanner(OperationKind::ContainerImageBuild);
        assert_eq!(s.scan("extracting: 57.3%"), Some(57));
    }

    #[test]
    fn test_explicit_pattern_overrides_default() {
        let mut op = Operation::new("x", OperationKind::CustomScript, "x", vec![])
            .with_command("true", vec![]);
        op.progress_pattern = Some(r"progress=(\d+)".to_string());
        let s = ProgressScanner::for_operation(&op).unwrap();

        assert_eq!(s.scan("progress=66"), Some(66));
        assert_eq!(s.scan("66% done"), None);
    }
}
