//! Pass diagnostic dump. Writes each stage's artifact to disk.
//!
//! Enabled when `AnalysisConfig.dump_dir` is set. Output:
//! ```text
//! {dump_dir}/{pass_id}/
//!   01-structure.json
//!   02-prompt.txt
//!   03-response.txt
//!   04-report.json
//! ```
//! Dump failures are logged and never affect the pass.

use std::path::{Path, PathBuf};

use serde::Serialize;

pub const STRUCTURE_FILE: &str = "01-structure.json";
pub const PROMPT_FILE: &str = "02-prompt.txt";
pub const RESPONSE_FILE: &str = "03-response.txt";
pub const REPORT_FILE: &str = "04-report.json";

/// Dump sink for one pass.
#[derive(Debug, Clone)]
pub struct PassDump {
    dir: PathBuf,
}

impl PassDump {
    /// Create `{base}/{pass_id}/`. `None` if dumping is off or the
    /// directory cannot be created.
    pub fn open(base: Option<&Path>, pass_id: &str) -> Option<Self> {
        let dir = base?.join(pass_id);

        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Diagnostic dump: failed to create directory"
            );
            return None;
        }

        Some(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn structure<T: Serialize>(&self, snapshot: &T) {
        dump_json(&self.dir, STRUCTURE_FILE, snapshot);
    }

    pub fn prompt(&self, prompt: &str) {
        dump_text(&self.dir, PROMPT_FILE, prompt);
    }

    pub fn response(&self, reply: &str) {
        dump_text(&self.dir, RESPONSE_FILE, reply);
    }

    pub fn report<T: Serialize>(&self, report: &T) {
        dump_json(&self.dir, REPORT_FILE, report);
    }
}

/// Write a JSON artifact, pretty-printed. Never panics.
pub fn dump_json<T: Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (prompt, raw reply). Never panics.
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    if let Err(e) = std::fs::write(&path, text.as_bytes()) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_base_dir() {
        assert!(PassDump::open(None, "pass-1").is_none());
    }

    #[test]
    fn open_creates_pass_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = PassDump::open(Some(tmp.path()), "pass-1").unwrap();
        assert!(dump.dir().is_dir());
        assert!(dump.dir().ends_with("pass-1"));
    }

    #[test]
    fn writes_stage_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = PassDump::open(Some(tmp.path()), "p").unwrap();

        dump.structure(&serde_json::json!({"units": []}));
        dump.prompt("Review this");
        dump.response("[]");

        let dir = tmp.path().join("p");
        let structure = std::fs::read_to_string(dir.join(STRUCTURE_FILE)).unwrap();
        assert!(structure.contains("\"units\": []"));
        assert_eq!(std::fs::read_to_string(dir.join(PROMPT_FILE)).unwrap(), "Review this");
        assert_eq!(std::fs::read_to_string(dir.join(RESPONSE_FILE)).unwrap(), "[]");
    }

    #[test]
    fn write_failures_do_not_panic() {
        let bad_dir = Path::new("/nonexistent/path/that/does/not/exist");
        dump_json(bad_dir, "x.json", &"data");
        dump_text(bad_dir, "x.txt", "data");
    }

    #[test]
    fn uncreatable_base_disables_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        assert!(PassDump::open(Some(&file), "p").is_none());
    }
}
