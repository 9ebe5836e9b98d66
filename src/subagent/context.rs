//! Static task context for a job application: the applicant profile and the
//! resume text. Loading never fails; missing pieces become placeholders the
//! model can read.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::process::run_blocking;

const PDFTOTEXT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one extraction strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Text(String),
    Unavailable(String),
}

type Strategy = fn(&Path) -> Extracted;

/// Tried in order; the first one producing text wins.
const STRATEGIES: &[(&str, Strategy)] = &[("pdftotext", pdftotext)];

/// Best-effort plain text of the resume at `path`.
pub fn resume_text(path: &Path) -> String {
    match extract(path, STRATEGIES) {
        Extracted::Text(text) => text,
        Extracted::Unavailable(_) if path.is_file() => format!(
            "[Resume PDF exists at {} but text extraction is unavailable. Use the file for uploads.]",
            path.display()
        ),
        Extracted::Unavailable(_) => {
            "[No resume file found. Ask the user to provide their details or upload a resume.]"
                .to_string()
        }
    }
}

pub fn load_profile(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => "[No profile.md found. Use resume content only.]".to_string(),
    }
}

fn extract(path: &Path, strategies: &[(&str, Strategy)]) -> Extracted {
    let mut last = Extracted::Unavailable("no strategies".to_string());
    for (name, strategy) in strategies {
        match strategy(path) {
            Extracted::Text(text) => return Extracted::Text(text),
            Extracted::Unavailable(reason) => {
                debug!(strategy = name, %reason, "resume extraction unavailable");
                last = Extracted::Unavailable(reason);
            }
        }
    }
    last
}

/// Count the lines of extractable text, if any strategy yields some.
pub fn line_count(path: &Path) -> Option<usize> {
    match extract(path, STRATEGIES) {
        Extracted::Text(text) => Some(text.lines().count()),
        Extracted::Unavailable(_) => None,
    }
}

fn pdftotext(path: &Path) -> Extracted {
    if !path.is_file() {
        return Extracted::Unavailable("file missing".to_string());
    }
    let mut command = Command::new("pdftotext");
    command.arg(path).arg("-");
    match run_blocking(command, PDFTOTEXT_TIMEOUT) {
        Ok(Some(done)) if done.status.success() && !done.stdout.trim().is_empty() => {
            Extracted::Text(done.stdout.trim().to_string())
        }
        Ok(Some(done)) => Extracted::Unavailable(format!("pdftotext exited with {}", done.status)),
        Ok(None) => Extracted::Unavailable("pdftotext timed out".to_string()),
        Err(e) => Extracted::Unavailable(format!("pdftotext not runnable: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: &Path) -> Extracted {
        Extracted::Unavailable("never".into())
    }

    fn always(_: &Path) -> Extracted {
        Extracted::Text("found".into())
    }

    fn unreachable_strategy(_: &Path) -> Extracted {
        panic!("should have short-circuited")
    }

    #[test]
    fn first_success_short_circuits() {
        let strategies: [(&str, Strategy); 3] =
            [("a", never), ("b", always), ("c", unreachable_strategy)];
        let out = extract(Path::new("/x"), &strategies);
        assert_eq!(out, Extracted::Text("found".into()));
    }

    #[test]
    fn reports_last_unavailable_reason() {
        let strategies: [(&str, Strategy); 1] = [("a", never)];
        let out = extract(Path::new("/x"), &strategies);
        assert_eq!(out, Extracted::Unavailable("never".into()));
    }

    #[test]
    fn missing_resume_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let text = resume_text(&dir.path().join("resume.pdf"));
        assert!(text.starts_with("[No resume file found"));
    }

    #[test]
    fn unreadable_pdf_yields_exists_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();
        let text = resume_text(&path);
        assert!(text.starts_with("[Resume PDF exists at"), "{text}");
    }

    #[test]
    fn text_files_beside_the_pdf_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();
        std::fs::write(dir.path().join("resume.txt"), "OLD RESUME TEXT
").unwrap();
        assert!(!resume_text(&path).contains("OLD RESUME TEXT"));
        assert_eq!(line_count(&path), None);
    }

    #[test]
    fn profile_falls_back_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_profile(&dir.path().join("profile.md")).starts_with("[No profile.md"));

        let path = dir.path().join("profile.md");
        std::fs::write(&path, "  Name: Jane\n").unwrap();
        assert_eq!(load_profile(&path), "Name: Jane");
    }
}
