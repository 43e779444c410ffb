//! Guards against API keys being committed to the workspace.

use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

const SKIPPED_DIRS: &[&str] = &["target", ".git", "examples", "node_modules", "tmp"];
const SCANNED_EXTENSIONS: &[&str] = &["rs", "toml", "md", "sql", "env"];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")))
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn key_patterns() -> Vec<(&'static str, Regex)> {
    vec![
        ("ElevenLabs key", Regex::new(r"sk_[0-9a-f]{32,}").unwrap()),
        ("Google API key", Regex::new(r"AIza[0-9A-Za-z_\-]{35}").unwrap()),
        (
            "inline key assignment",
            Regex::new(r#"(?i)(api[_-]?key|xi-api-key)\s*[:=]\s*"[A-Za-z0-9_\-]{24,}""#).unwrap(),
        ),
    ]
}

#[test]
fn no_api_key_literals_in_workspace() {
    let root = workspace_root();
    let patterns = key_patterns();
    let mut findings = Vec::new();
    let mut scanned = 0usize;

    for entry in WalkDir::new(&root)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let scan = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCANNED_EXTENSIONS.contains(&ext))
            || path.file_name().and_then(|n| n.to_str()) == Some(".env.example");
        if !scan {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        scanned += 1;

        for (line_no, line) in content.lines().enumerate() {
            for (label, pattern) in &patterns {
                if pattern.is_match(line) {
                    findings.push(format!(
                        "{}:{}: {}",
                        path.strip_prefix(&root).unwrap_or(path).display(),
                        line_no + 1,
                        label
                    ));
                }
            }
        }
    }

    assert!(scanned > 0, "no files scanned under {}", root.display());
    assert!(
        findings.is_empty(),
        "API key literals found:\n{}",
        findings.join("\n")
    );
}

#[test]
fn patterns_catch_known_key_shapes() {
    let patterns = key_patterns();
    let fake_eleven = format!("sk_{}", "0123456789abcdef".repeat(3));
    let fake_assignment = format!("api_key = \"{}\"", "A1".repeat(16));

    assert!(patterns.iter().any(|(_, p)| p.is_match(&fake_eleven)));
    assert!(patterns.iter().any(|(_, p)| p.is_match(&fake_assignment)));
    assert!(!patterns.iter().any(|(_, p)| p.is_match("api_key = std::env::var(\"GEMINI_API_KEY\")")));
}
