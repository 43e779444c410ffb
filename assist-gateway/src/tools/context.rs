use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use assist_db::SessionDbPool;
use assist_knowledge::UrlKnowledge;

/// Per-run state handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    session_id: String,
    sessions: Option<SessionDbPool>,
    knowledge: Option<Arc<UrlKnowledge>>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("sessions", &self.sessions.is_some())
            .field("knowledge", &self.knowledge.is_some())
            .finish()
    }
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sessions: None,
            knowledge: None,
        }
    }

    pub fn with_sessions(mut self, sessions: SessionDbPool) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<UrlKnowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sessions(&self) -> Option<&SessionDbPool> {
        self.sessions.as_ref()
    }

    pub fn knowledge(&self) -> Option<&Arc<UrlKnowledge>> {
        self.knowledge.as_ref()
    }

    pub fn new_for_tests() -> Self {
        Self::new("sess_test")
    }
}

/// Resolve `raw_path` against `base_dir`, refusing anything that lands outside it.
///
/// Symlinks are followed for the existing part of the path.
pub fn resolve_within(base_dir: &Path, raw_path: &str) -> Result<PathBuf, String> {
    let raw_path = raw_path.trim();
    if raw_path.is_empty() {
        return Err("file name must not be empty".to_string());
    }

    let input_path = Path::new(raw_path);
    let absolute = if input_path.is_absolute() {
        input_path.to_path_buf()
    } else {
        base_dir.join(input_path)
    };
    let normalized = normalize_absolute_path(&absolute);

    let inside = canonicalize_for_boundary_check(&normalized);
    let base = canonicalize_for_boundary_check(base_dir);
    if !inside.starts_with(&base) || inside == base {
        return Err(format!(
            "path '{}' is outside the tool directory {}",
            raw_path,
            base_dir.display()
        ));
    }

    Ok(normalized)
}

fn canonicalize_for_boundary_check(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    // For non-existent paths, resolve the nearest existing ancestor and
    // re-attach the unresolved suffix to keep checks symlink-aware.
    let mut suffix: Vec<std::ffi::OsString> = Vec::new();
    let mut probe = path;
    loop {
        if let Ok(canonical_ancestor) = std::fs::canonicalize(probe) {
            let mut rebuilt = canonical_ancestor;
            for part in suffix.iter().rev() {
                rebuilt.push(part);
            }
            return rebuilt;
        }

        let Some(file_name) = probe.file_name() else {
            break;
        };
        suffix.push(file_name.to_os_string());

        let Some(parent) = probe.parent() else {
            break;
        };
        probe = parent;
    }

    normalize_absolute_path(path)
}

fn normalize_absolute_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    let mut has_root = false;
    let mut stack: Vec<std::ffi::OsString> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                stack.clear();
                stack.push(prefix.as_os_str().to_os_string());
            }
            Component::RootDir => has_root = true,
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop();
            }
            Component::Normal(part) => stack.push(part.to_os_string()),
        }
    }

    if has_root {
        normalized.push(Path::new("/"));
    }
    for part in stack {
        normalized.push(part);
    }
    normalized
}
