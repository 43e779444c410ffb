//! Python file tools: write scripts into a sandbox directory and run them.
//!
//! Every path is resolved inside the configured base directory. Scripts run
//! with that directory as working directory and are killed on timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use assist_core::PythonToolSettings;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, info};

use crate::tools::context::resolve_within;
use crate::tools::{Tool, ToolContext};

const RESULT_MARKER: &str = "__assist_result__:";
const MISSING_MARKER: &str = "__assist_missing__";

/// Loads a script as `__main__` and prints the requested variable after it.
const RUNNER: &str = r#"import runpy, sys
_path, _var = sys.argv[1], sys.argv[2]
_ns = runpy.run_path(_path, run_name="__main__")
if _var:
    if _var in _ns:
        print("\n__assist_result__:" + str(_ns[_var]))
    else:
        print("\n__assist_missing__")
"#;

/// Shared settings of the python tools.
#[derive(Debug, Clone)]
pub struct PythonToolkit {
    base_dir: PathBuf,
    interpreter: String,
    timeout: Duration,
}

impl PythonToolkit {
    pub fn new(base_dir: impl Into<PathBuf>, settings: &PythonToolSettings) -> Self {
        Self {
            base_dir: base_dir.into(),
            interpreter: settings.interpreter.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds.max(1)),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, String> {
        resolve_within(&self.base_dir, file_name)
    }

    /// Run `path` and report the value of `variable`, or a success note.
    async fn run_file(&self, path: &Path, variable: Option<&str>) -> Result<String, String> {
        let variable = variable.map(str::trim).unwrap_or_default();
        info!(file = %path.display(), variable, "running python file");

        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(RUNNER)
            .arg(path)
            .arg(variable)
            .current_dir(&self.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                format!(
                    "Error running file: timed out after {}s",
                    self.timeout.as_secs()
                )
            })?
            .map_err(|e| format!("Error running file: could not start {}: {}", self.interpreter, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(status = ?output.status, stdout_len = stdout.len(), "python finished");

        if !output.status.success() {
            let detail = stderr.trim();
            return Err(format!(
                "Error running file: {}",
                if detail.is_empty() { stdout.trim() } else { detail }
            ));
        }

        Ok(interpret_output(&stdout, variable, path))
    }
}

fn interpret_output(stdout: &str, variable: &str, path: &Path) -> String {
    if variable.is_empty() {
        return format!("successfully ran {}", path.display());
    }

    match stdout.rfind(RESULT_MARKER) {
        Some(pos) => stdout[pos + RESULT_MARKER.len()..]
            .trim_end_matches('\n')
            .to_string(),
        None if stdout.contains(MISSING_MARKER) => format!("Variable {} not found", variable),
        None => format!("successfully ran {}", path.display()),
    }
}

#[derive(Debug, Deserialize)]
struct SaveAndRunInput {
    file_name: String,
    code: String,
    variable_to_return: Option<String>,
    #[serde(default = "default_overwrite")]
    overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

pub struct SaveToFileAndRunTool {
    toolkit: Arc<PythonToolkit>,
}

impl SaveToFileAndRunTool {
    pub fn new(toolkit: Arc<PythonToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for SaveToFileAndRunTool {
    fn name(&self) -> &str {
        "save_to_file_and_run"
    }

    fn description(&self) -> &str {
        "Save python code to a file in the working directory, run it, and return the value of \
         `variable_to_return` if given, otherwise a success message."
    }

    fn prompt(&self) -> Option<&'static str> {
        Some(
            "To run python, save the complete program with `save_to_file_and_run` and return \
             the variable holding the result. Files live in a private working directory.",
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "File name relative to the working directory, e.g. agent.py."},
                "code": {"type": "string", "description": "Complete python source."},
                "variable_to_return": {"type": "string", "description": "Variable whose value is returned after the run."},
                "overwrite": {"type": "boolean", "description": "Replace an existing file (default true)."}
            },
            "required": ["file_name", "code"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let input: SaveAndRunInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let path = self.toolkit.resolve(&input.file_name)?;

        if !input.overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(format!("File {} already exists", input.file_name));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Error saving file: {}", e))?;
        }
        tokio::fs::write(&path, &input.code)
            .await
            .map_err(|e| format!("Error saving file: {}", e))?;
        info!(file = %path.display(), bytes = input.code.len(), "saved python file");

        self.toolkit
            .run_file(&path, input.variable_to_return.as_deref())
            .await
    }
}

#[derive(Debug, Deserialize)]
struct RunFileInput {
    file_name: String,
    variable_to_return: Option<String>,
}

pub struct RunPythonFileTool {
    toolkit: Arc<PythonToolkit>,
}

impl RunPythonFileTool {
    pub fn new(toolkit: Arc<PythonToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for RunPythonFileTool {
    fn name(&self) -> &str {
        "run_python_file_return_variable"
    }

    fn description(&self) -> &str {
        "Run an existing python file from the working directory and return the value of \
         `variable_to_return` if given."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "File name relative to the working directory."},
                "variable_to_return": {"type": "string", "description": "Variable whose value is returned after the run."}
            },
            "required": ["file_name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let input: RunFileInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let path = self.toolkit.resolve(&input.file_name)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(format!("File {} not found", input.file_name));
        }
        self.toolkit
            .run_file(&path, input.variable_to_return.as_deref())
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    file_name: String,
}

pub struct ReadFileTool {
    toolkit: Arc<PythonToolkit>,
}

impl ReadFileTool {
    pub fn new(toolkit: Arc<PythonToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the working directory and return its contents."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "File name relative to the working directory."}
            },
            "required": ["file_name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let input: ReadFileInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let path = self.toolkit.resolve(&input.file_name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Error reading file {}: {}", input.file_name, e))
    }
}

pub struct ListFilesTool {
    toolkit: Arc<PythonToolkit>,
}

impl ListFilesTool {
    pub fn new(toolkit: Arc<PythonToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files in the working directory."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let mut entries = tokio::fs::read_dir(self.toolkit.base_dir())
            .await
            .map_err(|e| format!("Error listing files: {}", e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("Error listing files: {}", e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        serde_json::to_string(&names).map_err(|e| e.to_string())
    }
}
