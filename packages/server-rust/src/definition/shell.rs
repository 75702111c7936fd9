//! Built-in definition running a shell script per execution.
//!
//! Each execution gets a work directory under `workdirRoot`. The script runs
//! there with the configured environment plus:
//!
//! - `PROCESSING_EXECUTION_ID`
//! - `PROCESSING_WORKDIR`
//! - `PROCESSING_INPUT_URLS`: input file urls, one per line
//! - `PROCESSING_PARAM_<NAME>`: each batch parameter, name upper-cased

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use processing_core::{DataType, DurationForecast, ExecutionParameterDescriptor, SizeForecast};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::executable::{Executable, Stages};
use super::{PluginConfiguration, ProcessDefinition};
use crate::engine::{ExecutionContext, LOCAL_ENGINE_NAME};

/// Plugin id of [`ShellProcessDefinition`].
pub const SHELL_PLUGIN_ID: &str = "SimpleShellProcess";

/// Parameters read from the plugin configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShellParameters {
    shell_script: String,
    /// `KEY1=value1&KEY2=value2`
    #[serde(default)]
    env_variables: Option<String>,
    /// Comma-separated data type names.
    #[serde(default = "default_required_data_types")]
    required_data_types: String,
    #[serde(default)]
    size_forecast: SizeForecast,
    #[serde(default)]
    duration_forecast: DurationForecast,
    #[serde(default = "default_engine")]
    engine: String,
    #[serde(default)]
    workdir_root: Option<PathBuf>,
}

fn default_required_data_types() -> String {
    DataType::Rawdata.as_str().to_string()
}

fn default_engine() -> String {
    LOCAL_ENGINE_NAME.to_string()
}

/// Parses `KEY=value` pairs separated by `&`. Malformed pairs are skipped.
fn parse_env_variables(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parses a comma-separated data type list. Unknown names are skipped.
fn parse_data_types(raw: &str) -> Vec<DataType> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(data_type) => Some(data_type),
            Err(err) => {
                warn!(error = %err, "ignoring unknown required data type");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ShellProcessDefinition
// ---------------------------------------------------------------------------

/// Process definition that launches a configured shell script.
pub struct ShellProcessDefinition {
    required_data_types: Vec<DataType>,
    size_forecast: SizeForecast,
    duration_forecast: DurationForecast,
    engine: String,
    executable: Arc<dyn Executable>,
}

impl ShellProcessDefinition {
    /// Builds the definition from its plugin configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `shellScript` is missing or a parameter has the
    /// wrong shape.
    pub fn from_configuration(config: &PluginConfiguration) -> anyhow::Result<Self> {
        let raw = serde_json::Value::Object(config.parameters.clone());
        let params: ShellParameters = serde_json::from_value(raw)
            .with_context(|| format!("invalid shell process configuration '{}'", config.label))?;

        let script = Arc::new(ShellScript {
            script: PathBuf::from(&params.shell_script),
            env: params
                .env_variables
                .as_deref()
                .map(parse_env_variables)
                .unwrap_or_default(),
            workdir_root: params
                .workdir_root
                .unwrap_or_else(|| std::env::temp_dir().join("processing")),
        });

        let prepare = Arc::new(PrepareWorkdir(Arc::clone(&script)));
        let executable = Stages::first("prepare workdir", prepare)
            .then("simple shell", Arc::clone(&script) as Arc<dyn Executable>)
            .then("clean workdir", Arc::new(CleanWorkdir(Arc::clone(&script))))
            .on_error(Arc::new(CleanWorkdir(script)));

        Ok(Self {
            required_data_types: parse_data_types(&params.required_data_types),
            size_forecast: params.size_forecast,
            duration_forecast: params.duration_forecast,
            engine: params.engine,
            executable: Arc::new(executable),
        })
    }
}

impl ProcessDefinition for ShellProcessDefinition {
    fn required_data_types(&self) -> &[DataType] {
        &self.required_data_types
    }

    fn parameters(&self) -> &[ExecutionParameterDescriptor] {
        &[]
    }

    fn size_forecast(&self) -> SizeForecast {
        self.size_forecast
    }

    fn duration_forecast(&self) -> DurationForecast {
        self.duration_forecast
    }

    fn engine_name(&self) -> &str {
        &self.engine
    }

    fn executable(&self) -> Arc<dyn Executable> {
        Arc::clone(&self.executable)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

struct ShellScript {
    script: PathBuf,
    env: Vec<(String, String)>,
    workdir_root: PathBuf,
}

impl ShellScript {
    fn workdir(&self, ctx: &ExecutionContext) -> PathBuf {
        self.workdir_root.join(ctx.execution.id.to_string())
    }
}

#[async_trait]
impl Executable for ShellScript {
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        let workdir = self.workdir(ctx);
        let input_urls = ctx
            .execution
            .input_files
            .iter()
            .map(|f| f.url.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut command = tokio::process::Command::new("sh");
        command
            .arg(&self.script)
            .current_dir(&workdir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("PROCESSING_EXECUTION_ID", ctx.execution.id.to_string())
            .env("PROCESSING_WORKDIR", &workdir)
            .env("PROCESSING_INPUT_URLS", input_urls)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for param in &ctx.batch.parameters {
            command.env(
                format!("PROCESSING_PARAM_{}", param.name.to_ascii_uppercase()),
                &param.value,
            );
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to launch {}", self.script.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(execution_id = %ctx.execution.id, stdout = %stdout.trim_end(), "script output");
        }
        if output.status.success() {
            info!(
                batch_id = %ctx.batch.id,
                execution_id = %ctx.execution.id,
                script = %self.script.display(),
                "script exited with status 0"
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                correlation_id = %ctx.batch.correlation_id,
                execution_id = %ctx.execution.id,
                stderr = %stderr.trim_end(),
                "script failed"
            );
            anyhow::bail!("{} exited with {}", self.script.display(), output.status)
        }
    }
}

struct PrepareWorkdir(Arc<ShellScript>);

#[async_trait]
impl Executable for PrepareWorkdir {
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        let workdir = self.0.workdir(ctx);
        tokio::fs::create_dir_all(&workdir)
            .await
            .with_context(|| format!("cannot create workdir {}", workdir.display()))?;
        Ok(())
    }
}

struct CleanWorkdir(Arc<ShellScript>);

#[async_trait]
impl Executable for CleanWorkdir {
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        remove_dir_if_present(&self.0.workdir(ctx)).await
    }
}

async fn remove_dir_if_present(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("cannot remove workdir {}", path.display())),
    }
}
