use crate::client::{ProviderClient, RunRequest, RunResponse};
use async_trait::async_trait;
use cohort_core::{CohortError, CohortResult};
use std::time::Duration;

/// Runs a local agent CLI in headless mode.
///
/// The prompt is appended as the last argument. When the command prints a
/// JSON object on its last parseable line (`result`, `is_error`,
/// `usage.input_tokens`, `usage.output_tokens`, `total_cost_usd`) it is used
/// for the response; otherwise stdout is taken verbatim.
pub struct CommandClient {
    provider: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(provider: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_output(&self, request: &RunRequest, stdout: &str) -> RunResponse {
        let parsed: Option<serde_json::Value> = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(serde_json::Value::is_object);

        let Some(json) = parsed else {
            return RunResponse::ok(request, stdout.trim());
        };

        let text = json["result"].as_str().unwrap_or_default().to_string();
        if json["is_error"].as_bool().unwrap_or(false) {
            return RunResponse::failed(request, text);
        }
        RunResponse::ok(request, text).with_usage(
            json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            json["usage"]["output_tokens"].as_u64().unwrap_or(0),
            json["total_cost_usd"].as_f64().unwrap_or(0.0),
        )
    }
}

#[async_trait]
impl ProviderClient for CommandClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn health_check(&self) -> bool {
        let probe = tokio::process::Command::new(&self.program)
            .arg("--version")
            .kill_on_drop(true)
            .output();
        matches!(
            tokio::time::timeout(Duration::from_secs(10), probe).await,
            Ok(Ok(output)) if output.status.success()
        )
    }

    async fn run(&self, request: RunRequest) -> CohortResult<RunResponse> {
        if request.prompt.trim().is_empty() {
            return Err(CohortError::ProviderExecution {
                provider: self.provider.clone(),
                message: "empty prompt".into(),
            });
        }

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if !request.model.is_empty() && request.model != "default" {
            cmd.arg("--model").arg(&request.model);
        }
        cmd.arg(&request.prompt);
        cmd.kill_on_drop(true);

        tracing::info!(
            provider = %self.provider,
            program = %self.program,
            prompt_len = request.prompt.len(),
            "command: spawning provider CLI"
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CohortError::ProviderExecution {
                provider: self.provider.clone(),
                message: format!("timeout after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| CohortError::ProviderExecution {
                provider: self.provider.clone(),
                message: format!("failed to run '{}': {e}", self.program),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(RunResponse::failed(
                &request,
                format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        Ok(self.parse_output(&request, &stdout))
    }
}
