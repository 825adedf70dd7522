//! Local model runtime (llama.cpp command line tools)
//!
//! Generation runs as a child process per request. The process is killed if
//! it outlives the configured timeout.

use crate::error::{InferenceError, InferenceResult};
use async_trait::async_trait;
use pixa_common::config::RuntimeConfig;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Tokens generated per request
const MAX_NEW_TOKENS: u32 = 512;
const TEMPERATURE: &str = "0.3";

/// Runs prompts against local model files
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    /// Text generation with a single language model file
    async fn generate_text(&self, model: &Path, prompt: &str) -> InferenceResult<String>;

    /// Generation conditioned on an image file (model + vision projector)
    async fn generate_with_image(
        &self,
        model: &Path,
        projector: &Path,
        image: &Path,
        prompt: &str,
    ) -> InferenceResult<String>;
}

/// llama.cpp CLI runtime (`llama-cli`, `llama-mtmd-cli`)
#[derive(Debug, Clone)]
pub struct LlamaCliRuntime {
    llama_cli: String,
    mtmd_cli: String,
    timeout: Duration,
    threads: u32,
}

impl LlamaCliRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            llama_cli: config.llama_cli.clone(),
            mtmd_cli: config.mtmd_cli.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            threads: config.threads.max(1),
        }
    }

    async fn run(&self, mut command: Command, program: &str) -> InferenceResult<String> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!(program = %program, "Local runtime not installed");
                InferenceError::NotAvailable
            } else {
                InferenceError::ExtractionFailed(format!("Failed to start {}: {}", program, e))
            }
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                InferenceError::ExtractionFailed(format!(
                    "{} timed out after {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(300)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(InferenceError::ExtractionFailed(format!(
                "{} exited with {}: {}",
                program, output.status, tail
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(program = %program, chars = stdout.len(), "Local generation finished");
        Ok(stdout)
    }

    fn common_args(&self, command: &mut Command, model: &Path, prompt: &str) {
        command
            .arg("-m")
            .arg(model)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(MAX_NEW_TOKENS.to_string())
            .arg("--temp")
            .arg(TEMPERATURE)
            .arg("-t")
            .arg(self.threads.to_string());
    }
}

#[async_trait]
impl LocalRuntime for LlamaCliRuntime {
    async fn generate_text(&self, model: &Path, prompt: &str) -> InferenceResult<String> {
        let mut command = Command::new(&self.llama_cli);
        self.common_args(&mut command, model, prompt);
        command.arg("--no-display-prompt").arg("-no-cnv");
        self.run(command, &self.llama_cli).await
    }

    async fn generate_with_image(
        &self,
        model: &Path,
        projector: &Path,
        image: &Path,
        prompt: &str,
    ) -> InferenceResult<String> {
        let mut command = Command::new(&self.mtmd_cli);
        self.common_args(&mut command, model, prompt);
        command.arg("--mmproj").arg(projector).arg("--image").arg(image);
        self.run(command, &self.mtmd_cli).await
    }
}
