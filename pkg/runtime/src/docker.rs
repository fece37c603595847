use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::{ContainerInfo, ContainerRuntime};
use pkg_types::container::ContainerState;
use pkg_types::pod::PodSpec;

/// Label applied to every container so `list` only sees our own.
const DOCKER_FILTER_LABEL: &str = "kubelite=true";

/// Runtime that shells out to the docker CLI. Slower than talking to the
/// daemon socket, but each step stays reproducible by hand.
#[derive(Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn docker(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| anyhow!("docker {}: {}", args.join(" "), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "docker {}: {}",
                args.join(" "),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &PodSpec) -> Result<String> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--label".to_string(),
            DOCKER_FILTER_LABEL.to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.docker(&arg_refs).await?;
        let id = stdout.trim().to_string();
        info!("Docker runtime: started container {} for pod {}", id, spec.name);
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        self.docker(&["stop", container_id]).await.map(|_| ())
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        self.docker(&["rm", container_id]).await.map(|_| ())
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerState> {
        let stdout = self
            .docker(&[
                "inspect",
                "--format",
                "{{.State.Status}} {{.State.ExitCode}}",
                container_id,
            ])
            .await?;

        let mut parts = stdout.split_whitespace();
        let status = parts.next().unwrap_or_default();
        let exit_code: i32 = parts.next().unwrap_or("0").parse().unwrap_or(0);

        Ok(match status {
            "running" => ContainerState::running(),
            "exited" | "dead" => ContainerState::exited(exit_code),
            _ => ContainerState {
                status: pkg_types::container::ContainerStatus::Unknown,
                exit_code,
            },
        })
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>> {
        let stdout = self
            .docker(&[
                "ps",
                "-a",
                "--filter",
                &format!("label={}", DOCKER_FILTER_LABEL),
                "--format",
                "{{.ID}} {{.Names}}",
            ])
            .await?;

        let mut out = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(id), Some(name)) = (parts.next(), parts.next()) {
                out.push(ContainerInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(out)
    }
}
