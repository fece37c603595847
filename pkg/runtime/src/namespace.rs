use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nix::sched::CloneFlags;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::child::{ChildConfig, CHILD_ENV};
use crate::image::ImageManager;
use crate::rootfs;
use crate::{ContainerInfo, ContainerRuntime};
use pkg_types::container::ContainerState;
use pkg_types::pod::PodSpec;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct ContainerProcess {
    id: String,
    name: String,
    pid: i32,
    exited: bool,
    exit_code: i32,
}

/// Persisted beside each container so `list` can recover ownership after a
/// kubelet restart.
#[derive(Debug, Serialize, Deserialize)]
struct ContainerMeta {
    id: String,
    name: String,
    image: String,
    pid: i32,
    created_at: DateTime<Utc>,
}

/// Container runtime built on Linux namespaces: each container is this
/// binary re-exec'd into fresh PID/UTS/mount namespaces, pivoted into a
/// copy of the image rootfs.
pub struct NamespaceRuntime {
    containers: Arc<DashMap<String, ContainerProcess>>,
    root_dir: PathBuf,
    images: ImageManager,
}

impl NamespaceRuntime {
    pub fn new(root_dir: &str) -> Result<Self> {
        let root_dir = PathBuf::from(root_dir);
        std::fs::create_dir_all(root_dir.join("containers"))
            .context("create containers dir")?;

        Ok(Self {
            containers: Arc::new(DashMap::new()),
            images: ImageManager::new(&root_dir),
            root_dir,
        })
    }

    fn container_dir(&self, id: &str) -> PathBuf {
        self.root_dir.join("containers").join(id)
    }

    async fn start_child(
        &self,
        spec: &PodSpec,
        id: &str,
        container_dir: &Path,
        container_rootfs: &Path,
    ) -> Result<ContainerProcess> {
        let command = if spec.command.is_empty() {
            vec!["/bin/sh".to_string()]
        } else {
            spec.command.clone()
        };
        let hostname = if spec.name.is_empty() {
            id.to_string()
        } else {
            spec.name.clone()
        };

        let config_json = serde_json::to_vec(&ChildConfig {
            rootfs: container_rootfs.display().to_string(),
            hostname,
            command,
            env: spec.env.clone(),
        })?;

        let mut cmd = Command::new("/proc/self/exe");
        cmd.env_clear()
            .env(CHILD_ENV, "1")
            .stdin(Stdio::piped())
            .stderr(Stdio::inherit());
        unsafe {
            // between fork and exec the process is single-threaded, so the
            // exec'd child lands directly in the new namespaces
            cmd.pre_exec(|| {
                nix::sched::unshare(
                    CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS,
                )
                .map_err(std::io::Error::from)
            });
        }

        let mut child = cmd.spawn().context("spawn container init")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("container init has no stdin"))?;
        if let Err(e) = stdin.write_all(&config_json).await {
            let _ = child.kill().await;
            return Err(anyhow!("write child config: {}", e));
        }
        drop(stdin);

        let pid = child
            .id()
            .ok_or_else(|| anyhow!("container init already reaped"))? as i32;

        let meta = ContainerMeta {
            id: id.to_string(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            pid,
            created_at: Utc::now(),
        };
        if let Err(e) = save_meta(container_dir, &meta) {
            let _ = child.kill().await;
            return Err(e);
        }

        // one background waiter per container for exit detection
        let containers = self.containers.clone();
        let waiter_id = id.to_string();
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            if let Some(mut cp) = containers.get_mut(&waiter_id) {
                cp.exited = true;
                cp.exit_code = exit_code;
            }
        });

        Ok(ContainerProcess {
            id: id.to_string(),
            name: spec.name.clone(),
            pid,
            exited: false,
            exit_code: 0,
        })
    }

    fn recover_from_disk(&self) -> Result<()> {
        let containers_dir = self.root_dir.join("containers");
        let entries = match std::fs::read_dir(&containers_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            if self.containers.contains_key(&id) {
                continue;
            }

            let meta = match load_meta(&entry.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping container {}: {}", id, e);
                    continue;
                }
            };

            // zero-signal probe: is the recorded pid still alive?
            let alive = kill(Pid::from_raw(meta.pid), None).is_ok();
            self.containers.insert(
                id,
                ContainerProcess {
                    id: meta.id,
                    name: meta.name,
                    pid: meta.pid,
                    exited: !alive,
                    exit_code: if alive { 0 } else { -1 },
                },
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for NamespaceRuntime {
    async fn run(&self, spec: &PodSpec) -> Result<String> {
        let image_rootfs = self.images.ensure_image(&spec.image).await?;

        let id = random_id();
        let container_dir = self.container_dir(&id);
        let container_rootfs = container_dir.join("rootfs");
        tokio::fs::create_dir_all(&container_dir).await?;

        info!("Copying rootfs for container {}...", id);
        let (src, dst) = (image_rootfs.clone(), container_rootfs.clone());
        let copied = tokio::task::spawn_blocking(move || rootfs::copy_dir(&src, &dst)).await?;
        if let Err(e) = copied {
            let _ = tokio::fs::remove_dir_all(&container_dir).await;
            return Err(e.context("copy rootfs"));
        }

        let cp = match self
            .start_child(spec, &id, &container_dir, &container_rootfs)
            .await
        {
            Ok(cp) => cp,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&container_dir).await;
                return Err(e);
            }
        };

        info!(
            "Started container {} (pid {}) for pod {}",
            id, cp.pid, spec.name
        );
        self.containers.insert(id.clone(), cp);
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        let (pid, exited) = {
            let cp = self
                .containers
                .get(container_id)
                .ok_or_else(|| anyhow!("container {} not found", container_id))?;
            (cp.pid, cp.exited)
        };
        if exited {
            return Ok(());
        }

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {}
            Err(nix::errno::Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(anyhow!("sigterm pid {}: {}", pid, e)),
        }

        let deadline = Instant::now() + STOP_GRACE_PERIOD;
        while Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let gone = self
                .containers
                .get(container_id)
                .map(|cp| cp.exited)
                .unwrap_or(true)
                || kill(Pid::from_raw(pid), None).is_err();
            if gone {
                return Ok(());
            }
        }

        warn!("Force killing container {} (pid {})", container_id, pid);
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        let still_running = self
            .containers
            .get(container_id)
            .map(|cp| !cp.exited && kill(Pid::from_raw(cp.pid), None).is_ok())
            .unwrap_or(false);
        if still_running {
            return Err(anyhow!("container {} is still running", container_id));
        }
        self.containers.remove(container_id);

        let dir = self.container_dir(container_id);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .context("remove container dir")?;
        }
        Ok(())
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerState> {
        let cp = self
            .containers
            .get(container_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| anyhow!("container {} not found", container_id))?;

        if cp.exited {
            return Ok(ContainerState::exited(cp.exit_code));
        }

        // probe for processes whose waiter died with a previous kubelet
        if kill(Pid::from_raw(cp.pid), None).is_err() {
            if let Some(mut entry) = self.containers.get_mut(container_id) {
                entry.exited = true;
                entry.exit_code = -1;
            }
            return Ok(ContainerState::exited(-1));
        }

        Ok(ContainerState::running())
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>> {
        if self.containers.is_empty() {
            if let Err(e) = self.recover_from_disk() {
                warn!("Recovery from disk failed: {}", e);
            }
        }

        Ok(self
            .containers
            .iter()
            .map(|cp| ContainerInfo {
                id: cp.id.clone(),
                name: cp.name.clone(),
            })
            .collect())
    }
}

fn save_meta(dir: &Path, meta: &ContainerMeta) -> Result<()> {
    let data = serde_json::to_vec(meta)?;
    std::fs::write(dir.join("meta.json"), data).context("write meta.json")
}

fn load_meta(dir: &Path) -> Result<ContainerMeta> {
    let data = std::fs::read(dir.join("meta.json")).context("read meta.json")?;
    Ok(serde_json::from_slice(&data)?)
}

fn random_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
