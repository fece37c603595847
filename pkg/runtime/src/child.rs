use anyhow::{anyhow, Context, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment marker that flips a re-exec'd binary into container init.
pub const CHILD_ENV: &str = "KUBELITE_CHILD";

/// Handed from the parent to the re-exec'd child over stdin.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChildConfig {
    pub rootfs: String,
    pub hostname: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Container-init hook. Binaries embedding the namespace runtime call this
/// first thing in `main`, before any runtime threads exist; in a re-exec'd
/// child it never returns.
pub fn run_if_child() -> Result<()> {
    if std::env::var(CHILD_ENV).as_deref() != Ok("1") {
        return Ok(());
    }

    let code = match run_child() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("container init: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run_child() -> Result<i32> {
    let config: ChildConfig =
        serde_json::from_reader(std::io::stdin()).context("decode child config")?;

    // The parent already unshared UTS/mount/PID between fork and exec.
    nix::unistd::sethostname(&config.hostname).context("sethostname")?;
    enter_rootfs(Path::new(&config.rootfs)).context("pivot_root")?;

    std::fs::create_dir_all("/proc")?;
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("mount /proc")?;

    let program = config
        .command
        .first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let program = resolve_command(program)?;

    let mut env = config.env.clone();
    env.entry("PATH".to_string()).or_insert_with(|| {
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()
    });

    // The first process spawned after unshare(CLONE_NEWPID) becomes pid 1
    // of the new namespace, so the payload runs as a child and this
    // process lingers as its init, mirroring the exit code.
    let status = std::process::Command::new(&program)
        .args(&config.command[1..])
        .env_clear()
        .envs(&env)
        .status()
        .with_context(|| format!("exec {}", program.display()))?;

    Ok(status.code().unwrap_or(1))
}

fn enter_rootfs(rootfs: &Path) -> Result<()> {
    // bind mount rootfs onto itself; pivot_root requires a mount point
    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .context("bind mount rootfs")?;

    let pivot_old = rootfs.join(".pivot_old");
    std::fs::create_dir_all(&pivot_old)?;

    nix::unistd::pivot_root(rootfs, &pivot_old)?;
    nix::unistd::chdir("/")?;

    // drop the old root so the host filesystem is unreachable
    umount2("/.pivot_old", MntFlags::MNT_DETACH).context("unmount old root")?;
    std::fs::remove_dir_all("/.pivot_old")?;
    Ok(())
}

fn resolve_command(cmd: &str) -> Result<PathBuf> {
    let path = Path::new(cmd);
    if path.is_absolute() {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("command not found: {}", cmd));
    }

    for dir in ["/bin", "/usr/bin", "/sbin", "/usr/sbin", "/usr/local/bin"] {
        let candidate = Path::new(dir).join(cmd);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow!("command not found: {}", cmd))
}
