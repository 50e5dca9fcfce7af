use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Which docker-compose frontend the host offers. The standalone binary is
/// preferred; newer hosts only ship the `docker compose` plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    Standalone,
    Plugin,
}

pub async fn docker_available() -> bool {
    command_succeeds(Command::new("docker").arg("--version")).await
}

pub async fn detect_compose() -> Option<ComposeFlavor> {
    if command_succeeds(Command::new("docker-compose").arg("--version")).await {
        return Some(ComposeFlavor::Standalone);
    }
    if command_succeeds(Command::new("docker").args(["compose", "version"])).await {
        return Some(ComposeFlavor::Plugin);
    }
    None
}

async fn command_succeeds(cmd: &mut Command) -> bool {
    match cmd.output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Owns the directory compose files are materialized into.
#[derive(Clone)]
pub struct ComposeRunner {
    compose_dir: PathBuf,
}

impl ComposeRunner {
    pub fn new(compose_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&compose_dir)
            .with_context(|| format!("Cannot create compose directory {:?}", compose_dir))?;
        Ok(Self { compose_dir })
    }

    pub fn compose_file(&self, name: &str) -> PathBuf {
        self.compose_dir.join(format!("docker-compose-{name}.yml"))
    }

    /// Writes (or replaces) the compose file for a workload.
    pub fn write_compose_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.compose_file(name);
        std::fs::write(&path, content)
            .with_context(|| format!("Cannot write compose file {:?}", path))?;
        Ok(path)
    }
}

pub async fn up(flavor: ComposeFlavor, file: &Path) -> Result<()> {
    run_compose(flavor, file, &["up", "-d"]).await
}

pub async fn start(flavor: ComposeFlavor, file: &Path) -> Result<()> {
    run_compose(flavor, file, &["start"]).await
}

pub async fn stop(flavor: ComposeFlavor, file: &Path) -> Result<()> {
    run_compose(flavor, file, &["stop"]).await
}

async fn run_compose(flavor: ComposeFlavor, file: &Path, args: &[&str]) -> Result<()> {
    let mut cmd = match flavor {
        ComposeFlavor::Standalone => {
            let mut c = Command::new("docker-compose");
            c.arg("-f").arg(file);
            c
        }
        ComposeFlavor::Plugin => {
            let mut c = Command::new("docker");
            c.arg("compose").arg("-f").arg(file);
            c
        }
    };
    cmd.args(args);

    debug!("Running compose {} on {:?}", args.join(" "), file);
    let output = cmd.output().await.context("Failed to run docker compose")?;
    if !output.status.success() {
        bail!(
            "compose {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Observes a workload's container state by name. Two passes: running
/// containers first, then `docker ps -a` to tell a stopped workload apart
/// from one that was never created.
pub async fn observe_workload(name: &str) -> &'static str {
    match docker_ps(name, false).await {
        Ok(output) => {
            if let Some(status) = match_container_status(&output, name) {
                return classify_status(&status);
            }
        }
        Err(e) => {
            warn!("docker ps failed: {:#}", e);
            return "unknown";
        }
    }

    match docker_ps(name, true).await {
        Ok(output) => match match_container_status(&output, name) {
            Some(status) => classify_status(&status),
            None => "not_deployed",
        },
        Err(e) => {
            warn!("docker ps -a failed: {:#}", e);
            "unknown"
        }
    }
}

async fn docker_ps(name: &str, all: bool) -> Result<String> {
    let mut cmd = Command::new("docker");
    cmd.arg("ps");
    if all {
        cmd.arg("-a");
    }
    cmd.args(["--format", "{{.Names}}:{{.Status}}", "--filter"])
        .arg(format!("name={name}"));

    let output = cmd.output().await.context("Failed to run docker ps")?;
    if !output.status.success() {
        bail!("docker ps exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Picks the status column of the first `docker ps` line whose container
/// name contains the workload name. Compose derives container names from the
/// project name, so a substring match is the reliable association.
fn match_container_status(output: &str, name: &str) -> Option<String> {
    for line in output.lines() {
        if let Some((container, status)) = line.split_once(':') {
            if container.contains(name) {
                return Some(status.trim().to_string());
            }
        }
    }
    None
}

fn classify_status(docker_status: &str) -> &'static str {
    if docker_status.starts_with("Up") {
        "running"
    } else if docker_status.starts_with("Exited") {
        "stopped"
    } else if docker_status.starts_with("Restarting") {
        "restarting"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status("Up 2 hours"), "running");
        assert_eq!(classify_status("Up 3 seconds (healthy)"), "running");
        assert_eq!(classify_status("Exited (0) 5 minutes ago"), "stopped");
        assert_eq!(classify_status("Exited (137) 2 days ago"), "stopped");
        assert_eq!(classify_status("Restarting (1) 9 seconds ago"), "restarting");
        assert_eq!(classify_status("Created"), "unknown");
    }

    #[test]
    fn test_container_matching_is_substring_based() {
        let output = "someapp-db-1:Up 2 hours\nredis-cache-1:Exited (0) 1 hour ago\n";
        assert_eq!(
            match_container_status(output, "redis-cache").as_deref(),
            Some("Exited (0) 1 hour ago")
        );
        assert_eq!(
            match_container_status(output, "someapp").as_deref(),
            Some("Up 2 hours")
        );
        assert!(match_container_status(output, "postgres").is_none());
        assert!(match_container_status("", "redis-cache").is_none());
    }

    #[test]
    fn test_compose_file_naming_and_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ComposeRunner::new(dir.path().to_path_buf()).unwrap();

        let path = runner.write_compose_file("web", "services: {}").unwrap();
        assert!(path.ends_with("docker-compose-web.yml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "services: {}");

        // Redeploy replaces the file wholesale.
        runner.write_compose_file("web", "services:\n  web: {}").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "services:\n  web: {}"
        );
    }
}
