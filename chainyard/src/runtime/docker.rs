//! [`ContainerRuntime`] backed by the `docker` command line client.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{ContainerRuntime, RuntimeError};
use crate::config::Settings;
use crate::definitions::{OperationsSpec, ServiceSpec};

/// Subset of `docker inspect --format '{{json .State}}'`.
#[derive(Debug, Deserialize)]
struct ContainerState {
    #[serde(rename = "Running", default)]
    running: bool,
}

/// Drives containers by shelling out to a `docker`-compatible binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    data_image: String,
    container_root: String,
}

impl DockerCli {
    pub fn new(settings: &Settings) -> Self {
        Self {
            binary: PathBuf::from("docker"),
            data_image: settings.data_image.clone(),
            container_root: settings.container_root.clone(),
        }
    }

    /// Use another docker-compatible client (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run the client and return stdout, mapping "no such" failures to [`RuntimeError::Absent`].
    async fn docker(&self, op: &'static str, target: &str, args: &[String]) -> Result<String, RuntimeError> {
        debug!("docker {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") || stderr.contains("No such object") {
            return Err(RuntimeError::Absent(target.to_string()));
        }
        Err(RuntimeError::command(op, target, stderr.trim()))
    }

    async fn state(&self, container: &str) -> Result<Option<ContainerState>, RuntimeError> {
        let args = strings(&["inspect", "--format", "{{json .State}}", container]);
        match self.docker("inspect", container, &args).await {
            Ok(out) => serde_json::from_str(out.trim())
                .map(Some)
                .map_err(|e| RuntimeError::command("inspect", container, e.to_string())),
            Err(e) if e.is_absent() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Flags shared by `run` and one-off execs.
    fn container_flags(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Vec<String> {
        let mut args = Vec::new();
        if service.auto_data && !ops.data_container_name.is_empty() {
            args.push("--volumes-from".to_string());
            args.push(ops.data_container_name.clone());
        }
        if ops.publish_all_ports {
            args.push("--publish-all".to_string());
        } else {
            let ports = if ops.ports.is_empty() { &service.ports } else { &ops.ports };
            for port in ports {
                args.push("--publish".to_string());
                args.push(port.clone());
            }
        }
        for env in &service.environment {
            args.push("--env".to_string());
            args.push(env.clone());
        }
        for link in &service.links {
            args.push("--link".to_string());
            args.push(link.clone());
        }
        args
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn exists(&self, container: &str) -> Result<bool, RuntimeError> {
        Ok(self.state(container).await?.is_some())
    }

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError> {
        Ok(self.state(container).await?.is_some_and(|s| s.running))
    }

    async fn run_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<(), RuntimeError> {
        let name = &ops.srv_container_name;
        match self.state(name).await? {
            Some(state) if state.running => {
                info!("Container {} already running, skipping", name);
                return Ok(());
            }
            Some(_) => {
                debug!("Container {} exists, starting it", name);
                self.docker("start", name, &strings(&["start", name])).await?;
                return Ok(());
            }
            None => {}
        }

        let mut args = strings(&["run", "--detach", "--name", name]);
        args.extend(self.container_flags(service, ops));
        if let Some(entrypoint) = &service.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }
        args.push(service.image.clone());
        if let Some(command) = &service.command {
            args.extend(command.split_whitespace().map(String::from));
        }
        self.docker("run", name, &args).await?;
        Ok(())
    }

    async fn stop(&self, _service: &ServiceSpec, ops: &OperationsSpec, timeout: u32) -> Result<(), RuntimeError> {
        let name = &ops.srv_container_name;
        let args = vec![
            "stop".to_string(),
            "--time".to_string(),
            timeout.to_string(),
            name.clone(),
        ];
        self.docker("stop", name, &args).await?;
        Ok(())
    }

    async fn remove(
        &self,
        _service: &ServiceSpec,
        ops: &OperationsSpec,
        remove_data: bool,
        remove_volumes: bool,
        force: bool,
    ) -> Result<(), RuntimeError> {
        let mut targets = vec![ops.srv_container_name.clone()];
        if remove_data && !ops.data_container_name.is_empty() {
            targets.push(ops.data_container_name.clone());
        }

        for target in targets {
            let mut args = vec!["rm".to_string()];
            if force {
                args.push("--force".to_string());
            }
            if remove_volumes || target == ops.data_container_name {
                args.push("--volumes".to_string());
            }
            args.push(target.clone());
            match self.docker("rm", &target, &args).await {
                Ok(_) => debug!("Removed container {}", target),
                Err(e) if e.is_absent() => debug!("Container {} already gone", target),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn exec_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<String, RuntimeError> {
        let mut args = strings(&["run", "--rm"]);
        if ops.interactive {
            args.push("--interactive".to_string());
        }
        args.extend(self.container_flags(service, ops));
        // An unset entrypoint means "reset", so the image's own entrypoint cannot wrap the command.
        args.push("--entrypoint".to_string());
        args.push(service.entrypoint.clone().unwrap_or_default());
        args.push(service.image.clone());
        args.extend(ops.args.iter().cloned());

        let target = format!("exec in {}", service.name);
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(combined)
        } else {
            Err(RuntimeError::command("exec", target, combined.trim()))
        }
    }

    async fn create_data(&self, ops: &OperationsSpec) -> Result<(), RuntimeError> {
        let name = &ops.data_container_name;
        let args = strings(&["create", "--name", name, "--volume", &self.container_root, &self.data_image]);
        self.docker("create", name, &args).await?;
        Ok(())
    }

    async fn exec_data(&self, ops: &OperationsSpec, args: &[String]) -> Result<String, RuntimeError> {
        let name = &ops.data_container_name;
        let mut full = strings(&["run", "--rm", "--volumes-from", name, "--entrypoint", ""]);
        full.push(self.data_image.clone());
        full.extend(args.iter().cloned());
        self.docker("exec", name, &full).await
    }

    async fn import_data(&self, ops: &OperationsSpec, source: &Path, destination: &str) -> Result<(), RuntimeError> {
        let name = &ops.data_container_name;
        let from = format!("{}/.", source.display());
        let to = format!("{}:{}", name, destination);
        self.docker("import", name, &strings(&["cp", &from, &to])).await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str, progress: mpsc::Sender<String>) -> Result<(), RuntimeError> {
        let mut child = Command::new(&self.binary)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Both pipes are drained together so a chatty stderr cannot block the client.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let forward = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    if progress.send(line).await.is_err() {
                        // Nobody is displaying progress any more; keep pulling.
                        debug!("Progress receiver for {} dropped", image);
                    }
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let collect = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let (forwarded, errors) = tokio::join!(forward, collect);
        forwarded?;
        let errors = errors?;

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&errors);
            Err(RuntimeError::command("pull", image, stderr.trim()))
        }
    }

    async fn logs(&self, ops: &OperationsSpec, follow: bool, tail: &str) -> Result<String, RuntimeError> {
        let name = &ops.srv_container_name;
        let mut args = strings(&["logs", "--tail", tail]);
        if follow {
            args.push("--follow".to_string());
        }
        args.push(name.clone());
        self.docker("logs", name, &args).await
    }

    async fn inspect(&self, container: &str, field: &str) -> Result<String, RuntimeError> {
        let args = if field.is_empty() || field == "all" {
            strings(&["inspect", container])
        } else {
            let format = format!("{{{{json .{}}}}}", field);
            strings(&["inspect", "--format", &format, container])
        };
        self.docker("inspect", container, &args).await
    }

    async fn port_mappings(&self, container: &str) -> Result<Vec<String>, RuntimeError> {
        let out = self.docker("port", container, &strings(&["port", container])).await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }
}
