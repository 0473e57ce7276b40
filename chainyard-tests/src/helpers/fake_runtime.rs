//! In-memory `ContainerRuntime` with a call journal and failure injection

use async_trait::async_trait;
use chainyard::definitions::{OperationsSpec, ServiceSpec};
use chainyard::runtime::{ContainerRuntime, RuntimeError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// Runtime primitive, used to filter the journal and to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Exists,
    IsRunning,
    RunService,
    Stop,
    Remove,
    ExecService,
    CreateData,
    ExecData,
    ImportData,
    PullImage,
    Logs,
    Inspect,
    Ports,
}

/// One recorded runtime call.
#[derive(Debug, Clone)]
pub struct RuntimeCall {
    pub op: FakeOp,
    /// Container or image the call addressed
    pub target: String,
    pub service: Option<ServiceSpec>,
    pub ops: Option<OperationsSpec>,
    pub args: Vec<String>,
    pub timeout: Option<u32>,
    /// `remove` flags: data, volumes, force
    pub remove_flags: Option<(bool, bool, bool)>,
}

impl RuntimeCall {
    fn new(op: FakeOp, target: &str) -> Self {
        Self {
            op,
            target: target.to_string(),
            service: None,
            ops: None,
            args: Vec::new(),
            timeout: None,
            remove_flags: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeContainer {
    pub running: bool,
    pub is_data: bool,
    pub service: Option<ServiceSpec>,
    /// Files imported into a data container, relative to their destination
    pub files: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    calls: Vec<RuntimeCall>,
    /// (op, target) pairs that fail; an empty target matches any
    failures: Vec<(FakeOp, String)>,
    exec_outputs: HashMap<String, String>,
    pull_delay: Option<Duration>,
}

impl FakeState {
    fn check(&self, op: FakeOp, target: &str) -> Result<(), RuntimeError> {
        let fails = self
            .failures
            .iter()
            .any(|(o, t)| *o == op && (t.is_empty() || t == target));
        if fails {
            return Err(RuntimeError::command("fake", target, format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

/// Runtime that keeps containers in a map instead of talking to an engine.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail.
    pub fn fail(&self, op: FakeOp) {
        self.state.lock().failures.push((op, String::new()));
    }

    /// Make calls of `op` against `target` fail.
    pub fn fail_target(&self, op: FakeOp, target: &str) {
        self.state.lock().failures.push((op, target.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Output returned by exec calls whose command starts with `program`.
    pub fn set_exec_output(&self, program: &str, output: &str) {
        self.state
            .lock()
            .exec_outputs
            .insert(program.to_string(), output.to_string());
    }

    /// Make every pull take `delay` before completing.
    pub fn set_pull_delay(&self, delay: Duration) {
        self.state.lock().pull_delay = Some(delay);
    }

    /// Add a container directly, bypassing the journal.
    pub fn insert_container(&self, name: &str, running: bool) {
        self.state.lock().containers.insert(
            name.to_string(),
            FakeContainer {
                running,
                ..Default::default()
            },
        );
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().containers.get(name).cloned()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().containers.contains_key(name)
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn data_container_count(&self) -> usize {
        self.state.lock().containers.values().filter(|c| c.is_data).count()
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_of(&self, op: FakeOp) -> Vec<RuntimeCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    fn record(&self, call: RuntimeCall) {
        self.state.lock().calls.push(call);
    }
}

/// Relative paths of all files below `dir`.
fn list_files(dir: &Path, prefix: &str, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = format!("{}{}", prefix, entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            list_files(&entry.path(), &format!("{}/", name), out)?;
        } else {
            out.push(name);
        }
    }
    Ok(())
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn exists(&self, container: &str) -> Result<bool, RuntimeError> {
        self.record(RuntimeCall::new(FakeOp::Exists, container));
        let state = self.state.lock();
        state.check(FakeOp::Exists, container)?;
        Ok(state.containers.contains_key(container))
    }

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError> {
        self.record(RuntimeCall::new(FakeOp::IsRunning, container));
        let state = self.state.lock();
        state.check(FakeOp::IsRunning, container)?;
        Ok(state.containers.get(container).is_some_and(|c| c.running))
    }

    async fn run_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<(), RuntimeError> {
        let name = &ops.srv_container_name;
        self.record(RuntimeCall {
            service: Some(service.clone()),
            ops: Some(ops.clone()),
            ..RuntimeCall::new(FakeOp::RunService, name)
        });
        let mut state = self.state.lock();
        state.check(FakeOp::RunService, name)?;
        let container = state.containers.entry(name.clone()).or_default();
        container.running = true;
        container.service = Some(service.clone());
        Ok(())
    }

    async fn stop(&self, _service: &ServiceSpec, ops: &OperationsSpec, timeout: u32) -> Result<(), RuntimeError> {
        let name = &ops.srv_container_name;
        self.record(RuntimeCall {
            timeout: Some(timeout),
            ..RuntimeCall::new(FakeOp::Stop, name)
        });
        let mut state = self.state.lock();
        state.check(FakeOp::Stop, name)?;
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::Absent(name.clone())),
        }
    }

    async fn remove(
        &self,
        service: &ServiceSpec,
        ops: &OperationsSpec,
        remove_data: bool,
        remove_volumes: bool,
        force: bool,
    ) -> Result<(), RuntimeError> {
        let name = &ops.srv_container_name;
        self.record(RuntimeCall {
            service: Some(service.clone()),
            ops: Some(ops.clone()),
            remove_flags: Some((remove_data, remove_volumes, force)),
            ..RuntimeCall::new(FakeOp::Remove, name)
        });
        let mut state = self.state.lock();
        state.check(FakeOp::Remove, name)?;
        state.containers.remove(name);
        if remove_data && !ops.data_container_name.is_empty() {
            state.containers.remove(&ops.data_container_name);
        }
        Ok(())
    }

    async fn exec_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<String, RuntimeError> {
        let target = ops.args.first().cloned().unwrap_or_default();
        self.record(RuntimeCall {
            service: Some(service.clone()),
            ops: Some(ops.clone()),
            args: ops.args.clone(),
            ..RuntimeCall::new(FakeOp::ExecService, &target)
        });
        let state = self.state.lock();
        state.check(FakeOp::ExecService, &target)?;
        Ok(state
            .exec_outputs
            .get(&target)
            .cloned()
            .unwrap_or_else(|| format!("{}\n", ops.args.join(" "))))
    }

    async fn create_data(&self, ops: &OperationsSpec) -> Result<(), RuntimeError> {
        let name = &ops.data_container_name;
        self.record(RuntimeCall::new(FakeOp::CreateData, name));
        let mut state = self.state.lock();
        state.check(FakeOp::CreateData, name)?;
        if state.containers.contains_key(name) {
            return Err(RuntimeError::command("create", name, "container name already in use"));
        }
        state.containers.insert(
            name.clone(),
            FakeContainer {
                is_data: true,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn exec_data(&self, ops: &OperationsSpec, args: &[String]) -> Result<String, RuntimeError> {
        let name = &ops.data_container_name;
        self.record(RuntimeCall {
            args: args.to_vec(),
            ..RuntimeCall::new(FakeOp::ExecData, name)
        });
        let state = self.state.lock();
        state.check(FakeOp::ExecData, name)?;
        if !state.containers.contains_key(name) {
            return Err(RuntimeError::Absent(name.clone()));
        }
        Ok(String::new())
    }

    async fn import_data(&self, ops: &OperationsSpec, source: &Path, destination: &str) -> Result<(), RuntimeError> {
        let name = &ops.data_container_name;
        self.record(RuntimeCall {
            args: vec![source.display().to_string(), destination.to_string()],
            ..RuntimeCall::new(FakeOp::ImportData, name)
        });
        let mut files = Vec::new();
        list_files(source, "", &mut files)?;
        files.sort();

        let mut state = self.state.lock();
        state.check(FakeOp::ImportData, name)?;
        match state.containers.get_mut(name) {
            Some(container) => {
                container.files = files;
                Ok(())
            }
            None => Err(RuntimeError::Absent(name.clone())),
        }
    }

    async fn pull_image(&self, image: &str, progress: mpsc::Sender<String>) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::new(FakeOp::PullImage, image));
        let delay = {
            let state = self.state.lock();
            state.check(FakeOp::PullImage, image)?;
            state.pull_delay
        };
        let _ = progress.send(format!("Pulling {}", image)).await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let _ = progress.send(format!("Pulled {}", image)).await;
        Ok(())
    }

    async fn logs(&self, ops: &OperationsSpec, _follow: bool, tail: &str) -> Result<String, RuntimeError> {
        let name = &ops.srv_container_name;
        self.record(RuntimeCall {
            args: vec![tail.to_string()],
            ..RuntimeCall::new(FakeOp::Logs, name)
        });
        let state = self.state.lock();
        state.check(FakeOp::Logs, name)?;
        if !state.containers.contains_key(name) {
            return Err(RuntimeError::Absent(name.clone()));
        }
        Ok(format!("logs of {}\n", name))
    }

    async fn inspect(&self, container: &str, field: &str) -> Result<String, RuntimeError> {
        self.record(RuntimeCall {
            args: vec![field.to_string()],
            ..RuntimeCall::new(FakeOp::Inspect, container)
        });
        let state = self.state.lock();
        state.check(FakeOp::Inspect, container)?;
        match state.containers.get(container) {
            Some(c) => Ok(format!("{{\"Running\":{}}}", c.running)),
            None => Err(RuntimeError::Absent(container.to_string())),
        }
    }

    async fn port_mappings(&self, container: &str) -> Result<Vec<String>, RuntimeError> {
        self.record(RuntimeCall::new(FakeOp::Ports, container));
        let state = self.state.lock();
        state.check(FakeOp::Ports, container)?;
        match state.containers.get(container) {
            Some(c) if c.running => Ok(vec!["46657/tcp -> 0.0.0.0:32768".to_string()]),
            Some(_) => Ok(Vec::new()),
            None => Err(RuntimeError::Absent(container.to_string())),
        }
    }
}
