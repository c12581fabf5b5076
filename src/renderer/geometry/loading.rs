//! Per-mesh loading state
//!
//! Geometry is produced on a worker thread and handed back through a channel.
//! The render thread uploads it in [`MeshSlot::poll`]; only `Ready` slots are
//! ever drawn.

use super::mesh::{Mesh, MeshData};
use crate::context::WgpuContext;
use std::sync::mpsc;
use std::time::Duration;

type LoadResult = Result<MeshData, String>;

/// Loading state of a single mesh.
pub enum LoadState {
    Unloaded,
    Loading,
    Ready(Mesh),
    Failed(String),
}

impl LoadState {
    fn name(&self) -> &'static str {
        match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Ready(_) => "ready",
            LoadState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Debug for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// A named mesh that may still be loading.
pub struct MeshSlot {
    name: String,
    state: LoadState,
    receiver: Option<mpsc::Receiver<LoadResult>>,
}

impl MeshSlot {
    /// An empty slot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: LoadState::Unloaded,
            receiver: None,
        }
    }

    /// Start generating the mesh on a worker thread.
    ///
    /// Any load already in flight is abandoned.
    pub fn load<F>(&mut self, generate: F)
    where
        F: FnOnce() -> anyhow::Result<MeshData> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name(format!("mesh-{}", self.name))
            .spawn(move || {
                let result = generate().map_err(|e| format!("{e:#}"));
                // The slot may have been dropped or reloaded meanwhile.
                let _ = sender.send(result);
            });

        match spawned {
            Ok(_) => {
                self.state = LoadState::Loading;
                self.receiver = Some(receiver);
            }
            Err(e) => {
                tracing::error!("Failed to spawn loader for mesh '{}': {}", self.name, e);
                self.state = LoadState::Failed(e.to_string());
                self.receiver = None;
            }
        }
    }

    /// Upload a finished load. Returns `true` when the state changed.
    pub fn poll(&mut self, ctx: &WgpuContext) -> bool {
        match self.receive(None) {
            Some(result) => {
                self.finish(result, |data, name| Mesh::new(ctx, data, Some(name)));
                true
            }
            None => false,
        }
    }

    /// Take the worker's result, waiting up to `timeout` when given.
    fn receive(&mut self, timeout: Option<Duration>) -> Option<LoadResult> {
        let receiver = self.receiver.as_ref()?;
        let received = match timeout {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => mpsc::TryRecvError::Empty,
                mpsc::RecvTimeoutError::Disconnected => mpsc::TryRecvError::Disconnected,
            }),
            None => receiver.try_recv(),
        };

        match received {
            Ok(result) => {
                self.receiver = None;
                Some(result)
            }
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.receiver = None;
                Some(Err("loader thread exited without a result".to_string()))
            }
        }
    }

    fn finish(&mut self, result: LoadResult, upload: impl FnOnce(&MeshData, &str) -> Mesh) {
        self.state = match result {
            Ok(data) if data.indices.is_empty() => {
                tracing::warn!("Mesh '{}' has no triangles", self.name);
                LoadState::Failed("mesh has no triangles".to_string())
            }
            Ok(data) => {
                tracing::debug!(
                    "Mesh '{}' loaded: {} vertices, {} triangles",
                    self.name,
                    data.vertices.len(),
                    data.triangle_count()
                );
                LoadState::Ready(upload(&data, &self.name))
            }
            Err(reason) => {
                tracing::warn!("Mesh '{}' failed to load: {}", self.name, reason);
                LoadState::Failed(reason)
            }
        };
    }

    /// Name of the mesh.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current loading state.
    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// The mesh, if it is ready to draw.
    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.state {
            LoadState::Ready(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, LoadState::Ready(_))
    }
}

impl std::fmt::Debug for MeshSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Option<Duration> = Some(Duration::from_secs(10));

    #[test]
    fn test_new_slot_is_unloaded() {
        let slot = MeshSlot::new("tree");
        assert!(matches!(slot.state(), LoadState::Unloaded));
        assert!(slot.mesh().is_none());
    }

    #[test]
    fn test_load_delivers_generated_data() {
        let mut slot = MeshSlot::new("trunk");
        slot.load(|| Ok(MeshData::cylinder(0.3, 2.0, 8)));
        assert!(matches!(slot.state(), LoadState::Loading));

        let data = slot.receive(WAIT).expect("worker result").expect("generated");
        assert_eq!(data, MeshData::cylinder(0.3, 2.0, 8));
        assert!(slot.receive(None).is_none());
    }

    #[test]
    fn test_generator_error_marks_failed() {
        let mut slot = MeshSlot::new("broken");
        slot.load(|| Err(anyhow::anyhow!("no such file")));

        let result = slot.receive(WAIT).expect("worker result");
        slot.finish(result, |_, _| unreachable!("failed loads are never uploaded"));
        match slot.state() {
            LoadState::Failed(reason) => assert!(reason.contains("no such file")),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_panicking_worker_marks_failed() {
        let mut slot = MeshSlot::new("panics");
        slot.load(|| panic!("generator crashed"));

        let result = slot.receive(WAIT).expect("worker result");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_mesh_marks_failed() {
        let mut slot = MeshSlot::new("empty");
        slot.finish(Ok(MeshData::default()), |_, _| unreachable!());
        assert!(matches!(slot.state(), LoadState::Failed(_)));
    }

    #[test]
    fn test_poll_uploads_on_gpu() {
        let Ok(ctx) = WgpuContext::new_blocking(None) else {
            return;
        };
        let mut slot = MeshSlot::new("ground");
        slot.load(|| Ok(MeshData::plane(10.0, 10.0, 4)));

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !slot.poll(&ctx) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(slot.is_ready());
    }
}
