use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildEvent {
    RunStarted {
        total_images: usize,
    },
    ImageStarted {
        repo: String,
        tag: String,
    },
    ImageBuilt {
        repo: String,
        tag: String,
        duration_ms: u64,
        published: bool,
    },
    ImageFailed {
        repo: String,
        error: String,
    },
    RunFinished {
        built: usize,
        unbuilt: usize,
        total_duration_ms: u64,
    },
}

/// Receives progress events from a run.
pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: BuildEvent);
}

pub struct NoopObserver;
impl BuildObserver for NoopObserver {
    fn on_event(&self, _event: BuildEvent) {}
}
