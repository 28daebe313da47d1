use std::future::Future;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use libcat_api::{ApiError, LibraryApi};
use libcat_application::{Catalog, DescriptionState, ViewerPage};
use libcat_core::EntityId;
use tokio::runtime::Handle;
use tracing::debug;

/// Completion of a background request, applied on the UI thread.
pub(crate) enum TaskResult {
    CatalogLoaded(Result<Catalog, ApiError>),
    Borrowed {
        id: EntityId,
        result: Result<(), ApiError>,
    },
    Returned {
        id: EntityId,
        result: Result<(), ApiError>,
    },
    ViewerLoaded {
        screen: u64,
        page: ViewerPage,
    },
    DescriptionLoaded {
        screen: u64,
        state: DescriptionState,
    },
}

impl TaskResult {
    fn name(&self) -> &'static str {
        match self {
            TaskResult::CatalogLoaded(_) => "catalog",
            TaskResult::Borrowed { .. } => "borrow",
            TaskResult::Returned { .. } => "return",
            TaskResult::ViewerLoaded { .. } => "viewer",
            TaskResult::DescriptionLoaded { .. } => "description",
        }
    }
}

/// Runs requests on the tokio runtime and hands their results back over a
/// channel the event loop drains every tick.
pub(crate) struct Tasks {
    api: Arc<dyn LibraryApi>,
    runtime: Handle,
    tx: Sender<TaskResult>,
    rx: Receiver<TaskResult>,
    in_flight: usize,
}

impl Tasks {
    pub(crate) fn new(api: Arc<dyn LibraryApi>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            api,
            runtime,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub(crate) fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(Arc<dyn LibraryApi>) -> Fut,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let tx = self.tx.clone();
        let fut = task(Arc::clone(&self.api));
        self.in_flight += 1;
        self.runtime.spawn(async move {
            let result = fut.await;
            debug!(task = result.name(), "task finished");
            // The receiver only goes away when the UI has exited.
            let _ = tx.send(result);
        });
    }

    pub(crate) fn drain(&mut self) -> Vec<TaskResult> {
        let done: Vec<_> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    pub(crate) fn busy(&self) -> bool {
        self.in_flight > 0
    }
}
