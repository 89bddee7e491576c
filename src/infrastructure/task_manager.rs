use tokio::task::JoinHandle;

/// Manages background tasks with proper lifecycle handling
pub struct TaskManager {
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    /// Create a new empty task manager
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a task and track it
    pub fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Abort all tracked tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        for handle in std::mem::take(&mut self.handles) {
            handle.abort();
            // Ignore errors from aborted tasks
            let _ = handle.await;
        }
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut tasks = TaskManager::new();
        let flag = Arc::clone(&finished);
        tasks.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.len(), 1);

        tasks.shutdown().await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_aborts_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut tasks = TaskManager::new();
        tasks.spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });

        drop(tasks);
        // Sender is dropped once the aborted task is torn down
        assert!(rx.await.is_err());
    }
}
