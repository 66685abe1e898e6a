//! Named worker threads that are all joined at shutdown

use parking_lot::Mutex;
use std::io;
use std::thread::{self, JoinHandle};

#[derive(Default)]
pub struct Workers {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: String, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name).spawn(f)?;
        let mut handles = self.handles.lock();
        // Finished threads have nothing left to join
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Threads that have not finished yet
    pub fn active(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every worker. Workers must already have been told to stop.
    pub fn join_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::warn!("Worker {} panicked", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_join_all_waits() {
        let workers = Workers::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let counter = counter.clone();
            workers
                .spawn(format!("test-{}", i), move || {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        workers.join_all();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(workers.active(), 0);
    }
}
