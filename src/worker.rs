//! A bounded pool of OS threads for the CPU-bound side of the engine
//! (pack/idx loading, delta resolution). Kept deliberately separate from
//! the async transport path, which stays on `tokio` tasks.

use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{GitError, Result};

type Job = Box<dyn FnOnce() + Send>;

pub struct WorkerPool {
    sender: Sender<Job>,
    _handles: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let mut handles = Vec::with_capacity(capacity);

        for _ in 0..capacity.max(1) {
            let receiver = receiver.clone();
            handles.push(std::thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            }));
        }

        WorkerPool {
            sender,
            _handles: handles,
        }
    }

    /// Opens a scope: jobs spawned on it may borrow from the caller's
    /// stack, since `join` blocks until every job spawned on this scope
    /// has finished running before returning.
    pub fn scope<'a>(&'a self) -> PoolScope<'a> {
        PoolScope {
            sender: &self.sender,
            pending: Arc::new((Mutex::new(0usize), Condvar::new())),
            first_error: Arc::new(Mutex::new(None)),
        }
    }
}

pub struct PoolScope<'a> {
    sender: &'a Sender<Job>,
    pending: Arc<(Mutex<usize>, Condvar)>,
    first_error: Arc<Mutex<Option<GitError>>>,
}

impl<'a> PoolScope<'a> {
    /// Queues `f` for the pool. `f` may borrow anything alive for `'a`,
    /// since `join` won't return until every job spawned on this scope
    /// has run to completion and released its borrows.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'a,
    {
        {
            let (count, _) = &*self.pending;
            *count.lock().unwrap() += 1;
        }

        let pending = Arc::clone(&self.pending);
        let first_error = Arc::clone(&self.first_error);
        let job: Box<dyn FnOnce() + Send + 'a> = Box::new(move || {
            if let Err(e) = f() {
                let mut slot = first_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
            let (count, cvar) = &*pending;
            let mut count = count.lock().unwrap();
            *count -= 1;
            if *count == 0 {
                cvar.notify_all();
            }
        });

        // Safety: `join` blocks until `pending` drops to zero, which only
        // happens after every job spawned on this scope (including this
        // one) has finished running, so no job outlives the borrows it
        // closed over even though the channel itself requires `'static`.
        let job: Job = unsafe {
            std::mem::transmute::<Box<dyn FnOnce() + Send + 'a>, Box<dyn FnOnce() + Send + 'static>>(job)
        };
        let _ = self.sender.send(job);
    }

    /// Blocks until every job spawned on this scope has finished, then
    /// surfaces the first error any of them returned.
    pub fn join(self) -> Result<()> {
        let (count, cvar) = &*self.pending;
        let mut count = count.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
        drop(count);

        let mut slot = self.first_error.lock().unwrap();
        match slot.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_all_jobs_and_joins_cleanly() {
        let pool = WorkerPool::new(4);
        let counter = AtomicUsize::new(0);
        let scope = pool.scope();
        for _ in 0..20 {
            scope.spawn(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        scope.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn surfaces_first_error() {
        let pool = WorkerPool::new(2);
        let scope = pool.scope();
        scope.spawn(|| Err(GitError::pack_broken("boom")));
        scope.spawn(|| Ok(()));
        assert!(scope.join().is_err());
    }

    #[test]
    fn borrows_caller_stack_data() {
        let pool = WorkerPool::new(4);
        let values = [1usize, 2, 3, 4, 5];
        let sum = AtomicUsize::new(0);
        let scope = pool.scope();
        for v in &values {
            scope.spawn(|| {
                sum.fetch_add(*v, Ordering::SeqCst);
                Ok(())
            });
        }
        scope.join().unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 15);
    }
}
