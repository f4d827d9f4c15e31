//! Completion queue for marshalling work onto a host thread.
//!
//! Worker threads enqueue zero-argument actions through a [`QueueHandle`];
//! the host loop calls [`CompletionQueue::drain`] once per tick and runs them
//! in FIFO order on its own thread. The engine never depends on this; it is a
//! presentation-side sink.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Action = Box<dyn FnOnce() + Send + 'static>;

/// Receiving side, owned by the host loop.
pub struct CompletionQueue {
    tx: UnboundedSender<Action>,
    rx: UnboundedReceiver<Action>,
}

/// Cloneable sending side.
#[derive(Clone)]
pub struct QueueHandle {
    tx: UnboundedSender<Action>,
}

impl CompletionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Handle for enqueueing actions from any thread.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
        }
    }

    /// Runs every action queued so far, in order. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(action) = self.rx.try_recv() {
            action();
            ran += 1;
        }
        ran
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueHandle {
    /// Schedules `action` to run on the draining thread.
    pub fn execute<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The receiver lives as long as the queue; after it is gone there is
        // nobody left to present the result.
        let _ = self.tx.send(Box::new(action));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_drain_runs_in_fifo_order() {
        let mut queue = CompletionQueue::new();
        let handle = queue.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            handle.execute(move || order.lock().unwrap().push(i));
        }

        assert_eq!(queue.drain(), 5);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_actions_run_on_draining_thread() {
        let mut queue = CompletionQueue::new();
        let handle = queue.handle();
        let ran_on = Arc::new(Mutex::new(None));
        let ran_on_clone = Arc::clone(&ran_on);

        thread::spawn(move || {
            handle.execute(move || {
                *ran_on_clone.lock().unwrap() = Some(thread::current().id());
            });
        })
        .join()
        .unwrap();

        queue.drain();
        assert_eq!(*ran_on.lock().unwrap(), Some(thread::current().id()));
    }

    #[test]
    fn test_execute_after_queue_dropped() {
        let queue = CompletionQueue::new();
        let handle = queue.handle();
        drop(queue);

        handle.execute(|| panic!("must not run"));
    }
}
