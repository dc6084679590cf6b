//! Multi-producer, single-consumer command queue.
//!
//! Any thread may enqueue through a [`CommandSender`]; only the owner thread
//! holds the [`CommandQueue`] and applies commands. Per-producer order is
//! preserved, and the owner applies commands strictly one at a time.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// What the owner should do after applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop applying; remaining queued commands stay queued.
    Halt,
}

/// Outcome of one [`CommandQueue::run_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Batch {
    pub applied: usize,
    pub halted: bool,
    /// Every sender has been dropped.
    pub disconnected: bool,
}

/// Producer handle. Cheap to clone.
#[derive(Debug)]
pub struct CommandSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for CommandSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> CommandSender<T> {
    /// Queue a command. Returns `false` if the queue is gone.
    pub fn enqueue(&self, command: T) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Consumer end, held by the owner thread.
#[derive(Debug)]
pub struct CommandQueue<T> {
    rx: Receiver<T>,
}

pub fn channel<T>() -> (CommandSender<T>, CommandQueue<T>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CommandSender { tx }, CommandQueue { rx })
}

impl<T> CommandQueue<T> {
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Wait up to `timeout` for the first command, then apply the commands
    /// that were already queued behind it. Commands enqueued while the batch
    /// runs wait for the next batch. Stops early when `apply` halts.
    pub fn run_batch<F>(&self, timeout: Duration, mut apply: F) -> Batch
    where
        F: FnMut(T) -> Flow,
    {
        let mut batch = Batch::default();
        let first = match self.rx.recv_timeout(timeout) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => return batch,
            Err(RecvTimeoutError::Disconnected) => {
                batch.disconnected = true;
                return batch;
            }
        };
        let mut remaining = self.rx.len();

        let mut next = Some(first);
        while let Some(command) = next.take() {
            batch.applied += 1;
            if apply(command) == Flow::Halt {
                batch.halted = true;
                return batch;
            }
            if remaining == 0 {
                break;
            }
            remaining -= 1;
            match self.rx.try_recv() {
                Ok(command) => next = Some(command),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => batch.disconnected = true,
            }
        }
        batch
    }

    /// Drop everything still queued. Returns how many were dropped.
    pub fn discard(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_single_producer() {
        let (tx, queue) = channel();
        for i in 0..5 {
            assert!(tx.enqueue(i));
        }
        let mut seen = Vec::new();
        let batch = queue.run_batch(Duration::from_millis(10), |i| {
            seen.push(i);
            Flow::Continue
        });
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(batch.applied, 5);
        assert!(!batch.halted);
    }

    #[test]
    fn test_per_producer_order_is_preserved() {
        let (tx, queue) = channel();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        tx.enqueue((p, i));
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        let mut last = [-1i32; 4];
        let mut total = 0;
        while total < 400 {
            queue.run_batch(Duration::from_millis(50), |(p, i)| {
                assert!(i > last[p], "producer {p} reordered");
                last[p] = i;
                total += 1;
                Flow::Continue
            });
        }
        assert_eq!(last, [99; 4]);
    }

    #[test]
    fn test_batch_ignores_commands_enqueued_while_running() {
        let (tx, queue) = channel();
        for i in 0..3 {
            tx.enqueue(i);
        }
        let feeder = tx.clone();
        let mut seen = Vec::new();
        let batch = queue.run_batch(Duration::from_millis(10), |i| {
            seen.push(i);
            feeder.enqueue(i + 100);
            Flow::Continue
        });
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(batch.applied, 3);
        assert_eq!(queue.len(), 3);

        seen.clear();
        queue.run_batch(Duration::from_millis(10), |i| {
            seen.push(i);
            Flow::Continue
        });
        assert_eq!(seen, vec![100, 101, 102]);
    }

    #[test]
    fn test_halt_stops_batch_and_discard_drops_rest() {
        let (tx, queue) = channel();
        for i in 0..6 {
            tx.enqueue(i);
        }
        let mut seen = Vec::new();
        let batch = queue.run_batch(Duration::from_millis(10), |i| {
            seen.push(i);
            if i == 2 {
                Flow::Halt
            } else {
                Flow::Continue
            }
        });
        assert!(batch.halted);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.discard(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_timeout_and_disconnect() {
        let (tx, queue) = channel::<u8>();
        let batch = queue.run_batch(Duration::from_millis(5), |_| Flow::Continue);
        assert_eq!(batch, Batch::default());

        drop(tx);
        let batch = queue.run_batch(Duration::from_millis(5), |_| Flow::Continue);
        assert!(batch.disconnected);
        assert_eq!(batch.applied, 0);
    }
}
