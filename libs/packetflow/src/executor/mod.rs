// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Executors: fixed pools of OS worker threads, one pool per scheduler
//! queue.
//!
//! A worker blocks only while its queue is empty (waiting on the wakeup
//! channel) or, transiently, while a node it is running is backpressured
//! against a full downstream buffer. Shutdown is cooperative: a signal per
//! worker, then join, with the queue drained before exit so close items are
//! never abandoned.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{FlowError, Result};
use crate::scheduler::{Scheduler, SchedulerQueue};

/// A named pool of worker threads serving one scheduler queue.
pub(crate) struct ExecutorPool {
    name: String,
    threads: Vec<JoinHandle<()>>,
    shutdown_tx: crossbeam_channel::Sender<()>,
}

impl ExecutorPool {
    pub fn spawn(
        name: &str,
        workers: usize,
        queue: Arc<SchedulerQueue>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded::<()>();
        let mut threads = Vec::with_capacity(workers);

        for i in 0..workers {
            let queue = Arc::clone(&queue);
            let scheduler = Arc::clone(&scheduler);
            let shutdown_rx = shutdown_rx.clone();
            let wakeup_rx = queue.wakeup_receiver();
            let thread_name = format!("packetflow-{}-{}", name, i);

            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    run_worker_loop(&thread_name, &queue, &scheduler, &shutdown_rx, &wakeup_rx);
                })
                .map_err(|e| {
                    FlowError::Runtime(format!("Failed to spawn worker thread: {}", e))
                })?;
            threads.push(handle);
        }

        tracing::debug!("Executor '{}' started with {} workers", name, workers);

        Ok(ExecutorPool {
            name: name.to_string(),
            threads,
            shutdown_tx,
        })
    }

    /// Signal every worker and join them. Idempotent.
    pub fn shutdown(&mut self) {
        for _ in 0..self.threads.len() {
            let _ = self.shutdown_tx.send(());
        }

        let thread_count = self.threads.len();
        for (i, handle) in self.threads.drain(..).enumerate() {
            match handle.join() {
                Ok(()) => tracing::debug!(
                    "[{}] Worker joined ({}/{})",
                    self.name,
                    i + 1,
                    thread_count
                ),
                Err(e) => tracing::error!(
                    "[{}] Worker panicked ({}/{}): {:?}",
                    self.name,
                    i + 1,
                    thread_count,
                    e
                ),
            }
        }
    }
}

fn run_worker_loop(
    thread_name: &str,
    queue: &SchedulerQueue,
    scheduler: &Scheduler,
    shutdown_rx: &crossbeam_channel::Receiver<()>,
    wakeup_rx: &crossbeam_channel::Receiver<()>,
) {
    tracing::trace!("[{}] Worker started", thread_name);

    loop {
        crossbeam_channel::select! {
            recv(shutdown_rx) -> _ => break,
            recv(wakeup_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                // One wakeup token per pushed item; a miss just means
                // another worker got there first.
                if let Some(item) = queue.try_pop() {
                    scheduler.run_item(item);
                }
            }
        }
    }

    // Drain whatever is still queued (finalization items during teardown).
    while let Some(item) = queue.try_pop() {
        scheduler.run_item(item);
    }

    tracing::trace!("[{}] Worker stopped", thread_name);
}
