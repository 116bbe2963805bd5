//! Background session worker.
//!
//! The pipeline is synchronous and stateful, so each session gets a dedicated
//! worker thread that owns its `Pipeline`. Callers talk to the worker through
//! a [`SessionHandle`]: chunks go in over a crossbeam channel, outcomes come
//! back over a tokio mpsc channel so async callers can await them. Commands
//! are handled strictly in arrival order.

use crate::error::{KarascoreError, Result};
use crate::pipeline::{ChunkOutcome, FinalOutcome, Pipeline};
use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Commands accepted by the worker thread.
enum Command {
    Chunk(Vec<f32>),
    Finalize,
}

/// A scored event emitted by the worker, in chunk order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Chunk(ChunkOutcome),
    Final(FinalOutcome),
    /// A chunk or finalize failed; the session keeps running unless the
    /// error is fatal to the stream order.
    Error(String),
}

/// Client side of a running session.
///
/// Dropping the handle without calling [`SessionHandle::finalize`] closes the
/// command channel; the worker then exits and the session's scores are
/// discarded.
pub struct SessionHandle {
    commands: Option<Sender<Command>>,
    events: mpsc::Receiver<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Spawns a worker thread around a ready pipeline.
    pub fn spawn(pipeline: Pipeline) -> Result<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = mpsc::channel(16);
        let worker = std::thread::Builder::new()
            .name("karascore-session".to_string())
            .spawn(move || run_worker(pipeline, command_rx, event_tx))?;
        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            worker: Some(worker),
        })
    }

    /// Queues one audio chunk for scoring.
    pub fn submit_chunk(&self, chunk: Vec<f32>) -> Result<()> {
        self.send(Command::Chunk(chunk), "worker stopped accepting chunks")
    }

    /// Requests the final score. Outcomes for all previously queued chunks
    /// are emitted first.
    pub fn finalize(&self) -> Result<()> {
        self.send(Command::Finalize, "worker stopped before finalize")
    }

    fn send(&self, command: Command, closed_message: &str) -> Result<()> {
        let sender = self
            .commands
            .as_ref()
            .ok_or_else(|| KarascoreError::SessionClosed {
                message: closed_message.to_string(),
            })?;
        sender
            .send(command)
            .map_err(|_| KarascoreError::SessionClosed {
                message: closed_message.to_string(),
            })
    }

    /// Awaits the next scored event. `None` once the worker has exited and
    /// all events were consumed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Blocking variant of [`SessionHandle::next_event`] for sync callers.
    pub fn next_event_blocking(&mut self) -> Option<SessionEvent> {
        self.events.blocking_recv()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Close the command channel so the worker's recv loop ends.
        drop(self.commands.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("session worker panicked");
        }
    }
}

fn run_worker(
    mut pipeline: Pipeline,
    commands: Receiver<Command>,
    events: mpsc::Sender<SessionEvent>,
) {
    for command in commands.iter() {
        let event = match command {
            Command::Chunk(chunk) => match pipeline.process_and_score(&chunk) {
                Ok(outcome) => SessionEvent::Chunk(outcome),
                Err(e) => {
                    log::warn!("chunk scoring failed: {e}");
                    SessionEvent::Error(e.to_string())
                }
            },
            Command::Finalize => {
                let event = match pipeline.final_score() {
                    Ok(outcome) => SessionEvent::Final(outcome),
                    Err(e) => {
                        log::warn!("finalize failed: {e}");
                        SessionEvent::Error(e.to_string())
                    }
                };
                let _ = events.blocking_send(event);
                return;
            }
        };
        if events.blocking_send(event).is_err() {
            // Receiver gone; nothing left to score for.
            return;
        }
    }
}
