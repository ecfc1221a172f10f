use crate::models::frame_cache::PreviousFrameCache;
use crate::{Result, SlingerError};
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// State owned by the queue thread; only jobs running on the queue touch it
#[derive(Debug)]
pub struct QueueState {
    pub frame_cache: PreviousFrameCache,
}

pub type MutationResult = std::result::Result<(), SlingerError>;

type Job = Box<dyn FnOnce(&mut QueueState) -> MutationResult + Send + 'static>;

/// Messages dispatched to the mutation thread
enum QueueMessage {
    Execute {
        description: &'static str,
        job: Job,
        done: oneshot::Sender<MutationResult>,
    },
    Shutdown,
}

/// Outcome of a queued window mutation.
///
/// Await it from async code, call [`MutationTicket::wait`] from a plain
/// thread, or drop it to fire and forget.
#[derive(Debug)]
#[must_use = "dropping a ticket discards the mutation's outcome"]
pub struct MutationTicket {
    state: TicketState,
}

#[derive(Debug)]
enum TicketState {
    Pending(oneshot::Receiver<MutationResult>),
    Ready(Option<MutationResult>),
}

impl MutationTicket {
    /// A ticket that has already resolved, for mutations rejected up front
    pub fn resolved(result: MutationResult) -> Self {
        Self {
            state: TicketState::Ready(Some(result)),
        }
    }

    pub fn failed(error: SlingerError) -> Self {
        Self::resolved(Err(error))
    }

    /// Block the current thread until the mutation has run.
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> MutationResult {
        match self.state {
            TicketState::Pending(receiver) => receiver
                .blocking_recv()
                .unwrap_or_else(|_| Err(SlingerError::QueueClosed("mutation".into()))),
            TicketState::Ready(result) => result.unwrap_or(Ok(())),
        }
    }
}

impl Future for MutationTicket {
    type Output = MutationResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            TicketState::Pending(receiver) => Pin::new(receiver).poll(cx).map(|outcome| {
                outcome.unwrap_or_else(|_| Err(SlingerError::QueueClosed("mutation".into())))
            }),
            TicketState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
        }
    }
}

/// Serial worker thread that applies window mutations in submission order
pub struct MutationQueue {
    name: String,
    sender: Sender<QueueMessage>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MutationQueue {
    /// Spawn the worker thread with its initial state
    pub fn spawn(name: impl Into<String>, state: QueueState) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<QueueMessage>();
        let thread_name = name.clone();

        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut state = state;
                while let Ok(message) = receiver.recv() {
                    match message {
                        QueueMessage::Execute {
                            description,
                            job,
                            done,
                        } => {
                            let outcome = job(&mut state);
                            if let Err(err) = &outcome {
                                warn!(mutation = description, error = %err, "Window mutation failed");
                            }
                            // the ticket may have been dropped; that is fire-and-forget
                            let _ = done.send(outcome);
                        }
                        QueueMessage::Shutdown => break,
                    }
                }
                debug!(queue = %thread_name, "Mutation queue stopped");
            })
            .map_err(|err| {
                SlingerError::MacOSAPIError(format!(
                    "Failed to spawn mutation queue '{}' thread: {}",
                    name, err
                ))
            })?;

        Ok(Self {
            name,
            sender,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job` behind every previously submitted mutation
    pub fn submit<F>(&self, description: &'static str, job: F) -> MutationTicket
    where
        F: FnOnce(&mut QueueState) -> MutationResult + Send + 'static,
    {
        let (done, receiver) = oneshot::channel();
        let message = QueueMessage::Execute {
            description,
            job: Box::new(job),
            done,
        };
        match self.sender.send(message) {
            Ok(()) => MutationTicket {
                state: TicketState::Pending(receiver),
            },
            Err(_) => {
                warn!(queue = %self.name, mutation = description, "Mutation queue is closed");
                MutationTicket::failed(SlingerError::QueueClosed(self.name.clone()))
            }
        }
    }

    /// Ticket that resolves once everything submitted so far has run
    pub fn flush(&self) -> MutationTicket {
        self.submit("flush", |_| Ok(()))
    }

    /// Signal the worker to stop after pending mutations and wait for it
    pub fn shutdown(&self) -> Result<()> {
        let handle = self
            .join_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        self.sender.send(QueueMessage::Shutdown).map_err(|_| {
            SlingerError::QueueClosed(self.name.clone())
        })?;
        handle.join().map_err(|_| {
            SlingerError::MacOSAPIError(format!(
                "Mutation queue '{}' panicked during shutdown",
                self.name
            ))
        })?;
        Ok(())
    }
}

impl Drop for MutationQueue {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(queue = %self.name, error = %err, "Mutation queue did not shut down cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn queue(name: &str) -> MutationQueue {
        MutationQueue::spawn(
            name,
            QueueState {
                frame_cache: PreviousFrameCache::default(),
            },
        )
        .unwrap()
    }

    #[test]
    fn jobs_run_in_submission_order() {
        let queue = queue("order");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..5 {
            let seen = seen.clone();
            let _ = queue.submit("record", move |_| {
                seen.lock().unwrap().push(n);
                Ok(())
            });
        }
        queue.flush().wait().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failures_are_reported_through_the_ticket() {
        let queue = queue("failure");
        let ticket = queue.submit("failing", |_| {
            Err(SlingerError::WindowUnavailable("gone".into()))
        });
        assert_eq!(
            ticket.wait(),
            Err(SlingerError::WindowUnavailable("gone".into()))
        );
    }

    #[tokio::test]
    async fn tickets_can_be_awaited() {
        let queue = queue("await");
        let ticket = queue.submit("noop", |state| {
            assert!(state.frame_cache.is_empty());
            Ok(())
        });
        assert_eq!(ticket.await, Ok(()));
    }

    #[test]
    fn submitting_after_shutdown_fails_the_ticket() {
        let queue = queue("closed");
        queue.shutdown().unwrap();
        assert_eq!(
            queue.flush().wait(),
            Err(SlingerError::QueueClosed("closed".into()))
        );
    }

    #[test]
    fn resolved_tickets_report_immediately() {
        let ticket = MutationTicket::failed(SlingerError::NoTargetScreen);
        assert_eq!(ticket.wait(), Err(SlingerError::NoTargetScreen));
    }
}
