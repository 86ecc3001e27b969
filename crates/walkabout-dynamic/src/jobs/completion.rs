//! Thread-safe completion signalling from regeneration workers

use super::RegenerationTicket;
use std::sync::mpsc::Sender;
use walkabout_common::{Error, Result};

/// Result of one regeneration, as delivered back to the scheduler
#[derive(Debug)]
pub struct Completion {
    pub ticket: RegenerationTicket,
    pub result: Result<()>,
}

/// One-shot handle a worker uses to report a finished regeneration.
///
/// Dropping the handle without reporting counts as a failure, so a crashed or
/// cancelled worker cannot leave a mesh stuck in `Regenerating`.
#[derive(Debug)]
pub struct CompletionHandle {
    ticket: RegenerationTicket,
    sender: Option<Sender<Completion>>,
}

impl CompletionHandle {
    pub fn new(ticket: RegenerationTicket, sender: Sender<Completion>) -> Self {
        Self {
            ticket,
            sender: Some(sender),
        }
    }

    pub fn ticket(&self) -> RegenerationTicket {
        self.ticket
    }

    pub fn complete(mut self, result: Result<()>) {
        self.send(result);
    }

    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(Err(Error::Regeneration(reason.into())));
    }

    fn send(&mut self, result: Result<()>) {
        if let Some(sender) = self.sender.take() {
            let completion = Completion {
                ticket: self.ticket,
                result,
            };
            if sender.send(completion).is_err() {
                log::debug!(
                    "Dispatcher for {} is gone, dropping completion",
                    self.ticket.mesh
                );
            }
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::warn!(
                "Regeneration of {} finished without reporting a result",
                self.ticket.mesh
            );
            self.send(Err(Error::Regeneration(
                "completion handle dropped without a result".to_string(),
            )));
        }
    }
}
