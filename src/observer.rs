use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use crate::error::ProbeError;
use crate::probe::Outcome;

/// Receives the outcome of every probe attempt.
///
/// Exactly one callback fires per attempt, synchronously on the probing task,
/// so implementations should not block.
pub trait ReplyHandler: Send + Sync {
    fn on_succeed(&self, endpoint: &str, elapsed: Duration, identifier: u16);

    fn on_timeout(&self, endpoint: &str, identifier: u16);

    fn on_failed(&self, endpoint: &str, cause: &ProbeError);
}

/// Fans outcomes out to the registered handlers in registration order.
#[derive(Clone, Default)]
pub(crate) struct Reporter {
    handlers: Vec<Arc<dyn ReplyHandler>>,
}

impl Reporter {
    pub(crate) fn new(handlers: Vec<Arc<dyn ReplyHandler>>) -> Self {
        Self { handlers }
    }

    pub(crate) fn report(&self, outcome: &Outcome) {
        for (position, handler) in self.handlers.iter().enumerate() {
            let delivered = catch_unwind(AssertUnwindSafe(|| deliver(handler.as_ref(), outcome)));
            if delivered.is_err() {
                log::warn!(
                    "reply handler #{} panicked on outcome for {}",
                    position,
                    outcome.endpoint()
                );
            }
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn deliver(handler: &dyn ReplyHandler, outcome: &Outcome) {
    match outcome {
        Outcome::Succeeded {
            endpoint,
            round_trip_time,
            identifier,
        } => handler.on_succeed(endpoint, *round_trip_time, *identifier),
        Outcome::TimedOut {
            endpoint,
            identifier,
        } => handler.on_timeout(endpoint, *identifier),
        Outcome::Failed { endpoint, cause } => handler.on_failed(endpoint, cause),
    }
}

/// Writes every outcome to the `log` facade.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogHandler;

impl ReplyHandler for LogHandler {
    fn on_succeed(&self, endpoint: &str, elapsed: Duration, identifier: u16) {
        log::info!("reply from {} (id {}) in {:?}", endpoint, identifier, elapsed);
    }

    fn on_timeout(&self, endpoint: &str, identifier: u16) {
        log::warn!("request to {} (id {}) timed out", endpoint, identifier);
    }

    fn on_failed(&self, endpoint: &str, cause: &ProbeError) {
        log::warn!("request to {} failed: {}", endpoint, cause);
    }
}
