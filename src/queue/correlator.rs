//! Correlation-aware response queue with a bounded wait.
//!
//! [`ResponseCorrelator`] is a FIFO of served [`Message`]s. A waiter asks for
//! one correlation id and is released only when the message at the **head**
//! of the queue carries that id.
//!
//! # Ordering dependency
//!
//! Matching never looks past the head. Responses must therefore be waited on
//! in the order they are published: with `[5, 6, 7]` queued, a waiter for `6`
//! stays suspended until some other waiter has popped `5`, or until its own
//! timeout elapses. The single-consumer dispatch loop publishes responses in
//! request order, which is what makes this discipline hold. A response whose
//! waiter timed out stays at the head and blocks every later waiter.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::Message;
use crate::error::DispatchError;

/// Blocking response queue keyed by `sequence.internal_id`.
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    responses: Mutex<VecDeque<Message>>,
    changed: Notify,
}

impl ResponseCorrelator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a served message and wakes every waiter to re-check the head.
    pub fn push(&self, response: Message) {
        self.responses.lock().push_back(response);
        self.changed.notify_waiters();
    }

    /// Pops the head if it carries `correlation_id`.
    fn pop_if_head(&self, correlation_id: u64) -> Option<Message> {
        let mut responses = self.responses.lock();
        if responses
            .front()
            .is_some_and(|m| m.correlation_id() == correlation_id)
        {
            responses.pop_front()
        } else {
            None
        }
    }

    /// Waits until the head response carries `correlation_id` and pops it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`] if no matching head appears within
    /// `timeout`. A late response is left queued for a future waiter.
    pub async fn wait_and_pop(
        &self,
        correlation_id: u64,
        timeout: Duration,
    ) -> Result<Message, DispatchError> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            if let Some(response) = self.pop_if_head(correlation_id) {
                // The new head may belong to another waiter.
                self.changed.notify_waiters();
                return Ok(response);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(correlation_id, waited_ms, "correlated wait timed out");
                return Err(DispatchError::Timeout {
                    correlation_id,
                    waited_ms,
                });
            }
        }
    }

    /// Returns the correlation id at the head, if any.
    #[must_use]
    pub fn head_id(&self) -> Option<u64> {
        self.responses.lock().front().map(Message::correlation_id)
    }

    /// Returns the number of unclaimed responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    /// Returns `true` if no responses are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }
}
