//! Bounded single-wait long-poll coordination.
//!
//! One poll is at most two evaluation cycles around at most one
//! suspension: evaluate; if something is deliverable or the caller brought
//! no wait budget, respond immediately; otherwise sleep exactly the budget,
//! zero it, evaluate once more, and respond unconditionally. This is
//! deliberately not a retry loop — total suspension per request is bounded
//! by the one wait period, which fixes the observable latency and
//! throughput behavior of the poll channel.
//!
//! The wait is a pure suspension point: no store connection is held across
//! it, and the request identity is not re-validated afterwards (only the
//! wait budget has mutated). A pending wait ends early only on process
//! shutdown, which tears the whole task down.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use dmp_proto::{EncryptionMethod, PollRequest, ReplyAction};

use crate::db::{ActionStore, StoreError};
use crate::evaluator::{self, CANDIDATE_PAGE_SIZE};
use crate::model::now_ms;
use crate::queue::UpdateQueue;

/// What one completed poll hands back to the request handler.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// Deliverable actions, possibly empty.
    pub actions: Vec<ReplyAction>,

    /// Reply-wide negotiated cipher label.
    pub encryption: EncryptionMethod,
}

/// Drives poll cycles against the action store.
#[derive(Clone)]
pub struct LongPollCoordinator {
    store: Arc<dyn ActionStore>,
    queue: UpdateQueue,
}

impl LongPollCoordinator {
    pub fn new(store: Arc<dyn ActionStore>, queue: UpdateQueue) -> Self {
        Self { store, queue }
    }

    /// Serve one poll request.
    ///
    /// Mutates `request.body.timeout` to zero once the single wait has been
    /// spent, so a re-entered cycle can never wait again.
    pub async fn poll(&self, request: &mut PollRequest) -> Result<PollOutcome, StoreError> {
        let first = self.cycle(request).await?;
        if !first.actions.is_empty() || request.body.timeout == 0 {
            return Ok(first);
        }

        let wait = Duration::from_secs(request.body.timeout);
        request.body.timeout = 0;
        debug!(
            device_id = %request.header.device_id,
            wait_secs = wait.as_secs(),
            "Nothing deliverable; suspending for the wait budget"
        );
        tokio::time::sleep(wait).await;

        // Second and final cycle; responds regardless of outcome.
        self.cycle(request).await
    }

    /// One evaluation cycle: fetch candidates, classify, enqueue the
    /// implied updates, and return the reply set. The updates never block
    /// the reply path.
    async fn cycle(&self, request: &PollRequest) -> Result<PollOutcome, StoreError> {
        let candidates = self
            .store
            .candidate_actions(
                &request.header.device_id,
                &request.header.encryption.tokencard_id,
                CANDIDATE_PAGE_SIZE,
            )
            .await?;

        let evaluation = evaluator::evaluate(&candidates, now_ms());

        debug!(
            device_id = %request.header.device_id,
            candidates = candidates.len(),
            deliverable = evaluation.reply.len(),
            updates = evaluation.updates.len(),
            "Evaluated poll cycle"
        );

        for update in evaluation.updates {
            self.queue.enqueue(update);
        }

        Ok(PollOutcome {
            actions: evaluation.reply,
            encryption: evaluation.encryption,
        })
    }
}
