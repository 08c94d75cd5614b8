//! Delivery evaluation.
//!
//! Given a device's outstanding actions and the current time, classify each
//! one as deliverable, expired, eligible for resend, or held, and derive
//! the reply set plus the status mutations it implies. Classification is a
//! pure function; the caller fetches candidates and hands the generated
//! updates to the update queue, so nothing here blocks the reply path.

use dmp_proto::{EncryptionMethod, ReplyAction};

use crate::model::{Action, ActionStatus, PendingUpdate, ProgressEntry};

/// Upper bound on candidates considered per poll cycle.
pub const CANDIDATE_PAGE_SIZE: i64 = 15;

/// Progress label for the first delivery.
pub const PROGRESS_SENT: &str = "sent to device";

/// Progress label for a resend.
pub const PROGRESS_RESENT: &str = "resent to device";

/// Progress label for an expired action.
pub const PROGRESS_TIMED_OUT: &str = "timed out";

/// Progress label when the resend budget is spent.
pub const PROGRESS_RESENDS_EXHAUSTED: &str = "max. resends exhausted";

/// What one evaluation pass decided for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the action to the device now; apply the carried transition.
    Deliver(PendingUpdate),

    /// The absolute deadline passed; close the action as timed out.
    Expire(PendingUpdate),

    /// The resend budget is spent; close the action.
    Exhaust(PendingUpdate),

    /// Not due yet; leave untouched and reconsider on a later poll.
    Hold,
}

impl Disposition {
    /// The status mutation this disposition implies, if any.
    pub fn update(&self) -> Option<&PendingUpdate> {
        match self {
            Disposition::Deliver(update)
            | Disposition::Expire(update)
            | Disposition::Exhaust(update) => Some(update),
            Disposition::Hold => None,
        }
    }

    /// Whether the action goes into the reply.
    pub fn delivers(&self) -> bool {
        matches!(self, Disposition::Deliver(_))
    }
}

/// Classify one candidate at `now_ms`.
///
/// Transition order matters: expiry trumps everything, a pending action is
/// always a first send, and only already-sent actions consult the resend
/// bookkeeping.
pub fn classify(action: &Action, now_ms: i64) -> Disposition {
    if action.timeout_at <= now_ms {
        return Disposition::Expire(transition(
            action,
            ActionStatus::TimedOut,
            now_ms,
            PROGRESS_TIMED_OUT,
            None,
        ));
    }

    match action.status {
        ActionStatus::Pending => Disposition::Deliver(transition(
            action,
            ActionStatus::Sent,
            now_ms,
            PROGRESS_SENT,
            Some(now_ms + action.resends.resend_timeout),
        )),
        ActionStatus::Sent | ActionStatus::Resent => {
            if action.resends.num_resends >= action.resends.max_resends {
                Disposition::Exhaust(transition(
                    action,
                    ActionStatus::ResendsExhausted,
                    now_ms,
                    PROGRESS_RESENDS_EXHAUSTED,
                    None,
                ))
            } else if action.resends.resend_after.is_some_and(|due| due <= now_ms) {
                Disposition::Deliver(transition(
                    action,
                    ActionStatus::Resent,
                    now_ms,
                    PROGRESS_RESENT,
                    Some(now_ms + action.resends.resend_timeout),
                ))
            } else {
                // An unarmed resend deadline also holds; expiry will close
                // the action eventually.
                Disposition::Hold
            }
        }
        // Closed statuses never reach the candidate set; hold defensively.
        ActionStatus::TimedOut | ActionStatus::ResendsExhausted | ActionStatus::Terminal(_) => {
            Disposition::Hold
        }
    }
}

fn transition(
    action: &Action,
    status: ActionStatus,
    now_ms: i64,
    label: &str,
    resend_after: Option<i64>,
) -> PendingUpdate {
    PendingUpdate {
        action_id: action.id.clone(),
        status,
        progress: ProgressEntry {
            timestamp: now_ms,
            status: label.to_string(),
        },
        resend_after,
    }
}

/// The outcome of one evaluation pass over a candidate page.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Actions to hand to the device, in candidate order.
    pub reply: Vec<ReplyAction>,

    /// Status mutations to enqueue, in candidate order.
    pub updates: Vec<PendingUpdate>,

    /// Reply-wide negotiated cipher label.
    pub encryption: EncryptionMethod,
}

/// Evaluate a candidate page at `now_ms`.
///
/// Every candidate participates in encryption negotiation, delivered or
/// not: the negotiated method is the strongest one observed.
pub fn evaluate(candidates: &[Action], now_ms: i64) -> Evaluation {
    let mut reply = Vec::new();
    let mut updates = Vec::new();
    let mut encryption = EncryptionMethod::None;

    for action in candidates {
        encryption = encryption.negotiate(action.encryption.method);

        let disposition = classify(action, now_ms);
        if disposition.delivers() {
            reply.push(ReplyAction {
                action: action.action.clone(),
                request_id: action.request_id.clone(),
                params: action.params.clone(),
            });
        }
        if let Some(update) = disposition.update() {
            updates.push(update.clone());
        }
    }

    Evaluation {
        reply,
        updates,
        encryption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionEncryption, Resends};
    use proptest::prelude::*;
    use rstest::rstest;

    const NOW: i64 = 1_700_000_000_000;

    fn base_action(id: &str) -> Action {
        Action {
            id: id.to_string(),
            device_id: "dev-1".to_string(),
            tokencard_id: "card-1".to_string(),
            encryption: ActionEncryption {
                method: EncryptionMethod::None,
                tokencard_id: "card-1".to_string(),
            },
            action: "set-interval".to_string(),
            request_id: format!("req-{id}"),
            params: None,
            status: ActionStatus::Pending,
            timeout_at: NOW + 60_000,
            resends: Resends {
                resend_timeout: 30_000,
                num_resends: 0,
                max_resends: 3,
                resend_after: None,
            },
            progress: vec![ProgressEntry {
                timestamp: NOW - 1_000,
                status: "created".to_string(),
            }],
        }
    }

    #[test]
    fn pending_action_is_a_first_send() {
        let action = base_action("a-1");
        let disposition = classify(&action, NOW);

        let Disposition::Deliver(update) = disposition else {
            panic!("expected Deliver, got {disposition:?}");
        };
        assert_eq!(update.status, ActionStatus::Sent);
        assert_eq!(update.progress.status, PROGRESS_SENT);
        assert_eq!(update.progress.timestamp, NOW);
        assert_eq!(update.resend_after, Some(NOW + 30_000));
        assert!(!update.increments_resends());
    }

    #[rstest]
    #[case(ActionStatus::Pending)]
    #[case(ActionStatus::Sent)]
    #[case(ActionStatus::Resent)]
    fn expiry_trumps_every_status(#[case] status: ActionStatus) {
        let mut action = base_action("a-1");
        action.status = status;
        action.timeout_at = NOW;

        let Disposition::Expire(update) = classify(&action, NOW) else {
            panic!("expected Expire");
        };
        assert_eq!(update.status, ActionStatus::TimedOut);
        assert_eq!(update.progress.status, PROGRESS_TIMED_OUT);
        assert_eq!(update.resend_after, None);
    }

    #[test]
    fn due_resend_fires() {
        let mut action = base_action("a-1");
        action.status = ActionStatus::Sent;
        action.resends.resend_after = Some(NOW - 1);

        let Disposition::Deliver(update) = classify(&action, NOW) else {
            panic!("expected Deliver");
        };
        assert_eq!(update.status, ActionStatus::Resent);
        assert_eq!(update.progress.status, PROGRESS_RESENT);
        assert_eq!(update.resend_after, Some(NOW + 30_000));
        assert!(update.increments_resends());
    }

    #[test]
    fn undue_resend_is_held() {
        let mut action = base_action("a-1");
        action.status = ActionStatus::Sent;
        action.resends.resend_after = Some(NOW + 1);

        assert_eq!(classify(&action, NOW), Disposition::Hold);
        // Idempotent while the condition holds.
        assert_eq!(classify(&action, NOW), Disposition::Hold);
    }

    #[test]
    fn unarmed_resend_deadline_is_held() {
        let mut action = base_action("a-1");
        action.status = ActionStatus::Sent;
        action.resends.resend_after = None;

        assert_eq!(classify(&action, NOW), Disposition::Hold);
    }

    #[rstest]
    #[case(3, 3)]
    #[case(4, 3)]
    fn spent_resend_budget_exhausts(#[case] num: u32, #[case] max: u32) {
        let mut action = base_action("a-1");
        action.status = ActionStatus::Resent;
        action.resends.num_resends = num;
        action.resends.max_resends = max;
        action.resends.resend_after = Some(NOW - 1);

        let Disposition::Exhaust(update) = classify(&action, NOW) else {
            panic!("expected Exhaust");
        };
        assert_eq!(update.status, ActionStatus::ResendsExhausted);
        assert_eq!(update.progress.status, PROGRESS_RESENDS_EXHAUSTED);
        // Closing the action must not move the counter.
        assert!(!update.increments_resends());
    }

    #[test]
    fn evaluation_splits_reply_and_updates() {
        let deliverable = base_action("a-deliver");

        let mut expired = base_action("a-expired");
        expired.timeout_at = NOW - 1;

        let mut held = base_action("a-held");
        held.status = ActionStatus::Sent;
        held.resends.resend_after = Some(NOW + 10_000);

        let mut exhausted = base_action("a-exhausted");
        exhausted.status = ActionStatus::Resent;
        exhausted.resends.num_resends = 3;

        let evaluation = evaluate(&[deliverable, expired, held, exhausted], NOW);

        assert_eq!(evaluation.reply.len(), 1);
        assert_eq!(evaluation.reply[0].request_id, "req-a-deliver");
        // One update each for delivered, expired, and exhausted; none for held.
        assert_eq!(evaluation.updates.len(), 3);
        assert_eq!(evaluation.updates[0].status, ActionStatus::Sent);
        assert_eq!(evaluation.updates[1].status, ActionStatus::TimedOut);
        assert_eq!(evaluation.updates[2].status, ActionStatus::ResendsExhausted);
    }

    #[test]
    fn reply_items_carry_only_the_command() {
        let mut action = base_action("a-1");
        action.params = Some(serde_json::json!({ "seconds": 30 }));

        let evaluation = evaluate(&[action], NOW);
        let wire = serde_json::to_value(&evaluation.reply[0]).unwrap();

        assert_eq!(wire["action"], "set-interval");
        assert_eq!(wire["requestId"], "req-a-1");
        assert_eq!(wire["params"]["seconds"], 30);
        assert!(wire.get("status").is_none());
        assert!(wire.get("timeoutAt").is_none());
        assert!(wire.get("encryption").is_none());
    }

    #[test]
    fn negotiation_takes_the_strongest_observed_method() {
        let mut hmac = base_action("a-1");
        hmac.encryption.method = EncryptionMethod::HmacSha256;

        let mut aes_but_expired = base_action("a-2");
        aes_but_expired.encryption.method = EncryptionMethod::Aes256Gcm;
        aes_but_expired.timeout_at = NOW - 1;

        let evaluation = evaluate(&[hmac, aes_but_expired], NOW);
        assert_eq!(evaluation.encryption, EncryptionMethod::Aes256Gcm);
    }

    #[test]
    fn empty_candidate_page_negotiates_none() {
        let evaluation = evaluate(&[], NOW);
        assert!(evaluation.reply.is_empty());
        assert!(evaluation.updates.is_empty());
        assert_eq!(evaluation.encryption, EncryptionMethod::None);
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        (
            0i32..3,
            NOW - 100_000..NOW + 100_000,
            0u32..5,
            0u32..5,
            proptest::option::of(NOW - 100_000..NOW + 100_000),
        )
            .prop_map(|(status, timeout_at, num, max, resend_after)| {
                let mut action = base_action("a-prop");
                action.status = ActionStatus::from_code(status);
                action.timeout_at = timeout_at;
                action.resends.num_resends = num;
                action.resends.max_resends = max;
                action.resends.resend_after = resend_after;
                action
            })
    }

    proptest! {
        // Every disposition with an update targets the classified action,
        // stamps `now`, and arms a future resend deadline only on delivery.
        #[test]
        fn transitions_are_well_formed(action in arb_action()) {
            let disposition = classify(&action, NOW);
            if let Some(update) = disposition.update() {
                prop_assert_eq!(&update.action_id, &action.id);
                prop_assert_eq!(update.progress.timestamp, NOW);
                prop_assert!(update.validate().is_ok());
                prop_assert!(update.status.code() >= action.status.code());
                match (&disposition, update.resend_after) {
                    (Disposition::Deliver(_), Some(due)) => prop_assert!(due > NOW),
                    (Disposition::Deliver(_), None) => prop_assert!(false, "delivery must arm a resend deadline"),
                    (_, after) => prop_assert_eq!(after, None),
                }
            }
        }

        // Held actions produce no update at all, so re-evaluating while the
        // hold condition lasts is idempotent.
        #[test]
        fn holds_are_silent(action in arb_action()) {
            if classify(&action, NOW) == Disposition::Hold {
                prop_assert_eq!(classify(&action, NOW), Disposition::Hold);
            }
        }
    }
}
