//! End-to-end poll flows over the in-memory store: handler, coordinator,
//! evaluator, and drain worker wired together the way the binary wires
//! them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use dmp_delivery::db::{registered_device, Application, MemoryStore};
use dmp_delivery::handler::PollHandler;
use dmp_delivery::longpoll::LongPollCoordinator;
use dmp_delivery::model::{
    now_ms, Action, ActionEncryption, ActionStatus, ProgressEntry, Resends,
};
use dmp_delivery::queue::update_queue;
use dmp_proto::{
    EncryptionMethod, MessageType, PollBody, PollEncryption, PollHeader, PollRequest,
};

struct Worker {
    store: Arc<MemoryStore>,
    handler: PollHandler,
    shutdown_tx: watch::Sender<bool>,
    drain: tokio::task::JoinHandle<()>,
}

impl Worker {
    fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(registered_device("dev-1", "card-1"));
        store.insert_application(Application {
            id: "card-1".to_string(),
            tokens: Some(vec![serde_json::json!({ "token": "t-1" })]),
        });

        let (queue, worker) = update_queue(store.clone(), Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drain = tokio::spawn(worker.run(shutdown_rx));
        let coordinator = LongPollCoordinator::new(store.clone(), queue);
        let handler = PollHandler::new(store.clone(), coordinator);

        Self {
            store,
            handler,
            shutdown_tx,
            drain,
        }
    }

    async fn poll(&self, timeout_secs: u64) -> dmp_proto::PollReply {
        self.handler
            .handle(request(timeout_secs))
            .await
            .expect("poll should succeed")
    }

    /// Let the drain worker apply everything currently enqueued.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        self.drain.await.unwrap();
    }
}

fn request(timeout_secs: u64) -> PollRequest {
    PollRequest {
        header: PollHeader {
            request_id: "poll-req".to_string(),
            device_id: "dev-1".to_string(),
            message_type: MessageType::Poll,
            timestamp: 1,
            ttl: 300,
            encryption: PollEncryption {
                method: EncryptionMethod::None,
                tokencard_id: "card-1".to_string(),
            },
        },
        body: PollBody {
            timeout: timeout_secs,
        },
        nonce: 1,
    }
}

fn queued_action(id: &str, now: i64) -> Action {
    Action {
        id: id.to_string(),
        device_id: "dev-1".to_string(),
        tokencard_id: "card-1".to_string(),
        encryption: ActionEncryption {
            method: EncryptionMethod::HmacSha256,
            tokencard_id: "card-1".to_string(),
        },
        action: "set-interval".to_string(),
        request_id: format!("origin-{id}"),
        params: Some(serde_json::json!({ "seconds": 60 })),
        status: ActionStatus::Pending,
        timeout_at: now + 60_000,
        resends: Resends {
            resend_timeout: 30_000,
            num_resends: 0,
            max_resends: 3,
            resend_after: None,
        },
        progress: vec![ProgressEntry {
            timestamp: now - 5_000,
            status: "created".to_string(),
        }],
    }
}

#[tokio::test]
async fn first_delivery_marks_the_action_sent() {
    let worker = Worker::start();
    let now = now_ms();
    worker.store.insert_action(queued_action("a-1", now));

    let reply = worker.poll(0).await;
    assert_eq!(reply.actions.len(), 1);
    assert_eq!(reply.actions[0].action, "set-interval");
    assert_eq!(reply.actions[0].request_id, "origin-a-1");
    assert_eq!(reply.encryption_method, EncryptionMethod::HmacSha256);

    worker.settle().await;
    let stored = worker.store.action("a-1").unwrap();
    assert_eq!(stored.status, ActionStatus::Sent);
    assert_eq!(stored.resends.num_resends, 0);
    // resendAfter armed one resend-timeout out from delivery.
    let resend_after = stored.resends.resend_after.unwrap();
    assert!(resend_after >= now + 30_000);
    assert_eq!(stored.progress.last().unwrap().status, "sent to device");

    worker.stop().await;
}

#[tokio::test]
async fn due_resend_is_redelivered_and_counted() {
    let worker = Worker::start();
    let now = now_ms();

    // As if sent 31 seconds ago: the resend deadline has passed.
    let mut action = queued_action("a-1", now);
    action.status = ActionStatus::Sent;
    action.resends.resend_after = Some(now - 1_000);
    worker.store.insert_action(action);

    let reply = worker.poll(0).await;
    assert_eq!(reply.actions.len(), 1);

    worker.settle().await;
    let stored = worker.store.action("a-1").unwrap();
    assert_eq!(stored.status, ActionStatus::Resent);
    assert_eq!(stored.resends.num_resends, 1);
    assert!(stored.resends.resend_after.unwrap() > now);
    assert_eq!(stored.progress.last().unwrap().status, "resent to device");

    worker.stop().await;
}

#[tokio::test]
async fn held_actions_are_untouched_across_repeated_polls() {
    let worker = Worker::start();
    let now = now_ms();

    let mut action = queued_action("a-1", now);
    action.status = ActionStatus::Sent;
    action.resends.resend_after = Some(now + 20_000);
    worker.store.insert_action(action.clone());

    for _ in 0..3 {
        let reply = worker.poll(0).await;
        assert!(reply.actions.is_empty());
    }

    worker.settle().await;
    assert_eq!(worker.store.action("a-1").unwrap(), action);
    assert!(worker.store.applied_updates().is_empty());

    worker.stop().await;
}

#[tokio::test]
async fn expired_actions_are_closed_and_withheld() {
    let worker = Worker::start();
    let now = now_ms();

    let mut action = queued_action("a-1", now);
    action.timeout_at = now - 1;
    worker.store.insert_action(action);

    let reply = worker.poll(0).await;
    assert!(reply.actions.is_empty());

    worker.settle().await;
    let stored = worker.store.action("a-1").unwrap();
    assert_eq!(stored.status, ActionStatus::TimedOut);
    assert_eq!(stored.progress.last().unwrap().status, "timed out");

    worker.stop().await;
}

#[tokio::test]
async fn exhausted_actions_never_reappear() {
    let worker = Worker::start();
    let now = now_ms();

    let mut action = queued_action("a-1", now);
    action.status = ActionStatus::Resent;
    action.resends.num_resends = 3;
    action.resends.resend_after = Some(now - 1);
    worker.store.insert_action(action);

    let reply = worker.poll(0).await;
    assert!(reply.actions.is_empty());

    worker.settle().await;
    let stored = worker.store.action("a-1").unwrap();
    assert_eq!(stored.status, ActionStatus::ResendsExhausted);
    assert_eq!(stored.resends.num_resends, 3);
    assert_eq!(
        stored.progress.last().unwrap().status,
        "max. resends exhausted"
    );

    // Closed now; later polls never see it again.
    let reply = worker.poll(0).await;
    assert!(reply.actions.is_empty());
    worker.settle().await;
    assert_eq!(
        worker.store.action("a-1").unwrap().resends.num_resends,
        3
    );

    worker.stop().await;
}

#[tokio::test]
async fn delivery_lifecycle_runs_to_exhaustion() {
    let worker = Worker::start();
    let now = now_ms();
    worker.store.insert_action(queued_action("a-1", now));

    // First poll delivers; then force each resend due and poll again.
    assert_eq!(worker.poll(0).await.actions.len(), 1);
    worker.settle().await;

    for round in 1..=3u32 {
        let mut action = worker.store.action("a-1").unwrap();
        action.resends.resend_after = Some(now_ms() - 1);
        worker.store.insert_action(action);

        assert_eq!(worker.poll(0).await.actions.len(), 1, "resend {round}");
        worker.settle().await;
        assert_eq!(
            worker.store.action("a-1").unwrap().resends.num_resends,
            round
        );
    }

    // Budget spent: the next due resend closes the action instead.
    let mut action = worker.store.action("a-1").unwrap();
    action.resends.resend_after = Some(now_ms() - 1);
    worker.store.insert_action(action);

    assert!(worker.poll(0).await.actions.is_empty());
    worker.settle().await;
    let stored = worker.store.action("a-1").unwrap();
    assert_eq!(stored.status, ActionStatus::ResendsExhausted);

    // The whole trail survives: created, sent, 3 resents, exhausted.
    assert_eq!(stored.progress.len(), 6);

    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn empty_long_poll_waits_once_then_replies_empty() {
    let worker = Worker::start();

    let started = tokio::time::Instant::now();
    let reply = worker.poll(5).await;
    let elapsed = started.elapsed();

    assert!(reply.actions.is_empty());
    assert!(elapsed >= Duration::from_secs(5), "responded at {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "responded at {elapsed:?}");

    worker.stop().await;
}

#[tokio::test]
async fn reply_payload_has_the_platform_shape() {
    let worker = Worker::start();
    let now = now_ms();
    worker.store.insert_action(queued_action("a-1", now));

    let reply = worker.poll(0).await;
    let wire = serde_json::to_value(&reply).unwrap();

    assert_eq!(wire["group"], "response");
    assert_eq!(wire["type"], "poll");
    assert_eq!(wire["deviceId"], "dev-1");
    assert_eq!(wire["tokencardId"], "card-1");
    assert_eq!(wire["encryptionMethod"], "hmacsha256");
    assert_eq!(wire["nonce"], 0);
    assert_eq!(wire["actions"][0]["params"]["seconds"], 60);

    worker.stop().await;
}
