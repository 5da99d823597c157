//! §8 scenario S4 / testable property 2: a repeating timer stays
//! interleaved with (never concurrent to) a flood of client messages on the
//! same stage.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use stagecore::config::RuntimeConfig;
use stagecore::context::RuntimeContext;
use stagecore::dispatcher::Dispatcher;
use stagecore::packet::{Packet, Payload};
use stagecore::sender::{ActorSender, StageSender};
use stagecore::stage::{ActorBehavior, StageMessage, StageType};

mod common;
use common::wait_until;

struct FloodStage {
    /// Nonzero while a callback is executing; any concurrent callback
    /// observing it nonzero proves single-consumer isolation broke
    /// (§8, testable property 2).
    reentrancy_guard: Arc<AtomicI64>,
    message_count: Arc<AtomicUsize>,
    timer_fire_count: Arc<AtomicUsize>,
}

impl FloodStage {
    fn enter(&self) {
        let prev = self.reentrancy_guard.fetch_add(1, Ordering::SeqCst);
        assert_eq!(prev, 0, "two callbacks of the same stage executed concurrently");
    }

    fn leave(&self) {
        let prev = self.reentrancy_guard.fetch_sub(1, Ordering::SeqCst);
        assert_eq!(prev, 1, "two callbacks of the same stage executed concurrently");
    }
}

#[async_trait]
impl StageType for FloodStage {
    async fn on_dispatch(&mut self, _sender: &ActorSender, _actor: &mut dyn ActorBehavior, _packet: &Packet) {
        self.enter();
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.leave();
    }

    async fn on_dispatch_stage(&mut self, _sender: &StageSender, _packet: &Packet) {
        self.enter();
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.leave();
    }
}

struct NoopActor {
    account_id: String,
}

#[async_trait]
impl ActorBehavior for NoopActor {
    fn account_id(&self) -> &str {
        &self.account_id
    }
    async fn on_authenticate(&mut self, _auth_packet: &Packet) -> bool {
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timer_fires_stay_interleaved_with_a_message_flood() {
    let reentrancy_guard = Arc::new(AtomicI64::new(0));
    let message_count = Arc::new(AtomicUsize::new(0));
    let timer_fire_count = Arc::new(AtomicUsize::new(0));

    let ctx = RuntimeContext::new(RuntimeConfig::default(), None);
    let dispatcher = Arc::new(Dispatcher::new(ctx));
    {
        let reentrancy_guard = reentrancy_guard.clone();
        let message_count = message_count.clone();
        let timer_fire_count = timer_fire_count.clone();
        dispatcher.register_stage_type(
            "Flood",
            Box::new(move || {
                Box::new(FloodStage {
                    reentrancy_guard: reentrancy_guard.clone(),
                    message_count: message_count.clone(),
                    timer_fire_count: timer_fire_count.clone(),
                }) as Box<dyn StageType>
            }),
            Box::new(|| Box::new(NoopActor { account_id: String::new() }) as Box<dyn ActorBehavior>),
        );
    }

    let cell = dispatcher.create(1, "Flood").await.unwrap();
    let sender = StageSender::new(cell.clone());

    let fire_count = timer_fire_count.clone();
    let guard = reentrancy_guard.clone();
    sender.add_repeat_timer(Duration::from_millis(10), Duration::from_millis(10), move || {
        let prev = guard.fetch_add(1, Ordering::SeqCst);
        assert_eq!(prev, 0, "timer callback ran concurrently with another stage callback");
        fire_count.fetch_add(1, Ordering::Relaxed);
        guard.fetch_sub(1, Ordering::SeqCst);
    });

    for i in 0..10_000u64 {
        cell.enqueue(StageMessage::RouteMessage {
            packet: Packet::request("Flood", 1, Payload::empty()),
            header: stagecore::packet::RouteHeader {
                msg_seq: stagecore::util::MsgSeq::NONE,
                service_id: 0,
                msg_id: "Flood".to_string(),
                from: "peer-a".to_string(),
                stage_id: 1,
                account_id: String::new(),
                sid: String::new(),
                is_reply: false,
            },
        });
        if i % 500 == 0 {
            tokio::task::yield_now().await;
        }
    }

    assert!(wait_until(Duration::from_secs(2), || message_count.load(Ordering::Relaxed) >= 10_000).await);
    // Give timers a little longer to keep ticking after the flood drains.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(message_count.load(Ordering::Relaxed), 10_000);
    assert!(timer_fire_count.load(Ordering::Relaxed) > 0, "timer should have fired at least once");
}
