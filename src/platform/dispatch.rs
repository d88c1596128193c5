//! Outbox delivery
//!
//! Drains the effects a guild operation recorded, after the guild lock has
//! been released. Collaborator failures are logged and counted, never
//! propagated: in-memory matchmaking state is the source of truth.

use crate::metrics::MetricsCollector;
use crate::platform::messenger::Messenger;
use crate::platform::storage::{apply_write, QueueStorage};
use crate::queue::outbox::{Effect, Outbox};
use crate::scheduler::{TaskKey, TaskKind, TaskScheduler};
use crate::types::{Announcement, GameId, PlayerId, ServerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Per-dispatch parameters supplied by the owning guild
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub server_id: ServerId,
    /// Delay before a game-starting announcement is posted
    pub announce_delay: Duration,
    /// Cleared when the guild is torn down; pending announcements then stay silent
    pub alive: Arc<AtomicBool>,
}

pub struct Dispatcher {
    storage: Arc<dyn QueueStorage>,
    messenger: Arc<dyn Messenger>,
    scheduler: Arc<TaskScheduler>,
    metrics: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn QueueStorage>,
        messenger: Arc<dyn Messenger>,
        scheduler: Arc<TaskScheduler>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            storage,
            messenger,
            scheduler,
            metrics,
        }
    }

    pub fn storage(&self) -> Arc<dyn QueueStorage> {
        self.storage.clone()
    }

    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        self.scheduler.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Deliver every effect in recording order
    pub async fn dispatch(&self, outbox: Outbox, ctx: &DispatchContext) {
        if outbox.is_empty() {
            return;
        }

        let start = Instant::now();
        let count = outbox.len();

        for effect in outbox.into_effects() {
            match effect {
                Effect::Persist(write) => {
                    if let Err(e) = apply_write(self.storage.as_ref(), &write).await {
                        warn!(
                            "Storage write {} failed on server {}: {}",
                            write.operation(),
                            ctx.server_id,
                            e
                        );
                        self.metrics
                            .record_collaborator_failure("storage", write.operation());
                    }
                }
                Effect::DirectNotice { player, text } => {
                    self.send_notice(player, &text, "direct").await;
                }
                Effect::ThresholdAlert {
                    queue_id,
                    players,
                    text,
                } => {
                    debug!(
                        "Delivering threshold alert of queue {} to {} players",
                        queue_id,
                        players.len()
                    );
                    self.send_alert(&players, &text).await;
                }
                Effect::Announce {
                    game_id,
                    announcement,
                } => {
                    self.schedule_announcement(game_id, announcement, ctx);
                }
            }
        }

        self.metrics.record_dispatch(count, start.elapsed());
    }

    async fn send_notice(&self, player: PlayerId, text: &str, kind: &str) {
        match self.messenger.send_direct_notice(player, text).await {
            Ok(()) => self.metrics.record_notification(kind),
            Err(e) => {
                warn!("Failed to message player {}: {}", player, e);
                self.metrics
                    .record_collaborator_failure("messenger", "send_direct_notice");
            }
        }
    }

    /// Alerts only reach players who are available or away
    async fn send_alert(&self, players: &[PlayerId], text: &str) {
        for player in players {
            let presence = match self.messenger.presence(*player).await {
                Ok(presence) => presence,
                Err(e) => {
                    warn!("Presence lookup failed for player {}: {}", player, e);
                    self.metrics
                        .record_collaborator_failure("messenger", "presence");
                    continue;
                }
            };

            if presence.accepts_alerts() {
                self.send_notice(*player, text, "alert").await;
            } else {
                debug!("Skipping alert for player {} ({})", player, presence);
                self.metrics.record_alert_suppressed();
            }
        }
    }

    fn schedule_announcement(
        &self,
        game_id: GameId,
        announcement: Announcement,
        ctx: &DispatchContext,
    ) {
        let messenger = Arc::clone(&self.messenger);
        let metrics = Arc::clone(&self.metrics);
        let alive = Arc::clone(&ctx.alive);
        let key = TaskKey::new(ctx.server_id, TaskKind::Announcement(game_id));

        let scheduled = self.scheduler.schedule(key, ctx.announce_delay, move || async move {
            if !alive.load(Ordering::SeqCst) {
                debug!("Guild torn down, dropping announcement of game {}", game_id);
                return;
            }
            match messenger.announce(&announcement).await {
                Ok(()) => metrics.record_notification("announcement"),
                Err(e) => {
                    warn!("Failed to announce game {}: {}", game_id, e);
                    metrics.record_collaborator_failure("messenger", "announce");
                }
            }
        });

        match scheduled {
            Ok(()) => {
                if let Ok(pending) = self.scheduler.pending_count() {
                    self.metrics.update_scheduled_tasks(pending);
                }
            }
            Err(e) => error!("Failed to schedule announcement of game {}: {}", game_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueueError, Result};
    use crate::platform::messenger::MockMessenger;
    use crate::platform::storage::InMemoryQueueStorage;
    use crate::queue::outbox::StorageWrite;
    use crate::types::{AnnouncementColor, Presence, QueueId, StoredQueue};
    use crate::utils::generate_game_id;
    use async_trait::async_trait;

    struct BrokenStorage;

    #[async_trait]
    impl QueueStorage for BrokenStorage {
        async fn insert_player_in_queue(&self, _: ServerId, _: QueueId, _: PlayerId) -> Result<()> {
            Err(QueueError::StorageFailure {
                message: "disk full".to_string(),
            }
            .into())
        }
        async fn delete_player_in_queue(&self, _: ServerId, _: QueueId, _: PlayerId) -> Result<()> {
            Ok(())
        }
        async fn delete_players_in_queue_from_queue(&self, _: ServerId, _: QueueId) -> Result<()> {
            Ok(())
        }
        async fn insert_queue_notification(
            &self,
            _: ServerId,
            _: QueueId,
            _: PlayerId,
            _: usize,
        ) -> Result<()> {
            Ok(())
        }
        async fn delete_queue_notification(
            &self,
            _: ServerId,
            _: QueueId,
            _: PlayerId,
        ) -> Result<()> {
            Ok(())
        }
        async fn load_queue(&self, _: ServerId, _: QueueId) -> Result<StoredQueue> {
            Ok(StoredQueue::default())
        }
    }

    fn context(delay: Duration) -> DispatchContext {
        DispatchContext {
            server_id: 1,
            announce_delay: delay,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    fn create_dispatcher(
        storage: Arc<dyn QueueStorage>,
        messenger: Arc<MockMessenger>,
    ) -> (Dispatcher, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let dispatcher = Dispatcher::new(
            storage,
            messenger,
            Arc::new(TaskScheduler::new()),
            metrics.clone(),
        );
        (dispatcher, metrics)
    }

    fn announcement() -> Announcement {
        Announcement {
            server_id: 1,
            title: "Game: pug starting".to_string(),
            body: "<@1>, <@2>".to_string(),
            color: AnnouncementColor::Yellow,
        }
    }

    #[tokio::test]
    async fn test_writes_and_notices_are_delivered() {
        let storage = Arc::new(InMemoryQueueStorage::new());
        let messenger = Arc::new(MockMessenger::new());
        let (dispatcher, _) = create_dispatcher(storage.clone(), messenger.clone());

        let mut outbox = Outbox::new();
        outbox.persist(StorageWrite::InsertPlayer {
            server_id: 1,
            queue_id: 1,
            player_id: 5,
        });
        outbox.notice(5, "Your game: pug has started!");

        dispatcher.dispatch(outbox, &context(Duration::ZERO)).await;

        assert_eq!(storage.snapshot(1, 1).unwrap().roster, vec![5]);
        assert_eq!(
            messenger.notices_for(5),
            vec!["Your game: pug has started!".to_string()]
        );
    }

    #[tokio::test]
    async fn test_alerts_respect_presence() {
        let messenger = Arc::new(MockMessenger::new());
        messenger.set_presence(2, Presence::Away);
        messenger.set_presence(3, Presence::Unavailable);
        let (dispatcher, metrics) =
            create_dispatcher(Arc::new(InMemoryQueueStorage::new()), messenger.clone());

        let mut outbox = Outbox::new();
        outbox.alert(1, vec![1, 2, 3], "Queue: pug is at 3 players!");
        dispatcher.dispatch(outbox, &context(Duration::ZERO)).await;

        let recipients: Vec<PlayerId> = messenger.notices().iter().map(|(p, _)| *p).collect();
        assert_eq!(recipients, vec![1, 2]);
        assert_eq!(metrics.notification().alerts_suppressed_total.get(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_logged_not_propagated() {
        let messenger = Arc::new(MockMessenger::new());
        let (dispatcher, metrics) = create_dispatcher(Arc::new(BrokenStorage), messenger.clone());

        let mut outbox = Outbox::new();
        outbox.persist(StorageWrite::InsertPlayer {
            server_id: 1,
            queue_id: 1,
            player_id: 5,
        });
        outbox.notice(5, "still delivered");
        dispatcher.dispatch(outbox, &context(Duration::ZERO)).await;

        assert_eq!(messenger.notices().len(), 1);
        assert_eq!(
            metrics
                .platform()
                .collaborator_failures_total
                .with_label_values(&["storage", "insert_player"])
                .get(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_announcement_is_delayed() {
        let messenger = Arc::new(MockMessenger::new());
        let (dispatcher, _) =
            create_dispatcher(Arc::new(InMemoryQueueStorage::new()), messenger.clone());

        let mut outbox = Outbox::new();
        outbox.announce(generate_game_id(), announcement());
        dispatcher.dispatch(outbox, &context(Duration::from_secs(2))).await;

        assert!(messenger.announcements().is_empty());
        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert_eq!(messenger.announcements(), vec![announcement()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announcement_dropped_after_teardown() {
        let messenger = Arc::new(MockMessenger::new());
        let (dispatcher, _) =
            create_dispatcher(Arc::new(InMemoryQueueStorage::new()), messenger.clone());
        let ctx = context(Duration::from_secs(2));

        let mut outbox = Outbox::new();
        outbox.announce(generate_game_id(), announcement());
        dispatcher.dispatch(outbox, &ctx).await;

        ctx.alive.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(messenger.announcements().is_empty());
    }
}
