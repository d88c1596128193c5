//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use pickup_queue::error::{QueueError, Result};
use pickup_queue::metrics::MetricsCollector;
use pickup_queue::platform::{Dispatcher, InMemoryQueueStorage, MockMessenger, QueueStorage};
use pickup_queue::queue::{
    Admission, GuildSettings, QueueManager, ServerRegistry, StaticSettingsProvider,
};
use pickup_queue::scheduler::TaskScheduler;
use pickup_queue::types::{GameId, PlayerId, QueueId, ServerId, StoredQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Storage whose every call fails, counting the attempts
#[derive(Debug, Default)]
pub struct FailingStorage {
    attempts: AtomicUsize,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::StorageFailure {
            message: "database unavailable".to_string(),
        }
        .into())
    }
}

#[async_trait]
impl QueueStorage for FailingStorage {
    async fn insert_player_in_queue(&self, _: ServerId, _: QueueId, _: PlayerId) -> Result<()> {
        self.fail()
    }

    async fn delete_player_in_queue(&self, _: ServerId, _: QueueId, _: PlayerId) -> Result<()> {
        self.fail()
    }

    async fn delete_players_in_queue_from_queue(&self, _: ServerId, _: QueueId) -> Result<()> {
        self.fail()
    }

    async fn insert_queue_notification(
        &self,
        _: ServerId,
        _: QueueId,
        _: PlayerId,
        _: usize,
    ) -> Result<()> {
        self.fail()
    }

    async fn delete_queue_notification(&self, _: ServerId, _: QueueId, _: PlayerId) -> Result<()> {
        self.fail()
    }

    async fn load_queue(&self, _: ServerId, _: QueueId) -> Result<StoredQueue> {
        self.fail()
    }
}

/// In-memory storage whose roster inserts take a while to land
#[derive(Debug)]
pub struct SlowInsertStorage {
    inner: InMemoryQueueStorage,
    delay: Duration,
}

impl SlowInsertStorage {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryQueueStorage::new(),
            delay,
        }
    }

    pub fn snapshot(&self, server_id: ServerId, queue_id: QueueId) -> Result<StoredQueue> {
        self.inner.snapshot(server_id, queue_id)
    }
}

#[async_trait]
impl QueueStorage for SlowInsertStorage {
    async fn insert_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .insert_player_in_queue(server_id, queue_id, player_id)
            .await
    }

    async fn delete_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        self.inner
            .delete_player_in_queue(server_id, queue_id, player_id)
            .await
    }

    async fn delete_players_in_queue_from_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
    ) -> Result<()> {
        self.inner
            .delete_players_in_queue_from_queue(server_id, queue_id)
            .await
    }

    async fn insert_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
        threshold: usize,
    ) -> Result<()> {
        self.inner
            .insert_queue_notification(server_id, queue_id, player_id, threshold)
            .await
    }

    async fn delete_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        self.inner
            .delete_queue_notification(server_id, queue_id, player_id)
            .await
    }

    async fn load_queue(&self, server_id: ServerId, queue_id: QueueId) -> Result<StoredQueue> {
        self.inner.load_queue(server_id, queue_id).await
    }
}

/// A complete engine wired to recording collaborators
pub struct TestSystem {
    pub registry: ServerRegistry,
    pub messenger: Arc<MockMessenger>,
    pub scheduler: Arc<TaskScheduler>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub fn manager(&self, server_id: ServerId) -> Arc<QueueManager> {
        self.registry.add_server(server_id).unwrap()
    }
}

pub struct TestSystemBuilder {
    storage: Arc<dyn QueueStorage>,
    settings: GuildSettings,
}

impl TestSystemBuilder {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemoryQueueStorage::new()),
            settings: GuildSettings::default(),
        }
    }

    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn cooldown_seconds(mut self, seconds: u64) -> Self {
        self.settings.finish_cooldown_seconds = seconds;
        self
    }

    pub fn announce_delay_seconds(mut self, seconds: u64) -> Self {
        self.settings.announce_delay_seconds = seconds;
        self
    }

    pub fn build(self) -> TestSystem {
        let messenger = Arc::new(MockMessenger::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            self.storage,
            messenger.clone(),
            scheduler.clone(),
            metrics.clone(),
        ));
        let registry = ServerRegistry::new(
            Arc::new(StaticSettingsProvider::new(self.settings)),
            dispatcher,
        );

        TestSystem {
            registry,
            messenger,
            scheduler,
            metrics,
        }
    }
}

/// Let spawned tasks that are already due run to completion
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn popped_game(admission: &Admission) -> GameId {
    match admission {
        Admission::Popped { game_id, .. } => *game_id,
        other => panic!("expected a pop, got {:?}", other),
    }
}
