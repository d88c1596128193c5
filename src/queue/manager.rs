//! Guild-scoped queue manager
//!
//! One `QueueManager` owns every queue of a guild. All queue mutations run
//! under a single guild lock, including the purge of popped players from
//! sibling queues, so concurrent admissions can never overfill a roster.
//! Side effects are collected while the lock is held and queued in lock
//! order. They are delivered by the dispatcher afterwards, one outbox at a
//! time, so storage sees writes in the same order as the in-memory state.

use crate::error::{QueueError, Result};
use crate::metrics::MetricsCollector;
use crate::platform::dispatch::{DispatchContext, Dispatcher};
use crate::queue::instance::{Admission, GuildScope, Queue};
use crate::queue::outbox::{Outbox, StorageWrite};
use crate::queue::provider::{QueueConfiguration, QueueSettings, SettingsProvider};
use crate::queue::waitlist::CooldownTracker;
use crate::scheduler::{TaskKey, TaskKind, TaskScheduler};
use crate::types::{GameId, GameSummary, PlayerId, QueueId, QueueStatus, ServerId, StoredQueue};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex as DeliveryMutex;
use tracing::{debug, error, info, warn};

/// Statistics about queue manager operations
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueManagerStats {
    /// Players that joined a roster
    pub players_admitted: u64,
    /// Admissions redirected to a waitlist
    pub players_waitlisted: u64,
    /// Total number of games started
    pub games_started: u64,
    /// Total number of games finished
    pub games_finished: u64,
    /// Waitlisted players re-admitted after their cooldown
    pub players_promoted: u64,
    /// Current number of queues
    pub queues: usize,
    /// Current number of players waiting in rosters
    pub players_waiting: usize,
    /// Current number of active games
    pub active_games: usize,
    /// Current number of players on cooldown
    pub players_on_cooldown: usize,
}

#[derive(Debug)]
struct GuildQueues {
    queues: BTreeMap<QueueId, Queue>,
    next_id: QueueId,
}

/// Lookups against the queues not currently being mutated
struct GuildView<'a> {
    others: &'a BTreeMap<QueueId, Queue>,
    cooldowns: &'a CooldownTracker,
}

impl GuildScope for GuildView<'_> {
    fn is_player_ingame(&self, player: PlayerId) -> Result<bool> {
        Ok(self.others.values().any(|q| q.has_player_in_game(player)))
    }

    fn has_player_just_finished(&self, player: PlayerId) -> Result<bool> {
        self.cooldowns.contains(player)
    }
}

/// Run `f` on one queue with mutable access to its siblings. The queue is
/// taken out of the map for the duration and put back whatever `f` returns.
fn with_queue<T>(
    queues: &mut BTreeMap<QueueId, Queue>,
    server_id: ServerId,
    queue_id: QueueId,
    f: impl FnOnce(&mut Queue, &mut BTreeMap<QueueId, Queue>) -> Result<T>,
) -> Result<T> {
    let mut queue = queues
        .remove(&queue_id)
        .ok_or(QueueError::QueueNotFound {
            server_id,
            queue_id,
        })?;
    let result = f(&mut queue, queues);
    queues.insert(queue_id, queue);
    result
}

fn queue_mut(
    queues: &mut BTreeMap<QueueId, Queue>,
    server_id: ServerId,
    queue_id: QueueId,
) -> Result<&mut Queue> {
    queues.get_mut(&queue_id).ok_or_else(|| {
        QueueError::QueueNotFound {
            server_id,
            queue_id,
        }
        .into()
    })
}

fn purge_others(
    others: &mut BTreeMap<QueueId, Queue>,
    players: &[PlayerId],
    outbox: &mut Outbox,
) -> usize {
    others.values_mut().map(|q| q.purge(players, outbox)).sum()
}

/// End of a cooldown that starts now
fn cooldown_expiry(cooldown: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(cooldown)
        .ok()
        .and_then(|delta| current_timestamp().checked_add_signed(delta))
        .ok_or_else(|| {
            QueueError::ConfigurationError {
                message: format!("Finish cooldown of {:?} is out of range", cooldown),
            }
            .into()
        })
}

/// The queues of one guild and their shared cooldown state
pub struct QueueManager {
    server_id: ServerId,
    state: Mutex<GuildQueues>,
    cooldowns: CooldownTracker,
    settings: Arc<dyn SettingsProvider>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<TaskScheduler>,
    metrics: Arc<MetricsCollector>,
    stats: RwLock<QueueManagerStats>,
    /// Outboxes waiting for delivery, pushed while the guild lock is held
    pending: Mutex<VecDeque<Outbox>>,
    delivery: DeliveryMutex<()>,
    alive: Arc<AtomicBool>,
    self_ref: Weak<QueueManager>,
}

impl QueueManager {
    /// Create the manager of a guild with no queues
    pub fn new(
        server_id: ServerId,
        settings: Arc<dyn SettingsProvider>,
        dispatcher: Arc<Dispatcher>,
    ) -> Arc<Self> {
        let scheduler = dispatcher.scheduler();
        let metrics = dispatcher.metrics();

        Arc::new_cyclic(|self_ref| Self {
            server_id,
            state: Mutex::new(GuildQueues {
                queues: BTreeMap::new(),
                next_id: 1,
            }),
            cooldowns: CooldownTracker::new(),
            settings,
            dispatcher,
            scheduler,
            metrics,
            stats: RwLock::new(QueueManagerStats::default()),
            pending: Mutex::new(VecDeque::new()),
            delivery: DeliveryMutex::new(()),
            alive: Arc::new(AtomicBool::new(true)),
            self_ref: self_ref.clone(),
        })
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// False once the guild has been torn down
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(QueueError::ServerNotFound {
                server_id: self.server_id,
            }
            .into())
        }
    }

    fn lock_queues(&self) -> Result<MutexGuard<'_, GuildQueues>> {
        self.state
            .lock()
            .map_err(|_| QueueError::lock("guild queues").into())
    }

    fn update_stats(&self, f: impl FnOnce(&mut QueueManagerStats)) {
        match self.stats.write() {
            Ok(mut stats) => f(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock for server {}", self.server_id),
        }
    }

    /// Refresh the guild gauges, called with the guild lock held
    fn record_guild_state(&self, guild: &GuildQueues) {
        let waiting: usize = guild.queues.values().map(Queue::player_count).sum();
        let games: usize = guild.queues.values().map(|q| q.games().len()).sum();
        self.metrics
            .update_guild_gauges(self.server_id, guild.queues.len(), waiting, games);
    }

    fn record_admissions<'a>(&self, admissions: impl IntoIterator<Item = &'a Admission>) {
        let mut joined = 0;
        let mut waitlisted = 0;
        let mut popped = 0;
        for admission in admissions {
            self.metrics.record_admission(admission);
            match admission {
                Admission::Joined { .. } => joined += 1,
                Admission::Popped { .. } => {
                    joined += 1;
                    popped += 1;
                }
                Admission::Waitlisted => waitlisted += 1,
                _ => {}
            }
        }
        self.update_stats(|s| {
            s.players_admitted += joined;
            s.players_waitlisted += waitlisted;
            s.games_started += popped;
        });
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            server_id: self.server_id,
            announce_delay: self.settings.guild_settings(self.server_id).announce_delay(),
            alive: Arc::clone(&self.alive),
        }
    }

    /// Queue an outbox for delivery. Must be called with the guild lock
    /// held so that outboxes line up in the order their changes were made.
    fn enqueue(&self, outbox: Outbox) -> Result<()> {
        if outbox.is_empty() {
            return Ok(());
        }
        self.pending
            .lock()
            .map_err(|_| QueueError::lock("pending outboxes"))?
            .push_back(outbox);
        Ok(())
    }

    fn next_pending(&self) -> Option<Outbox> {
        match self.pending.lock() {
            Ok(mut pending) => pending.pop_front(),
            Err(_) => {
                error!(
                    "Failed to acquire pending outboxes lock for server {}",
                    self.server_id
                );
                None
            }
        }
    }

    /// Deliver queued outboxes in order. Only one caller drains at a time,
    /// so when this returns every outbox queued before the call has been
    /// delivered, by this caller or an earlier one.
    async fn deliver_pending(&self) {
        let _delivery = self.delivery.lock().await;
        let ctx = self.dispatch_context();
        while let Some(outbox) = self.next_pending() {
            self.dispatcher.dispatch(outbox, &ctx).await;
        }
    }

    /// Offer a player to one queue and purge siblings if it popped
    fn admit(
        &self,
        queue: &mut Queue,
        others: &mut BTreeMap<QueueId, Queue>,
        player: PlayerId,
        outbox: &mut Outbox,
    ) -> Result<Admission> {
        let admission = {
            let view = GuildView {
                others: &*others,
                cooldowns: &self.cooldowns,
            };
            queue.add(player, &view, outbox)?
        };

        if let Admission::Popped { game_id, players } = &admission {
            let purged = purge_others(others, players, outbox);
            debug!(
                "Purged {} entries of game {} players from other queues",
                purged, game_id
            );
        }
        Ok(admission)
    }

    /// Create a queue and return its id
    pub async fn create_queue(&self, config: QueueConfiguration) -> Result<QueueId> {
        self.ensure_alive()?;

        let mut guild = self.lock_queues()?;
        let queue_id = guild.next_id;
        let queue = Queue::new(self.server_id, queue_id, config)?;

        info!(
            "Created queue '{}' ({}) on server {} with capacity {}",
            queue.name(),
            queue_id,
            self.server_id,
            queue.capacity()
        );

        guild.queues.insert(queue_id, queue);
        guild.next_id = queue_id.saturating_add(1);
        self.record_guild_state(&guild);
        Ok(queue_id)
    }

    /// Recreate a queue under a known id and reload its rows from storage
    pub async fn restore_queue(
        &self,
        queue_id: QueueId,
        config: QueueConfiguration,
    ) -> Result<QueueStatus> {
        self.ensure_alive()?;

        let mut queue = Queue::new(self.server_id, queue_id, config)?;
        let stored = match self
            .dispatcher
            .storage()
            .load_queue(self.server_id, queue_id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    "Failed to load queue {} of server {}, starting empty: {}",
                    queue_id, self.server_id, e
                );
                self.metrics
                    .record_collaborator_failure("storage", "load_queue");
                StoredQueue::default()
            }
        };

        let mut outbox = Outbox::new();
        queue.restore(stored, &mut outbox);
        let status = queue.status();

        {
            let mut guild = self.lock_queues()?;
            if guild.queues.contains_key(&queue_id) {
                return Err(QueueError::ConfigurationError {
                    message: format!(
                        "Queue {} already exists on server {}",
                        queue_id, self.server_id
                    ),
                }
                .into());
            }
            guild.queues.insert(queue_id, queue);
            guild.next_id = guild.next_id.max(queue_id.saturating_add(1));
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
        }

        self.deliver_pending().await;
        Ok(status)
    }

    /// Remove a queue with its roster and notification rows
    pub async fn remove_queue(&self, queue_id: QueueId) -> Result<QueueStatus> {
        self.ensure_alive()?;

        let status = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let queue = guild
                .queues
                .remove(&queue_id)
                .ok_or(QueueError::QueueNotFound {
                    server_id: self.server_id,
                    queue_id,
                })?;

            if !queue.games().is_empty() {
                warn!(
                    "Removing queue '{}' with {} games still running",
                    queue.name(),
                    queue.games().len()
                );
            }

            outbox.persist(StorageWrite::DeleteQueueRoster {
                server_id: self.server_id,
                queue_id,
            });
            let subscribers: BTreeSet<PlayerId> = queue
                .notifications()
                .snapshot()
                .into_values()
                .flatten()
                .collect();
            for player_id in subscribers {
                outbox.persist(StorageWrite::DeleteNotification {
                    server_id: self.server_id,
                    queue_id,
                    player_id,
                });
            }

            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            queue.status()
        };

        info!(
            "Removed queue '{}' ({}) from server {}",
            status.name, queue_id, self.server_id
        );
        self.deliver_pending().await;
        Ok(status)
    }

    pub async fn rename_queue(&self, queue_id: QueueId, name: impl Into<String>) -> Result<()> {
        self.ensure_alive()?;
        let mut guild = self.lock_queues()?;
        let queue = queue_mut(&mut guild.queues, self.server_id, queue_id)?;
        let previous = queue.name().to_string();
        queue.rename(name)?;
        info!("Renamed queue '{}' to '{}'", previous, queue.name());
        Ok(())
    }

    pub async fn set_capacity(&self, queue_id: QueueId, capacity: usize) -> Result<()> {
        self.ensure_alive()?;
        let mut guild = self.lock_queues()?;
        let queue = queue_mut(&mut guild.queues, self.server_id, queue_id)?;
        queue.set_capacity(capacity)?;
        info!("Queue '{}' capacity set to {}", queue.name(), capacity);
        Ok(())
    }

    pub async fn update_queue_settings(
        &self,
        queue_id: QueueId,
        settings: QueueSettings,
    ) -> Result<()> {
        self.ensure_alive()?;
        let mut guild = self.lock_queues()?;
        queue_mut(&mut guild.queues, self.server_id, queue_id)?.update_settings(settings)
    }

    /// Offer a player to one queue
    pub async fn add(&self, queue_id: QueueId, player: PlayerId) -> Result<Admission> {
        self.ensure_alive()?;
        let timer = self.metrics.start_timer();

        let admission = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let admission = with_queue(
                &mut guild.queues,
                self.server_id,
                queue_id,
                |queue, others| self.admit(queue, others, player, &mut outbox),
            )?;
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            admission
        };

        self.record_admissions([&admission]);
        self.metrics.record_operation("add", timer.stop());
        self.deliver_pending().await;
        Ok(admission)
    }

    /// Offer a player to every queue of the guild, in queue id order.
    /// Once one of them pops, the remaining queues see the player in game.
    pub async fn add_to_all(&self, player: PlayerId) -> Result<Vec<(QueueId, Admission)>> {
        self.ensure_alive()?;
        let timer = self.metrics.start_timer();

        let results = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let queue_ids: Vec<QueueId> = guild.queues.keys().copied().collect();
            let mut results = Vec::with_capacity(queue_ids.len());
            for queue_id in queue_ids {
                let admission = with_queue(
                    &mut guild.queues,
                    self.server_id,
                    queue_id,
                    |queue, others| self.admit(queue, others, player, &mut outbox),
                )?;
                results.push((queue_id, admission));
            }
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            results
        };

        self.record_admissions(results.iter().map(|(_, a)| a));
        self.metrics.record_operation("add_to_all", timer.stop());
        self.deliver_pending().await;
        Ok(results)
    }

    /// Remove a player from one queue's roster or waitlist
    pub async fn delete(&self, queue_id: QueueId, player: PlayerId) -> Result<bool> {
        self.ensure_alive()?;

        let removed = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let removed =
                queue_mut(&mut guild.queues, self.server_id, queue_id)?.delete(player, &mut outbox);
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            removed
        };

        self.deliver_pending().await;
        Ok(removed)
    }

    /// Remove a player from every queue. Returns the queues it left.
    pub async fn delete_from_all(&self, player: PlayerId) -> Result<Vec<QueueId>> {
        self.ensure_alive()?;

        let left = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let left: Vec<QueueId> = guild
                .queues
                .iter_mut()
                .filter_map(|(id, q)| q.delete(player, &mut outbox).then_some(*id))
                .collect();
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            left
        };

        if !left.is_empty() {
            info!("Player {} left {} queues", player, left.len());
        }
        self.deliver_pending().await;
        Ok(left)
    }

    /// Bulk removal from one queue
    pub async fn purge(&self, queue_id: QueueId, players: &[PlayerId]) -> Result<usize> {
        self.ensure_alive()?;

        let removed = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let removed =
                queue_mut(&mut guild.queues, self.server_id, queue_id)?.purge(players, &mut outbox);
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            removed
        };

        debug!("Purged {} players from queue {}", removed, queue_id);
        self.deliver_pending().await;
        Ok(removed)
    }

    /// Remove players from every queue except one
    pub async fn purge_from_all_other_queues(
        &self,
        players: &[PlayerId],
        except_queue_id: QueueId,
    ) -> Result<usize> {
        self.ensure_alive()?;

        let removed = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let removed: usize = guild
                .queues
                .iter_mut()
                .filter(|(id, _)| **id != except_queue_id)
                .map(|(_, q)| q.purge(players, &mut outbox))
                .sum();
            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            removed
        };

        self.deliver_pending().await;
        Ok(removed)
    }

    /// Finish an active game and start its players' cooldown.
    /// Returns false when the game is unknown or already finished.
    pub async fn finish_game(&self, game_id: GameId) -> Result<bool> {
        self.ensure_alive()?;
        let timer = self.metrics.start_timer();
        let cooldown = self.settings.guild_settings(self.server_id).finish_cooldown();
        let expires_at = cooldown_expiry(cooldown)?;

        let game = {
            let mut guild = self.lock_queues()?;
            let players = guild
                .queues
                .values()
                .find_map(|q| q.game(game_id))
                .map(|g| g.players().to_vec());

            // The cooldown is recorded before the game leaves the active set
            let game = match players {
                Some(players) => {
                    self.cooldowns.start(game_id, &players, expires_at)?;
                    guild.queues.values_mut().find_map(|q| q.finish(game_id))
                }
                None => None,
            };
            self.record_guild_state(&guild);
            game
        };

        let Some(game) = game else {
            debug!(
                "Game {} is not active on server {}, nothing to finish",
                game_id, self.server_id
            );
            return Ok(false);
        };

        self.schedule_cooldown_expiry(game_id, game.players().to_vec(), cooldown)?;

        self.metrics.record_game_finished();
        self.metrics.record_operation("finish", timer.stop());
        self.update_stats(|s| s.games_finished += 1);
        Ok(true)
    }

    /// Finish the active game a player is part of
    pub async fn finish_game_for_player(&self, player: PlayerId) -> Result<Option<GameId>> {
        self.ensure_alive()?;

        let game_id = {
            let guild = self.lock_queues()?;
            guild
                .queues
                .values()
                .find_map(|q| q.game_for_player(player).map(|g| g.id()))
        };

        match game_id {
            Some(game_id) if self.finish_game(game_id).await? => Ok(Some(game_id)),
            _ => Ok(None),
        }
    }

    fn schedule_cooldown_expiry(
        &self,
        game_id: GameId,
        players: Vec<PlayerId>,
        delay: Duration,
    ) -> Result<()> {
        let manager = self.self_ref.clone();
        let key = TaskKey::new(self.server_id, TaskKind::CooldownExpiry(game_id));

        self.scheduler.schedule(key, delay, move || async move {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if let Err(e) = manager.on_cooldown_expired(game_id, &players).await {
                error!("Cooldown expiry of game {} failed: {}", game_id, e);
            }
        })?;

        if let Ok(pending) = self.scheduler.pending_count() {
            self.metrics.update_scheduled_tasks(pending);
        }
        Ok(())
    }

    /// Release a finished game's players and re-offer the waitlisted ones
    async fn on_cooldown_expired(&self, game_id: GameId, players: &[PlayerId]) -> Result<()> {
        if !self.is_alive() {
            debug!(
                "Server {} torn down, ignoring cooldown expiry of game {}",
                self.server_id, game_id
            );
            return Ok(());
        }

        let released = self.cooldowns.release(game_id, players)?;
        info!(
            "Cooldown of game {} expired, {} players released",
            game_id,
            released.len()
        );
        if released.is_empty() {
            return Ok(());
        }

        let admissions = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let mut rng = rand::thread_rng();
            let queue_ids: Vec<QueueId> = guild.queues.keys().copied().collect();
            let mut admissions = Vec::new();

            for queue_id in queue_ids {
                let results = with_queue(
                    &mut guild.queues,
                    self.server_id,
                    queue_id,
                    |queue, others| {
                        let results = {
                            let view = GuildView {
                                others: &*others,
                                cooldowns: &self.cooldowns,
                            };
                            queue.add_players_waiting(&released, &view, &mut outbox, &mut rng)?
                        };
                        for (_, admission) in &results {
                            if let Admission::Popped { players, .. } = admission {
                                purge_others(others, players, &mut outbox);
                            }
                        }
                        Ok(results)
                    },
                )?;
                admissions.extend(results.into_iter().map(|(_, a)| a));
            }

            self.enqueue(outbox)?;
            self.record_guild_state(&guild);
            admissions
        };

        let promoted = admissions.iter().filter(|a| a.admitted()).count();
        if promoted > 0 {
            info!(
                "Promoted {} waitlisted players on server {}",
                promoted, self.server_id
            );
        }
        self.metrics.record_promotions(promoted);
        self.record_admissions(admissions.iter());
        self.update_stats(|s| s.players_promoted += promoted as u64);

        self.deliver_pending().await;
        Ok(())
    }

    /// Register a threshold alert on one queue
    pub async fn add_notification(
        &self,
        queue_id: QueueId,
        player: PlayerId,
        threshold: usize,
    ) -> Result<bool> {
        self.ensure_alive()?;

        let added = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let added = queue_mut(&mut guild.queues, self.server_id, queue_id)?
                .add_notification(player, threshold, &mut outbox)?;
            self.enqueue(outbox)?;
            added
        };

        self.deliver_pending().await;
        Ok(added)
    }

    /// Drop every threshold alert of a player on one queue
    pub async fn remove_notification(&self, queue_id: QueueId, player: PlayerId) -> Result<bool> {
        self.ensure_alive()?;

        let removed = {
            let mut outbox = Outbox::new();
            let mut guild = self.lock_queues()?;
            let removed = queue_mut(&mut guild.queues, self.server_id, queue_id)?
                .remove_notification(player, &mut outbox);
            self.enqueue(outbox)?;
            removed
        };

        self.deliver_pending().await;
        Ok(removed)
    }

    pub async fn queue_status(&self, queue_id: QueueId) -> Result<QueueStatus> {
        let guild = self.lock_queues()?;
        guild
            .queues
            .get(&queue_id)
            .map(Queue::status)
            .ok_or_else(|| {
                QueueError::QueueNotFound {
                    server_id: self.server_id,
                    queue_id,
                }
                .into()
            })
    }

    /// Status of every queue, ordered by id
    pub async fn list_queues(&self) -> Result<Vec<QueueStatus>> {
        let guild = self.lock_queues()?;
        Ok(guild.queues.values().map(Queue::status).collect())
    }

    pub async fn active_games(&self) -> Result<Vec<GameSummary>> {
        let guild = self.lock_queues()?;
        Ok(guild
            .queues
            .values()
            .flat_map(|q| q.games().iter().map(|g| g.summary()))
            .collect())
    }

    pub async fn is_player_ingame(&self, player: PlayerId) -> Result<bool> {
        let guild = self.lock_queues()?;
        Ok(guild.queues.values().any(|q| q.has_player_in_game(player)))
    }

    pub async fn has_player_just_finished(&self, player: PlayerId) -> Result<bool> {
        self.cooldowns.contains(player)
    }

    /// Current manager statistics
    pub async fn stats(&self) -> Result<QueueManagerStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| QueueError::lock("stats"))?
            .clone();

        {
            let guild = self.lock_queues()?;
            stats.queues = guild.queues.len();
            stats.players_waiting = guild.queues.values().map(Queue::player_count).sum();
            stats.active_games = guild.queues.values().map(|q| q.games().len()).sum();
        }
        stats.players_on_cooldown = self.cooldowns.len()?;
        Ok(stats)
    }

    /// Tear the guild down: cancel its timers and pending announcements and
    /// ignore any callback still in flight. Returns the cancelled task count.
    pub async fn shutdown(&self) -> Result<usize> {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }

        let cancelled = self.scheduler.cancel_server(self.server_id)?;
        self.cooldowns.clear()?;
        self.metrics.remove_guild_gauges(self.server_id);
        if let Ok(pending) = self.scheduler.pending_count() {
            self.metrics.update_scheduled_tasks(pending);
        }

        info!(
            "Server {} torn down, {} pending tasks cancelled",
            self.server_id, cancelled
        );
        Ok(cancelled)
    }
}
