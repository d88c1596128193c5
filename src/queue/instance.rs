//! Queue instance: admission and pop state machine
//!
//! A queue owns its roster, waitlist, notification registry and active
//! games. Every operation here is synchronous and runs while the owning
//! guild's lock is held; platform I/O is only recorded in the outbox.

use crate::error::{QueueError, Result};
use crate::queue::game::Game;
use crate::queue::notifications::NotificationRegistry;
use crate::queue::outbox::{Outbox, StorageWrite};
use crate::queue::provider::{validate_capacity, QueueConfiguration, QueueSettings};
use crate::queue::roster::Roster;
use crate::queue::waitlist::Waitlist;
use crate::types::{
    Announcement, AnnouncementColor, GameId, PlayerId, QueueId, QueueStatus, ServerId, StoredQueue,
};
use crate::utils::{mention, mention_list};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

/// Guild-level lookups a queue needs during admission
#[cfg_attr(test, mockall::automock)]
pub trait GuildScope {
    /// Whether the player is part of an active game anywhere in the guild
    fn is_player_ingame(&self, player: PlayerId) -> Result<bool>;

    /// Whether the player is inside the guild's post-game cooldown
    fn has_player_just_finished(&self, player: PlayerId) -> Result<bool>;
}

/// Outcome of offering a player to a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Player joined the roster, which now holds `count` players
    Joined { count: usize },
    /// Player is on cooldown and was put on the waitlist
    Waitlisted,
    /// Player was already in the roster
    AlreadyQueued,
    /// Player is in an active game
    InGame,
    /// Player's arrival filled the queue and a game was formed
    Popped {
        game_id: GameId,
        players: Vec<PlayerId>,
    },
}

impl Admission {
    /// Whether the player ended up in the roster or in the popped game
    pub fn admitted(&self) -> bool {
        matches!(self, Admission::Joined { .. } | Admission::Popped { .. })
    }
}

/// One named, capacity-bound queue of a guild
#[derive(Debug, Clone)]
pub struct Queue {
    server_id: ServerId,
    id: QueueId,
    name: String,
    capacity: usize,
    settings: QueueSettings,
    roster: Roster,
    waitlist: Waitlist,
    notifications: NotificationRegistry,
    active_games: Vec<Game>,
}

impl Queue {
    pub fn new(server_id: ServerId, id: QueueId, config: QueueConfiguration) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            server_id,
            id,
            name: config.name,
            capacity: config.capacity,
            settings: config.settings,
            roster: Roster::new(),
            waitlist: Waitlist::new(),
            notifications: NotificationRegistry::new(),
            active_games: Vec::new(),
        })
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn players(&self) -> &[PlayerId] {
        self.roster.players()
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    pub fn waiting_players(&self) -> &[PlayerId] {
        self.waitlist.players()
    }

    pub fn is_player_waiting(&self, player: PlayerId) -> bool {
        self.waitlist.contains(player)
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.roster.contains(player)
    }

    pub fn games(&self) -> &[Game] {
        &self.active_games
    }

    pub fn notifications(&self) -> &NotificationRegistry {
        &self.notifications
    }

    /// Whether the player is in one of this queue's active games
    pub fn has_player_in_game(&self, player: PlayerId) -> bool {
        self.active_games.iter().any(|g| g.contains(player))
    }

    /// Offer a player to the queue
    pub fn add(
        &mut self,
        player: PlayerId,
        scope: &dyn GuildScope,
        outbox: &mut Outbox,
    ) -> Result<Admission> {
        if self.roster.contains(player) {
            debug!("Player {} already in queue '{}'", player, self.name);
            return Ok(Admission::AlreadyQueued);
        }

        if self.has_player_in_game(player) || scope.is_player_ingame(player)? {
            debug!(
                "Player {} is in game, not admitted to queue '{}'",
                player, self.name
            );
            return Ok(Admission::InGame);
        }

        if scope.has_player_just_finished(player)? {
            self.add_to_waitlist(player);
            return Ok(Admission::Waitlisted);
        }

        // A player only leaves the waitlist by being admitted
        self.waitlist.remove(player);

        self.roster.push(player);
        outbox.persist(StorageWrite::InsertPlayer {
            server_id: self.server_id,
            queue_id: self.id,
            player_id: player,
        });

        let count = self.roster.len();
        info!(
            "Player {} joined queue '{}' ({}/{})",
            player, self.name, count, self.capacity
        );

        self.check_notifications(outbox);

        if count == self.capacity {
            let (game_id, players) = self.pop(outbox)?;
            return Ok(Admission::Popped { game_id, players });
        }

        Ok(Admission::Joined { count })
    }

    /// Put a cooled-down player on the waitlist. Returns false if already there.
    pub fn add_to_waitlist(&mut self, player: PlayerId) -> bool {
        let added = self.waitlist.insert(player);
        if added {
            info!(
                "Player {} just finished a game, waitlisted for queue '{}'",
                player, self.name
            );
        }
        added
    }

    /// Turn the full roster into a game
    fn pop(&mut self, outbox: &mut Outbox) -> Result<(GameId, Vec<PlayerId>)> {
        if self.roster.len() != self.capacity {
            return Err(QueueError::InternalError {
                message: format!(
                    "Queue '{}' cannot pop with {}/{} players",
                    self.name,
                    self.roster.len(),
                    self.capacity
                ),
            }
            .into());
        }

        // Build the game before touching the roster so a failure leaves it intact
        let game = Game::new(
            self.server_id,
            self.id,
            self.name.clone(),
            self.roster.players().to_vec(),
            self.settings.randomize_captains(),
        )?;
        let players = self.roster.take();
        let game_id = game.id();

        outbox.persist(StorageWrite::DeleteQueueRoster {
            server_id: self.server_id,
            queue_id: self.id,
        });

        for player in &players {
            outbox.notice(*player, format!("Your game: {} has started!", self.name));
        }

        let mut body = mention_list(&players);
        if let (Some(c1), Some(c2)) = (game.captain1(), game.captain2()) {
            body.push_str(&format!(
                "\n**Captains:** {} & {}",
                mention(c1),
                mention(c2)
            ));
        }
        outbox.announce(
            game_id,
            Announcement {
                server_id: self.server_id,
                title: format!("Game: {} starting", self.name),
                body,
                color: AnnouncementColor::Yellow,
            },
        );

        info!(
            "Queue '{}' popped - game {} with {} players",
            self.name,
            game_id,
            players.len()
        );

        self.active_games.push(game);
        Ok((game_id, players))
    }

    /// Alert subscribers of the current roster size
    fn check_notifications(&self, outbox: &mut Outbox) {
        let count = self.roster.len();
        let recipients: Vec<PlayerId> = self
            .notifications
            .subscribers(count)
            .iter()
            .copied()
            .filter(|p| !self.roster.contains(*p))
            .collect();

        if recipients.is_empty() {
            return;
        }

        debug!(
            "Queue '{}' reached {} players, alerting {} subscribers",
            self.name,
            count,
            recipients.len()
        );
        outbox.alert(
            self.id,
            recipients,
            format!("Queue: {} is at {} players!", self.name, count),
        );
    }

    /// Take a game out of the active set and finish it.
    /// Returns `None` when the game is unknown or was already finished.
    pub fn finish(&mut self, game_id: GameId) -> Option<Game> {
        let index = self.active_games.iter().position(|g| g.id() == game_id)?;
        let mut game = self.active_games.remove(index);
        if !game.finish() {
            warn!("Game {} was already finished", game_id);
            return None;
        }

        info!(
            "Game {} of queue '{}' finished with {} players",
            game_id,
            self.name,
            game.players().len()
        );
        Some(game)
    }

    /// Active game with the given id
    pub fn game(&self, game_id: GameId) -> Option<&Game> {
        self.active_games.iter().find(|g| g.id() == game_id)
    }

    /// Active game a player is part of
    pub fn game_for_player(&self, player: PlayerId) -> Option<&Game> {
        self.active_games.iter().find(|g| g.contains(player))
    }

    /// Remove a player from the roster or the waitlist
    pub fn delete(&mut self, player: PlayerId, outbox: &mut Outbox) -> bool {
        if self.roster.remove(player) {
            outbox.persist(StorageWrite::DeletePlayer {
                server_id: self.server_id,
                queue_id: self.id,
                player_id: player,
            });
            debug!("Player {} left queue '{}'", player, self.name);
            true
        } else if self.waitlist.remove(player) {
            debug!("Player {} left the waitlist of '{}'", player, self.name);
            true
        } else {
            false
        }
    }

    /// Remove every listed player. Returns how many were removed.
    pub fn purge(&mut self, players: &[PlayerId], outbox: &mut Outbox) -> usize {
        players
            .iter()
            .filter(|p| self.delete(**p, outbox))
            .count()
    }

    /// Re-offer waitlisted players whose cooldown just ended, in random order
    pub fn add_players_waiting<R: Rng + ?Sized>(
        &mut self,
        finished: &[PlayerId],
        scope: &dyn GuildScope,
        outbox: &mut Outbox,
        rng: &mut R,
    ) -> Result<Vec<(PlayerId, Admission)>> {
        if self.waitlist.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = finished.to_vec();
        candidates.shuffle(rng);

        let mut results = Vec::new();
        for player in candidates {
            if !self.waitlist.contains(player) {
                continue;
            }
            let admission = self.add(player, scope, outbox)?;
            if admission != Admission::Waitlisted {
                self.waitlist.remove(player);
            }
            debug!(
                "Promoted player {} from waitlist of '{}': {:?}",
                player, self.name, admission
            );
            results.push((player, admission));
        }
        Ok(results)
    }

    /// Register a threshold alert
    pub fn add_notification(
        &mut self,
        player: PlayerId,
        threshold: usize,
        outbox: &mut Outbox,
    ) -> Result<bool> {
        if threshold == 0 {
            return Err(QueueError::InvalidThreshold {
                threshold,
                reason: "Threshold must be a positive player count".to_string(),
            }
            .into());
        }

        let added = self.notifications.register(threshold, player);
        if added {
            outbox.persist(StorageWrite::InsertNotification {
                server_id: self.server_id,
                queue_id: self.id,
                player_id: player,
                threshold,
            });
            debug!(
                "Player {} will be alerted when '{}' reaches {} players",
                player, self.name, threshold
            );
        }
        Ok(added)
    }

    /// Drop every threshold alert of a player
    pub fn remove_notification(&mut self, player: PlayerId, outbox: &mut Outbox) -> bool {
        let removed = self.notifications.unregister(player);
        if removed.is_empty() {
            return false;
        }

        outbox.persist(StorageWrite::DeleteNotification {
            server_id: self.server_id,
            queue_id: self.id,
            player_id: player,
        });
        true
    }

    /// Load persisted roster and notification rows without re-persisting
    /// them or firing alerts. Roster rows that would fill the queue are
    /// dropped, since a full roster only ever exists during a pop.
    pub fn restore(&mut self, stored: StoredQueue, outbox: &mut Outbox) {
        for player in stored.roster {
            if self.roster.len() + 1 >= self.capacity {
                warn!(
                    "Dropping restored player {} from queue '{}': roster would be full",
                    player, self.name
                );
                outbox.persist(StorageWrite::DeletePlayer {
                    server_id: self.server_id,
                    queue_id: self.id,
                    player_id: player,
                });
                continue;
            }
            self.roster.push(player);
        }

        for (threshold, player) in stored.notifications {
            if threshold > 0 {
                self.notifications.register(threshold, player);
            }
        }

        info!(
            "Restored queue '{}' with {} players",
            self.name,
            self.roster.len()
        );
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(QueueError::ConfigurationError {
                message: "Queue name cannot be empty".to_string(),
            }
            .into());
        }
        self.name = name;
        Ok(())
    }

    /// Change the capacity. It must stay above the current roster size,
    /// otherwise the queue would be full without going through a pop.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        validate_capacity(capacity, &self.settings)?;
        if capacity <= self.roster.len() {
            return Err(QueueError::InvalidCapacity {
                reason: format!(
                    "Capacity {} must exceed the {} players already queued",
                    capacity,
                    self.roster.len()
                ),
            }
            .into());
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn update_settings(&mut self, settings: QueueSettings) -> Result<()> {
        validate_capacity(self.capacity, &settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            server_id: self.server_id,
            queue_id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            roster: self.roster.players().to_vec(),
            waitlist: self.waitlist.players().to_vec(),
            active_games: self.active_games.len(),
            notifications: self.notifications.snapshot(),
        }
    }
}
