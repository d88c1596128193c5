//! A game formed when a queue pops

use crate::error::{QueueError, Result};
use crate::types::{GameId, GameState, GameSummary, PlayerId, QueueId, ServerId};
use crate::utils::{current_timestamp, generate_game_id};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

/// One match: the fixed set of players that popped together
#[derive(Debug, Clone)]
pub struct Game {
    id: GameId,
    server_id: ServerId,
    queue_id: QueueId,
    queue_name: String,
    players: Vec<PlayerId>,
    captains: Option<(PlayerId, PlayerId)>,
    state: GameState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Game {
    /// Create a game from a popped roster, drawing captains with the thread RNG
    pub fn new(
        server_id: ServerId,
        queue_id: QueueId,
        queue_name: impl Into<String>,
        players: Vec<PlayerId>,
        randomize_captains: bool,
    ) -> Result<Self> {
        Self::with_rng(
            server_id,
            queue_id,
            queue_name,
            players,
            randomize_captains,
            &mut rand::thread_rng(),
        )
    }

    /// Create a game using the given RNG for captain selection
    pub fn with_rng<R: Rng + ?Sized>(
        server_id: ServerId,
        queue_id: QueueId,
        queue_name: impl Into<String>,
        players: Vec<PlayerId>,
        randomize_captains: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let captains = if randomize_captains {
            Some(pick_captains(&players, rng)?)
        } else {
            None
        };

        Ok(Self {
            id: generate_game_id(),
            server_id,
            queue_id,
            queue_name: queue_name.into(),
            players,
            captains,
            state: GameState::Active,
            started_at: current_timestamp(),
            finished_at: None,
        })
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    pub fn captain1(&self) -> Option<PlayerId> {
        self.captains.map(|(c, _)| c)
    }

    pub fn captain2(&self) -> Option<PlayerId> {
        self.captains.map(|(_, c)| c)
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Move the game to its terminal state. Returns false if it was already finished.
    pub fn finish(&mut self) -> bool {
        if self.state == GameState::Finished {
            return false;
        }
        self.state = GameState::Finished;
        self.finished_at = Some(current_timestamp());
        true
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            game_id: self.id,
            server_id: self.server_id,
            queue_id: self.queue_id,
            queue_name: self.queue_name.clone(),
            players: self.players.clone(),
            captains: self.captains,
            state: self.state,
            started_at: self.started_at,
        }
    }
}

/// Two distinct players drawn uniformly from the whole player set
fn pick_captains<R: Rng + ?Sized>(
    players: &[PlayerId],
    rng: &mut R,
) -> Result<(PlayerId, PlayerId)> {
    let chosen: Vec<PlayerId> = players.choose_multiple(rng, 2).copied().collect();
    match chosen.as_slice() {
        [first, second] => Ok((*first, *second)),
        _ => Err(QueueError::ConfigurationError {
            message: format!(
                "Captain randomization needs at least 2 players, game has {}",
                players.len()
            ),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_game_without_captains() {
        let game = Game::new(1, 1, "5v5", vec![1, 2, 3, 4], false).unwrap();
        assert_eq!(game.state(), GameState::Active);
        assert_eq!(game.players(), &[1, 2, 3, 4]);
        assert!(game.captain1().is_none());
        assert!(game.captain2().is_none());
    }

    #[test]
    fn test_captains_are_distinct_members() {
        let players = vec![10, 20, 30, 40, 50, 60];
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let game = Game::with_rng(1, 1, "6s", players.clone(), true, &mut rng).unwrap();
            let c1 = game.captain1().unwrap();
            let c2 = game.captain2().unwrap();
            assert_ne!(c1, c2);
            assert!(game.contains(c1));
            assert!(game.contains(c2));
            // Captains are drawn from the set, the set itself is untouched
            assert_eq!(game.players(), players.as_slice());
        }
    }

    #[test]
    fn test_every_player_can_be_captain() {
        let players = vec![1, 2, 3, 4];
        let mut seen = HashSet::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let game = Game::with_rng(1, 1, "2v2", players.clone(), true, &mut rng).unwrap();
            seen.insert(game.captain1().unwrap());
            seen.insert(game.captain2().unwrap());
        }
        assert_eq!(seen.len(), players.len());
    }

    #[test]
    fn test_captains_need_two_players() {
        assert!(Game::new(1, 1, "solo", vec![1], true).is_err());
        assert!(Game::new(1, 1, "solo", vec![1], false).is_ok());
    }

    #[test]
    fn test_finish_is_single_transition() {
        let mut game = Game::new(1, 1, "duo", vec![1, 2], false).unwrap();
        assert!(game.finish());
        let finished_at = game.finished_at();
        assert!(finished_at.is_some());

        assert!(!game.finish());
        assert_eq!(game.state(), GameState::Finished);
        assert_eq!(game.finished_at(), finished_at);
    }
}
