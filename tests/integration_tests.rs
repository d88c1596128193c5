//! Integration tests for the pickup-queue engine
//!
//! These tests drive the public API end to end:
//! - Pop, announce, finish, cooldown and promotion across a guild
//! - Threshold alerts and presence gating
//! - Collaborator failures that must not disturb queue state
//! - Guild teardown and startup restore through the registry

mod fixtures;

use fixtures::{popped_game, settle, FailingStorage, SlowInsertStorage, TestSystemBuilder};
use pickup_queue::platform::InMemoryQueueStorage;
use pickup_queue::queue::{
    Admission, QueueConfiguration, QueueDefinition, QueueSettings, ServerDefinition,
};
use pickup_queue::scheduler::{TaskKey, TaskKind};
use pickup_queue::types::{Presence, StoredQueue};
use pickup_queue::QueueError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_complete_game_lifecycle() {
    let system = TestSystemBuilder::new()
        .cooldown_seconds(30)
        .announce_delay_seconds(2)
        .build();
    let guild = system.manager(100);

    let duel = guild
        .create_queue(QueueConfiguration::new("duel", 2))
        .await
        .unwrap();
    let team = guild
        .create_queue(QueueConfiguration::new("4v4", 8))
        .await
        .unwrap();

    // Step 1: A sits in both queues, B pops the duel
    guild.add(team, 1).await.unwrap();
    guild.add(duel, 1).await.unwrap();
    let game_id = popped_game(&guild.add(duel, 2).await.unwrap());

    assert!(guild.queue_status(team).await.unwrap().roster.is_empty());
    assert_eq!(guild.add(team, 1).await.unwrap(), Admission::InGame);

    // Step 2: the announcement waits for the guild delay
    assert!(system
        .scheduler
        .is_pending(&TaskKey::new(100, TaskKind::Announcement(game_id)))
        .unwrap());
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    let announcements = system.messenger.announcements();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].server_id, 100);
    assert!(announcements[0].body.contains("<@1>"));
    assert!(announcements[0].body.contains("<@2>"));

    // Step 3: finishing starts the cooldown, rejoins land on the waitlist
    assert!(guild.finish_game(game_id).await.unwrap());
    assert!(!guild.finish_game(game_id).await.unwrap());
    assert_eq!(guild.add(team, 1).await.unwrap(), Admission::Waitlisted);
    assert_eq!(guild.add(team, 1).await.unwrap(), Admission::Waitlisted);
    assert_eq!(guild.queue_status(team).await.unwrap().waitlist, vec![1]);
    assert_eq!(guild.add(team, 3).await.unwrap(), Admission::Joined { count: 1 });

    // Step 4: expiry promotes the waitlisted player into the roster
    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;

    let status = guild.queue_status(team).await.unwrap();
    assert_eq!(status.roster, vec![3, 1]);
    assert!(status.waitlist.is_empty());
    assert!(!guild.has_player_just_finished(1).await.unwrap());
    assert!(!guild.has_player_just_finished(2).await.unwrap());

    let stats = guild.stats().await.unwrap();
    assert_eq!(stats.games_started, 1);
    assert_eq!(stats.games_finished, 1);
    assert_eq!(stats.players_promoted, 1);
    assert_eq!(stats.active_games, 0);

    println!("✅ Complete game lifecycle test passed");
}

#[tokio::test]
async fn test_threshold_alert_presence_gating() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(1);
    let pug = guild
        .create_queue(QueueConfiguration::new("pug", 6))
        .await
        .unwrap();

    system.messenger.set_presence(21, Presence::Away);
    system.messenger.set_presence(22, Presence::Unavailable);
    for subscriber in [20, 21, 22] {
        assert!(guild.add_notification(pug, subscriber, 2).await.unwrap());
    }
    // A member of the roster is never alerted
    assert!(guild.add_notification(pug, 1, 2).await.unwrap());

    guild.add(pug, 1).await.unwrap();
    assert!(system.messenger.notices().is_empty());
    guild.add(pug, 2).await.unwrap();

    let expected = vec!["Queue: pug is at 2 players!".to_string()];
    assert_eq!(system.messenger.notices_for(20), expected);
    assert_eq!(system.messenger.notices_for(21), expected);
    assert!(system.messenger.notices_for(22).is_empty());
    assert!(system.messenger.notices_for(1).is_empty());

    // Crossing again after someone leaves alerts again
    guild.delete(pug, 2).await.unwrap();
    guild.add(pug, 3).await.unwrap();
    assert_eq!(system.messenger.notices_for(20).len(), 2);

    // Unsubscribed players stay quiet
    assert!(guild.remove_notification(pug, 20).await.unwrap());
    guild.delete(pug, 3).await.unwrap();
    guild.add(pug, 4).await.unwrap();
    assert_eq!(system.messenger.notices_for(20).len(), 2);
    assert_eq!(system.messenger.notices_for(21).len(), 3);
}

#[tokio::test]
async fn test_invalid_threshold_rejected() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(1);
    let pug = guild
        .create_queue(QueueConfiguration::new("pug", 4))
        .await
        .unwrap();

    let err = guild.add_notification(pug, 5, 0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<QueueError>(),
        Some(QueueError::InvalidThreshold { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_storage_failures_do_not_abort_transitions() {
    let storage = Arc::new(FailingStorage::new());
    let system = TestSystemBuilder::new()
        .storage(storage.clone())
        .announce_delay_seconds(1)
        .build();
    let guild = system.manager(9);

    let duel = guild
        .create_queue(QueueConfiguration::new("duel", 2).with_captains())
        .await
        .unwrap();

    guild.add(duel, 1).await.unwrap();
    let game_id = popped_game(&guild.add(duel, 2).await.unwrap());
    assert!(storage.attempts() >= 2);

    // Notices and the announcement still go out
    assert_eq!(system.messenger.notices_for(1).len(), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(system.messenger.announcements().len(), 1);
    assert!(system.messenger.announcements()[0]
        .body
        .contains("**Captains:**"));

    let games = guild.active_games().await.unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].game_id, game_id);
    let (c1, c2) = games[0].captains.unwrap();
    assert_ne!(c1, c2);

    let families = system.metrics.registry().gather();
    assert!(families
        .iter()
        .any(|family| family.get_name() == "pickup_queue_collaborator_failures_total"));
}

#[tokio::test(start_paused = true)]
async fn test_storage_writes_follow_queue_changes() {
    let storage = Arc::new(SlowInsertStorage::new(Duration::from_millis(50)));
    let system = TestSystemBuilder::new().storage(storage.clone()).build();
    let guild = system.manager(4);
    let pug = guild
        .create_queue(QueueConfiguration::new("pug", 2))
        .await
        .unwrap();

    // The join's insert is still in flight when the player leaves
    let joining = {
        let guild = guild.clone();
        tokio::spawn(async move { guild.add(pug, 7).await })
    };
    tokio::task::yield_now().await;
    assert!(guild.delete(pug, 7).await.unwrap());
    joining.await.unwrap().unwrap();

    let status = guild.queue_status(pug).await.unwrap();
    assert!(status.roster.is_empty());
    assert!(storage.snapshot(4, pug).unwrap().roster.is_empty());

    // A pop's roster wipe cannot overtake an earlier join either
    guild.add(pug, 8).await.unwrap();
    let joining = {
        let guild = guild.clone();
        tokio::spawn(async move { guild.add(pug, 9).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(
        guild.add(pug, 10).await.unwrap(),
        Admission::Joined { count: 1 }
    );
    popped_game(&joining.await.unwrap().unwrap());

    assert_eq!(guild.queue_status(pug).await.unwrap().roster, vec![10]);
    assert_eq!(storage.snapshot(4, pug).unwrap().roster, vec![10]);
}

#[tokio::test]
async fn test_restore_failure_starts_empty() {
    let system = TestSystemBuilder::new()
        .storage(Arc::new(FailingStorage::new()))
        .build();

    let restored = system
        .registry
        .restore(&[ServerDefinition {
            id: 3,
            queues: vec![QueueDefinition {
                id: 8,
                config: QueueConfiguration::new("5v5", 10),
            }],
        }])
        .await
        .unwrap();
    assert_eq!(restored, 1);

    let guild = system.registry.get(3).unwrap();
    assert_eq!(guild.queue_status(8).await.unwrap().player_count(), 0);

    // New queues get ids past the restored one
    let next = guild
        .create_queue(QueueConfiguration::new("2v2", 4))
        .await
        .unwrap();
    assert_eq!(next, 9);
}

#[tokio::test]
async fn test_restore_trims_full_roster() {
    let storage = Arc::new(InMemoryQueueStorage::new().with_queue(
        5,
        1,
        StoredQueue {
            roster: vec![1, 2, 3, 4],
            notifications: vec![(2, 50)],
        },
    ));
    let system = TestSystemBuilder::new().storage(storage.clone()).build();

    system
        .registry
        .restore(&[ServerDefinition {
            id: 5,
            queues: vec![QueueDefinition {
                id: 1,
                config: QueueConfiguration::new("2v2", 4),
            }],
        }])
        .await
        .unwrap();

    let guild = system.registry.get(5).unwrap();
    let status = guild.queue_status(1).await.unwrap();
    assert_eq!(status.roster, vec![1, 2, 3]);
    assert_eq!(status.notifications.get(&2), Some(&vec![50]));
    assert_eq!(storage.snapshot(5, 1).unwrap().roster, vec![1, 2, 3]);

    // The next player pops the restored roster
    popped_game(&guild.add(1, 9).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_server_teardown_cancels_everything() {
    let system = TestSystemBuilder::new()
        .cooldown_seconds(60)
        .announce_delay_seconds(5)
        .build();
    let guild = system.manager(42);
    let duel = guild
        .create_queue(QueueConfiguration::new("duel", 2))
        .await
        .unwrap();
    let other = guild
        .create_queue(QueueConfiguration::new("other", 2))
        .await
        .unwrap();

    guild.add(duel, 1).await.unwrap();
    let first = popped_game(&guild.add(duel, 2).await.unwrap());
    guild.finish_game(first).await.unwrap();
    guild.add(other, 1).await.unwrap();
    guild.add(duel, 3).await.unwrap();
    popped_game(&guild.add(duel, 4).await.unwrap());

    assert!(system.scheduler.pending_for_server(42).unwrap() >= 2);
    assert!(system.registry.remove_server(42).await.unwrap());
    assert_eq!(system.scheduler.pending_for_server(42).unwrap(), 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;

    // No announcement or promotion ran after teardown
    assert!(system.messenger.announcements().is_empty());
    let err = guild.add(other, 5).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<QueueError>(),
        Some(QueueError::ServerNotFound { server_id: 42 })
    ));
}

#[tokio::test]
async fn test_queue_administration() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(1);
    let queue = guild
        .create_queue(QueueConfiguration::new("scrim", 6))
        .await
        .unwrap();

    for player in 1..=3 {
        guild.add(queue, player).await.unwrap();
    }

    // Capacity cannot drop to or below the current roster
    assert!(guild.set_capacity(queue, 3).await.is_err());
    guild.set_capacity(queue, 4).await.unwrap();
    guild.rename_queue(queue, "scrim-4").await.unwrap();
    guild
        .update_queue_settings(
            queue,
            QueueSettings {
                randomize_captains: true,
            },
        )
        .await
        .unwrap();

    let game_id = popped_game(&guild.add(queue, 4).await.unwrap());
    let games = guild.active_games().await.unwrap();
    assert_eq!(games[0].game_id, game_id);
    assert_eq!(games[0].queue_name, "scrim-4");
    assert!(games[0].captains.is_some());

    assert_eq!(guild.finish_game_for_player(4).await.unwrap(), Some(game_id));
    assert_eq!(guild.finish_game_for_player(4).await.unwrap(), None);

    let removed = guild.remove_queue(queue).await.unwrap();
    assert_eq!(removed.name, "scrim-4");
    assert!(guild.list_queues().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_to_all_skips_popped_player() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(1);
    let duel = guild
        .create_queue(QueueConfiguration::new("duel", 2))
        .await
        .unwrap();
    let team = guild
        .create_queue(QueueConfiguration::new("team", 10))
        .await
        .unwrap();

    guild.add(duel, 1).await.unwrap();
    let results = guild.add_to_all(2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], (id, Admission::Popped { .. }) if id == duel));
    assert_eq!(results[1], (team, Admission::InGame));

    let players: HashSet<_> = guild.active_games().await.unwrap()[0]
        .players
        .iter()
        .copied()
        .collect();
    assert_eq!(players, HashSet::from([1, 2]));
    assert!(guild.queue_status(team).await.unwrap().roster.is_empty());
}
