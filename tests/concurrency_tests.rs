//! Concurrent admission tests
//!
//! Many tasks hammer the same guild at once. Rosters must never exceed
//! capacity, a full roster pops exactly once, and no player ends up in two
//! games.

mod fixtures;

use fixtures::TestSystemBuilder;
use futures::future::join_all;
use pickup_queue::queue::{Admission, QueueConfiguration};
use pickup_queue::types::PlayerId;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_never_overfill() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(1);
    let queue = guild
        .create_queue(QueueConfiguration::new("5v5", 10))
        .await
        .unwrap();

    let start = Instant::now();
    let handles = (1..=103u64).map(|player| {
        let guild = guild.clone();
        tokio::spawn(async move { guild.add(queue, player).await })
    });
    let admissions: Vec<Admission> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    let elapsed = start.elapsed();

    let pops = admissions
        .iter()
        .filter(|a| matches!(a, Admission::Popped { .. }))
        .count();
    assert_eq!(pops, 10);

    let games = guild.active_games().await.unwrap();
    assert_eq!(games.len(), 10);

    let mut seen = HashSet::new();
    for game in &games {
        assert_eq!(game.players.len(), 10);
        for player in &game.players {
            assert!(seen.insert(*player), "player {} in two games", player);
        }
    }

    let status = guild.queue_status(queue).await.unwrap();
    assert_eq!(status.player_count(), 3);
    assert!(status.roster.iter().all(|p| !seen.contains(p)));

    println!(
        "✅ 103 concurrent adds processed in {:.2}ms",
        elapsed.as_secs_f64() * 1000.0
    );
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_to_all_across_queues() {
    let system = TestSystemBuilder::new().build();
    let guild = system.manager(7);
    let duel = guild
        .create_queue(QueueConfiguration::new("duel", 2))
        .await
        .unwrap();
    let trio = guild
        .create_queue(QueueConfiguration::new("trio", 3))
        .await
        .unwrap();

    let handles = (1..=40u64).map(|player| {
        let guild = guild.clone();
        tokio::spawn(async move { guild.add_to_all(player).await })
    });
    for joined in join_all(handles).await {
        joined.unwrap().unwrap();
    }

    let games = guild.active_games().await.unwrap();
    let mut in_game: HashSet<PlayerId> = HashSet::new();
    for game in &games {
        let expected = if game.queue_id == duel { 2 } else { 3 };
        assert_eq!(game.players.len(), expected);
        for player in &game.players {
            assert!(in_game.insert(*player), "player {} in two games", player);
        }
    }

    // Nobody waiting in a roster is also in a game
    for queue in [duel, trio] {
        let status = guild.queue_status(queue).await.unwrap();
        assert!(status.player_count() < status.capacity);
        assert!(status.roster.iter().all(|p| !in_game.contains(p)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guilds_run_independently() {
    let system = TestSystemBuilder::new().build();

    let handles = (1..=8u64).map(|server_id| {
        let guild = system.manager(server_id);
        tokio::spawn(async move {
            let queue = guild
                .create_queue(QueueConfiguration::new("duel", 2))
                .await
                .unwrap();
            let mut pops = 0;
            for player in 1..=20u64 {
                if let Admission::Popped { .. } = guild.add(queue, player).await.unwrap() {
                    pops += 1;
                }
            }
            pops
        })
    });

    for pops in join_all(handles).await {
        assert_eq!(pops.unwrap(), 10);
    }

    let stats = system.registry.stats().await.unwrap();
    assert_eq!(stats.servers, 8);
    assert_eq!(stats.active_games, 80);
    assert_eq!(stats.players_waiting, 0);
}
