//! Queue Simulator CLI Tool
//!
//! Runs scripted pickup scenarios against an in-process queue engine with
//! in-memory storage and a messenger that logs instead of posting.
//!
//! Usage:
//!   cargo run --bin queue-sim -- --help
//!   cargo run --bin queue-sim run-scenario --scenario pop
//!   cargo run --bin queue-sim run-all-scenarios

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pickup_queue::metrics::MetricsCollector;
use pickup_queue::platform::{Dispatcher, InMemoryQueueStorage, LoggingMessenger};
use pickup_queue::queue::{
    Admission, GuildSettings, QueueConfiguration, QueueManager, StaticSettingsProvider,
};
use pickup_queue::scheduler::TaskScheduler;
use std::sync::Arc;
use std::time::Duration;

const SERVER_ID: u64 = 1;

const SCENARIOS: &[(&str, &str)] = &[
    ("pop", "Fill a 4 player queue with captains and let it pop"),
    (
        "cooldown",
        "Finish a game, rejoin during the cooldown, get promoted when it expires",
    ),
    ("threshold", "Subscribe to a threshold and watch it fire once"),
    (
        "cross-queue",
        "Pop one queue and watch its players leave the other queues",
    ),
];

#[derive(Parser)]
#[command(name = "queue-sim")]
#[command(about = "Scripted scenarios for the pickup-queue engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cooldown applied to finished players, in seconds
    #[arg(long, default_value = "1")]
    cooldown: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// List available scenarios
    List,
    /// Run a predefined scenario
    RunScenario {
        /// Scenario name (pop, cooldown, threshold, cross-queue)
        #[arg(short, long)]
        scenario: String,
    },
    /// Run all scenarios
    RunAllScenarios,
}

/// Fresh single-guild engine for one scenario
fn create_manager(cooldown: u64) -> Result<Arc<QueueManager>> {
    let metrics = Arc::new(MetricsCollector::new()?);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(InMemoryQueueStorage::new()),
        Arc::new(LoggingMessenger::new()),
        Arc::new(TaskScheduler::new()),
        metrics,
    ));
    let settings = GuildSettings {
        finish_cooldown_seconds: cooldown,
        announce_delay_seconds: 0,
    };
    settings.validate()?;

    Ok(QueueManager::new(
        SERVER_ID,
        Arc::new(StaticSettingsProvider::new(settings)),
        dispatcher,
    ))
}

fn describe(admission: &Admission) -> String {
    match admission {
        Admission::Joined { count } => format!("joined ({} in queue)", count),
        Admission::Waitlisted => "waitlisted".to_string(),
        Admission::AlreadyQueued => "already queued".to_string(),
        Admission::InGame => "in game".to_string(),
        Admission::Popped { game_id, players } => {
            format!("popped game {} with {:?}", game_id, players)
        }
    }
}

async fn scenario_pop(manager: &QueueManager) -> Result<()> {
    let queue = manager
        .create_queue(QueueConfiguration::new("2v2", 4).with_captains())
        .await?;

    for player in 1..=4 {
        let admission = manager.add(queue, player).await?;
        println!("  player {}: {}", player, describe(&admission));
    }

    let games = manager.active_games().await?;
    let game = games.first().ok_or_else(|| anyhow!("queue did not pop"))?;
    println!(
        "  game {} running with captains {:?}",
        game.game_id, game.captains
    );
    Ok(())
}

async fn scenario_cooldown(manager: &QueueManager, cooldown: u64) -> Result<()> {
    let queue = manager
        .create_queue(QueueConfiguration::new("duel", 2))
        .await?;

    manager.add(queue, 1).await?;
    let Admission::Popped { game_id, .. } = manager.add(queue, 2).await? else {
        return Err(anyhow!("duel did not pop"));
    };
    println!("  game {} started", game_id);

    manager.finish_game(game_id).await?;
    println!("  game {} finished, cooldown {}s", game_id, cooldown);

    let admission = manager.add(queue, 1).await?;
    println!("  player 1 rejoins: {}", describe(&admission));

    tokio::time::sleep(Duration::from_secs(cooldown) + Duration::from_millis(250)).await;

    let status = manager.queue_status(queue).await?;
    println!(
        "  after cooldown: roster {:?}, waitlist {:?}",
        status.roster, status.waitlist
    );
    Ok(())
}

async fn scenario_threshold(manager: &QueueManager) -> Result<()> {
    let queue = manager
        .create_queue(QueueConfiguration::new("5v5", 10))
        .await?;

    manager.add_notification(queue, 100, 3).await?;
    println!("  player 100 wants a ping at 3 players");

    for player in 1..=4 {
        let admission = manager.add(queue, player).await?;
        println!("  player {}: {}", player, describe(&admission));
    }
    Ok(())
}

async fn scenario_cross_queue(manager: &QueueManager) -> Result<()> {
    let duel = manager
        .create_queue(QueueConfiguration::new("duel", 2))
        .await?;
    let team = manager
        .create_queue(QueueConfiguration::new("5v5", 10))
        .await?;

    for player in [1, 2] {
        for (queue, admission) in manager.add_to_all(player).await? {
            println!("  player {} -> queue {}: {}", player, queue, describe(&admission));
        }
    }

    let duel_status = manager.queue_status(duel).await?;
    let team_status = manager.queue_status(team).await?;
    println!(
        "  duel roster {:?}, 5v5 roster {:?}",
        duel_status.roster, team_status.roster
    );
    Ok(())
}

async fn run_scenario(name: &str, cooldown: u64) -> Result<()> {
    let manager = create_manager(cooldown)?;
    println!("🎮 Running scenario '{}'", name);

    let result = match name {
        "pop" => scenario_pop(&manager).await,
        "cooldown" => scenario_cooldown(&manager, cooldown).await,
        "threshold" => scenario_threshold(&manager).await,
        "cross-queue" => scenario_cross_queue(&manager).await,
        _ => Err(anyhow!(
            "Unknown scenario '{}'. Use 'list' to see available scenarios",
            name
        )),
    };

    let stats = manager.stats().await?;
    manager.shutdown().await?;

    match &result {
        Ok(()) => println!(
            "✅ Scenario '{}' completed: {} games started, {} finished, {} promoted",
            name, stats.games_started, stats.games_finished, stats.players_promoted
        ),
        Err(e) => eprintln!("❌ Scenario '{}' failed: {}", name, e),
    }
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.cooldown == 0 {
        return Err(anyhow!("Cooldown must be at least one second"));
    }

    match cli.command {
        Commands::List => {
            println!("Available scenarios:");
            for (name, description) in SCENARIOS {
                println!("  {:<12} {}", name, description);
            }
        }

        Commands::RunScenario { scenario } => {
            if run_scenario(&scenario, cli.cooldown).await.is_err() {
                std::process::exit(1);
            }
        }

        Commands::RunAllScenarios => {
            let mut failed = 0;
            for (name, _) in SCENARIOS {
                if run_scenario(name, cli.cooldown).await.is_err() {
                    failed += 1;
                }
            }

            if failed > 0 {
                eprintln!("❌ {} of {} scenarios failed", failed, SCENARIOS.len());
                std::process::exit(1);
            }
            println!("✅ All {} scenarios passed", SCENARIOS.len());
        }
    }

    Ok(())
}
