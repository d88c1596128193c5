//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the pickup queue engine
//! using Prometheus metrics.

use crate::queue::Admission;
use crate::types::ServerId;
use anyhow::Result;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the queue engine
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue and game metrics
    queue_metrics: QueueMetrics,

    /// Outbound message metrics
    notification_metrics: NotificationMetrics,

    /// Storage and messaging collaborator metrics
    platform_metrics: PlatformMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Number of guilds with queues
    pub active_servers: IntGauge,
}

/// Queue and game metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Admission attempts by outcome
    pub admissions_total: IntCounterVec,

    /// Games formed by a full queue
    pub games_popped_total: IntCounter,

    /// Games finished
    pub games_finished_total: IntCounter,

    /// Players moved from a waitlist back into a queue
    pub players_promoted_total: IntCounter,

    /// Queues per guild
    pub queues: IntGaugeVec,

    /// Players waiting in rosters per guild
    pub players_waiting: IntGaugeVec,

    /// Active games per guild
    pub active_games: IntGaugeVec,
}

/// Outbound message metrics
#[derive(Clone)]
pub struct NotificationMetrics {
    /// Messages handed to the messenger by kind
    pub notifications_sent_total: IntCounterVec,

    /// Threshold alerts skipped because of the player's presence
    pub alerts_suppressed_total: IntCounter,
}

/// Collaborator metrics
#[derive(Clone)]
pub struct PlatformMetrics {
    /// Failed collaborator calls by collaborator and operation
    pub collaborator_failures_total: IntCounterVec,

    /// Delayed tasks currently pending
    pub scheduled_tasks: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of guild operations, lock acquisition included
    pub operation_duration: HistogramVec,

    /// Time spent delivering an outbox
    pub dispatch_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let notification_metrics = NotificationMetrics::new(&registry)?;
        let platform_metrics = PlatformMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            notification_metrics,
            platform_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn notification(&self) -> &NotificationMetrics {
        &self.notification_metrics
    }

    pub fn platform(&self) -> &PlatformMetrics {
        &self.platform_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record the outcome of offering a player to a queue
    pub fn record_admission(&self, admission: &Admission) {
        let outcome = match admission {
            Admission::Joined { .. } => "joined",
            Admission::Waitlisted => "waitlisted",
            Admission::AlreadyQueued => "already_queued",
            Admission::InGame => "in_game",
            Admission::Popped { .. } => "popped",
        };

        self.queue_metrics
            .admissions_total
            .with_label_values(&[outcome])
            .inc();

        if matches!(admission, Admission::Popped { .. }) {
            self.queue_metrics.games_popped_total.inc();
        }
    }

    pub fn record_game_finished(&self) {
        self.queue_metrics.games_finished_total.inc();
    }

    pub fn record_promotions(&self, count: usize) {
        self.queue_metrics
            .players_promoted_total
            .inc_by(count as u64);
    }

    /// Record a message handed to the messenger
    pub fn record_notification(&self, kind: &str) {
        self.notification_metrics
            .notifications_sent_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_alert_suppressed(&self) {
        self.notification_metrics.alerts_suppressed_total.inc();
    }

    /// Record a failed storage or messaging call
    pub fn record_collaborator_failure(&self, collaborator: &str, operation: &str) {
        self.platform_metrics
            .collaborator_failures_total
            .with_label_values(&[collaborator, operation])
            .inc();
    }

    pub fn update_scheduled_tasks(&self, pending: usize) {
        self.platform_metrics.scheduled_tasks.set(pending as i64);
    }

    /// Refresh the gauges of one guild
    pub fn update_guild_gauges(
        &self,
        server_id: ServerId,
        queues: usize,
        players_waiting: usize,
        active_games: usize,
    ) {
        let server = server_id.to_string();
        self.queue_metrics
            .queues
            .with_label_values(&[server.as_str()])
            .set(queues as i64);
        self.queue_metrics
            .players_waiting
            .with_label_values(&[server.as_str()])
            .set(players_waiting as i64);
        self.queue_metrics
            .active_games
            .with_label_values(&[server.as_str()])
            .set(active_games as i64);
    }

    /// Drop the gauges of a guild that was torn down
    pub fn remove_guild_gauges(&self, server_id: ServerId) {
        let server = server_id.to_string();
        let _ = self.queue_metrics.queues.remove_label_values(&[server.as_str()]);
        let _ = self
            .queue_metrics
            .players_waiting
            .remove_label_values(&[server.as_str()]);
        let _ = self
            .queue_metrics
            .active_games
            .remove_label_values(&[server.as_str()]);
    }

    pub fn update_active_servers(&self, count: usize) {
        self.service_metrics.active_servers.set(count as i64);
    }

    /// Record the duration of a guild operation
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    pub fn record_dispatch(&self, effects: usize, duration: Duration) {
        let size = match effects {
            0..=1 => "single",
            2..=10 => "small",
            _ => "large",
        };
        self.performance_metrics
            .dispatch_duration
            .with_label_values(&[size])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("pickup_queue_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "pickup_queue_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("pickup_queue_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let active_servers = IntGauge::new(
            "pickup_queue_active_servers",
            "Number of guilds with registered queues",
        )?;
        registry.register(Box::new(active_servers.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            active_servers,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let admissions_total = IntCounterVec::new(
            Opts::new(
                "pickup_queue_admissions_total",
                "Admission attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(admissions_total.clone()))?;

        let games_popped_total =
            IntCounter::new("pickup_queue_games_popped_total", "Total games formed")?;
        registry.register(Box::new(games_popped_total.clone()))?;

        let games_finished_total =
            IntCounter::new("pickup_queue_games_finished_total", "Total games finished")?;
        registry.register(Box::new(games_finished_total.clone()))?;

        let players_promoted_total = IntCounter::new(
            "pickup_queue_players_promoted_total",
            "Players re-offered from a waitlist after their cooldown",
        )?;
        registry.register(Box::new(players_promoted_total.clone()))?;

        let queues = IntGaugeVec::new(
            Opts::new("pickup_queue_queues", "Queues per guild"),
            &["server"],
        )?;
        registry.register(Box::new(queues.clone()))?;

        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "pickup_queue_players_waiting",
                "Players currently waiting in queue rosters",
            ),
            &["server"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let active_games = IntGaugeVec::new(
            Opts::new("pickup_queue_active_games", "Games currently in progress"),
            &["server"],
        )?;
        registry.register(Box::new(active_games.clone()))?;

        Ok(Self {
            admissions_total,
            games_popped_total,
            games_finished_total,
            players_promoted_total,
            queues,
            players_waiting,
            active_games,
        })
    }
}

impl NotificationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let notifications_sent_total = IntCounterVec::new(
            Opts::new(
                "pickup_queue_notifications_sent_total",
                "Messages handed to the messenger",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(notifications_sent_total.clone()))?;

        let alerts_suppressed_total = IntCounter::new(
            "pickup_queue_alerts_suppressed_total",
            "Threshold alerts skipped because the player is unavailable",
        )?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;

        Ok(Self {
            notifications_sent_total,
            alerts_suppressed_total,
        })
    }
}

impl PlatformMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let collaborator_failures_total = IntCounterVec::new(
            Opts::new(
                "pickup_queue_collaborator_failures_total",
                "Failed storage and messaging calls",
            ),
            &["collaborator", "operation"],
        )?;
        registry.register(Box::new(collaborator_failures_total.clone()))?;

        let scheduled_tasks = IntGauge::new(
            "pickup_queue_scheduled_tasks",
            "Delayed announcements and cooldown timers pending",
        )?;
        registry.register(Box::new(scheduled_tasks.clone()))?;

        Ok(Self {
            collaborator_failures_total,
            scheduled_tasks,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_queue_operation_duration_seconds",
                "Guild operation duration",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_queue_dispatch_duration_seconds",
                "Outbox delivery duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["size"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        Ok(Self {
            operation_duration,
            dispatch_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_game_id;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _notification = collector.notification();
        let _platform = collector.platform();
        let _performance = collector.performance();
    }

    #[test]
    fn test_admission_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_admission(&Admission::Joined { count: 1 });
        collector.record_admission(&Admission::Waitlisted);
        collector.record_admission(&Admission::Popped {
            game_id: generate_game_id(),
            players: vec![1, 2],
        });

        let queue = collector.queue();
        assert_eq!(
            queue.admissions_total.with_label_values(&["joined"]).get(),
            1
        );
        assert_eq!(
            queue.admissions_total.with_label_values(&["popped"]).get(),
            1
        );
        assert_eq!(queue.games_popped_total.get(), 1);
    }

    #[test]
    fn test_guild_gauges() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_guild_gauges(42, 3, 5, 1);
        let queue = collector.queue();
        assert_eq!(queue.queues.with_label_values(&["42"]).get(), 3);
        assert_eq!(queue.players_waiting.with_label_values(&["42"]).get(), 5);
        assert_eq!(queue.active_games.with_label_values(&["42"]).get(), 1);

        collector.remove_guild_gauges(42);
        let text = prometheus::TextEncoder::new()
            .encode_to_string(&collector.registry().gather())
            .unwrap();
        assert!(!text.contains("server=\"42\""));
    }

    #[test]
    fn test_failure_and_notification_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_collaborator_failure("storage", "insert_player");
        collector.record_notification("direct");
        collector.record_alert_suppressed();
        collector.record_operation("add", Duration::from_micros(50));
        collector.record_dispatch(3, Duration::from_millis(2));

        assert_eq!(
            collector
                .platform()
                .collaborator_failures_total
                .with_label_values(&["storage", "insert_player"])
                .get(),
            1
        );
        assert_eq!(collector.notification().alerts_suppressed_total.get(), 1);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2);
        collector.update_component_health("registry", true);
        collector.update_component_health("scheduler", false);
        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
