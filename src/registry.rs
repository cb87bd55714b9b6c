//! Topic to session multiplexing.
//!
//! The [`SessionRegistry`] owns every live [`Session`] of one worker. It
//! creates a session the first time a topic is seen, routes each tick to it,
//! and every `flush_interval_ticks` routed ticks saves all sessions and evicts
//! those that have been idle for longer than the maximum session age.
//!
//! Repository failures never escape [`SessionRegistry::notify`]: they are
//! logged with the topic context and counted in [`RegistryStats`], and the
//! tick is treated as processed. A topic whose session could not be created
//! stays unregistered, so its next tick tries again.
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use pitcrew::{InMemoryRepository, PitcrewConfig, SessionRegistry, Telemetry};
//!
//! let repository = Arc::new(InMemoryRepository::new());
//! let mut registry = SessionRegistry::new(repository, PitcrewConfig::default());
//!
//! let telemetry = Telemetry::new().with("DistanceRoundTrack", 12.0);
//! registry.notify("b4mad/alice/1001/iRacing/spa/gt3/Race", &telemetry, Utc::now());
//! registry.notify("not-a-topic", &telemetry, Utc::now());
//!
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.stats().dropped_topics, 1);
//! registry.on_stop();
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use crate::PitcrewError;
use crate::config::PitcrewConfig;
use crate::landmarks::LandmarkCatalog;
use crate::repository::Repository;
use crate::session::Session;
use crate::types::{Telemetry, Tick, Topic};

/// Counters describing what a registry has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Ticks delivered to a session
    pub ticks_routed: u64,
    /// Ticks dropped because their topic did not parse
    pub dropped_topics: u64,
    /// Ticks dropped by the announcement policy
    pub ignored_announcements: u64,
    pub sessions_created: u64,
    /// Topics whose session could not be created
    pub sessions_rejected: u64,
    pub flushes: u64,
    pub evictions: u64,
    pub repository_errors: u64,
}

/// Per-worker map of topic to session.
pub struct SessionRegistry {
    repository: Arc<dyn Repository>,
    catalog: Arc<LandmarkCatalog>,
    config: PitcrewConfig,
    sessions: HashMap<String, Session>,
    flush_interval: u64,
    ticks_since_flush: u64,
    last_tick: Option<DateTime<Utc>>,
    stats: RegistryStats,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("flush_interval", &self.flush_interval)
            .field("ticks_since_flush", &self.ticks_since_flush)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SessionRegistry {
    /// Create a registry with its own landmark catalog.
    pub fn new(repository: Arc<dyn Repository>, config: PitcrewConfig) -> Self {
        Self::with_catalog(repository, Arc::new(LandmarkCatalog::new()), config)
    }

    /// Create a registry sharing a landmark catalog with other workers.
    pub fn with_catalog(
        repository: Arc<dyn Repository>,
        catalog: Arc<LandmarkCatalog>,
        config: PitcrewConfig,
    ) -> Self {
        let flush_interval = config.registry.flush_interval_ticks();
        debug!(
            flush_interval,
            max_session_age_secs = config.registry.max_session_age_secs,
            "Created session registry"
        );
        Self {
            repository,
            catalog,
            config,
            sessions: HashMap::new(),
            flush_interval,
            ticks_since_flush: 0,
            last_tick: None,
            stats: RegistryStats::default(),
        }
    }

    /// Route one tick.
    pub fn notify(&mut self, topic: &str, telemetry: &Telemetry, now: DateTime<Utc>) {
        self.last_tick = Some(now);

        if !self.sessions.contains_key(topic) && !self.register(topic, telemetry, now) {
            return;
        }

        if let Some(session) = self.sessions.get_mut(topic) {
            if let Err(e) = session.signal(telemetry, now, self.repository.as_ref()) {
                self.stats.repository_errors += 1;
                log_repository_error(session.topic(), &e, "Error analysing tick");
            }
            self.stats.ticks_routed += 1;
        }

        self.flush(now, false);
    }

    pub fn notify_tick(&mut self, tick: &Tick) {
        self.notify(&tick.topic, &tick.telemetry, tick.time);
    }

    /// Create the session for an unseen topic.
    ///
    /// Returns false if the tick must be dropped without counting. A failed
    /// creation still counts the tick as processed.
    fn register(&mut self, topic: &str, telemetry: &Telemetry, now: DateTime<Utc>) -> bool {
        let parsed: Topic = match topic.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.dropped_topics += 1;
                trace!(topic, error = %e, "Dropping tick");
                return false;
            }
        };

        if self.config.registry.ignores_session_type(&parsed.session_type) {
            self.stats.ignored_announcements += 1;
            info!(topic, "Ignoring session announcement");
            return false;
        }

        match Session::create(
            parsed.clone(),
            telemetry,
            now,
            self.repository.as_ref(),
            &self.catalog,
            &self.config,
        ) {
            Ok(session) => {
                self.stats.sessions_created += 1;
                info!(
                    topic,
                    session = %session.record().id,
                    strategy = %session.strategy(),
                    "New session"
                );
                self.sessions.insert(topic.to_string(), session);
            }
            Err(e) => {
                self.stats.sessions_rejected += 1;
                self.stats.repository_errors += 1;
                log_repository_error(&parsed, &e, "Error creating session");
            }
        }
        true
    }

    /// Save every session and evict idle ones.
    ///
    /// Without `force` this only counts the tick and flushes once every
    /// `flush_interval_ticks` calls. Returns whether a flush happened.
    pub fn flush(&mut self, now: DateTime<Utc>, force: bool) -> bool {
        if !force {
            self.ticks_since_flush += 1;
            if self.ticks_since_flush < self.flush_interval {
                return false;
            }
        }
        self.ticks_since_flush = 0;
        self.stats.flushes += 1;

        let repository = self.repository.as_ref();
        let mut saved = 0usize;
        for session in self.sessions.values_mut() {
            match session.save_analysis(repository) {
                Ok(()) => saved += 1,
                Err(e) => {
                    self.stats.repository_errors += 1;
                    log_repository_error(session.topic(), &e, "Error saving session");
                }
            }
        }
        debug!(sessions = self.sessions.len(), saved, force, "Flushed sessions");

        self.evict(now);
        true
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let max_age = self.config.registry.max_session_age();
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| now - session.last_seen() > max_age)
            .map(|(topic, _)| topic.clone())
            .collect();
        if idle.is_empty() {
            return;
        }

        for topic in &idle {
            let Some(mut session) = self.sessions.remove(topic) else {
                continue;
            };
            if let Err(e) = session.save_analysis(self.repository.as_ref()) {
                self.stats.repository_errors += 1;
                log_repository_error(session.topic(), &e, "Error saving evicted session");
            }
            debug!(topic = %topic, last_seen = %session.last_seen(), "Evicted idle session");
            self.stats.evictions += 1;
        }
        debug!(evicted = idle.len(), remaining = self.sessions.len(), "Inactive sessions removed");
    }

    /// Drain hook: force a full flush.
    ///
    /// The flush is timed at the last tick seen, so idle ages stay on the
    /// stream's clock; a registry that never saw a tick uses the wall clock.
    pub fn on_stop(&mut self) {
        let now = self.last_tick.unwrap_or_else(Utc::now);
        debug!(sessions = self.sessions.len(), "Registry stopping");
        self.flush(now, true);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.sessions.contains_key(topic)
    }

    pub fn session(&self, topic: &str) -> Option<&Session> {
        self.sessions.get(topic)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    pub fn config(&self) -> &PitcrewConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn ticks_since_flush(&self) -> u64 {
        self.ticks_since_flush
    }
}

fn log_repository_error(topic: &Topic, error: &PitcrewError, message: &str) {
    error!(
        topic = %topic,
        driver = %topic.driver,
        session_id = %topic.session_id,
        game = %topic.game,
        track = %topic.track,
        car = %topic.car,
        session_type = %topic.session_type,
        error = %error,
        retryable = error.is_retryable(),
        "{}",
        message
    );
}
