//! Service layer for Crosscast
//!
//! `CrosscastService` is the single entry point the binaries use. It owns
//! the shared resources (database, config, adapter registry, event bus) and
//! hands out the specialized sub-services:
//!
//! - `PostingService`: publish now, schedule, drafts, listing and deletion
//! - `ConnectionService`: integration records and the Facebook page picker
//! - `ScheduledPublisher`: one scheduler instance over the same publisher
//! - `EventBus`: progress events
//!
//! # Example
//!
//! ```no_run
//! use libcrosscast::service::CrosscastService;
//! use libcrosscast::{Platform, PublishRequest};
//!
//! # async fn example() -> libcrosscast::Result<()> {
//! let service = CrosscastService::new().await?;
//!
//! let request = PublishRequest {
//!     text: "Hello from every network at once".to_string(),
//!     platforms: vec![Platform::Twitter, Platform::Linkedin],
//!     ..Default::default()
//! };
//!
//! let report = service.posting().publish("user-1", &request).await?;
//! println!("Published to {} platforms", report.succeeded.len());
//! # Ok(())
//! # }
//! ```

pub mod connections;
pub mod events;
pub mod posting;

use std::sync::Arc;

use self::connections::ConnectionService;
use self::events::{EventBus, EventReceiver};
use self::posting::PostingService;
use crate::platforms::facebook::FacebookAdapter;
use crate::platforms::{http, AdapterRegistry};
use crate::publisher::Publisher;
use crate::scheduler::ScheduledPublisher;
use crate::{Config, Database, Result};

/// Main service facade coordinating all sub-services
///
/// All sub-services share the same `Arc<Database>` and `Arc<Config>`.
pub struct CrosscastService {
    db: Arc<Database>,
    config: Arc<Config>,
    publisher: Publisher,
    posting: PostingService,
    connections: ConnectionService,
    event_bus: EventBus,
}

impl CrosscastService {
    /// Load configuration from the default location and open the database
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build the service with the real platform adapters
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let registry = AdapterRegistry::from_config(&config)?;
        Self::from_parts(config, db, registry)
    }

    /// Build the service over an existing database and adapter set
    ///
    /// Tests use this to swap in mock adapters.
    pub fn from_parts(config: Config, db: Database, registry: AdapterRegistry) -> Result<Self> {
        let db = Arc::new(db);
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let event_bus = EventBus::new(100);

        let publisher = Publisher::from_config(Arc::clone(&db), Arc::clone(&registry), &config)
            .with_events(event_bus.clone());
        let posting = PostingService::new(Arc::clone(&db), publisher.clone());

        let facebook = FacebookAdapter::new(
            http::build_client(&config.http)?,
            &config.platforms.facebook,
        );
        let connections = ConnectionService::new(Arc::clone(&db), Arc::new(facebook));

        Ok(Self {
            db,
            config,
            publisher,
            posting,
            connections,
            event_bus,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    pub fn connections(&self) -> &ConnectionService {
        &self.connections
    }

    /// A scheduler instance over this service's publisher
    pub fn scheduler(&self) -> ScheduledPublisher {
        ScheduledPublisher::new(self.publisher.clone(), &self.config.scheduler)
    }

    /// Subscribe to publish progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}
