//! # Anchor Container
//!
//! Builds the adapters from configuration and wires them into the pipeline
//! and the feed dispatcher.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anchor_pipeline::adapters::{HttpAnchorError, HttpLedgerAnchor, InfluxSensorStore};
use anchor_pipeline::{
    AnchorPipeline, AnchorPipelineApi, LedgerAnchor, PipelineConfig, PipelineDependencies,
    SensorStore,
};
use shared_types::StoreError;
use thiserror::Error;
use tracing::info;

use crate::adapters::storage::{RocksChangeFeed, RocksDocumentStore};
use crate::adapters::MeteredLedger;
use crate::wiring::{DispatcherConfig, FeedDispatcher};

pub use config::{AnchorConfig, ConfigError};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("document store: {0}")]
    DocumentStore(#[source] StoreError),

    #[error("sensor store: {0}")]
    SensorStore(#[source] StoreError),

    #[error("ledger client: {0}")]
    Ledger(#[from] HttpAnchorError),
}

/// Everything a running instance owns.
pub struct AnchorContainer {
    pub documents: Arc<RocksDocumentStore>,
    pub pipeline: Arc<AnchorPipeline>,
    feed: Arc<RocksChangeFeed>,
    dispatcher_config: DispatcherConfig,
}

impl AnchorContainer {
    /// Open the document store and connect the external clients.
    pub fn open(config: &AnchorConfig) -> Result<Self, ContainerError> {
        let documents = Arc::new(
            RocksDocumentStore::open(config.rocksdb()).map_err(ContainerError::DocumentStore)?,
        );
        let sensors: Arc<dyn SensorStore> = Arc::new(
            InfluxSensorStore::new(config.influx()).map_err(ContainerError::SensorStore)?,
        );
        let ledger: Arc<dyn LedgerAnchor> = Arc::new(MeteredLedger::new(Arc::new(
            HttpLedgerAnchor::new(
                config.anchor.endpoint.clone(),
                Duration::from_secs(config.anchor.timeout_secs),
                config.anchor.encoding,
            )?,
        )));

        info!(
            documents = %config.document_store.path.display(),
            sensors = %config.sensor_store.url,
            ledger = %config.anchor.endpoint,
            "container wired"
        );

        Ok(Self::with_stores(
            documents,
            sensors,
            ledger,
            config,
        ))
    }

    /// Wire around already built stores.
    pub fn with_stores(
        documents: Arc<RocksDocumentStore>,
        sensors: Arc<dyn SensorStore>,
        ledger: Arc<dyn LedgerAnchor>,
        config: &AnchorConfig,
    ) -> Self {
        let deps = PipelineDependencies::new(documents.clone(), sensors, documents.clone(), ledger);
        let pipeline = Arc::new(AnchorPipeline::new(
            deps,
            PipelineConfig {
                anchor_retry: config.pipeline.retry_policy(),
            },
        ));
        let feed = Arc::new(RocksChangeFeed::new(
            documents.clone(),
            Duration::from_millis(config.document_store.poll_interval_ms),
        ));

        Self {
            documents,
            pipeline,
            feed,
            dispatcher_config: config.pipeline.dispatcher(),
        }
    }

    pub fn api(&self) -> Arc<dyn AnchorPipelineApi> {
        self.pipeline.clone()
    }

    pub fn dispatcher(&self) -> FeedDispatcher {
        FeedDispatcher::new(
            self.pipeline.clone(),
            self.feed.clone(),
            self.documents.clone(),
            self.dispatcher_config.clone(),
        )
    }
}
