//! Maritime AIOps Pipeline Main Binary
//!
//! Orchestrates every stage of the pipeline over the message bus (spec §5):
//! - Anomaly Detector: scores `logs.raw`/`metrics.raw` into `anomaly.detected`
//! - Enricher: joins `anomaly.detected` with historical context
//! - Correlator: windows and deduplicates into `incidents.created`
//! - Incident Enricher: attaches AI root-cause/remediation text
//! - Incident Persistor: upserts the enriched incident and its timeline
//!
//! Generalized from `sentinel`'s `Sentinel` orchestrator: the same
//! CLI-then-config-then-component-wiring shape, the same
//! `tokio::select!`-against-a-signal-future shutdown, reworked for five
//! bus-driven consumer loops instead of one Kafka ingestion loop plus an API
//! server.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use naas_bus::{subjects, BusPublisher, RabbitMqBusClient, RabbitMqConfig};
use naas_core::config::Config;
use naas_core::events::{AnomalyDetected, AnomalyEnriched, IncidentCreated, RawIngestRecord};
use naas_core::logging::{self, LogFormat};
use naas_correlation::Correlator;
use naas_detection::detectors::DetectionConfig;
use naas_detection::service::AnomalyDetector;
use naas_enrichment::service::Enricher;
use naas_llm::{IncidentEnricher, OllamaClient, OllamaConfig, VectorStoreClient, VectorStoreConfig as LlmVectorStoreConfig};
use naas_persistence::IncidentPersistor;
use naas_registry::{RegistryClient, RegistryClientConfig};
use naas_storage::influxdb::{InfluxColumnarStore, InfluxConfig};
use naas_storage::ColumnarStore;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// CLI arguments. Configuration itself is env-only (spec's Non-goals exclude
/// YAML loading); these flags only override the logging knobs `Config`
/// already carries, and gate a dry run.
#[derive(Debug, Parser)]
#[clap(name = "naas-pipeline", version, about = "Maritime AIOps anomaly-to-incident pipeline")]
struct Cli {
    /// Override `NAAS_OBSERVABILITY__LOG_LEVEL`.
    #[clap(long, env = "NAAS_CLI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Override `NAAS_OBSERVABILITY__LOG_FORMAT` (`json` or `text`).
    #[clap(long, env = "NAAS_CLI_LOG_FORMAT")]
    log_format: Option<String>,

    /// Load and validate configuration, then exit without starting anything.
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(
        cli.log_level.as_deref().unwrap_or("info"),
        cli.log_format
            .as_deref()
            .unwrap_or("text")
            .parse()
            .unwrap_or(LogFormat::Text),
    ) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    info!("starting naas-pipeline v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline exited with error");
            match e.downcast_ref::<naas_core::Error>() {
                Some(err) if err.is_fatal() => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    config
        .validate_config()
        .context("configuration failed validation")?;
    info!("configuration loaded and validated");

    if cli.dry_run {
        info!("dry run mode, configuration validated, exiting");
        return Ok(());
    }

    let pipeline = Pipeline::new(config).await.context("failed to initialize pipeline")?;
    pipeline.run().await
}

/// Every wired component, shared across the five consumer loops.
struct Pipeline {
    bus: Arc<RabbitMqBusClient>,
    detector: Arc<AnomalyDetector>,
    enricher: Arc<Enricher>,
    correlator: Arc<Correlator>,
    incident_enricher: Arc<IncidentEnricher>,
    persistor: Arc<IncidentPersistor>,
    sweep_interval: Duration,
}

impl Pipeline {
    async fn new(config: Config) -> Result<Self> {
        info!("connecting to message bus...");
        let bus = RabbitMqBusClient::new(RabbitMqConfig {
            url: config.bus.url.clone(),
            exchange: config.bus.exchange.clone(),
            max_attempts: config.bus.max_publish_attempts,
            initial_delay_ms: config.bus.retry_initial_delay_ms,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        })
        .await
        .context("failed to connect to bus")?;
        let bus = Arc::new(bus);
        info!("bus connected");

        info!("connecting to columnar store...");
        let store: Arc<dyn ColumnarStore> = Arc::new(
            InfluxColumnarStore::new(InfluxConfig {
                url: config.storage.url.clone(),
                org: config.storage.org.clone(),
                bucket: config.storage.bucket.clone(),
                token: config.storage.token.clone(),
                query_timeout_secs: config.storage.query_timeout_secs,
            })
            .await
            .context("failed to connect to columnar store")?,
        );
        info!("columnar store connected");

        let registry = Arc::new(
            RegistryClient::new(RegistryClientConfig {
                url: config.registry.url.clone(),
                timeout_secs: config.registry.timeout_secs,
                cache_capacity: config.registry.cache_capacity,
                cache_ttl_secs: config.registry.cache_ttl_secs,
            })
            .context("failed to build registry client")?,
        );

        let detector = Arc::new(AnomalyDetector::new(registry, DetectionConfig::default()));
        let enricher = Arc::new(Enricher::new(store.clone()));
        let correlator = Arc::new(Correlator::new(&config.correlation, bus.clone()));

        let llm = OllamaClient::new(OllamaConfig {
            url: config.llm.url.clone(),
            model: config.llm.model.clone(),
            call_timeout_secs: config.llm.call_timeout_secs,
        })
        .context("failed to build LLM client")?;

        let vector_store = VectorStoreClient::new(LlmVectorStoreConfig {
            url: config.vector_store.url.clone(),
            collection: config.vector_store.collection.clone(),
            dimensions: config.vector_store.dimensions,
            search_limit: config.vector_store.search_limit,
        })
        .context("failed to build vector store client")?;
        vector_store
            .ensure_collection()
            .await
            .context("failed to ensure vector store collection")?;

        let incident_enricher = Arc::new(IncidentEnricher::new(
            store.clone(),
            llm,
            vector_store,
            config.correlation.enrichment_budget_secs,
            config.storage.llm_cache_ttl_hours,
        ));

        let persistor = Arc::new(IncidentPersistor::new(store));

        info!("all components initialized");

        Ok(Self {
            bus,
            detector,
            enricher,
            correlator,
            incident_enricher,
            persistor,
            sweep_interval: Duration::from_secs(config.correlation.sweep_interval_secs),
        })
    }

    /// Run every consumer loop concurrently until a shutdown signal arrives,
    /// then allow up to 30s for in-flight work to drain (spec §5).
    async fn run(self) -> Result<()> {
        let shutdown = Arc::new(Notify::new());
        let this = Arc::new(self);

        let mut tasks = Vec::new();
        for subject in [subjects::LOGS_RAW, subjects::METRICS_RAW] {
            tasks.push(tokio::spawn(detect_loop(this.clone(), subject, shutdown.clone())));
        }
        tasks.push(tokio::spawn(enrich_loop(this.clone(), shutdown.clone())));
        tasks.push(tokio::spawn(correlate_loop(this.clone(), shutdown.clone())));
        tasks.push(tokio::spawn(incident_loop(this.clone(), shutdown.clone())));
        tasks.push(tokio::spawn(sweep_loop(this.clone(), shutdown.clone())));

        info!("pipeline running, consuming from the bus...");
        wait_for_shutdown().await;
        info!("shutdown signal received, notifying workers");
        shutdown.notify_waiters();

        let drain = futures::future::join_all(tasks);
        match tokio::time::timeout(Duration::from_secs(30), drain).await {
            Ok(_) => info!("all workers drained cleanly"),
            Err(_) => warn!("30s drain window elapsed, exiting with workers still winding down"),
        }

        info!("naas-pipeline stopped");
        Ok(())
    }
}

/// Consume `logs.raw`/`metrics.raw`, run the Anomaly Detector, publish
/// `anomaly.detected` (spec §4.1).
async fn detect_loop(pipeline: Arc<Pipeline>, subject: &'static str, shutdown: Arc<Notify>) {
    let mut consumer = match pipeline.bus.subscribe(subject, "naas-detector").await {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(subject, error = %e, "failed to subscribe, detector loop exiting");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(subject, "detector loop stopping");
                return;
            }
            item = consumer.next() => {
                let Some(delivery) = item else {
                    warn!(subject, "consumer stream ended, detector loop exiting");
                    return;
                };
                let Ok(delivery) = delivery else {
                    error!(subject, "failed to receive delivery");
                    continue;
                };

                let record: Result<RawIngestRecord, _> = serde_json::from_slice(&delivery.data);
                match record {
                    Ok(record) => {
                        match pipeline.detector.process(record).await {
                            Ok(Some(anomaly)) => publish_and_ack(&pipeline.bus, &delivery, subjects::ANOMALY_DETECTED, &anomaly).await,
                            Ok(None) => ack(&delivery).await,
                            Err(e) if e.is_dead_letter() => {
                                deadletter(&pipeline.bus, subject, &e.to_string(), &delivery.data).await;
                                ack(&delivery).await;
                            }
                            Err(e) => {
                                error!(subject, error = %e, "detector processing failed");
                                metrics::counter!(naas_core::metrics::counters::ERRORS_TOTAL).increment(1);
                                nack(&delivery).await;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(subject, error = %e, "malformed ingest record, dropping");
                        metrics::counter!(naas_core::metrics::counters::RECORDS_DROPPED_TOTAL).increment(1);
                        ack(&delivery).await;
                    }
                }
            }
        }
    }
}

/// Consume `anomaly.detected`, run the Enricher, publish `anomaly.enriched`
/// (spec §4.2).
async fn enrich_loop(pipeline: Arc<Pipeline>, shutdown: Arc<Notify>) {
    let subject = subjects::ANOMALY_DETECTED;
    let mut consumer = match pipeline.bus.subscribe(subject, "naas-enricher").await {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(subject, error = %e, "failed to subscribe, enrich loop exiting");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(subject, "enrich loop stopping");
                return;
            }
            item = consumer.next() => {
                let Some(delivery) = item else {
                    warn!(subject, "consumer stream ended, enrich loop exiting");
                    return;
                };
                let Ok(delivery) = delivery else {
                    error!(subject, "failed to receive delivery");
                    continue;
                };

                match serde_json::from_slice::<AnomalyDetected>(&delivery.data) {
                    Ok(anomaly) => {
                        let enriched = pipeline.enricher.enrich(anomaly).await;
                        publish_and_ack(&pipeline.bus, &delivery, subjects::ANOMALY_ENRICHED, &enriched).await;
                    }
                    Err(e) => {
                        warn!(subject, error = %e, "malformed anomaly, dropping");
                        metrics::counter!(naas_core::metrics::counters::RECORDS_DROPPED_TOTAL).increment(1);
                        ack(&delivery).await;
                    }
                }
            }
        }
    }
}

/// Consume `anomaly.enriched`, run the Correlator. `incidents.created` is
/// published by the Correlator itself on fire (spec §4.3).
async fn correlate_loop(pipeline: Arc<Pipeline>, shutdown: Arc<Notify>) {
    let subject = subjects::ANOMALY_ENRICHED;
    let mut consumer = match pipeline.bus.subscribe(subject, "naas-correlator").await {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(subject, error = %e, "failed to subscribe, correlate loop exiting");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(subject, "correlate loop stopping");
                return;
            }
            item = consumer.next() => {
                let Some(delivery) = item else {
                    warn!(subject, "consumer stream ended, correlate loop exiting");
                    return;
                };
                let Ok(delivery) = delivery else {
                    error!(subject, "failed to receive delivery");
                    continue;
                };

                match serde_json::from_slice::<AnomalyEnriched>(&delivery.data) {
                    Ok(anomaly) => {
                        if let Err(e) = pipeline.correlator.process(anomaly).await {
                            warn!(subject, error = %e, "correlator rejected anomaly");
                        }
                        ack(&delivery).await;
                    }
                    Err(e) => {
                        warn!(subject, error = %e, "malformed enriched anomaly, dropping");
                        metrics::counter!(naas_core::metrics::counters::RECORDS_DROPPED_TOTAL).increment(1);
                        ack(&delivery).await;
                    }
                }
            }
        }
    }
}

/// Consume `incidents.created`, run the Incident Enricher then the Incident
/// Persistor, publish `incidents.enriched` (spec §4.4, §4.5).
async fn incident_loop(pipeline: Arc<Pipeline>, shutdown: Arc<Notify>) {
    let subject = subjects::INCIDENTS_CREATED;
    let mut consumer = match pipeline.bus.subscribe(subject, "naas-incident-enricher").await {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(subject, error = %e, "failed to subscribe, incident loop exiting");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(subject, "incident loop stopping");
                return;
            }
            item = consumer.next() => {
                let Some(delivery) = item else {
                    warn!(subject, "consumer stream ended, incident loop exiting");
                    return;
                };
                let Ok(delivery) = delivery else {
                    error!(subject, "failed to receive delivery");
                    continue;
                };

                match serde_json::from_slice::<IncidentCreated>(&delivery.data) {
                    Ok(incident) => {
                        let enriched = pipeline.incident_enricher.enrich(incident).await;
                        if let Err(e) = pipeline.persistor.persist(enriched.clone(), "created").await {
                            error!(subject, error = %e, "failed to persist enriched incident");
                            metrics::counter!(naas_core::metrics::counters::ERRORS_TOTAL).increment(1);
                        }
                        publish_and_ack(&pipeline.bus, &delivery, subjects::INCIDENTS_ENRICHED, &enriched).await;
                    }
                    Err(e) => {
                        warn!(subject, error = %e, "malformed incident, dropping");
                        metrics::counter!(naas_core::metrics::counters::RECORDS_DROPPED_TOTAL).increment(1);
                        ack(&delivery).await;
                    }
                }
            }
        }
    }
}

/// Periodically sweep expired correlation windows and stale dedup entries
/// (spec §4.3, default interval from `CorrelationConfig::sweep_interval_secs`).
async fn sweep_loop(pipeline: Arc<Pipeline>, shutdown: Arc<Notify>) {
    let mut interval = tokio::time::interval(pipeline.sweep_interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("sweep loop stopping");
                return;
            }
            _ = interval.tick() => {
                pipeline.correlator.sweep();
            }
        }
    }
}

async fn publish_and_ack(
    bus: &RabbitMqBusClient,
    delivery: &lapin::message::Delivery,
    subject: &str,
    value: &impl serde::Serialize,
) {
    match serde_json::to_vec(value) {
        Ok(payload) => {
            if let Err(e) = bus.publish(subject, &payload).await {
                error!(subject, error = %e, "failed to publish downstream event");
                nack(delivery).await;
                return;
            }
            ack(delivery).await;
        }
        Err(e) => {
            error!(subject, error = %e, "failed to serialize downstream event");
            nack(delivery).await;
        }
    }
}

async fn deadletter(bus: &RabbitMqBusClient, subject: &str, reason: &str, payload: &[u8]) {
    let original = serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);
    if let Err(e) = bus.publish_deadletter(subject, reason, original).await {
        error!(subject, error = %e, "failed to publish deadletter record");
    }
    metrics::counter!(naas_core::metrics::counters::RECORDS_DEADLETTERED_TOTAL).increment(1);
}

async fn ack(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        warn!(error = %e, "failed to ack delivery");
    }
}

async fn nack(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery
        .nack(BasicNackOptions {
            requeue: false,
            ..Default::default()
        })
        .await
    {
        warn!(error = %e, "failed to nack delivery");
    }
}

/// Wait for CTRL+C or SIGTERM (spec §5).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received CTRL+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
