use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{error, warn};

use ingest_common::health::{HealthHandle, HealthRegistry};
use ingest_common::kafka::{KafkaConfig, SingleTopicConsumer};
use ingest_common::metrics::{serve, setup_metrics_router};
use ingest_common::record::{FeedArticle, MicroPost, Record, SocialPost};
use ingest_common::store::{DocumentStore, PgDocumentStore};
use ingest_pipeline::dedup::DedupFilter;

use config::Config;
use extractor::HttpExtractor;
use pipelines::PipelineSettings;

mod config;
mod extractor;
mod pipelines;

#[derive(Debug, Clone, Copy)]
enum Source {
    Feed,
    Social,
    Micro,
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" | "rss" => Ok(Source::Feed),
            "social" | "reddit" => Ok(Source::Social),
            "micro" | "twitter" => Ok(Source::Micro),
            invalid => Err(invalid.to_owned()),
        }
    }
}

impl Source {
    fn default_topic(&self) -> &'static str {
        match self {
            Source::Feed => "rss",
            Source::Social => "reddit",
            Source::Micro => "twitter",
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            Source::Feed => pipelines::FEED_COLLECTION,
            Source::Social => pipelines::SOCIAL_COLLECTION,
            Source::Micro => pipelines::MICRO_COLLECTION,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");
    let source = Source::from_str(&config.source)
        .unwrap_or_else(|invalid| panic!("invalid source: {}", invalid));

    let store = PgDocumentStore::new(&config.database_url, config.max_pg_connections)
        .await
        .expect("failed to connect to the document store");
    store
        .ensure_collection(source.collection())
        .await
        .expect("failed to ensure the target collection");
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let liveness = HealthRegistry::new("liveness");
    let bind = config.bind();
    let router = setup_metrics_router(&liveness);
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    let dedup = DedupFilter::new(store.clone(), source.collection());
    if let Err(err) = dedup.refresh().await {
        warn!(
            "initial dedup refresh failed, starting with an empty snapshot: {}",
            err
        );
    }
    let refresh_interval = config.dedup_refresh_interval.0;
    let refresher_liveness = liveness
        .register(
            "dedup_refresher".to_string(),
            chrono::Duration::from_std(refresh_interval * 2).expect("refresh interval out of range"),
        )
        .await;
    let refresher = dedup.spawn_refresher(refresh_interval, Some(refresher_liveness));

    let consumer = SingleTopicConsumer::new(&KafkaConfig {
        hosts: config.kafka_hosts.clone(),
        topic: if config.kafka_topic.is_empty() {
            source.default_topic().to_owned()
        } else {
            config.kafka_topic.clone()
        },
        consumer_group: config.kafka_consumer_group.clone(),
        offset_reset: config.kafka_offset_reset.clone(),
        tls: config.kafka_tls,
    })
    .expect("failed to create kafka consumer");
    let consumer_liveness = liveness
        .register("kafka_consumer".to_string(), chrono::Duration::minutes(5))
        .await;

    let settings = PipelineSettings {
        stage_width: config.stage_width,
        channel_capacity: config.channel_capacity,
    };

    match source {
        Source::Feed => {
            let extractor = Arc::new(
                HttpExtractor::new(config.extract_timeout.0)
                    .expect("failed to build the extraction client"),
            );
            let (entry, handle) = pipelines::feed_pipeline(store, dedup, extractor, &settings)
                .expect("failed to build the feed pipeline");
            drive::<FeedArticle>(consumer, entry, consumer_liveness).await;
            handle.join().await;
        }
        Source::Social => {
            let (entry, handle) = pipelines::social_pipeline(store, dedup, &settings)
                .expect("failed to build the social pipeline");
            drive::<SocialPost>(consumer, entry, consumer_liveness).await;
            handle.join().await;
        }
        Source::Micro => {
            let (entry, handle) = pipelines::micro_pipeline(store, dedup, &settings)
                .expect("failed to build the micro pipeline");
            drive::<MicroPost>(consumer, entry, consumer_liveness).await;
            handle.join().await;
        }
    }

    refresher.abort();
}

/// Bridge the broker subscription into the graph's entry channel. Bad
/// payloads are logged and skipped, they never stall the partition.
async fn drive<R>(consumer: SingleTopicConsumer, entry: mpsc::Sender<R>, liveness: HealthHandle)
where
    R: Record + DeserializeOwned,
{
    loop {
        match tokio::time::timeout(Duration::from_secs(60), consumer.json_recv::<R>()).await {
            Ok(Ok(record)) => {
                if entry.send(record).await.is_err() {
                    error!("pipeline entry closed, stopping consumption");
                    break;
                }
            }
            Ok(Err(err)) => {
                warn!("failed to read record from {}: {}", consumer.topic(), err);
            }
            Err(_elapsed) => {} // idle topic, report liveness and keep polling
        }
        liveness.report_healthy().await;
    }
}
