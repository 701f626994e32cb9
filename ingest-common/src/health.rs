use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::warn;

/// Liveness reporting for the long-running loops of the process (the Kafka
/// poll loops and the dedup refresher). Each loop registers with a deadline
/// and must report healthy more often than that; a loop that stops
/// reporting flips the aggregate status and the probe fails.
#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<HealthMessage>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered.
    Starting,
    /// Recently reported healthy, will need to report again before the date.
    HealthyUntil(DateTime<Utc>),
    /// Automatically computed when the HealthyUntil deadline is reached.
    Stalled,
}

struct HealthMessage {
    component: String,
    status: ComponentStatus,
}

pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthHandle {
    /// Report healthy. Must be called more frequently than the registered deadline.
    pub async fn report_healthy(&self) {
        let message = HealthMessage {
            component: self.component.clone(),
            status: ComponentStatus::HealthyUntil(Utc::now() + self.deadline),
        };
        if let Err(err) = self.sender.send(message).await {
            warn!("failed to report health status: {}", err);
        }
    }
}

#[derive(Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        let (sender, mut receiver) = mpsc::channel::<HealthMessage>(16);
        let components: Arc<RwLock<HashMap<String, ComponentStatus>>> = Default::default();

        let writer = components.clone();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let Ok(mut map) = writer.write() {
                    map.insert(message.component, message.status);
                }
            }
        });

        Self {
            name: name.to_owned(),
            components,
            sender,
        }
    }

    pub async fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.clone(),
            deadline,
            sender: self.sender.clone(),
        };
        if let Ok(mut map) = self.components.write() {
            map.insert(component, ComponentStatus::Starting);
        }
        handle
    }

    pub fn get_status(&self) -> HealthStatus {
        let now = Utc::now();
        let components = self
            .components
            .read()
            .map(|map| map.clone())
            .unwrap_or_default();

        let mut healthy = !components.is_empty();
        let components = components
            .into_iter()
            .map(|(name, status)| match status {
                ComponentStatus::HealthyUntil(until) if until <= now => {
                    warn!("{} component {} is stalled", self.name, name);
                    healthy = false;
                    (name, ComponentStatus::Stalled)
                }
                ComponentStatus::HealthyUntil(_) => (name, status),
                other => {
                    healthy = false;
                    (name, other)
                }
            })
            .collect();

        HealthStatus {
            healthy,
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starting_component_is_not_healthy() {
        let registry = HealthRegistry::new("liveness");
        let _handle = registry
            .register("consumer".to_string(), Duration::seconds(30))
            .await;

        assert!(!registry.get_status().healthy);
    }

    #[tokio::test]
    async fn test_reported_component_is_healthy_until_deadline() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry
            .register("consumer".to_string(), Duration::seconds(30))
            .await;

        handle.report_healthy().await;
        // The registry writer task consumes the report asynchronously.
        for _ in 0..50 {
            if registry.get_status().healthy {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("registry never became healthy");
    }

    #[tokio::test]
    async fn test_stalled_component_fails_the_probe() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry
            .register("refresher".to_string(), Duration::seconds(-1))
            .await;

        handle.report_healthy().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!registry.get_status().healthy);
    }
}
