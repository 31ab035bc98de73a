//! Process-wide registry of chat models
//!
//! Models are registered as factories and constructed lazily on first use.
//! Each model id owns a `tokio::sync::OnceCell`, so concurrent first callers
//! share a single construction. [`ModelRegistry::shutdown`] drops every built
//! instance; the next `get` builds a fresh one.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::llm::traits::{ChatModel, ModelError};

/// Builds a model instance. Called at most once per registry lifecycle.
pub type ModelFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ChatModel>, ModelError>> + Send + Sync>;

struct ModelSlot {
    factory: ModelFactory,
    instance: Arc<OnceCell<Arc<dyn ChatModel>>>,
}

/// Lazily-built chat models keyed by model id
#[derive(Default)]
pub struct ModelRegistry {
    slots: RwLock<HashMap<String, ModelSlot>>,
}

static GLOBAL: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process
    pub fn global() -> Arc<ModelRegistry> {
        GLOBAL.get_or_init(|| Arc::new(ModelRegistry::new())).clone()
    }

    /// Register a factory. Re-registering an id replaces its factory and
    /// discards any instance built by the previous one.
    pub fn register<F>(&self, model_id: impl Into<String>, factory: F)
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn ChatModel>, ModelError>> + Send + Sync + 'static,
    {
        let model_id = model_id.into();
        debug!(model = %model_id, "Registering chat model");
        self.slots.write().insert(
            model_id,
            ModelSlot {
                factory: Arc::new(factory),
                instance: Arc::new(OnceCell::new()),
            },
        );
    }

    /// Register an already-built model
    pub fn register_instance(&self, model_id: impl Into<String>, model: Arc<dyn ChatModel>) {
        self.register(model_id, move || {
            let model = model.clone();
            Box::pin(async move { Ok(model) })
        });
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.slots.read().contains_key(model_id)
    }

    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.slots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether the model has been built since registration or the last shutdown
    pub fn is_initialized(&self, model_id: &str) -> bool {
        self.slots
            .read()
            .get(model_id)
            .is_some_and(|slot| slot.instance.initialized())
    }

    /// Resolve a model, building it on first use.
    pub async fn get(&self, model_id: &str) -> Result<Arc<dyn ChatModel>, ModelError> {
        let (factory, instance) = {
            let slots = self.slots.read();
            let slot = slots
                .get(model_id)
                .ok_or_else(|| ModelError::NotRegistered(model_id.to_string()))?;
            (slot.factory.clone(), slot.instance.clone())
        };

        let model = instance
            .get_or_try_init(|| async {
                info!(model = %model_id, "Initializing chat model");
                factory().await.map_err(|e| match e {
                    ModelError::Initialization { .. } => e,
                    other => ModelError::Initialization {
                        model: model_id.to_string(),
                        error: other.to_string(),
                    },
                })
            })
            .await?;

        Ok(model.clone())
    }

    /// Drop every built instance. Runs holding a model keep their reference.
    pub fn shutdown(&self) {
        let mut slots = self.slots.write();
        for (model_id, slot) in slots.iter_mut() {
            if slot.instance.initialized() {
                debug!(model = %model_id, "Releasing chat model");
            }
            slot.instance = Arc::new(OnceCell::new());
        }
        info!("Model registry shut down");
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.model_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRequest;
    use crate::messages::AiMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, request: ChatRequest) -> Result<AiMessage, ModelError> {
            let text = request.messages.last().map(|m| m.text()).unwrap_or_default();
            Ok(AiMessage::new(text))
        }
    }

    fn counting_registry(builds: Arc<AtomicUsize>) -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register("echo", move || {
            let builds = builds.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(EchoModel) as Arc<dyn ChatModel>)
            })
        });
        registry
    }

    #[tokio::test]
    async fn test_concurrent_first_use_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(counting_registry(builds.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get("echo").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(registry.is_initialized("echo"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_instances() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(builds.clone());

        let held = registry.get("echo").await.unwrap();
        registry.shutdown();
        assert!(!registry.is_initialized("echo"));

        // a held model stays usable
        let reply = held.invoke(ChatRequest::default()).await.unwrap();
        assert_eq!(reply.content, "");

        registry.get("echo").await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let registry = ModelRegistry::new();
        let err = registry.get("missing").await.err().unwrap();
        assert!(matches!(err, ModelError::NotRegistered(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_failed_factory_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let registry = ModelRegistry::new();
        let counter = attempts.clone();
        registry.register("flaky", move || {
            let counter = counter.clone();
            Box::pin(async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ModelError::Unavailable("cold start".into()))
                } else {
                    Ok(Arc::new(EchoModel) as Arc<dyn ChatModel>)
                }
            })
        });

        let err = registry.get("flaky").await.err().unwrap();
        assert!(matches!(err, ModelError::Initialization { .. }));
        assert!(registry.get("flaky").await.is_ok());
    }
}
