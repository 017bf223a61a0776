// Resolves, per runtime image, which worker implementation executes a step.
// Instances are cached; unmapped images fall back to a shared default
// subprocess worker. External implementations register through a
// compile-time constructor registry keyed by name - an unknown key is a
// configuration error, never a resolution failure.

use crate::worker::{ContainerWorker, StepWorker, SubprocessWorker};
use dashmap::DashMap;
use flowbench_common::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Which implementation a mapping selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum WorkerKind {
    Subprocess,
    Container,
    /// A registered external implementation, looked up by registry key.
    Registered(String),
}

/// One configured image → worker mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    #[serde(flatten)]
    pub kind: WorkerKind,
    /// Constructor arguments for the selected implementation.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// Constructor for a registered external worker implementation.
pub type WorkerConstructor = Arc<dyn Fn(&WorkerSpec) -> Arc<dyn StepWorker> + Send + Sync>;

/// Resolves and caches step workers per runtime image.
pub struct WorkerFactory {
    mappings: HashMap<String, WorkerSpec>,
    registry: HashMap<String, WorkerConstructor>,
    cache: DashMap<String, Arc<dyn StepWorker>>,
    default_worker: Arc<dyn StepWorker>,
    container_binary: String,
}

impl WorkerFactory {
    /// Create a factory with the given image mappings. `container_binary`
    /// is handed to built-in container workers.
    pub fn new(mappings: HashMap<String, WorkerSpec>, container_binary: impl Into<String>) -> Self {
        Self {
            mappings,
            registry: HashMap::new(),
            cache: DashMap::new(),
            default_worker: Arc::new(SubprocessWorker::new()),
            container_binary: container_binary.into(),
        }
    }

    /// Register a constructor for an external worker implementation.
    pub fn register(&mut self, key: impl Into<String>, constructor: WorkerConstructor) {
        self.registry.insert(key.into(), constructor);
    }

    /// Check every mapping against the registry. Returns the first mapping
    /// naming an implementation no constructor provides.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (image, spec) in &self.mappings {
            if let WorkerKind::Registered(key) = &spec.kind {
                if !self.registry.contains_key(key) {
                    return Err(EngineError::UnknownWorkerImplementation {
                        image: image.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve the worker for a runtime image. Never fails: unmapped images
    /// and unvalidated registry keys resolve to the shared default
    /// subprocess worker. Mapped instances are created once and cached.
    pub fn resolve(&self, image: &str) -> Arc<dyn StepWorker> {
        if let Some(cached) = self.cache.get(image) {
            return cached.value().clone();
        }

        let spec = match self.mappings.get(image) {
            Some(spec) => spec,
            None => return self.default_worker.clone(),
        };

        let worker: Arc<dyn StepWorker> = match &spec.kind {
            WorkerKind::Subprocess => Arc::new(SubprocessWorker::new()),
            WorkerKind::Container => {
                let binary = spec
                    .args
                    .get("binary")
                    .cloned()
                    .unwrap_or_else(|| self.container_binary.clone());
                Arc::new(ContainerWorker::with_binary(binary))
            }
            WorkerKind::Registered(key) => match self.registry.get(key) {
                Some(constructor) => constructor(spec),
                None => {
                    tracing::warn!(
                        "No constructor registered for worker implementation '{}' \
                         (image '{}'), using default subprocess worker",
                        key,
                        image
                    );
                    return self.default_worker.clone();
                }
            },
        };

        self.cache.insert(image.to_string(), worker.clone());
        worker
    }

    /// The shared default worker used for unmapped images.
    pub fn default_worker(&self) -> Arc<dyn StepWorker> {
        self.default_worker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ExecResult;
    use async_trait::async_trait;
    use flowbench_common::ExecutedStep;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    struct MarkerWorker;

    #[async_trait]
    impl StepWorker for MarkerWorker {
        async fn run(
            &self,
            _step: &ExecutedStep,
            _work_dir: &Path,
            _cancel: CancellationToken,
        ) -> ExecResult {
            ExecResult {
                exit_code: 42,
                ..Default::default()
            }
        }
    }

    fn container_mapping(image: &str) -> HashMap<String, WorkerSpec> {
        let mut mappings = HashMap::new();
        mappings.insert(
            image.to_string(),
            WorkerSpec {
                kind: WorkerKind::Container,
                args: BTreeMap::new(),
            },
        );
        mappings
    }

    #[test]
    fn mapped_image_resolves_to_declared_worker_and_caches() {
        let factory = WorkerFactory::new(container_mapping("img-a"), "docker");

        let first = factory.resolve("img-a");
        let second = factory.resolve("img-a");
        // Cached lookup returns the same instance.
        assert!(Arc::ptr_eq(&first, &second));
        // The container worker is not the shared subprocess default.
        assert!(!Arc::ptr_eq(&first, &factory.default_worker()));
    }

    #[test]
    fn unmapped_image_resolves_to_shared_default() {
        let factory = WorkerFactory::new(container_mapping("img-a"), "docker");

        let first = factory.resolve("img-b");
        let second = factory.resolve("anything-else");
        assert!(Arc::ptr_eq(&first, &factory.default_worker()));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn registered_constructor_is_used() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "img-x".to_string(),
            WorkerSpec {
                kind: WorkerKind::Registered("marker".to_string()),
                args: BTreeMap::new(),
            },
        );
        let mut factory = WorkerFactory::new(mappings, "docker");
        factory.register("marker", Arc::new(|_spec| Arc::new(MarkerWorker)));

        assert!(factory.validate().is_ok());
        let worker = factory.resolve("img-x");
        assert!(!Arc::ptr_eq(&worker, &factory.default_worker()));
    }

    #[test]
    fn validate_flags_unknown_registry_key() {
        let mut mappings = HashMap::new();
        mappings.insert(
            "img-x".to_string(),
            WorkerSpec {
                kind: WorkerKind::Registered("missing".to_string()),
                args: BTreeMap::new(),
            },
        );
        let factory = WorkerFactory::new(mappings, "docker");

        let err = factory.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
        // Resolution still never fails.
        let worker = factory.resolve("img-x");
        assert!(Arc::ptr_eq(&worker, &factory.default_worker()));
    }

    #[test]
    fn worker_spec_serde() {
        let spec = WorkerSpec {
            kind: WorkerKind::Registered("gpu".to_string()),
            args: BTreeMap::from([("device".to_string(), "cuda:0".to_string())]),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let parsed: WorkerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, parsed);
    }
}
