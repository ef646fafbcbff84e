//! Agent loader: descriptor → runnable instance.
//!
//! Code locations resolve through an explicit [`AgentCatalog`] (unit name →
//! named constructors) or, for filesystem paths, to a script unit. Resolved
//! units are cached per agent id in a copy-on-write table; concurrent loads of
//! the same id serialize on a per-id lock, and every load hands out a fresh
//! instance built from the descriptor's configuration.

use chainlite_core::model::{AgentDescriptor, AgentKind};
use chainlite_core::ChainError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::capability::{Agent, SourceCollector};
use crate::llm::ChatBackend;
use crate::retrieval::{RetrievalAgent, Retriever};
use crate::script::{ScriptAgent, ScriptUnit};

/// Construction inputs handed to a catalog constructor.
pub struct AgentInit<'a> {
    /// Descriptor display name.
    pub name: &'a str,
    pub config: &'a serde_json::Map<String, serde_json::Value>,
    /// Shared LLM backend, when one is configured.
    pub backend: Option<Arc<dyn ChatBackend>>,
}

impl AgentInit<'_> {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

pub type AgentConstructor =
    Arc<dyn Fn(&AgentInit<'_>) -> Result<Box<dyn Agent>, ChainError> + Send + Sync>;

/// Registration map: unit name → implementation name → constructor.
///
/// Implementation names are kept in lexical order so resolution never depends
/// on registration order.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    units: BTreeMap<String, BTreeMap<String, AgentConstructor>>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the `builtin:` units.
    pub fn with_builtins() -> Self {
        crate::plugins::register_builtins(Self::new())
    }

    #[must_use]
    pub fn register<F>(mut self, unit: &str, implementation: &str, ctor: F) -> Self
    where
        F: Fn(&AgentInit<'_>) -> Result<Box<dyn Agent>, ChainError> + Send + Sync + 'static,
    {
        self.units
            .entry(unit.to_string())
            .or_default()
            .insert(implementation.to_string(), Arc::new(ctor));
        self
    }

    pub fn contains_unit(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }

    /// `(unit, implementation names)` pairs, for listings.
    pub fn units(&self) -> Vec<(String, Vec<String>)> {
        self.units
            .iter()
            .map(|(u, impls)| (u.clone(), impls.keys().cloned().collect()))
            .collect()
    }

    fn lookup(&self, unit: &str, implementation: &str) -> Option<AgentConstructor> {
        self.units.get(unit)?.get(implementation).cloned()
    }
}

/// Pick the implementation for `expected` among `candidates`.
///
/// Exact name wins; otherwise the single name containing `Agent`. Zero
/// candidates is a resolution error, several an ambiguity error.
pub fn resolve_implementation<'a>(
    unit: &str,
    expected: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Result<String, ChainError> {
    let mut agent_like: Vec<&str> = Vec::new();
    for name in candidates {
        if name == expected {
            return Ok(name.to_string());
        }
        if name.contains("Agent") {
            agent_like.push(name);
        }
    }
    match agent_like.as_slice() {
        [] => Err(ChainError::AgentResolution {
            unit: unit.to_string(),
        }),
        [only] => Ok(only.to_string()),
        many => {
            let mut candidates: Vec<String> = many.iter().map(|s| s.to_string()).collect();
            candidates.sort();
            Err(ChainError::ResolutionAmbiguity {
                unit: unit.to_string(),
                expected: expected.to_string(),
                candidates,
            })
        }
    }
}

enum UnitImpl {
    Catalog(AgentConstructor),
    Script(Arc<ScriptUnit>),
}

/// A resolved code unit, cached per agent id.
pub struct LoadedUnit {
    location: String,
    implementation: String,
    imp: UnitImpl,
}

/// A fresh agent instance plus the implementation it was built from.
pub struct LoadedAgent {
    pub agent: Box<dyn Agent>,
    pub implementation: String,
}

type UnitTable = HashMap<String, Arc<LoadedUnit>>;

pub struct AgentLoader {
    catalog: AgentCatalog,
    retriever: Arc<dyn Retriever>,
    backend: Option<Arc<dyn ChatBackend>>,
    units: RwLock<Arc<UnitTable>>,
    id_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentLoader {
    pub fn new(
        catalog: AgentCatalog,
        retriever: Arc<dyn Retriever>,
        backend: Option<Arc<dyn ChatBackend>>,
    ) -> Self {
        Self {
            catalog,
            retriever,
            backend,
            units: RwLock::new(Arc::new(HashMap::new())),
            id_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Number of code units currently cached.
    pub fn loaded_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<UnitTable> {
        match self.units.read() {
            Ok(table) => Arc::clone(&table),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, id: &str, unit: Arc<LoadedUnit>) {
        let mut guard = match self.units.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next: UnitTable = (**guard).clone();
        next.insert(id.to_string(), unit);
        *guard = Arc::new(next);
    }

    /// Build a runnable instance for `descriptor`, scoped to `project`.
    /// Retrieval agents report snippets to `sources`.
    pub async fn load(
        &self,
        descriptor: &AgentDescriptor,
        project: &str,
        sources: &SourceCollector,
    ) -> Result<LoadedAgent, ChainError> {
        if descriptor.kind() == AgentKind::Rag {
            return Ok(LoadedAgent {
                agent: Box::new(RetrievalAgent::new(
                    &descriptor.name,
                    project,
                    Arc::clone(&self.retriever),
                    sources.clone(),
                )),
                implementation: "RetrievalAgent".to_string(),
            });
        }

        let unit = self.unit_for(descriptor).await?;
        let agent: Box<dyn Agent> = match &unit.imp {
            UnitImpl::Catalog(ctor) => ctor(&AgentInit {
                name: &descriptor.name,
                config: &descriptor.config,
                backend: self.backend.clone(),
            })?,
            UnitImpl::Script(script) => Box::new(ScriptAgent::new(
                &descriptor.name,
                Arc::clone(script),
                &descriptor.config,
            )),
        };
        Ok(LoadedAgent {
            agent,
            implementation: unit.implementation.clone(),
        })
    }

    async fn unit_for(&self, descriptor: &AgentDescriptor) -> Result<Arc<LoadedUnit>, ChainError> {
        let location = descriptor
            .code_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ChainError::Configuration(format!(
                    "Agent {} has no code location",
                    descriptor.name
                ))
            })?;

        if let Some(unit) = self.cached(&descriptor.id, location) {
            return Ok(unit);
        }

        let id_lock = {
            let mut locks = self.id_locks.lock().await;
            Arc::clone(locks.entry(descriptor.id.clone()).or_default())
        };
        let _guard = id_lock.lock().await;

        // Another load may have finished while we waited.
        if let Some(unit) = self.cached(&descriptor.id, location) {
            return Ok(unit);
        }

        let unit = Arc::new(self.resolve_unit(descriptor, location)?);
        tracing::debug!(
            agent = %descriptor.id,
            location,
            implementation = %unit.implementation,
            "code unit resolved"
        );
        self.publish(&descriptor.id, Arc::clone(&unit));
        Ok(unit)
    }

    fn cached(&self, id: &str, location: &str) -> Option<Arc<LoadedUnit>> {
        self.snapshot()
            .get(id)
            .filter(|u| u.location == location)
            .cloned()
    }

    fn resolve_unit(
        &self,
        descriptor: &AgentDescriptor,
        location: &str,
    ) -> Result<LoadedUnit, ChainError> {
        let expected = format!("{}Agent", descriptor.compact_name());

        if let Some(impls) = self.catalog.units.get(location) {
            let implementation =
                resolve_implementation(location, &expected, impls.keys().map(String::as_str))?;
            let ctor = self
                .catalog
                .lookup(location, &implementation)
                .ok_or_else(|| ChainError::AgentResolution {
                    unit: location.to_string(),
                })?;
            return Ok(LoadedUnit {
                location: location.to_string(),
                implementation,
                imp: UnitImpl::Catalog(ctor),
            });
        }

        let path = Path::new(location);
        if !path.is_file() {
            return Err(ChainError::AgentResolution {
                unit: location.to_string(),
            });
        }
        Ok(LoadedUnit {
            location: location.to_string(),
            implementation: expected,
            imp: UnitImpl::Script(Arc::new(ScriptUnit::new(path))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievalAnswer;
    use async_trait::async_trait;
    use chainlite_core::model::Snippet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoRetriever;

    #[async_trait]
    impl Retriever for NoRetriever {
        async fn query(&self, _p: &str, _t: &str) -> Result<RetrievalAnswer, ChainError> {
            Ok(RetrievalAnswer {
                answer: "retrieved".into(),
                sources: vec![Snippet {
                    content: "c".into(),
                    source: "s.txt".into(),
                    chunk_index: 0,
                    score: 0.0,
                }],
            })
        }
        async fn search(&self, _p: &str, _t: &str, _k: usize) -> Result<Vec<Snippet>, ChainError> {
            Ok(Vec::new())
        }
        async fn ingest(&self, _p: &str, _f: &Path, _n: &str) -> Result<usize, ChainError> {
            Ok(0)
        }
    }

    struct Fixed(String, &'static str);

    #[async_trait]
    impl Agent for Fixed {
        fn name(&self) -> &str {
            &self.0
        }
        async fn run(&self, _input: &str) -> Result<String, ChainError> {
            Ok(self.1.to_string())
        }
    }

    fn descriptor(id: &str, name: &str, location: Option<&str>) -> AgentDescriptor {
        AgentDescriptor {
            id: id.into(),
            name: name.into(),
            description: None,
            agent_type: "code".into(),
            config: Default::default(),
            code_location: location.map(String::from),
            created_at: chrono::Utc::now(),
        }
    }

    fn loader(catalog: AgentCatalog) -> AgentLoader {
        AgentLoader::new(catalog, Arc::new(NoRetriever), None)
    }

    #[test]
    fn test_resolve_implementation_rules() {
        let names = ["HelperThing", "TranslateAgent", "ZebraAgent"];
        assert_eq!(
            resolve_implementation("u", "ZebraAgent", names).unwrap(),
            "ZebraAgent"
        );
        let err = resolve_implementation("u", "MissingAgent", names).unwrap_err();
        assert!(matches!(err, ChainError::ResolutionAmbiguity { ref candidates, .. }
            if candidates == &vec!["TranslateAgent".to_string(), "ZebraAgent".to_string()]));
        assert_eq!(
            resolve_implementation("u", "MissingAgent", ["Helper", "OnlyAgent"]).unwrap(),
            "OnlyAgent"
        );
        assert!(matches!(
            resolve_implementation("u", "MissingAgent", ["Helper"]),
            Err(ChainError::AgentResolution { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_picks_exact_name_and_builds_fresh_instances() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let catalog = AgentCatalog::new()
            .register("test:pair", "FirstAgent", |init| {
                Ok(Box::new(Fixed(init.name.to_string(), "first")))
            })
            .register("test:pair", "SecondAgent", move |init| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Fixed(init.name.to_string(), "second")))
            });
        let loader = loader(catalog);
        let d = descriptor("a1", "Second", Some("test:pair"));
        let sources = SourceCollector::new();

        let one = loader.load(&d, "p", &sources).await.unwrap();
        let two = loader.load(&d, "p", &sources).await.unwrap();
        assert_eq!(one.implementation, "SecondAgent");
        assert_eq!(one.agent.run("x").await.unwrap(), two.agent.run("x").await.unwrap());
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(loader.loaded_count(), 1);
    }

    #[tokio::test]
    async fn test_load_ambiguous_unit_fails() {
        let catalog = AgentCatalog::new()
            .register("test:pair", "FirstAgent", |i| Ok(Box::new(Fixed(i.name.into(), "1"))))
            .register("test:pair", "SecondAgent", |i| Ok(Box::new(Fixed(i.name.into(), "2"))));
        let loader = loader(catalog);
        let err = loader
            .load(&descriptor("a1", "Other", Some("test:pair")), "p", &SourceCollector::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::ResolutionAmbiguity { .. }));
        assert!(err.is_step_level());
    }

    #[tokio::test]
    async fn test_missing_location_and_unknown_unit() {
        let loader = loader(AgentCatalog::new());
        let sources = SourceCollector::new();
        let err = loader
            .load(&descriptor("a1", "Nope", None), "p", &sources)
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Configuration error: Agent Nope has no code location");
        let err = loader
            .load(&descriptor("a2", "Nope", Some("/definitely/not/here.py")), "p", &sources)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::AgentResolution { .. }));
    }

    #[tokio::test]
    async fn test_location_change_invalidates_cache() {
        let catalog = AgentCatalog::new()
            .register("test:a", "XAgent", |i| Ok(Box::new(Fixed(i.name.into(), "from a"))))
            .register("test:b", "XAgent", |i| Ok(Box::new(Fixed(i.name.into(), "from b"))));
        let loader = loader(catalog);
        let sources = SourceCollector::new();
        let a = loader
            .load(&descriptor("id", "X", Some("test:a")), "p", &sources)
            .await
            .unwrap();
        let b = loader
            .load(&descriptor("id", "X", Some("test:b")), "p", &sources)
            .await
            .unwrap();
        assert_eq!(a.agent.run("").await.unwrap(), "from a");
        assert_eq!(b.agent.run("").await.unwrap(), "from b");
    }

    #[tokio::test]
    async fn test_rag_descriptor_gets_retrieval_handle() {
        let loader = loader(AgentCatalog::new());
        let mut d = descriptor("r1", "Docs", None);
        d.agent_type = "rag".into();
        let sources = SourceCollector::new();
        let loaded = loader.load(&d, "p", &sources).await.unwrap();
        assert_eq!(loaded.agent.run("q").await.unwrap(), "retrieved");
        assert_eq!(sources.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_resolve_once() {
        let loader = Arc::new(loader(
            AgentCatalog::new().register("test:one", "OneAgent", |i| {
                Ok(Box::new(Fixed(i.name.into(), "one")))
            }),
        ));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = Arc::clone(&loader);
            handles.push(tokio::spawn(async move {
                let d = descriptor("same", "One", Some("test:one"));
                let loaded = loader.load(&d, "p", &SourceCollector::new()).await.unwrap();
                loaded.agent.run("").await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), "one");
        }
        assert_eq!(loader.loaded_count(), 1);
    }
}
