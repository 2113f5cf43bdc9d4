//! Access to the tag catalog that maps workload entities to tags.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Entity prefix for Kubernetes pods, used for `dd.internal.entity_id` tags.
pub const POD_ENTITY_PREFIX: &str = "kubernetes_pod_uid://";

/// Entity prefix for containers, used for the `c:` field.
pub const CONTAINER_ENTITY_PREFIX: &str = "container_id://";

/// Controls how many tags the catalog returns for an entity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCardinality {
    /// Tags with a bounded number of values, such as the image name.
    #[default]
    Low,
    /// Adds orchestrator-level tags, such as the pod name.
    Orchestrator,
    /// Adds tags unique to single workloads, such as the container id.
    High,
}

/// An error returned by a [`TagResolver`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The catalog does not know the entity.
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    /// The catalog could not be queried.
    #[error("tag catalog unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves entity identifiers to tags.
pub trait TagResolver: Send + Sync {
    /// Returns the tags of `entity` at the given cardinality.
    fn resolve(&self, entity: &str, cardinality: TagCardinality)
        -> Result<Vec<String>, ResolveError>;
}

/// A resolver that knows no tags for any entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopResolver;

impl TagResolver for NoopResolver {
    fn resolve(&self, _: &str, _: TagCardinality) -> Result<Vec<String>, ResolveError> {
        Ok(Vec::new())
    }
}

/// A resolver backed by a fixed map of entities to tags.
///
/// Entities are keyed by their full identifier including the prefix. Low cardinality tags are
/// returned at all levels, high cardinality tags only at [`TagCardinality::High`].
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    entities: HashMap<String, EntityTags>,
}

#[derive(Clone, Debug, Default)]
struct EntityTags {
    low: Vec<String>,
    orchestrator: Vec<String>,
    high: Vec<String>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tags for `entity` at the given cardinality.
    pub fn with_tags<I, S>(mut self, entity: &str, cardinality: TagCardinality, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entities.entry(entity.to_owned()).or_default();
        let target = match cardinality {
            TagCardinality::Low => &mut entry.low,
            TagCardinality::Orchestrator => &mut entry.orchestrator,
            TagCardinality::High => &mut entry.high,
        };
        target.extend(tags.into_iter().map(Into::into));
        self
    }
}

impl TagResolver for StaticResolver {
    fn resolve(
        &self,
        entity: &str,
        cardinality: TagCardinality,
    ) -> Result<Vec<String>, ResolveError> {
        let tags = self
            .entities
            .get(entity)
            .ok_or_else(|| ResolveError::UnknownEntity(entity.to_owned()))?;

        let mut resolved = tags.low.clone();
        if cardinality != TagCardinality::Low {
            resolved.extend_from_slice(&tags.orchestrator);
        }
        if cardinality == TagCardinality::High {
            resolved.extend_from_slice(&tags.high);
        }
        Ok(resolved)
    }
}
