//! Hostname and tag resolution for parsed messages.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use intake_log::{LogError, Sampler};
use intake_statsd::metric;

use crate::config::DogStatsdConfig;
use crate::statsd::DogStatsdCounters;
use crate::tagger::{TagCardinality, TagResolver, CONTAINER_ENTITY_PREFIX, POD_ENTITY_PREFIX};
use crate::tags::TagSet;

/// Tags with this prefix set the hostname and are never emitted.
pub const HOST_TAG_PREFIX: &[u8] = b"host:";

/// Tags with this prefix carry an entity id and are never emitted.
pub const ENTITY_ID_TAG_PREFIX: &[u8] = b"dd.internal.entity_id:";

/// Entity id value that disables the catalog lookup.
pub const ENTITY_ID_IGNORE_VALUE: &[u8] = b"none";

static RESOLVE_FAILURES: Sampler = Sampler::new(1000);

/// Resolves hostnames and final tags of parsed messages.
#[derive(Clone)]
pub struct Enricher {
    hostname: String,
    entity_id_precedence: bool,
    cardinality: TagCardinality,
    resolver: Arc<dyn TagResolver>,
}

impl Enricher {
    /// Creates an enricher looking up tags in `resolver`.
    pub fn new(config: &DogStatsdConfig, resolver: Arc<dyn TagResolver>) -> Self {
        Self {
            hostname: config.hostname.clone(),
            entity_id_precedence: config.entity_id_precedence,
            cardinality: config.tag_cardinality,
            resolver,
        }
    }

    /// Returns the default hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Rewrites `tags` in place and returns the resolved hostname.
    ///
    /// `host:` tags are removed and the value of the last one becomes the hostname; otherwise the
    /// default hostname is used. `dd.internal.entity_id:` tags are removed as well. Origin tags
    /// from `origin_tags` are appended unless an entity id is present and entity id precedence is
    /// enabled. An entity id other than `none` is resolved as a pod in the tag catalog and its
    /// tags are appended.
    pub fn enrich_tags<F>(&self, tags: &mut TagSet, origin_tags: F) -> String
    where
        F: FnOnce() -> Vec<String>,
    {
        let mut host: Option<Bytes> = None;
        let mut entity_id: Option<Bytes> = None;

        tags.retain_with(|tag| {
            if tag.starts_with(HOST_TAG_PREFIX) {
                host = Some(tag.slice(HOST_TAG_PREFIX.len()..));
                false
            } else if tag.starts_with(ENTITY_ID_TAG_PREFIX) {
                entity_id = Some(tag.slice(ENTITY_ID_TAG_PREFIX.len()..));
                false
            } else {
                true
            }
        });

        let entity_id = entity_id.filter(|id| !id.is_empty());

        if entity_id.is_none() || !self.entity_id_precedence {
            tags.extend_owned(origin_tags());
        }

        if let Some(id) = entity_id.filter(|id| id[..] != *ENTITY_ID_IGNORE_VALUE) {
            let entity = format!("{POD_ENTITY_PREFIX}{}", String::from_utf8_lossy(&id));
            tags.extend_owned(self.resolve_tags(&entity));
        }

        match host {
            Some(host) => String::from_utf8_lossy(&host).into_owned(),
            None => self.hostname.clone(),
        }
    }

    /// Returns the tags implied by where a message came from.
    ///
    /// A container id sent in the message takes precedence over the origin of the packet.
    pub fn origin_tags(&self, origin: Option<&str>, container_id: Option<&str>) -> Vec<String> {
        match (container_id, origin) {
            (Some(id), _) if !id.is_empty() => {
                self.resolve_tags(&format!("{CONTAINER_ENTITY_PREFIX}{id}"))
            }
            (_, Some(origin)) if !origin.is_empty() => self.resolve_tags(origin),
            _ => Vec::new(),
        }
    }

    /// Looks up `entity` in the tag catalog.
    ///
    /// Failures are counted and logged with sampling, and yield no tags.
    pub fn resolve_tags(&self, entity: &str) -> Vec<String> {
        match self.resolver.resolve(entity, self.cardinality) {
            Ok(tags) => tags,
            Err(error) => {
                metric!(counter(DogStatsdCounters::TagResolutionFailed) += 1);
                if let Some(count) = RESOLVE_FAILURES.sample() {
                    intake_log::debug!(
                        entity,
                        count,
                        "cannot get tags for entity: {}",
                        LogError(&error)
                    );
                }
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enricher")
            .field("hostname", &self.hostname)
            .field("entity_id_precedence", &self.entity_id_precedence)
            .field("cardinality", &self.cardinality)
            .finish_non_exhaustive()
    }
}
