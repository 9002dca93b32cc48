//! Detector trait and the static registry.
//!
//! Detectors are black boxes: the engine only cares that they produce a
//! list of issues for a target path, or fail. Registration is keyed by a
//! closed [`DetectorKind`] enum so that the set of runnable detectors is
//! fixed at compile time and validated at startup, rather than discovered
//! by name at dispatch time.

use crate::errors::{Error, Result};
use crate::types::Issue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A black-box analyzer producing issues from a target path
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable detector name, used for cache keys and result attribution
    fn name(&self) -> &'static str;

    /// Version folded into cache keys; bump when the detector's output
    /// format or analysis semantics change.
    fn version(&self) -> u32 {
        1
    }

    /// Analyze the target and return all issues found
    async fn detect(&self, target: &Path) -> Result<Vec<Issue>>;
}

/// The closed set of detector identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Typescript,
    Eslint,
    Imports,
    Security,
    Performance,
    Complexity,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 6] = [
        DetectorKind::Typescript,
        DetectorKind::Eslint,
        DetectorKind::Imports,
        DetectorKind::Security,
        DetectorKind::Performance,
        DetectorKind::Complexity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::Typescript => "typescript",
            DetectorKind::Eslint => "eslint",
            DetectorKind::Imports => "imports",
            DetectorKind::Security => "security",
            DetectorKind::Performance => "performance",
            DetectorKind::Complexity => "complexity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// Constructor for a detector instance
pub type DetectorCtor = Arc<dyn Fn() -> Arc<dyn Detector> + Send + Sync>;

/// Static registry mapping detector kinds to constructors.
///
/// Built once at startup; the orchestrator and the worker pool only ever
/// instantiate detectors through it.
#[derive(Default, Clone)]
pub struct DetectorRegistry {
    constructors: HashMap<DetectorKind, DetectorCtor>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a kind, replacing any previous binding
    pub fn register<F>(&mut self, kind: DetectorKind, ctor: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Detector> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(ctor));
        self
    }

    /// Kinds with a registered constructor, in declaration order
    pub fn registered_kinds(&self) -> Vec<DetectorKind> {
        DetectorKind::ALL
            .iter()
            .copied()
            .filter(|k| self.constructors.contains_key(k))
            .collect()
    }

    /// Registered detector names, in declaration order
    pub fn registered_names(&self) -> Vec<String> {
        self.registered_kinds()
            .iter()
            .map(|k| k.name().to_string())
            .collect()
    }

    /// Resolve caller-supplied names to kinds, rejecting unknown or
    /// unregistered names up front.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<DetectorKind>> {
        names
            .iter()
            .map(|name| {
                let kind = DetectorKind::from_name(name).ok_or_else(|| Error::UnknownDetector {
                    name: name.clone(),
                })?;
                if !self.constructors.contains_key(&kind) {
                    return Err(Error::UnknownDetector { name: name.clone() });
                }
                Ok(kind)
            })
            .collect()
    }

    /// Instantiate a detector for a kind
    pub fn instantiate(&self, kind: DetectorKind) -> Result<Arc<dyn Detector>> {
        let ctor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| Error::UnknownDetector {
                name: kind.name().to_string(),
            })?;
        Ok(ctor())
    }

    /// Instantiate a detector by name
    pub fn instantiate_by_name(&self, name: &str) -> Result<Arc<dyn Detector>> {
        let kind = DetectorKind::from_name(name).ok_or_else(|| Error::UnknownDetector {
            name: name.to_string(),
        })?;
        self.instantiate(kind)
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("registered", &self.registered_names())
            .finish()
    }
}
