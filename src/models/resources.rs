//! Resource kinds and the caller-supplied mapping from a feature to the
//! task/agent/service ids it owns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every kind of resource the engine knows how to account for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Task,
    Agent,
    Service,
    MemoryObject,
    WeakReference,
    File,
    TempDirectory,
    CacheKey,
    Thread,
    Handle,
    Semaphore,
}

impl ResourceKind {
    /// Kinds that are shut down by an external stopper collaborator
    pub const STOPPABLE: [ResourceKind; 3] = [Self::Task, Self::Agent, Self::Service];

    pub fn is_stoppable(&self) -> bool {
        Self::STOPPABLE.contains(self)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Task => "task",
            Self::Agent => "agent",
            Self::Service => "service",
            Self::MemoryObject => "memory_object",
            Self::WeakReference => "weak_reference",
            Self::File => "file",
            Self::TempDirectory => "temp_directory",
            Self::CacheKey => "cache_key",
            Self::Thread => "thread",
            Self::Handle => "handle",
            Self::Semaphore => "semaphore",
        };
        f.write_str(name)
    }
}

/// Task, agent and service ids bound to one feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBindings {
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

impl ResourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_agents<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_services<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Ids bound for a stoppable kind; empty for any other kind
    pub fn ids_for(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Task => &self.tasks,
            ResourceKind::Agent => &self.agents,
            ResourceKind::Service => &self.services,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.agents.is_empty() && self.services.is_empty()
    }
}
