//! Reuse and ownership policies, and the container defaults built from them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How many instances a registration produces and how widely they are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReuseScope {
    /// A new instance is built on every resolution
    None,
    /// One instance per resolving container
    #[default]
    Container,
    /// One instance per registering container, shared by all its descendants
    Hierarchy,
}

impl ReuseScope {
    /// Whether instances are kept in a scope cache
    pub fn caches(self) -> bool {
        !matches!(self, ReuseScope::None)
    }

    fn as_str(self) -> &'static str {
        match self {
            ReuseScope::None => "none",
            ReuseScope::Container => "container",
            ReuseScope::Hierarchy => "hierarchy",
        }
    }
}

/// Who is responsible for disposing resolved instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Owner {
    /// The container disposes the instance when it is itself disposed
    #[default]
    Container,
    /// The caller manages the lifetime of the instance
    External,
}

impl Owner {
    fn as_str(self) -> &'static str {
        match self {
            Owner::Container => "container",
            Owner::External => "external",
        }
    }
}

/// Errors raised while reading policies from configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown scope: '{0}'")]
    UnknownScope(String),
    #[error("Unknown owner: '{0}'")]
    UnknownOwner(String),
}

impl ConfigError {
    /// Symbolic identifier of the error, for external message catalogs
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::UnknownScope(_) => "unknown_scope",
            ConfigError::UnknownOwner(_) => "unknown_owner",
        }
    }
}

impl FromStr for ReuseScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ReuseScope::None),
            "container" => Ok(ReuseScope::Container),
            "hierarchy" => Ok(ReuseScope::Hierarchy),
            _ => Err(ConfigError::UnknownScope(s.to_string())),
        }
    }
}

impl FromStr for Owner {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" => Ok(Owner::Container),
            "external" => Ok(Owner::External),
            _ => Err(ConfigError::UnknownOwner(s.to_string())),
        }
    }
}

impl fmt::Display for ReuseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defaults applied to registrations made without explicit overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContainerOptions {
    pub default_reuse: ReuseScope,
    pub default_owner: Owner,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reuse(mut self, scope: ReuseScope) -> Self {
        self.default_reuse = scope;
        self
    }

    pub fn owner(mut self, owner: Owner) -> Self {
        self.default_owner = owner;
        self
    }
}
