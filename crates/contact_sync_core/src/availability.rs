//! Injected availability of the external integrations.
//!
//! The reconciler never probes whether the CRM or the platform integration
//! is loaded; the host states it up front through [`Availability`].

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// External integration the reconciler depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Crm,
    Platform,
}

impl Dependency {
    /// Stable id used in log lines and error codes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crm => "crm",
            Self::Platform => "platform",
        }
    }

    /// User-facing short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Crm => "CRM contact integration",
            Self::Platform => "application account platform",
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which integrations are active for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Availability {
    pub crm: bool,
    pub platform: bool,
}

impl Default for Availability {
    fn default() -> Self {
        Self::all_active()
    }
}

impl Availability {
    pub fn all_active() -> Self {
        Self {
            crm: true,
            platform: true,
        }
    }

    /// Returns availability with `dependencies` switched off.
    pub fn without(dependencies: &[Dependency]) -> Self {
        let mut availability = Self::all_active();
        for dependency in dependencies {
            match dependency {
                Dependency::Crm => availability.crm = false,
                Dependency::Platform => availability.platform = false,
            }
        }
        availability
    }

    pub fn is_active(&self, dependency: Dependency) -> bool {
        match dependency {
            Dependency::Crm => self.crm,
            Dependency::Platform => self.platform,
        }
    }

    /// Returns the first inactive dependency, CRM before platform.
    pub fn first_missing(&self) -> Option<Dependency> {
        [Dependency::Crm, Dependency::Platform]
            .into_iter()
            .find(|dependency| !self.is_active(*dependency))
    }
}
