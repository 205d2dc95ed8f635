//! Application manifest: package locators, node profiles and dependencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OpsError, Result};

/// Name of the teleport package dependency
pub const TELEPORT_PACKAGE: &str = "teleport";
/// Name of the gravity binary package dependency
pub const GRAVITY_PACKAGE: &str = "gravity";
/// Name of the default runtime (planet) package dependency
pub const PLANET_PACKAGE: &str = "planet";
/// Name of the RBAC application dependency
pub const RBAC_APP: &str = "rbac-app";
/// Name of the cluster controller application dependency
pub const SITE_APP: &str = "site";
/// Name of the cluster DNS application dependency
pub const DNS_APP: &str = "dns-app";

/// Service role a node profile may declare.
pub const SERVICE_ROLE_MASTER: &str = "master";
pub const SERVICE_ROLE_NODE: &str = "node";

/// Unique package address in the form `repository/name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub repository: String,
    pub name: String,
    pub version: String,
}

impl Locator {
    pub fn new(
        repository: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.repository, self.name, self.version)
    }
}

impl FromStr for Locator {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        let (repository, rest) = s
            .rsplit_once('/')
            .ok_or_else(|| OpsError::bad_parameter(format!("invalid package locator {s:?}")))?;
        let (name, version) = rest
            .split_once(':')
            .ok_or_else(|| OpsError::bad_parameter(format!("invalid package locator {s:?}")))?;
        if repository.is_empty() || name.is_empty() || version.is_empty() {
            return Err(OpsError::bad_parameter(format!(
                "invalid package locator {s:?}"
            )));
        }
        Ok(Locator::new(repository, name, version))
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Minimum hardware a node profile requires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Requirements {
    #[serde(default)]
    pub cpu_min: u32,
    /// Minimum available memory in bytes
    #[serde(default)]
    pub ram_min: u64,
}

/// A class of nodes the application can be installed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeProfile {
    pub name: String,

    /// Explicit control plane role, `master` or `node`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role: Option<String>,

    #[serde(default)]
    pub requirements: Requirements,

    /// Role-specific runtime package, defaults to the manifest's planet
    /// dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_package: Option<Locator>,
}

impl NodeProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_role: None,
            requirements: Requirements::default(),
            runtime_package: None,
        }
    }

    pub fn with_service_role(mut self, role: impl Into<String>) -> Self {
        self.service_role = Some(role.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Dependencies {
    #[serde(default)]
    pub packages: Vec<Locator>,
    #[serde(default)]
    pub apps: Vec<Locator>,
}

/// Describes the user application being installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub locator: Locator,
    pub node_profiles: Vec<NodeProfile>,
    #[serde(default)]
    pub dependencies: Dependencies,
}

impl Manifest {
    pub fn node_profile(&self, name: &str) -> Result<&NodeProfile> {
        self.node_profiles
            .iter()
            .find(|profile| profile.name == name)
            .ok_or_else(|| OpsError::not_found(format!("node profile {name:?} not found")))
    }

    /// Looks up a package dependency by name.
    pub fn dependency_package(&self, name: &str) -> Result<&Locator> {
        self.dependencies
            .packages
            .iter()
            .find(|locator| locator.name == name)
            .ok_or_else(|| {
                OpsError::not_found(format!("package {name:?} not found in manifest dependencies"))
            })
    }

    /// Looks up an application dependency by name.
    pub fn dependency_app(&self, name: &str) -> Result<&Locator> {
        self.dependencies
            .apps
            .iter()
            .find(|locator| locator.name == name)
            .ok_or_else(|| {
                OpsError::not_found(format!(
                    "application {name:?} not found in manifest dependencies"
                ))
            })
    }

    /// Runtime package a server with the given profile runs.
    pub fn runtime_package(&self, profile: &NodeProfile) -> Result<Locator> {
        match &profile.runtime_package {
            Some(locator) => Ok(locator.clone()),
            None => self.dependency_package(PLANET_PACKAGE).cloned(),
        }
    }

    /// System applications installed before the user application, in
    /// manifest order. The RBAC application has its own phase.
    pub fn runtime_apps(&self) -> Vec<&Locator> {
        self.dependencies
            .apps
            .iter()
            .filter(|locator| locator.name != RBAC_APP)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_parse() {
        let locator: Locator = "gravitational.io/teleport:3.0.5".parse().unwrap();
        assert_eq!(locator.repository, "gravitational.io");
        assert_eq!(locator.name, "teleport");
        assert_eq!(locator.version, "3.0.5");
        assert_eq!(locator.to_string(), "gravitational.io/teleport:3.0.5");
    }

    #[test]
    fn test_locator_parse_invalid() {
        for bad in ["teleport:3.0.5", "gravitational.io/teleport", "/teleport:1", "a/:1"] {
            let err = bad.parse::<Locator>().unwrap_err();
            assert!(err.is_bad_parameter(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_missing_dependency_is_not_found() {
        let manifest = Manifest {
            locator: Locator::new("example.com", "app", "1.0.0"),
            node_profiles: vec![NodeProfile::new("worker")],
            dependencies: Dependencies::default(),
        };
        assert!(manifest.dependency_package(TELEPORT_PACKAGE).unwrap_err().is_not_found());
        assert!(manifest.dependency_app(DNS_APP).unwrap_err().is_not_found());
        assert!(manifest.node_profile("db").unwrap_err().is_not_found());
    }
}
