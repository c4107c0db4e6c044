// Probe Catalog Domain Model

use std::collections::HashSet;

use serde_json::Value;

use super::error::CatalogError;

/// Runtime version identifier (opaque key)
pub type VersionId = String;

/// Probe name, unique within a version
pub type ProbeName = String;

/// A single named probe script for one runtime version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub version: VersionId,
    pub name: ProbeName,
    pub source: String,
}

impl Probe {
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            source: source.into(),
        }
    }
}

/// All probes of one version, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSuite {
    pub version: VersionId,
    pub probes: Vec<Probe>,
}

impl VersionSuite {
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// Flat `version -> name -> source` catalog consumed by the harness
///
/// Declaration order of versions and probe names is preserved; the
/// sequencer decides the processing order from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    suites: Vec<VersionSuite>,
}

impl Catalog {
    /// Build a catalog from already-assembled suites
    ///
    /// # Errors
    /// - CatalogError::DuplicateVersion if a version appears twice
    /// - CatalogError::DuplicateProbe if a name appears twice within a version
    /// - CatalogError::InvalidShape if a probe is filed under the wrong version
    pub fn new(suites: Vec<VersionSuite>) -> Result<Self, CatalogError> {
        let mut versions = HashSet::new();
        for suite in &suites {
            if !versions.insert(suite.version.as_str()) {
                return Err(CatalogError::DuplicateVersion(suite.version.clone()));
            }

            let mut names = HashSet::new();
            for probe in &suite.probes {
                if probe.version != suite.version {
                    return Err(CatalogError::InvalidShape(format!(
                        "probe '{}' declares version '{}' but is filed under '{}'",
                        probe.name, probe.version, suite.version
                    )));
                }
                if !names.insert(probe.name.as_str()) {
                    return Err(CatalogError::DuplicateProbe {
                        version: suite.version.clone(),
                        name: probe.name.clone(),
                    });
                }
            }
        }

        Ok(Self { suites })
    }

    /// Build a catalog from `(version, [(name, source)])` pairs
    ///
    /// # Example
    /// ```text
    /// let catalog = Catalog::from_entries([("v1", [("a", "return true")])])?;
    /// ```
    pub fn from_entries<V, P, N, S>(entries: impl IntoIterator<Item = (V, P)>) -> Result<Self, CatalogError>
    where
        V: Into<String>,
        P: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let suites = entries
            .into_iter()
            .map(|(version, probes)| {
                let version: String = version.into();
                let probes = probes
                    .into_iter()
                    .map(|(name, source)| Probe::new(version.clone(), name, source))
                    .collect();
                VersionSuite { version, probes }
            })
            .collect();

        Self::new(suites)
    }

    /// Parse the serialized catalog document (`{"version": {"name": "source"}}`)
    ///
    /// # Errors
    /// - CatalogError::Parse if the text is not JSON
    /// - CatalogError::InvalidShape if the document is not an object of objects
    /// - CatalogError::MissingSource if a probe source is `null` or not a string
    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Object(versions) = document else {
            return Err(CatalogError::InvalidShape(
                "top level must be an object keyed by version".to_string(),
            ));
        };

        let mut suites = Vec::with_capacity(versions.len());
        for (version, probes) in versions {
            let Value::Object(probes) = probes else {
                return Err(CatalogError::InvalidShape(format!(
                    "version '{}' must map probe names to sources",
                    version
                )));
            };

            let mut suite = VersionSuite {
                version: version.clone(),
                probes: Vec::with_capacity(probes.len()),
            };
            for (name, source) in probes {
                let Value::String(source) = source else {
                    return Err(CatalogError::MissingSource { version, name });
                };
                suite.probes.push(Probe::new(version.clone(), name, source));
            }
            suites.push(suite);
        }

        Self::new(suites)
    }

    /// Suites in declaration order
    pub fn suites(&self) -> &[VersionSuite] {
        &self.suites
    }

    pub fn version_count(&self) -> usize {
        self.suites.len()
    }

    pub fn probe_count(&self) -> usize {
        self.suites.iter().map(VersionSuite::len).sum()
    }
}
