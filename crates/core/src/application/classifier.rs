// Outcome Classifier
// Static, side-effect-free inspection of probe text: which protocol applies, and
// whether the probe is denylisted

use regex::Regex;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::domain::Protocol;
use crate::error::Result;

/// Decides the execution protocol of a probe from its source text
///
/// Both the async marker and the denylist are plain, inspectable patterns.
#[derive(Debug, Clone)]
pub struct ProbeClassifier {
    async_marker: Regex,
    denylist: Vec<Regex>,
}

impl ProbeClassifier {
    /// Build from configuration: the pass callback name is the async marker
    ///
    /// # Errors
    /// - HarnessError::Config if a denylist pattern does not compile
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let async_marker = Regex::new(&regex::escape(&config.pass_callback))?;
        let denylist = config
            .denylist
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            async_marker,
            denylist,
        })
    }

    /// `Async` if the source references the success callback, else `Sync`
    pub fn classify(&self, source: &str) -> Protocol {
        if self.async_marker.is_match(source) {
            Protocol::Async
        } else {
            Protocol::Sync
        }
    }

    /// Denylist pattern matching `name`, if the probe must be forced to `Fail`
    pub fn bypass(&self, name: &str) -> Option<&str> {
        let hit = self
            .denylist
            .iter()
            .find(|pattern| pattern.is_match(name))
            .map(Regex::as_str);

        if let Some(pattern) = hit {
            debug!(probe = %name, pattern = %pattern, "Probe denylisted, skipping execution");
        }
        hit
    }

    pub fn async_marker(&self) -> &str {
        self.async_marker.as_str()
    }

    pub fn denylist(&self) -> impl Iterator<Item = &str> {
        self.denylist.iter().map(Regex::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ProbeClassifier {
        ProbeClassifier::new(&HarnessConfig::default()).unwrap()
    }

    #[test]
    fn test_classify_sync() {
        assert_eq!(classifier().classify("return true"), Protocol::Sync);
        assert_eq!(
            classifier().classify("return typeof Promise === 'function'"),
            Protocol::Sync
        );
    }

    #[test]
    fn test_classify_async_by_marker() {
        let source = "var p = Promise.resolve(1);\np.then(function () { asyncTestPassed(); });";
        assert_eq!(classifier().classify(source), Protocol::Async);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = classifier();
        let source = "asyncTestPassed()";
        assert_eq!(c.classify(source), c.classify(source));
    }

    #[test]
    fn test_custom_marker_is_escaped() {
        let config = HarnessConfig {
            pass_callback: "$done".to_string(),
            ..Default::default()
        };
        let c = ProbeClassifier::new(&config).unwrap();
        assert_eq!(c.classify("$done()"), Protocol::Async);
        assert_eq!(c.classify("asyncTestPassed()"), Protocol::Sync);
    }

    #[test]
    fn test_default_denylist() {
        let c = classifier();
        assert!(c
            .bypass("RegExp syntax extensions: incomplete patterns and quantifiers")
            .is_some());
        assert!(c
            .bypass("Object.prototype.__defineGetter__, ToObject(this)")
            .is_some());
        assert!(c
            .bypass("Object.prototype.__defineSetter__, ToObject(this)")
            .is_some());
        assert!(c.bypass("Object.prototype.__defineGetter__").is_none());
        assert!(c.bypass("arrow functions").is_none());
    }

    #[test]
    fn test_denylist_is_inspectable() {
        let c = classifier();
        assert_eq!(c.async_marker(), "asyncTestPassed");
        assert_eq!(c.denylist().count(), 2);
    }
}
