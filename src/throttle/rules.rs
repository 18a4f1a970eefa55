//! Throttle rule registration and matching.
//!
//! Rules are keyed by (scope, action), with a per-scope wildcard applying to
//! every action that has no concrete rule of its own. Registration happens
//! once during configuration; after the registry is handed to the engine it
//! is read-only and lookups need no synchronization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// Marker matching every action in a scope.
pub const WILDCARD: &str = "*";

/// A throttle policy: at most `max_requests` admissions per `window`.
///
/// Immutable once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRule {
    /// Length of the fixed window
    pub window: Duration,
    /// Maximum admissions inside one window
    pub max_requests: u32,
}

impl ThrottleRule {
    /// Create a rule, validating its bounds.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        if window.is_zero() {
            return Err(FloodgateError::Config(
                "throttle window must be non-zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(FloodgateError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            window,
            max_requests,
        })
    }
}

/// Identifies the rule applied to one action, or to a whole scope when the
/// action is the wildcard marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    /// The scope the rule belongs to
    pub scope: String,
    /// A concrete action name, or `"*"`
    pub action: String,
}

impl RuleKey {
    /// Key for a concrete action.
    pub fn new(scope: &str, action: &str) -> Self {
        Self {
            scope: scope.to_string(),
            action: action.to_string(),
        }
    }

    /// Key for a scope's wildcard rule.
    pub fn wildcard(scope: &str) -> Self {
        Self::new(scope, WILDCARD)
    }

    /// Whether this key is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.action == WILDCARD
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.action)
    }
}

/// Registry of throttle rules.
///
/// For a given scope the registry holds at most one wildcard rule and at
/// most one rule per concrete action. Lookup prefers the concrete rule.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<RuleKey, ThrottleRule>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for one concrete action, replacing any rule
    /// previously registered for it. Passing the wildcard marker as the
    /// action is equivalent to `register_wildcard`.
    pub fn register(&mut self, scope: &str, action: &str, rule: ThrottleRule) {
        if action == WILDCARD {
            self.register_wildcard(scope, rule);
            return;
        }
        self.rules.insert(RuleKey::new(scope, action), rule);
    }

    /// Register a rule for every action in a scope.
    ///
    /// This replaces the scope's throttle set: concrete rules registered
    /// earlier for the scope are evicted, not merged with. Concrete rules
    /// registered afterwards override the wildcard for their action.
    pub fn register_wildcard(&mut self, scope: &str, rule: ThrottleRule) {
        self.rules.retain(|key, _| key.scope != scope);
        self.rules.insert(RuleKey::wildcard(scope), rule);
    }

    /// Look up the rule applying to (scope, action).
    ///
    /// A concrete rule for the action wins over the scope's wildcard, even
    /// when the wildcard was registered later. Returns `None` when the scope
    /// has no applicable rule at all, in which case callers skip throttling.
    pub fn lookup(&self, scope: &str, action: &str) -> Option<&ThrottleRule> {
        self.rules
            .get(&RuleKey::new(scope, action))
            .or_else(|| self.rules.get(&RuleKey::wildcard(scope)))
    }

    /// Like `lookup`, but also reports which key matched so counter state
    /// can be namespaced per rule.
    pub fn resolve(&self, scope: &str, action: &str) -> Option<(RuleKey, ThrottleRule)> {
        let concrete = RuleKey::new(scope, action);
        if let Some(rule) = self.rules.get(&concrete) {
            return Some((concrete, *rule));
        }

        let wildcard = RuleKey::wildcard(scope);
        self.rules.get(&wildcard).map(|rule| (wildcard, *rule))
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether any rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Throttle rules loaded from configuration.
///
/// The file is an ordered list; entries are applied top to bottom, so a
/// wildcard entry replaces concrete rules listed above it for the same
/// scope, exactly as programmatic registration would.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule entries, in application order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One configured rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// The scope the rule belongs to
    pub scope: String,
    /// Concrete action name, or `"*"` for every action in the scope
    #[serde(default = "default_action")]
    pub action: String,
    /// Window length in seconds
    pub window_secs: u64,
    /// Maximum admissions inside one window
    pub max_requests: u32,
}

fn default_action() -> String {
    WILDCARD.to_string()
}

impl RulesConfig {
    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse throttle rules: {}", e)))
    }

    /// Apply the entries, in order, to an existing registry.
    pub fn apply(self, registry: &mut RuleRegistry) -> Result<()> {
        for entry in self.rules {
            let rule = ThrottleRule::new(Duration::from_secs(entry.window_secs), entry.max_requests)?;
            registry.register(&entry.scope, &entry.action, rule);
        }
        Ok(())
    }

    /// Build a fresh registry from the entries.
    pub fn into_registry(self) -> Result<RuleRegistry> {
        let mut registry = RuleRegistry::new();
        self.apply(&mut registry)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(window_secs: u64, max_requests: u32) -> ThrottleRule {
        ThrottleRule::new(Duration::from_secs(window_secs), max_requests).unwrap()
    }

    #[test]
    fn test_rule_validation() {
        assert!(ThrottleRule::new(Duration::ZERO, 3).is_err());
        assert!(ThrottleRule::new(Duration::from_secs(60), 0).is_err());
        assert!(ThrottleRule::new(Duration::from_secs(60), 3).is_ok());
    }

    #[test]
    fn test_lookup_without_rules() {
        let registry = RuleRegistry::new();
        assert!(registry.lookup("payments", "export").is_none());
    }

    #[test]
    fn test_concrete_rule_matches_only_its_action() {
        let mut registry = RuleRegistry::new();
        registry.register("payments", "export", rule(60, 3));

        assert!(registry.lookup("payments", "export").is_some());
        assert!(registry.lookup("payments", "list").is_none());
        assert!(registry.lookup("reports", "export").is_none());
    }

    #[test]
    fn test_wildcard_covers_every_action() {
        let mut registry = RuleRegistry::new();
        registry.register_wildcard("payments", rule(60, 3));

        assert!(registry.lookup("payments", "export").is_some());
        assert!(registry.lookup("payments", "list").is_some());
        assert!(registry.lookup("reports", "export").is_none());
    }

    #[test]
    fn test_concrete_beats_wildcard_registered_later() {
        let mut registry = RuleRegistry::new();
        registry.register_wildcard("payments", rule(60, 100));
        registry.register("payments", "export", rule(60, 3));

        let matched = registry.lookup("payments", "export").unwrap();
        assert_eq!(matched.max_requests, 3);

        let (key, matched) = registry.resolve("payments", "list").unwrap();
        assert!(key.is_wildcard());
        assert_eq!(matched.max_requests, 100);
    }

    #[test]
    fn test_wildcard_evicts_concrete_rules() {
        let mut registry = RuleRegistry::new();
        registry.register("payments", "export", rule(60, 3));
        registry.register("payments", "list", rule(60, 5));
        registry.register("reports", "export", rule(60, 7));

        registry.register_wildcard("payments", rule(30, 10));

        // the whole payments throttle set is replaced
        assert_eq!(registry.lookup("payments", "export").unwrap().max_requests, 10);
        assert_eq!(registry.lookup("payments", "list").unwrap().max_requests, 10);
        // other scopes are untouched
        assert_eq!(registry.lookup("reports", "export").unwrap().max_requests, 7);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reregistration_replaces_rule() {
        let mut registry = RuleRegistry::new();
        registry.register("payments", "export", rule(60, 3));
        registry.register("payments", "export", rule(120, 5));

        let matched = registry.lookup("payments", "export").unwrap();
        assert_eq!(matched.window, Duration::from_secs(120));
        assert_eq!(matched.max_requests, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_with_wildcard_marker_acts_as_wildcard() {
        let mut registry = RuleRegistry::new();
        registry.register("payments", "export", rule(60, 3));
        registry.register("payments", "*", rule(30, 10));

        assert_eq!(registry.lookup("payments", "export").unwrap().max_requests, 10);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_parse_rules_yaml() {
        let yaml = r#"
rules:
  - scope: payments
    action: export
    window_secs: 60
    max_requests: 3
  - scope: search
    window_secs: 1
    max_requests: 20
"#;
        let config = RulesConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rules.len(), 2);
        // action defaults to the wildcard marker
        assert_eq!(config.rules[1].action, WILDCARD);

        let registry = config.into_registry().unwrap();
        assert_eq!(registry.lookup("payments", "export").unwrap().max_requests, 3);
        assert_eq!(registry.lookup("search", "anything").unwrap().max_requests, 20);
    }

    #[test]
    fn test_rules_yaml_applies_in_order() {
        let yaml = r#"
rules:
  - scope: payments
    action: "*"
    window_secs: 60
    max_requests: 100
  - scope: payments
    action: export
    window_secs: 60
    max_requests: 3
"#;
        let registry = RulesConfig::from_yaml(yaml).unwrap().into_registry().unwrap();

        assert_eq!(registry.lookup("payments", "export").unwrap().max_requests, 3);
        assert_eq!(registry.lookup("payments", "list").unwrap().max_requests, 100);
    }

    #[test]
    fn test_invalid_configured_rule_is_rejected() {
        let yaml = r#"
rules:
  - scope: payments
    action: export
    window_secs: 60
    max_requests: 0
"#;
        let config = RulesConfig::from_yaml(yaml).unwrap();
        assert!(config.into_registry().is_err());
    }
}
