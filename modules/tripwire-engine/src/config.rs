use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EngineError;

/// What `Engine::add_rule` does when a rule id is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateRulePolicy {
    /// Accept the rule. Enable/disable by id then act on the first match,
    /// remove acts on all matches.
    #[default]
    Allow,
    /// Refuse the rule with `EngineError::DuplicateRule`.
    Reject,
}

impl FromStr for DuplicateRulePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "reject" => Ok(Self::Reject),
            other => Err(EngineError::Config(format!(
                "unknown duplicate rule policy '{other}' (expected 'allow' or 'reject')"
            ))),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub duplicate_rule_ids: DuplicateRulePolicy,
    /// Firings slower than this are logged at warn level. `None` disables.
    pub slow_firing_threshold: Option<Duration>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// `TRIPWIRE_DUPLICATE_RULES`: `allow` (default) or `reject`.
    /// `TRIPWIRE_SLOW_FIRING_MS`: warn threshold in milliseconds; unset or 0 disables.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let duplicate_rule_ids = match lookup("TRIPWIRE_DUPLICATE_RULES") {
            Some(raw) => raw.parse()?,
            None => DuplicateRulePolicy::default(),
        };

        let slow_firing_threshold = match lookup("TRIPWIRE_SLOW_FIRING_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| {
                    EngineError::Config(format!("TRIPWIRE_SLOW_FIRING_MS must be a number, got '{raw}'"))
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => None,
        };

        Ok(Self {
            duplicate_rule_ids,
            slow_firing_threshold,
        })
    }

    pub fn with_duplicate_rule_ids(mut self, policy: DuplicateRulePolicy) -> Self {
        self.duplicate_rule_ids = policy;
        self
    }

    pub fn with_slow_firing_threshold(mut self, threshold: Duration) -> Self {
        self.slow_firing_threshold = Some(threshold);
        self
    }
}
