//! Throttle rules and the admission decision engine.

mod decision;
mod engine;
mod rules;

pub use decision::{Decision, Rejection, DEFAULT_STATUS_CODE, RETRY_AFTER_HEADER};
pub use engine::{Counting, ThrottleEngine};
pub use rules::{RuleConfig, RuleKey, RuleRegistry, RulesConfig, ThrottleRule, WILDCARD};
