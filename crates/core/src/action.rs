//! Action configuration and name normalization.
//!
//! Actions are configured as a list of descriptors in the resource's
//! `config.json`:
//!
//! ```json
//! { "type": "ActionResource",
//!   "actions": [{ "name": "Send Mail", "resource": "mail_log" }] }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Persisted configuration of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ActionConfig {
    /// Display name as authored; normalized before registration.
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only reachable by internal requests (shared-secret bypass).
    #[serde(default)]
    pub internal: bool,
    /// Name of the store / collection bound to this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ActionConfig {
    /// Shorthand for an action with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            internal: false,
            resource: None,
        }
    }

    /// Bind the action to a store.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Mark the action as internal-only.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Validate field constraints, mapping failures to [`CoreError::Validation`].
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(format!("Invalid action '{}': {e}", self.name)))?;
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Action name must not be blank".to_string(),
            ));
        }
        if let Some(resource) = &self.resource {
            if resource.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Action '{}' has a blank resource name",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Top-level resource configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type label, `"ActionResource"` in files written by the dashboard.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl ResourceConfig {
    /// Parse a resource configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Invalid resource configuration: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

/// How configured names are turned into registry keys.
///
/// `FirstSpace` keeps compatibility with script files created by earlier
/// deployments, which only ever had their first space replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameNormalization {
    /// Lowercase, replace only the first space with a hyphen.
    #[default]
    FirstSpace,
    /// Lowercase, replace every space with a hyphen.
    AllSpaces,
}

impl NameNormalization {
    /// Normalize `name` into its registry key.
    ///
    /// # Examples
    ///
    /// ```
    /// use actionhost_core::action::NameNormalization;
    ///
    /// assert_eq!(NameNormalization::FirstSpace.apply("Send Mail"), "send-mail");
    /// assert_eq!(NameNormalization::FirstSpace.apply("Send Weekly Mail"), "send-weekly mail");
    /// assert_eq!(NameNormalization::AllSpaces.apply("Send Weekly Mail"), "send-weekly-mail");
    /// ```
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::FirstSpace => name.replacen(' ', "-", 1).to_lowercase(),
            Self::AllSpaces => name.replace(' ', "-").to_lowercase(),
        }
    }
}

impl FromStr for NameNormalization {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_space" => Ok(Self::FirstSpace),
            "all" | "all_spaces" => Ok(Self::AllSpaces),
            other => Err(CoreError::Validation(format!(
                "Unknown name normalization: '{other}'. Valid values: first, all"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_space_replaces_only_first() {
        let n = NameNormalization::FirstSpace;
        assert_eq!(n.apply("Send Mail"), "send-mail");
        assert_eq!(n.apply("A B C"), "a-b c");
        assert_eq!(n.apply("nospace"), "nospace");
        assert_eq!(n.apply("UPPER"), "upper");
    }

    #[test]
    fn all_spaces_replaces_every_space() {
        assert_eq!(NameNormalization::AllSpaces.apply("A B C"), "a-b-c");
    }

    #[test]
    fn normalization_parses() {
        assert_eq!(
            "first".parse::<NameNormalization>().unwrap(),
            NameNormalization::FirstSpace
        );
        assert_eq!(
            "ALL".parse::<NameNormalization>().unwrap(),
            NameNormalization::AllSpaces
        );
        assert!("some".parse::<NameNormalization>().is_err());
    }

    #[test]
    fn parse_resource_config() {
        let cfg = ResourceConfig::from_json(
            r#"{"type": "ActionResource", "actions": [
                {"name": "Send Mail", "resource": "mail_log"},
                {"name": "ping", "description": "health", "internal": true}
            ]}"#,
        )
        .unwrap();
        assert_eq!(cfg.kind.as_deref(), Some("ActionResource"));
        assert_eq!(cfg.actions.len(), 2);
        assert_eq!(cfg.actions[0].resource.as_deref(), Some("mail_log"));
        assert!(!cfg.actions[0].internal);
        assert!(cfg.actions[1].internal);
        assert_eq!(cfg.actions[1].description.as_deref(), Some("health"));
    }

    #[test]
    fn parse_resource_config_rejects_garbage() {
        assert!(matches!(
            ResourceConfig::from_json("[1, 2]"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn check_rejects_blank_and_oversized_names() {
        assert!(ActionConfig::named("").check().is_err());
        assert!(ActionConfig::named("   ").check().is_err());
        assert!(ActionConfig::named("x".repeat(129)).check().is_err());
        assert!(ActionConfig::named("ok").check().is_ok());
    }

    #[test]
    fn check_rejects_blank_resource() {
        let cfg = ActionConfig::named("ok").with_resource(" ");
        assert!(cfg.check().is_err());
    }
}
