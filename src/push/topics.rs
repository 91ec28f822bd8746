//! Push subscription topics.
//!
//! Four shapes exist:
//! - `app/{app}/config`: full configuration updates for every environment
//! - `app/{app}/env/{env}/config`: updates for one environment
//! - `instance/{instance}/config`: updates aimed at one client instance
//! - `app/{app}/notifications`: version-only change events
//!
//! A leading `/topic/` (STOMP-style destination prefix) is accepted and dropped.

use std::str::FromStr;

use crate::catalog::{ApplicationId, EnvironmentId};
use crate::error::ConfigCenterError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    AppConfig(ApplicationId),
    EnvConfig(ApplicationId, EnvironmentId),
    InstanceConfig(String),
    AppNotifications(ApplicationId),
}

impl Topic {
    /// Application the topic belongs to, if any.
    pub fn application_id(&self) -> Option<&ApplicationId> {
        match self {
            Topic::AppConfig(app) | Topic::EnvConfig(app, _) | Topic::AppNotifications(app) => Some(app),
            Topic::InstanceConfig(_) => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::AppConfig(app) => write!(f, "app/{app}/config"),
            Topic::EnvConfig(app, env) => write!(f, "app/{app}/env/{env}/config"),
            Topic::InstanceConfig(instance) => write!(f, "instance/{instance}/config"),
            Topic::AppNotifications(app) => write!(f, "app/{app}/notifications"),
        }
    }
}

impl FromStr for Topic {
    type Err = ConfigCenterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.strip_prefix("/topic/").unwrap_or(raw).trim_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigCenterError::InvalidRequest(format!("unknown topic: {raw}")));
        }

        match parts.as_slice() {
            ["app", app, "config"] => Ok(Topic::AppConfig((*app).into())),
            ["app", app, "env", env, "config"] => Ok(Topic::EnvConfig((*app).into(), (*env).into())),
            ["app", app, "notifications"] => Ok(Topic::AppNotifications((*app).into())),
            ["instance", instance, "config"] => Ok(Topic::InstanceConfig((*instance).to_string())),
            _ => Err(ConfigCenterError::InvalidRequest(format!("unknown topic: {raw}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_shapes_and_prefix() {
        assert_eq!("app/shop/config".parse::<Topic>().unwrap(), Topic::AppConfig("shop".into()));
        assert_eq!(
            "/topic/app/shop/env/prod/config".parse::<Topic>().unwrap(),
            Topic::EnvConfig("shop".into(), "prod".into())
        );
        assert_eq!(
            "instance/i-1/config".parse::<Topic>().unwrap().to_string(),
            "instance/i-1/config"
        );
        assert_eq!(
            "app/shop/notifications".parse::<Topic>().unwrap(),
            Topic::AppNotifications("shop".into())
        );
    }

    #[test]
    fn rejects_unknown_or_empty_segments() {
        assert!("app//config".parse::<Topic>().is_err());
        assert!("app/shop/*".parse::<Topic>().is_err());
        assert!("".parse::<Topic>().is_err());
    }
}
