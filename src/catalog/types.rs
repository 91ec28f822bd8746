//! Catalog types: identifiers, applications, environments and scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Stable application identifier.
    ApplicationId
);

string_id!(
    /// Environment identifier, unique within its application.
    EnvironmentId
);

/// The unit of version-number monotonicity and snapshot publication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
}

impl Scope {
    pub fn new(application_id: impl Into<ApplicationId>, environment_id: impl Into<EnvironmentId>) -> Self {
        Self {
            application_id: application_id.into(),
            environment_id: environment_id.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.application_id, self.environment_id)
    }
}

/// A registered application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    /// Baseline for drift reports. Falls back to the first root environment.
    #[serde(default)]
    pub default_environment_id: Option<EnvironmentId>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker. Archived applications stay readable.
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// An environment, optionally inheriting from a parent in the same application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: EnvironmentId,
    pub application_id: ApplicationId,
    pub name: String,
    #[serde(default)]
    pub parent_environment_id: Option<EnvironmentId>,
    pub created_at: DateTime<Utc>,
}

impl Environment {
    pub fn scope(&self) -> Scope {
        Scope {
            application_id: self.application_id.clone(),
            environment_id: self.id.clone(),
        }
    }
}
