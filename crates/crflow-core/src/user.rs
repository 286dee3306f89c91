//! Users and the fixed role set

use crate::error::FieldError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organizational role
///
/// The set is closed: access rules and transitions match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Requester, owns change requests
    User,
    /// Division manager, first approval stage
    Manager,
    /// VP, second approval stage
    Vp,
    /// IT manager, maps approved requests to developers
    ManagerIt,
    /// Developer
    Dev,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::Manager,
        Role::Vp,
        Role::ManagerIt,
        Role::Dev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Manager => "MANAGER",
            Role::Vp => "VP",
            Role::ManagerIt => "MANAGER_IT",
            Role::Dev => "DEV",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "USER" => Ok(Role::User),
            "MANAGER" => Ok(Role::Manager),
            "VP" => Ok(Role::Vp),
            "MANAGER_IT" | "MANAGERIT" => Ok(Role::ManagerIt),
            "DEV" | "DEVELOPER" => Ok(Role::Dev),
            _ => Err(crate::Error::InvalidRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    /// Unique, compared case-insensitively
    pub email: String,

    pub name: String,

    pub role: Role,

    /// Organizational unit; only meaningful for requesters and managers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: &str, role: Role, division: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
            role,
            division: division
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: Utc::now(),
        }
    }

    /// Check registration fields
    pub fn validate(&self) -> crate::Result<()> {
        let mut errors = Vec::new();

        let email_ok = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !email_ok {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }
        if self.name.chars().count() < 2 {
            errors.push(FieldError::new("name", "must be at least 2 characters"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Validation(errors))
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> [{}]", self.name, self.email, self.role)?;
        if let Some(ref division) = self.division {
            write!(f, " {}", division)?;
        }
        Ok(())
    }
}
