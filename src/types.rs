/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which table an authenticated identity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Student,
    Admin,
}

impl AccountKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(AccountKind::Student),
            "admin" => Some(AccountKind::Admin),
            _ => None,
        }
    }
}

/// Role carried in access-token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn is_super_admin(self) -> bool {
        self == Role::SuperAdmin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        };
        f.write_str(s)
    }
}

/// Privilege tier stored on the admin row. `Super` replaces the old
/// convention of embedding a marker in the admin id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminTier {
    Admin,
    Super,
}

impl AdminTier {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminTier::Admin => "admin",
            AdminTier::Super => "super",
        }
    }

    /// Unknown values fall back to the unprivileged tier.
    pub fn from_column(raw: &str) -> Self {
        if raw == "super" {
            AdminTier::Super
        } else {
            AdminTier::Admin
        }
    }

    pub fn role(self) -> Role {
        match self {
            AdminTier::Admin => Role::Admin,
            AdminTier::Super => Role::SuperAdmin,
        }
    }
}
