//! Per-connection session.
//!
//! Built once when a client connects and handed to every handler, so role
//! and voter identity are never re-derived from request fragments later on.

use crate::types::{is_valid_voter_id, Role, VoterId};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub role: Role,
    pub voter_id: Option<VoterId>,
}

impl Session {
    /// Build from connection parameters. Admin role is only granted on routes
    /// that passed admin authentication; malformed voter ids are dropped.
    pub fn from_params(role: Option<&str>, voter: Option<&str>) -> Self {
        let role = match role {
            Some("admin") => Role::Admin,
            _ => Role::Audience,
        };

        let voter_id = voter
            .map(str::trim)
            .filter(|v| is_valid_voter_id(v))
            .map(str::to_string);

        if voter.is_some() && voter_id.is_none() {
            tracing::warn!("Ignoring malformed voter id on connect");
        }

        Self { role, voter_id }
    }

    pub fn audience(voter_id: &str) -> Self {
        Self::from_params(None, Some(voter_id))
    }

    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            voter_id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
