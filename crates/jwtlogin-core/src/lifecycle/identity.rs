use tracing::warn;

use crate::auth::{ClaimSet, SessionRecord};

/// What the home view shows about the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub name: String,
    pub role: String,
}

impl From<&ClaimSet> for Identity {
    fn from(claims: &ClaimSet) -> Self {
        Self {
            name: claims.full_name.clone(),
            role: claims.role.clone(),
        }
    }
}

/// Identity for a store value, or `None` when the current one should be kept.
///
/// An empty slot projects to the empty identity; an undecodable token
/// leaves the projection where it was.
pub fn project(value: Option<&SessionRecord>) -> Option<Identity> {
    let Some(record) = value else {
        return Some(Identity::default());
    };

    match record.claims() {
        Ok(claims) => Some(Identity::from(&claims)),
        Err(e) => {
            warn!(error = %e, "Ignoring session with undecodable token");
            None
        }
    }
}
