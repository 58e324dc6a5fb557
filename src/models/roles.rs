use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staff and reader roles. Privilege is a strict total order:
/// `Viewer < Editor < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

// Ordering table. Rank values are stored nowhere; only their relative order matters.
const ROLE_RANKS: [(Role, u8); 3] = [(Role::Viewer, 0), (Role::Editor, 1), (Role::Admin, 2)];

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Editor, Role::Admin];

    pub fn rank(self) -> u8 {
        ROLE_RANKS
            .iter()
            .find(|(role, _)| *role == self)
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// Every capability this role holds. Grows monotonically with rank.
    pub fn capabilities(self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|cap| has_capability(self, cap.required_role()))
            .collect()
    }

    pub fn can(self, capability: Capability) -> bool {
        has_capability(self, capability.required_role())
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// True iff `user_role` is at least as privileged as `required_role`.
pub fn has_capability(user_role: Role, required_role: Role) -> bool {
    user_role >= required_role
}

/// Named actions gated by role. Handlers check these server-side before any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Comment,
    ViewDrafts,
    EditArticles,
    PublishArticles,
    ManageBookReviews,
    DeleteArticles,
    DeleteAnyComment,
    ManageUsers,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Comment,
        Capability::ViewDrafts,
        Capability::EditArticles,
        Capability::PublishArticles,
        Capability::ManageBookReviews,
        Capability::DeleteArticles,
        Capability::DeleteAnyComment,
        Capability::ManageUsers,
    ];

    pub fn required_role(self) -> Role {
        match self {
            Capability::Comment => Role::Viewer,
            Capability::ViewDrafts
            | Capability::EditArticles
            | Capability::PublishArticles
            | Capability::ManageBookReviews => Role::Editor,
            Capability::DeleteArticles | Capability::DeleteAnyComment | Capability::ManageUsers => {
                Role::Admin
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_has_viewer_capability() {
        assert!(has_capability(Role::Editor, Role::Viewer));
    }

    #[test]
    fn viewer_lacks_admin_capability() {
        assert!(!has_capability(Role::Viewer, Role::Admin));
    }

    #[test]
    fn every_role_satisfies_itself() {
        for role in Role::ALL {
            assert!(has_capability(role, role));
        }
    }

    #[test]
    fn capability_sets_are_nested() {
        let viewer = Role::Viewer.capabilities();
        let editor = Role::Editor.capabilities();
        let admin = Role::Admin.capabilities();

        assert!(viewer.iter().all(|c| editor.contains(c)));
        assert!(editor.iter().all(|c| admin.contains(c)));
        assert_eq!(admin.len(), Capability::ALL.len());
        assert_eq!(viewer, vec![Capability::Comment]);
    }

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" editor ".parse::<Role>(), Ok(Role::Editor));
        assert!("contributor".parse::<Role>().is_err());
    }

    #[test]
    fn editors_cannot_manage_users() {
        assert!(!Role::Editor.can(Capability::ManageUsers));
        assert!(Role::Editor.can(Capability::PublishArticles));
        assert!(Role::Admin.can(Capability::DeleteArticles));
    }
}
