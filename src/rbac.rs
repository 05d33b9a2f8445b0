use crate::types::Role;

/// Roles allowed to hold a session in the student client.
pub const STUDENT_ROLES: &[&str] = &["STUDENT"];

/// Checks whether a role may use the student client.
///
/// This is a second line of defense; the API is expected to refuse sessions
/// for other roles already.
#[must_use]
pub fn is_student_role(role: Option<&Role>) -> bool {
    role.is_some_and(|r| STUDENT_ROLES.contains(&r.as_str()))
}

/// Role allow-list used by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    allowed: Vec<String>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            allowed: STUDENT_ROLES.iter().map(|r| (*r).to_owned()).collect(),
        }
    }
}

impl RolePolicy {
    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: roles.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, role: &Role) -> bool {
        self.allowed.iter().any(|r| r == role.as_str())
    }
}
