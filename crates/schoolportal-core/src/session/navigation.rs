use crate::api::UserProfile;

/// Where the front end should go after login, decided from account linkage.
///
/// | students | schools | target |
/// |---|---|---|
/// | yes | yes | `RoleSelect` |
/// | yes | no | `Parent` |
/// | no | yes | `Teacher` |
/// | no | no | `Stay` (an alert is raised) |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTarget {
    RoleSelect,
    Parent,
    Teacher,
    /// Do not navigate; the caller should send the user back to login
    Stay,
}

impl NavigationTarget {
    pub fn from_profile(profile: &UserProfile) -> Self {
        match (profile.has_students(), profile.has_schools()) {
            (true, true) => NavigationTarget::RoleSelect,
            (true, false) => NavigationTarget::Parent,
            (false, true) => NavigationTarget::Teacher,
            (false, false) => NavigationTarget::Stay,
        }
    }

    /// Route name used by the front end; empty for `Stay`
    pub fn route(&self) -> &'static str {
        match self {
            NavigationTarget::RoleSelect => "role-select",
            NavigationTarget::Parent => "parent",
            NavigationTarget::Teacher => "teacher",
            NavigationTarget::Stay => "",
        }
    }

    pub fn should_navigate(&self) -> bool {
        *self != NavigationTarget::Stay
    }
}
