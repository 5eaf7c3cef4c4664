//! Action names.

use std::fmt;

/// Drains the HTTP event buffer. Answered by the HTTP transport itself.
pub const GET_LATEST_EVENTS: &str = "get_latest_events";
/// Lists every registered action. Built into the router.
pub const GET_SUPPORTED_ACTIONS: &str = "get_supported_actions";
pub const GET_STATUS: &str = "get_status";
pub const GET_VERSION: &str = "get_version";
pub const SEND_MESSAGE: &str = "send_message";
pub const DELETE_MESSAGE: &str = "delete_message";
pub const GET_SELF_INFO: &str = "get_self_info";
pub const GET_USER_INFO: &str = "get_user_info";
pub const GET_FRIEND_LIST: &str = "get_friend_list";
pub const GET_GROUP_INFO: &str = "get_group_info";
pub const GET_GROUP_LIST: &str = "get_group_list";
pub const GET_GROUP_MEMBER_INFO: &str = "get_group_member_info";
pub const GET_GROUP_MEMBER_LIST: &str = "get_group_member_list";

/// A core or extended action name.
///
/// Extended actions carry a platform prefix and render as
/// `<prefix>_<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionName {
    prefix: Option<String>,
    name: String,
}

impl ActionName {
    /// A core action name.
    pub fn core(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
        }
    }

    /// An extended action name under `prefix`.
    pub fn extended(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            name: name.into(),
        }
    }

    /// The extension prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The name without its prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_extended(&self) -> bool {
        self.prefix.is_some()
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}_{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<ActionName> for String {
    fn from(name: ActionName) -> Self {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ActionName::core(GET_STATUS).to_string(), "get_status");
        let ext = ActionName::extended("qq", "set_title");
        assert!(ext.is_extended());
        assert_eq!(ext.prefix(), Some("qq"));
        assert_eq!(ext.to_string(), "qq_set_title");
    }
}
