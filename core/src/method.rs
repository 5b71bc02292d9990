//! Static descriptions of remote operations.

/// Parameters the client appends on its own: `method`, `api_key`, `v`,
/// `call_id`, `session_key` and `sig`.
pub const AUTO_APPENDED_PARAMS: usize = 6;

/// Immutable metadata about one remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    name: &'static str,
    requires_session: bool,
    takes_file: bool,
    param_count: usize,
}

impl MethodDescriptor {
    /// A sessionless, form-encoded operation taking `param_count` caller
    /// parameters.
    pub const fn new(name: &'static str, param_count: usize) -> Self {
        Self {
            name,
            requires_session: false,
            takes_file: false,
            param_count,
        }
    }

    pub const fn with_session(mut self) -> Self {
        self.requires_session = true;
        self
    }

    pub const fn with_file(mut self) -> Self {
        self.takes_file = true;
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn requires_session(&self) -> bool {
        self.requires_session
    }

    pub const fn takes_file(&self) -> bool {
        self.takes_file
    }

    pub const fn param_count(&self) -> usize {
        self.param_count
    }

    /// Upper bound on the size of the final parameter set.
    pub const fn total_params(&self) -> usize {
        self.param_count + AUTO_APPENDED_PARAMS
    }
}

/// Operations used by the built-in wrappers.
pub mod methods {
    use super::MethodDescriptor;

    pub const AUTH_CREATE_TOKEN: MethodDescriptor =
        MethodDescriptor::new("facebook.auth.createToken", 0);
    pub const AUTH_GET_SESSION: MethodDescriptor =
        MethodDescriptor::new("facebook.auth.getSession", 1);

    pub const USERS_GET_LOGGED_IN_USER: MethodDescriptor =
        MethodDescriptor::new("facebook.users.getLoggedInUser", 0).with_session();
    pub const USERS_IS_APP_ADDED: MethodDescriptor =
        MethodDescriptor::new("facebook.users.isAppAdded", 0).with_session();
    pub const USERS_HAS_APP_PERMISSION: MethodDescriptor =
        MethodDescriptor::new("facebook.users.hasAppPermission", 1).with_session();

    pub const FQL_QUERY: MethodDescriptor =
        MethodDescriptor::new("facebook.fql.query", 1).with_session();

    pub const PHOTOS_UPLOAD: MethodDescriptor = MethodDescriptor::new("facebook.photos.upload", 2)
        .with_session()
        .with_file();

    pub const DATA_GET_USER_PREFERENCE: MethodDescriptor =
        MethodDescriptor::new("facebook.data.getUserPreference", 1).with_session();
    pub const DATA_GET_USER_PREFERENCES: MethodDescriptor =
        MethodDescriptor::new("facebook.data.getUserPreferences", 0).with_session();
    pub const DATA_SET_USER_PREFERENCE: MethodDescriptor =
        MethodDescriptor::new("facebook.data.setUserPreference", 2).with_session();
    pub const DATA_SET_USER_PREFERENCES: MethodDescriptor =
        MethodDescriptor::new("facebook.data.setUserPreferences", 2).with_session();
}

#[cfg(test)]
mod tests {
    use super::methods::*;
    use super::*;

    #[test]
    fn builders_set_flags() {
        assert!(!AUTH_GET_SESSION.requires_session());
        assert!(!AUTH_GET_SESSION.takes_file());
        assert!(PHOTOS_UPLOAD.requires_session());
        assert!(PHOTOS_UPLOAD.takes_file());
        assert!(!FQL_QUERY.takes_file());
    }

    #[test]
    fn total_params_includes_auto_appended() {
        assert_eq!(AUTH_CREATE_TOKEN.total_params(), AUTO_APPENDED_PARAMS);
        assert_eq!(PHOTOS_UPLOAD.total_params(), 2 + AUTO_APPENDED_PARAMS);
    }
}
