use std::fmt;

/// Environment variable read for a bearer token when a remote names none.
pub const DEFAULT_TOKEN_ENV: &str = "QUARRY_TOKEN";

/// Credentials presented to a remote.
///
/// Tokens are read from the environment at use time and never written to
/// configuration files.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Anonymous,
    Bearer(String),
}

impl Credentials {
    /// Read a bearer token from `var`. An unset or empty variable yields
    /// [`Credentials::Anonymous`].
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Self::Bearer(token.trim().to_string()),
            _ => Self::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            Self::Anonymous => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer-token",
            Self::Anonymous => "anonymous",
        }
    }
}

// Never print the token itself.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_not_authenticated() {
        assert!(!Credentials::Anonymous.is_authenticated());
        assert_eq!(Credentials::Anonymous.bearer_token(), None);
    }

    #[test]
    fn bearer_is_authenticated() {
        let c = Credentials::Bearer("s3cret".into());
        assert!(c.is_authenticated());
        assert_eq!(c.bearer_token(), Some("s3cret"));
    }

    #[test]
    fn debug_hides_token() {
        let c = Credentials::Bearer("s3cret".into());
        assert_eq!(format!("{c:?}"), "bearer-token");
    }

    #[test]
    fn unset_variable_is_anonymous() {
        let c = Credentials::from_env("QUARRY_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(c, Credentials::Anonymous);
    }

    #[test]
    fn default_is_anonymous() {
        assert_eq!(Credentials::default(), Credentials::Anonymous);
    }
}
