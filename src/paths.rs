//! Request paths, storage keys and help text exposed to the host router.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::CONFIG_KEY;
use crate::error::{BrokerError, Result};

pub const USERS_PREFIX: &str = "users";
pub const TOKENS_PREFIX: &str = "tokens";

// Same shape the host accepts for a generic `{name}` path segment.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w(([\w.-]+)?\w)?$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// Reject names the host would not route to `users/{name}` or `tokens/{name}`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(BrokerError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Storage key of a user inventory record, e.g. `users/alice`.
pub fn user_key(username: &str) -> String {
    format!("{USERS_PREFIX}/{username}")
}

pub fn token_path(name: &str) -> String {
    format!("{TOKENS_PREFIX}/{name}")
}

/// `users/alice` -> `alice`.
pub fn parse_username_from_path(path: &str) -> &str {
    path.strip_prefix(USERS_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// `tokens/ci` -> `ci`.
pub fn parse_token_name_from_path(path: &str) -> &str {
    path.strip_prefix(TOKENS_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// Storage paths holding sensitive material, for hosts that seal-wrap.
pub fn seal_wrap_paths() -> Vec<String> {
    vec![
        CONFIG_KEY.to_string(),
        format!("{USERS_PREFIX}/*"),
        format!("{TOKENS_PREFIX}/*"),
    ]
}

pub const BACKEND_HELP: &str = "\
The Jenkins secrets backend dynamically generates users and API tokens.
After mounting this backend, credentials to manage Jenkins users and tokens
must be configured with the \"config\" endpoint.";

pub const CONFIG_HELP_SYNOPSIS: &str = "Configure the Jenkins backend.";
pub const CONFIG_HELP_DESCRIPTION: &str = "\
The Jenkins secrets backend requires credentials for managing
ephemeral users and API tokens for the configured user.";

pub const USERS_HELP_SYNOPSIS: &str = "Create a Jenkins user.";
pub const USERS_HELP_DESCRIPTION: &str = "\
This path generates a Jenkins user using the admin user configured
under the config endpoint.";

pub const USERS_LIST_HELP_SYNOPSIS: &str = "List Jenkins users.";
pub const USERS_LIST_HELP_DESCRIPTION: &str = "List all Jenkins users created under the users endpoint.";

pub const TOKENS_HELP_SYNOPSIS: &str = "Generate a Jenkins API token for the configured user.";
pub const TOKENS_HELP_DESCRIPTION: &str = "\
This path generates a Jenkins API token for the user configured under the
config endpoint. Every read creates a new token.";
