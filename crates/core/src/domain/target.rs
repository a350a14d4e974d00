use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Where a deployment lands: the login used for `scp`/`ssh` and the
/// directory on the remote host that receives the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    remote_user: String,
    remote_host: String,
    remote_path: String,
}

impl DeploymentTarget {
    pub fn new(
        remote_user: impl Into<String>,
        remote_host: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Result<Self> {
        let remote_user = remote_user.into();
        let remote_host = remote_host.into();
        let remote_path = remote_path.into();

        validate_login_part("remote_user", &remote_user)?;
        validate_host(&remote_host)?;

        if remote_path.trim().is_empty() {
            return Err(CoreError::invalid_target("remote_path", "must not be empty"));
        }
        if remote_path.chars().any(char::is_control) {
            return Err(CoreError::invalid_target(
                "remote_path",
                "must not contain control characters",
            ));
        }

        Ok(Self {
            remote_user,
            remote_host,
            remote_path,
        })
    }

    pub fn remote_user(&self) -> &str {
        &self.remote_user
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// `user@host`, as passed to `ssh`. An IPv6 host is given without its
    /// brackets.
    pub fn login(&self) -> String {
        let host = ipv6_literal(&self.remote_host).unwrap_or(&self.remote_host);
        format!("{}@{}", self.remote_user, host)
    }

    /// `user@host:path/`, as passed to `scp`. The trailing slash makes scp
    /// fail when the remote directory is missing instead of creating a file
    /// named after it. IPv6 hosts keep their brackets so scp can find the
    /// path separator.
    pub fn scp_destination(&self) -> String {
        let path = self.remote_path.trim_end_matches('/');
        format!("{}:{}/", self.bracketed_login(), path)
    }

    fn bracketed_login(&self) -> String {
        format!("{}@{}", self.remote_user, self.remote_host)
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bracketed_login(), self.remote_path)
    }
}

/// The address inside `[...]`, if `host` is written as a bracketed IPv6
/// literal.
fn ipv6_literal(host: &str) -> Option<&str> {
    host.strip_prefix('[')?.strip_suffix(']')
}

fn validate_host(host: &str) -> Result<()> {
    let Some(inner) = ipv6_literal(host) else {
        return validate_login_part("remote_host", host);
    };
    if !inner.contains(':') {
        return Err(CoreError::invalid_target(
            "remote_host",
            "brackets are only allowed around an IPv6 address",
        ));
    }
    if let Some(c) = inner
        .chars()
        .find(|c| !(c.is_ascii_hexdigit() || *c == ':' || *c == '.'))
    {
        return Err(CoreError::invalid_target(
            "remote_host",
            format!("contains invalid IPv6 character {:?}", c),
        ));
    }
    Ok(())
}

fn validate_login_part(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::invalid_target(field, "must not be empty"));
    }
    if value.starts_with('-') {
        return Err(CoreError::invalid_target(field, "must not start with '-'"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '@' || *c == ':')
    {
        let hint = if c == ':' && field == "remote_host" {
            " (write IPv6 addresses as [addr])"
        } else {
            ""
        };
        return Err(CoreError::invalid_target(
            field,
            format!("contains invalid character {:?}{}", c, hint),
        ));
    }
    Ok(())
}
