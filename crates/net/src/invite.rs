//! Invite URL generation and parsing
//!
//! Invite format: poker://<host>:<port>/<CODE>

use std::fmt;
use std::str::FromStr;

use poker_core::InviteCode;

use crate::error::{Error, Result};
use crate::DEFAULT_PORT;

const SCHEME: &str = "poker://";

/// A shareable link to a game on a specific server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteUrl {
    pub host: String,
    pub port: u16,
    pub code: InviteCode,
}

impl InviteUrl {
    pub fn new(host: impl Into<String>, port: u16, code: InviteCode) -> Self {
        Self {
            host: host.into(),
            port,
            code,
        }
    }

    /// Link for `code` on a server given as `host[:port]`
    pub fn for_server(server: &str, code: InviteCode) -> Result<Self> {
        let (host, port) = split_authority(server.trim())?;
        Ok(Self { host, port, code })
    }

    /// `host:port`, suitable for connecting
    pub fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Format as URL string
    pub fn to_url(&self) -> String {
        format!("{}{}:{}/{}", SCHEME, self.host, self.port, self.code)
    }

    /// Parse from URL string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::InvalidInvite(format!("missing {} prefix", SCHEME)))?;

        let (authority, code) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidInvite("expected host:port/CODE".into()))?;
        let code = code.trim_end_matches('/');

        let (host, port) = split_authority(authority)?;
        let code = InviteCode::parse(code)
            .map_err(|_| Error::InvalidInvite(format!("bad invite code '{}'", code)))?;

        Ok(Self { host, port, code })
    }
}

/// Split `host[:port]`, keeping IPv6 brackets on the host
fn split_authority(authority: &str) -> Result<(String, u16)> {
    if authority.is_empty() {
        return Err(Error::InvalidInvite("missing host".into()));
    }

    let port_sep = if authority.starts_with('[') {
        authority
            .find(']')
            .ok_or_else(|| Error::InvalidInvite(format!("bad address '{}'", authority)))?
            + 1
    } else {
        0
    };

    match authority[port_sep..].rfind(':') {
        Some(idx) => {
            let idx = port_sep + idx;
            let port = authority[idx + 1..]
                .parse::<u16>()
                .map_err(|_| Error::InvalidInvite(format!("bad port in '{}'", authority)))?;
            let host = &authority[..idx];
            if host.is_empty() {
                return Err(Error::InvalidInvite("missing host".into()));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), DEFAULT_PORT)),
    }
}

impl fmt::Display for InviteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

impl FromStr for InviteUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// What a user pasted to join: a full link or just the code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteTarget {
    Url(InviteUrl),
    Code(InviteCode),
}

impl InviteTarget {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with(SCHEME) {
            return InviteUrl::parse(s).map(InviteTarget::Url);
        }
        InviteCode::parse(s)
            .map(InviteTarget::Code)
            .map_err(|_| Error::InvalidInvite(format!("'{}' is not an invite code or link", s)))
    }

    pub fn code(&self) -> &InviteCode {
        match self {
            InviteTarget::Url(url) => &url.code,
            InviteTarget::Code(code) => code,
        }
    }

    /// Server named by the link, if any
    pub fn server(&self) -> Option<String> {
        match self {
            InviteTarget::Url(url) => Some(url.server()),
            InviteTarget::Code(_) => None,
        }
    }
}
