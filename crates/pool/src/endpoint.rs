//! Directory server endpoints

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const LDAP_PORT: u16 = 389;
const LDAPS_PORT: u16 = 636;

/// An `ldap://` or `ldaps://` server URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parse a single endpoint URL.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| Error::configuration(format!("invalid endpoint '{input}': {e}")))?;
        match url.scheme() {
            "ldap" | "ldaps" => {}
            other => {
                return Err(Error::configuration(format!(
                    "unsupported scheme '{other}' in endpoint '{input}'"
                )));
            }
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::configuration(format!(
                "endpoint '{input}' has no host"
            )));
        }
        Ok(Self(url))
    }

    /// Parse a whitespace-separated list such as
    /// `"ldap://a.example ldap://b.example"`.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input.split_whitespace().map(Self::parse).collect()
    }

    /// Host name or address
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Port, defaulting to 389 for `ldap` and 636 for `ldaps`
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port().unwrap_or(if self.is_secure() {
            LDAPS_PORT
        } else {
            LDAP_PORT
        })
    }

    /// Whether the endpoint uses TLS from the start
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.0.scheme() == "ldaps"
    }

    /// The underlying URL
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_host_and_default_port() {
        let ep = Endpoint::parse("ldap://dir.example.org").unwrap();
        assert_eq!(ep.host(), "dir.example.org");
        assert_eq!(ep.port(), 389);
        assert!(!ep.is_secure());

        let ep = Endpoint::parse("ldaps://dir.example.org").unwrap();
        assert_eq!(ep.port(), 636);
        assert!(ep.is_secure());

        let ep = Endpoint::parse("ldap://dir.example.org:10389").unwrap();
        assert_eq!(ep.port(), 10389);
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(Endpoint::parse("http://dir.example.org").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }

    #[test]
    fn parses_space_delimited_list() {
        let list = Endpoint::parse_list(" ldap://a.example  ldap://b.example:1389 ").unwrap();
        let hosts: Vec<_> = list.iter().map(Endpoint::host).collect();
        assert_eq!(hosts, vec!["a.example", "b.example"]);
        assert!(Endpoint::parse_list("ldap://a.example ftp://b.example").is_err());
    }

    #[test]
    fn serde_uses_url_string() {
        let ep: Endpoint = serde_json::from_str("\"ldap://a.example:389\"").unwrap();
        assert_eq!(ep.host(), "a.example");
        assert_eq!(serde_json::to_string(&ep).unwrap(), "\"ldap://a.example:389\"");
        assert!(serde_json::from_str::<Endpoint>("\"mailto:x@y\"").is_err());
    }
}
