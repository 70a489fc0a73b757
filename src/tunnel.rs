use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::Serialize;

use crate::errors::AppError;

pub const DEFAULT_LOCAL_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// One local endpoint bridged to one host reachable from inside the cluster.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct Tunnel {
    pub local_host: IpAddr,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl Tunnel {
    pub fn new(local_port: u16, remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            local_host: DEFAULT_LOCAL_HOST,
            local_port,
            remote_host: remote_host.into(),
            remote_port,
        }
    }

    pub fn with_local_host(self, local_host: IpAddr) -> Self {
        Self { local_host, ..self }
    }

    pub fn local_endpoint(&self) -> String {
        format!("{}:{}", self.local_host, self.local_port)
    }

    pub fn remote_endpoint(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

impl fmt::Display for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local_endpoint(), self.remote_endpoint())
    }
}

/// Parses `[localHost:]localPort:remoteHost:remotePort`.
impl FromStr for Tunnel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (local_host, local_port, remote_host, remote_port) = match parts.as_slice() {
            [lp, rh, rp] => (DEFAULT_LOCAL_HOST, *lp, *rh, *rp),
            [lh, lp, rh, rp] => {
                let host = lh.parse::<IpAddr>().map_err(|_| {
                    AppError::Cli(format!(
                        "invalid tunnel {s:?}: local host {lh:?} is not an IP address"
                    ))
                })?;
                (host, *lp, *rh, *rp)
            }
            _ => {
                return Err(AppError::Cli(format!(
                    "invalid tunnel {s:?}: expected [LOCAL_HOST:]LOCAL_PORT:REMOTE_HOST:REMOTE_PORT"
                )))
            }
        };

        if remote_host.is_empty() {
            return Err(AppError::Cli(format!(
                "invalid tunnel {s:?}: remote host is empty"
            )));
        }
        if remote_host.parse::<IpAddr>().is_err() && !is_dns_name(remote_host) {
            return Err(AppError::Cli(format!(
                "invalid tunnel {s:?}: remote host {remote_host:?} is neither a DNS name nor an IP address"
            )));
        }

        Ok(Self {
            local_host,
            local_port: parse_port(s, "local", local_port)?,
            remote_host: remote_host.to_string(),
            remote_port: parse_port(s, "remote", remote_port)?,
        })
    }
}

fn parse_port(tunnel: &str, which: &str, raw: &str) -> Result<u16, AppError> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(AppError::Cli(format!(
            "invalid tunnel {tunnel:?}: {which} port {raw:?} must be 1-65535"
        ))),
        Ok(port) => Ok(port),
    }
}

/// RFC 1123 host name: dot-separated labels of alphanumerics and inner hyphens.
fn is_dns_name(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}
