// Certificate inventory - the user-maintained list of monitored certificates

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a monitored certificate lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CertificateSource {
    /// PEM or DER certificate on the local filesystem
    LocalFile { path: PathBuf },
    /// Leaf certificate presented by a live TLS endpoint
    RemoteHost {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
    },
}

fn default_port() -> u16 {
    443
}

impl fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateSource::LocalFile { path } => write!(f, "{}", path.display()),
            // IPv6 literals are bracketed so the port separator stays readable
            CertificateSource::RemoteHost { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            CertificateSource::RemoteHost { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// A configured reference to a certificate to be monitored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateDescriptor {
    /// Stable unique key, defaults to the source string
    pub id: String,
    /// Human-readable name; falls back to `id` when empty
    #[serde(default)]
    pub label: String,
    /// Per-certificate override of the global warning window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_days: Option<i64>,
    #[serde(flatten)]
    pub source: CertificateSource,
}

impl CertificateDescriptor {
    /// Create a descriptor keyed by its source string
    pub fn new(source: CertificateSource) -> Self {
        Self {
            id: source.to_string(),
            label: String::new(),
            threshold_days: None,
            source,
        }
    }

    /// Set a human-readable label
    pub fn with_label(mut self, label: String) -> Self {
        self.label = label;
        self
    }

    /// Override the global warning threshold for this certificate
    pub fn with_threshold_days(mut self, days: i64) -> Self {
        self.threshold_days = Some(days);
        self
    }

    /// Label to show in output and notifications
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Parse a CLI target into a certificate source
///
/// Anything that exists on disk or looks like a path is a file source;
/// everything else is `host[:port]` with port defaulting to 443. IPv6
/// literals must be bracketed (`[::1]` or `[::1]:8443`) so the port
/// separator is unambiguous.
pub fn parse_target(input: &str) -> Result<CertificateSource> {
    if input.contains('/') || Path::new(input).exists() {
        return Ok(CertificateSource::LocalFile {
            path: PathBuf::from(input),
        });
    }

    if let Some(rest) = input.strip_prefix('[') {
        let Some((host, after)) = rest.split_once(']') else {
            anyhow::bail!("invalid target {}: missing closing ']'", input);
        };
        if host.is_empty() {
            anyhow::bail!("invalid target: {}", input);
        }
        let port = match after {
            "" => 443,
            _ => after
                .strip_prefix(':')
                .ok_or_else(|| anyhow::anyhow!("invalid target: {}", input))?
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid port in {}: {}", input, e))?,
        };
        return Ok(CertificateSource::RemoteHost {
            host: host.to_string(),
            port,
        });
    }

    if input.matches(':').count() > 1 {
        anyhow::bail!(
            "ambiguous target {}: bracket IPv6 addresses as [address] or [address]:port",
            input
        );
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        if host.is_empty() {
            anyhow::bail!("invalid target: {}", input);
        }
        let port = port_str
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("invalid port in {}: {}", input, e))?;
        Ok(CertificateSource::RemoteHost {
            host: host.to_string(),
            port,
        })
    } else {
        Ok(CertificateSource::RemoteHost {
            host: input.to_string(),
            port: 443,
        })
    }
}

/// Ordered set of monitored certificates, unique by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateInventory {
    descriptors: Vec<CertificateDescriptor>,
}

impl CertificateInventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting duplicate ids
    pub fn add(&mut self, descriptor: CertificateDescriptor) -> Result<()> {
        if self.get(&descriptor.id).is_some() {
            anyhow::bail!("certificate {} is already monitored", descriptor.id);
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Remove a descriptor by id
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| d.id != id);
        if self.descriptors.len() == before {
            anyhow::bail!("no monitored certificate with id {}", id);
        }
        Ok(())
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: &str) -> Option<&CertificateDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// Iterate over all descriptors
    pub fn iter(&self) -> impl Iterator<Item = &CertificateDescriptor> {
        self.descriptors.iter()
    }

    /// Get count of descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the inventory is empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl<'a> IntoIterator for &'a CertificateInventory {
    type Item = &'a CertificateDescriptor;
    type IntoIter = std::slice::Iter<'a, CertificateDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
