//! Instance template: the immutable launch recipe for every worker.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bootstrap::BootstrapSequence;
use crate::error::ConfigurationError;
use crate::network::NetworkPolicy;

/// Compute size class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InstanceClass {
    T3Micro,
    T3Small,
    T3Medium,
    T3Large,
    T3XLarge,
    #[default]
    T32XLarge,
}

impl InstanceClass {
    pub const ALL: [InstanceClass; 6] = [
        Self::T3Micro,
        Self::T3Small,
        Self::T3Medium,
        Self::T3Large,
        Self::T3XLarge,
        Self::T32XLarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::T3Micro => "t3.micro",
            Self::T3Small => "t3.small",
            Self::T3Medium => "t3.medium",
            Self::T3Large => "t3.large",
            Self::T3XLarge => "t3.xlarge",
            Self::T32XLarge => "t3.2xlarge",
        }
    }

    pub fn vcpus(&self) -> u32 {
        match self {
            Self::T3Micro | Self::T3Small | Self::T3Medium | Self::T3Large => 2,
            Self::T3XLarge => 4,
            Self::T32XLarge => 8,
        }
    }

    pub fn memory_mib(&self) -> u64 {
        match self {
            Self::T3Micro => 1024,
            Self::T3Small => 2048,
            Self::T3Medium => 4096,
            Self::T3Large => 8192,
            Self::T3XLarge => 16384,
            Self::T32XLarge => 32768,
        }
    }
}

impl FromStr for InstanceClass {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigurationError::UnknownInstanceClass(s.to_string()))
    }
}

impl TryFrom<String> for InstanceClass {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InstanceClass> for String {
    fn from(c: InstanceClass) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for InstanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_identifier(kind: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigurationError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Opaque machine-image identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigurationError> {
        let id = id.into();
        check_identifier("image", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageId {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque access-credential (key pair) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialRef(String);

impl CredentialRef {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigurationError> {
        let id = id.into();
        check_identifier("credential", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CredentialRef {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CredentialRef> for String {
    fn from(id: CredentialRef) -> Self {
        id.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network and subnet every worker is placed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Placement {
    network_id: String,
    subnet_id: String,
}

impl Placement {
    pub fn new(
        network_id: impl Into<String>,
        subnet_id: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let network_id = network_id.into();
        let subnet_id = subnet_id.into();
        check_identifier("network", &network_id)?;
        check_identifier("subnet", &subnet_id)?;
        Ok(Self {
            network_id,
            subnet_id,
        })
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn subnet_id(&self) -> &str {
        &self.subnet_id
    }
}

/// Fully materialized startup script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BootstrapPayload(String);

impl BootstrapPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Standard base64, the encoding cloud user-data fields expect.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0.as_bytes())
    }

    /// Hex SHA-256 of the script, used to tag instances with their template.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for BootstrapPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Launch recipe shared read-only by every worker of the fleet.
///
/// Construction is pure: it never touches a compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceTemplate {
    instance_class: InstanceClass,
    image: ImageId,
    credential: CredentialRef,
    placement: Placement,
    network: NetworkPolicy,
    bootstrap: BootstrapSequence,
}

impl InstanceTemplate {
    pub fn new(
        instance_class: InstanceClass,
        image: ImageId,
        credential: CredentialRef,
        placement: Placement,
        network: NetworkPolicy,
        bootstrap: BootstrapSequence,
    ) -> Self {
        Self {
            instance_class,
            image,
            credential,
            placement,
            network,
            bootstrap,
        }
    }

    pub fn instance_class(&self) -> InstanceClass {
        self.instance_class
    }

    pub fn image(&self) -> &ImageId {
        &self.image
    }

    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn network(&self) -> &NetworkPolicy {
        &self.network
    }

    pub fn bootstrap(&self) -> &BootstrapSequence {
        &self.bootstrap
    }

    /// Render the startup payload. Identical templates render identical bytes.
    pub fn render(&self) -> BootstrapPayload {
        BootstrapPayload(self.bootstrap.render())
    }
}
