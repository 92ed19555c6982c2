//! Ingress network policy applied identically to every worker.
//!
//! Rules are additive only: an empty policy admits nothing, and there is no
//! deny list. A policy is assembled once through [`NetworkPolicyBuilder`] and
//! is immutable afterwards.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Transport protocol an ingress rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

impl FromStr for Protocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            _ => Err(ValidationError::UnknownProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive port range. `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PortRangeSpec")]
pub struct PortRange {
    from: u16,
    to: u16,
}

/// Unvalidated wire form of a [`PortRange`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PortRangeSpec {
    pub from: i64,
    pub to: i64,
}

impl PortRange {
    /// Create a validated range.
    pub fn new(from: u16, to: u16) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidPortRange {
                from: from.into(),
                to: to.into(),
            });
        }
        Ok(Self { from, to })
    }

    /// A single port.
    pub fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    /// Every port.
    pub fn all() -> Self {
        Self {
            from: 0,
            to: u16::MAX,
        }
    }

    pub fn start(&self) -> u16 {
        self.from
    }

    pub fn end(&self) -> u16 {
        self.to
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.from..=self.to).contains(&port)
    }

    /// Number of ports covered.
    pub fn port_count(&self) -> u32 {
        u32::from(self.to) - u32::from(self.from) + 1
    }
}

impl TryFrom<(i64, i64)> for PortRange {
    type Error = ValidationError;

    fn try_from((from, to): (i64, i64)) -> Result<Self, Self::Error> {
        let invalid = || ValidationError::InvalidPortRange { from, to };
        let lo = u16::try_from(from).map_err(|_| invalid())?;
        let hi = u16::try_from(to).map_err(|_| invalid())?;
        Self::new(lo, hi)
    }
}

impl TryFrom<PortRangeSpec> for PortRange {
    type Error = ValidationError;

    fn try_from(raw: PortRangeSpec) -> Result<Self, Self::Error> {
        Self::try_from((raw.from, raw.to))
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            f.pad(&self.from.to_string())
        } else {
            f.pad(&format!("{}-{}", self.from, self.to))
        }
    }
}

/// An IPv4 or IPv6 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// `0.0.0.0/0`, the unrestricted IPv4 source.
    pub const ANY_V4: Cidr = Cidr {
        addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        prefix: 0,
    };

    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, ValidationError> {
        let width = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > width {
            return Err(ValidationError::InvalidCidr(format!("{addr}/{prefix}")));
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether the block admits every address of its family.
    pub fn is_unrestricted(&self) -> bool {
        self.prefix == 0
    }

    /// Whether `ip` falls inside the block. Addresses of the other family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Cidr {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Cidr> for String {
    fn from(c: Cidr) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// A single ingress permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub ports: PortRange,
    pub source: Cidr,
}

impl IngressRule {
    /// Whether this rule admits `protocol` traffic on `port` from `source`.
    /// ICMP has no ports, so only protocol and source are compared.
    pub fn admits(&self, protocol: Protocol, port: u16, source: IpAddr) -> bool {
        self.protocol == protocol
            && (protocol == Protocol::Icmp || self.ports.contains(port))
            && self.source.contains(source)
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} from {}", self.protocol, self.ports, self.source)
    }
}

/// Set of ingress rules shared by the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<IngressRule>", into = "Vec<IngressRule>")]
pub struct NetworkPolicy {
    rules: Vec<IngressRule>,
}

/// Well-known ports of the reference deployment.
pub mod ports {
    /// Remote shell.
    pub const SSH: u16 = 22;
    /// Web service.
    pub const HTTP: u16 = 80;
    /// Worker control endpoint (start test, check status).
    pub const WORKER_CONTROL: u16 = 5000;
    /// Worker application port.
    pub const WORKER_APP: u16 = 8000;
    /// Worker auxiliary HTTP port.
    pub const WORKER_AUX: u16 = 8080;
}

impl NetworkPolicy {
    pub fn builder() -> NetworkPolicyBuilder {
        NetworkPolicyBuilder::default()
    }

    /// Policy that admits nothing.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// The reference rule set (remote shell, web, and the three worker
    /// ports, all tcp) admitted from `source`.
    ///
    /// The reference deployment uses `0.0.0.0/0`; pass a narrower block to
    /// restrict it.
    pub fn reference(source: Cidr) -> Self {
        [
            ports::SSH,
            ports::HTTP,
            ports::WORKER_CONTROL,
            ports::WORKER_APP,
            ports::WORKER_AUX,
        ]
        .into_iter()
        .fold(Self::builder(), |b, port| {
            b.allow_rule(IngressRule {
                protocol: Protocol::Tcp,
                ports: PortRange::single(port),
                source,
            })
        })
        .build()
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule admits the given traffic.
    pub fn permits(&self, protocol: Protocol, port: u16, source: IpAddr) -> bool {
        self.rules.iter().any(|r| r.admits(protocol, port, source))
    }

    /// Whether any source at all can reach this port.
    pub fn exposes(&self, protocol: Protocol, port: u16) -> bool {
        self.rules
            .iter()
            .any(|r| r.protocol == protocol && r.ports.contains(port))
    }
}

impl From<Vec<IngressRule>> for NetworkPolicy {
    fn from(rules: Vec<IngressRule>) -> Self {
        rules
            .into_iter()
            .fold(NetworkPolicyBuilder::default(), NetworkPolicyBuilder::allow_rule)
            .build()
    }
}

impl From<NetworkPolicy> for Vec<IngressRule> {
    fn from(policy: NetworkPolicy) -> Self {
        policy.rules
    }
}

/// Accumulates validated ingress rules.
#[derive(Debug, Default)]
pub struct NetworkPolicyBuilder {
    rules: Vec<IngressRule>,
}

impl NetworkPolicyBuilder {
    /// Parse and append a rule.
    pub fn allow(
        self,
        protocol: &str,
        ports: (i64, i64),
        source: &str,
    ) -> Result<Self, ValidationError> {
        let rule = IngressRule {
            protocol: protocol.parse()?,
            ports: PortRange::try_from(ports)?,
            source: source.parse()?,
        };
        Ok(self.allow_rule(rule))
    }

    /// Append an already-validated rule. Duplicates are dropped.
    pub fn allow_rule(mut self, rule: IngressRule) -> Self {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    pub fn build(self) -> NetworkPolicy {
        NetworkPolicy { rules: self.rules }
    }
}
