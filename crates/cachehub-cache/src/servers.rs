//! Server list parsing and weighted key distribution.

#[cfg(feature = "memcached")]
use std::hash::Hasher;

#[cfg(feature = "memcached")]
use fnv::FnvHasher;

use cachehub_core::error::CacheError;
use cachehub_core::result::CacheResult;

/// Default Memcached port.
pub const MEMCACHED_PORT: u16 = 11211;

/// Largest accepted server weight.
pub const MAX_WEIGHT: u32 = 100;

/// Default Redis port.
pub const REDIS_PORT: u16 = 6379;

/// One configured server: `host[:port[:weight]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Relative share of keys routed to this server.
    pub weight: u32,
}

impl ServerSpec {
    /// `host:port`, with IPv6 hosts bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address(), self.weight)
    }
}

impl ServerSpec {
    /// Parse `host[:port[:weight]]`, using `default_port` when none is given.
    pub fn parse(s: &str, default_port: u16) -> CacheResult<Self> {
        let s = s.trim();
        let invalid = |why: &str| CacheError::configuration(format!("Invalid server '{s}': {why}"));

        let (host, rest) = if let Some(stripped) = s.strip_prefix('[') {
            let end = stripped.find(']').ok_or_else(|| invalid("unclosed IPv6 bracket"))?;
            let rest = &stripped[end + 1..];
            let rest = match rest.strip_prefix(':') {
                Some(rest) => rest,
                None if rest.is_empty() => rest,
                None => return Err(invalid("expected ':' after IPv6 address")),
            };
            (&stripped[..end], rest)
        } else {
            match s.split_once(':') {
                Some((host, rest)) => (host, rest),
                None => (s, ""),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let mut parts = rest.split(':').filter(|p| !p.is_empty());
        let port = match parts.next() {
            Some(port) => port.parse().map_err(|_| invalid("bad port"))?,
            None => default_port,
        };
        let weight = match parts.next() {
            Some(weight) => weight.parse().map_err(|_| invalid("bad weight"))?,
            None => 1,
        };
        if parts.next().is_some() {
            return Err(invalid("too many fields"));
        }
        if weight == 0 || weight > MAX_WEIGHT {
            return Err(invalid(&format!("weight must be between 1 and {MAX_WEIGHT}")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            weight,
        })
    }
}

/// Parse every entry of a configured server list.
pub fn parse_servers(list: &[String], default_port: u16) -> CacheResult<Vec<ServerSpec>> {
    list.iter().map(|s| ServerSpec::parse(s, default_port)).collect()
}

/// Routes keys to servers in proportion to their weights.
#[cfg(feature = "memcached")]
#[derive(Debug, Clone)]
pub struct ServerRing {
    /// Each server index repeated `weight` times.
    slots: Vec<usize>,
}

#[cfg(feature = "memcached")]
impl ServerRing {
    /// Build a ring over `servers`.
    pub fn new(servers: &[ServerSpec]) -> Self {
        let slots = servers
            .iter()
            .enumerate()
            .flat_map(|(index, spec)| std::iter::repeat_n(index, spec.weight as usize))
            .collect();
        Self { slots }
    }

    /// Index of the server owning `key`.
    pub fn pick(&self, key: &str) -> usize {
        if self.slots.len() <= 1 {
            return self.slots.first().copied().unwrap_or(0);
        }
        let mut hasher = FnvHasher::default();
        hasher.write(key.as_bytes());
        // high bits of FNV-1a are better mixed than the low ones
        self.slots[((hasher.finish() >> 32) % self.slots.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let spec = ServerSpec::parse("cache1", MEMCACHED_PORT).unwrap();
        assert_eq!((spec.host.as_str(), spec.port, spec.weight), ("cache1", 11211, 1));

        let spec = ServerSpec::parse("redis1", REDIS_PORT).unwrap();
        assert_eq!(spec.address(), "redis1:6379");

        let spec = ServerSpec::parse("10.0.0.2:11311:3", MEMCACHED_PORT).unwrap();
        assert_eq!((spec.host.as_str(), spec.port, spec.weight), ("10.0.0.2", 11311, 3));

        let spec = ServerSpec::parse("10.0.0.3:11211:100", MEMCACHED_PORT).unwrap();
        assert_eq!(spec.weight, MAX_WEIGHT);

        let spec = ServerSpec::parse("[::1]:11212", MEMCACHED_PORT).unwrap();
        assert_eq!(spec.address(), "[::1]:11212");
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", ":11211", "host:port", "host:1:0", "host:1:2:3", "[::1", "host:1:101", "host:1:4294967295"] {
            assert!(ServerSpec::parse(bad, MEMCACHED_PORT).is_err(), "accepted {bad:?}");
        }
    }

    #[cfg(feature = "memcached")]
    #[test]
    fn test_ring_respects_weights() {
        let servers = parse_servers(&["a:1:1".to_string(), "b:1:3".to_string()], MEMCACHED_PORT).unwrap();
        let ring = ServerRing::new(&servers);
        let mut counts = [0usize; 2];
        for i in 0..4000 {
            counts[ring.pick(&format!("key-{i}"))] += 1;
        }
        assert!(counts[1] > counts[0] * 2, "{counts:?}");
    }

    #[cfg(feature = "memcached")]
    #[test]
    fn test_ring_is_deterministic() {
        let servers = parse_servers(&["a".to_string(), "b".to_string(), "c".to_string()], MEMCACHED_PORT).unwrap();
        let ring = ServerRing::new(&servers);
        assert_eq!(ring.pick("session:1"), ring.pick("session:1"));
    }
}
