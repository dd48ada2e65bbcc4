//! Environment value types, generators and global references

use crate::error::{CtmnError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Prefix of a reference into the global section
pub const GLOBAL_REFERENCE_PREFIX: &str = "global";

/// Section of an exported namespace holding generated values
pub const GENERATED_SECTION: &str = "generated";

/// How the value of an environment entry is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvValueType {
    /// Value written as-is
    Constant,
    /// Value produced by a generator at load time
    Auto,
    /// Value copied from the global section
    Global,
}

impl EnvValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvValueType::Constant => "constant",
            EnvValueType::Auto => "auto",
            EnvValueType::Global => "global",
        }
    }
}

impl fmt::Display for EnvValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvValueType {
    type Err = CtmnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(EnvValueType::Constant),
            "auto" => Ok(EnvValueType::Auto),
            "global" => Ok(EnvValueType::Global),
            other => Err(CtmnError::UnknownValueType(other.to_string())),
        }
    }
}

/// Value generator used by `auto` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// `random_uuid`
    RandomUuid,
    /// `openssl rand -hex N`
    Hex(usize),
    /// `openssl rand -base64 N`
    Base64(usize),
}

fn openssl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^openssl\s+rand\s+-(hex|base64)\s+(\d+)$").expect("generator pattern is valid")
    })
}

impl Generator {
    /// Parse a generator directive
    pub fn parse(directive: &str) -> Result<Self> {
        let directive = directive.trim();
        if directive == "random_uuid" {
            return Ok(Generator::RandomUuid);
        }

        let caps = openssl_pattern()
            .captures(directive)
            .ok_or_else(|| CtmnError::UnknownGenerator(directive.to_string()))?;
        let length: usize = caps[2]
            .parse()
            .map_err(|_| CtmnError::UnknownGenerator(directive.to_string()))?;
        if length == 0 {
            return Err(CtmnError::UnknownGenerator(directive.to_string()));
        }

        match &caps[1] {
            "hex" => Ok(Generator::Hex(length)),
            _ => Ok(Generator::Base64(length)),
        }
    }

    /// Produce a fresh value
    pub fn generate(&self) -> String {
        match self {
            Generator::RandomUuid => uuid::Uuid::new_v4().to_string(),
            Generator::Hex(length) => random_bytes(*length)
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect(),
            Generator::Base64(length) => STANDARD.encode(random_bytes(*length)),
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generator::RandomUuid => write!(f, "random_uuid"),
            Generator::Hex(length) => write!(f, "openssl rand -hex {}", length),
            Generator::Base64(length) => write!(f, "openssl rand -base64 {}", length),
        }
    }
}

/// A generated value pinned together with the generator that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedValue {
    pub generator: String,
    pub value: String,
}

fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Reference to an entry of the global section: `global.<namespace>.<key>`
///
/// The key is everything after the namespace and may contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRef {
    pub namespace: String,
    pub key: String,
}

impl GlobalRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || CtmnError::InvalidReference(reference.to_string());
        let mut parts = reference.trim().splitn(3, '.');

        if parts.next() != Some(GLOBAL_REFERENCE_PREFIX) {
            return Err(invalid());
        }
        let namespace = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let key = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", GLOBAL_REFERENCE_PREFIX, self.namespace, self.key)
    }
}

fn env_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^=\s]+$").expect("env key pattern is valid"))
}

/// Check that a key can be used as an environment variable name
///
/// Any non-empty key without `=` or whitespace fits in an env file line.
pub fn validate_env_key(namespace: &str, key: &str) -> Result<()> {
    if env_key_pattern().is_match(key) {
        Ok(())
    } else {
        Err(CtmnError::InvalidConfig(format!(
            "'{}' in namespace '{}' is not a valid environment variable name",
            key, namespace
        )))
    }
}

/// Render a YAML scalar as an environment value
pub fn scalar_to_string(namespace: &str, key: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => {
            check_single_line(namespace, key, s)?;
            Ok(s.clone())
        }
        _ => Err(CtmnError::InvalidConfig(format!(
            "value of '{}' in namespace '{}' must be a scalar",
            key, namespace
        ))),
    }
}

/// Env files hold one variable per line
pub fn check_single_line(namespace: &str, key: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(CtmnError::InvalidConfig(format!(
            "value of '{}' in namespace '{}' spans several lines",
            key, namespace
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_from_str() {
        assert_eq!("auto".parse::<EnvValueType>().unwrap(), EnvValueType::Auto);
        assert!(matches!(
            "secret".parse::<EnvValueType>(),
            Err(CtmnError::UnknownValueType(t)) if t == "secret"
        ));
    }

    #[test]
    fn test_parse_generators() {
        assert_eq!(Generator::parse("random_uuid").unwrap(), Generator::RandomUuid);
        assert_eq!(
            Generator::parse("openssl rand -hex 16").unwrap(),
            Generator::Hex(16)
        );
        assert_eq!(
            Generator::parse("openssl  rand -base64 32").unwrap(),
            Generator::Base64(32)
        );
        assert!(Generator::parse("openssl rand -hex 0").is_err());
        assert!(Generator::parse("pwgen 12").is_err());
    }

    #[test]
    fn test_generated_values() {
        let uuid = Generator::RandomUuid.generate();
        assert!(uuid::Uuid::parse_str(&uuid).is_ok());

        let hex = Generator::Hex(16).generate();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        let b64 = Generator::Base64(32).generate();
        assert_eq!(STANDARD.decode(&b64).unwrap().len(), 32);

        assert_ne!(Generator::Hex(16).generate(), hex);
    }

    #[test]
    fn test_global_ref() {
        let r = GlobalRef::parse("global.javamelody.JAVAMELODY_USER").unwrap();
        assert_eq!(r.namespace, "javamelody");
        assert_eq!(r.key, "JAVAMELODY_USER");
        assert_eq!(r.to_string(), "global.javamelody.JAVAMELODY_USER");

        assert!(GlobalRef::parse("javamelody.USER").is_err());
        assert!(GlobalRef::parse("global.javamelody").is_err());
        assert!(GlobalRef::parse("global..USER").is_err());

        let r = GlobalRef::parse("global.core.spring.datasource.url").unwrap();
        assert_eq!(r.namespace, "core");
        assert_eq!(r.key, "spring.datasource.url");
        assert_eq!(r.to_string(), "global.core.spring.datasource.url");
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string("ns", "K", &Value::from(8080i64)).unwrap(), "8080");
        assert_eq!(scalar_to_string("ns", "K", &Value::from(true)).unwrap(), "true");
        assert_eq!(scalar_to_string("ns", "K", &Value::Null).unwrap(), "");
        assert!(scalar_to_string("ns", "K", &Value::Sequence(vec![])).is_err());
    }

    #[test]
    fn test_multiline_values_rejected() {
        let block = Value::from("line1\nOTHER=injected\n");
        assert!(matches!(
            scalar_to_string("core", "CERT", &block),
            Err(CtmnError::InvalidConfig(_))
        ));
        assert!(scalar_to_string("core", "CERT", &Value::from("a\rb")).is_err());
        assert_eq!(
            scalar_to_string("core", "URL", &Value::from("jdbc:postgresql://db/x?a=b")).unwrap(),
            "jdbc:postgresql://db/x?a=b"
        );
    }

    #[test]
    fn test_validate_env_key() {
        assert!(validate_env_key("ns", "POSTGRES_PASSWORD").is_ok());
        assert!(validate_env_key("ns", "_X1").is_ok());
        assert!(validate_env_key("ns", "spring.datasource.url").is_ok());
        assert!(validate_env_key("ns", "1X").is_ok());
        assert!(validate_env_key("ns", "").is_err());
        assert!(validate_env_key("ns", "A=B").is_err());
        assert!(validate_env_key("ns", "A B").is_err());
    }
}
