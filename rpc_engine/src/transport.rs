use std::{fmt, str::FromStr};

use thiserror::Error;

/// Wire binding selected by name at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Http,
    Tcp,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no matching protocol: {0}")]
pub struct UnknownTransport(pub String);

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "http" => Ok(Transport::Http),
            "tcp" => Ok(Transport::Tcp),
            _ => Err(UnknownTransport(name.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => f.write_str("http"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}
