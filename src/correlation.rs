use std::fmt;

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use uuid::{Builder, Uuid};

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("random source failed: {0}")]
    Entropy(#[from] rand::Error),
}

/// Source of per-request correlation ids.
pub trait CorrelationIds: Send + Sync {
    fn generate(&self) -> Result<Uuid, CorrelationError>;
}

/// Random v4 UUIDs drawn from the operating system RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUuid;

impl CorrelationIds for RandomUuid {
    fn generate(&self) -> Result<Uuid, CorrelationError> {
        let mut bytes = [0u8; 16];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// Correlation id shared by a request line and its response line.
///
/// Renders `<nil>` when generation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Correlation(Option<Uuid>);

impl Correlation {
    pub const fn new(id: Option<Uuid>) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> Option<Uuid> {
        self.0
    }
}

impl From<Uuid> for Correlation {
    fn from(id: Uuid) -> Self {
        Self(Some(id))
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => fmt::Display::fmt(id, f),
            None => f.write_str("<nil>"),
        }
    }
}
