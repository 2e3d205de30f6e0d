//! Sandbox and container identifier generation.

use rand::rngs::OsRng;
use rand::RngCore;

use kardigan_core::error::{KardiganError, Result};

/// Source of fresh handles for sandboxes and containers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<String>;
}

/// Random version-4 UUIDs drawn from the OS random source.
///
/// An unavailable random source is reported as an error instead of
/// aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| KardiganError::Internal(format!("generate id: {}", e)))?;
        Ok(uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string())
    }
}
