use std::collections::BTreeMap;

use serde_json::Value;

use super::ScanError;

type Decoder<T> = fn(Value) -> Result<T, serde_json::Error>;

/// Registry mapping a discriminator to the decoder of one variant of a sum type.
///
/// Used to rebuild tagged unions persisted as a `(discriminator, payload)` pair.
#[derive(Debug)]
pub struct DiscriminatedMapper<T> {
    decoders: BTreeMap<&'static str, Decoder<T>>,
}

impl<T> Default for DiscriminatedMapper<T> {
    fn default() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }
}

impl<T> DiscriminatedMapper<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the decoder for a discriminator.
    pub fn register(mut self, discriminator: &'static str, decoder: Decoder<T>) -> Self {
        self.decoders.insert(discriminator, decoder);
        self
    }

    pub fn contains(&self, discriminator: &str) -> bool {
        self.decoders.contains_key(discriminator)
    }

    pub fn discriminators(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode `payload` with the decoder registered for `discriminator`.
    pub fn from(&self, discriminator: &str, payload: Value) -> Result<T, ScanError> {
        let decoder = self
            .decoders
            .get(discriminator)
            .ok_or_else(|| ScanError::UnknownDiscriminator(discriminator.to_string()))?;

        decoder(payload).map_err(|source| ScanError::Decode {
            column: "discriminated_payload",
            source,
        })
    }
}
