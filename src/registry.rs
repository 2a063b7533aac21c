//! Lookup table from compression method to encoder/decoder
//!
//! A process-wide registry is available through [`CompressionRegistry::shared`];
//! writers and readers use it unless given their own. Lookups take a shared
//! lock, registration takes the exclusive lock, so both maps always change
//! atomically with respect to readers.

use crate::coder::{
    CompressionMethod, Decoder, DeflateDecoder, DeflateEncoder, Encoder, StoreDecoder,
    StoreEncoder,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    encoders: HashMap<CompressionMethod, Arc<dyn Encoder>>,
    decoders: HashMap<CompressionMethod, Arc<dyn Decoder>>,
}

/// Registered coders per [`CompressionMethod`]
pub struct CompressionRegistry {
    tables: RwLock<Tables>,
}

impl CompressionRegistry {
    /// Registry with store (0) and deflate (8) registered in both directions,
    /// plus zstd (93) when built with `zstd-support`
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.set_encoder(CompressionMethod::STORE, Some(Arc::new(StoreEncoder)));
        registry.set_decoder(CompressionMethod::STORE, Some(Arc::new(StoreDecoder)));
        registry.set_encoder(CompressionMethod::DEFLATE, Some(Arc::new(DeflateEncoder)));
        registry.set_decoder(CompressionMethod::DEFLATE, Some(Arc::new(DeflateDecoder)));
        #[cfg(feature = "zstd-support")]
        {
            use crate::coder::{ZstdDecoder, ZstdEncoder};
            registry.set_encoder(CompressionMethod::ZSTD, Some(Arc::new(ZstdEncoder)));
            registry.set_decoder(CompressionMethod::ZSTD, Some(Arc::new(ZstdDecoder)));
        }
        registry
    }

    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// The process-wide registry
    pub fn shared() -> Arc<CompressionRegistry> {
        static SHARED: OnceLock<Arc<CompressionRegistry>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(CompressionRegistry::new()))
            .clone()
    }

    // A panic while holding the lock cannot leave the maps half-updated, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn encoder_for(&self, method: CompressionMethod) -> Option<Arc<dyn Encoder>> {
        self.read().encoders.get(&method).cloned()
    }

    pub fn decoder_for(&self, method: CompressionMethod) -> Option<Arc<dyn Decoder>> {
        self.read().decoders.get(&method).cloned()
    }

    /// Replace the encoder for `method`; `None` unregisters it
    pub fn set_encoder(&self, method: CompressionMethod, encoder: Option<Arc<dyn Encoder>>) {
        let mut tables = self.write();
        match encoder {
            Some(encoder) => {
                log::debug!("registering encoder for method {}", method);
                tables.encoders.insert(method, encoder);
            }
            None => {
                log::debug!("unregistering encoder for method {}", method);
                tables.encoders.remove(&method);
            }
        }
    }

    /// Replace the decoder for `method`; `None` unregisters it
    pub fn set_decoder(&self, method: CompressionMethod, decoder: Option<Arc<dyn Decoder>>) {
        let mut tables = self.write();
        match decoder {
            Some(decoder) => {
                log::debug!("registering decoder for method {}", method);
                tables.decoders.insert(method, decoder);
            }
            None => {
                log::debug!("unregistering decoder for method {}", method);
                tables.decoders.remove(&method);
            }
        }
    }

    /// Methods with a registered encoder, in ascending order
    pub fn encoder_methods(&self) -> Vec<CompressionMethod> {
        let mut methods: Vec<_> = self.read().encoders.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Methods with a registered decoder, in ascending order
    pub fn decoder_methods(&self) -> Vec<CompressionMethod> {
        let mut methods: Vec<_> = self.read().decoders.keys().copied().collect();
        methods.sort();
        methods
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionRegistry")
            .field("encoders", &self.encoder_methods())
            .field("decoders", &self.decoder_methods())
            .finish()
    }
}
