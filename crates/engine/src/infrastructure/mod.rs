//! Infrastructure layer: external-service clients and the lobby registry.

pub mod airia;
pub mod elevenlabs;
pub mod ports;
pub mod registry;
pub mod stackai;
