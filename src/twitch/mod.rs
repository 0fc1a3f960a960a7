pub mod client;

pub use client::{HelixClient, LivenessOracle, OracleError, StreamSession, HELIX_API_URL};
