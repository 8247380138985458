//! Ksyun Core
//!
//! Provider-independent engine for the Kingsoft Cloud provider: resource and
//! state model, schemas, the schema <-> vendor payload transcoder, bounded
//! retries and composite identifiers.

pub mod case_convert;
pub mod identifier;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod transcode;
