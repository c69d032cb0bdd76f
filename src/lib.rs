#![doc(test(attr(deny(warnings))))]

//! Copro Core bundles the condominium accounting crates behind one facade and
//! ships the `copro_cli` shell used by property managers.

pub mod cli;
pub mod errors;
pub mod utils;

pub use copro_config as config;
pub use copro_domain as domain;
pub use copro_engine as engine;
pub use copro_storage_json as storage;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Copro Core tracing initialized.");
    });
}
