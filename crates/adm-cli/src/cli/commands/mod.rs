//! CLI subcommand implementations.

mod add;
mod cancel;
mod clear;
mod pause;
mod probe;
mod remove;
mod resume;
mod run;
mod status;

pub use add::run_add;
pub use cancel::run_cancel;
pub use clear::run_clear;
pub use pause::run_pause;
pub use probe::run_probe;
pub use remove::run_remove;
pub use resume::run_resume;
pub use run::run_scheduler;
pub use status::run_status;

use std::time::Duration;

use adm_core::cache::CacheConfig;
use adm_core::config::AdmConfig;
use adm_core::persist::PersistenceGateway;
use adm_core::store::KvStore;

pub(crate) fn cache_config(cfg: &AdmConfig) -> CacheConfig {
    CacheConfig {
        ttl: Duration::from_secs(cfg.cache_ttl_secs),
        max_entries: cfg.cache_max_entries,
    }
}

pub(crate) fn gateway(store: &KvStore, cfg: &AdmConfig) -> PersistenceGateway {
    PersistenceGateway::new(store.clone(), Duration::from_millis(cfg.save_debounce_ms))
}
