// Campus feedback pipeline.
//
// **Architecture Overview:**
// - `core/` = Business logic (lifecycle, moderation orchestration, ports)
// - `infra/` = Implementations of core traits (SQLite, moderation APIs, queue)
// - `config` = Environment-driven configuration for the worker binary

// Each layer has a single root file listing its feature modules; the
// feature modules themselves live in per-feature directories.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub mod config;

#[cfg(test)]
mod test_support;
