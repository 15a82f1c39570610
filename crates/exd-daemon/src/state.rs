//! Shared daemon state.

use std::sync::Arc;

use uuid::Uuid;

use exd_engine::Engine;

#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

pub struct AppState {
    pub engine: Arc<Engine>,
    pub build: BuildInfo,
    pub run_id: Uuid,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let build = BuildInfo {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        };
        Self {
            engine,
            run_id: derive_run_id(build.service, build.version),
            build,
        }
    }
}

/// Derive a deterministic in-memory run id from build metadata.
///
/// No RNG: `Uuid::new_v5` over the DNS namespace, so the id is stable for
/// a given binary version and usable as a session label in logs and the
/// health endpoint.
fn derive_run_id(service: &'static str, version: &'static str) -> Uuid {
    let data = format!("exd-daemon.run.v1|{service}|{version}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_deterministic() {
        assert_eq!(derive_run_id("a", "1"), derive_run_id("a", "1"));
        assert_ne!(derive_run_id("a", "1"), derive_run_id("a", "2"));
    }
}
