pub mod config;
pub mod credentials;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::AnalysisConfig;
pub use credentials::ApiKey;
pub use pipeline::analysis::AzureChatClient;
pub use pipeline::guard::CancellationToken;
pub use pipeline::memory_document::MemoryDocument;
pub use pipeline::orchestrator::{PassReport, PassRequest, PipelineError, ReconciliationPipeline};

/// Install the fmt subscriber. `RUST_LOG` wins over the crate default.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
