pub mod extraction;
pub mod prompt;
pub mod analysis;
pub mod reconcile;
pub mod apply;
pub mod memory_document;
pub mod guard;
pub mod diagnostic; // Per-pass dump (enabled by AnalysisConfig.dump_dir)
pub mod orchestrator;
