//! The seam between the HTTP handlers and the generation pipeline.

use crate::config::{api_key_configured, effective_provider_name, GeneratorConfig, ServerConfig};
use crate::error::BilancioError;
use crate::generate::generate_balance_sheet;
use crate::output::BalanceSheetOutput;
use crate::progress::ProgressCallback;
use futures::future::BoxFuture;
use std::path::PathBuf;

/// Produces a balance sheet from saved uploads.
///
/// The server holds an `Arc<dyn BalanceSheetEngine>`, so tests can swap in
/// an engine that never touches pdfium or a provider.
pub trait BalanceSheetEngine: Send + Sync {
    /// Whether the API key the engine needs is available.
    fn api_key_configured(&self) -> bool;

    /// Run the pipeline over `inputs`, reporting stage events to `progress`.
    fn generate<'a>(
        &'a self,
        inputs: &'a [PathBuf],
        progress: ProgressCallback,
    ) -> BoxFuture<'a, Result<BalanceSheetOutput, BilancioError>>;
}

/// [`BalanceSheetEngine`] backed by [`generate_balance_sheet`].
#[derive(Debug, Clone, Default)]
pub struct PipelineEngine {
    config: GeneratorConfig,
}

impl PipelineEngine {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Engine whose document limit matches the upload limit of `server`.
    pub fn for_server(mut config: GeneratorConfig, server: &ServerConfig) -> Self {
        config.max_files = server.max_files.max(1);
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl BalanceSheetEngine for PipelineEngine {
    fn api_key_configured(&self) -> bool {
        if self.config.fast_provider.is_some() && self.config.deep_provider.is_some() {
            return true;
        }
        api_key_configured(&effective_provider_name(&self.config))
    }

    fn generate<'a>(
        &'a self,
        inputs: &'a [PathBuf],
        progress: ProgressCallback,
    ) -> BoxFuture<'a, Result<BalanceSheetOutput, BilancioError>> {
        Box::pin(async move {
            let mut config = self.config.clone();
            config.progress_callback = Some(progress);
            let inputs: Vec<String> = inputs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            generate_balance_sheet(inputs.as_slice(), &config).await
        })
    }
}
