use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::ExportConfig;
use crate::export::{export_to_path, ExportSummary};
use crate::fetch::SaraClient;
use crate::layout::TemplateLayout;
use crate::reuse::select_template;

#[derive(Debug, Parser)]
#[command(
    name = "sara-export",
    about = "Fill the official grading template with a module's data from the SARA backend."
)]
pub struct Args {
    /// Backend root URL.
    #[arg(long, env = "SARA_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Backend access token (a leading `Bearer ` is accepted).
    #[arg(long, env = "SARA_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Module to export.
    #[arg(long, env = "SARA_MODULE_ID")]
    pub module_id: i64,

    /// Blank official template.
    #[arg(long, env = "SARA_TEMPLATE", value_name = "PATH")]
    pub template: PathBuf,

    /// Where to write the filled workbook.
    #[arg(long, env = "SARA_OUTPUT", value_name = "PATH")]
    pub output: PathBuf,

    /// Request timeout in seconds.
    #[arg(long, env = "SARA_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Previous export of the same module, reused as template when its structure still matches.
    #[arg(long, env = "SARA_SNAPSHOT", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

pub fn run_with_args(args: Args) -> Result<()> {
    let config = ExportConfig::from_args(&args).context("invalid configuration")?;
    let summary = run_with_config(&config)?;
    println!("{summary}");
    Ok(())
}

pub fn run_with_config(config: &ExportConfig) -> Result<ExportSummary> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let input = runtime.block_on(async {
        let client = SaraClient::new(&config.base_url, &config.token, config.timeout)
            .context("failed to create backend client")?;
        client
            .fetch_export_input(config.module_id)
            .await
            .with_context(|| format!("failed to fetch module {} from {}", config.module_id, config.base_url))
    })?;

    let layout = TemplateLayout::OFFICIAL;
    let template = select_template(&config.template, config.snapshot.as_deref(), &input.snapshot, &layout)
        .with_context(|| format!("failed to open template {}", config.template.display()))?;
    let summary = export_to_path(&template, &input, &layout, &config.output)
        .with_context(|| format!("failed to export module {}", config.module_id))?;
    Ok(summary)
}
