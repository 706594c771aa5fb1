//! CLI runner - executes commands

use crate::catalog::FieldCatalog;
use crate::cli::commands::{parse_report_selection, Cli, Commands, OutputFormat};
use crate::config::ConnectorConfig;
use crate::engine::{SyncEngine, SyncReport};
use crate::error::{Error, Result, ResultExt};
use crate::output::JsonLinesSink;
use crate::types::{AdProduct, ReportSpec, ReportType};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check => self.check().await,
            Commands::Fields {
                product,
                report_type,
            } => {
                self.fields(*product, *report_type);
                Ok(())
            }
            Commands::Read {
                reports,
                output,
                logical_names,
            } => {
                self.read(reports.as_deref(), output.as_deref(), *logical_names)
                    .await
            }
        }
    }

    /// Load configuration
    fn load_config(&self) -> Result<ConnectorConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -C flag)"))?;
        ConnectorConfig::load(path)
    }

    /// Check connection
    async fn check(&self) -> Result<()> {
        let config = self.load_config()?;
        let auth = config.auth_context();

        match auth.refresh().await {
            Ok(_) => {
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": "SUCCEEDED",
                        "message": "Connection successful"
                    }
                }));
            }
            Err(e) => {
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": "FAILED",
                        "message": connection_failure_message(&e)
                    }
                }));
            }
        }

        Ok(())
    }

    /// Print the field catalog
    fn fields(&self, product: Option<AdProduct>, report_type: Option<ReportType>) {
        let catalog = FieldCatalog::standard();

        for (ad_product, table_type) in catalog.registered() {
            if product.is_some_and(|p| p != ad_product)
                || report_type.is_some_and(|t| t != table_type)
            {
                continue;
            }

            let fields: Vec<Value> = catalog
                .entries_for(ad_product, table_type)
                .unwrap_or_default()
                .iter()
                .map(|entry| json!({"name": entry.request_name, "label": entry.label}))
                .collect();

            self.output_message(&json!({
                "type": "CATALOG",
                "catalog": {
                    "version": catalog.version(),
                    "ad_product": ad_product,
                    "report_type": table_type,
                    "platform_report_type": catalog.platform_report_type(ad_product, table_type),
                    "fields": fields
                }
            }));
        }
    }

    /// Run a sync
    async fn read(
        &self,
        reports: Option<&str>,
        output: Option<&Path>,
        logical_names: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let catalog = FieldCatalog::standard();
        let specs = select_specs(config.report_specs(&catalog)?, reports)?;
        let engine = config.build_engine()?;

        info!(reports = specs.len(), "Starting sync");

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling sync");
                    cancel.cancel();
                }
            })
        };

        let result = match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Cannot create output file {}", path.display()))?;
                run_to_writer(&engine, &specs, BufWriter::new(file), logical_names, cancel).await
            }
            None => {
                let stdout = std::io::stdout();
                run_to_writer(&engine, &specs, BufWriter::new(stdout), logical_names, cancel)
                    .await
            }
        };
        interrupt.abort();

        let report = result?;
        self.output_summary(&report);

        for (stream, reason) in report.failures() {
            warn!(stream = %stream, reason = %reason, "Report failed");
        }

        Ok(())
    }

    /// Output a message to stdout
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }

    /// Output the run summary to stderr, keeping stdout for records
    fn output_summary(&self, report: &SyncReport) {
        let msg = json!({ "type": "SUMMARY", "summary": report });
        match self.cli.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::to_string(&msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                eprintln!("{}", serde_json::to_string_pretty(&msg).unwrap_or_default());
            }
        }
    }
}

/// Run the engine with a JSON lines sink over `writer`
async fn run_to_writer<W: Write + Send>(
    engine: &SyncEngine,
    specs: &[ReportSpec],
    writer: W,
    logical_names: bool,
    cancel: CancellationToken,
) -> Result<SyncReport> {
    let mut sink = JsonLinesSink::new(writer);
    if logical_names {
        sink = sink.with_logical_names(FieldCatalog::standard());
    }
    engine.run(specs, &mut sink, cancel).await
}

/// Keep only the specs named by a `--reports` selection
pub(crate) fn select_specs(specs: Vec<ReportSpec>, selection: Option<&str>) -> Result<Vec<ReportSpec>> {
    let Some(selection) = selection else {
        return Ok(specs);
    };

    let wanted = parse_report_selection(selection)?;
    if wanted.is_empty() {
        return Ok(specs);
    }

    let selected: Vec<ReportSpec> = specs
        .into_iter()
        .filter(|spec| wanted.contains(&(spec.ad_product, spec.report_type)))
        .collect();

    if selected.is_empty() {
        return Err(Error::invalid_value(
            "reports",
            format!("no configured report matches '{selection}'"),
        ));
    }
    Ok(selected)
}

/// Connection check message, with a hint for the platform's call limit
pub(crate) fn connection_failure_message(error: &Error) -> String {
    let limited = error
        .platform_errors()
        .iter()
        .any(|e| e.error_code == "REQUEST_LIMIT_EXCEEDED")
        || error.to_string().contains("REQUEST_LIMIT_EXCEEDED");

    if limited {
        "API call limit is exceeded".to_string()
    } else {
        format!("Connection failed: {error}")
    }
}
