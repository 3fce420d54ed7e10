pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod sheet;
pub mod state;
pub mod submission;
pub mod utils;
pub mod view;
pub mod workbook;

pub use config::{AppConfig, CliArgs, OutputFormat, ViewKind};
pub use error::{ErrorCode, FailureReport, SheetError, SheetResult};
pub use logging::{LoggingConfig, init_logging};
pub use mapping::{ColumnMapping, MappingProfile, MappingState, Role};
pub use model::{CellValue, ExcelData, Sheet};
pub use sheet::{HeaderStrategy, LoadOptions, SheetConfig};
pub use state::{DecodeOutcome, SessionOptions, WorkbookSession};
pub use submission::SheetSubmission;
pub use workbook::{WorkbookDecoder, parse_workbook};

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Instant;
use tracing::{Instrument, info, warn};

use view::{RenderOptions, SortState, render, render_text};

const SLOW_DECODE_MS: u64 = 2_000;

/// Loads the configured workbook, applies configured edits and prints the
/// requested view to stdout.
pub async fn run(config: AppConfig) -> Result<()> {
    config.ensure_workbook()?;
    let source_name = config.source_name();
    let session = WorkbookSession::new(config.session);

    let span = logging::workbook_span(&source_name);
    async {
        load_workbook(&session, &config).await?;
        apply_edits(&session, &config)?;
        let output = render_report(&session, &config)?;
        print!("{output}");
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

async fn load_workbook(session: &WorkbookSession, config: &AppConfig) -> Result<()> {
    let bytes = tokio::fs::read(&config.workbook)
        .await
        .with_context(|| format!("failed to read workbook {:?}", config.workbook))?;

    let started = Instant::now();
    let outcome = session.process_bytes(config.source_name(), bytes).await?;
    crate::log_slow_operation!(started.elapsed(), SLOW_DECODE_MS, ?outcome, "workbook decode");

    anyhow::ensure!(
        matches!(outcome, DecodeOutcome::Applied { .. }),
        "workbook load was superseded"
    );
    Ok(())
}

/// Applies mappings, manual brand and sheet choice from the configuration.
pub fn apply_edits(session: &WorkbookSession, config: &AppConfig) -> Result<()> {
    let configs = session.configs();
    for (sheet_name, assignments) in &config.mappings {
        let Some(index) = configs.iter().position(|sheet| &sheet.name == sheet_name) else {
            warn!(sheet = %sheet_name, "mapping names a sheet that is not in the workbook");
            continue;
        };
        for (role, column) in assignments {
            session
                .set_mapping(index, *role, *column)
                .with_context(|| format!("cannot map {role} on sheet '{sheet_name}'"))?;
        }
    }

    let target = config.sheet.unwrap_or(0);
    if config.sheet.is_some() {
        session.set_active_sheet(target)?;
        session.set_selected(target, true)?;
    }
    if let Some(brand) = config.manual_brand.as_deref() {
        session.set_manual_brand(target, brand)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SheetSummary {
    index: usize,
    name: String,
    rows: usize,
    columns: usize,
    header_row: usize,
    state: MappingState,
    selected: bool,
    valid: bool,
    missing: Vec<Role>,
    mapped: Vec<MappedColumn>,
}

#[derive(Debug, Serialize)]
struct MappedColumn {
    role: Role,
    label: &'static str,
    column: String,
    preview: String,
}

/// Produces the configured view of the session as text or JSON.
pub fn render_report(session: &WorkbookSession, config: &AppConfig) -> Result<String> {
    let snapshot = session.snapshot();
    let profile = session.options().profile;

    match config.view {
        ViewKind::Sheets => {
            let summaries: Vec<SheetSummary> = snapshot
                .configs
                .iter()
                .enumerate()
                .map(|(idx, sheet)| {
                    let validation = sheet.validate(idx, profile);
                    SheetSummary {
                        index: idx,
                        name: sheet.display_name(idx),
                        rows: sheet.excel_data.row_count(),
                        columns: sheet.header_count(),
                        header_row: sheet.header_index + 1,
                        state: sheet.mapping_state(profile),
                        selected: sheet.is_selected,
                        valid: validation.is_valid,
                        missing: validation.missing,
                        mapped: sheet
                            .column_mapping
                            .entries()
                            .filter_map(|(role, column)| {
                                let column = column?;
                                Some(MappedColumn {
                                    role,
                                    label: role.meta().label,
                                    column: utils::column_index_to_letter(column),
                                    preview: utils::column_preview(
                                        Some(column),
                                        &sheet.excel_data.rows,
                                    ),
                                })
                            })
                            .collect(),
                    }
                })
                .collect();
            match config.format {
                OutputFormat::Json => to_json(&summaries),
                OutputFormat::Table => Ok(sheets_text(&summaries, profile)),
            }
        }
        ViewKind::Preview => {
            let sheet = snapshot
                .active_config()
                .context("workbook has no sheets to preview")?;
            let mut sort = SortState::default();
            if let Some(column) = config.sort_column {
                sort.toggle(column);
                if config.sort_direction == view::SortDirection::Desc {
                    sort.toggle(column);
                }
            }
            let table = render(
                &sheet.excel_data,
                Some(&sheet.column_mapping),
                &sort,
                RenderOptions {
                    interactive: false,
                    max_rows: Some(config.preview_rows),
                },
            );
            match config.format {
                OutputFormat::Json => to_json(&table),
                OutputFormat::Table => Ok(render_text(&table)),
            }
        }
        ViewKind::Records => {
            let sheet = snapshot
                .active_config()
                .context("workbook has no sheets to read records from")?;
            let records = sheet.effective_records();
            match config.format {
                OutputFormat::Json => to_json(&records),
                OutputFormat::Table => {
                    let mut out = String::new();
                    for (row, record) in records.iter().enumerate() {
                        let fields: Vec<String> = record
                            .iter()
                            .map(|(role, value)| format!("{role}={value}"))
                            .collect();
                        out.push_str(&format!("{:>4}  {}\n", row + 1, fields.join(", ")));
                    }
                    Ok(out)
                }
            }
        }
        ViewKind::Plan => {
            let plan = session.submission_plan()?;
            info!(jobs = plan.len(), "submission plan built");
            match config.format {
                OutputFormat::Json => to_json(&plan),
                OutputFormat::Table => Ok(plan_text(&plan)),
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    json.push('\n');
    Ok(json)
}

fn sheets_text(summaries: &[SheetSummary], profile: MappingProfile) -> String {
    let roles = |roles: &[Role]| -> String {
        let keys: Vec<&'static str> = roles.iter().map(|role| role.key()).collect();
        if keys.is_empty() {
            "-".to_string()
        } else {
            keys.join(", ")
        }
    };
    let mut out = format!(
        "Profile: {} (required: {}; optional: {})\n",
        profile.label(),
        roles(profile.required_roles()),
        roles(profile.optional_roles())
    );
    for summary in summaries {
        let marker = if summary.selected { '*' } else { ' ' };
        let status = if summary.valid {
            "ready".to_string()
        } else if summary.missing.is_empty() {
            "no data".to_string()
        } else {
            let missing: Vec<&'static str> = summary.missing.iter().map(|r| r.key()).collect();
            format!("missing {}", missing.join(", "))
        };
        out.push_str(&format!(
            "{marker} {:>2}  {:<24} {:>6} rows  {:>3} cols  header {:<3} {:?}  {}\n",
            summary.index, summary.name, summary.rows, summary.columns, summary.header_row,
            summary.state, status
        ));
        for mapped in &summary.mapped {
            out.push_str(&format!(
                "        {:<10} -> {:<3} {}\n",
                mapped.label, mapped.column, mapped.preview
            ));
        }
    }
    out
}

fn plan_text(plan: &[SheetSubmission]) -> String {
    if plan.is_empty() {
        return "No sheets selected\n".to_string();
    }
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    for job in plan {
        let brand = match (&job.brand_column, &job.manual_brand) {
            (_, Some(manual)) => format!("\"{manual}\""),
            (column, None) => or_dash(column),
        };
        out.push_str(&format!(
            "#{} {}  header {}  style {}  brand {}  image {}  color {}  category {}  msrp {}\n",
            job.sheet_index,
            job.sheet_name,
            job.header_row,
            job.style_column,
            brand,
            or_dash(&job.image_column),
            or_dash(&job.color_column),
            or_dash(&job.category_column),
            or_dash(&job.msrp_column),
        ));
    }
    out
}
