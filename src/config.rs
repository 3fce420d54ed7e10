use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::mapping::{MappingProfile, Role};
use crate::sheet::{HeaderStrategy, LoadOptions};
use crate::state::SessionOptions;
use crate::utils::column_letter_to_index;
use crate::view::SortDirection;

const DEFAULT_PREVIEW_ROWS: usize = 20;
const DEFAULT_MAX_FILE_SIZE_MB: usize = 50;
const BYTES_PER_MB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// Sheet list with mapping state and validation
    #[default]
    Sheets,
    /// Rendered table of the chosen sheet
    Preview,
    /// Effective per-role values for every row
    Records,
    /// Submission jobs for the selected sheets
    Plan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// A column given either as a zero-based index or as spreadsheet letters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Letter(String),
}

impl ColumnRef {
    pub fn resolve(&self) -> Option<usize> {
        match self {
            ColumnRef::Index(index) => Some(*index),
            ColumnRef::Letter(letters) => letters
                .trim()
                .parse::<usize>()
                .ok()
                .or_else(|| column_letter_to_index(letters)),
        }
    }
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Ok(ColumnRef::Index(index));
        }
        if column_letter_to_index(s).is_some() {
            return Ok(ColumnRef::Letter(s.to_ascii_uppercase()));
        }
        Err(format!("'{s}' is neither a column index nor column letters"))
    }
}

/// Header row as written by users: a zero-based index or `auto`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderRowSetting {
    Index(usize),
    Keyword(String),
}

impl HeaderRowSetting {
    fn into_strategy(self) -> Result<HeaderStrategy> {
        match self {
            HeaderRowSetting::Index(index) => Ok(HeaderStrategy::Row(index)),
            HeaderRowSetting::Keyword(word) => parse_header_keyword(&word),
        }
    }
}

fn parse_header_keyword(word: &str) -> Result<HeaderStrategy> {
    let word = word.trim();
    if word.eq_ignore_ascii_case("auto") {
        return Ok(HeaderStrategy::Detect);
    }
    word.parse::<usize>()
        .map(HeaderStrategy::Row)
        .with_context(|| format!("invalid header row '{word}', expected an index or 'auto'"))
}

impl FromStr for HeaderRowSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_header_keyword(s).map_err(|e| e.to_string())?;
        Ok(match s.trim().parse::<usize>() {
            Ok(index) => HeaderRowSetting::Index(index),
            Err(_) => HeaderRowSetting::Keyword(s.trim().to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub workbook: PathBuf,
    pub view: ViewKind,
    pub sheet: Option<usize>,
    pub session: SessionOptions,
    pub manual_brand: Option<String>,
    pub sort_column: Option<usize>,
    pub sort_direction: SortDirection,
    pub preview_rows: usize,
    pub format: OutputFormat,
    /// Per sheet name, role assignments applied after load
    pub mappings: BTreeMap<String, Vec<(Role, usize)>>,
}

impl AppConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            workbook: cli_workbook,
            view: cli_view,
            sheet: cli_sheet,
            header_row: cli_header_row,
            auto_map: cli_auto_map,
            profile: cli_profile,
            manual_brand: cli_manual_brand,
            sort_column: cli_sort_column,
            descending: cli_descending,
            preview_rows: cli_preview_rows,
            max_file_size_mb: cli_max_file_size_mb,
            format: cli_format,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            workbook: file_workbook,
            view: file_view,
            sheet: file_sheet,
            header_row: file_header_row,
            auto_map: file_auto_map,
            profile: file_profile,
            manual_brand: file_manual_brand,
            sort_column: file_sort_column,
            descending: file_descending,
            preview_rows: file_preview_rows,
            max_file_size_mb: file_max_file_size_mb,
            format: file_format,
            mappings: file_mappings,
        } = file_config;

        let workbook = cli_workbook
            .or(file_workbook)
            .context("no workbook given; pass a path or set `workbook` in the config file")?;

        let header_strategy = match cli_header_row.or(file_header_row) {
            Some(setting) => setting.into_strategy()?,
            None => HeaderStrategy::default(),
        };

        let max_file_size_mb = cli_max_file_size_mb
            .or(file_max_file_size_mb)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);
        anyhow::ensure!(max_file_size_mb > 0, "max file size must be at least 1 MB");

        let preview_rows = cli_preview_rows
            .or(file_preview_rows)
            .unwrap_or(DEFAULT_PREVIEW_ROWS);
        anyhow::ensure!(preview_rows > 0, "preview rows must be at least 1");

        let manual_brand = cli_manual_brand
            .or(file_manual_brand)
            .map(|value| value.trim().to_string());
        if let Some(value) = manual_brand.as_ref() {
            anyhow::ensure!(!value.is_empty(), "manual brand cannot be blank");
        }

        let sort_column = cli_sort_column
            .or(file_sort_column)
            .map(|column| {
                column
                    .resolve()
                    .with_context(|| format!("invalid sort column {:?}", column))
            })
            .transpose()?;

        let sort_direction = if cli_descending.or(file_descending).unwrap_or(false) {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };

        let mut mappings = BTreeMap::new();
        for (sheet, roles) in file_mappings.unwrap_or_default() {
            let mut assignments = Vec::with_capacity(roles.len());
            for (role, column) in roles {
                let index = column.resolve().with_context(|| {
                    format!("invalid column {:?} for {role} on sheet '{sheet}'", column)
                })?;
                assignments.push((role, index));
            }
            mappings.insert(sheet, assignments);
        }

        let session = SessionOptions {
            load: LoadOptions {
                header_strategy,
                auto_map: cli_auto_map.or(file_auto_map).unwrap_or(false),
            },
            profile: cli_profile.or(file_profile).unwrap_or_default(),
            max_file_bytes: max_file_size_mb.saturating_mul(BYTES_PER_MB),
        };

        Ok(Self {
            workbook,
            view: cli_view.or(file_view).unwrap_or_default(),
            sheet: cli_sheet.or(file_sheet),
            session,
            manual_brand,
            sort_column,
            sort_direction,
            preview_rows,
            format: cli_format.or(file_format).unwrap_or_default(),
            mappings,
        })
    }

    pub fn ensure_workbook(&self) -> Result<()> {
        anyhow::ensure!(
            self.workbook.exists(),
            "workbook {:?} does not exist",
            self.workbook
        );
        anyhow::ensure!(
            self.workbook.is_file(),
            "workbook {:?} is not a file",
            self.workbook
        );
        Ok(())
    }

    pub fn source_name(&self) -> String {
        self.workbook
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.workbook.display().to_string())
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "sheetmap",
    about = "Inspect a workbook and map its columns to product roles",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        env = "SHEETMAP_WORKBOOK",
        value_name = "WORKBOOK",
        help = "Spreadsheet file to load (.xlsx, .xls, .xlsb, .ods)"
    )]
    pub workbook: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEETMAP_VIEW",
        value_enum,
        value_name = "VIEW",
        help = "What to print: sheets, preview, records or plan"
    )]
    pub view: Option<ViewKind>,

    #[arg(
        long,
        env = "SHEETMAP_SHEET",
        value_name = "N",
        help = "Zero-based sheet to show (defaults to the first sheet)",
        value_parser = clap::value_parser!(usize)
    )]
    pub sheet: Option<usize>,

    #[arg(
        long,
        env = "SHEETMAP_HEADER_ROW",
        value_name = "N|auto",
        help = "Zero-based header row, or 'auto' to detect it"
    )]
    pub header_row: Option<HeaderRowSetting>,

    #[arg(
        long,
        env = "SHEETMAP_AUTO_MAP",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Guess role columns from header text"
    )]
    pub auto_map: Option<bool>,

    #[arg(
        long,
        env = "SHEETMAP_PROFILE",
        value_enum,
        value_name = "PROFILE",
        help = "Job type deciding which roles are required"
    )]
    pub profile: Option<MappingProfile>,

    #[arg(
        long,
        env = "SHEETMAP_MANUAL_BRAND",
        value_name = "BRAND",
        help = "Use this brand for every row instead of a column"
    )]
    pub manual_brand: Option<String>,

    #[arg(
        long,
        env = "SHEETMAP_SORT_COLUMN",
        value_name = "COLUMN",
        help = "Sort the preview by a column index or letter"
    )]
    pub sort_column: Option<ColumnRef>,

    #[arg(
        long,
        env = "SHEETMAP_DESCENDING",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Sort descending instead of ascending"
    )]
    pub descending: Option<bool>,

    #[arg(
        long,
        env = "SHEETMAP_PREVIEW_ROWS",
        value_name = "N",
        help = "Maximum rows printed by the preview",
        value_parser = clap::value_parser!(usize)
    )]
    pub preview_rows: Option<usize>,

    #[arg(
        long,
        env = "SHEETMAP_MAX_FILE_SIZE_MB",
        value_name = "MB",
        help = "Refuse workbooks larger than this",
        value_parser = clap::value_parser!(usize)
    )]
    pub max_file_size_mb: Option<usize>,

    #[arg(
        long,
        env = "SHEETMAP_FORMAT",
        value_enum,
        value_name = "FORMAT",
        help = "Output format (table or json)"
    )]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    workbook: Option<PathBuf>,
    view: Option<ViewKind>,
    sheet: Option<usize>,
    header_row: Option<HeaderRowSetting>,
    auto_map: Option<bool>,
    profile: Option<MappingProfile>,
    manual_brand: Option<String>,
    sort_column: Option<ColumnRef>,
    descending: Option<bool>,
    preview_rows: Option<usize>,
    max_file_size_mb: Option<usize>,
    format: Option<OutputFormat>,
    mappings: Option<BTreeMap<String, BTreeMap<Role, ColumnRef>>>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };

    Ok(parsed)
}
