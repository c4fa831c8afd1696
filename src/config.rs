use crate::error::{AppError, Result};
use crate::executive::today_in;
use crate::normalize::ExtractOptions;
use crate::output::{ViewKind, EXPORT_FILE};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "workbook-summary",
    version,
    about = "Per-client reply, bounce and target summaries from campaign workbooks"
)]
pub struct Cli {
    /// Workbook to load (.csv, .xlsx, .xls).
    pub input: Option<PathBuf>,

    /// Sheet to include; repeat for several.
    #[arg(long = "sheet", value_name = "NAME")]
    pub sheets: Vec<String>,

    /// Include every data sheet.
    #[arg(long, conflicts_with = "sheets")]
    pub all_sheets: bool,

    /// Restrict the view and export to one client.
    #[arg(long, value_name = "NAME")]
    pub client: Option<String>,

    #[arg(long, value_enum, default_value_t = ViewKind::Summary)]
    pub view: ViewKind,

    /// Follow each client's detail rows with a "<Client> - Summary" row.
    #[arg(long)]
    pub with_client_summaries: bool,

    /// Day used for the target thresholds; defaults to today in --timezone.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value = "America/New_York")]
    pub timezone: String,

    #[arg(long, default_value = EXPORT_FILE)]
    pub out: PathBuf,

    /// Also write the summary cards as JSON.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    #[arg(long, default_value_t = 1_000_000)]
    pub max_rows: usize,

    /// Rows with fewer unique sends are dropped on load.
    #[arg(long, default_value_t = 1.0)]
    pub min_unique_sent: f64,

    /// Print the workbook's sheet names and exit.
    #[arg(long)]
    pub list_sheets: bool,

    #[arg(long, default_value_t = 10)]
    pub preview_rows: usize,

    /// Menu-driven session instead of a single batch run.
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetSelection {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub sheets: SheetSelection,
    pub client: Option<String>,
    pub view: ViewKind,
    pub include_client_summaries: bool,
    pub timezone: Tz,
    pub reference_date: NaiveDate,
    pub out: PathBuf,
    pub json: Option<PathBuf>,
    pub extract: ExtractOptions,
    pub list_sheets: bool,
    pub preview_rows: usize,
    pub interactive: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let timezone: Tz = cli
            .timezone
            .parse()
            .map_err(|_| AppError::InvalidTimezone(cli.timezone.clone()))?;
        let reference_date = cli.date.unwrap_or_else(|| today_in(timezone));
        let sheets = if cli.all_sheets || cli.sheets.is_empty() {
            SheetSelection::All
        } else {
            SheetSelection::Named(cli.sheets)
        };
        Ok(Config {
            input: cli.input,
            sheets,
            client: cli.client.filter(|c| !c.trim().is_empty()),
            view: cli.view,
            include_client_summaries: cli.with_client_summaries,
            timezone,
            reference_date,
            out: cli.out,
            json: cli.json,
            extract: ExtractOptions {
                max_rows: cli.max_rows,
                min_unique_sent: cli.min_unique_sent,
            },
            list_sheets: cli.list_sheets,
            preview_rows: cli.preview_rows,
            interactive: cli.interactive,
        })
    }
}
