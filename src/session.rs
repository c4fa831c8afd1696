// One analysis session: the loaded workbook, the sheet selection and the
// generated dataset. Loading another file starts over from a fresh session.
use crate::config::SheetSelection;
use crate::error::{AppError, Result};
use crate::executive::targets_from_workbook;
use crate::filter::{client_names, filter_by_client, search_sheets};
use crate::loader::{load_workbook, Workbook};
use crate::normalize::{extract_sheet_data, Dataset, ExtractOptions};
use crate::output::{build_export_rows, executive_rows, summary_cards, ExportRequest, ExportTable, SummaryCards, ViewKind};
use crate::types::{ExecutiveRow, Row, TargetRecord};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct Session {
    workbook: Option<Workbook>,
    targets: Option<Vec<TargetRecord>>,
    selected_sheets: Vec<String>,
    dataset: Option<Dataset>,
    selected_client: Option<String>,
    view: ViewKind,
}

impl Session {
    /// Replace the session with the contents of a new file. A failed load
    /// leaves an empty session behind.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        *self = Session::default();
        let workbook = load_workbook(path)?;
        info!("Loaded {}", workbook.path.display());
        self.targets = targets_from_workbook(&workbook);
        self.workbook = Some(workbook);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.workbook.is_some()
    }

    /// All sheet names, including the AM sheet.
    pub fn all_sheet_names(&self) -> Vec<&str> {
        self.workbook.as_ref().map(Workbook::sheet_names).unwrap_or_default()
    }

    /// Sheets the user can pick as data.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.workbook
            .as_ref()
            .map(Workbook::data_sheet_names)
            .unwrap_or_default()
    }

    pub fn find_sheets(&self, term: &str) -> Vec<&str> {
        search_sheets(&self.sheet_names(), term)
    }

    pub fn selected_sheets(&self) -> &[String] {
        &self.selected_sheets
    }

    pub fn select_sheets(&mut self, selection: &SheetSelection) {
        self.selected_sheets = match selection {
            SheetSelection::All => self.sheet_names().into_iter().map(str::to_string).collect(),
            SheetSelection::Named(names) => names.clone(),
        };
    }

    pub fn toggle_sheet(&mut self, name: &str) {
        if let Some(pos) = self.selected_sheets.iter().position(|s| s == name) {
            self.selected_sheets.remove(pos);
        } else {
            self.selected_sheets.push(name.to_string());
        }
    }

    /// Select every data sheet, or clear the selection if all are selected.
    pub fn toggle_all(&mut self) {
        let all = self.sheet_names().len();
        if all > 0 && self.selected_sheets.len() == all {
            self.selected_sheets.clear();
        } else {
            self.select_sheets(&SheetSelection::All);
        }
    }

    pub fn generate(&mut self, opts: &ExtractOptions) -> Result<&Dataset> {
        let workbook = self.workbook.as_ref().ok_or(AppError::NoWorkbook)?;
        if self.selected_sheets.is_empty() {
            return Err(AppError::NoSheetsSelected);
        }
        let dataset = extract_sheet_data(workbook, &self.selected_sheets, opts)?;
        info!(
            "Successfully analyzed data from {} {}",
            self.selected_sheets.len(),
            if self.selected_sheets.len() == 1 { "sheet" } else { "sheets" }
        );
        self.selected_client = None;
        Ok(&*self.dataset.insert(dataset))
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn client_names(&self) -> Vec<String> {
        self.dataset.as_ref().map(|d| client_names(&d.rows)).unwrap_or_default()
    }

    pub fn set_client(&mut self, client: Option<String>) {
        if let Some(name) = client.as_deref() {
            if !self.client_names().iter().any(|c| c == name) {
                warn!("Client \"{}\" has no rows in the current data", name);
            }
        }
        self.selected_client = client;
    }

    pub fn selected_client(&self) -> Option<&str> {
        self.selected_client.as_deref()
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn set_view(&mut self, view: ViewKind) {
        self.view = view;
    }

    pub fn has_targets(&self) -> bool {
        self.targets.is_some()
    }

    pub fn filtered_rows(&self) -> Vec<Row> {
        match &self.dataset {
            Some(d) => filter_by_client(&d.rows, self.selected_client.as_deref()),
            None => Vec::new(),
        }
    }

    /// Executive rows; only offered while no single client is selected.
    pub fn executive(&self, reference_date: NaiveDate) -> Vec<ExecutiveRow> {
        match (&self.dataset, self.selected_client.is_none()) {
            (Some(d), true) => executive_rows(d, self.targets.as_deref(), reference_date),
            _ => Vec::new(),
        }
    }

    pub fn summary_cards(&self) -> Option<SummaryCards> {
        let dataset = self.dataset.as_ref()?;
        summary_cards(&self.filtered_rows(), &dataset.schema)
    }

    /// Rows exactly as they would be written for the current view.
    ///
    /// `with_executive` controls whether the executive block may be appended;
    /// previews show that block separately.
    pub fn table(
        &self,
        reference_date: NaiveDate,
        include_client_summaries: bool,
        with_executive: bool,
    ) -> Result<ExportTable> {
        let dataset = self.dataset.as_ref().ok_or(AppError::NoData)?;
        let filtered = self.filtered_rows();
        let targets = if with_executive {
            self.targets.as_deref()
        } else {
            None
        };
        Ok(build_export_rows(&ExportRequest {
            view: self.view,
            filtered: &filtered,
            dataset,
            selected_client: self.selected_client.as_deref(),
            targets,
            reference_date,
            include_client_summaries,
        }))
    }
}
