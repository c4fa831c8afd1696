// Entry point and high-level CLI flow.
//
// Batch mode loads a workbook, selects sheets, prints the chosen view and
// writes `workbook_summary.csv`. With `--interactive` the same steps are
// driven from a menu:
// - [1] loads a file (discarding whatever was loaded before),
// - [2] picks sheets, [3] generates the summary,
// - [4] and [5] choose the client and the view,
// - [6] exports the current view.
mod aggregate;
mod config;
mod error;
mod executive;
mod filter;
mod loader;
mod metrics;
mod normalize;
mod output;
mod schema;
mod session;
mod types;
mod util;

use clap::Parser;
use config::{Cli, Config, SheetSelection};
use error::{AppError, Result};
use once_cell::sync::Lazy;
use output::ViewKind;
use session::Session;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::error;
use tracing_subscriber::EnvFilter;
use util::format_int;

// The interactive menu keeps one session alive across choices so a workbook
// is read once but can be summarized many times.
static APP_STATE: Lazy<Mutex<Session>> = Lazy::new(|| Mutex::new(Session::default()));

fn state() -> MutexGuard<'static, Session> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Print a prompt and read one trimmed line of input.
fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

fn read_choice() -> String {
    prompt("Enter choice: ")
}

/// Print the current view of the session: summary cards, the table, and the
/// executive block when it applies.
fn render(session: &Session, config: &Config) -> Result<()> {
    println!("Summary Report");
    match session.selected_client() {
        Some(client) => println!("(Client: {})\n", client),
        None => println!("(All clients)\n"),
    }

    if let Some(cards) = session.summary_cards() {
        println!("Summary of Filtered Data ({} rows)", format_int(cards.records));
        for card in &cards.cards {
            match card.description {
                Some(desc) => println!("  {:<24} {:>14}   ({})", card.label, card.value, desc),
                None => println!("  {:<24} {:>14}", card.label, card.value),
            }
        }
        println!();
    }

    let table = session.table(config.reference_date, config.include_client_summaries, false)?;
    if table.is_empty() {
        println!("No data to display. Please check your filter settings.\n");
        return Ok(());
    }
    output::preview_table(&table, config.preview_rows);
    println!(
        "Showing {} {}\n",
        format_int(table.records.len()),
        if table.records.len() == 1 { "record" } else { "records" }
    );

    if session.view() == ViewKind::Summary && session.has_targets() && session.selected_client().is_none() {
        println!(
            "Executive Summary ({}, {})\n",
            config.reference_date.format("%A %Y-%m-%d"),
            config.timezone
        );
        output::preview_executive(&session.executive(config.reference_date));
    }
    Ok(())
}

fn export(session: &Session, config: &Config) -> Result<()> {
    let table = session.table(config.reference_date, config.include_client_summaries, true)?;
    if table.is_empty() {
        return Err(AppError::NoData);
    }
    output::write_csv(&config.out, &table)?;
    println!("(Full table exported to {})\n", config.out.display());
    if let Some(json_path) = &config.json {
        if let Some(cards) = session.summary_cards() {
            output::write_json(json_path, &cards)?;
            println!("(Summary cards written to {})\n", json_path.display());
        }
    }
    Ok(())
}

fn run_batch(config: &Config) -> Result<()> {
    let input = config.input.as_ref().ok_or(AppError::NoWorkbook)?;
    let mut session = Session::default();
    session.load(input)?;

    if config.list_sheets {
        for name in session.all_sheet_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    session.select_sheets(&config.sheets);
    session.generate(&config.extract)?;
    session.set_client(config.client.clone());
    session.set_view(config.view);

    render(&session, config)?;
    export(&session, config)
}

fn handle_load(config: &Config) {
    let path = match &config.input {
        Some(p) => {
            let typed = prompt(&format!("File path [{}]: ", p.display()));
            if typed.is_empty() { p.clone() } else { PathBuf::from(typed) }
        }
        None => PathBuf::from(prompt("File path: ")),
    };
    let mut session = state();
    match session.load(&path) {
        Ok(()) => {
            let names = session.sheet_names();
            println!(
                "File loaded successfully. Found {} {}.\n",
                names.len(),
                if names.len() == 1 { "sheet" } else { "sheets" }
            );
        }
        Err(e) => eprintln!("{}\n", e),
    }
}

fn handle_select_sheets() {
    let mut session = state();
    if !session.is_loaded() {
        println!("Error: {}\n", AppError::NoWorkbook);
        return;
    }
    loop {
        let names: Vec<String> = session.sheet_names().into_iter().map(str::to_string).collect();
        for (idx, name) in names.iter().enumerate() {
            let mark = if session.selected_sheets().contains(name) { "x" } else { " " };
            println!("[{}] {:>2}. {}", mark, idx + 1, name);
        }
        let all_selected = !names.is_empty() && session.selected_sheets().len() == names.len();
        println!(
            "Number toggles a sheet, A = {}, /text searches, D = done",
            if all_selected { "deselect all" } else { "select all" }
        );
        let choice = read_choice();
        if choice.eq_ignore_ascii_case("d") || choice.is_empty() {
            println!();
            return;
        }
        if choice.eq_ignore_ascii_case("a") {
            session.toggle_all();
        } else if let Some(term) = choice.strip_prefix('/') {
            let found = session.find_sheets(term);
            if found.is_empty() {
                println!("No sheets match \"{}\"\n", term);
            } else {
                println!("Matches: {}\n", found.join(", "));
            }
        } else {
            match choice.parse::<usize>().ok().and_then(|n| names.get(n.wrapping_sub(1))) {
                Some(name) => session.toggle_sheet(name),
                None => println!("Invalid choice.\n"),
            }
        }
    }
}

fn handle_generate(config: &Config) {
    let mut session = state();
    match session.generate(&config.extract) {
        Ok(ds) => println!("Summary generated: {} rows.\n", ds.rows.len()),
        Err(e) => {
            println!("Error: {}\n", e);
            return;
        }
    }
    if let Err(e) = render(&session, config) {
        println!("Error: {}\n", e);
    }
}

fn handle_client() {
    let mut session = state();
    let names = session.client_names();
    if names.is_empty() {
        println!("No clients found\n");
        return;
    }
    let term = prompt("Search clients (blank for all): ");
    let matches = filter::search(&names, &term);
    println!("[0] All Clients");
    for (idx, name) in matches.iter().enumerate() {
        println!("[{}] {}", idx + 1, name);
    }
    match read_choice().parse::<usize>() {
        Ok(0) => session.set_client(None),
        Ok(n) if n <= matches.len() => session.set_client(Some(matches[n - 1].to_string())),
        _ => println!("Invalid choice. Client filter unchanged."),
    }
    println!();
}

fn handle_view(config: &Config) {
    let mut session = state();
    let next = match session.view() {
        ViewKind::Summary => ViewKind::Detail,
        ViewKind::Detail => ViewKind::Summary,
    };
    session.set_view(next);
    println!("View: {:?}\n", next);
    if session.dataset().is_some() {
        if let Err(e) = render(&session, config) {
            println!("Error: {}\n", e);
        }
    }
}

fn handle_export(config: &Config) {
    let session = state();
    if let Err(e) = export(&session, config) {
        println!("Error: {}\n", e);
    }
}

fn run_interactive(config: &Config) -> Result<()> {
    {
        let mut session = state();
        session.set_view(config.view);
        if let Some(input) = &config.input {
            session.load(input)?;
            session.select_sheets(&config.sheets);
        }
    }
    loop {
        println!("Workbook Summary Generator");
        println!("[1] Load the file");
        println!("[2] Select sheets");
        println!("[3] Generate summary");
        println!("[4] Choose client");
        println!("[5] Switch detailed/summary view");
        println!("[6] Download CSV");
        println!("[0] Exit\n");
        match read_choice().as_str() {
            "1" => handle_load(config),
            "2" => handle_select_sheets(),
            "3" => handle_generate(config),
            "4" => handle_client(),
            "5" => handle_view(config),
            "6" => handle_export(config),
            "0" => {
                println!("Exiting the program.");
                return Ok(());
            }
            _ => println!("Invalid choice. Please enter 0-6.\n"),
        }
    }
}

fn run() -> Result<()> {
    let mut config = Config::from_cli(Cli::parse())?;
    if config.interactive {
        // Sheets are picked from the menu unless named on the command line.
        if config.sheets == SheetSelection::All {
            config.sheets = SheetSelection::Named(Vec::new());
        }
        run_interactive(&config)
    } else {
        run_batch(&config)
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        error!("{}", err);
        std::process::exit(1);
    }
}
