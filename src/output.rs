use std::io::{self, Write};

use serde::Serialize;

use crate::aggregate::{AggregateReport, LinkAction};
use crate::app::{CompareResult, DemixRow, ProgressEvent, ProgressSink};
use crate::diagnostics::Notice;
use crate::error::SampleError;
use crate::merge::MergedTable;
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct TextOutput;

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{CYAN}{} ({:.2?}){RESET}", event.message, elapsed),
            None => eprintln!("{CYAN}{}{RESET}", event.message),
        }
    }
}

impl TextOutput {
    pub fn print_notices(notices: &[Notice]) {
        for notice in notices {
            let color = if notice.is_failure() { RED } else { YELLOW };
            eprintln!("{color}{notice}{RESET}");
        }
    }

    pub fn print_links(report: &AggregateReport) {
        Self::print_notices(&report.notices);
        for link in &report.links {
            if link.action == LinkAction::Planned {
                println!("{} -> {}", link.source, link.target);
            }
        }
        println!("{CYAN}summary{RESET}");
        println!("  files scanned: {}", report.files_scanned);
        println!("{GREEN}  linked: {}{RESET}", report.count(LinkAction::Linked));
        println!("  already present: {}", report.count(LinkAction::Exists));
        if report.count(LinkAction::Planned) > 0 {
            println!("  planned: {}", report.count(LinkAction::Planned));
        }
        println!("{RED}  failed: {}{RESET}", report.count(LinkAction::Failed));
        println!("{YELLOW}  notices: {}{RESET}", report.notices.len());
    }

    pub fn print_table(table: &MergedTable) -> Result<(), SampleError> {
        Self::print_notices(&table.notices);
        table.write_to(io::stdout().lock())
    }

    pub fn print_demix_row(row: &DemixRow) -> Result<(), SampleError> {
        Self::print_notices(&row.notices);
        let mut writer = table::writer(io::stdout().lock());
        writer.write_record(row.fields())?;
        writer
            .flush()
            .map_err(|err| SampleError::Filesystem(err.to_string()))
    }

    pub fn print_comparison(result: &CompareResult) {
        let report = &result.report;
        Self::print_notices(&report.notices);
        print!("{}", report.summary_text());
        for path in &result.artifacts {
            println!("{GREEN}wrote {path}{RESET}");
        }
    }
}
