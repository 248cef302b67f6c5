//! Rendering of rewrite results for the terminal.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use planfold_core::{RewrittenProgram, Severity};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonStatement<'a> {
    text: String,
    #[serde(flatten)]
    summary: &'a planfold_core::StatementSummary,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    statements: Vec<JsonStatement<'a>>,
    issues: &'a [planfold_core::Issue],
}

pub fn print_text(program: &RewrittenProgram, out: &mut impl Write) -> std::io::Result<()> {
    for (index, root) in program.roots.iter().enumerate() {
        let summary = &program.summaries[index];
        writeln!(out, "{}", program.graph.print_statement(*root))?;
        let mut notes = Vec::new();
        if summary.always_false {
            notes.push("always false".to_string());
        }
        if summary.partition_pruned {
            notes.push("partitions pruned".to_string());
        }
        if summary.cannot_prepare {
            notes.push("not cacheable".to_string());
        }
        if summary.auto_parameters > 0 {
            notes.push(format!("{} auto parameters", summary.auto_parameters));
        }
        if !notes.is_empty() {
            writeln!(out, "-- {}", notes.join(", "))?;
        }
    }
    Ok(())
}

pub fn print_json(program: &RewrittenProgram, out: &mut impl Write) -> anyhow::Result<()> {
    let report = JsonReport {
        statements: program
            .roots
            .iter()
            .zip(program.summaries.iter())
            .map(|(root, summary)| JsonStatement {
                text: program.graph.print_statement(*root),
                summary,
            })
            .collect(),
        issues: program.issues(),
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

/// Issues go to stderr, colored when it is a terminal.
pub fn print_issues(program: &RewrittenProgram, quiet: bool) {
    if quiet {
        return;
    }
    let color = std::io::stderr().is_terminal();
    for issue in program.issues() {
        let label = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "note",
        };
        let prefix = match issue.statement_index {
            Some(index) => format!("{label}[{}#{index}]", issue.code),
            None => format!("{label}[{}]", issue.code),
        };
        if color {
            match issue.severity {
                Severity::Error => eprintln!("{}: {}", prefix.red().bold(), issue.message),
                Severity::Warning => {
                    eprintln!("{}: {}", prefix.yellow().bold(), issue.message)
                }
                Severity::Info => eprintln!("{}: {}", prefix.dimmed(), issue.message),
            }
        } else {
            eprintln!("{prefix}: {}", issue.message);
        }
    }
}

/// Classic 16-byte-per-row hex dump for `emit` without an output file.
pub fn hex_dump(bytes: &[u8], out: &mut impl Write) -> std::io::Result<()> {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        write!(out, "{:08x}  ", row * 16)?;
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => write!(out, "{b:02x} ")?,
                None => write!(out, "   ")?,
            }
            if i == 7 {
                write!(out, " ")?;
            }
        }
        write!(out, " |")?;
        for b in chunk {
            let c = if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            };
            write!(out, "{c}")?;
        }
        writeln!(out, "|")?;
    }
    Ok(())
}
