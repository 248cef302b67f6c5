//! Planfold CLI - SQL query rewriter front-end

mod cli;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use planfold_core::{rewrite_sql, MemoryCatalog, RewriteOptions, Severity};
use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use cli::{Args, Command, CommonArgs, EmitArgs, ExplainArgs, OutputFormat};

fn main() -> ExitCode {
    match run() {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("planfold: error: {e:#}");
            ExitCode::from(66)
        }
    }
}

fn run() -> Result<bool> {
    let args = Args::parse();
    match args.command {
        Command::Explain(explain) => run_explain(explain),
        Command::Emit(emit) => run_emit(emit),
    }
}

fn init_tracing(common: &CommonArgs) {
    if common.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    }
}

fn read_sql(common: &CommonArgs) -> Result<String> {
    if let Some(sql) = &common.sql {
        return Ok(sql.clone());
    }
    if let Some(path) = &common.file {
        return fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()));
    }
    let mut sql = String::new();
    io::stdin()
        .read_to_string(&mut sql)
        .context("reading SQL from stdin")?;
    Ok(sql)
}

fn load_catalog(common: &CommonArgs) -> Result<MemoryCatalog> {
    match &common.catalog {
        None => Ok(MemoryCatalog::new()),
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing catalog {}", path.display()))
        }
    }
}

fn options_of(common: &CommonArgs) -> RewriteOptions {
    RewriteOptions {
        dialect: common.dialect.into(),
        level: common.level.into(),
        hostvar_late_binding: common.late_binding,
        plan_cache_entries: if common.no_plan_cache { 0 } else { 1024 },
    }
}

fn run_explain(args: ExplainArgs) -> Result<bool> {
    init_tracing(&args.common);
    let sql = read_sql(&args.common)?;
    let catalog = load_catalog(&args.common)?;
    let options = options_of(&args.common);
    let program = rewrite_sql(&sql, &options, &catalog)?;

    output::print_issues(&program, args.common.quiet);
    let mut stdout = io::stdout().lock();
    match args.format {
        OutputFormat::Text => output::print_text(&program, &mut stdout)?,
        OutputFormat::Json => output::print_json(&program, &mut stdout)?,
    }
    stdout.flush()?;

    Ok(program
        .issues()
        .iter()
        .any(|issue| issue.severity == Severity::Error))
}

fn run_emit(args: EmitArgs) -> Result<bool> {
    init_tracing(&args.common);
    let sql = read_sql(&args.common)?;
    let catalog = load_catalog(&args.common)?;
    let options = options_of(&args.common);
    let program = rewrite_sql(&sql, &options, &catalog)?;
    output::print_issues(&program, args.common.quiet);

    let Some(root) = program.roots.first() else {
        bail!("no statement to emit");
    };
    let (arena, plan, header) =
        planfold_xasl::lower_statement(&program.graph, *root).context("lowering plan")?;
    let bytes = planfold_xasl::serialize(&arena, plan, &header).context("serializing plan")?;

    if args.check {
        let (loaded, _, loaded_header) =
            planfold_xasl::load(&bytes).context("reloading stream for --check")?;
        if loaded_header != header {
            bail!("stream check failed: header mismatch");
        }
        if loaded.is_empty() {
            bail!("stream check failed: empty plan");
        }
        eprintln!(
            "check ok: {} bytes, {} plan objects",
            bytes.len(),
            loaded.len()
        );
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            output::hex_dump(&bytes, &mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(false)
}
