//! CLI argument parsing using clap.

use clap::{Parser, Subcommand, ValueEnum};
use planfold_core::{Dialect, OptimizationLevel};
use std::path::PathBuf;

/// Planfold - SQL query rewriter and plan serializer
#[derive(Parser, Debug)]
#[command(name = "planfold")]
#[command(about = "Rewrite SQL statements and emit XASL plan streams", long_about = None)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse, rewrite, and print the normalized statements
    Explain(ExplainArgs),
    /// Rewrite, lower, and serialize the first statement to an XASL stream
    Emit(EmitArgs),
}

#[derive(Parser, Debug)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct EmitArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write the stream to this file; hex-dumps to stdout otherwise
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Reload the stream and verify the shared-structure invariant
    #[arg(long)]
    pub check: bool,
}

#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// SQL text; reads stdin when absent and no --file given
    #[arg(value_name = "SQL")]
    pub sql: Option<String>,

    /// Read SQL from a file
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// SQL dialect
    #[arg(short, long, default_value = "generic", value_enum)]
    pub dialect: DialectArg,

    /// Optimization level
    #[arg(long, default_value = "full", value_enum)]
    pub level: LevelArg,

    /// Bind host variables at execution time; keeps literals in place
    #[arg(long)]
    pub late_binding: bool,

    /// Disable the plan cache (and with it auto-parameterization)
    #[arg(long)]
    pub no_plan_cache: bool,

    /// JSON partition-catalog file
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Suppress warnings on stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Log rewrite passes to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DialectArg {
    Generic,
    Postgres,
    Mysql,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Generic => Dialect::Generic,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::Mysql,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LevelArg {
    Off,
    Full,
}

impl From<LevelArg> for OptimizationLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Off => OptimizationLevel::Off,
            LevelArg::Full => OptimizationLevel::Full,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}
