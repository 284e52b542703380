use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use confres::check::check_tree;
use confres::diagnostics::{self, Diagnostic, Stage};
use confres::tree::{parse_tree_json, value_to_json};
use confres::util::{canonical_json, sha256_hex};
use confres::{resolve, resolve_document, ConfigError, ConfigResolveOptions, ConfigValue, Path};
use confres_contracts::CONFRES_REPORT_SCHEMA_VERSION;

const LOG_ENV: &str = "CONFRES_LOG";

#[derive(Parser)]
#[command(name = "confres")]
#[command(about = "Resolve substitutions in configuration trees.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Resolve a tree document and print the result as JSON.
    Resolve {
        #[arg(long)]
        input: PathBuf,
        /// Only resolve what is needed for the value at this path, and print it.
        #[arg(long, value_name = "PATH")]
        restrict: Option<String>,
        #[arg(long)]
        allow_unresolved: bool,
        #[arg(long)]
        report_json: bool,
    },
    /// Count what is left to resolve and check that the tree resolves.
    Check {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        report_json: bool,
    },
}

#[derive(Debug, Serialize)]
struct ConfresToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    exit_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, Value>,
}

struct Invocation {
    command: &'static str,
    input: PathBuf,
    report_json: bool,
}

impl Invocation {
    fn report(&self, exit_code: u8, diagnostics: Vec<Diagnostic>) -> ConfresToolReport {
        ConfresToolReport {
            schema_version: CONFRES_REPORT_SCHEMA_VERSION,
            command: self.command,
            ok: exit_code == 0,
            r#in: self.input.display().to_string(),
            diagnostics_count: diagnostics.len(),
            diagnostics,
            exit_code,
            result: None,
            result_sha256: None,
            meta: BTreeMap::new(),
        }
    }

    fn fail(&self, exit_code: u8, diagnostic: Diagnostic) -> Result<ExitCode> {
        if self.report_json {
            print_json(&self.report(exit_code, vec![diagnostic]))?;
        } else {
            eprintln!("{}: {}", diagnostic.code, diagnostic.message);
        }
        Ok(ExitCode::from(exit_code))
    }

    /// Reads and parses the input tree; `Err(code)` means a failure was already reported.
    fn load(&self) -> Result<std::result::Result<ConfigValue, ExitCode>> {
        let bytes = match std::fs::read(&self.input) {
            Ok(bytes) => bytes,
            Err(err) => {
                if self.report_json {
                    let diag = Diagnostic::error(
                        diagnostics::CODE_IO_READ,
                        Stage::Load,
                        format!("read input {}: {err}", self.input.display()),
                    );
                    return Ok(Err(self.fail(2, diag)?));
                }
                return Err(err)
                    .with_context(|| format!("read input: {}", self.input.display()));
            }
        };

        match parse_tree_json(&bytes, &self.input.display().to_string()) {
            Ok(root) => Ok(Ok(root)),
            Err(err) => Ok(Err(self.fail(2, Diagnostic::from(&err))?)),
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Resolve {
            input,
            restrict,
            allow_unresolved,
            report_json,
        } => {
            let inv = Invocation {
                command: "resolve",
                input,
                report_json,
            };
            let options = ConfigResolveOptions::defaults().with_allow_unresolved(allow_unresolved);
            cmd_resolve(&inv, restrict.as_deref(), options)
        }
        Cmd::Check { input, report_json } => {
            let inv = Invocation {
                command: "check",
                input,
                report_json,
            };
            cmd_check(&inv)
        }
    }
}

fn cmd_resolve(
    inv: &Invocation,
    restrict: Option<&str>,
    options: ConfigResolveOptions,
) -> Result<ExitCode> {
    let restrict = match restrict.map(Path::parse).transpose() {
        Ok(restrict) => restrict,
        Err(err) => return inv.fail(2, Diagnostic::from(&err)),
    };
    let root = match inv.load()? {
        Ok(root) => root,
        Err(code) => return Ok(code),
    };

    let resolved = match &restrict {
        None => resolve_document(&root, options),
        Some(path) => resolve_at(&root, path, options),
    };
    let value = match resolved {
        Ok(value) => value,
        Err(err) => return inv.fail(1, Diagnostic::from(&err)),
    };

    let json = value_to_json(&value);
    let text = canonical_json(&json);
    if inv.report_json {
        let mut report = inv.report(0, Vec::new());
        report.result_sha256 = Some(sha256_hex(text.as_bytes()));
        report.result = Some(json);
        print_json(&report)?;
    } else {
        println!("{text}");
    }
    Ok(ExitCode::SUCCESS)
}

fn resolve_at(
    root: &ConfigValue,
    path: &Path,
    options: ConfigResolveOptions,
) -> std::result::Result<ConfigValue, ConfigError> {
    let partial = resolve(root, root, options, Some(path.clone()))
        .map_err(|err| err.into_config_error(root.origin()))?;
    let found = match partial {
        Some(partial) => partial.peek_path(path)?,
        None => None,
    };
    found.ok_or_else(|| ConfigError::BadPath {
        input: path.render(),
        reason: "no value at this path".to_string(),
    })
}

fn cmd_check(inv: &Invocation) -> Result<ExitCode> {
    let root = match inv.load()? {
        Ok(root) => root,
        Err(code) => return Ok(code),
    };

    let checked = check_tree(&root, ConfigResolveOptions::defaults());
    let exit_code: u8 = if checked.ok { 0 } else { 1 };

    if inv.report_json {
        let mut report = inv.report(exit_code, checked.diagnostics);
        report.meta = checked.meta;
        print_json(&report)?;
    } else {
        let count = |key: &str| checked.meta.get(key).and_then(Value::as_u64).unwrap_or(0);
        println!(
            "{}: {} substitutions, {} merge stacks",
            inv.input.display(),
            count("substitutions"),
            count("merge_stacks")
        );
        for d in &checked.diagnostics {
            eprintln!("{}: {}", d.code, d.message);
        }
    }
    Ok(ExitCode::from(exit_code))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
