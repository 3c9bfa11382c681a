//! DP Compiler CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dp_core::{
    lex, parse, CancelToken, CompilationSession, DiagnosticSink, FsResolver, SirStatement,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dpc")]
#[command(author, version, about = "DP Compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check source files for errors
    Check {
        /// Input file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Dump the token stream
    Tokens {
        /// Input file to lex
        file: PathBuf,
    },

    /// Parse and dump the AST
    Ast {
        /// Input file to parse
        file: PathBuf,

        /// Pretty print
        #[arg(short, long)]
        pretty: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Compile and summarize the label set
    Labels {
        /// Input file to compile
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { files } => check(files).await,
        Commands::Tokens { file } => dump_tokens(file),
        Commands::Ast { file, pretty, json } => dump_ast(file, pretty, json),
        Commands::Labels { file } => dump_labels(file).await,
    }
}

async fn check(files: Vec<PathBuf>) -> Result<()> {
    let session = CompilationSession::new(Arc::new(FsResolver::new()));
    let mut failed = false;

    for file in &files {
        let source_id = file.to_string_lossy();
        let result = session
            .compile(&source_id, &CancelToken::new())
            .await
            .with_context(|| format!("Failed to compile {}", file.display()))?;

        for diag in &result.diagnostics {
            eprintln!("{}:{}", file.display(), diag);
        }
        if !result.success {
            failed = true;
        }
    }

    if failed {
        anyhow::bail!("Check failed");
    }
    eprintln!("OK: {} file(s) checked", files.len());
    Ok(())
}

fn dump_tokens(file: PathBuf) -> Result<()> {
    let source = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let mut sink = DiagnosticSink::new();
    let tokens = lex(&source, &mut sink);
    for token in &tokens {
        println!("{}", token);
    }
    if !sink.is_empty() {
        eprintln!("{}", sink.render(&file.display().to_string()));
    }
    Ok(())
}

fn dump_ast(file: PathBuf, pretty: bool, json: bool) -> Result<()> {
    let source = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let mut sink = DiagnosticSink::new();
    let tokens = lex(&source, &mut sink);
    let program = parse(tokens, &mut sink);

    if json {
        if pretty {
            println!(
                "{}",
                serde_json::to_string_pretty(&program).context("Failed to serialize AST to JSON")?
            );
        } else {
            println!(
                "{}",
                serde_json::to_string(&program).context("Failed to serialize AST to JSON")?
            );
        }
    } else if pretty {
        println!("{:#?}", program);
    } else {
        println!("{:?}", program);
    }

    if !sink.is_empty() {
        eprintln!("{}", sink.render(&file.display().to_string()));
    }
    Ok(())
}

async fn dump_labels(file: PathBuf) -> Result<()> {
    let session = CompilationSession::new(Arc::new(FsResolver::new()));
    let source_id = file.to_string_lossy();
    let result = session
        .compile(&source_id, &CancelToken::new())
        .await
        .with_context(|| format!("Failed to compile {}", file.display()))?;

    for diag in &result.diagnostics {
        eprintln!("{}:{}", file.display(), diag);
    }

    println!("entrance: {}", result.labels.entrance);
    for (name, label) in result.labels.iter() {
        println!(
            "label {} ({}): {} statement(s)",
            name,
            label.source_id,
            count_statements(&label.statements)
        );
    }

    if !result.success {
        anyhow::bail!("Compilation failed");
    }
    Ok(())
}

/// Statements including nested menu and if bodies.
fn count_statements(statements: &[SirStatement]) -> usize {
    statements
        .iter()
        .map(|stmt| match stmt {
            SirStatement::Menu { items } => {
                1 + items
                    .iter()
                    .map(|arm| count_statements(&arm.body))
                    .sum::<usize>()
            }
            SirStatement::If {
                then_body,
                else_body,
                ..
            } => 1 + count_statements(then_body) + count_statements(else_body),
            _ => 1,
        })
        .sum()
}
