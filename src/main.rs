//! rsyara 命令行：编译规则文件并扫描目标文件

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use rsyara::utils::preview_bytes;
use rsyara::{Compiler, Scanner, Variable};

/// Scan a file with YARA-style rules
#[derive(Parser, Debug)]
#[command(name = "rsyara")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rule files followed by the file to scan
    #[arg(required = true, num_args = 2..)]
    paths: Vec<PathBuf>,

    /// Define an external variable (name=value)
    #[arg(short = 'd', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Print matched data
    #[arg(short = 's', long = "print-strings")]
    print_strings: bool,

    /// Fail on slow patterns instead of warning
    #[arg(long)]
    strict: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// `-d` 取值：bool → 整数 → 浮点 → 字符串
fn parse_define(raw: &str) -> Result<(String, Variable)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("invalid definition `{}`, expected NAME=VALUE", raw);
    };
    let value = if let Ok(b) = value.parse::<bool>() {
        Variable::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        Variable::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        Variable::Float(f)
    } else {
        Variable::String(value.to_string())
    };
    Ok((name.to_string(), value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let Some((target, rule_files)) = cli.paths.split_last() else {
        bail!("missing scan target");
    };

    let config = rsyara::CompilerConfig::custom()
        .error_on_slow_pattern(cli.strict)
        .build();
    let mut compiler = Compiler::with_config(config);
    for raw in &cli.defines {
        let (name, value) = parse_define(raw)?;
        compiler.define_global(&name, value)?;
    }
    for path in rule_files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules from {}", path.display()))?;
        compiler.add_source_with_origin(&text, &path.display().to_string())?;
    }
    let rules = compiler.build()?;

    let data = std::fs::read(target)
        .with_context(|| format!("failed to read {}", target.display()))?;
    let results = Scanner::new(&rules).scan(&data);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for rule in &results {
        if rule.tags.is_empty() {
            println!("{} {}", rule.name, target.display());
        } else {
            println!("{} [{}] {}", rule.name, rule.tags.join(","), target.display());
        }
        if cli.print_strings {
            for pattern in &rule.patterns {
                for m in &pattern.matches {
                    let bytes = &data[m.offset..m.offset + m.length];
                    println!("0x{:x}:${}: {}", m.offset, pattern.identifier, preview_bytes(bytes, 64));
                }
            }
        }
    }
    for error in results.errors() {
        eprintln!("error: rule `{}`: {}", error.rule, error.error);
    }
    Ok(())
}
