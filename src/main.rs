//! proxylint CLI
//!
//! Lints API proxy bundles: every XML file found under the given paths is
//! loaded into one bundle so cross-file rules can follow step references.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use proxylint::checks;
use proxylint::config::{ColorMode, Config, OutputFormat};
use proxylint::output::formatter_for;
use proxylint::{Engine, Rule, Severity};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "proxylint",
    version,
    about = "API proxy bundle linter",
    long_about = "Static analysis for API proxy bundles: policy naming, payload guards, endpoint counts and runtime calls to the management server."
)]
struct Cli {
    /// Files, directories or glob patterns to lint
    #[arg(default_value = ".")]
    paths: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Number of parallel jobs (0 = auto, 1 = sequential)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable: Option<Vec<String>>,

    /// Only enable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    select: Option<Vec<String>>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show help text and notes for each diagnostic
    #[arg(short, long)]
    verbose: bool,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Show detailed information about a specific rule
    #[arg(long, value_name = "RULE")]
    explain: Option<String>,

    /// Exit with 0 even if errors are found
    #[arg(long)]
    exit_zero: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Compact,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Compact => OutputFormat::Compact,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };

    config.merge_cli(
        cli.format.map(OutputFormat::from),
        cli.verbose.then_some(true),
        cli.jobs,
        cli.disable,
        cli.select,
    );

    let color = if cli.no_color {
        ColorMode::Never
    } else {
        config.output.color
    };
    let colored_output = match color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    };
    colored::control::set_override(colored_output);

    if cli.list_rules {
        list_rules(&config);
        return Ok(0);
    }

    if let Some(rule_id) = &cli.explain {
        let registry = checks::builtin(&config);
        let Some(rule) = registry.rules().find(|r| &r.id == rule_id) else {
            bail!(
                "Rule '{}' not found. Use {} to see all available rules",
                rule_id,
                "--list-rules".cyan()
            );
        };
        print!("{}", rule.explain());
        return Ok(0);
    }

    let engine = Engine::new(config);
    let files = engine.discover(&cli.paths)?;
    if files.is_empty() {
        bail!("No files found to lint");
    }
    log::info!("Linting {} files", files.len());

    let result = engine.lint(&files);

    let output = engine.config().output.clone();
    let formatter = formatter_for(output.format, colored_output, output.verbose);
    print!("{}", formatter.format(&result));

    if cli.exit_zero {
        Ok(0)
    } else {
        Ok(result.exit_code())
    }
}

fn list_rules(config: &Config) {
    let registry = checks::builtin(config);
    println!("{}", "Available rules".bold());
    println!();
    for rule in registry.rules() {
        print_rule(rule, config);
    }
}

fn print_rule(rule: &Rule, config: &Config) {
    let severity = match config.get_severity_override(&rule.id).unwrap_or(rule.severity) {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    };
    let marker = if config.should_run(rule) {
        "".normal()
    } else {
        " [disabled]".dimmed()
    };
    let scope = if rule.cross_file { ", cross-file" } else { "" };

    println!(
        "    {} [{}] ({}{}){}",
        rule.id.cyan(),
        severity,
        rule.category,
        scope,
        marker
    );
    if let Some(desc) = &rule.description {
        println!("      {}", desc);
    }
    if !rule.tags.is_empty() {
        println!("      Tags: {}", rule.tags.join(", "));
    }
}
