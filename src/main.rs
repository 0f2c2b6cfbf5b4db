use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use benchsift_batch::{BatchEvaluator, BatchReport, OracleSetup};
use benchsift_core::{BenchsiftConfig, CONFIG_FILE_NAME};
use benchsift_eligibility::PatchRetriever;
use benchsift_forge::{ForgeKind, RepoSlug};
use benchsift_git::{GitCli, WorkingTree};
use benchsift_judge::Judge;
use benchsift_oracle::RunnerRegistry;

const LLM_KEY_ENV: &str = "BENCHSIFT_LLM_API_KEY";

#[derive(Parser)]
#[command(
    name = "benchsift",
    version,
    about = "Mine merged pull requests for regression-test benchmark tasks",
    long_about = "benchsift walks a repository's merged pull requests, keeps the ones that make\n\
                   good benchmark tasks, and checks that their tests fail before the fix and\n\
                   pass after it.\n\n\
                   Examples:\n  \
                     benchsift evaluate psf/requests --repo-path ./requests\n  \
                     benchsift evaluate bitbucket:team/app --max-prs 50 --skip-oracle\n  \
                     benchsift init                      Create a .benchsift.toml\n  \
                     benchsift doctor --repo-path .      Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .benchsift.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a repository's merged pull requests
    #[command(long_about = "Evaluate a repository's merged pull requests.\n\n\
        Every PR runs through the eligibility filters. Accepted PRs are then checked\n\
        out at base and head in the local clone and their tests are run to find\n\
        fail-to-pass and pass-to-pass tests.\n\n\
        Examples:\n  benchsift evaluate psf/requests --repo-path ../requests\n  \
        benchsift evaluate https://bitbucket.org/team/app --output report.json")]
    Evaluate {
        /// Repository: owner/name, github:owner/name, bitbucket:owner/name or a URL
        repo: String,

        /// Local clone used for diffs and test runs
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,

        /// Force the forge instead of detecting it from the repository
        #[arg(long)]
        forge: Option<String>,

        /// API token (default: GITHUB_TOKEN or BITBUCKET_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Stop after this many PRs (0 = all)
        #[arg(long, default_value = "0")]
        max_prs: usize,

        /// Only consider PRs merged after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        merged_after: Option<String>,

        /// Skip the base/head test runs
        #[arg(long)]
        skip_oracle: bool,

        /// Score accepted PRs with the LLM judge
        #[arg(long)]
        judge: bool,

        /// Concurrent candidate evaluations
        #[arg(long)]
        workers: Option<usize>,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write one JSON record per PR
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Create a default .benchsift.toml configuration file
    #[command(long_about = "Create a default .benchsift.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .benchsift.toml already exists.")]
    Init,
    /// Check your benchsift setup and environment
    #[command(long_about = "Check your benchsift setup and environment.\n\n\
        Runs diagnostics for git, the local clone, the config file, forge and LLM\n\
        tokens, and the test runner the oracle would use. Use --format json for\n\
        machine-readable output.")]
    Doctor {
        /// Local clone to inspect
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,

        /// Language to pick a test runner for (default: detect from markers)
        #[arg(long)]
        language: Option<String>,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Machine-readable JSON
    Json,
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}

fn load_config(path: Option<&Path>) -> Result<BenchsiftConfig> {
    let config = match path {
        Some(path) => BenchsiftConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE_NAME);
            if default_path.exists() {
                BenchsiftConfig::from_file(default_path)?
            } else {
                BenchsiftConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid date '{value}' (expected YYYY-MM-DD or RFC 3339)"))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

/// Flag, then environment, then config file.
fn first_set(flag: Option<String>, env: &str, file: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
        .or(file)
}

#[allow(clippy::too_many_arguments)]
async fn run_evaluate(
    mut config: BenchsiftConfig,
    repo: &str,
    repo_path: &Path,
    forge: Option<&str>,
    token: Option<String>,
    max_prs: usize,
    merged_after: Option<&str>,
    skip_oracle: bool,
    judge: bool,
    workers: Option<usize>,
) -> Result<BatchReport> {
    let kind = ForgeKind::detect(forge, repo)?;
    let slug = RepoSlug::parse(repo)?;
    let token = first_set(token, kind.token_env(), config.forge.token.clone());
    if token.is_none() {
        tracing::warn!(forge = %kind, "no API token; rate limits will be low");
    }

    if let Some(date) = merged_after {
        config.filters.merged_after = Some(parse_date(date)?);
    }
    if let Some(workers) = workers {
        config.batch.workers = workers;
    }
    if skip_oracle {
        config.oracle.enabled = false;
    }
    if judge {
        config.judge.enabled = true;
    }
    config.judge.api_key = first_set(None, LLM_KEY_ENV, config.judge.api_key.clone());

    let connection = benchsift_forge::connect(kind, &slug, token, &config.forge)?;
    let git_timeout = Duration::from_secs(config.oracle.git_timeout_secs);
    let git = Arc::new(GitCli::new(repo_path, git_timeout));
    let retriever = Arc::new(PatchRetriever::new(git.clone(), connection.diffs));

    let judge = if config.judge.enabled {
        Some(Judge::from_config(&config.judge)?)
    } else {
        None
    };
    let oracle = if config.oracle.enabled {
        let tree = WorkingTree::open(repo_path, git_timeout)
            .wrap_err("the regression oracle needs a local clone (or pass --skip-oracle)")?;
        Some(OracleSetup {
            tree: Arc::new(tree),
            git,
            registry: RunnerRegistry::with_defaults(),
        })
    } else {
        None
    };

    let mut evaluator = BatchEvaluator::new(config, slug.full_name(), connection.forge, retriever);
    if let Some(setup) = oracle {
        evaluator = evaluator.with_oracle(setup);
    }
    if let Some(judge) = judge {
        evaluator = evaluator.with_judge(judge);
    }
    if std::io::stderr().is_terminal() {
        let bar = indicatif::ProgressBar::new(0);
        bar.set_style(
            indicatif::ProgressStyle::with_template("{bar:30.cyan} {pos}/{len} {msg} ({elapsed})")
                .into_diagnostic()?,
        );
        evaluator = evaluator.with_progress(bar);
    }

    Ok(evaluator.run((max_prs > 0).then_some(max_prs)).await)
}

fn print_summary(report: &BatchReport, use_color: bool) {
    let (bold, reset) = if use_color { ("\x1b[1m", "\x1b[0m") } else { ("", "") };
    println!(
        "{bold}{}{reset} ({}, {})\n",
        report.repository, report.forge, report.language
    );
    println!("Total PRs analyzed: {}", report.total_prs);
    println!(
        "Accepted: {} ({:.1}%), verified by tests: {}",
        report.accepted,
        report.acceptance_rate * 100.0,
        report.verified
    );
    println!("Rejected: {}", report.rejected);

    if !report.rejection_breakdown.is_empty() {
        println!("\nRejection breakdown:");
        let mut rows: Vec<_> = report.rejection_breakdown.iter().collect();
        rows.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(b.0)));
        for (code, stats) in rows {
            println!("  {code:<32} {:>4} ({}%)", stats.count, stats.percentage);
        }
    }

    if let Some(reason) = &report.oracle_skipped_reason {
        println!("\nRegression oracle skipped: {reason}");
    }

    let accepted: Vec<_> = report.accepted_records().collect();
    if !accepted.is_empty() {
        println!("\nAccepted PRs:");
        for record in accepted {
            let tests = match &record.regression {
                Some(r) if r.is_valid() => format!("F2P {}, P2P {}", r.f2p.len(), r.p2p.len()),
                _ => "unverified".into(),
            };
            println!("  #{:<6} {}  [{tests}]", record.number, record.title);
        }
    }
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> String {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m".into(),
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m".into(),
            (_, true) => "\x1b[33m~\x1b[0m".into(),
            ("pass", false) => "\u{2713}".into(),
            ("fail", false) => "\u{2717}".into(),
            _ => "~".into(),
        }
    }
}

async fn run_doctor(
    config_path: Option<&Path>,
    repo_path: &Path,
    language: Option<&str>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. git binary
    match benchsift_git::GitCommand::new(".", Duration::from_secs(10))
        .run(&["--version"])
        .await
    {
        Ok(version) => checks.push(CheckResult::pass("git", version.trim().to_string())),
        Err(e) => checks.push(CheckResult::fail(
            "git",
            e.to_string(),
            "install git and make sure it is on PATH",
        )),
    }

    // 2. Local clone
    if benchsift_git::repo::is_git_repo(repo_path) {
        checks.push(CheckResult::pass(
            "local_clone",
            format!("git repository at {}", repo_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "local_clone",
            format!("{} is not a git repository", repo_path.display()),
            "clone the repository and pass --repo-path",
        ));
    }

    // 3. Config file
    let config = match load_config(config_path) {
        Ok(config) => {
            let detail = match config_path {
                Some(path) => format!("{} parsed", path.display()),
                None if Path::new(CONFIG_FILE_NAME).exists() => format!("{CONFIG_FILE_NAME} parsed"),
                None => "using defaults".into(),
            };
            checks.push(CheckResult::pass("config_file", detail));
            config
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "config_file",
                e.to_string(),
                "fix the file or run 'benchsift init' in an empty directory",
            ));
            BenchsiftConfig::default()
        }
    };

    // 4. Forge tokens
    for kind in [ForgeKind::GitHub, ForgeKind::Bitbucket] {
        let env = kind.token_env();
        if std::env::var(env).is_ok() || config.forge.token.is_some() {
            checks.push(CheckResult::pass("forge_token", format!("{env} set")));
        } else {
            checks.push(CheckResult::info(
                "forge_token",
                format!("{env} not set (anonymous {kind} requests are rate limited)"),
            ));
        }
    }

    // 5. LLM judge
    if config.judge.enabled {
        if config.judge.api_key.is_some() || std::env::var(LLM_KEY_ENV).is_ok() {
            checks.push(CheckResult::pass(
                "llm_api_key",
                format!("{LLM_KEY_ENV} set (model: {})", config.judge.model),
            ));
        } else {
            checks.push(CheckResult::fail(
                "llm_api_key",
                format!("{LLM_KEY_ENV} not set"),
                format!("export {LLM_KEY_ENV}=... or set api_key in [judge]"),
            ));
        }
    } else {
        checks.push(CheckResult::info("llm_judge", "disabled"));
    }

    // 6. Test runner
    let registry = RunnerRegistry::with_defaults();
    let language = language.or(config.oracle.language.as_deref());
    match registry.select(repo_path, language) {
        Some(runner) => match runner.probe(repo_path).await {
            Ok(()) => checks.push(CheckResult::pass(
                "test_runner",
                format!("{} ({})", runner.name(), runner.language()),
            )),
            Err(e) => checks.push(CheckResult::fail(
                "test_runner",
                format!("{} detected but unusable: {e}", runner.name()),
                "install the project's test dependencies",
            )),
        },
        None => checks.push(CheckResult::fail(
            "test_runner",
            format!("no runner matches (tried {})", registry.names().join(", ")),
            "the oracle will be skipped; use --skip-oracle to silence this",
        )),
    }

    let version = env!("CARGO_PKG_VERSION");
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Text => {
            println!("benchsift v{version} environment check\n");
            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<16} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }
            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# benchsift configuration

[filters]
# min_test_files = 1
# max_non_test_files = 100
# min_total_files = 6
# max_test_files = 15
# max_code_files = 50
# min_code_changes = 1
# min_issue_words = 50
# max_issue_words = 500
# merged_after = "2024-01-01T00:00:00Z"
# english_threshold = 0.8
# data_extensions = [".json", ".csv", ".yaml"]

[oracle]
# enabled = true
# timeout_secs = 600
# git_timeout_secs = 120
# language = "Python"

[forge]
# page_size = 50
# max_retries = 3
# retry_base_ms = 1000
# max_wait_secs = 900
# request_timeout_secs = 30

[batch]
# workers = 4

[judge]
# enabled = false
# model = "gpt-4o"
# base_url = "https://api.openai.com"
# max_attempts = 3
# min_score = 0
# max_score = 3

# Per-language classification overrides
# [languages.Python]
# test_patterns = ["tests/**", "**/test_*.py", "**/*_test.py"]
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.log_json, level);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help().into_diagnostic()?;
        }
        Some(Command::Evaluate {
            repo,
            repo_path,
            forge,
            token,
            max_prs,
            merged_after,
            skip_oracle,
            judge,
            workers,
            output,
            records,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_evaluate(
                config,
                &repo,
                &repo_path,
                forge.as_deref(),
                token,
                max_prs,
                merged_after.as_deref(),
                skip_oracle,
                judge,
                workers,
            )
            .await?;

            if let Some(path) = &output {
                report.write_json(path)?;
                tracing::info!(path = %path.display(), "report written");
            }
            if let Some(path) = &records {
                report.write_records_jsonl(path)?;
                tracing::info!(path = %path.display(), "records written");
            }
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                OutputFormat::Text => print_summary(&report, use_color),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
        }
        Some(Command::Doctor {
            repo_path,
            language,
        }) => {
            run_doctor(
                cli.config.as_deref(),
                &repo_path,
                language.as_deref(),
                cli.format,
                use_color,
            )
            .await?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "benchsift", &mut std::io::stdout());
        }
    }

    Ok(())
}
