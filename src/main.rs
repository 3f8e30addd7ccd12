mod analysis;
mod app;
mod color;
mod config;
mod data;
mod error;
mod export;
mod insight;
mod report;
mod state;

use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use app::{Dashboard, FilterChange, Request, Response};
use config::Settings;
use data::cleaner::{CleanOptions, ImputeStrategy};
use insight::gemini::GeminiClient;

/// Business-data profiler: clean a table, compute KPIs, recommend charts
/// and ask an LLM about it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Data quality report and column profiles
    Profile(Common),
    /// KPI cards and financial ratios
    Kpis(Common),
    /// Recommended charts with their data
    Charts {
        #[command(flatten)]
        common: Common,
        /// Categories kept per bar chart (5-30)
        #[arg(long, default_value_t = analysis::charts::DEFAULT_TOP_N)]
        top_n: usize,
    },
    /// Profile, KPIs and charts together
    Report(Common),
    /// LLM analysis for one or more goals
    Analyze {
        #[command(flatten)]
        common: Common,
        /// Analysis goal (repeatable); `bizlens goals` lists templates
        #[arg(long = "goal", required = true)]
        goals: Vec<String>,
        /// Also ask for follow-up suggestions
        #[arg(long)]
        next_steps: bool,
    },
    /// Ask the LLM a question about the data
    Ask {
        #[command(flatten)]
        common: Common,
        question: String,
    },
    /// List analysis goal templates and common questions
    Goals,
    /// LLM executive summary
    Summary(Common),
    /// LLM financial deep-dive over revenue, margins, expenses and risk
    DeepDive(Common),
    /// LLM extraction of business figures from a PDF or text document
    Extract(Common),
    /// Write the cleaned (and filtered) table as delimited text
    Export {
        #[command(flatten)]
        common: Common,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
        /// Write the per-column KPI summary instead of the table
        #[arg(long)]
        metrics: bool,
    },
    /// Read one JSON request per line on stdin and answer each with one
    /// JSON response line, keeping a single session
    Session,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Impute {
    None,
    MeanMode,
}

#[derive(Args, Debug)]
struct Common {
    /// Input file (.csv, .xlsx, .xls, .pdf, .txt); `-` reads stdin
    file: PathBuf,

    /// File name used to pick the format when reading stdin
    #[arg(long, default_value = "stdin.csv")]
    name: String,

    #[arg(long)]
    drop_duplicates: bool,

    /// Fill missing values
    #[arg(long, value_enum, default_value_t = Impute::None)]
    impute: Impute,

    /// Keep rows where COLUMN equals VALUE (repeatable; values for the
    /// same column are combined)
    #[arg(long = "where", value_name = "COLUMN=VALUE")]
    filters: Vec<String>,

    /// Hide rows where COLUMN equals VALUE (repeatable)
    #[arg(long, value_name = "COLUMN=VALUE")]
    exclude: Vec<String>,

    #[arg(long)]
    date_column: Option<String>,
    #[arg(long, requires = "date_column")]
    from: Option<String>,
    #[arg(long, requires = "date_column")]
    to: Option<String>,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,
}

impl Common {
    fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            drop_duplicates: self.drop_duplicates,
            impute: match self.impute {
                Impute::None => ImputeStrategy::None,
                Impute::MeanMode => ImputeStrategy::MeanMode,
            },
        }
    }

    /// Group `--where` pairs by column, keeping first-seen column order,
    /// then apply `--exclude` toggles and the date window.
    fn filter_changes(&self) -> Result<Vec<FilterChange>> {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for pair in &self.filters {
            let (column, value) = split_pair("--where", pair)?;
            match grouped.iter_mut().find(|(c, _)| *c == column) {
                Some((_, values)) => values.push(value),
                None => grouped.push((column, vec![value])),
            }
        }
        let mut changes: Vec<FilterChange> = grouped
            .into_iter()
            .map(|(column, values)| FilterChange::Values { column, values })
            .collect();
        for pair in &self.exclude {
            let (column, value) = split_pair("--exclude", pair)?;
            changes.push(FilterChange::Toggle { column, value });
        }
        if let Some(column) = &self.date_column {
            changes.push(FilterChange::DateRange {
                column: column.clone(),
                from: self.from.clone(),
                to: self.to.clone(),
            });
        }
        Ok(changes)
    }
}

fn split_pair(flag: &str, pair: &str) -> Result<(String, String)> {
    let Some((column, value)) = pair.split_once('=') else {
        bail!("{flag} expects COLUMN=VALUE, got '{pair}'");
    };
    Ok((column.trim().to_string(), value.to_string()))
}

/// Print a response; error responses become a failed exit.
fn emit(response: Response, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", report::render(&response));
    }
    if let Response::Error { message, .. } = response {
        bail!(message);
    }
    Ok(())
}

/// Load, clean and filter the input.  Returns the dashboard ready for the command.
fn prepare(common: &Common, settings: &Settings, needs_llm: bool) -> Result<Dashboard<GeminiClient>> {
    let service = if needs_llm {
        Some(GeminiClient::new(settings).context("LLM client setup failed")?)
    } else {
        None
    };
    let mut dash = Dashboard::new(service);

    let open = if common.file.as_os_str() == "-" {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("reading stdin")?;
        Request::Upload {
            filename: common.name.clone(),
            bytes,
        }
    } else {
        Request::OpenFile(common.file.clone())
    };
    let mut setup = vec![open];
    let options = common.clean_options();
    if options != CleanOptions::default() {
        setup.push(Request::Clean(options));
    }
    setup.extend(common.filter_changes()?.into_iter().map(Request::SetFilter));

    for request in setup {
        let response = dash.handle(request);
        if response.is_error() {
            emit(response, common.json)?;
        }
    }
    Ok(dash)
}

fn run(cli: Cli, settings: &Settings) -> Result<()> {
    match cli.command {
        Command::Profile(common) => {
            let mut dash = prepare(&common, settings, false)?;
            emit(dash.handle(Request::Profile), common.json)
        }
        Command::Kpis(common) => {
            let mut dash = prepare(&common, settings, false)?;
            emit(dash.handle(Request::Kpis), common.json)
        }
        Command::Charts { common, top_n } => {
            let mut dash = prepare(&common, settings, false)?;
            emit(dash.handle(Request::Charts { top_n }), common.json)
        }
        Command::Report(common) => {
            let mut dash = prepare(&common, settings, false)?;
            emit(dash.handle(Request::Profile), common.json)?;
            // A table without numeric columns still gets its quality report.
            for request in [Request::Kpis, Request::Charts { top_n: analysis::charts::DEFAULT_TOP_N }] {
                let response = dash.handle(request);
                if let Response::Error { message, .. } = &response {
                    log::warn!("{message}");
                    continue;
                }
                emit(response, common.json)?;
            }
            Ok(())
        }
        Command::Analyze {
            common,
            goals,
            next_steps,
        } => {
            let mut dash = prepare(&common, settings, true)?;
            for goal in goals {
                emit(dash.handle(Request::AddGoal(goal)), common.json)?;
            }
            emit(dash.handle(Request::Analyze), common.json)?;
            if next_steps {
                emit(dash.handle(Request::NextSteps), common.json)?;
            }
            Ok(())
        }
        Command::Ask { common, question } => {
            let mut dash = prepare(&common, settings, true)?;
            emit(dash.handle(Request::Ask(question)), common.json)
        }
        Command::Goals => {
            println!("Analysis goals:");
            for template in insight::GOAL_TEMPLATES {
                println!("  {template}");
            }
            println!("Common questions:");
            for question in insight::COMMON_QUESTIONS {
                println!("  {question}");
            }
            Ok(())
        }
        Command::Summary(common) => {
            let mut dash = prepare(&common, settings, true)?;
            emit(dash.handle(Request::ExecutiveSummary), common.json)
        }
        Command::DeepDive(common) => {
            let mut dash = prepare(&common, settings, true)?;
            emit(dash.handle(Request::FinancialDeepDive), common.json)
        }
        Command::Extract(common) => {
            let mut dash = prepare(&common, settings, true)?;
            emit(dash.handle(Request::ExtractDocument), common.json)
        }
        Command::Export {
            common,
            output,
            delimiter,
            metrics,
        } => {
            if !delimiter.is_ascii() {
                bail!("delimiter must be a single ASCII character");
            }
            let delimiter = delimiter as u8;
            let mut dash = prepare(&common, settings, false)?;
            let response = dash.handle(if metrics {
                Request::ExportMetrics { delimiter }
            } else {
                Request::Export { delimiter }
            });
            let Response::Exported { rows, content } = response else {
                return emit(response, common.json);
            };
            std::fs::write(&output, content)
                .with_context(|| format!("writing {}", output.display()))?;
            log::info!("Wrote {rows} rows to {}", output.display());
            println!("Wrote {rows} rows to {}", output.display());
            Ok(())
        }
        Command::Session => run_session(settings),
    }
}

/// Line-delimited JSON session over stdin/stdout.  A malformed line gets an
/// `invalid_request` error response and the session carries on.
fn run_session(settings: &Settings) -> Result<()> {
    let service = match GeminiClient::new(settings) {
        Ok(client) => Some(client),
        Err(e) => {
            log::warn!("LLM actions disabled: {e}");
            None
        }
    };
    let mut dash = Dashboard::new(service);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dash.handle(request),
            Err(e) => Response::Error {
                kind: error::ErrorKind::InvalidRequest,
                message: format!("Invalid request: {e}"),
            },
        };
        serde_json::to_writer(&mut out, &response)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    config::load_env();
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    run(cli, &settings)
}
