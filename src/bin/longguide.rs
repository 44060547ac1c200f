#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use longguide::gateway::{ModelGateway, TracingUsageSink};
use longguide::guidelines::{
    ConstraintForm, GuidelineReport, MetricsGuidelines, OutputConstraintsGuidelines,
};
use longguide::prompts::TaskPromptVariant;
use longguide::run::{load_records, save_records, GenerationRun};
use longguide::text::RuleBasedAnalyzer;
use longguide::{evaluate, load_dataset, GuideConfig};

#[derive(Parser)]
#[command(name = "longguide", version, about = "Guideline synthesis for long-form generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover metrics, judge them and print the metric guideline
    Metrics {
        #[arg(long)]
        config: PathBuf,
        /// Dataset file or directory of *.json files
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the output constraint guideline (no model calls)
    Constraints {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "range")]
        form: ConstraintForm,
        /// Use only the first N items
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Build both guidelines and write a report
    Guidelines {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Generate outputs with guideline-augmented prompts
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        data: PathBuf,
        /// Report written by `guidelines`
        #[arg(long)]
        guidelines: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "full")]
        variant: TaskPromptVariant,
    },
    /// Score generation records with ROUGE-L
    Evaluate {
        #[arg(long)]
        results: PathBuf,
        #[arg(long, default_value = "summarization")]
        task: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "longguide=info".into()),
        ))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Metrics { config, data, out } => {
            let cfg = GuideConfig::load(&config)?;
            let items = load_dataset(&data)?;
            let gateway = ModelGateway::from_env(
                cfg.model_name.clone(),
                Arc::new(TracingUsageSink),
                cfg.gateway_config(),
            )?;

            let guideline = MetricsGuidelines::new(&gateway, cfg.task_type.clone())
                .discovery(cfg.discovery.clone())
                .judge(cfg.judge.clone())
                .generate_options(cfg.generate_options())
                .rng_seed(cfg.rng_seed)
                .build(&items)
                .await?;

            if let Some(out) = out {
                write_json(&out, &guideline)?;
                info!(path = %out.display(), "metric guideline written");
            }
            println!("{}", guideline.text);
        }
        Commands::Constraints { data, form, limit } => {
            let items = load_dataset(&data)?;
            let analyzer = RuleBasedAnalyzer;
            let guideline = OutputConstraintsGuidelines::new(&analyzer)
                .form(form)
                .limit(limit)
                .build(&items)?;
            println!("{}", serde_json::to_string_pretty(&guideline)?);
        }
        Commands::Guidelines { config, data, out } => {
            let cfg = GuideConfig::load(&config)?;
            let items = load_dataset(&data)?;
            let gateway = ModelGateway::from_env(
                cfg.model_name.clone(),
                Arc::new(TracingUsageSink),
                cfg.gateway_config(),
            )?;

            let metric = MetricsGuidelines::new(&gateway, cfg.task_type.clone())
                .discovery(cfg.discovery.clone())
                .judge(cfg.judge.clone())
                .generate_options(cfg.generate_options())
                .rng_seed(cfg.rng_seed)
                .build(&items)
                .await?;

            let analyzer = RuleBasedAnalyzer;
            let constraint = OutputConstraintsGuidelines::new(&analyzer)
                .form(cfg.constraints.form)
                .limit(cfg.constraints.sample_size)
                .build(&items)?;

            let report = GuidelineReport::new(&cfg.task_type, gateway.model(), metric, constraint);
            report.save(&out)?;
            info!(id = %report.id, path = %out.display(), "guideline report written");
        }
        Commands::Run {
            config,
            data,
            guidelines,
            out,
            variant,
        } => {
            let cfg = GuideConfig::load(&config)?;
            let items = load_dataset(&data)?;
            let report = GuidelineReport::load(&guidelines)?;
            let gateway = ModelGateway::from_env(
                cfg.model_name.clone(),
                Arc::new(TracingUsageSink),
                cfg.gateway_config(),
            )?;

            let mut run = GenerationRun::new(&gateway, &cfg.task_type)
                .variant(variant)
                .generate_options(cfg.generate_options());
            if let Some(instruction) = cfg.instruction.clone() {
                run = run.instruction(instruction);
            }
            let records = run
                .run(&items, &report.metric_guideline, &report.constraint_guideline)
                .await;
            save_records(&out, &records)?;
            info!(records = records.len(), path = %out.display(), "generation records written");
        }
        Commands::Evaluate { results, task } => {
            let records = load_records(&results)?;
            let summary = evaluate(&records, &task)?;
            println!("ROUGE-L: {:.4}", summary.mean_rouge_l);
            println!("Evaluated {} examples", summary.scores.len());
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
