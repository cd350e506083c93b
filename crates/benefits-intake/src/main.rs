use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use benefits_intake::claim::Claim;
use benefits_intake::config::load_config;
use benefits_intake::db::{claim_repo, job_status_repo, Database};
use benefits_intake::stats::PrometheusStats;
use benefits_intake::telemetry::{init_logging, LogFormat};
use benefits_intake::worker::{JobResult, WorkerPool};

const RESULT_POLL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "benefits-intake")]
#[command(version, about = "Stamp benefits claims and upload them to the document intake service", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "benefits-intake.json")]
    config: PathBuf,

    /// Log output format (plain, json)
    #[arg(long, default_value = "plain")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a claim (JSON) and its rendered PDF in the claim store
    Import {
        /// Claim JSON file
        claim: PathBuf,

        /// Rendered base PDF of the claim
        #[arg(long)]
        pdf: PathBuf,
    },

    /// Submit claims and wait until each one succeeds or exhausts its retries
    Submit {
        /// Claim ids to submit
        #[arg(required = true)]
        claim_ids: Vec<String>,

        /// Write job counters in Prometheus text format to this file when done
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },

    /// Show the job status row for a job id
    Status {
        job_id: String,
    },

    /// Show every job status row recorded for a claim
    History {
        claim_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = load_config(&cli.config)?;
    let db = Database::open(Path::new(&config.database_path))?;

    match cli.command {
        Commands::Import { claim, pdf } => {
            let content = fs::read_to_string(&claim)?;
            let claim: Claim = serde_json::from_str(&content)?;
            if !pdf.is_file() {
                return Err(format!("PDF not found: {}", pdf.display()).into());
            }
            claim_repo::insert(&db, &claim, &pdf)?;
            info!(
                "Imported claim {} ({}) with {} attachments",
                claim.id,
                claim.form_id,
                claim.attachments.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Submit {
            claim_ids,
            metrics_out,
        } => {
            let stats = Arc::new(PrometheusStats::new()?);
            let pool = WorkerPool::from_config(&config, db, stats.clone())?;
            let code = submit_and_wait(pool, &claim_ids)?;
            if let Some(path) = metrics_out {
                fs::write(&path, stats.encode_text()?)?;
                info!("Wrote job counters to {}", path.display());
            }
            Ok(code)
        }
        Commands::Status { job_id } => match job_status_repo::find(&db, &job_id)? {
            Some(row) => {
                println!("{}", serde_json::to_string_pretty(&row)?);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                warn!("No job status recorded for {}", job_id);
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::History { claim_id } => {
            let rows = job_status_repo::find_by_claim(&db, &claim_id)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn submit_and_wait(pool: WorkerPool, claim_ids: &[String]) -> Result<ExitCode, Box<dyn Error>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })?;
    }

    let mut pending = 0usize;
    let mut failed = 0usize;
    for claim_id in claim_ids {
        match pool.submit(claim_id) {
            Ok(job_id) => {
                info!("Queued claim {} as job {}", claim_id, job_id);
                pending += 1;
            }
            Err(e) => {
                error!("Could not queue claim {}: {}", claim_id, e);
                failed += 1;
            }
        }
    }

    while pending > 0 && !interrupted.load(Ordering::SeqCst) {
        let Some(result) = pool.recv_result_timeout(RESULT_POLL) else {
            continue;
        };
        pending -= 1;
        report(&result);
        if !result.success {
            failed += 1;
        }
    }

    if pending > 0 {
        warn!(
            "Interrupted with {} jobs unfinished; their status rows keep the last recorded state",
            pending
        );
    }

    pool.shutdown();
    pool.wait();

    if failed == 0 && pending == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn report(result: &JobResult) {
    if result.success {
        info!(
            "Claim {} submitted (job {}, tracking id {}, retries {})",
            result.claim_id,
            result.job_id,
            result.tracking_id.as_deref().unwrap_or("-"),
            result.retry_count
        );
    } else {
        error!(
            "Claim {} failed (job {}, {}, retries {}): {}",
            result.claim_id,
            result.job_id,
            result
                .exhaust_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown"),
            result.retry_count,
            result.error.as_deref().unwrap_or("")
        );
        if let Some(e) = &result.exhaustion_error {
            error!(
                "Claim {} (job {}) exhaustion was not recorded, its status row is stale: {}",
                result.claim_id, result.job_id, e
            );
        }
    }
}
