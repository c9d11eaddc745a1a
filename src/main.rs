use std::env;
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};

use clap::error::ErrorKind;
use clap::Parser;
use log::{debug, error, warn};

use snapsub::invocation::{self, USAGE};
use snapsub::submit::{submit, Outcome, SubmitOptions};

/// Submit a job to SLURM from a snapshot of the current commit
#[derive(Parser, Debug)]
#[command(name = "submit", version, after_help = USAGE)]
struct Args {
    /// Remove the snapshot when the job finishes, whatever its exit status
    #[arg(long)]
    cleanup: bool,

    /// Print the parameters and job script without creating a snapshot or submitting
    #[arg(long)]
    dry_run: bool,

    /// Configuration file [default: submit.toml in the project root]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that holds snapshots
    #[arg(long, env = "SUBMIT_SNAPSHOT_ROOT", value_name = "DIR")]
    snapshot_root: Option<PathBuf>,

    /// Directory for job logs and scripts
    #[arg(long, env = "SUBMIT_LOG_ROOT", value_name = "DIR")]
    log_root: Option<PathBuf>,

    /// Scheduler options, then the command or script to run
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    debug!("terve! starting up :)");

    // SIGINT, SIGTERM and SIGHUP skip Drop, so armed snapshots are rolled back here
    if let Err(err) = ctrlc::set_handler(|| {
        let removed = snapsub::snapshot::guard::roll_back_armed();
        error!("Interrupted, rolled back {removed} snapshot(s)");
        process::exit(1);
    }) {
        warn!("Can't install signal handler: {err}");
    }

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if let Err(io) = err.print() {
                error!("Can't print argument error: {io}; {err}");
            }
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<snapsub::error::SubmitError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let cwd = env::current_dir()?;

    let mut invocation = invocation::classify(&args.args)?;
    invocation.auto_cleanup |= args.cleanup;

    let opts = SubmitOptions {
        dry_run: args.dry_run,
        config: args.config.map(|p| absolute(&cwd, p)),
        snapshot_root: args.snapshot_root.map(|p| absolute(&cwd, p)),
        log_root: args.log_root.map(|p| absolute(&cwd, p)),
    };

    match submit(&cwd, &invocation, &opts)? {
        Outcome::Submitted { request, record } => {
            let job = record.job_id.as_deref().unwrap_or("(id unknown)");
            println!("Submitted job {} as {}", job, request.id);
            println!("  snapshot: {}", request.snapshot_dir.display());
            println!("  log:      {}", record.log_path.display());
            match request.auto_cleanup {
                true => println!("  cleanup:  snapshot is removed when the job finishes"),
                false => println!(
                    "  cleanup:  manual, git -C {} worktree remove --force {}",
                    request.project_root.display(),
                    request.snapshot_dir.display()
                ),
            }
        }
        Outcome::DryRun { request, options, script } => {
            println!("# dry run for {}", request.id);
            println!("# snapshot: {}", request.snapshot_dir.display());
            println!("# log:      {}", request.log_path.display());
            println!("# sbatch {}", request.params);
            println!("# caller options:");
            for line in options.to_json().lines() {
                println!("#   {line}");
            }
            print!("{script}");
        }
    }
    Ok(())
}

fn absolute(cwd: &Path, path: PathBuf) -> PathBuf {
    match path.is_absolute() {
        true => path,
        false => cwd.join(path),
    }
}
