//! Split the raw argument list into scheduler options and the job command

use std::fmt;

use log::debug;

use crate::error::{Result, SubmitError};
use crate::slurm::options;

/// Flag that turns on snapshot removal at the end of the remote job
pub static CLEANUP_FLAG: &str = "--cleanup";

/// Flags of `submit` itself; they must come before the first scheduler option
static SUBMIT_FLAGS: &[&str] = &["--dry-run", "--config", "--snapshot-root", "--log-root"];

pub static USAGE: &str = "usage: submit [--dry-run] [--config FILE] [--snapshot-root DIR] [--log-root DIR]
              [--cleanup] [scheduler-option ...] [--] <command-or-script ...>

The first argument that is not an option starts the job command; it and everything after it
run verbatim inside the snapshot. Scheduler options are appended after the defaults, so a
repeated flag overrides the default value.

examples:
    submit 'python train.py --lr 3e-4'
    submit --gres=gpu:4 --time=2-00:00:00 python train.py
    submit --cleanup -p debug ./scripts/eval.sh";

/// The user's command, kept as the tokens the invoking shell produced
///
/// Tokens are never re-parsed. A single token is run as a shell string; several tokens are
/// quoted one by one when the job script is rendered. `Display` joins them with spaces and is
/// meant for logs only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobCommand(Vec<String>);

impl JobCommand {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// A classified invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub auto_cleanup: bool,
    /// Caller-supplied scheduler tokens in the order given
    pub scheduler_args: Vec<String>,
    pub command: JobCommand,
}

/// Classify `args`
///
/// `--cleanup` is consumed wherever it appears among the options and never forwarded. Known
/// scheduler flags written with a separate value (`-p debug`) take that value along, so it is not
/// mistaken for the command. `--` ends the options explicitly.
pub fn classify(args: &[String]) -> Result<Invocation> {
    let mut auto_cleanup = false;
    let mut scheduler_args: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            break;
        }
        if arg == CLEANUP_FLAG {
            auto_cleanup = true;
            i += 1;
            continue;
        }

        let name = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
        if SUBMIT_FLAGS.contains(&name) {
            return Err(usage(&format!("{name} must come before any scheduler option")));
        }

        scheduler_args.push(arg.clone());
        if options::takes_value(arg) {
            match args.get(i + 1) {
                Some(value) => scheduler_args.push(value.clone()),
                None => return Err(usage(&format!("option {arg} requires a value"))),
            }
            i += 1;
        }
        i += 1;
    }

    let command: Vec<String> = args[i.min(args.len())..].to_vec();
    if command.is_empty() {
        return Err(usage("no command or script given"));
    }

    debug!("scheduler args {:?}, command {:?}", scheduler_args, command);
    Ok(Invocation { auto_cleanup, scheduler_args, command: JobCommand(command) })
}

fn usage(problem: &str) -> SubmitError {
    SubmitError::Usage(format!("{problem}\n\n{USAGE}"))
}
