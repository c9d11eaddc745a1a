use std::fs;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::error::Result;
use crate::invocation::JobCommand;
use crate::slurm::job_request::JobRequest;

/// A JobPath is the path to a job script that's submitted to SLURM via sbatch
///
/// Scripts live in the log root as `<identity>.sbatch`, next to the `<identity>.out` log the
/// scheduler writes, so both survive snapshot cleanup.
#[derive(Debug)]
pub struct JobPath {
    pub path: PathBuf,
}

impl JobRequest {
    /// Render the complete wrapper script
    pub fn render(&self) -> Result<String> {
        Ok(self.template()?.content())
    }

    /// Render the wrapper script and write it to the log root
    pub fn create(&self, log_root: &Path) -> Result<JobPath> {
        fs::create_dir_all(log_root)?;
        let path = self.script_path(log_root);
        info!("Writing job script to {}", path.display());
        self.template()?.write(&path)?;
        Ok(JobPath { path })
    }

    fn template(&self) -> Result<JobTemplate> {
        Ok(JobTemplate {
            header: render_header(self)?,
            vars: render_environment_variables(self)?,
            cleanup: render_cleanup(self)?,
            command: render_command(self)?,
        })
    }
}

/// All rendered sections of a wrapper script
struct JobTemplate {
    header: Header,
    vars: EnvVars,
    cleanup: Cleanup,
    command: Command,
}

impl JobTemplate {
    fn content(&self) -> String {
        // order is important: the trap must be installed before the command runs
        [
            self.header.content.as_str(),
            self.vars.content.as_str(),
            self.cleanup.content.as_str(),
            self.command.content.as_str(),
        ]
        .concat()
    }

    fn write(&self, out_path: &Path) -> io::Result<()> {
        let mut file = File::create(out_path)?;
        file.write_all(self.content().as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(out_path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(out_path, perms)?;
        }
        Ok(())
    }
}

/// Rendered shebang and provenance comments
struct Header {
    content: String,
}

/// Rendered environment section
///
/// Exports the submission identity, the auto-cleanup flag, the snapshot path and the project
/// root so the user's command and the cleanup trap can read them.
struct EnvVars {
    content: String,
}

/// Rendered remote cleanup handler
///
/// A bash EXIT trap that runs whether the user's command succeeds or fails. With auto-cleanup it
/// leaves the snapshot, deregisters the worktree and deletes the directory; every removal step
/// is allowed to fail. Without it, it only prints where the snapshot is. Either way it exits with
/// the status the command produced.
struct Cleanup {
    content: String,
}

/// Rendered change into the snapshot followed by the user's command, verbatim
struct Command {
    content: String,
}

#[derive(Serialize)]
struct HeaderContext {
    id: String,
    commit: String,
    time_now: String,
    log_path: String,
}

/// Values are already shell quoted
#[derive(Serialize)]
struct EnvVarContext {
    id: String,
    auto_cleanup: bool,
    snapshot_dir: String,
    project_root: String,
}

#[derive(Serialize)]
struct CleanupContext {
    auto_cleanup: bool,
}

#[derive(Serialize)]
struct CommandContext {
    command: String,
}

fn render<C: Serialize>(name: &'static str, source: &'static str, context: &C) -> Result<String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(name, source)?;
    Ok(tt.render(name, context)?)
}

fn render_header(request: &JobRequest) -> Result<Header> {
    /// included header template
    static HEADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
    let context = HeaderContext {
        id: request.id.to_string(),
        commit: request.id.commit().to_string(),
        time_now: Utc::now().to_string(),
        log_path: request.log_path.display().to_string(),
    };
    Ok(Header { content: render("header", HEADER, &context)? })
}

fn render_environment_variables(request: &JobRequest) -> Result<EnvVars> {
    /// included environment variables template
    static ENV_VARS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/env_vars.txt"));
    let context = EnvVarContext {
        id: shell_quote(&request.id.to_string()),
        auto_cleanup: request.auto_cleanup,
        snapshot_dir: shell_quote(&request.snapshot_dir.to_string_lossy()),
        project_root: shell_quote(&request.project_root.to_string_lossy()),
    };
    Ok(EnvVars { content: render("env_vars", ENV_VARS, &context)? })
}

fn render_cleanup(request: &JobRequest) -> Result<Cleanup> {
    /// included cleanup trap template
    static CLEANUP: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/cleanup.txt"));
    let context = CleanupContext { auto_cleanup: request.auto_cleanup };
    Ok(Cleanup { content: render("cleanup", CLEANUP, &context)? })
}

fn render_command(request: &JobRequest) -> Result<Command> {
    /// included command template
    static COMMAND: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/command.txt"));
    let context = CommandContext { command: shell_line(&request.command) };
    Ok(Command { content: render("command", COMMAND, &context)? })
}

/// The command line the remote shell runs
///
/// A single token is already a shell string and goes in verbatim. Several tokens are quoted one
/// by one so the job sees exactly the arguments the submitting shell produced, like `"$@"`.
fn shell_line(command: &JobCommand) -> String {
    match command.tokens() {
        [single] => single.clone(),
        tokens => tokens.iter().map(|t| shell_quote(t)).collect::<Vec<_>>().join(" "),
    }
}

/// POSIX single-quote `s` unless it is made of safe characters only
fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:@,+%".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
