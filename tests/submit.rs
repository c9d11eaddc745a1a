use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::{tempdir, TempDir};

use snapsub::error::SubmitError;
use snapsub::git::fixture::init_git_repo;
use snapsub::git::Git;
use snapsub::invocation::classify;
use snapsub::submit::{submit, Outcome, SubmitOptions};

/// A throwaway project plus a fake sbatch that records its calls
struct Fixture {
    _dir: TempDir,
    project: PathBuf,
    git: Git,
    calls: PathBuf,
    args: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn new(sbatch_exit: i32) -> Fixture {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();
        init_git_repo(&project).unwrap();
        let project = project.canonicalize().unwrap();
        let git = Git::new("git", &project);

        let tools = dir.path().join("tools");
        fs::create_dir(&tools).unwrap();
        let calls = tools.join("calls");
        let args = tools.join("args");
        let sbatch = tools.join("fake-sbatch");
        fs::write(
            &sbatch,
            format!(
                "#!/bin/sh\nif [ \"$1\" = --version ]; then echo 'slurm 23.02.7'; exit 0; fi\necho call >> '{}'\nprintf '%s\\n' \"$@\" > '{}'\necho 'Submitted batch job 4242'\nexit {}\n",
                calls.display(),
                args.display(),
                sbatch_exit
            ),
        )
        .unwrap();
        make_executable(&sbatch);

        let config = tools.join("submit.toml");
        fs::write(&config, format!("[scheduler]\nprogram = \"{}\"\n", sbatch.display())).unwrap();

        Fixture { _dir: dir, project, git, calls, args, config }
    }

    fn options(&self) -> SubmitOptions {
        SubmitOptions { config: Some(self.config.clone()), ..SubmitOptions::default() }
    }

    fn submit(&self, args: &[&str]) -> Result<Outcome, SubmitError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        submit(&self.project, &classify(&args)?, &self.options())
    }

    fn snapshot_root(&self) -> PathBuf {
        self.project.join(".snapshots")
    }

    fn snapshot_count(&self) -> usize {
        fs::read_dir(self.snapshot_root()).map(|entries| entries.count()).unwrap_or(0)
    }

    fn scheduler_calls(&self) -> usize {
        fs::read_to_string(&self.calls).map(|s| s.lines().count()).unwrap_or(0)
    }

    fn scheduler_args(&self) -> Vec<String> {
        fs::read_to_string(&self.args).unwrap().lines().map(str::to_string).collect()
    }
}

fn make_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

fn submitted(outcome: Outcome) -> (snapsub::slurm::job_request::JobRequest, snapsub::slurm::sbatch::JobRecord) {
    match outcome {
        Outcome::Submitted { request, record } => (request, record),
        Outcome::DryRun { .. } => panic!("expected a real submission"),
    }
}

#[test]
fn clean_tree_submission_snapshots_and_submits_once() {
    let fx = Fixture::new(0);
    let head = fx.git.head().unwrap();

    let (request, record) = submitted(fx.submit(&["python", "train.py"]).unwrap());

    let id = request.id.to_string();
    assert_eq!(request.snapshot_dir, fx.snapshot_root().join(&id));
    assert_eq!(fx.snapshot_count(), 1);
    assert!(request.snapshot_dir.join("train.py").exists());
    assert_eq!(fx.git.at(&request.snapshot_dir).head().unwrap(), head);

    assert_eq!(fx.scheduler_calls(), 1);
    assert_eq!(record.job_id.as_deref(), Some("4242"));
    assert_eq!(record.log_path, fx.project.join("logs").join(format!("{id}.out")));

    let args = fx.scheduler_args();
    assert_eq!(args[0], "--nodes=1");
    assert!(args.contains(&format!("--job-name={id}")));
    assert!(args.contains(&format!("--output={}", record.log_path.display())));
    assert_eq!(args.last().unwrap(), &fx.project.join("logs").join(format!("{id}.sbatch")).display().to_string());
    assert_eq!(fx.git.status_porcelain().unwrap(), "");
}

#[test]
fn dirty_tree_is_refused_before_any_snapshot() {
    let fx = Fixture::new(0);
    fs::write(fx.project.join("train.py"), "print('edited')\n").unwrap();

    let err = fx.submit(&["python", "train.py"]).unwrap_err();

    assert!(matches!(err, SubmitError::DirtyTree(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(!fx.snapshot_root().exists());
    assert_eq!(fx.scheduler_calls(), 0);
}

#[test]
fn rejected_submission_removes_the_snapshot() {
    let fx = Fixture::new(1);

    let err = fx.submit(&["python", "train.py"]).unwrap_err();

    assert!(matches!(err, SubmitError::SubmissionRejected { .. }));
    assert_eq!(fx.scheduler_calls(), 1);
    assert_eq!(fx.snapshot_count(), 0);
    assert_eq!(fx.git.worktree_list().unwrap().len(), 1);
}

#[test]
fn missing_scheduler_is_refused_before_any_snapshot() {
    let fx = Fixture::new(0);
    fs::write(&fx.config, "[scheduler]\nprogram = \"/nonexistent/sbatch\"\n").unwrap();

    let err = fx.submit(&["python", "train.py"]).unwrap_err();

    assert!(matches!(err, SubmitError::ToolMissing(_)));
    assert!(!fx.snapshot_root().exists());
}

#[cfg(unix)]
#[test]
fn shared_directories_are_linked_not_copied() {
    let fx = Fixture::new(0);
    fs::create_dir(fx.project.join("data")).unwrap();
    fs::write(fx.project.join("data").join("train.csv"), "x,y\n").unwrap();

    let (request, _) = submitted(fx.submit(&["python", "train.py"]).unwrap());

    let link = request.snapshot_dir.join("data");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), fx.project.join("data"));
    assert!(fs::symlink_metadata(request.snapshot_dir.join("checkpoints")).is_err());

    fs::write(link.join("written-by-job.txt"), "hi").unwrap();
    assert!(fx.project.join("data").join("written-by-job.txt").exists());
}

#[test]
fn caller_override_follows_the_default() {
    let fx = Fixture::new(0);

    submitted(fx.submit(&["--gres=gpu:4", "python", "train.py"]).unwrap());

    let gres: Vec<String> = fx.scheduler_args().into_iter().filter(|a| a.starts_with("--gres=")).collect();
    assert_eq!(gres, ["--gres=gpu:1", "--gres=gpu:4"]);
}

#[test]
fn invalid_caller_option_is_a_usage_error() {
    let fx = Fixture::new(0);

    let err = fx.submit(&["--time=tomorrow", "python", "train.py"]).unwrap_err();

    assert!(matches!(err, SubmitError::Usage(_)));
    assert!(!fx.snapshot_root().exists());
}

#[test]
fn dry_run_creates_nothing() {
    let fx = Fixture::new(0);
    let opts = SubmitOptions { dry_run: true, ..fx.options() };
    let args: Vec<String> = ["--cleanup", "-p", "debug", "python", "train.py"].iter().map(|s| s.to_string()).collect();

    let outcome = submit(&fx.project, &classify(&args).unwrap(), &opts).unwrap();

    let Outcome::DryRun { request, options, script } = outcome else { panic!("expected a dry run") };
    assert!(request.auto_cleanup);
    assert_eq!(options.partition.as_deref(), Some("debug"));
    assert!(script.ends_with("\npython train.py\n"));
    assert!(!fx.snapshot_root().exists());
    assert!(!fx.project.join("logs").exists());
    assert_eq!(fx.scheduler_calls(), 0);
}

#[test]
fn back_to_back_submissions_get_distinct_snapshots() {
    let fx = Fixture::new(0);

    let (first, _) = submitted(fx.submit(&["true"]).unwrap());
    let (second, _) = submitted(fx.submit(&["true"]).unwrap());

    assert_ne!(first.id, second.id);
    assert_ne!(first.snapshot_dir, second.snapshot_dir);
    assert_eq!(fx.snapshot_count(), 2);
}

#[test]
fn repeated_submissions_without_gitignore_stay_clean() {
    let fx = Fixture::new(0);
    fx.git.run(&["rm", "-q", ".gitignore"]).unwrap();
    fx.git.run(&["commit", "-q", "-m", "drop ignores"]).unwrap();

    submitted(fx.submit(&["true"]).unwrap());
    submitted(fx.submit(&["true"]).unwrap());

    assert_eq!(fx.snapshot_count(), 2);
    assert_eq!(fx.git.status_porcelain().unwrap(), "");
}

/// Run a submitted job script the way a compute node would
fn run_job_script(fx: &Fixture, request: &snapsub::slurm::job_request::JobRequest) -> std::process::Output {
    let script = request.script_path(&fx.project.join("logs"));
    Command::new("bash").arg(&script).current_dir("/").output().unwrap()
}

#[cfg(unix)]
#[test]
fn remote_cleanup_removes_snapshot_and_keeps_failing_status() {
    let fx = Fixture::new(0);
    let (request, _) = submitted(fx.submit(&["--cleanup", "echo running; exit 3"]).unwrap());
    assert!(request.snapshot_dir.exists());

    let out = run_job_script(&fx, &request);

    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stdout).contains("running"));
    assert!(!request.snapshot_dir.exists());
    assert_eq!(fx.git.worktree_list().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn remote_cleanup_does_not_touch_shared_data() {
    let fx = Fixture::new(0);
    fs::create_dir(fx.project.join("checkpoints")).unwrap();
    let (request, _) = submitted(fx.submit(&["--cleanup", "echo w > checkpoints/last.pt"]).unwrap());

    let out = run_job_script(&fx, &request);

    assert_eq!(out.status.code(), Some(0));
    assert!(!request.snapshot_dir.exists());
    assert_eq!(fs::read_to_string(fx.project.join("checkpoints").join("last.pt")).unwrap(), "w\n");
}

#[cfg(unix)]
#[test]
fn separate_command_tokens_reach_the_job_unchanged() {
    let fx = Fixture::new(0);
    let (request, _) = submitted(fx.submit(&["printf", "[%s]\\n", "my run", "a\\b", "$HOME"]).unwrap());

    let out = run_job_script(&fx, &request);

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[my run]\n[a\\b]\n[$HOME]\n"));
}

#[cfg(unix)]
#[test]
fn without_cleanup_remote_job_keeps_snapshot() {
    let fx = Fixture::new(0);
    let (request, _) = submitted(fx.submit(&["pwd"]).unwrap());

    let out = run_job_script(&fx, &request);

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(&request.snapshot_dir.display().to_string()));
    assert!(stdout.contains("snapshot kept at"));
    assert!(request.snapshot_dir.join("train.py").exists());
}
