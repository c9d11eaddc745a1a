use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::SubmitError;

/// Scheduler flags understood by name, with the field they fill
static ALIASES: &[(&str, &str)] = &[
    ("-N", "nodes"),
    ("--nodes", "nodes"),
    ("-n", "ntasks"),
    ("--ntasks", "ntasks"),
    ("-c", "cpus_per_task"),
    ("--cpus-per-task", "cpus_per_task"),
    ("--gres", "gres"),
    ("-t", "time"),
    ("--time", "time"),
    ("-p", "partition"),
    ("--partition", "partition"),
    ("-J", "job_name"),
    ("--job-name", "job_name"),
    ("-o", "output"),
    ("--output", "output"),
    ("-e", "error"),
    ("--error", "error"),
    ("--mem", "mem"),
    ("--mem-per-cpu", "mem_per_cpu"),
    ("--mail-type", "mail_type"),
    ("--mail-user", "mail_user"),
    ("-d", "dependency"),
    ("--dependency", "dependency"),
    ("-a", "array"),
    ("--array", "array"),
    ("--exclusive", "exclusive"),
    ("-C", "constraint"),
    ("--constraint", "constraint"),
    ("-A", "account"),
    ("--account", "account"),
];

fn canonical(flag: &str) -> Option<&'static str> {
    ALIASES.iter().find(|(alias, _)| *alias == flag).map(|(_, name)| *name)
}

/// True when `flag` is a known scheduler option whose value is the following token
///
/// `--exclusive` is the only known option that works as a bare flag.
pub fn takes_value(flag: &str) -> bool {
    matches!(canonical(flag), Some(name) if name != "exclusive")
}

/// Typed view of the caller-supplied scheduler options
///
/// Only used to validate and display what the caller asked for. The raw tokens are what reach
/// the scheduler, so when a flag is repeated the view keeps the last value, like sbatch does.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct SchedulerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntasks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus_per_task: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gres: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_per_cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Flags without a dedicated field, keyed by their name without leading dashes
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl SchedulerOptions {
    /// Parse and validate a caller option sequence
    ///
    /// All problems are collected and reported together as a usage error.
    pub fn parse(args: &[String]) -> Result<SchedulerOptions, SubmitError> {
        let mut options = SchedulerOptions::default();
        let mut errors: Vec<String> = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            let (flag, value): (&str, Option<&str>) = if let Some((flag, value)) = arg.split_once('=') {
                (flag, Some(value))
            } else if takes_value(arg) {
                i += 1;
                match args.get(i) {
                    Some(value) => (arg, Some(value.as_str())),
                    None => {
                        errors.push(format!("option {arg} requires a value"));
                        break;
                    }
                }
            } else if let Some((short, attached)) = split_attached_short(arg) {
                (short, Some(attached))
            } else {
                (arg, None)
            };

            if let Err(err) = options.set(flag, value) {
                errors.push(err);
            }
            i += 1;
        }

        match errors.is_empty() {
            true => Ok(options),
            false => Err(SubmitError::Usage(errors.join("\n"))),
        }
    }

    fn set(&mut self, flag: &str, value: Option<&str>) -> Result<(), String> {
        let Some(name) = canonical(flag) else {
            let key = flag.trim_start_matches('-').replace('-', "_");
            let value = match value {
                Some(value) => Value::String(value.to_string()),
                None => Value::Bool(true),
            };
            self.extra.insert(key, value);
            return Ok(());
        };

        if name == "exclusive" {
            self.exclusive = Some(value.unwrap_or("user").to_string());
            return Ok(());
        }

        let value = value.ok_or_else(|| format!("option {flag} requires a value"))?;
        let text = Some(value.to_string());
        match name {
            "nodes" => self.nodes = Some(parse_count(flag, value)?),
            "ntasks" => self.ntasks = Some(parse_count(flag, value)?),
            "cpus_per_task" => self.cpus_per_task = Some(parse_count(flag, value)?),
            "gres" => self.gres = text,
            "time" => {
                if !is_valid_time(value) {
                    return Err(format!(
                        "invalid time format: {value}. Use minutes, HH:MM:SS, or D-HH:MM:SS"
                    ));
                }
                self.time = text
            }
            "partition" => self.partition = text,
            "job_name" => self.job_name = text,
            "output" => self.output = text,
            "error" => self.error = text,
            "mem" | "mem_per_cpu" => {
                if !is_valid_memory(value) {
                    return Err(format!(
                        "invalid memory format: {value}. Use a size like 4G, 512M, or 1024"
                    ));
                }
                match name {
                    "mem" => self.mem = text,
                    _ => self.mem_per_cpu = text,
                }
            }
            "mail_type" => self.mail_type = text,
            "mail_user" => self.mail_user = text,
            "dependency" => self.dependency = text,
            "array" => self.array = text,
            "constraint" => self.constraint = text,
            "account" => self.account = text,
            _ => return Err(format!("option {flag} is not supported")),
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// `-N2` style short options with the value glued on
fn split_attached_short(arg: &str) -> Option<(&str, &str)> {
    if arg.starts_with("--") || arg.len() <= 2 || !arg.is_char_boundary(2) {
        return None;
    }
    let (short, rest) = arg.split_at(2);
    takes_value(short).then_some((short, rest))
}

fn parse_count(flag: &str, value: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("invalid value for {flag}: expected an integer, got {value}"))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Minutes, `HH:MM:SS` or `D-HH:MM:SS`
pub fn is_valid_time(value: &str) -> bool {
    if all_digits(value) {
        return true;
    }
    let clock = match value.split_once('-') {
        Some((days, clock)) if all_digits(days) => clock,
        Some(_) => return false,
        None => value,
    };
    let parts: Vec<&str> = clock.split(':').collect();
    match parts.as_slice() {
        [h, m, s] => {
            (1..=2).contains(&h.len()) && all_digits(h) && m.len() == 2 && all_digits(m) && s.len() == 2 && all_digits(s)
        }
        _ => false,
    }
}

/// Digits with an optional K, M, G or T suffix
pub fn is_valid_memory(value: &str) -> bool {
    let digits = match value.chars().last() {
        Some(c) if "kmgtKMGT".contains(c) => &value[..value.len() - 1],
        _ => value,
    };
    all_digits(digits)
}
