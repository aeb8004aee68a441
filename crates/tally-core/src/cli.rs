use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally",
    version,
    about = "Tally: a to-do list that keeps score",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),
    /// Show the filtered, sorted task list with stats and alerts.
    List(ListArgs),
    /// Toggle completion of a task.
    Done { id: u64 },
    /// Remove a task permanently or move it to the abandoned list.
    Delete {
        id: u64,
        #[arg(long = "as", value_enum, default_value = "permanent")]
        disposition: DeleteMode,
    },
    /// Change fields of a task. The edited task receives a new id.
    Edit(EditArgs),
    /// Counts, sad metrics and productivity insights.
    Stats,
    /// Current notifications.
    Notify,
    /// Hide a notification for one hour.
    Snooze { id: String },
    /// Re-evaluate and redraw on a timer until interrupted.
    Watch {
        #[arg(long = "interval", default_value_t = 60)]
        seconds: u64,
    },
    /// Activity log.
    Log {
        #[command(subcommand)]
        action: Option<LogAction>,
    },
    /// Write the failure report.
    Report {
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// List abandoned tasks.
    Abandoned,
    /// Show or set the current mood.
    Mood { mood: Option<String> },
    /// Show or change notification settings.
    Settings(SettingsArgs),
    /// Print the effective configuration.
    Show,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    /// Estimated minutes, 1 to 480.
    #[arg(short = 'e', long)]
    pub estimate: Option<u32>,

    /// Due date: YYYY-MM-DD, today, tomorrow, a weekday name or +Nd/+Nw.
    #[arg(short = 'd', long)]
    pub due: Option<String>,

    #[arg(short = 'n', long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 's', long)]
    pub search: Option<String>,

    #[arg(long)]
    pub sort: Option<String>,

    /// Emit the frame as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    pub id: u64,

    #[arg(short = 't', long)]
    pub title: Option<String>,

    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 'e', long, conflicts_with = "clear_estimate")]
    pub estimate: Option<u32>,

    #[arg(long)]
    pub clear_estimate: bool,

    #[arg(short = 'd', long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub clear_due: bool,

    #[arg(short = 'n', long, conflicts_with = "clear_notes")]
    pub notes: Option<String>,

    #[arg(long)]
    pub clear_notes: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    #[arg(long)]
    pub enabled: Option<bool>,

    #[arg(long)]
    pub reminder_days: Option<i64>,

    #[arg(long)]
    pub work_start: Option<u32>,

    #[arg(long)]
    pub work_end: Option<u32>,

    #[arg(long)]
    pub weekends: Option<bool>,
}

impl SettingsArgs {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.reminder_days.is_none()
            && self.work_start.is_none()
            && self.work_end.is_none()
            && self.weekends.is_none()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum LogAction {
    Show,
    Clear,
    Export {
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Permanent,
    Abandon,
    Cancel,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "done", "delete", "edit", "stats", "notify", "snooze", "watch", "log",
        "report", "abandoned", "mood", "settings", "show",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list and expands an unambiguous command prefix.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();
    let known = known_command_names();
    let mut command_seen = false;
    let mut expects_value = false;

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy().to_string();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        if command_seen {
            cleaned.push(arg);
            continue;
        }
        if expects_value {
            expects_value = false;
            cleaned.push(arg);
            continue;
        }
        if s.starts_with('-') {
            expects_value = matches!(s.as_str(), "--rc" | "--rcfile" | "--data");
            cleaned.push(arg);
            continue;
        }

        command_seen = true;
        match expand_command_abbrev(&s, &known) {
            Some(full) if full != s => {
                debug!(token = %s, expanded = %full, "resolved command token");
                cleaned.push(OsString::from(full));
            }
            _ => cleaned.push(arg),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, expand_command_abbrev, known_command_names, preprocess_args};

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("ad", &known), Some("add"));
        assert_eq!(expand_command_abbrev("ab", &known), Some("abandoned"));
        assert_eq!(expand_command_abbrev("s", &known), None);
        assert_eq!(expand_command_abbrev("sn", &known), Some("snooze"));
    }

    #[test]
    fn rc_overrides_are_lifted_and_command_expanded() {
        let pre = preprocess_args(&args(&[
            "tally",
            "--data",
            "/tmp/tally",
            "rc.color=off",
            "li",
            "--sort",
            "priority",
        ]))
        .unwrap();

        assert_eq!(
            pre.rc_overrides,
            vec![("rc.color".to_string(), "off".to_string())]
        );
        let cli = GlobalCli::parse_from(pre.cleaned_args);
        match cli.command {
            Some(Command::List(list)) => assert_eq!(list.sort.as_deref(), Some("priority")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_collects_title_words_and_options() {
        let pre = preprocess_args(&args(&[
            "tally", "add", "Pay", "rent", "-p", "high", "--due", "today",
        ]))
        .unwrap();
        let cli = GlobalCli::parse_from(pre.cleaned_args);
        match cli.command {
            Some(Command::Add(add)) => {
                assert_eq!(add.title.join(" "), "Pay rent");
                assert_eq!(add.priority.as_deref(), Some("high"));
                assert_eq!(add.due.as_deref(), Some("today"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
