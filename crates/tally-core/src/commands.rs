use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use crate::app::App;
use crate::cli::{AddArgs, Command, DeleteMode, EditArgs, ListArgs, LogAction, SettingsArgs};
use crate::config::Config;
use crate::datetime::{format_local, parse_due_date};
use crate::notify::NotificationSettings;
use crate::query::{SortKey, ViewConfig};
use crate::render::{JsonRenderer, TerminalRenderer};
use crate::report::Mood;
use crate::store::{DeleteOutcome, Disposition};
use crate::task::{TaskDraft, TaskPatch};

/// View used when a command does not ask for one: everything, sorted by
/// `default.sort`.
pub fn default_view(cfg: &Config) -> anyhow::Result<ViewConfig> {
    let sort = cfg
        .get_parsed::<SortKey>("default.sort")?
        .unwrap_or_default();
    Ok(ViewConfig {
        sort,
        ..ViewConfig::default()
    })
}

#[instrument(skip(app, cfg, command))]
pub fn dispatch(app: &mut App, cfg: &Config, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(app, args),
        Command::List(args) => cmd_list(app, cfg, args),
        Command::Done { id } => cmd_done(app, id),
        Command::Delete { id, disposition } => cmd_delete(app, id, disposition),
        Command::Edit(args) => cmd_edit(app, args),
        Command::Stats => cmd_stats(app, cfg),
        Command::Notify => cmd_notify(app, cfg),
        Command::Snooze { id } => cmd_snooze(app, &id),
        Command::Watch { seconds } => cmd_watch(app, cfg, seconds),
        Command::Log { action } => cmd_log(app, action.unwrap_or(LogAction::Show)),
        Command::Report { output } => {
            let text = app.report()?;
            write_output(output.as_deref(), &text)
        }
        Command::Abandoned => cmd_abandoned(app),
        Command::Mood { mood } => cmd_mood(app, mood.as_deref()),
        Command::Settings(args) => cmd_settings(app, args),
        Command::Show => cmd_show(cfg),
    }
}

fn cmd_add(app: &mut App, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(args.title.join(" "));
    if let Some(priority) = args.priority {
        draft.priority = priority.parse()?;
    }
    if let Some(category) = args.category {
        draft.category = category.parse()?;
    }
    draft.estimated_minutes = args.estimate;
    if let Some(expr) = args.due {
        draft.due_date = Some(parse_due_date(&expr, app.today())?);
    }
    draft.notes = args.notes;

    let task = app.create(draft)?;
    println!("Created task {}.", task.id);
    Ok(())
}

fn cmd_list(app: &mut App, cfg: &Config, args: ListArgs) -> anyhow::Result<()> {
    info!("command list");

    let mut view = app.view().clone();
    if let Some(status) = args.status {
        view.status = status.parse()?;
    }
    if let Some(category) = args.category {
        view.category = category.parse()?;
    }
    if let Some(search) = args.search {
        view.search = search;
    }
    if let Some(sort) = args.sort {
        view.sort = sort.parse()?;
    }

    if args.json {
        app.set_renderer(Box::new(JsonRenderer));
    } else {
        app.set_renderer(Box::new(TerminalRenderer::new(cfg)?));
    }
    if &view == app.view() {
        app.tick();
    } else {
        app.set_view(view)?;
    }
    Ok(())
}

fn cmd_done(app: &mut App, id: u64) -> anyhow::Result<()> {
    info!("command done");

    let task = app.toggle(id)?;
    if task.completed {
        println!("Completed task {id} '{}'.", task.title);
    } else {
        println!("Reopened task {id} '{}'.", task.title);
    }
    Ok(())
}

fn cmd_delete(app: &mut App, id: u64, mode: DeleteMode) -> anyhow::Result<()> {
    info!("command delete");

    let disposition = match mode {
        DeleteMode::Permanent => Disposition::Permanent,
        DeleteMode::Abandon => Disposition::Abandon,
        DeleteMode::Cancel => Disposition::Cancel,
    };

    match app.delete(id, disposition)? {
        DeleteOutcome::Removed(task) => println!("Deleted task {id} '{}'.", task.title),
        DeleteOutcome::Abandoned(entry) => {
            println!("Abandoned task {id} '{}'. {}.", entry.task.title, entry.reason)
        }
        DeleteOutcome::Kept(task) => println!("Kept task {id} '{}'.", task.title),
    }
    Ok(())
}

fn cmd_edit(app: &mut App, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let mut patch = TaskPatch {
        title: args.title,
        ..TaskPatch::default()
    };
    if let Some(priority) = args.priority {
        patch.priority = Some(priority.parse()?);
    }
    if let Some(category) = args.category {
        patch.category = Some(category.parse()?);
    }
    if args.clear_estimate {
        patch.estimated_minutes = Some(None);
    } else if let Some(minutes) = args.estimate {
        patch.estimated_minutes = Some(Some(minutes));
    }
    if args.clear_due {
        patch.due_date = Some(None);
    } else if let Some(expr) = args.due {
        patch.due_date = Some(Some(parse_due_date(&expr, app.today())?));
    }
    if args.clear_notes {
        patch.notes = Some(None);
    } else if let Some(notes) = args.notes {
        patch.notes = Some(Some(notes));
    }

    let task = app.edit(args.id, patch)?;
    println!("Modified task {}; it is now task {}.", args.id, task.id);
    Ok(())
}

fn cmd_stats(app: &mut App, cfg: &Config) -> anyhow::Result<()> {
    info!("command stats");

    app.tick();
    let frame = app.frame().ok_or_else(|| anyhow!("no frame computed"))?;
    let renderer = TerminalRenderer::new(cfg)?;
    let mut out = io::stdout().lock();
    renderer.write_summary(&mut out, frame)?;
    writeln!(out, "{}", frame.notifications.insights)?;
    Ok(())
}

fn cmd_notify(app: &mut App, cfg: &Config) -> anyhow::Result<()> {
    info!("command notify");

    app.tick();
    let frame = app.frame().ok_or_else(|| anyhow!("no frame computed"))?;
    if frame.notifications.badge_count == 0 {
        println!("No notifications.");
        return Ok(());
    }
    let renderer = TerminalRenderer::new(cfg)?;
    renderer.write_notifications(io::stdout().lock(), frame)
}

fn cmd_snooze(app: &mut App, id: &str) -> anyhow::Result<()> {
    info!("command snooze");

    let entry = app.snooze(id)?;
    println!(
        "Snoozed {id} until {}.",
        format_local(entry.until, app.timezone())
    );
    Ok(())
}

fn cmd_watch(app: &mut App, cfg: &Config, seconds: u64) -> anyhow::Result<()> {
    info!(seconds, "command watch");

    if seconds == 0 {
        return Err(anyhow!("watch interval must be at least one second"));
    }
    app.set_renderer(Box::new(TerminalRenderer::new(cfg)?));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start timer runtime")?;

    runtime.block_on(watch_loop(
        app,
        Duration::from_secs(seconds),
        tokio::signal::ctrl_c(),
    ))
}

/// Ticks `app` every `period` until `stop` resolves. `stop` is polled
/// across ticks, so a signal arriving mid-tick is not lost.
async fn watch_loop<F>(app: &mut App, period: Duration, stop: F) -> anyhow::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = ticker.tick() => app.tick(),
            signal = &mut stop => {
                signal.context("failed to listen for ctrl-c")?;
                info!("interrupted; stopping watch");
                return Ok(());
            }
        }
    }
}

fn cmd_log(app: &mut App, action: LogAction) -> anyhow::Result<()> {
    info!("command log");

    match action {
        LogAction::Show => {
            let entries = app.activity().entries();
            if entries.is_empty() {
                println!("Activity log is empty.");
            }
            for entry in entries {
                println!(
                    "{}  {}",
                    format_local(entry.at, app.timezone()),
                    entry.message
                );
            }
            Ok(())
        }
        LogAction::Clear => {
            app.clear_log()?;
            println!("Activity log cleared.");
            Ok(())
        }
        LogAction::Export { output } => {
            let text = app.export_log()?;
            write_output(output.as_deref(), &text)
        }
    }
}

fn cmd_abandoned(app: &App) -> anyhow::Result<()> {
    info!("command abandoned");

    let abandoned = app.abandoned();
    if abandoned.is_empty() {
        println!("No abandoned tasks. Yet.");
        return Ok(());
    }
    for entry in abandoned {
        println!(
            "{}  '{}'  {}",
            format_local(entry.abandoned_at, app.timezone()),
            entry.task.title,
            entry.reason
        );
    }
    Ok(())
}

fn cmd_mood(app: &mut App, mood: Option<&str>) -> anyhow::Result<()> {
    info!("command mood");

    let Some(raw) = mood else {
        let current = app.mood();
        println!("{current}: {}", current.response());
        return Ok(());
    };
    let mood: Mood = raw.parse()?;
    app.set_mood(mood)?;
    println!("{}", mood.response());
    Ok(())
}

fn cmd_settings(app: &mut App, args: SettingsArgs) -> anyhow::Result<()> {
    info!("command settings");

    if args.is_empty() {
        print_settings(app.settings());
        return Ok(());
    }

    let current = app.settings();
    let next = NotificationSettings {
        enabled: args.enabled.unwrap_or(current.enabled),
        reminder_days: args.reminder_days.unwrap_or(current.reminder_days),
        work_start_hour: args.work_start.unwrap_or(current.work_start_hour),
        work_end_hour: args.work_end.unwrap_or(current.work_end_hour),
        weekends: args.weekends.unwrap_or(current.weekends),
    };
    if next.work_start_hour > 24 || next.work_end_hour > 24 {
        return Err(anyhow!("working hours must be in 0..=24"));
    }
    if next.reminder_days < 0 {
        return Err(anyhow!("reminder days cannot be negative"));
    }

    app.update_settings(next)?;
    print_settings(app.settings());
    Ok(())
}

fn print_settings(settings: &NotificationSettings) {
    println!("enabled        {}", settings.enabled);
    println!("reminder_days  {}", settings.reminder_days);
    println!("work_start     {}", settings.work_start_hour);
    println!("work_end       {}", settings.work_end_hour);
    println!("weekends       {}", settings.weekends);
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    Ok(())
}

fn write_output(path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, format!("{text}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(file = %path.display(), bytes = text.len(), "wrote output");
            println!("Wrote {}.", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::watch_loop;
    use crate::app::{App, Frame};
    use crate::clock::ManualClock;
    use crate::kv::MemoryStore;
    use crate::notify::NotificationSettings;
    use crate::query::ViewConfig;
    use crate::render::{NullRenderer, Renderer};

    struct CountFrames(Rc<Cell<usize>>);

    impl Renderer for CountFrames {
        fn render(&mut self, _frame: &Frame) -> anyhow::Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn watch_stops_when_signal_fires_after_several_ticks() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap());
        let mut app = App::load(
            Box::new(MemoryStore::new()),
            Box::new(clock),
            Box::new(NullRenderer),
            chrono_tz::UTC,
            NotificationSettings::default(),
            ViewConfig::default(),
        );
        let frames = Rc::new(Cell::new(0));
        app.set_renderer(Box::new(CountFrames(frames.clone())));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // Longer than the tick period: only a stop future that survives
        // across ticks ever completes.
        let stop = async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok::<(), io::Error>(())
        };
        runtime
            .block_on(watch_loop(&mut app, Duration::from_millis(5), stop))
            .unwrap();

        assert!(frames.get() >= 1);
    }
}
