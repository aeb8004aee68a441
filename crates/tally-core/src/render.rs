use std::io::{self, IsTerminal, Write};

use anyhow::{Context, anyhow};
use unicode_width::UnicodeWidthStr;

use crate::app::Frame;
use crate::config::Config;
use crate::notify::AlertCategory;

/// Receives every recomputed frame; owns all display decisions.
pub trait Renderer {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

/// Discards frames. Used when a command prints something else entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &Frame) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes each frame as one pretty-printed JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, frame).context("failed to encode frame")?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TerminalRenderer {
    color: bool,
}

impl TerminalRenderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn write_frame<W: Write>(&self, mut out: W, frame: &Frame) -> anyhow::Result<()> {
        if frame.tasks.is_empty() {
            writeln!(out, "No tasks match the current view.")?;
        } else {
            self.write_tasks(&mut out, frame)?;
        }
        writeln!(out)?;
        self.write_summary(&mut out, frame)?;
        self.write_notifications(&mut out, frame)
    }

    /// Counts, sad metrics and commentary lines.
    pub fn write_summary<W: Write>(&self, mut out: W, frame: &Frame) -> anyhow::Result<()> {
        let stats = &frame.stats;
        writeln!(
            out,
            "{} total, {} completed, {} pending ({}%), {} overdue",
            stats.total, stats.completed, stats.pending, stats.completion_rate, stats.overdue
        )?;
        writeln!(
            out,
            "Estimated: {} min total, {} min average",
            stats.total_estimated_minutes, stats.average_estimated_minutes
        )?;
        writeln!(
            out,
            "Days since last completion: {}  Procrastination: {}%  Satisfaction: {}",
            frame.sad.days_since_label(),
            frame.sad.procrastination_score,
            frame.sad.satisfaction
        )?;
        for message in &frame.messages {
            writeln!(out, "  {message}")?;
        }
        Ok(())
    }

    pub fn write_notifications<W: Write>(&self, mut out: W, frame: &Frame) -> anyhow::Result<()> {
        let bundle = &frame.notifications;
        if bundle.badge_count > 0 {
            writeln!(out)?;
            writeln!(out, "Notifications ({}):", bundle.badge_count)?;
            for notification in bundle.live() {
                let marker = match notification.category {
                    AlertCategory::Urgent => self.paint("!", "31"),
                    AlertCategory::Upcoming => "-".to_string(),
                };
                let fresh = if bundle.announced.iter().any(|n| n.id == notification.id) {
                    " (new)"
                } else {
                    ""
                };
                writeln!(
                    out,
                    "{marker} [{}] {}{fresh}",
                    notification.id, notification.message
                )?;
            }
        }
        if !bundle.insights.is_empty() {
            writeln!(out, "{}", bundle.insights)?;
        }
        Ok(())
    }

    fn write_tasks<W: Write>(&self, out: &mut W, frame: &Frame) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Pri".to_string(),
            "Category".to_string(),
            "Est".to_string(),
            "Due".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(frame.tasks.len());
        for task in &frame.tasks {
            let id = if task.completed {
                format!("{} ✓", task.id)
            } else {
                task.id.to_string()
            };
            let due = task
                .due_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "Not set".to_string());
            let due = if task.is_overdue(frame.today) {
                self.paint(&due, "31")
            } else {
                due
            };
            let estimate = task
                .estimated_minutes
                .map(|m| format!("{m}m"))
                .unwrap_or_default();

            rows.push(vec![
                self.paint(&id, "33"),
                task.priority.short_label().to_string(),
                task.category.to_string(),
                estimate,
                due,
                task.title.clone(),
            ]);
        }

        write_table(out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl Renderer for TerminalRenderer {
    #[tracing::instrument(skip(self, frame))]
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_frame(out, frame)
    }
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
