// Output formatting and display for CLI

use crate::config::preflight::PreflightReport;
use crate::config::ProcessSpec;
use crate::daemon::DaemonStatus;
use crate::logs::{LogEntry, LogStream};
use crate::process::ProcessState;
use crate::state::StatusSnapshot;
use chrono::{DateTime, Local};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

fn render(table: &mut Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

/// Table of manifest records
pub fn print_records(records: &[ProcessSpec]) {
    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Cwd")]
        cwd: String,
        #[tabled(rename = "Command")]
        command: String,
        #[tabled(rename = "Inst.")]
        instances: usize,
        #[tabled(rename = "Autorestart")]
        autorestart: String,
        #[tabled(rename = "Max memory")]
        max_memory: String,
        #[tabled(rename = "Env")]
        env: String,
    }

    let rows: Vec<RecordRow> = records
        .iter()
        .map(|spec| {
            let mut env_keys: Vec<&str> = spec.env.keys().map(String::as_str).collect();
            env_keys.sort_unstable();

            RecordRow {
                name: spec.name.cyan().to_string(),
                cwd: spec
                    .cwd
                    .as_ref()
                    .map(|c| c.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                command: truncate(&spec.command_line(), 60),
                instances: spec.instances,
                autorestart: if spec.autorestart {
                    "yes".green().to_string()
                } else {
                    "no".yellow().to_string()
                },
                max_memory: spec
                    .max_memory_restart
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                env: if env_keys.is_empty() {
                    "-".to_string()
                } else {
                    env_keys.join(", ")
                },
            }
        })
        .collect();

    println!("\n{}\n", render(&mut Table::new(rows)));
    println!(
        "{}",
        format!("Total: {} record(s)", records.len()).dimmed().italic()
    );
}

pub fn print_preflight(reports: &[PreflightReport]) {
    #[derive(Tabled)]
    struct PreflightRow {
        #[tabled(rename = "Process")]
        process: String,
        #[tabled(rename = "Result")]
        result: String,
        #[tabled(rename = "Env file")]
        env_file: String,
        #[tabled(rename = "Missing")]
        missing: String,
    }

    let rows: Vec<PreflightRow> = reports
        .iter()
        .map(|report| PreflightRow {
            process: report.process.clone(),
            result: if report.passed() {
                "ok".green().bold().to_string()
            } else {
                "missing".red().bold().to_string()
            },
            env_file: report
                .env_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            missing: if report.missing.is_empty() {
                "-".to_string()
            } else {
                report.missing.join(", ")
            },
        })
        .collect();

    println!("\n{}\n", render(&mut Table::new(rows)));
}

/// Supervisor liveness plus the last published snapshot
pub fn print_status(daemon: &DaemonStatus, snapshot: Option<&StatusSnapshot>) {
    match daemon.pid {
        Some(pid) => println!(
            "{} {}",
            "✓ Supervisor is running".green().bold(),
            format!("(PID: {})", pid).dimmed()
        ),
        None => println!("{}", "✗ Supervisor is not running".red().bold()),
    }

    let Some(snapshot) = snapshot else {
        println!("{}", "No status snapshot available".yellow());
        return;
    };

    let updated: DateTime<Local> = snapshot.updated_at.into();
    println!("  {:<12} {}", "Manifest:".bold(), snapshot.manifest);
    println!(
        "  {:<12} {} ({} ago)",
        "Updated:".bold(),
        updated.format("%Y-%m-%d %H:%M:%S"),
        format_duration(&snapshot.age())
    );
    if snapshot.is_final() {
        println!("  {}", "Final snapshot written at shutdown".dimmed());
    } else if !daemon.running {
        print_warning("Snapshot is stale: the supervisor that wrote it is gone");
    }

    if snapshot.processes.is_empty() {
        println!("{}", "No processes recorded".yellow());
        return;
    }

    #[derive(Tabled)]
    struct ProcessRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
        #[tabled(rename = "Exit")]
        exit: String,
    }

    let rows: Vec<ProcessRow> = snapshot
        .processes
        .iter()
        .map(|p| ProcessRow {
            id: p.id.to_string(),
            name: truncate(&p.name, 20),
            state: format_state_colored(&p.state),
            pid: if p.state == ProcessState::Running {
                p.pid.to_string()
            } else {
                "-".to_string()
            },
            cpu: format!("{:.1}%", p.cpu_usage),
            memory: match p.memory_limit {
                Some(limit) => format!("{} / {}", format_memory(p.memory_bytes), limit),
                None => format_memory(p.memory_bytes),
            },
            uptime: format_duration(&p.uptime()),
            restarts: if p.memory_violations > 0 {
                format!("{} ({} mem)", p.restarts, p.memory_violations)
            } else {
                p.restarts.to_string()
            },
            exit: p
                .last_exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("\n{}\n", render(&mut Table::new(rows)));
    println!(
        "{}",
        format!("Total: {} process(es)", snapshot.processes.len())
            .dimmed()
            .italic()
    );
}

pub fn print_logs(name: &str, entries: &[LogEntry]) {
    if entries.is_empty() {
        println!("{}", format!("No logs available for {}", name).yellow());
        return;
    }

    for entry in entries {
        let tag = match entry.stream {
            LogStream::Out => "[OUT]".green(),
            LogStream::Err => "[ERR]".red(),
        };
        match entry.timestamp {
            Some(ref timestamp) => println!("{} {} {}", timestamp.dimmed(), tag, entry.message),
            None => println!("{} {}", tag, entry.message),
        }
    }
}

fn format_state_colored(state: &ProcessState) -> String {
    match state {
        ProcessState::Running => state.to_string().green().to_string(),
        ProcessState::Starting | ProcessState::Waiting | ProcessState::Stopping => {
            state.to_string().yellow().to_string()
        }
        ProcessState::Stopped => state.to_string().bright_black().to_string(),
        ProcessState::Errored => state.to_string().red().bold().to_string(),
    }
}

pub fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    let (major, major_unit, minor, minor_unit) = if secs < 60 {
        return format!("{}s", secs);
    } else if secs < 3600 {
        (secs / 60, "m", secs % 60, "s")
    } else if secs < 86400 {
        (secs / 3600, "h", (secs % 3600) / 60, "m")
    } else {
        (secs / 86400, "d", (secs % 86400) / 3600, "h")
    };

    if minor > 0 {
        format!("{}{} {}{}", major, major_unit, minor, minor_unit)
    } else {
        format!("{}{}", major, major_unit)
    }
}

pub fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Spinner shown while waiting on the supervisor
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn finish_progress_success(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✓".green(), message));
}

pub fn finish_progress_error(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✗".red(), message));
}
