//! Live Windows process telemetry on one kernel query per tick.
//!
//! Features:
//!   - Top-N process table sorted by CPU (pid, name, CPU%, memory, status)
//!   - Totals line: process, thread and handle counts from the same snapshot
//!   - `--once` batch mode for scripting; `--interval-ms` and `--top` knobs
//!   - A failed refresh keeps the previous table on screen
//!
//! Set RUST_LOG=debug for buffer negotiation diagnostics.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::{bail, Context, Result};

#[cfg(windows)]
use std::io::{self, Write};
#[cfg(windows)]
use std::time::Instant;

#[cfg(windows)]
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
#[cfg(windows)]
use log::warn;
#[cfg(windows)]
use procsnap::{NtQuery, ProcessView, TelemetryRegistry};

/// Default refresh interval in milliseconds
const DEFAULT_INTERVAL_MS: u64 = 1500;
/// Default number of table rows in the live view
const DEFAULT_TOP: usize = 20;
/// Display columns reserved for the process name
const NAME_WIDTH: usize = 28;

struct Options {
    interval: Duration,
    top: usize,
    once: bool,
}

#[cfg(windows)]
fn main() -> Result<()> {
    env_logger::init();
    let opts = parse_args()?;
    let registry = TelemetryRegistry::new();

    if opts.once {
        run_once(&registry, &opts)
    } else {
        run_live(&registry, &opts)
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("procsnap reads Windows kernel process snapshots; this platform is unsupported.");
    std::process::exit(1);
}

fn parse_args() -> Result<Options> {
    let mut opts = Options {
        interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        top: DEFAULT_TOP,
        once: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => opts.once = true,
            "--interval-ms" => {
                let value = args.next().context("--interval-ms needs a value")?;
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("--interval-ms: '{value}' is not a number"))?;
                opts.interval = Duration::from_millis(ms.max(1));
            }
            "--top" => {
                let value = args.next().context("--top needs a value")?;
                opts.top = value
                    .parse()
                    .with_context(|| format!("--top: '{value}' is not a number"))?;
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other} (try --help)"),
        }
    }

    Ok(opts)
}

fn print_usage() {
    println!("procsnap [--interval-ms N] [--top N] [--once]");
    println!();
    println!("  --interval-ms N   refresh cadence in milliseconds (default {DEFAULT_INTERVAL_MS})");
    println!("  --top N           table rows shown, 0 = all (default {DEFAULT_TOP})");
    println!("  --once            sample twice, print one table, exit");
    println!("  -h, --help        this text");
}

/// Sample twice so the second refresh has a CPU baseline, then print one
/// table to stdout.
#[cfg(windows)]
fn run_once(registry: &TelemetryRegistry<NtQuery>, opts: &Options) -> Result<()> {
    registry.refresh()?;
    std::thread::sleep(opts.interval);
    let mut views = registry.refresh()?;
    sort_by_cpu(&mut views);

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", totals_line(registry))?;
    writeln!(stdout)?;
    writeln!(stdout, "{}", table_header())?;
    for view in take_top(&views, opts.top) {
        writeln!(stdout, "{}", table_row(view))?;
    }
    Ok(())
}

/// Fixed-cadence live view. `q`, Esc or Ctrl-C exits.
#[cfg(windows)]
fn run_live(registry: &TelemetryRegistry<NtQuery>, opts: &Options) -> Result<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen, Hide)?;

    let result = live_loop(registry, opts);

    execute!(io::stdout(), Show, LeaveAlternateScreen)?;
    disable_raw_mode()?;

    result
}

#[cfg(windows)]
fn live_loop(registry: &TelemetryRegistry<NtQuery>, opts: &Options) -> Result<()> {
    let mut last_views: Vec<ProcessView> = Vec::new();
    let mut last_error: Option<String> = None;

    // Initial data collection
    refresh_into(registry, &mut last_views, &mut last_error);
    draw(registry, &last_views, last_error.as_deref(), opts)?;
    let mut next_refresh = Instant::now() + opts.interval;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                // On Windows, crossterm fires Press and Release; only handle Press
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => {}
                    }
                }
            }
        }

        if Instant::now() >= next_refresh {
            refresh_into(registry, &mut last_views, &mut last_error);
            draw(registry, &last_views, last_error.as_deref(), opts)?;
            next_refresh = Instant::now() + opts.interval;
        }
    }
}

/// Refresh, keeping the previous views when the refresh fails. Stale data
/// beats a blank table.
#[cfg(windows)]
fn refresh_into(
    registry: &TelemetryRegistry<NtQuery>,
    views: &mut Vec<ProcessView>,
    error: &mut Option<String>,
) {
    match registry.refresh() {
        Ok(mut fresh) => {
            sort_by_cpu(&mut fresh);
            *views = fresh;
            *error = None;
        }
        Err(err) => {
            warn!("refresh failed: {err}");
            *error = Some(err.to_string());
        }
    }
}

#[cfg(windows)]
fn draw(
    registry: &TelemetryRegistry<NtQuery>,
    views: &[ProcessView],
    error: Option<&str>,
    opts: &Options,
) -> Result<()> {
    let mut stdout = io::stdout().lock();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

    // Raw mode: every line needs an explicit carriage return.
    write!(stdout, "{}\r\n", totals_line(registry))?;
    if let Some(err) = error {
        write!(stdout, "last refresh failed: {err} (showing previous data)\r\n")?;
    }
    write!(stdout, "\r\n{}\r\n", table_header())?;
    for view in take_top(views, opts.top) {
        write!(stdout, "{}\r\n", table_row(view))?;
    }
    write!(stdout, "\r\nq to quit\r\n")?;
    stdout.flush()?;
    Ok(())
}

#[cfg(windows)]
fn totals_line(registry: &TelemetryRegistry<NtQuery>) -> String {
    let stamp = registry
        .last_refresh_at()
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "procsnap | {} processes | {} threads | {} handles | {} cores | refreshed {}",
        registry.process_count(),
        registry.total_threads(),
        registry.total_handles(),
        registry.logical_cores(),
        stamp,
    )
}

#[cfg(windows)]
fn table_header() -> String {
    format!(
        "{:>7}  {:<width$}  {:>6}  {:>8}  S",
        "PID",
        "NAME",
        "CPU%",
        "MEM",
        width = NAME_WIDTH
    )
}

#[cfg(windows)]
fn table_row(view: &ProcessView) -> String {
    format!(
        "{:>7}  {}  {:>6.1}  {:>8}  {}",
        view.pid,
        pad_name(&view.name, NAME_WIDTH),
        view.cpu_percent,
        format_bytes(view.memory_bytes),
        view.status,
    )
}

#[cfg(windows)]
fn sort_by_cpu(views: &mut [ProcessView]) {
    views.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then(a.pid.cmp(&b.pid))
    });
}

#[cfg(windows)]
fn take_top(views: &[ProcessView], top: usize) -> &[ProcessView] {
    if top == 0 {
        views
    } else {
        &views[..views.len().min(top)]
    }
}

/// Truncate to `width` display columns and pad with spaces, wide glyphs
/// counted properly.
fn pad_name(name: &str, width: usize) -> String {
    use unicode_width::UnicodeWidthChar;

    let mut out = String::new();
    let mut used = 0usize;
    for ch in name.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1}T", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1}G", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.0}M", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.0}K", bytes as f64 / KIB as f64)
    } else {
        format!("{}B", bytes)
    }
}
