use chrono::{DateTime, Local};
use notify_rust::Notification;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio::time::{Duration, interval};

mod engine;
mod ws;

use engine::engine::{
    DEFAULT_LONG_BREAK_MINUTES, DEFAULT_SHORT_BREAK_MINUTES, DEFAULT_WORK_MINUTES, EventReceiver,
    Phase, PhaseEvent, TimerEngine,
};

const TICK_INTERVAL_MS: u64 = 1000; // Advance the countdown every second
const CONTROL_ADDR: &str = "127.0.0.1:8765";

/// Per-process bookkeeping around the engine: when we started, how much
/// focused time accumulated, and the optional append-only log file.
#[derive(Debug)]
struct SessionTracker {
    session_start: DateTime<Local>,
    focused_seconds: u64,
    completed_sessions: u32,
    log_file: Option<String>,
}

impl SessionTracker {
    fn new(log_file: Option<String>) -> Self {
        let now = Local::now();
        if let Some(ref path) = log_file {
            let _ = Self::log_to_file(
                path,
                &format!(
                    "=== Session started at {} ===",
                    now.format("%Y-%m-%d %H:%M:%S")
                ),
            );
        }
        Self {
            session_start: now,
            focused_seconds: 0,
            completed_sessions: 0,
            log_file,
        }
    }

    fn log_to_file(path: &str, message: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", message)?;
        Ok(())
    }

    fn log(&self, message: &str) {
        if let Some(ref path) = self.log_file {
            let _ = Self::log_to_file(path, message);
        }
    }

    fn note_focus(&mut self, seconds: u64) {
        self.focused_seconds += seconds;
    }

    fn print_stats(&self) {
        println!("\n--- Session Statistics ---");
        println!("Running since: {}", self.session_start.format("%H:%M:%S"));
        println!("Completed work sessions: {}", self.completed_sessions);
        println!(
            "Focused time: {}m {}s",
            self.focused_seconds / 60,
            self.focused_seconds % 60
        );
        println!("------------------------\n");
    }
}

fn event_message(event: &PhaseEvent) -> &'static str {
    match event.new_phase {
        Phase::Break if event.long_break => "Work session complete! You earned a long break.",
        Phase::Break => "Work session complete! Time for a short break.",
        Phase::Work => "Break is over! Ready for the next work session.",
    }
}

fn send_notification(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    Notification::new()
        .summary("Tomatick - Pomodoro Alert")
        .body(message)
        .timeout(0) // No auto-dismiss
        .show()?;
    Ok(())
}

fn print_display(timer: &TimerEngine) {
    let display = timer.current_display();
    println!(
        "{} {}  {}  | sessions: {}{}",
        display.phase.emoji(),
        display.phase.as_str(),
        display.clock,
        display.sessions_completed,
        if display.long_break_next {
            "  | long break next"
        } else {
            ""
        }
    );
}

// Countdown line redrawn in place while the timer runs
fn render_status_line(timer: &TimerEngine) {
    let display = timer.current_display();
    print!(
        "\r{} {}  {}  | sessions: {}   ",
        display.phase.emoji(),
        display.phase.as_str(),
        display.clock,
        display.sessions_completed
    );
    let _ = std::io::stdout().flush();
}

/// Parse `settings <work> <short> <long>` arguments (minutes). Non-numeric
/// input yields None; range checks live in the engine.
fn parse_settings_args(args: &[&str]) -> Option<(u64, u64, u64)> {
    if args.len() != 3 {
        return None;
    }
    let work = args[0].parse().ok()?;
    let short = args[1].parse().ok()?;
    let long = args[2].parse().ok()?;
    Some((work, short, long))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let daemon = args.contains(&"--daemon".to_string());
    let verbose = args.contains(&"--verbose".to_string()) || args.contains(&"-v".to_string());

    // Check for log file argument
    let log_file = if let Some(pos) = args.iter().position(|a| a == "--log" || a == "-l") {
        args.get(pos + 1).cloned()
    } else {
        Some(format!(
            "{}/.local/share/tomatick/session.log",
            std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
        ))
    };

    // Create log directory if needed
    if let Some(ref path) = log_file {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    println!("🍅 Tomatick - Pomodoro Timer");
    println!("======================================================");
    println!(
        "Pomodoro settings: {}min work / {}min short break / {}min long break",
        DEFAULT_WORK_MINUTES, DEFAULT_SHORT_BREAK_MINUTES, DEFAULT_LONG_BREAK_MINUTES
    );
    if verbose {
        println!("Verbose mode: ON");
    }
    if let Some(ref path) = log_file {
        println!("Logging to: {}", path);
    }

    if daemon {
        run_daemon_mode(log_file).await
    } else {
        run_console_mode(log_file, verbose).await
    }
}

/// Interactive console mode: countdown in the terminal, commands on stdin.
async fn run_console_mode(
    log_file: Option<String>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Commands: start | pause | reset | skip | settings <work> <short> <long> | status | quit\n"
    );

    let (event_tx, event_rx) = engine::engine::create_event_channel();
    let timer = Arc::new(Mutex::new(TimerEngine::new(event_tx)));
    let tracker = Arc::new(Mutex::new(SessionTracker::new(log_file)));

    if let Ok(timer) = timer.lock() {
        print_display(&timer);
    }

    spawn_event_consumer(event_rx, Arc::clone(&tracker));

    // Command reader: one line per command, bad input dropped silently
    let timer_cmd = Arc::clone(&timer);
    let tracker_cmd = Arc::clone(&tracker);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let words: Vec<&str> = line.split_whitespace().collect();
            let Some((&verb, rest)) = words.split_first() else {
                continue;
            };
            let Ok(mut timer) = timer_cmd.lock() else {
                return;
            };
            match verb {
                "start" => timer.start(),
                "pause" => {
                    timer.pause();
                    print_display(&timer);
                }
                "reset" => {
                    timer.reset();
                    print_display(&timer);
                }
                "skip" => timer.skip(),
                "status" => print_display(&timer),
                "settings" => {
                    if let Some((work, short, long)) = parse_settings_args(rest) {
                        if timer.update_settings(work, short, long) {
                            println!(
                                "Settings updated: {}min work / {}min short break / {}min long break",
                                work, short, long
                            );
                            print_display(&timer);
                        } else if verbose {
                            println!("[DEBUG] Settings ignored: {:?}", rest);
                        }
                    } else if verbose {
                        println!("[DEBUG] Settings ignored: {:?}", rest);
                    }
                }
                "quit" | "exit" => {
                    if let Ok(tracker) = tracker_cmd.lock() {
                        tracker.print_stats();
                        tracker.log(&format!(
                            "=== Session ended at {} ===",
                            Local::now().format("%Y-%m-%d %H:%M:%S")
                        ));
                    }
                    std::process::exit(0);
                }
                other => {
                    if verbose {
                        println!("[DEBUG] Unknown command: {}", other);
                    }
                }
            }
        }
    });

    run_tick_loop(timer, tracker).await;
    Ok(())
}

/// Daemon mode: WebSocket control server + countdown, no stdin.
async fn run_daemon_mode(log_file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running control server on ws://{}\n", CONTROL_ADDR);

    let (event_tx, event_rx) = engine::engine::create_event_channel();
    let timer = Arc::new(Mutex::new(TimerEngine::new(event_tx)));
    let tracker = Arc::new(Mutex::new(SessionTracker::new(log_file)));

    spawn_event_consumer(event_rx, Arc::clone(&tracker));

    // Spawn WebSocket control server
    let ws_addr = CONTROL_ADDR.parse()?;
    let timer_ws = Arc::clone(&timer);
    tokio::spawn(async move {
        if let Err(e) = ws::control_server::start_control_server(ws_addr, timer_ws).await {
            eprintln!("Control server error: {}", e);
        }
    });

    run_tick_loop(timer, tracker).await;
    Ok(())
}

/// Phase-completion consumer: prints, logs, raises the desktop notification
/// and the stats line after each finished work session. Runs detached so a
/// slow notification daemon never stalls the countdown.
fn spawn_event_consumer(mut event_rx: EventReceiver, tracker: Arc<Mutex<SessionTracker>>) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let message = event_message(&event);
            println!("\n🔔 {}", message);

            if let Ok(mut tracker) = tracker.lock() {
                tracker.log(&format!(
                    "[{}] 🔔 {}",
                    Local::now().format("%H:%M:%S"),
                    message
                ));
                if event.previous_phase == Phase::Work {
                    tracker.completed_sessions += 1;
                    tracker.print_stats();
                }
            }

            if let Err(e) = send_notification(message) {
                eprintln!("Failed to send notification: {}", e);
            }
        }
    });
}

/// Drives the engine at 1 Hz. The decrement uses the measured elapsed whole
/// seconds, so missed or coalesced wakeups are caught up in one tick.
async fn run_tick_loop(timer: Arc<Mutex<TimerEngine>>, tracker: Arc<Mutex<SessionTracker>>) {
    let mut timer_interval = interval(Duration::from_millis(TICK_INTERVAL_MS));
    let mut last_tick = Instant::now();

    loop {
        timer_interval.tick().await;

        let elapsed = last_tick.elapsed().as_secs();
        if elapsed == 0 {
            continue;
        }
        // Keep the sub-second remainder for the next round
        last_tick += StdDuration::from_secs(elapsed);

        if let Ok(mut timer) = timer.lock() {
            if !timer.is_running() {
                continue;
            }
            if timer.phase() == Phase::Work {
                if let Ok(mut tracker) = tracker.lock() {
                    tracker.note_focus(elapsed);
                }
            }
            timer.tick(elapsed);
            if timer.is_running() {
                render_status_line(&timer);
            }
        }
    }
}
