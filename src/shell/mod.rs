//! Interactive terminal front end.
//!
//! A crossterm alternate screen showing one screen per session phase. Key
//! presses are read on a plain thread and forwarded into the Tokio loop,
//! which also waits on analysis completions and a spinner tick, so the UI
//! keeps animating while a request is in flight.

pub mod view;

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event as TermEvent, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::error::Error;
use std::io::{self, Stdout, Write, stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::runner::Controller;
pub use view::{Command, Line, Screen, Tone, command_for_key, screen};

const TICK: Duration = Duration::from_millis(100);

/// Restores the terminal however the loop exits
struct TerminalGuard;

impl TerminalGuard {
    fn enter(out: &mut Stdout) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), ResetColor, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Run the interactive UI until the user quits
pub async fn run(mut controller: Controller) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    let _guard = TerminalGuard::enter(&mut out)?;

    let (key_tx, mut key_rx) = mpsc::unbounded_channel();
    spawn_key_reader(key_tx);

    let mut ticker = tokio::time::interval(TICK);
    let mut tick = 0usize;

    loop {
        draw(&mut out, &controller, tick)?;

        tokio::select! {
            Some(key) = key_rx.recv() => {
                let session = controller.session();
                match command_for_key(session.phase(), session.capture_fault().is_some(), key) {
                    Some(Command::Quit) => break,
                    Some(Command::Intent(intent)) => {
                        if let Err(err) = controller.handle(intent).await {
                            debug!(error = %err, "intent ignored");
                        }
                    }
                    None => {}
                }
            }
            Some(completion) = controller.next_completion() => {
                controller.complete(completion);
            }
            _ = ticker.tick() => {
                tick = tick.wrapping_add(1);
            }
        }
    }

    Ok(())
}

fn spawn_key_reader(tx: mpsc::UnboundedSender<KeyEvent>) {
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(TICK) {
                Ok(true) => match event::read() {
                    Ok(TermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "terminal input failed");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "terminal input failed");
                    break;
                }
            }
        }
    });
}

fn color_for(tone: Tone) -> Color {
    match tone {
        Tone::Heading => Color::White,
        Tone::Body => Color::Reset,
        Tone::Muted => Color::DarkGrey,
        Tone::Answer => Color::Cyan,
        Tone::Warning => Color::Yellow,
        Tone::Failure => Color::Red,
    }
}

/// Break `text` into chunks of at most `width` characters, preferring spaces
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut rows = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        // A single word longer than the row is hard-split
        while current.chars().count() > width {
            let head: String = current.chars().take(width).collect();
            current = current.chars().skip(width).collect();
            rows.push(head);
        }
    }
    rows.push(current);
    rows
}

fn bar(text: &str, width: u16) -> String {
    let width = width as usize;
    let mut bar: String = text.chars().take(width).collect();
    let len = bar.chars().count();
    bar.push_str(&" ".repeat(width.saturating_sub(len)));
    bar
}

fn draw(out: &mut Stdout, controller: &Controller, tick: usize) -> io::Result<()> {
    let (width, height) = terminal::size()?;
    let camera = controller.camera_description();
    let screen = screen(controller.session(), camera.as_deref(), tick);

    queue!(
        out,
        ResetColor,
        Clear(ClearType::All),
        MoveTo(0, 0),
        SetBackgroundColor(Color::DarkBlue),
        SetForegroundColor(Color::White),
        SetAttribute(Attribute::Bold),
        Print(bar(" Snap Solve", width)),
        SetAttribute(Attribute::Reset),
        ResetColor,
    )?;

    let body_width = width.saturating_sub(4) as usize;
    let last_row = height.saturating_sub(2);
    let mut y = 2u16;
    'lines: for line in &screen.lines {
        for row in wrap(&line.text, body_width) {
            if y > last_row {
                break 'lines;
            }
            queue!(out, MoveTo(2, y), SetForegroundColor(color_for(line.tone)))?;
            if line.tone == Tone::Heading {
                queue!(out, SetAttribute(Attribute::Bold))?;
            }
            queue!(out, Print(row), SetAttribute(Attribute::Reset), ResetColor)?;
            y += 1;
        }
    }

    queue!(
        out,
        MoveTo(0, height.saturating_sub(1)),
        SetBackgroundColor(Color::DarkGrey),
        SetForegroundColor(Color::White),
        Print(bar(&format!(" {}", screen.hints), width)),
        ResetColor,
    )?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrap_on_spaces() {
        assert_eq!(wrap("12 + 30 = 42", 7), vec!["12 + 30", "= 42"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("é é", 1), vec!["é", "é"]);
    }

    #[test]
    fn test_bar_pads_and_truncates() {
        assert_eq!(bar("ab", 4), "ab  ");
        assert_eq!(bar("abcdef", 3), "abc");
    }
}
