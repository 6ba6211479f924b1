//! What each phase looks like, and which keys do what.
//!
//! Everything here is pure so it can be tested without a terminal.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::messages;
use crate::runner::Intent;
use crate::session::{Phase, Session};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// How a line is painted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Heading,
    Body,
    Muted,
    Answer,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub tone: Tone,
}

impl Line {
    fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }

    fn blank() -> Self {
        Self::new("", Tone::Body)
    }
}

/// One full screen: body lines plus the key hints for the status bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub lines: Vec<Line>,
    pub hints: &'static str,
}

/// What a key press means for the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Quit,
}

/// Build the screen for the current session.
///
/// `camera` is the description of the held device, `tick` drives the spinner.
pub fn screen(session: &Session, camera: Option<&str>, tick: usize) -> Screen {
    match session.phase() {
        Phase::Idle => Screen {
            lines: vec![
                Line::new("Tes devoirs résolus en un clic.", Tone::Heading),
                Line::blank(),
                Line::new("Prends en photo ton exercice de maths, français ou science.", Tone::Body),
                Line::new("Prise en charge de l'écriture manuscrite et imprimée.", Tone::Muted),
            ],
            hints: "Entrée : commencer   q : quitter",
        },
        Phase::Capturing => match session.capture_fault() {
            Some(fault) => Screen {
                lines: vec![
                    Line::new("Caméra", Tone::Heading),
                    Line::blank(),
                    Line::new(fault, Tone::Warning),
                ],
                hints: "r : réessayer   Échap : annuler",
            },
            None => Screen {
                lines: vec![
                    Line::new("Caméra", Tone::Heading),
                    Line::blank(),
                    Line::new("Cadre bien ton exercice puis prends la photo.", Tone::Body),
                    Line::new(camera.unwrap_or("caméra"), Tone::Muted),
                ],
                hints: "Entrée : prendre la photo   Échap : annuler",
            },
        },
        Phase::Processing => Screen {
            lines: vec![
                Line::new(
                    format!("{} L'IA réfléchit...", SPINNER[tick % SPINNER.len()]),
                    Tone::Heading,
                ),
                Line::blank(),
                Line::new("Analyse de ton image en cours.", Tone::Muted),
            ],
            hints: "Échap : abandonner   q : quitter",
        },
        Phase::Result => {
            let mut lines = vec![Line::new("Résultats", Tone::Heading), Line::blank()];
            let answer = session.solution_text().unwrap_or(messages::FALLBACK_ANSWER);
            lines.extend(answer.lines().map(|line| Line::new(line, Tone::Answer)));
            lines.push(Line::blank());
            lines.push(Line::new(messages::ADVICE, Tone::Muted));
            Screen {
                lines,
                hints: "n : nouveau scan   q : quitter",
            }
        }
        Phase::Error => Screen {
            lines: vec![
                Line::new("Mince !", Tone::Heading),
                Line::blank(),
                Line::new(
                    session.error_message().unwrap_or(messages::UNKNOWN_ERROR),
                    Tone::Failure,
                ),
            ],
            hints: "Entrée : réessayer   q : quitter",
        },
    }
}

/// Map a key press to a command for the given phase
pub fn command_for_key(phase: Phase, has_fault: bool, key: KeyEvent) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Command::Quit),
            _ => None,
        };
    }

    let intent = match (phase, key.code) {
        (_, KeyCode::Char('q')) => return Some(Command::Quit),

        (Phase::Idle, KeyCode::Enter | KeyCode::Char(' ')) => Intent::Start,

        (Phase::Capturing, KeyCode::Esc) => Intent::Cancel,
        (Phase::Capturing, KeyCode::Char('r')) if has_fault => Intent::RetryCamera,
        (Phase::Capturing, KeyCode::Enter | KeyCode::Char(' ')) if !has_fault => Intent::Shoot,

        (Phase::Processing, KeyCode::Esc) => Intent::Reset,

        (Phase::Result | Phase::Error, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('n' | 'r')) => {
            Intent::Reset
        }

        _ => return None,
    };
    Some(Command::Intent(intent))
}
