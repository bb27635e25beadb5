use std::io::{self, Write};

use anyhow::Result;
use crossterm::{
    cursor,
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    terminal,
};
use pageflip_core::{Command, Direction};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    /// Left click at a cell; resolved against the current layout by the caller.
    Click { column: u16, row: u16 },
    BeginOpen,
    PromptChanged { input: String },
    OpenFile { path: String },
    PromptCancel,
    Resize,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    OpenPrompt,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    mode: InputMode,
    prompt: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.prompt.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                kind: KeyEventKind::Release,
                ..
            }) => UiEvent::None,
            Event::Resize(..) => UiEvent::Resize,
            event => match self.mode {
                InputMode::Normal => self.map_event_normal(event),
                InputMode::OpenPrompt => self.map_event_prompt(event),
            },
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    UiEvent::Quit
                }
                (KeyCode::Right | KeyCode::Down, _) => {
                    UiEvent::Command(Command::Navigate(Direction::Forward))
                }
                (KeyCode::Left | KeyCode::Up, _) => {
                    UiEvent::Command(Command::Navigate(Direction::Backward))
                }
                (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                    UiEvent::Command(Command::ToggleThumbnails)
                }
                (KeyCode::Char('f'), _) | (KeyCode::Char('F'), _) => {
                    UiEvent::Command(Command::ToggleFullscreen)
                }
                (KeyCode::Esc, _) => UiEvent::Command(Command::CloseThumbnails),
                (KeyCode::Char('o'), KeyModifiers::NONE) => {
                    self.set_mode(InputMode::OpenPrompt);
                    UiEvent::BeginOpen
                }
                (KeyCode::Char('q'), _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            Event::Mouse(MouseEvent {
                kind: MouseEventKind::Down(MouseButton::Left),
                column,
                row,
                ..
            }) => UiEvent::Click { column, row },
            Event::Paste(text) => match clean_dropped_text(&text) {
                Some(path) => UiEvent::OpenFile { path },
                None => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_prompt(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::PromptCancel
                }
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::PromptCancel
                }
                (KeyCode::Enter, _) => {
                    let input = clean_dropped_text(&self.prompt);
                    self.set_mode(InputMode::Normal);
                    match input {
                        Some(path) => UiEvent::OpenFile { path },
                        None => UiEvent::PromptCancel,
                    }
                }
                (KeyCode::Backspace, _) => {
                    self.prompt.pop();
                    self.prompt_changed()
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.prompt.push(c);
                    self.prompt_changed()
                }
                _ => UiEvent::None,
            },
            Event::Paste(text) => {
                self.prompt.push_str(text.trim_end_matches(['\r', '\n']));
                self.prompt_changed()
            }
            _ => UiEvent::None,
        }
    }

    fn prompt_changed(&self) -> UiEvent {
        UiEvent::PromptChanged {
            input: self.prompt.clone(),
        }
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::OpenPrompt => Some(format!("open: {}", self.prompt)),
            InputMode::Normal => None,
        }
    }
}

/// Turns text pasted or dropped onto the terminal into a single path or URL.
///
/// Only the first non-blank line is used; surrounding whitespace and one
/// pair of matching quotes are removed. Unquoted text has shell escapes
/// such as `My\ Slides.pdf` undone. `file://` URLs are left for the caller
/// to resolve.
pub fn clean_dropped_text(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let quoted = ['"', '\''].iter().find_map(|quote| {
        line.strip_prefix(*quote)
            .and_then(|rest| rest.strip_suffix(*quote))
    });
    let cleaned = match quoted {
        Some(inner) => inner.trim().to_string(),
        None => unescape_shell(line),
    };
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Drops the backslash in front of whitespace and shell metacharacters.
/// Other backslashes, as in Windows paths, are kept.
fn unescape_shell(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next.is_whitespace() || "\\()[]{}'\"&;!$#*?<>|`~,".contains(next) {
                    unescaped.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        unescaped.push(c);
    }
    unescaped
}

/// Puts the terminal into the mode the viewer's input bindings need and
/// restores it on drop.
pub struct InputSubscription {
    _private: (),
}

impl InputSubscription {
    pub fn acquire() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let subscription = Self { _private: () };
        let mut stdout = io::stdout();
        crossterm::execute!(
            stdout,
            EnableMouseCapture,
            EnableBracketedPaste,
            cursor::Hide
        )?;
        debug!("input subscription acquired");
        Ok(subscription)
    }
}

impl Drop for InputSubscription {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(
            stdout,
            DisableBracketedPaste,
            DisableMouseCapture,
            cursor::Show
        );
        let _ = stdout.flush();
        let _ = terminal::disable_raw_mode();
        debug!("input subscription released");
    }
}
