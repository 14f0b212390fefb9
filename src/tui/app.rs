//! TUI application state and main event loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::compose::ComposeState;
use super::log_capture::LogBuffer;
use super::messages::MessagesState;
use super::sidebar::{self, SidebarState};
use super::ui;
use crate::api::ApiClient;
use crate::config::Config;
use crate::messaging::{Controller, ControllerEvent, MessagingError, Severity, SystemClock};
use crate::realtime;
use crate::session;

/// Redraw at least this often so the status bar picks up new log lines.
const TICK: Duration = Duration::from_millis(500);

/// Active pane in the TUI
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pane {
    #[default]
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }
}

pub struct App {
    pub ctrl: Controller,
    pub pane: Pane,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    pub logs: LogBuffer,
    /// Whether the live delivery listener is still running.
    pub live: bool,
    /// Set once the server rejected the session token.
    pub session_ended: bool,
    pub should_exit: bool,
}

impl App {
    pub fn new(ctrl: Controller, logs: LogBuffer) -> Self {
        Self {
            ctrl,
            pane: Pane::default(),
            sidebar: SidebarState::default(),
            messages: MessagesState::default(),
            compose: ComposeState::default(),
            logs,
            live: false,
            session_ended: false,
            should_exit: false,
        }
    }

    /// Title of the open conversation, or a placeholder.
    pub fn open_title(&self) -> String {
        let Some(key) = self.ctrl.selected() else {
            return "No conversation".to_string();
        };
        let local = &self.ctrl.identity().id;
        self.ctrl
            .conversations()
            .iter()
            .find(|s| s.key(local) == *key)
            .map(|s| s.title())
            .unwrap_or_else(|| format!("{} (job {})", key.remote, key.job))
    }

    pub fn on_controller_event(&mut self, event: ControllerEvent) {
        if matches!(event, ControllerEvent::ConversationsLoaded(_)) {
            self.sidebar.loaded = true;
        }
        self.ctrl.handle(event);

        let rejected = self
            .ctrl
            .notice()
            .is_some_and(|n| n.severity == Severity::Reauthenticate);
        if rejected && !self.session_ended {
            self.session_ended = true;
            self.ctrl.end_session();
            self.messages.reset();
            self.pane = Pane::Sidebar;
        }
        self.sidebar.clamp(self.ctrl.conversations().len());
    }

    pub fn on_terminal_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.on_key(key);
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return;
        }
        match key.code {
            KeyCode::Tab => {
                self.pane = self.pane.next();
                return;
            }
            KeyCode::F(5) => {
                self.ctrl.refresh();
                self.ctrl.load_conversations();
                return;
            }
            KeyCode::Esc if self.ctrl.dismiss_notice() => return,
            _ => {}
        }

        match self.pane {
            Pane::Sidebar => self.on_sidebar_key(key.code),
            Pane::Messages => self.on_messages_key(key.code),
            Pane::Compose => self.on_compose_key(key),
        }
    }

    fn on_sidebar_key(&mut self, code: KeyCode) {
        let count = self.ctrl.conversations().len();
        match code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Up | KeyCode::Char('k') => self.sidebar.up(),
            KeyCode::Down | KeyCode::Char('j') => self.sidebar.down(count),
            KeyCode::Enter => {
                let rows = sidebar::rows(&self.ctrl);
                if let Some(row) = rows.into_iter().nth(self.sidebar.cursor) {
                    self.ctrl.select(row.key);
                    self.messages.reset();
                    self.pane = Pane::Compose;
                }
            }
            _ => {}
        }
    }

    fn on_messages_key(&mut self, code: KeyCode) {
        let count = self.ctrl.messages().len();
        match code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Up | KeyCode::Char('k') => self.messages.up(count),
            KeyCode::Down | KeyCode::Char('j') => self.messages.down(count),
            KeyCode::Char('m') => self.ctrl.mark_read(),
            KeyCode::Char('r') => {
                if let Some(id) = self.messages.selected_id(self.ctrl.messages()) {
                    if let Err(e) = self.ctrl.retry_failed(&id) {
                        tracing::info!("Nothing to retry: {}", e);
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.messages.selected_id(self.ctrl.messages()) {
                    if self.ctrl.discard_failed(&id) {
                        self.messages.reset();
                    }
                }
            }
            KeyCode::Esc => self.messages.reset(),
            _ => {}
        }
    }

    fn on_compose_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let Some(text) = self.compose.take() else {
                    return;
                };
                match self.ctrl.send(&text) {
                    Ok(_) => self.messages.reset(),
                    Err(MessagingError::EmptyMessage) => {}
                    Err(e) => {
                        tracing::warn!("Cannot send: {}", e);
                        // Keep the text so it is not lost.
                        for c in text.chars() {
                            self.compose.insert(c);
                        }
                    }
                }
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.compose.clear()
            }
            KeyCode::Char(c) => self.compose.insert(c),
            KeyCode::Backspace => self.compose.backspace(),
            KeyCode::Left => self.compose.left(),
            KeyCode::Right => self.compose.right(),
            KeyCode::Esc => self.pane = Pane::Sidebar,
            _ => {}
        }
    }
}

/// Run the TUI for the stored session. Log output goes to `logs`.
pub async fn run(logs: LogBuffer) -> Result<()> {
    let config = Config::load()?;
    let session = session::load_active(&config)?;
    let client = ApiClient::new(&config.api_base_url(), session.clone())?;
    let (ctrl, events) = Controller::new(
        session.identity.clone(),
        Arc::new(client),
        Arc::new(SystemClock),
        config.controller_settings(),
    );
    let listener = tokio::spawn(realtime::run(
        config.realtime_url(),
        session,
        ctrl.event_sender(),
    ));

    let mut app = App::new(ctrl, logs);
    app.ctrl.load_conversations();
    app.ctrl.refresh_unread_counts();

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app, events, &listener).await;
    ratatui::restore();
    listener.abort();
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    mut events: mpsc::UnboundedReceiver<ControllerEvent>,
    listener: &JoinHandle<Result<()>>,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut tick = tokio::time::interval(TICK);

    while !app.should_exit {
        app.live = !listener.is_finished();
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            Some(event) = events.recv() => app.on_controller_event(event),
            next = input.next() => match next {
                Some(Ok(event)) => app.on_terminal_event(event),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = tick.tick() => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::clock::ManualClock;
    use crate::messaging::service::fake::FakeService;
    use crate::messaging::ControllerSettings;
    use crate::models::{Identity, Role};

    fn app() -> (App, mpsc::UnboundedReceiver<ControllerEvent>) {
        let clock = ManualClock::new(crate::models::fixtures::at(0));
        let service = FakeService::new(clock.clone());
        let (ctrl, rx) = Controller::new(
            Identity::new("emp", Role::Employer),
            service,
            Arc::new(clock),
            ControllerSettings::default(),
        );
        (App::new(ctrl, LogBuffer::new()), rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[tokio::test]
    async fn test_tab_cycles_panes() {
        let (mut app, _rx) = app();
        assert_eq!(app.pane, Pane::Sidebar);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.pane, Pane::Compose);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.pane, Pane::Sidebar);
    }

    #[tokio::test]
    async fn test_send_without_conversation_keeps_text() {
        let (mut app, _rx) = app();
        app.pane = Pane::Compose;
        for c in "hello".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.compose.input, "hello");
        assert!(app.ctrl.messages().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_session_is_torn_down_once() {
        let (mut app, _rx) = app();
        app.on_controller_event(ControllerEvent::UnreadLoaded(Err(
            MessagingError::Unauthorized,
        )));
        assert!(app.session_ended);
        assert_eq!(app.pane, Pane::Sidebar);
        assert_eq!(
            app.ctrl.notice().map(|n| n.severity),
            Some(Severity::Reauthenticate)
        );
    }

    #[tokio::test]
    async fn test_q_quits_outside_compose() {
        let (mut app, _rx) = app();
        app.pane = Pane::Compose;
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_exit);
        assert_eq!(app.compose.input, "q");

        app.pane = Pane::Sidebar;
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_exit);
    }
}
