use std::future::Future;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use upcoming_core::task::{Task, TaskQuery, TaskUpdate, TASKS_TABLE};
use upcoming_service::{Backend, ServiceError, Session};

use crate::components::login_form::{LoginAction, LoginForm};
use crate::components::task_table::TaskTable;

/// Which screen is showing.
pub enum Screen {
    /// Email entry and sign-in link request
    Login(LoginForm),
    /// Upcoming tasks table
    Tasks(TaskTable),
}

/// Result of a backend call, delivered back to the UI thread.
#[derive(Debug)]
pub enum Outcome {
    LinkRequested(Result<(), ServiceError>),
    SessionReady(Result<Option<Session>, ServiceError>),
    Loaded(Result<Vec<Task>, ServiceError>),
    MarkedDone {
        id: String,
        result: Result<(), ServiceError>,
    },
    SignedOut(Result<(), ServiceError>),
}

struct Envelope {
    /// Screen instance the request was made from.
    generation: u64,
    outcome: Outcome,
}

pub struct App {
    backend: Arc<dyn Backend>,
    runtime: Handle,
    redirect_to: String,
    screen: Screen,
    session: Option<Session>,
    generation: u64,
    in_flight: usize,
    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    should_quit: bool,
}

impl App {
    /// Start on the login screen. Backend calls are spawned on `runtime`;
    /// `redirect_to` is where emailed sign-in links send the user.
    pub fn new(backend: Arc<dyn Backend>, runtime: Handle, redirect_to: impl Into<String>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            backend,
            runtime,
            redirect_to: redirect_to.into(),
            screen: Screen::Login(LoginForm::new()),
            session: None,
            generation: 0,
            in_flight: 0,
            tx,
            rx,
            should_quit: false,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// The login form takes free text, so `q` must not quit there.
    pub fn is_input_mode(&self) -> bool {
        matches!(self.screen, Screen::Login(_))
    }

    /// Returns true while requests are outstanding, so the event loop
    /// polls with a timeout instead of blocking on input.
    pub fn needs_polling(&self) -> bool {
        self.in_flight > 0
    }

    /// Show the login screen. Anything still in flight for the previous
    /// screen is dropped when it arrives.
    pub fn open_login(&mut self) {
        self.generation += 1;
        self.screen = Screen::Login(LoginForm::new());
        info!("showing login");
    }

    /// Show the task list. `location` is the address a sign-in link landed
    /// on; the session is established from it before the first load.
    pub fn open_tasks(&mut self, location: Option<String>) {
        self.generation += 1;
        self.screen = Screen::Tasks(TaskTable::new());
        info!("showing tasks");
        let backend = self.backend.clone();
        self.spawn(async move { Outcome::SessionReady(backend.get_session(location.as_deref()).await) });
    }

    fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let tx = self.tx.clone();
        let generation = self.generation;
        self.in_flight += 1;
        self.runtime.spawn(async move {
            let outcome = fut.await;
            // The receiver lives as long as the app.
            let _ = tx.send(Envelope {
                generation,
                outcome,
            });
        });
    }

    /// Apply every outcome that has arrived. Returns true if any did.
    pub fn poll_outcomes(&mut self) -> bool {
        let mut applied = false;
        while let Ok(envelope) = self.rx.try_recv() {
            self.apply(envelope);
            applied = true;
        }
        applied
    }

    /// Block until nothing is in flight, applying outcomes as they arrive.
    /// Must not be called from inside the runtime.
    pub fn wait_idle(&mut self) {
        while self.in_flight > 0 {
            match self.rx.blocking_recv() {
                Some(envelope) => self.apply(envelope),
                None => break,
            }
        }
    }

    fn apply(&mut self, envelope: Envelope) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if envelope.generation != self.generation {
            debug!(outcome = ?envelope.outcome, "dropping outcome for a closed screen");
            return;
        }

        match envelope.outcome {
            Outcome::LinkRequested(result) => {
                if let Err(ref e) = result {
                    warn!("sign-in link request failed: {e}");
                }
                if let Screen::Login(form) = &mut self.screen {
                    form.finish_submit(result);
                }
            }
            Outcome::SessionReady(Ok(session)) => {
                info!(email = ?session.as_ref().and_then(|s| s.email.as_deref()), "session ready");
                self.session = session;
                self.load();
            }
            Outcome::SessionReady(Err(e)) => {
                // No load without a session; `r` retries, `L` goes back.
                warn!("session could not be established: {e}");
                self.session = None;
                if let Some(table) = self.table_mut() {
                    table.set_error(e.message());
                }
            }
            Outcome::Loaded(result) => {
                if let Err(ref e) = result {
                    warn!("load failed: {e}");
                }
                if let Some(table) = self.table_mut() {
                    table.finish_load(result);
                }
            }
            Outcome::MarkedDone { id, result } => {
                if let Err(ref e) = result {
                    warn!(%id, "mark done failed: {e}");
                }
                if let Some(table) = self.table_mut() {
                    table.finish_mark_done(&id, result);
                }
            }
            Outcome::SignedOut(result) => {
                if let Err(e) = result {
                    warn!("sign out failed: {e}");
                }
                self.session = None;
                self.open_login();
            }
        }
    }

    fn table_mut(&mut self) -> Option<&mut TaskTable> {
        match &mut self.screen {
            Screen::Tasks(table) => Some(table),
            Screen::Login(_) => None,
        }
    }

    fn request_link(&mut self, email: String) {
        let backend = self.backend.clone();
        let redirect_to = self.redirect_to.clone();
        info!("requesting sign-in link");
        self.spawn(async move {
            Outcome::LinkRequested(backend.sign_in_with_otp(&email, &redirect_to).await)
        });
    }

    fn load(&mut self) {
        let Some(table) = self.table_mut() else {
            return;
        };
        table.begin_load();
        let backend = self.backend.clone();
        self.spawn(async move { Outcome::Loaded(backend.query_rows(&TaskQuery::upcoming()).await) });
    }

    fn mark_done(&mut self) {
        let Some(id) = self.table_mut().and_then(|t| t.begin_mark_done()) else {
            return;
        };
        let backend = self.backend.clone();
        self.spawn(async move {
            let result = backend
                .update_row(TASKS_TABLE, &id, &TaskUpdate::mark_done())
                .await;
            Outcome::MarkedDone { id, result }
        });
    }

    fn logout(&mut self) {
        let backend = self.backend.clone();
        info!("signing out");
        self.spawn(async move { Outcome::SignedOut(backend.sign_out().await) });
    }

    pub fn handle_paste(&mut self, text: &str) {
        if let Screen::Login(form) = &mut self.screen {
            form.handle_paste(text);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match &mut self.screen {
            Screen::Login(form) => match form.handle_key(key) {
                LoginAction::None => {}
                LoginAction::RequestLink(email) => self.request_link(email),
                LoginAction::OpenLink(link) => self.open_tasks(Some(link)),
                LoginAction::Quit => self.should_quit = true,
            },
            Screen::Tasks(table) => match key.code {
                KeyCode::Char('r') => self.load(),
                KeyCode::Char('d') | KeyCode::Enter => self.mark_done(),
                KeyCode::Char('L') => self.logout(),
                _ => table.handle_key(key),
            },
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.render_title_bar(frame, layout[0]);
        match &self.screen {
            Screen::Login(form) => form.render(frame, centered_rect(70, 70, layout[1])),
            Screen::Tasks(table) => table.render(frame, layout[1]),
        }
        self.render_status_bar(frame, layout[2]);
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let heading = match self.screen {
            Screen::Login(_) => "Sign in",
            Screen::Tasks(_) => "Upcoming tasks",
        };
        let mut spans = vec![
            Span::styled(" upcoming ", Style::default().bold().fg(Color::Cyan)),
            Span::raw("| "),
            Span::styled(heading, Style::default().fg(Color::Yellow)),
        ];
        if let Some(email) = self.session.as_ref().and_then(|s| s.email.as_deref()) {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(email, Style::default().fg(Color::Magenta)));
        }
        frame.render_widget(Line::from(spans), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let hints: &[(&str, &str)] = match self.screen {
            Screen::Login(_) => &[
                ("Enter", "send / open"),
                ("Tab", "switch field"),
                ("Esc", "quit"),
            ],
            Screen::Tasks(_) => &[
                ("j/k", "select"),
                ("d", "done"),
                ("r", "refresh"),
                ("L", "log out"),
                ("q", "quit"),
            ],
        };

        let mut spans = Vec::new();
        for (key, desc) in hints {
            spans.push(Span::styled(
                format!(" {key}"),
                Style::default().fg(Color::Cyan).bold(),
            ));
            spans.push(Span::styled(
                format!(":{desc} "),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if self.in_flight > 0 {
            spans.push(Span::styled(" working…", Style::default().fg(Color::Yellow)));
        }
        frame.render_widget(Line::from(spans), area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
