use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use upcoming_core::email::validate_email;
use upcoming_service::ServiceError;

pub const CHECK_EMAIL: &str = "Check your email for the sign-in link.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Link,
}

/// What the app should do after a key press on the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    None,
    /// Ask for a sign-in link to be sent to this address.
    RequestLink(String),
    /// Open the task list using this address as the landing page.
    OpenLink(String),
    Quit,
}

/// Message shown under the send button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

impl Status {
    pub fn text(&self) -> &str {
        match self {
            Status::Info(text) | Status::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct LoginForm {
    email: String,
    link: String,
    field: LoginField,
    status: Option<Status>,
    sending: bool,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginForm {
    pub fn new() -> Self {
        Self {
            email: String::new(),
            link: String::new(),
            field: LoginField::Email,
            status: None,
            sending: false,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn field(&self) -> LoginField {
        self.field
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(Status::text)
    }

    pub fn status_kind(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Start a sign-in link request.
    ///
    /// Returns the address to send to, or `None` if a request is already in
    /// flight or the address does not look like an email.
    pub fn begin_submit(&mut self) -> Option<String> {
        if self.sending {
            return None;
        }
        let email = match validate_email(&self.email) {
            Ok(email) => email.to_string(),
            Err(e) => {
                self.status = Some(Status::Error(e.to_string()));
                return None;
            }
        };
        self.sending = true;
        self.status = None;
        Some(email)
    }

    pub fn finish_submit(&mut self, result: Result<(), ServiceError>) {
        self.sending = false;
        self.status = Some(match result {
            Ok(()) => Status::Info(CHECK_EMAIL.to_string()),
            Err(e) => Status::Error(format!("Error: {}", e.message())),
        });
    }

    pub fn handle_paste(&mut self, text: &str) {
        let text = text.trim();
        match self.field {
            LoginField::Email => self.email.push_str(text),
            LoginField::Link => self.link.push_str(text),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> LoginAction {
        match key.code {
            KeyCode::Esc => LoginAction::Quit,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.field = match self.field {
                    LoginField::Email => LoginField::Link,
                    LoginField::Link => LoginField::Email,
                };
                LoginAction::None
            }
            KeyCode::Enter => match self.field {
                LoginField::Email => match self.begin_submit() {
                    Some(email) => LoginAction::RequestLink(email),
                    None => LoginAction::None,
                },
                LoginField::Link => {
                    let link = self.link.trim();
                    if link.is_empty() {
                        self.status = Some(Status::Error(
                            "Paste the link from the email first.".into(),
                        ));
                        LoginAction::None
                    } else {
                        LoginAction::OpenLink(link.to_string())
                    }
                }
            },
            KeyCode::Backspace => {
                self.focused_mut().pop();
                LoginAction::None
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.focused_mut().push(c);
                LoginAction::None
            }
            _ => LoginAction::None,
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.field {
            LoginField::Email => &mut self.email,
            LoginField::Link => &mut self.link,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let outer = Block::default().title(" Sign in ").borders(Borders::ALL);
        let inner = outer.inner(area);
        frame.render_widget(outer, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(2),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(inner);

        frame.render_widget(
            input_box(" Email ", &self.email, self.field == LoginField::Email),
            chunks[0],
        );

        let button = if self.sending {
            Span::styled("[ Sending… ]", Style::default().fg(Color::DarkGray))
        } else {
            Span::styled("[ Send sign-in link ]", Style::default().fg(Color::Cyan).bold())
        };
        frame.render_widget(Line::from(vec![Span::raw(" "), button]), chunks[1]);

        if let Some(ref status) = self.status {
            let style = if status.is_error() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            };
            let paragraph = Paragraph::new(Span::styled(format!(" {}", status.text()), style))
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, chunks[2]);
        }

        frame.render_widget(
            input_box(
                " Sign-in link (paste from email) ",
                &self.link,
                self.field == LoginField::Link,
            ),
            chunks[3],
        );
    }
}

fn input_box<'a>(title: &'a str, value: &'a str, focused: bool) -> Paragraph<'a> {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);
    let text = if focused {
        format!("{value}_")
    } else {
        value.to_string()
    };
    Paragraph::new(text).block(block)
}
