//! State machine tests for the TUI App.
//!
//! Each test builds an App over a MockBackend with its own tokio runtime,
//! simulates key events, and waits for outstanding requests with
//! `wait_idle` before checking screen state or rendered output.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::backend::TestBackend;
use ratatui::Terminal;
use tokio::runtime::Runtime;
use upcoming_core::task::{Task, TaskQuery, TaskUpdate};
use upcoming_service::{MockBackend, MockCall, Session};
use upcoming_tui::app::{App, Screen};
use upcoming_tui::components::login_form::{LoginForm, CHECK_EMAIL};
use upcoming_tui::components::task_table::{LoadState, TaskTable, NO_UPCOMING};

const REDIRECT: &str = "http://localhost:3000/tasks";
const LINK: &str = "http://localhost:3000/tasks#access_token=tok&expires_in=3600&refresh_token=r&token_type=bearer";

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn char_key(c: char) -> KeyEvent {
    key(KeyCode::Char(c))
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        app.handle_key(char_key(c));
    }
}

fn task(id: &str, date: &str, time: &str) -> Task {
    Task {
        id: id.to_string(),
        task_date: date.to_string(),
        start_time: time.to_string(),
        event: format!("Event {id}"),
        activity_name: format!("Activity {id}"),
        task_text: Some(format!("Text {id}")),
        owner: Some(format!("Owner {id}")),
        done: false,
    }
}

fn three_tasks() -> Vec<Task> {
    vec![
        task("1", "2024-01-02", "09:00"),
        task("2", "2024-01-02", "11:00"),
        task("3", "2024-01-03", "08:00"),
    ]
}

fn make_app(mock: MockBackend) -> (Runtime, App, Arc<MockBackend>) {
    let rt = Runtime::new().unwrap();
    let mock = Arc::new(mock);
    let app = App::new(mock.clone(), rt.handle().clone(), REDIRECT);
    (rt, app, mock)
}

/// App already on the task list with the initial load applied.
fn make_tasks_app(rows: Vec<Task>) -> (Runtime, App, Arc<MockBackend>) {
    let (rt, mut app, mock) = make_app(MockBackend::new().with_rows(rows));
    app.open_tasks(Some(LINK.to_string()));
    app.wait_idle();
    (rt, app, mock)
}

fn form(app: &App) -> &LoginForm {
    match app.screen() {
        Screen::Login(form) => form,
        Screen::Tasks(_) => panic!("expected login screen"),
    }
}

fn table(app: &App) -> &TaskTable {
    match app.screen() {
        Screen::Tasks(table) => table,
        Screen::Login(_) => panic!("expected task screen"),
    }
}

fn ids(app: &App) -> Vec<String> {
    table(app).rows().iter().map(|t| t.id.clone()).collect()
}

fn queries(mock: &MockBackend) -> usize {
    mock.count(|c| matches!(c, MockCall::QueryRows(_)))
}

fn render_text(app: &App) -> String {
    let backend = TestBackend::new(120, 30);
    let mut terminal = Terminal::new(backend).unwrap();
    terminal.draw(|f| app.render(f)).unwrap();
    let buffer = terminal.backend().buffer();
    let width = buffer.area.width as usize;
    buffer
        .content
        .chunks(width)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---- Login screen ----

#[test]
fn app_starts_on_login() {
    let (_rt, app, mock) = make_app(MockBackend::new());
    assert!(matches!(app.screen(), Screen::Login(_)));
    assert!(app.is_input_mode());
    assert!(!app.needs_polling());
    assert!(mock.calls().is_empty());
}

#[test]
fn request_link_shows_confirmation() {
    let (_rt, mut app, mock) = make_app(MockBackend::new());
    type_text(&mut app, "user@x.com");
    app.handle_key(key(KeyCode::Enter));
    assert!(form(&app).is_sending());
    assert!(app.needs_polling());

    app.wait_idle();
    assert_eq!(form(&app).status(), Some(CHECK_EMAIL));
    assert!(!form(&app).is_sending());
    assert_eq!(
        mock.calls(),
        vec![MockCall::SignInWithOtp {
            email: "user@x.com".into(),
            redirect_to: REDIRECT.into(),
        }]
    );
}

#[test]
fn resubmit_while_pending_is_rejected() {
    let (_rt, mut app, mock) = make_app(MockBackend::new());
    type_text(&mut app, "user@x.com");
    app.handle_key(key(KeyCode::Enter));
    // Outcome not applied yet, so the form is still sending.
    app.handle_key(key(KeyCode::Enter));
    app.handle_key(key(KeyCode::Enter));
    app.wait_idle();
    assert_eq!(
        mock.count(|c| matches!(c, MockCall::SignInWithOtp { .. })),
        1
    );
    assert_eq!(form(&app).status(), Some(CHECK_EMAIL));
}

#[test]
fn request_link_failure_shows_message() {
    let mock = MockBackend::new();
    mock.fail_sign_in(Some("email rate limit exceeded"));
    let (_rt, mut app, _mock) = make_app(mock);
    type_text(&mut app, "user@x.com");
    app.handle_key(key(KeyCode::Enter));
    app.wait_idle();
    assert_eq!(form(&app).status(), Some("Error: email rate limit exceeded"));
    assert!(!form(&app).is_sending());
}

#[test]
fn invalid_email_never_reaches_backend() {
    let (_rt, mut app, mock) = make_app(MockBackend::new());
    type_text(&mut app, "not-an-email");
    app.handle_key(key(KeyCode::Enter));
    assert!(!app.needs_polling());
    assert!(mock.calls().is_empty());
    assert!(form(&app).status().is_some());
}

#[test]
fn esc_on_login_quits() {
    let (_rt, mut app, _mock) = make_app(MockBackend::new());
    app.handle_key(key(KeyCode::Esc));
    assert!(app.should_quit());
}

#[test]
fn pasted_link_opens_tasks() {
    let (_rt, mut app, mock) = make_app(MockBackend::new().with_rows(three_tasks()));
    app.handle_key(key(KeyCode::Tab));
    app.handle_paste(LINK);
    app.handle_key(key(KeyCode::Enter));
    assert!(matches!(app.screen(), Screen::Tasks(_)));
    assert!(!app.is_input_mode());

    app.wait_idle();
    assert_eq!(app.session().unwrap().access_token, "tok");
    assert_eq!(ids(&app), ["1", "2", "3"]);
}

// ---- Task list: mount and load ----

#[test]
fn session_is_established_before_first_query() {
    let (_rt, _app, mock) = make_tasks_app(three_tasks());
    assert_eq!(
        mock.calls(),
        vec![
            MockCall::GetSession {
                location: Some(LINK.into())
            },
            MockCall::QueryRows(TaskQuery::upcoming()),
        ]
    );
}

#[test]
fn query_asks_for_date_then_time_ordering() {
    let (_rt, _app, mock) = make_tasks_app(three_tasks());
    let query = mock
        .calls()
        .into_iter()
        .find_map(|c| match c {
            MockCall::QueryRows(q) => Some(q),
            _ => None,
        })
        .unwrap();
    assert_eq!(query.view, "upcoming_tasks");
    assert_eq!(query.order_param(), "task_date.asc,start_time.asc");
}

#[test]
fn rows_render_in_server_order() {
    // Deliberately not sorted: the client must not re-sort.
    let rows = vec![
        task("b", "2024-02-01", "10:00"),
        task("a", "2024-01-01", "09:00"),
    ];
    let (_rt, app, _mock) = make_tasks_app(rows);
    assert_eq!(ids(&app), ["b", "a"]);
    let text = render_text(&app);
    let b = text.find("Event b").unwrap();
    let a = text.find("Event a").unwrap();
    assert!(b < a);
}

#[test]
fn null_text_and_owner_render_empty() {
    let row = Task {
        id: "1".into(),
        task_date: "2024-01-02".into(),
        start_time: "09:00".into(),
        event: "E1".into(),
        activity_name: "A1".into(),
        task_text: None,
        owner: Some("Bob".into()),
        done: false,
    };
    let (_rt, app, _mock) = make_tasks_app(vec![row]);
    assert_eq!(table(&app).rows().len(), 1);
    assert_eq!(table(&app).load_state(), LoadState::Ready);

    let text = render_text(&app);
    let line = text.lines().find(|l| l.contains("2024-01-02")).unwrap();
    assert!(line.contains("Bob"));
    assert!(line.contains("A1"));
    assert!(!text.contains("null"));
}

#[test]
fn empty_view_renders_placeholder() {
    let (_rt, app, _mock) = make_tasks_app(Vec::new());
    assert!(table(&app).rows().is_empty());
    let text = render_text(&app);
    assert_eq!(text.matches("No upcoming tasks").count(), 1);
    assert!(NO_UPCOMING.starts_with("No upcoming tasks"));
}

#[test]
fn first_load_failure_shows_error() {
    let mock = MockBackend::new().with_rows(three_tasks());
    mock.fail_query(Some("network error"));
    let (_rt, mut app, _mock) = make_app(mock);
    app.open_tasks(Some(LINK.into()));
    app.wait_idle();

    let table = table(&app);
    assert_eq!(table.load_state(), LoadState::Errored);
    assert!(!table.is_loading());
    assert!(table.rows().is_empty());
    assert!(table.error().unwrap().contains("network error"));
    assert!(render_text(&app).contains("Error: network error"));
}

#[test]
fn failed_refresh_keeps_previous_rows() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    mock.fail_query(Some("network error"));
    app.handle_key(char_key('r'));
    assert!(table(&app).is_loading());
    app.wait_idle();
    assert_eq!(ids(&app), ["1", "2", "3"]);
    assert_eq!(table(&app).error(), Some("network error"));
    assert!(!table(&app).is_loading());
}

#[test]
fn refresh_replaces_rows() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    mock.set_rows(vec![task("9", "2024-05-05", "12:00")]);
    app.handle_key(char_key('r'));
    app.wait_idle();
    assert_eq!(ids(&app), ["9"]);
    assert_eq!(queries(&mock), 2);
}

#[test]
fn session_failure_skips_load() {
    let mock = MockBackend::new().with_rows(three_tasks());
    mock.fail_session(Some("Email link is invalid or has expired"));
    let (_rt, mut app, mock) = make_app(mock);
    app.open_tasks(Some(LINK.into()));
    app.wait_idle();

    assert_eq!(queries(&mock), 0);
    assert_eq!(table(&app).load_state(), LoadState::Idle);
    assert_eq!(
        table(&app).error(),
        Some("Email link is invalid or has expired")
    );
    assert!(app.session().is_none());

    // A manual refresh still tries.
    app.handle_key(char_key('r'));
    app.wait_idle();
    assert_eq!(queries(&mock), 1);
    assert_eq!(ids(&app), ["1", "2", "3"]);
}

#[test]
fn title_shows_signed_in_email() {
    let session = Session {
        access_token: "tok".into(),
        refresh_token: None,
        token_type: "bearer".into(),
        expires_at: None,
        email: Some("user@x.com".into()),
    };
    let (_rt, mut app, _mock) = make_app(MockBackend::new().with_session(session));
    app.open_tasks(None);
    app.wait_idle();
    assert!(render_text(&app).contains("user@x.com"));
}

// ---- Task list: mark done ----

#[test]
fn mark_done_removes_row_without_requery() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    app.handle_key(char_key('j'));
    app.handle_key(char_key('d'));
    app.wait_idle();

    assert_eq!(ids(&app), ["1", "3"]);
    assert_eq!(queries(&mock), 1);
    assert!(mock.calls().contains(&MockCall::UpdateRow {
        table: "tasks".into(),
        id: "2".into(),
        update: TaskUpdate::mark_done(),
    }));
}

#[test]
fn enter_also_marks_done() {
    let (_rt, mut app, _mock) = make_tasks_app(three_tasks());
    app.handle_key(key(KeyCode::Enter));
    app.wait_idle();
    assert_eq!(ids(&app), ["2", "3"]);
}

#[test]
fn mark_done_failure_keeps_row() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    mock.fail_update(Some("permission denied for table tasks"));
    app.handle_key(char_key('d'));
    app.wait_idle();

    assert_eq!(ids(&app), ["1", "2", "3"]);
    assert_eq!(
        table(&app).error(),
        Some("permission denied for table tasks")
    );
    assert_eq!(table(&app).load_state(), LoadState::Ready);

    // Retrying the same action works once the backend recovers.
    mock.fail_update(None);
    app.handle_key(char_key('d'));
    app.wait_idle();
    assert_eq!(ids(&app), ["2", "3"]);
    assert_eq!(table(&app).error(), None);
}

#[test]
fn done_row_stays_gone_after_refresh() {
    let (_rt, mut app, _mock) = make_tasks_app(three_tasks());
    app.handle_key(char_key('d'));
    app.wait_idle();
    app.handle_key(char_key('r'));
    app.wait_idle();
    assert_eq!(ids(&app), ["2", "3"]);
}

#[test]
fn last_row_done_shows_placeholder() {
    let (_rt, mut app, _mock) = make_tasks_app(vec![task("1", "2024-01-02", "09:00")]);
    app.handle_key(char_key('d'));
    app.wait_idle();
    assert!(table(&app).rows().is_empty());
    assert!(render_text(&app).contains("No upcoming tasks"));
}

// ---- Logout ----

#[test]
fn logout_returns_to_login() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    app.handle_key(char_key('L'));
    app.wait_idle();
    assert!(matches!(app.screen(), Screen::Login(_)));
    assert!(app.session().is_none());
    assert_eq!(mock.count(|c| *c == MockCall::SignOut), 1);
}

#[test]
fn logout_navigates_even_when_sign_out_fails() {
    let (_rt, mut app, mock) = make_tasks_app(three_tasks());
    mock.fail_sign_out(Some("network error"));
    app.handle_key(char_key('L'));
    app.wait_idle();
    assert!(matches!(app.screen(), Screen::Login(_)));
    assert_eq!(form(&app).status(), None);
}

#[test]
fn outcomes_for_closed_screen_are_dropped() {
    let (_rt, mut app, _mock) = make_tasks_app(three_tasks());
    app.handle_key(char_key('r'));
    app.handle_key(char_key('L'));
    app.wait_idle();
    assert!(matches!(app.screen(), Screen::Login(_)));
    assert!(!app.needs_polling());
}

// ---- Render smoke tests ----

#[test]
fn render_login() {
    let (_rt, mut app, _mock) = make_app(MockBackend::new());
    type_text(&mut app, "user@x.com");
    let text = render_text(&app);
    assert!(text.contains("user@x.com"));
    assert!(text.contains("Send sign-in link"));
}

#[test]
fn render_login_while_sending() {
    let (_rt, mut app, _mock) = make_app(MockBackend::new());
    type_text(&mut app, "user@x.com");
    app.handle_key(key(KeyCode::Enter));
    assert!(render_text(&app).contains("Sending"));
    app.wait_idle();
    assert!(render_text(&app).contains(CHECK_EMAIL));
}

#[test]
fn render_loading() {
    let (_rt, mut app, _mock) = make_tasks_app(three_tasks());
    app.handle_key(char_key('r'));
    let text = render_text(&app);
    assert!(text.contains("Loading"));
    assert!(!text.contains("Event 1"));
    app.wait_idle();
    assert!(render_text(&app).contains("Event 1"));
}
