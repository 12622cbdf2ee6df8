use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use upcoming_core::task::{Task, TABLE_HEADINGS};
use upcoming_core::task_list::{LocalPatch, TaskList};
use upcoming_service::ServiceError;

pub const NO_UPCOMING: &str = "No upcoming tasks 🎉";
pub const LOADING: &str = "Loading…";

/// Load lifecycle of the task list. Marking a task done does not move
/// between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Errored,
}

pub struct TaskTable {
    list: TaskList,
    load_state: LoadState,
    error: Option<String>,
    table_state: TableState,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            list: TaskList::default(),
            load_state: LoadState::Idle,
            error: None,
            table_state: TableState::default(),
        }
    }

    pub fn rows(&self) -> &[Task] {
        self.list.rows()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.list.get(self.table_state.selected()?)
    }

    /// Show an error that did not come from a load or an update.
    pub fn set_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    pub fn begin_load(&mut self) {
        self.load_state = LoadState::Loading;
        self.error = None;
    }

    /// A failed load keeps whatever rows were shown before.
    pub fn finish_load(&mut self, result: Result<Vec<Task>, ServiceError>) {
        match result {
            Ok(rows) => {
                let selected_id = self.selected_task().map(|t| t.id.clone());
                self.list.replace(rows);
                self.load_state = LoadState::Ready;
                let index = selected_id
                    .and_then(|id| self.list.position(&id))
                    .unwrap_or(0);
                self.select_index(index);
            }
            Err(e) => {
                self.error = Some(e.message().to_string());
                self.load_state = LoadState::Errored;
            }
        }
    }

    /// Start marking the selected task done. Returns its id, or `None`
    /// when nothing is selected or the list is being reloaded.
    pub fn begin_mark_done(&mut self) -> Option<String> {
        if self.is_loading() {
            return None;
        }
        let id = self.selected_task()?.id.clone();
        self.error = None;
        Some(id)
    }

    /// Only a confirmed update touches the local rows.
    pub fn finish_mark_done(&mut self, id: &str, result: Result<(), ServiceError>) {
        match result {
            Ok(()) => {
                let index = self.table_state.selected().unwrap_or(0);
                self.list.apply(&LocalPatch::MarkedDone { id: id.to_string() });
                self.select_index(index);
            }
            Err(e) => self.error = Some(e.message().to_string()),
        }
    }

    fn select_index(&mut self, index: usize) {
        if self.list.is_empty() {
            self.table_state.select(None);
        } else {
            self.table_state
                .select(Some(index.min(self.list.len() - 1)));
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.list.is_empty() {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.select_index(current + 1),
            KeyCode::Char('k') | KeyCode::Up => self.select_index(current.saturating_sub(1)),
            KeyCode::Char('g') | KeyCode::Home => self.select_index(0),
            KeyCode::Char('G') | KeyCode::End => self.select_index(self.list.len() - 1),
            _ => {}
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let mut constraints = Vec::new();
        if self.error.is_some() {
            constraints.push(Constraint::Length(1));
        }
        if self.is_loading() {
            constraints.push(Constraint::Length(1));
        }
        constraints.push(Constraint::Min(0));
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut next = 0;
        if let Some(ref error) = self.error {
            let line = Line::from(Span::styled(
                format!(" Error: {error}"),
                Style::default().fg(Color::Red),
            ));
            frame.render_widget(line, chunks[next]);
            next += 1;
        }
        if self.is_loading() {
            frame.render_widget(Line::from(format!(" {LOADING}")), chunks[next]);
            return;
        }
        // Nothing has been fetched yet, so there is nothing to tabulate.
        if self.load_state == LoadState::Idle {
            return;
        }
        self.render_table(frame, chunks[next]);
    }

    fn render_table(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!(" Upcoming ({}) ", self.list.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(area);

        let header = Row::new(
            TABLE_HEADINGS
                .iter()
                .map(|h| Cell::from(*h).style(Style::default().bold())),
        );

        let rows: Vec<Row> = self
            .list
            .rows()
            .iter()
            .map(|task| {
                let mut cells: Vec<Cell> = task.cells().into_iter().map(Cell::from).collect();
                cells.push(Cell::from("[Done]").style(Style::default().fg(Color::Green)));
                Row::new(cells)
            })
            .collect();

        let widths = [
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Fill(1),
            Constraint::Fill(1),
            Constraint::Fill(2),
            Constraint::Fill(1),
            Constraint::Length(6),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan).bold())
            .highlight_symbol("> ");

        let mut state = self.table_state.clone();
        frame.render_stateful_widget(table, area, &mut state);

        // The placeholder spans every column, which table cells cannot do.
        if self.list.is_empty() && inner.height > 1 {
            let placeholder_area = Rect {
                y: inner.y + 1,
                height: 1,
                ..inner
            };
            frame.render_widget(Paragraph::new(NO_UPCOMING), placeholder_area);
        }
    }
}
