//! Kanban board over the task statuses.
//!
//! One column per status, Overdue included. Moving a card is the same
//! advance/regress the CLI performs: the session validates the move, calls
//! the backend and records the activity, the board only redraws from the
//! session's cache afterwards.

use std::io;
use std::time::Duration;

use chrono::{Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::runtime::Runtime;
use tracing::debug;

use gestora::fields::{Language, Status};
use gestora::session::Session;
use gestora::task::{Task, TaskFilter};

use crate::cmd::format_relative;
use crate::tui::colors::{severity_color, status_color, text_on};
use crate::tui::enums::{InputMode, Move, Overlay};
use crate::tui::input::InputField;
use crate::tui::utils::{centered_rect, wrap_words};

const COLUMNS: usize = Status::ALL.len();
const CARD_HEIGHT: usize = 5;

/// Main board state. Borrows the signed-in session for its lifetime.
pub struct BoardApp<'a> {
    session: &'a mut Session,
    runtime: &'a Runtime,
    columns: [Vec<String>; COLUMNS],
    selected_column: usize,
    selected_card: usize,
    column_scroll_offsets: [usize; COLUMNS],
    overlay: Overlay,
    input_mode: InputMode,
    filter: InputField,
    comment: InputField,
    status_message: String,
}

impl<'a> BoardApp<'a> {
    pub fn new(session: &'a mut Session, runtime: &'a Runtime) -> Self {
        let mut app = BoardApp {
            session,
            runtime,
            columns: Default::default(),
            selected_column: 0,
            selected_card: 0,
            column_scroll_offsets: [0; COLUMNS],
            overlay: Overlay::None,
            input_mode: InputMode::None,
            filter: InputField::new(),
            comment: InputField::new(),
            status_message: String::new(),
        };
        app.update_columns();
        app
    }

    fn lang(&self) -> Language {
        self.session.language()
    }

    /// Rebuild the columns from the session cache and the filter text.
    fn update_columns(&mut self) {
        let search = Some(self.filter.value.trim().to_string()).filter(|s| !s.is_empty());
        let filter = TaskFilter { search, status: None };
        let mut columns: [Vec<&Task>; COLUMNS] = Default::default();
        for task in self.session.visible_tasks(&filter) {
            if let Some(i) = Status::ALL.iter().position(|s| *s == task.status) {
                columns[i].push(task);
            }
        }
        for (i, mut tasks) in columns.into_iter().enumerate() {
            tasks.sort_by_key(|t| t.delivery_at());
            self.columns[i] = tasks.into_iter().map(|t| t.id.clone()).collect();
        }
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let column_len = self.columns[self.selected_column].len();
        if column_len == 0 {
            self.selected_card = 0;
            self.column_scroll_offsets[self.selected_column] = 0;
        } else if self.selected_card >= column_len {
            self.selected_card = column_len - 1;
        }
    }

    fn selected_id(&self) -> Option<String> {
        self.columns[self.selected_column].get(self.selected_card).cloned()
    }

    fn selected_task(&self) -> Option<&Task> {
        let id = self.columns[self.selected_column].get(self.selected_card)?;
        self.session.state().task(id)
    }

    /// Follow a task to whichever column it now sits in.
    fn select_task(&mut self, id: &str) {
        for (column, ids) in self.columns.iter().enumerate() {
            if let Some(card) = ids.iter().position(|t| t == id) {
                self.selected_column = column;
                self.selected_card = card;
                return;
            }
        }
        self.clamp_selection();
    }

    fn move_card(&mut self, direction: Move) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let lang = self.lang();
        let result = match direction {
            Move::Advance => self.runtime.block_on(self.session.advance(&id)),
            Move::Regress => self.runtime.block_on(self.session.regress(&id)),
        };
        match result {
            Ok(task) => {
                self.status_message = format!("{} → {}", task.title, task.status.label(lang));
                self.update_columns();
                self.select_task(&id);
            }
            Err(e) => {
                debug!(task = %id, error = %e, "board move refused");
                self.status_message = e.user_message(lang);
                self.update_columns();
            }
        }
    }

    fn submit_comment(&mut self) {
        let text = self.comment.take();
        self.input_mode = InputMode::None;
        let Some(id) = self.selected_id() else {
            return;
        };
        let lang = self.lang();
        self.status_message = match self.runtime.block_on(self.session.add_comment(&id, &text)) {
            Ok(_) => gestora::messages::comment_added(lang).to_string(),
            Err(e) => e.user_message(lang),
        };
    }

    fn refresh(&mut self) {
        let lang = self.lang();
        self.status_message = match self.runtime.block_on(self.session.refresh()) {
            Ok(()) => {
                let total = self.session.visible_tasks(&TaskFilter::default()).len();
                format!("Refreshed: {total} tasks")
            }
            Err(e) => e.user_message(lang),
        };
        self.update_columns();
    }

    fn mark_read(&mut self) {
        let marked = self.session.mark_all_read();
        self.status_message = format!("Marked {marked} notifications read");
    }

    /// "Ctrl+→ Done | Ctrl+← unavailable" for the selected card.
    fn moves_hint(&self) -> String {
        let lang = self.lang();
        let Some(task) = self.selected_task() else {
            return "No task selected".into();
        };
        let moves = self.session.moves(task);
        let show = |s: Option<Status>| s.map_or("unavailable", |s| s.label(lang));
        format!("Ctrl+→ {} | Ctrl+← {}", show(moves.advance), show(moves.regress))
    }

    fn column_title(&self, index: usize) -> String {
        format!("{} ({})", Status::ALL[index].label(self.lang()), self.columns[index].len())
    }

    /// Handle keyboard input. Returns true when the board should close.
    fn handle_input(&mut self) -> io::Result<bool> {
        if !event::poll(Duration::from_millis(100))? {
            return Ok(false);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(false);
        };

        match self.input_mode {
            InputMode::Filter => {
                match key.code {
                    KeyCode::Esc => {
                        self.filter.clear();
                        self.input_mode = InputMode::None;
                    }
                    KeyCode::Enter => self.input_mode = InputMode::None,
                    KeyCode::Backspace => self.filter.handle_backspace(),
                    KeyCode::Delete => self.filter.handle_delete(),
                    KeyCode::Left => self.filter.move_cursor_left(),
                    KeyCode::Right => self.filter.move_cursor_right(),
                    KeyCode::Char(c) => self.filter.handle_char(c),
                    _ => {}
                }
                self.update_columns();
                return Ok(false);
            }
            InputMode::Comment => {
                match key.code {
                    KeyCode::Esc => {
                        self.comment.clear();
                        self.input_mode = InputMode::None;
                    }
                    KeyCode::Enter => self.submit_comment(),
                    KeyCode::Backspace => self.comment.handle_backspace(),
                    KeyCode::Delete => self.comment.handle_delete(),
                    KeyCode::Left => self.comment.move_cursor_left(),
                    KeyCode::Right => self.comment.move_cursor_right(),
                    KeyCode::Char(c) => self.comment.handle_char(c),
                    _ => {}
                }
                return Ok(false);
            }
            InputMode::None => {}
        }

        if self.overlay != Overlay::None {
            match key.code {
                KeyCode::Char('m') if self.overlay == Overlay::Notifications => self.mark_read(),
                KeyCode::Char('c') if self.overlay == Overlay::Detail => self.input_mode = InputMode::Comment,
                _ => self.overlay = Overlay::None,
            }
            return Ok(false);
        }

        self.status_message.clear();
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') if ctrl => return Ok(true),
            KeyCode::Esc => return Ok(true),

            KeyCode::Right if ctrl => self.move_card(Move::Advance),
            KeyCode::Left if ctrl => self.move_card(Move::Regress),

            KeyCode::Left => {
                self.selected_column = self.selected_column.checked_sub(1).unwrap_or(COLUMNS - 1);
                self.clamp_selection();
            }
            KeyCode::Right => {
                self.selected_column = (self.selected_column + 1) % COLUMNS;
                self.clamp_selection();
            }
            KeyCode::Up => self.selected_card = self.selected_card.saturating_sub(1),
            KeyCode::Down => {
                let column_len = self.columns[self.selected_column].len();
                if self.selected_card + 1 < column_len {
                    self.selected_card += 1;
                }
            }

            KeyCode::Enter if self.selected_id().is_some() => self.overlay = Overlay::Detail,
            KeyCode::Char('c') if self.selected_id().is_some() => self.input_mode = InputMode::Comment,
            KeyCode::Char('n') => self.overlay = Overlay::Notifications,
            KeyCode::Char('a') => self.overlay = Overlay::Activity,
            KeyCode::Char('m') => self.mark_read(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('/') => self.input_mode = InputMode::Filter,
            KeyCode::Char('h') | KeyCode::Char('?') => self.overlay = Overlay::Help,
            _ => {}
        }
        Ok(false)
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Board
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        self.render_header(f, chunks[0]);
        self.render_board(f, chunks[1]);
        self.render_status_bar(f, chunks[2]);

        match self.overlay {
            Overlay::None => {}
            Overlay::Detail => self.render_task_detail_popup(f),
            Overlay::Notifications => self.render_notifications_popup(f),
            Overlay::Activity => self.render_activity_popup(f),
            Overlay::Help => self.render_help_popup(f),
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let who = self
            .session
            .user()
            .map_or_else(String::new, |u| format!("{} ({})", u.name, u.role.as_str()));
        let unread = self.session.unread_count();
        let unread_style = if unread > 0 {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let header_text = vec![Line::from(vec![
            Span::styled("GESTORA", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(who, Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC)),
            Span::raw("  "),
            Span::styled(format!("{unread} unread"), unread_style),
        ])];

        let header_block = Paragraph::new(header_text)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        f.render_widget(header_block, area);
    }

    fn render_board(&mut self, f: &mut Frame, area: Rect) {
        let constraints: Vec<Constraint> = (0..COLUMNS)
            .map(|_| Constraint::Ratio(1, COLUMNS as u32))
            .collect();
        let columns_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        for (i, &column_area) in columns_layout.iter().enumerate() {
            self.render_column(f, column_area, i);
        }
    }

    fn render_column(&mut self, f: &mut Frame, area: Rect, column_index: usize) {
        let is_selected = column_index == self.selected_column;
        let accent = status_color(Status::ALL[column_index]);
        let border_style = if is_selected {
            Style::default().fg(accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.column_title(column_index))
            .border_style(border_style);
        let inner = block.inner(area);
        f.render_widget(block, area);

        if self.columns[column_index].is_empty() {
            return;
        }

        let available_height = inner.height as usize;
        let visible_cards = available_height / CARD_HEIGHT;

        // Keep the selected card in view.
        if is_selected {
            let start = self.column_scroll_offsets[column_index];
            if self.selected_card < start {
                self.column_scroll_offsets[column_index] = self.selected_card;
            } else if visible_cards > 0 && self.selected_card >= start + visible_cards {
                self.column_scroll_offsets[column_index] = self.selected_card + 1 - visible_cards;
            }
        }
        let scroll_offset = self.column_scroll_offsets[column_index];

        let cards = &self.columns[column_index];
        let mut current_y = 0;
        let mut rendered_cards = 0;
        for (card_index, id) in cards.iter().enumerate().skip(scroll_offset) {
            let Some(task) = self.session.state().task(id) else {
                continue;
            };
            if current_y + CARD_HEIGHT > available_height {
                break;
            }
            let card_area = Rect {
                x: inner.x,
                y: inner.y + current_y as u16,
                width: inner.width,
                height: CARD_HEIGHT as u16,
            };
            self.render_card(f, card_area, task, is_selected && card_index == self.selected_card);
            current_y += CARD_HEIGHT;
            rendered_cards += 1;
        }

        if scroll_offset > 0 {
            let indicator = Paragraph::new(format!("▲ +{scroll_offset} above")).style(Style::default().fg(Color::Cyan));
            f.render_widget(indicator, Rect { height: 1, ..inner });
        }
        let remaining = cards.len().saturating_sub(scroll_offset + rendered_cards);
        if remaining > 0 {
            let indicator = Paragraph::new(format!("▼ +{remaining} below")).style(Style::default().fg(Color::Cyan));
            f.render_widget(
                indicator,
                Rect {
                    y: inner.y + inner.height.saturating_sub(1),
                    height: 1,
                    ..inner
                },
            );
        }
    }

    fn render_card(&self, f: &mut Frame, area: Rect, task: &Task, is_selected: bool) {
        let accent = status_color(task.status);
        let style = if is_selected {
            Style::default().bg(accent).fg(text_on(accent)).add_modifier(Modifier::BOLD)
        } else {
            Style::default().bg(Color::DarkGray)
        };

        let mut card_text = vec![Line::from(format!("#{}", task.id))];
        let width = area.width.saturating_sub(2) as usize;
        card_text.extend(wrap_words(&task.title, width, 2).into_iter().map(Line::from));

        let now = Utc::now();
        let mut due = format_relative(task.delivery_at(), now);
        if task.is_overdue(now) && task.status != Status::Overdue {
            due.push('!');
        }
        card_text.push(Line::from(format!(
            "{} | {}",
            self.session.state().user_name(&task.responsible_id),
            due
        )));

        let card_block = Paragraph::new(card_text)
            .block(Block::default().borders(Borders::ALL))
            .style(style)
            .wrap(Wrap { trim: true });
        f.render_widget(card_block, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let status_text = match self.input_mode {
            InputMode::Filter => format!("Filter: {} | Enter to apply, Esc to clear", self.filter.value),
            InputMode::Comment => format!("Comment: {} | Enter to send, Esc to cancel", self.comment.value),
            InputMode::None if !self.status_message.is_empty() => self.status_message.clone(),
            InputMode::None => {
                let filter_indicator = if self.filter.value.is_empty() {
                    String::new()
                } else {
                    format!(" [Filter: {}]", self.filter.value)
                };
                format!("{}{} | Enter: Details | c: Comment | n: Notifications | h: Help", self.moves_hint(), filter_indicator)
            }
        };

        let accent = status_color(Status::ALL[self.selected_column]);
        let status = Paragraph::new(status_text)
            .style(Style::default().bg(accent).fg(text_on(accent)))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn popup_block(title: &str, accent: Color) -> Block<'_> {
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(accent).add_modifier(Modifier::BOLD))
    }

    fn render_task_detail_popup(&self, f: &mut Frame) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let lang = self.lang();
        let state = self.session.state();
        let local = |t: chrono::DateTime<Utc>| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();
        let participants: Vec<&str> = task.participants.iter().map(|p| state.user_name(p)).collect();

        let mut detail_lines = vec![
            Line::from(Span::styled(
                format!("Task #{}: {}", task.id, task.title),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Status:       {}", task.status.label(lang))),
            Line::from(format!("Responsible:  {}", state.user_name(&task.responsible_id))),
            Line::from(format!(
                "Participants: {}",
                if participants.is_empty() { "-".to_string() } else { participants.join(", ") }
            )),
            Line::from(format!("Start:        {}", local(task.start))),
            Line::from(format!("Delivery:     {}", local(task.delivery_at()))),
            Line::from(format!("Moves:        {}", self.moves_hint())),
            Line::from(""),
            Line::from("Description:"),
            Line::from(if task.description.is_empty() { "-" } else { task.description.as_str() }),
        ];
        if !task.comments.is_empty() {
            detail_lines.push(Line::from(""));
            detail_lines.push(Line::from("Comments:"));
            for c in &task.comments {
                detail_lines.push(Line::from(format!("{} {}: {}", local(c.created_at), c.author, c.text)));
            }
        }

        let area = centered_rect(80, 80, f.area());
        f.render_widget(Clear, area);
        let popup = Paragraph::new(detail_lines)
            .block(Self::popup_block("Task Details (c: comment, any key closes)", status_color(task.status)))
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, area);
    }

    fn render_notifications_popup(&self, f: &mut Frame) {
        let now = Utc::now();
        let notes = self.session.my_notifications();
        let lines: Vec<Line> = if notes.is_empty() {
            vec![Line::from("No notifications.")]
        } else {
            notes
                .iter()
                .map(|n| {
                    let mut style = Style::default().fg(severity_color(n.severity));
                    if !n.read {
                        style = style.add_modifier(Modifier::BOLD);
                    }
                    Line::from(vec![
                        Span::raw(format!("{:<9} ", format_relative(n.created_at, now))),
                        Span::styled(n.message.clone(), style),
                    ])
                })
                .collect()
        };

        let area = centered_rect(70, 60, f.area());
        f.render_widget(Clear, area);
        let popup = Paragraph::new(lines)
            .block(Self::popup_block("Notifications (m: mark read)", Color::Yellow))
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, area);
    }

    fn render_activity_popup(&self, f: &mut Frame) {
        let lang = self.lang();
        let now = Utc::now();
        let entries = self.session.visible_activity();
        let lines: Vec<Line> = if entries.is_empty() {
            vec![Line::from("No activity yet.")]
        } else {
            entries
                .iter()
                .map(|a| Line::from(format!("{:<9} {}: {}", format_relative(a.created_at, now), a.user_name, a.summary(lang))))
                .collect()
        };

        let area = centered_rect(80, 70, f.area());
        f.render_widget(Clear, area);
        let popup = Paragraph::new(lines)
            .block(Self::popup_block("Activity", Color::Cyan))
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, area);
    }

    fn render_help_popup(&self, f: &mut Frame) {
        let lines = vec![
            Line::from("←/→ ↑/↓     select column / card"),
            Line::from("Ctrl+→      advance the selected task"),
            Line::from("Ctrl+←      move it back"),
            Line::from("Enter       details"),
            Line::from("c           comment"),
            Line::from("n / m       notifications / mark read"),
            Line::from("a           activity"),
            Line::from("r           refresh from the server"),
            Line::from("/           filter by title"),
            Line::from("Esc         quit"),
        ];
        let area = centered_rect(50, 50, f.area());
        f.render_widget(Clear, area);
        let popup = Paragraph::new(lines)
            .block(Self::popup_block("Keys", Color::White))
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, area);
    }

    /// Main event loop
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;
            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gestora::backend::MemoryBackend;
    use gestora::clock::SystemClock;

    use super::*;

    fn signed_in(runtime: &Runtime, email: &str) -> Session {
        let clock = Arc::new(SystemClock);
        let backend = MemoryBackend::demo(clock.clone());
        let mut session = Session::new(Arc::new(backend), clock);
        runtime
            .block_on(session.login(email, gestora::backend::memory::DEMO_PASSWORD))
            .unwrap();
        session
    }

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn columns_follow_status() {
        let rt = runtime();
        let mut session = signed_in(&rt, "admin@gestora.test");
        let app = BoardApp::new(&mut session, &rt);
        let counts: Vec<usize> = app.columns.iter().map(Vec::len).collect();
        assert_eq!(counts, vec![1, 2, 1, 1, 1]);
    }

    #[test]
    fn employee_board_holds_only_their_tasks() {
        let rt = runtime();
        let mut session = signed_in(&rt, "bruno@gestora.test");
        let app = BoardApp::new(&mut session, &rt);
        let ids: Vec<&String> = app.columns.iter().flatten().collect();
        assert!(!ids.iter().any(|id| id.as_str() == "t4" || id.as_str() == "t6"));
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn advancing_follows_the_card() {
        let rt = runtime();
        let mut session = signed_in(&rt, "bruno@gestora.test");
        let mut app = BoardApp::new(&mut session, &rt);
        app.select_task("t1");
        app.move_card(Move::Advance);
        assert_eq!(Status::ALL[app.selected_column], Status::InProgress);
        assert_eq!(app.selected_id().as_deref(), Some("t1"));
    }

    #[test]
    fn refused_move_explains_itself() {
        let rt = runtime();
        let mut session = signed_in(&rt, "bruno@gestora.test");
        let mut app = BoardApp::new(&mut session, &rt);
        app.select_task("t1");
        app.move_card(Move::Regress);
        assert!(!app.status_message.is_empty());
        assert_eq!(Status::ALL[app.selected_column], Status::Pending);
    }

    #[test]
    fn filter_narrows_columns() {
        let rt = runtime();
        let mut session = signed_in(&rt, "admin@gestora.test");
        let mut app = BoardApp::new(&mut session, &rt);
        "insurance".chars().for_each(|c| app.filter.handle_char(c));
        app.update_columns();
        let ids: Vec<&String> = app.columns.iter().flatten().collect();
        assert_eq!(ids, vec!["t5"]);
    }
}
