use crate::commands::{today, Workspace};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dealboard::collision::{Droppable, Point, Rect as DropRect};
use dealboard::commit::CommitState;
use dealboard::drag::DragState;
use dealboard::format::{format_amount, format_date};
use dealboard::model::{Deal, DealId};
use dealboard::pipeline::Viewer;
use dealboard::services::{DealUpdateService, ServiceError, UpdateOutcome};
use dealboard::session::{BoardSession, DragEnd, DragFrame};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CARD_HEIGHT: u16 = 5;
const POINTER_STEP: f64 = 2.0;

pub fn run(workspace: Workspace, viewer: Viewer) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(workspace, viewer);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

/// Result of a close-date update run off the event loop.
struct UpdateDone {
    deal_id: DealId,
    result: Result<UpdateOutcome, ServiceError>,
}

struct App {
    workspace: Workspace,
    viewer: Viewer,
    session: BoardSession,
    updates: Arc<dyn DealUpdateService>,
    done_tx: Sender<UpdateDone>,
    done_rx: Receiver<UpdateDone>,
    selected_column: usize,
    selected_card: usize,
    scroll_offsets: Vec<usize>,
    pointer: Option<Point>,
    columns: Vec<Rect>,
    droppables: Vec<Droppable>,
    last_load: Instant,
    status: String,
    quit_armed: bool,
    mode: Mode,
}

enum Mode {
    Normal,
    Dragging,
    ConfirmDate { day: u32 },
    PickOwner { idx: usize },
}

impl App {
    fn new(workspace: Workspace, viewer: Viewer) -> Self {
        let board = workspace.board_for(viewer.owner(), today());
        let status = format!(
            "Loaded {} deals for {} from {}",
            board.deal_count(),
            viewer.owner().name,
            workspace.crm.path().display()
        );
        let updates = workspace.updates();
        let (done_tx, done_rx) = mpsc::channel();
        let column_count = board.buckets().len();
        App {
            workspace,
            viewer,
            session: BoardSession::new(board),
            updates,
            done_tx,
            done_rx,
            selected_column: 0,
            selected_card: 0,
            scroll_offsets: vec![0; column_count],
            pointer: None,
            columns: Vec::new(),
            droppables: Vec::new(),
            last_load: Instant::now(),
            status,
            quit_armed: false,
            mode: Mode::Normal,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.drain_updates();
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn drain_updates(&mut self) {
        while let Ok(done) = self.done_rx.try_recv() {
            let title = self.deal_title(&done.deal_id);
            match self.session.complete_update(&done.deal_id, done.result) {
                Ok(CommitState::Committed {
                    bucket, close_date, ..
                }) => {
                    self.status = format!(
                        "Moved \"{}\" to {} (closes {})",
                        title,
                        bucket,
                        format_date(close_date)
                    );
                }
                Ok(CommitState::RolledBack { bucket, reason, .. }) => {
                    self.status = format!("\"{}\" stays in {}: {}", title, bucket, reason);
                }
                Ok(_) => {}
                Err(err) => {
                    self.status = format!("Update result ignored: {}", err);
                }
            }
            if !matches!(self.mode, Mode::Dragging) {
                self.clamp_selection();
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Dragging => {
                self.handle_drag_key(key);
                Ok(false)
            }
            Mode::ConfirmDate { day } => {
                self.handle_date_key(key, day);
                Ok(false)
            }
            Mode::PickOwner { idx } => {
                self.handle_owner_key(key, idx);
                Ok(false)
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.code != KeyCode::Char('q') {
            self.quit_armed = false;
        }
        match key.code {
            KeyCode::Char('q') => {
                let pending = self.session.commits().in_flight_count();
                if pending == 0 || self.quit_armed {
                    return Ok(true);
                }
                self.quit_armed = true;
                self.status = format!("{} update(s) still in flight; press q again to quit", pending);
            }
            KeyCode::Left | KeyCode::Char('h') => self.prev_column(),
            KeyCode::Right | KeyCode::Char('l') => self.next_column(),
            KeyCode::Up | KeyCode::Char('k') => self.prev_card(),
            KeyCode::Down | KeyCode::Char('j') => self.next_card(),
            KeyCode::Char(' ') => self.pick_up(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('o') => {
                if !self.viewer.is_admin() {
                    self.status = "Only administrators can switch pipelines".into();
                } else if self.viewer.users().is_empty() {
                    self.status = "No active users loaded".into();
                } else {
                    let idx = self
                        .viewer
                        .users()
                        .iter()
                        .position(|u| u.id == self.viewer.owner().id)
                        .unwrap_or(0);
                    self.mode = Mode::PickOwner { idx };
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_drag_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => self.drop_here(),
            KeyCode::Esc => {
                let outcome = self.session.end_on(None);
                self.finish_drag(outcome);
            }
            KeyCode::Left | KeyCode::Char('h') => self.move_pointer_column(-1),
            KeyCode::Right | KeyCode::Char('l') => self.move_pointer_column(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_pointer(0.0, -POINTER_STEP),
            KeyCode::Down | KeyCode::Char('j') => self.move_pointer(0.0, POINTER_STEP),
            _ => {}
        }
    }

    fn handle_date_key(&mut self, key: KeyEvent, day: u32) {
        let max = self
            .session
            .commits()
            .pending()
            .map(|p| p.day_count())
            .unwrap_or(31);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('+') => {
                self.mode = Mode::ConfirmDate {
                    day: if day >= max { 1 } else { day + 1 },
                };
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('-') => {
                self.mode = Mode::ConfirmDate {
                    day: if day <= 1 { max } else { day - 1 },
                };
            }
            KeyCode::Enter => match self.session.confirm_date(day) {
                Ok(request) => {
                    let tx = self.done_tx.clone();
                    let updates = self.updates.clone();
                    let title = self.deal_title(&request.deal_id);
                    self.status = format!(
                        "Updating \"{}\" to close {}...",
                        title,
                        format_date(request.close_date)
                    );
                    thread::spawn(move || {
                        let result = updates.update_close_date(&request.external_id, request.close_date);
                        // The receiver only goes away when the UI has exited.
                        let _ = tx.send(UpdateDone {
                            deal_id: request.deal_id,
                            result,
                        });
                    });
                    self.mode = Mode::Normal;
                    self.clamp_selection();
                }
                Err(err) => self.status = format!("Cannot confirm: {}", err),
            },
            KeyCode::Esc => {
                match self.session.cancel_date() {
                    Ok(_) => self.status = "Move cancelled".into(),
                    Err(err) => self.status = format!("Cancel failed: {}", err),
                }
                self.mode = Mode::Normal;
                self.clamp_selection();
            }
            _ => {}
        }
    }

    fn handle_owner_key(&mut self, key: KeyEvent, idx: usize) {
        let count = self.viewer.users().len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.mode = Mode::PickOwner {
                    idx: idx.saturating_sub(1),
                };
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.mode = Mode::PickOwner {
                    idx: (idx + 1).min(count.saturating_sub(1)),
                };
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                let user_id = match self.viewer.users().get(idx) {
                    Some(user) => user.id.clone(),
                    None => return,
                };
                if let Err(err) = self.viewer.select(&user_id) {
                    self.status = format!("Cannot switch pipeline: {}", err);
                    return;
                }
                self.reload();
            }
            KeyCode::Esc => self.mode = Mode::Normal,
            _ => {}
        }
    }

    fn pick_up(&mut self) {
        let Some(deal_id) = self.current_deal().map(|d| d.id.clone()) else {
            self.status = "No deal selected".into();
            return;
        };
        if !self.session.drag_start(&deal_id) {
            self.status = format!("Cannot drag {}", deal_id);
            return;
        }
        self.pointer = self
            .droppables
            .iter()
            .find(|d| d.target.id() == deal_id)
            .map(|d| cell_center(d.rect.center()))
            .or_else(|| self.columns.get(self.selected_column).map(|c| column_center(*c)));
        self.mode = Mode::Dragging;
        self.status = format!("Dragging \"{}\"", self.deal_title(&deal_id));
    }

    fn frame(&self, delta: Point) -> DragFrame {
        let pointer = self.pointer.unwrap_or_default();
        let width = self
            .columns
            .get(self.selected_column)
            .map(|c| c.width.saturating_sub(2) as f64)
            .unwrap_or(20.0);
        DragFrame {
            pointer: self.pointer,
            active_rect: DropRect::centered(pointer, width, CARD_HEIGHT as f64),
            delta,
            droppables: self.droppables.clone(),
        }
    }

    fn move_pointer(&mut self, dx: f64, dy: f64) {
        let Some(current) = self.pointer else {
            return;
        };
        if self.columns.is_empty() {
            return;
        }
        let (top, bottom) = self
            .columns
            .iter()
            .fold((f64::MAX, 0.0_f64), |(t, b), c| {
                (t.min(c.y as f64), b.max((c.y + c.height) as f64))
            });
        let next = Point::new(current.x + dx, (current.y + dy).clamp(top + 0.5, bottom - 0.5));
        self.pointer = Some(next);
        let frame = self.frame(Point::new(next.x - current.x, next.y - current.y));
        self.session.drag_over(&frame);
        self.follow_drag();
    }

    fn move_pointer_column(&mut self, step: isize) {
        let Some(current) = self.pointer else {
            return;
        };
        let here = self
            .columns
            .iter()
            .position(|c| current.x >= c.x as f64 && current.x < (c.x + c.width) as f64)
            .unwrap_or(self.selected_column);
        let max = self.columns.len().saturating_sub(1) as isize;
        let target = (here as isize + step).clamp(0, max) as usize;
        if let Some(column) = self.columns.get(target) {
            let x = column_center(*column).x;
            self.move_pointer(x - current.x, 0.0);
        }
    }

    fn drop_here(&mut self) {
        let frame = self.frame(Point::default());
        let outcome = self.session.drag_end(Some(&frame));
        self.finish_drag(outcome);
    }

    fn finish_drag(&mut self, outcome: Result<DragEnd, dealboard::commit::CommitError>) {
        self.pointer = None;
        self.mode = Mode::Normal;
        match outcome {
            Ok(DragEnd::Discarded) => self.status = "Drag cancelled".into(),
            Ok(DragEnd::Reordered { bucket }) => self.status = format!("Reordered {}", bucket),
            Ok(DragEnd::Commit(CommitState::Proposed(pending))) => {
                self.status = format!(
                    "Pick a close date in {} (↑/↓ day, Enter confirm, Esc cancel)",
                    pending.target_bucket
                );
                self.mode = Mode::ConfirmDate {
                    day: pending.proposed_day,
                };
            }
            Ok(DragEnd::Commit(CommitState::RolledBack { deal_id, reason, .. })) => {
                self.status = format!("\"{}\" not moved: {}", self.deal_title(&deal_id), reason);
            }
            Ok(DragEnd::Commit(_)) => {}
            Err(err) => self.status = format!("Drop refused: {}", err),
        }
        self.clamp_selection();
    }

    fn reload(&mut self) {
        let board = self.workspace.board_for(self.viewer.owner(), today());
        let count = board.deal_count();
        if self.session.replace_board(board) {
            self.last_load = Instant::now();
            self.scroll_offsets = vec![0; self.session.board().buckets().len()];
            self.selected_card = 0;
            self.status = format!("Loaded {} deals for {}", count, self.viewer.owner().name);
        } else {
            self.status = "Finish pending moves before reloading".into();
        }
    }

    /// Keeps the selection on the dragged card as it moves between buckets.
    fn follow_drag(&mut self) {
        if let DragState::Dragging { deal_id, .. } = self.session.drag_state() {
            let board = self.session.board();
            if let (Some(col), Some(idx)) = (board.find_deal_bucket_index(deal_id), board.position_of(deal_id)) {
                self.selected_column = col;
                self.selected_card = idx;
            }
        }
    }

    fn clamp_selection(&mut self) {
        let len = self
            .session
            .board()
            .buckets()
            .get(self.selected_column)
            .map(|b| b.deal_ids.len())
            .unwrap_or(0);
        self.selected_card = self.selected_card.min(len.saturating_sub(1));
    }

    fn current_deal(&self) -> Option<&Deal> {
        let board = self.session.board();
        let bucket = board.buckets().get(self.selected_column)?;
        let id = bucket.deal_ids.get(self.selected_card)?;
        board.deal(id)
    }

    fn deal_title(&self, deal_id: &str) -> String {
        self.session
            .board()
            .deal(deal_id)
            .map(|d| d.title.clone())
            .unwrap_or_else(|| deal_id.to_string())
    }

    fn prev_column(&mut self) {
        if self.selected_column > 0 {
            self.selected_column -= 1;
            self.selected_card = 0;
        }
    }

    fn next_column(&mut self) {
        if self.selected_column + 1 < self.session.board().buckets().len() {
            self.selected_column += 1;
            self.selected_card = 0;
        }
    }

    fn prev_card(&mut self) {
        if self.selected_card > 0 {
            self.selected_card -= 1;
        }
    }

    fn next_card(&mut self) {
        if let Some(bucket) = self.session.board().buckets().get(self.selected_column) {
            if self.selected_card + 1 < bucket.deal_ids.len() {
                self.selected_card += 1;
            }
        }
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        self.draw_board(f, layout[1]);
        self.draw_footer(f, layout[2]);

        match self.mode {
            Mode::ConfirmDate { day } => self.draw_date_modal(f, day),
            Mode::PickOwner { idx } => self.draw_owner_picker(f, idx),
            Mode::Dragging => self.draw_pointer(f),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let board = self.session.board();
        let keys = board.window().keys().collect::<Vec<_>>();
        let owner = self.viewer.owner();
        let mut spans = vec![
            Span::styled(
                "dealboard ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(owner.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
        ];
        if self.viewer.is_viewing_other() {
            spans.push(Span::styled(
                format!(" (viewing as {})", self.viewer.current().name),
                Style::default().fg(Color::Yellow),
            ));
        }
        spans.extend([
            Span::raw("  •  "),
            Span::styled(
                format!(
                    "{} to {}",
                    keys.first().copied().unwrap_or_default(),
                    keys.last().copied().unwrap_or_default()
                ),
                Style::default().fg(Color::Green),
            ),
            Span::raw("  •  "),
            Span::styled(
                format_amount(Some(board.board_total())),
                Style::default().fg(Color::LightGreen),
            ),
            Span::raw("  •  "),
            Span::styled(
                format!("loaded {}", format_elapsed(self.last_load)),
                Style::default().fg(Color::Gray),
            ),
        ]);
        let in_flight = self.session.commits().in_flight_count();
        if in_flight > 0 {
            spans.push(Span::raw("  •  "));
            spans.push(Span::styled(
                format!("{} saving", in_flight),
                Style::default().fg(Color::LightYellow),
            ));
        }
        if self.workspace.config.offline {
            spans.push(Span::raw("  •  "));
            spans.push(Span::styled("offline", Style::default().fg(Color::Magenta)));
        }

        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    /// Renders the columns and registers every visible column and card as a
    /// drop region for the next pointer move.
    fn draw_board(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let bucket_count = self.session.board().buckets().len();
        if self.scroll_offsets.len() < bucket_count {
            self.scroll_offsets.resize(bucket_count, 0);
        }
        let constraints = (0..bucket_count)
            .map(|_| Constraint::Ratio(1, bucket_count.max(1) as u32))
            .collect::<Vec<_>>();
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        let dragged = match self.session.drag_state() {
            DragState::Dragging { deal_id, .. } => Some(deal_id.clone()),
            _ => None,
        };
        let mut droppables = Vec::new();
        let board = self.session.board();
        for (idx, bucket) in board.buckets().iter().enumerate() {
            let column = chunks[idx];
            let accent = color_for_index(idx);
            let title = format!(
                "{} ({})  {}",
                bucket.key,
                bucket.deal_ids.len(),
                format_amount(Some(board.bucket_total(&bucket.key)))
            );
            let block = Block::default()
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(accent)
                        .add_modifier(if idx == self.selected_column {
                            Modifier::BOLD | Modifier::UNDERLINED
                        } else {
                            Modifier::BOLD
                        }),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .style(Style::default().bg(Color::Rgb(16, 18, 24)));
            f.render_widget(block, column);
            droppables.push(Droppable::bucket(bucket.key.clone(), to_drop_rect(column)));

            let inner_top = column.y + 1;
            let inner_bottom = (column.y + column.height).saturating_sub(1);
            let viewport = (inner_bottom.saturating_sub(inner_top) / CARD_HEIGHT) as usize;
            let selected = (idx == self.selected_column).then_some(self.selected_card);
            let offset = match selected {
                Some(sel) => adjust_offset(sel, self.scroll_offsets[idx], viewport, 0, bucket.deal_ids.len()),
                None => self.scroll_offsets[idx].min(bucket.deal_ids.len().saturating_sub(1)),
            };
            self.scroll_offsets[idx] = offset;

            for (slot, deal_id) in bucket.deal_ids.iter().skip(offset).take(viewport).enumerate() {
                let Some(deal) = board.deal(deal_id) else {
                    continue;
                };
                let card = Rect {
                    x: column.x + 1,
                    y: inner_top + slot as u16 * CARD_HEIGHT,
                    width: column.width.saturating_sub(2),
                    height: CARD_HEIGHT,
                };
                let is_selected = selected == Some(offset + slot);
                let is_dragged = dragged.as_deref() == Some(deal_id.as_str());
                let saving = self.session.commits().in_flight(deal_id).is_some();
                f.render_widget(deal_card(deal, card.width, is_selected, is_dragged, saving), card);
                droppables.push(Droppable::card(deal_id.clone(), to_drop_rect(card)));
            }
        }
        self.columns = chunks.to_vec();
        self.droppables = droppables;
    }

    fn draw_pointer(&self, f: &mut ratatui::Frame<'_>) {
        let Some(pointer) = self.pointer else {
            return;
        };
        let area = f.size();
        let (x, y) = (pointer.x.floor() as u16, pointer.y.floor() as u16);
        if x >= area.width || y >= area.height {
            return;
        }
        let marker = Paragraph::new("◆").style(
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD),
        );
        f.render_widget(marker, Rect::new(x, y, 1, 1));
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let help_bar = Paragraph::new(self.footer_help_line())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(help_bar, rows[0]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, bottom[0]);

        let detail = Paragraph::new(self.current_deal().map(deal_detail).unwrap_or_default())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray))
                    .title("Deal"),
            );
        f.render_widget(detail, bottom[1]);
    }

    fn footer_help_line(&self) -> Line<'static> {
        let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::LightCyan));
        let spans = match self.mode {
            Mode::Dragging => vec![
                key("←↑↓→"),
                Span::raw(" move pointer  "),
                key("space"),
                Span::raw(" drop  "),
                key("esc"),
                Span::raw(" cancel"),
            ],
            Mode::ConfirmDate { .. } => vec![
                key("↑/↓"),
                Span::raw(" day  "),
                key("enter"),
                Span::raw(" confirm  "),
                key("esc"),
                Span::raw(" cancel"),
            ],
            Mode::PickOwner { .. } => vec![
                key("↑/↓"),
                Span::raw(" user  "),
                key("enter"),
                Span::raw(" view  "),
                key("esc"),
                Span::raw(" close"),
            ],
            Mode::Normal => {
                let mut spans = vec![
                    key("←↑↓→ / h j k l"),
                    Span::raw(" select  "),
                    key("space"),
                    Span::raw(" pick up  "),
                    key("r"),
                    Span::raw(" reload  "),
                ];
                if self.viewer.is_admin() {
                    spans.extend([key("o"), Span::raw(" owner  ")]);
                }
                spans.extend([key("q"), Span::raw(" quit")]);
                spans
            }
        };
        Line::from(spans)
    }

    fn draw_date_modal(&self, f: &mut ratatui::Frame<'_>, day: u32) {
        let Some(pending) = self.session.commits().pending() else {
            return;
        };
        let area = centered_rect(50, 40, f.size());
        let close = pending
            .close_date(day)
            .map(format_date)
            .unwrap_or_else(|| "-".into());
        let body = vec![
            Line::from(Span::styled(
                self.deal_title(&pending.deal_id),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("{}  →  {}", pending.source_bucket, pending.target_bucket)),
            Line::from(""),
            Line::from(vec![
                Span::raw("Day  "),
                Span::styled(
                    format!("‹ {:>2} ›", day),
                    Style::default()
                        .fg(Color::LightYellow)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!("  of {}", pending.day_count())),
            ]),
            Line::from(format!("New close date: {}", close)),
            Line::from(""),
            Line::from("↑/↓ change day, Enter confirm, Esc cancel"),
        ];
        let dialog = Paragraph::new(body).alignment(Alignment::Center).block(
            Block::default()
                .title(Span::styled(
                    "Confirm Close Date",
                    Style::default()
                        .fg(Color::LightCyan)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightCyan)),
        );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_owner_picker(&self, f: &mut ratatui::Frame<'_>, idx: usize) {
        let area = centered_rect(40, 50, f.size());
        let items = self
            .viewer
            .users()
            .iter()
            .map(|u| {
                let marker = if u.id == self.viewer.owner().id { "● " } else { "  " };
                ListItem::new(format!("{}{}", marker, u.name))
            })
            .collect::<Vec<_>>();
        let list = List::new(items)
            .block(
                Block::default()
                    .title("View pipeline of")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::LightMagenta)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(252, 214, 112))
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            );
        let mut state = ListState::default();
        state.select(Some(idx));
        f.render_widget(Clear, area);
        f.render_stateful_widget(list, area, &mut state);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn to_drop_rect(r: Rect) -> DropRect {
    DropRect::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64)
}

/// Snaps a point to the middle of the terminal cell it falls in.
fn cell_center(p: Point) -> Point {
    Point::new(p.x.floor() + 0.5, p.y.floor() + 0.5)
}

fn column_center(column: Rect) -> Point {
    cell_center(Point::new(
        column.x as f64 + column.width as f64 / 2.0,
        column.y as f64 + 1.0 + CARD_HEIGHT as f64 / 2.0,
    ))
}

fn color_for_index(idx: usize) -> Color {
    let palette = [
        Color::Cyan,
        Color::LightGreen,
        Color::LightMagenta,
        Color::LightBlue,
    ];
    palette[idx % palette.len()]
}

fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1));
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

fn truncate_text(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn deal_card(deal: &Deal, width: u16, selected: bool, dragged: bool, saving: bool) -> Paragraph<'static> {
    let inner = width.saturating_sub(2) as usize;
    let mut title = deal.title.clone();
    if saving {
        title.push_str(" (saving)");
    }
    let lines = vec![
        Line::from(Span::styled(
            truncate_text(&title, inner),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::raw(truncate_text(&deal.company, inner)),
        Line::raw(truncate_text(
            &format!("{}  •  {}", format_amount(deal.value), format_date(deal.close_date)),
            inner,
        )),
    ];
    let (border, style) = if dragged {
        (
            Color::LightRed,
            Style::default().bg(Color::Rgb(60, 30, 30)).fg(Color::White),
        )
    } else if selected {
        (
            Color::Rgb(252, 214, 112),
            Style::default().bg(Color::Rgb(40, 36, 22)).fg(Color::White),
        )
    } else {
        (
            Color::DarkGray,
            Style::default().bg(Color::Rgb(22, 24, 30)).fg(Color::Gray),
        )
    };
    Paragraph::new(lines).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border)),
    )
}

fn deal_detail(deal: &Deal) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(deal.stage.clone(), Style::default().fg(Color::LightCyan)),
        Span::raw(format!(" {}%  •  {}  •  {}", deal.probability, deal.contact, deal.owner)),
    ])];
    if let Some(url) = &deal.url {
        lines.push(Line::styled(url.clone(), Style::default().fg(Color::DarkGray)));
    }
    lines
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
