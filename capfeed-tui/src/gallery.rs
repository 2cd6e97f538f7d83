use anyhow::Result;
use capfeed_core::client::resolve_image_url;
use capfeed_core::{timestamp, CaptureStamp, DateGroup, FeedBackend, FeedSession, ImageRef};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::collections::HashMap;
use std::io::{self, Cursor, Stdout};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

use crate::theme::TuiTheme;

pub struct GalleryOptions {
    /// Used to show the full image address in the lightbox.
    pub base: Option<Url>,
    pub theme: TuiTheme,
}

pub trait EventSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>>;
}

pub struct RealEventSource;

impl EventSource for RealEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

pub fn run_gallery_default(session: &mut FeedSession, opts: &GalleryOptions) -> Result<Option<ImageRef>> {
    let mut es = RealEventSource;
    run_gallery_with(session, opts, &mut es, true)
}

/// Drive the gallery until the user quits. Returns the image shown in the
/// lightbox at that moment, if it was open.
pub fn run_gallery_with(
    session: &mut FeedSession,
    opts: &GalleryOptions,
    es: &mut dyn EventSource,
    draw: bool,
) -> Result<Option<ImageRef>> {
    let mut terminal = if draw {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
        Some(Terminal::new(CrosstermBackend::new(stdout))?)
    } else {
        None
    };

    let result = event_loop(session, opts, es, terminal.as_mut());

    if draw {
        disable_raw_mode()?;
        crossterm::execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Row {
    Header { label: String, count: usize, undated: bool },
    Image { index: usize, image: ImageRef },
}

fn build_rows(groups: &[DateGroup]) -> Vec<Row> {
    let mut rows = Vec::new();
    for g in groups {
        rows.push(Row::Header {
            label: g.key.to_string(),
            count: g.len(),
            undated: g.key.is_unknown(),
        });
        rows.extend(g.members.iter().map(|m| Row::Image {
            index: m.index,
            image: m.image.clone(),
        }));
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Preview {
    Loading,
    Ready { width: u32, height: u32, bytes: usize },
    Failed(String),
}

fn describe(bytes: &[u8]) -> Preview {
    let dims = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())
        .and_then(|r| r.into_dimensions().map_err(|e| e.to_string()));
    match dims {
        Ok((width, height)) => Preview::Ready {
            width,
            height,
            bytes: bytes.len(),
        },
        Err(e) => Preview::Failed(e),
    }
}

/// Background image downloads for the lightbox, keyed by reference.
struct Previews {
    backend: Arc<dyn FeedBackend>,
    tx: Sender<(ImageRef, Preview)>,
    rx: Receiver<(ImageRef, Preview)>,
    cache: HashMap<ImageRef, Preview>,
}

impl Previews {
    fn new(backend: Arc<dyn FeedBackend>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            tx,
            rx,
            cache: HashMap::new(),
        }
    }

    fn request(&mut self, image: &ImageRef) {
        if self.cache.contains_key(image) {
            return;
        }
        self.cache.insert(image.clone(), Preview::Loading);
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let image = image.clone();
        thread::spawn(move || {
            let preview = match backend.fetch_image(&image) {
                Ok(bytes) => describe(&bytes),
                Err(e) => Preview::Failed(e.to_string()),
            };
            let _ = tx.send((image, preview));
        });
    }

    fn pump(&mut self) {
        while let Ok((image, preview)) = self.rx.try_recv() {
            self.cache.insert(image, preview);
        }
    }

    fn get(&self, image: &str) -> Option<&Preview> {
        self.cache.get(image)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn event_loop(
    session: &mut FeedSession,
    opts: &GalleryOptions,
    es: &mut dyn EventSource,
    mut terminal: Option<&mut Terminal<CrosstermBackend<Stdout>>>,
) -> Result<Option<ImageRef>> {
    let thm = opts.theme;
    let mut previews = Previews::new(session.client().backend().clone());
    // position among image rows, not among all rows
    let mut cursor = 0usize;
    let mut viewport = 0usize;
    let mut last_remaining: Option<usize> = None;
    let mut bust = now_millis();

    loop {
        session.pump();
        previews.pump();
        session.tick(Instant::now());

        let rows = build_rows(session.groups());
        let image_rows: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Row::Image { .. }))
            .map(|(i, _)| i)
            .collect();
        if cursor >= image_rows.len() {
            cursor = image_rows.len().saturating_sub(1);
        }
        let selected_row = image_rows.get(cursor).copied();

        // The empty list has no sentinel to observe yet.
        if !rows.is_empty() {
            let bottom = selected_row.map(|r| r + 1).unwrap_or(0).max(viewport);
            let remaining = rows.len().saturating_sub(bottom);
            if last_remaining != Some(remaining) {
                last_remaining = Some(remaining);
                session.observe_scroll(remaining);
            }
        }

        let focused = session.focused().map(|(i, r)| (i, r.clone()));
        if let Some((_, image)) = &focused {
            previews.request(image);
        }

        if let Some(term) = terminal.as_deref_mut() {
            let status = session.status();
            term.draw(|f| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(5), Constraint::Length(4)])
                    .split(f.area());
                viewport = chunks[0].height.saturating_sub(2) as usize;

                if let Some((index, image)) = &focused {
                    let url = opts
                        .base
                        .as_ref()
                        .and_then(|b| resolve_image_url(b, image, Some(bust)).ok())
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| image.clone());
                    let preview = match previews.get(image) {
                        Some(Preview::Ready { width, height, bytes }) => {
                            format!("{width}x{height} px, {} KiB", bytes.div_ceil(1024))
                        }
                        Some(Preview::Failed(e)) => format!("unavailable: {e}"),
                        Some(Preview::Loading) | None => "loading…".to_string(),
                    };
                    let lines = vec![
                        Line::from(format!("{} / {}", index + 1, status.len))
                            .style(Style::default().add_modifier(Modifier::DIM)),
                        Line::from(image.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
                        Line::from(format!("captured  {}", timestamp::display_stamp(image))),
                        Line::from(format!("url       {url}")),
                        Line::from(format!("image     {preview}")),
                    ];
                    let body = Paragraph::new(lines)
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .title("Lightbox")
                                .border_style(Style::default().fg(thm.border_fg)),
                        )
                        .wrap(Wrap { trim: false });
                    f.render_widget(body, chunks[0]);
                } else {
                    let items: Vec<ListItem> = rows
                        .iter()
                        .map(|row| match row {
                            Row::Header { label, count, undated } => {
                                let modifier = if *undated { Modifier::DIM } else { Modifier::BOLD };
                                ListItem::new(Line::from(format!("{label} ({count})")))
                                    .style(Style::default().add_modifier(modifier))
                            }
                            Row::Image { image, .. } => {
                                let time = CaptureStamp::parse(image)
                                    .map(|s| s.time_label())
                                    .unwrap_or_else(|| "--:--:--".into());
                                ListItem::new(Line::from(format!("  {time}  {image}")))
                            }
                        })
                        .collect();
                    let title = format!("Feed · {}", status.order);
                    let list = List::new(items)
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .title(title)
                                .border_style(Style::default().fg(thm.border_fg)),
                        )
                        .highlight_style(
                            Style::default()
                                .fg(thm.highlight_fg)
                                .bg(thm.highlight_bg)
                                .add_modifier(Modifier::BOLD),
                        );
                    let mut state = ListState::default().with_selected(selected_row);
                    f.render_stateful_widget(list, chunks[0], &mut state);
                }

                let mut ln1 = format!(
                    "{} | {} | {} images | {} page(s) | {}",
                    status.order,
                    match status.mode {
                        capfeed_core::FetchMode::Paged => "paged",
                        capfeed_core::FetchMode::FallbackFull => "full listing",
                    },
                    status.len,
                    status.pages,
                    if status.has_more { "more below" } else { "end" }
                );
                if status.fetching {
                    ln1.push_str(" | loading…");
                }
                if let Some(c) = status.connection {
                    ln1.push_str(&format!(" | realtime: {}", c.label()));
                }
                if let Some(e) = &status.last_error {
                    ln1.push_str(&format!(" | error: {e} (r to retry)"));
                }
                let ln2 = if focused.is_some() {
                    "←/→ step | Esc back | q quit"
                } else {
                    "↑/↓ move | PgUp/PgDn | Home/End | Enter open | o order | r retry | q quit"
                };
                let footer = Paragraph::new(vec![Line::raw(ln1), Line::raw(ln2)])
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title("Status")
                            .border_style(Style::default().fg(thm.border_fg)),
                    )
                    .style(Style::default().fg(thm.help_fg))
                    .wrap(Wrap { trim: true });
                f.render_widget(footer, chunks[1]);
            })?;
        }

        let Some(ev) = es.poll(Duration::from_millis(100))? else {
            continue;
        };
        let Event::Key(k) = ev else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(focused.map(|(_, r)| r));
        }

        if focused.is_some() {
            match k.code {
                KeyCode::Left | KeyCode::Char('h') => {
                    session.lightbox_prev();
                    bust = now_millis();
                }
                KeyCode::Right | KeyCode::Char('l') => {
                    session.lightbox_next();
                    bust = now_millis();
                }
                KeyCode::Esc => session.close_lightbox(),
                KeyCode::Char('q') => return Ok(focused.map(|(_, r)| r)),
                _ => {}
            }
            continue;
        }

        let last = image_rows.len().saturating_sub(1);
        let step = viewport.max(1);
        match k.code {
            KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
            KeyCode::Up | KeyCode::Char('k') => cursor = cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => cursor = (cursor + 1).min(last),
            KeyCode::PageUp => cursor = cursor.saturating_sub(step),
            KeyCode::PageDown => cursor = (cursor + step).min(last),
            KeyCode::Home => cursor = 0,
            KeyCode::End => cursor = last,
            KeyCode::Enter => {
                if let Some(Row::Image { index, .. }) = selected_row.and_then(|r| rows.get(r)) {
                    session.open_lightbox(*index);
                    bust = now_millis();
                }
            }
            KeyCode::Char('o') => {
                let order = session.order().toggled();
                debug!(%order, "switching order");
                session.set_order(order);
                cursor = 0;
                last_remaining = None;
            }
            KeyCode::Char('r') => {
                session.retry();
            }
            _ => {}
        }
    }
}
