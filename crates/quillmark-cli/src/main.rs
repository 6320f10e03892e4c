use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use quillmark_config::Config;
use quillmark_engine::{DocumentEngine, EngineOptions, InputEvent, io};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use relative_path::RelativePathBuf;
use std::{env, io::stdout, path::PathBuf, process, time::Duration};

struct App {
    notes_root: PathBuf,
    file: RelativePathBuf,
    engine: DocumentEngine,
    modified: bool,
    status: String,
}

impl App {
    fn open(notes_root: PathBuf, file: RelativePathBuf, options: EngineOptions) -> Result<Self> {
        let content = io::read_file(&file, &notes_root)?;
        let (engine, _) = DocumentEngine::from_markdown(&content, options);
        let status = format!("Opened {}", file);
        Ok(Self {
            notes_root,
            file,
            engine,
            modified: false,
            status,
        })
    }

    fn apply(&mut self, event: &InputEvent) {
        match self.engine.apply_event(event) {
            Ok(patches) => {
                if !patches.is_empty() {
                    self.modified = true;
                }
            }
            Err(e) => self.status = format!("Edit failed: {e}"),
        }
    }

    fn undo(&mut self) {
        if self.engine.undo().is_some() {
            self.modified = true;
            self.status = "Undid last edit".to_string();
        } else {
            self.status = "Nothing to undo".to_string();
        }
    }

    fn redo(&mut self) {
        if self.engine.redo().is_some() {
            self.modified = true;
            self.status = "Redid edit".to_string();
        } else {
            self.status = "Nothing to redo".to_string();
        }
    }

    fn save(&mut self) {
        match io::write_file(&self.file, &self.notes_root, &self.engine.markdown()) {
            Ok(()) => {
                self.modified = false;
                self.status = format!("Saved {}", self.file);
            }
            Err(e) => self.status = format!("Save failed: {e}"),
        }
    }

    fn structure_lines(&self) -> Vec<String> {
        let tree = self.engine.tree();
        let focus = self.engine.selection().focus.block;
        tree.preorder_keys()
            .into_iter()
            .skip(1) // the document root is implicit
            .filter_map(|key| {
                let block = tree.get(key)?;
                let depth = tree.path_from_root(key).map(|p| p.len()).unwrap_or(1);
                let indent = "  ".repeat(depth.saturating_sub(1));
                let marker = if key == focus { "▸ " } else { "  " };
                let mut preview: String = block.text.chars().take(32).collect();
                if block.text.chars().count() > 32 {
                    preview.push('…');
                }
                Some(format!("{marker}{indent}{:?} {preview}", block.kind.tag()))
            })
            .collect()
    }
}

fn engine_options(config: &Config) -> EngineOptions {
    EngineOptions {
        history_depth: config.history_depth,
        coalesce_window: Duration::from_millis(config.coalesce_window_ms),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <markdown-file>", args[0]);
        process::exit(1);
    }

    let config = match Config::load() {
        Ok(found) => found.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let requested = PathBuf::from(&args[1]);
    let (notes_root, file) = if requested.is_absolute() {
        let root = requested
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        let name = requested
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (root, RelativePathBuf::from(name))
    } else if let Some(notes_path) = &config.notes_path {
        (notes_path.clone(), RelativePathBuf::from(&args[1]))
    } else {
        (PathBuf::from("."), RelativePathBuf::from(&args[1]))
    };

    if let Err(e) = io::validate_notes_dir(&notes_root) {
        eprintln!("Error: Notes path '{}' is invalid: {e}", notes_root.display());
        process::exit(1);
    }

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::open(notes_root, file, engine_options(&config));
    let res = match app {
        Ok(mut app) => run_app(&mut terminal, &mut app),
        Err(e) => Err(e),
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Char('q') if ctrl => return Ok(()),
                KeyCode::Char('z') if ctrl => app.undo(),
                KeyCode::Char('y') if ctrl => app.redo(),
                KeyCode::Char('s') if ctrl => app.save(),
                KeyCode::Char(c) if !ctrl => app.apply(&InputEvent::character(c)),
                KeyCode::Enter => app.apply(&InputEvent::enter()),
                KeyCode::Backspace => app.apply(&InputEvent::backspace()),
                KeyCode::Delete => app.apply(&InputEvent::delete()),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .margin(0)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[0]);

    // Block structure panel
    let structure_items: Vec<ListItem> = app
        .structure_lines()
        .into_iter()
        .map(|line| ListItem::new(vec![Line::from(vec![Span::raw(line)])]))
        .collect();
    let structure = List::new(structure_items)
        .block(Block::default().borders(Borders::ALL).title("Blocks"))
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));
    f.render_widget(structure, panes[0]);

    // Markdown panel
    let markdown = app.engine.markdown();
    let content_text: Vec<Line> = markdown
        .lines()
        .map(|line| Line::from(vec![Span::raw(line.to_string())]))
        .collect();
    let title = if app.modified {
        format!("{} [+]", app.file)
    } else {
        app.file.to_string()
    };
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(ratatui::widgets::Wrap { trim: false });
    f.render_widget(content, panes[1]);

    // Status line
    let caret = app
        .engine
        .resolved_caret()
        .map(|c| format!("{}:{}", c.key, c.offset))
        .unwrap_or_else(|| "-".to_string());
    let status = Line::from(vec![
        Span::raw(format!("{} | caret {} | ", app.status, caret)),
        Span::raw("Esc/^Q: Quit  ^S: Save  ^Z: Undo  ^Y: Redo"),
    ]);
    f.render_widget(Paragraph::new(vec![status]), rows[1]);
}
