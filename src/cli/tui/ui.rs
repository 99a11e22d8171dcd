use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::activation::{resolve_active, ActivationConfig};
use crate::form::{form_rows, FieldEdit};
use crate::rules::MODEL_FIELD;
use crate::settings::UiSettings;

use super::{
    app::{visible_models, App, Overlay, SettingsItem, ToastKind},
    data::{Loadable, UiData},
    route::{Route, Section},
    theme::{theme_for, Theme},
};

/// Header rows, borders included. Never depends on flags or overlays.
const HEADER_HEIGHT: u16 = 3;
const NAV_WIDTH: u16 = 26;
const CONTENT_INSET_LEFT: u16 = 1;
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const HELP_TEXT: &str = "\
Global
  1-6      jump to a section
  ?        toggle this help
  T        toggle dark/light theme
  A        toggle animation
  Esc      close dialog, go back, quit from the welcome page
  q        quit (Ctrl+C also works)

Providers
  Enter    open the provider form
  a        add a provider of a schema type
  d        delete (asks first)
  t        test connectivity
  s        save the catalog file

Provider form
  Enter    edit the selected field
  Tab      commit the draft and move to the next field
  v        reveal the tail of secrets

Models: Enter applies to the default provider, f filters by tag, r refreshes
Build: g switches project/global, o picks a provider, Enter writes
Diagnostics: r refreshes, e exports";

fn selection_style(theme: &Theme) -> Style {
    if theme.no_color {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
            .fg(Color::Black)
            .bg(theme.accent)
            .add_modifier(Modifier::BOLD)
    }
}

fn chip_style(theme: &Theme) -> Style {
    if theme.no_color {
        Style::default()
    } else {
        Style::default().fg(Color::White).bg(Color::DarkGray)
    }
}

fn pane_block(title: impl Into<String>, theme: &Theme, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.dim)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(border)
        .title(title.into())
}

fn highlight_symbol(theme: &Theme) -> &'static str {
    if theme.no_color {
        "> "
    } else {
        " "
    }
}

fn key_bar_line(theme: &Theme, items: &[(&str, &str)]) -> Line<'static> {
    if theme.no_color {
        let parts = items
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        return Line::raw(parts.join("  "));
    }

    let base = chip_style(theme);
    let key = base.add_modifier(Modifier::BOLD);

    let mut spans: Vec<Span<'static>> = vec![Span::styled(" ", base)];
    for (idx, (k, v)) in items.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled("  ", base));
        }
        spans.push(Span::styled((*k).to_string(), key));
        spans.push(Span::styled(" ", base));
        spans.push(Span::styled((*v).to_string(), base));
    }
    spans.push(Span::styled(" ", base));
    Line::from(spans)
}

fn render_key_bar_center(frame: &mut Frame<'_>, area: Rect, theme: &Theme, items: &[(&str, &str)]) {
    frame.render_widget(
        Paragraph::new(key_bar_line(theme, items)).alignment(Alignment::Center),
        area,
    );
}

fn inset_left(area: Rect, left: u16) -> Rect {
    if area.width <= left {
        return area;
    }
    Rect {
        x: area.x + left,
        width: area.width - left,
        ..area
    }
}

fn truncate_to_display_width(text: &str, width: u16) -> String {
    let width = width as usize;
    if width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0usize;
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used.saturating_add(w) > width.saturating_sub(1) {
            break;
        }
        out.push(c);
        used = used.saturating_add(w);
    }
    out.push('…');
    out
}

/// Splits the pane below the key bar: one row for keys, the rest for content.
fn keyed_pane(
    frame: &mut Frame<'_>,
    area: Rect,
    title: impl Into<String>,
    theme: &Theme,
    keys: &[(&str, &str)],
) -> Rect {
    let outer = pane_block(title, theme, true);
    frame.render_widget(outer.clone(), area);
    let inner = outer.inner(area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);
    render_key_bar_center(frame, chunks[0], theme, keys);
    inset_left(chunks[1], CONTENT_INSET_LEFT)
}

fn body_rects(area: Rect) -> (Rect, Rect, Rect, Rect) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(NAV_WIDTH), Constraint::Min(0)])
        .split(root[1]);
    (root[0], body[0], body[1], root[2])
}

pub fn render(frame: &mut Frame<'_>, app: &App, data: &UiData) {
    let theme = theme_for(app.flags.theme);
    let (header, nav, content, footer) = body_rects(frame.area());

    let header_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(theme.dim));
    frame.render_widget(header_block.clone(), header);
    render_header(frame, app, data, header_block.inner(header), &theme);

    render_nav(frame, app, nav, &theme);
    render_content(frame, app, data, content, &theme);
    render_footer(frame, app, footer, &theme);

    render_overlay(frame, app, content, &theme);
}

fn render_header(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(12),
            Constraint::Min(0),
            Constraint::Length(32),
        ])
        .split(area);

    let title_style = if theme.no_color {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
    };
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled("  chi-tui", title_style))),
        chunks[0],
    );

    let mut crumbs = app
        .pages
        .iter()
        .map(|r| r.title())
        .collect::<Vec<_>>()
        .join(" › ");
    if data.catalog.is_dirty() {
        crumbs.push_str("  [unsaved]");
    }
    let mut spans = vec![Span::styled(crumbs, Style::default().fg(theme.fg))];
    if app.is_busy(data) {
        let indicator = if app.flags.animation {
            SPINNER[(app.tick as usize) % SPINNER.len()]
        } else {
            "…"
        };
        spans.push(Span::styled(
            format!("  {indicator}"),
            Style::default().fg(theme.accent),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        chunks[1],
    );

    let default_name = data
        .catalog
        .default_provider()
        .map(|p| p.name.as_str())
        .unwrap_or("none");
    let badge = truncate_to_display_width(
        &format!("  default: {default_name}  "),
        chunks[2].width.saturating_sub(1),
    );
    let badge_width = (UnicodeWidthStr::width(badge.as_str()) as u16).min(chunks[2].width);
    let badge_area = Rect {
        x: chunks[2]
            .x
            .saturating_add(chunks[2].width.saturating_sub(badge_width.saturating_add(1))),
        width: badge_width,
        height: 1,
        ..chunks[2]
    };
    frame.render_widget(
        Paragraph::new(Span::raw(badge)).style(selection_style(theme)),
        badge_area,
    );
}

fn nav_section(route: &Route) -> Option<Section> {
    Section::ALL
        .into_iter()
        .find(|s| match (s, route) {
            (Section::Providers, Route::ProviderForm { .. }) => true,
            _ => s.to_route() == *route,
        })
}

fn render_nav(frame: &mut Frame<'_>, app: &App, area: Rect, theme: &Theme) {
    let rows = Section::ALL.iter().map(|s| {
        Row::new(vec![
            Cell::from(s.key().to_string()),
            Cell::from(s.label()),
        ])
    });
    let table = Table::new(rows, [Constraint::Length(2), Constraint::Min(10)])
        .column_spacing(1)
        .block(pane_block("Sections", theme, false))
        .row_highlight_style(selection_style(theme))
        .highlight_symbol(highlight_symbol(theme));

    let mut state = TableState::default();
    state.select(nav_section(app.route()).and_then(|s| Section::ALL.iter().position(|x| *x == s)));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_content(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    match app.route() {
        Route::Welcome => render_welcome(frame, app, data, area, theme),
        Route::Providers => render_providers(frame, app, data, area, theme),
        Route::ProviderForm { id } => render_provider_form(frame, app, data, area, theme, id),
        Route::SelectDefault => render_select_default(frame, app, data, area, theme),
        Route::Models => render_models(frame, app, data, area, theme),
        Route::Build => render_build(frame, app, data, area, theme),
        Route::Diagnostics => render_diagnostics(frame, data, area, theme),
        Route::Settings => render_settings(frame, app, area, theme),
    }
}

fn header_row(labels: &[&'static str], theme: &Theme) -> Row<'static> {
    Row::new(labels.iter().map(|l| Cell::from(*l)).collect::<Vec<_>>())
        .style(Style::default().fg(theme.dim).add_modifier(Modifier::BOLD))
}

fn render_welcome(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    let inner = keyed_pane(
        frame,
        area,
        "Welcome",
        theme,
        &[("↑↓", "move"), ("Enter", "open"), ("?", "help")],
    );
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(inner);

    let summary = vec![
        Line::raw(format!(
            "Catalog {}: {} provider(s)",
            data.catalog_file_name(),
            data.catalog.len()
        )),
        Line::styled(
            "Configure providers, pick a default, then build the activation file.",
            Style::default().fg(theme.dim),
        ),
    ];
    frame.render_widget(Paragraph::new(summary), chunks[0]);

    let rows = Section::ALL
        .iter()
        .map(|s| Row::new(vec![Cell::from(s.key().to_string()), Cell::from(s.label())]))
        .chain(std::iter::once(Row::new(vec![
            Cell::from("q"),
            Cell::from("Quit"),
        ])));
    let table = Table::new(rows, [Constraint::Length(2), Constraint::Min(10)])
        .row_highlight_style(selection_style(theme))
        .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(app.menu_idx));
    frame.render_stateful_widget(table, chunks[1], &mut state);
}

fn probe_cell(app: &App, data: &UiData, id: &str) -> String {
    if app.active_probe.as_ref().is_some_and(|p| p.provider_id == id) {
        return "testing…".to_string();
    }
    match data.probe_results.get(id) {
        Some(result) if result.ok => format!("✓ {}", result.summary()),
        Some(result) => format!("✗ {}", result.summary()),
        None => "-".to_string(),
    }
}

fn render_providers(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    let title = match &data.schemas {
        Loadable::Failed(_) => "Providers (schema unavailable)",
        _ => "Providers",
    };
    let inner = keyed_pane(
        frame,
        area,
        title,
        theme,
        &[
            ("Enter", "edit"),
            ("a", "add"),
            ("d", "delete"),
            ("t", "test"),
            ("s", "save"),
        ],
    );

    if data.catalog.is_empty() {
        frame.render_widget(
            Paragraph::new("No providers yet. Press a to add one.")
                .style(Style::default().fg(theme.dim)),
            inner,
        );
        return;
    }

    let default_id = data.catalog.default_id();
    let rows = data.catalog.providers().iter().map(|p| {
        let marker = if Some(p.id.as_str()) == default_id {
            "★"
        } else {
            " "
        };
        Row::new(vec![
            Cell::from(marker),
            Cell::from(p.id.clone()),
            Cell::from(p.name.clone()),
            Cell::from(p.provider_type.clone()),
            Cell::from(p.tags.join(", ")),
            Cell::from(probe_cell(app, data, &p.id)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(5),
            Constraint::Percentage(22),
            Constraint::Percentage(16),
            Constraint::Percentage(20),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["", "ID", "Name", "Type", "Tags", "Test"], theme))
    .row_highlight_style(selection_style(theme))
    .highlight_symbol(highlight_symbol(theme));

    let mut state = TableState::default();
    state.select(Some(app.provider_idx));
    frame.render_stateful_widget(table, inner, &mut state);
}

fn render_provider_form(
    frame: &mut Frame<'_>,
    app: &App,
    data: &UiData,
    area: Rect,
    theme: &Theme,
    id: &str,
) {
    let Some(provider) = data.catalog.get(id) else {
        frame.render_widget(
            Paragraph::new(format!("Provider {id} no longer exists."))
                .block(pane_block("Provider", theme, true)),
            area,
        );
        return;
    };

    let reveal = if app.reveal_secrets { "hide" } else { "reveal" };
    let inner = keyed_pane(
        frame,
        area,
        format!("{} ({})", provider.name, provider.provider_type),
        theme,
        &[
            ("Enter", "edit"),
            ("Tab", "next"),
            ("v", reveal),
            ("t", "test"),
            ("s", "save"),
            ("Esc", "back"),
        ],
    );
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)])
        .split(inner);

    let schema = data.provider_schema(provider);
    let rows = form_rows(provider, &schema, app.reveal_secrets);
    let help = rows
        .get(app.form_idx)
        .and_then(|r| r.help.clone())
        .unwrap_or_default();

    let table_rows = rows.iter().map(|row| {
        let label = if row.missing_required {
            format!("{} *", row.label)
        } else {
            row.label.clone()
        };
        let label_style = if row.missing_required {
            Style::default().fg(theme.warn)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(label).style(label_style),
            Cell::from(row.kind_label()),
            Cell::from(row.value.clone()),
        ])
    });
    let table = Table::new(
        table_rows,
        [
            Constraint::Length(22),
            Constraint::Length(9),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["Field", "Kind", "Value"], theme))
    .row_highlight_style(selection_style(theme))
    .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(app.form_idx));
    frame.render_stateful_widget(table, chunks[0], &mut state);

    let status = probe_cell(app, data, id);
    let footer = vec![
        Line::styled(help, Style::default().fg(theme.dim)),
        Line::raw(format!("Test: {status}")),
    ];
    frame.render_widget(Paragraph::new(footer), chunks[1]);
}

fn render_select_default(
    frame: &mut Frame<'_>,
    app: &App,
    data: &UiData,
    area: Rect,
    theme: &Theme,
) {
    let inner = keyed_pane(
        frame,
        area,
        "Select Default",
        theme,
        &[("Enter", "set default"), ("s", "save")],
    );
    if data.catalog.is_empty() {
        frame.render_widget(
            Paragraph::new("The catalog is empty. Add providers first (1)."),
            inner,
        );
        return;
    }

    let default_id = data.catalog.default_id();
    let rows = data.catalog.providers().iter().map(|p| {
        let marker = if Some(p.id.as_str()) == default_id {
            "●"
        } else {
            "○"
        };
        Row::new(vec![
            Cell::from(marker),
            Cell::from(p.name.clone()),
            Cell::from(p.provider_type.clone()),
            Cell::from(p.config_display(MODEL_FIELD).unwrap_or_default()),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Percentage(35),
            Constraint::Percentage(20),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["", "Name", "Type", "Model"], theme))
    .row_highlight_style(selection_style(theme))
    .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(app.default_idx));
    frame.render_stateful_widget(table, inner, &mut state);
}

fn render_models(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    let mut title = "Models".to_string();
    if let Some(tag) = &app.model_tag {
        title.push_str(&format!(" [tag: {tag}]"));
    }
    if let Some(ram) = data.models.ready().and_then(|l| l.available_ram_gb) {
        title.push_str(&format!(" · {ram:.1} GB RAM"));
    }
    let inner = keyed_pane(
        frame,
        area,
        title,
        theme,
        &[("Enter", "apply to default"), ("f", "filter tag"), ("r", "refresh")],
    );

    let message = match &data.models {
        Loadable::NotRequested | Loadable::Loading => Some("Loading models…".to_string()),
        Loadable::Failed(err) => Some(format!("Model listing unavailable: {err}")),
        Loadable::Ready(_) => None,
    };
    if let Some(message) = message {
        frame.render_widget(
            Paragraph::new(message)
                .style(Style::default().fg(theme.dim))
                .wrap(Wrap { trim: false }),
            inner,
        );
        return;
    }

    let visible = visible_models(app, data);
    if visible.is_empty() {
        frame.render_widget(Paragraph::new("No models match."), inner);
        return;
    }
    let rows = visible.iter().map(|m| {
        Row::new(vec![
            Cell::from(if m.current { "●" } else { " " }),
            Cell::from(m.id.clone()),
            Cell::from(m.name.clone()),
            Cell::from(m.size.clone().unwrap_or_default()),
            Cell::from(
                m.recommended_ram_gb
                    .map(|r| format!("{r:.1} GB"))
                    .unwrap_or_default(),
            ),
            Cell::from(if m.downloaded { "✓" } else { "" }),
            Cell::from(m.tags.join(", ")),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Percentage(24),
            Constraint::Percentage(24),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(3),
            Constraint::Min(8),
        ],
    )
    .header(header_row(&["", "ID", "Name", "Size", "RAM", "DL", "Tags"], theme))
    .row_highlight_style(selection_style(theme))
    .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(app.model_idx));
    frame.render_stateful_widget(table, inner, &mut state);
}

fn render_build(frame: &mut Frame<'_>, app: &App, data: &UiData, area: Rect, theme: &Theme) {
    let inner = keyed_pane(
        frame,
        area,
        "Build Configuration",
        theme,
        &[("g", "target"), ("o", "provider"), ("Enter", "write")],
    );

    let source = match &app.build_override {
        Some(id) => format!("override {id}"),
        None => "catalog default".to_string(),
    };
    let mut lines = vec![
        Line::raw(format!("Target:   {}", app.build_target.label())),
        Line::raw(format!("Provider: {source}")),
        Line::raw(""),
    ];

    match resolve_active(&data.catalog, app.build_override.as_deref()) {
        Ok(provider) => {
            let schema = data.schema_set().and_then(|s| s.get(&provider.provider_type));
            match ActivationConfig::from_provider(provider).masked_preview(schema) {
                Ok(preview) => lines.extend(preview.lines().map(|l| Line::raw(l.to_string()))),
                Err(err) => lines.push(Line::styled(err.to_string(), Style::default().fg(theme.err))),
            }
        }
        Err(err) => lines.push(Line::styled(err.to_string(), Style::default().fg(theme.warn))),
    }

    if let Some(path) = &data.last_write {
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            format!("Last written: {}", path.display()),
            Style::default().fg(theme.ok),
        ));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

fn render_diagnostics(frame: &mut Frame<'_>, data: &UiData, area: Rect, theme: &Theme) {
    let inner = keyed_pane(
        frame,
        area,
        "Diagnostics",
        theme,
        &[("r", "refresh"), ("e", "export")],
    );
    let mut lines = match &data.diagnostics {
        Some(diag) => {
            let mut lines = vec![Line::styled(
                format!("Snapshot {}", diag.timestamp),
                Style::default().fg(theme.dim),
            )];
            lines.extend(diag.summary_lines().into_iter().map(Line::raw));
            lines
        }
        None => vec![Line::raw("Press r to collect diagnostics.")],
    };
    if let Some(path) = &data.last_export {
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            format!("Exported to {}", path.display()),
            Style::default().fg(theme.ok),
        ));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

fn render_settings(frame: &mut Frame<'_>, app: &App, area: Rect, theme: &Theme) {
    let inner = keyed_pane(frame, area, "Settings", theme, &[("Enter", "toggle")]);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let rows = SettingsItem::ALL.iter().map(|item| {
        let (label, value) = match item {
            SettingsItem::Theme => ("Theme", app.flags.theme.label().to_string()),
            SettingsItem::Animation => (
                "Animation",
                if app.flags.animation { "on" } else { "off" }.to_string(),
            ),
        };
        Row::new(vec![Cell::from(label), Cell::from(value)])
    });
    let table = Table::new(rows, [Constraint::Length(14), Constraint::Min(10)])
        .header(header_row(&["Setting", "Value"], theme))
        .row_highlight_style(selection_style(theme))
        .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(app.settings_idx));
    frame.render_stateful_widget(table, chunks[0], &mut state);

    if let Some(path) = UiSettings::settings_path() {
        frame.render_widget(
            Paragraph::new(format!("Stored in {}", path.display()))
                .style(Style::default().fg(theme.dim)),
            chunks[1],
        );
    }
}

fn render_footer(frame: &mut Frame<'_>, app: &App, area: Rect, theme: &Theme) {
    let mut line = key_bar_line(
        theme,
        &[
            ("1-6", "sections"),
            ("?", "help"),
            ("Esc", "back"),
            ("q", "quit"),
        ],
    );

    if let Some(toast) = &app.toast {
        let (prefix, color) = match toast.kind {
            ToastKind::Info => ("info: ", theme.accent),
            ToastKind::Success => ("ok: ", theme.ok),
            ToastKind::Warning => ("warning: ", theme.warn),
            ToastKind::Error => ("error: ", theme.err),
        };
        line.spans.push(Span::raw("  "));
        line.spans
            .push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        line.spans.push(Span::raw(toast.message.clone()));
    }

    frame.render_widget(Paragraph::new(line), area);
}

fn visible_text_window(text: &str, cursor: usize, width: usize) -> (String, u16) {
    if width == 0 {
        return (String::new(), 0);
    }
    let chars = text.chars().collect::<Vec<_>>();
    let cursor = cursor.min(chars.len());

    let mut offsets = Vec::with_capacity(chars.len() + 1);
    offsets.push(0usize);
    for c in &chars {
        let w = UnicodeWidthChar::width(*c).unwrap_or(0);
        let last = offsets.last().copied().unwrap_or(0);
        offsets.push(last.saturating_add(w));
    }

    let cursor_x = offsets[cursor];
    let target = cursor_x.saturating_sub(width.saturating_sub(1));
    let start = offsets.iter().position(|&o| o >= target).unwrap_or(0);
    let mut end = start;
    while end < chars.len() && offsets[end + 1] - offsets[start] <= width {
        end += 1;
    }

    let visible = chars[start..end].iter().collect::<String>();
    let cursor_in_window = cursor_x - offsets[start];
    (visible, cursor_in_window.min(width) as u16)
}

fn edit_display_text(edit: &FieldEdit) -> String {
    if edit.is_secret() {
        "•".repeat(edit.draft.value.chars().count())
    } else {
        edit.draft.value.clone()
    }
}

fn overlay_block(title: impl Into<String>, theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(theme.accent))
        .title(title.into())
}

fn render_text_edit(
    frame: &mut Frame<'_>,
    content: Rect,
    theme: &Theme,
    title: String,
    hint: &str,
    edit: &FieldEdit,
) {
    let area = centered_rect_fixed(70, 8, content);
    frame.render_widget(Clear, area);
    let outer = overlay_block(title, theme);
    frame.render_widget(outer.clone(), area);
    let inner = outer.inner(area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(inner);

    render_key_bar_center(
        frame,
        chunks[0],
        theme,
        &[("Enter", "save"), ("Tab", "save + next"), ("Esc", "cancel")],
    );

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(theme.dim));
    let input_area = input_block.inner(chunks[1]);
    frame.render_widget(input_block, chunks[1]);

    let shown = edit_display_text(edit);
    let (visible, cursor_x) =
        visible_text_window(&shown, edit.draft.cursor, input_area.width as usize);
    frame.render_widget(Paragraph::new(visible), input_area);
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    frame.render_widget(
        Paragraph::new(hint.to_string()).style(Style::default().fg(theme.dim)),
        chunks[2],
    );
}

fn render_choice_list(
    frame: &mut Frame<'_>,
    content: Rect,
    theme: &Theme,
    title: String,
    choices: &[String],
    cursor: usize,
) {
    let height = (choices.len() as u16).saturating_add(3).clamp(5, 16);
    let area = centered_rect_fixed(44, height, content);
    frame.render_widget(Clear, area);
    let outer = overlay_block(title, theme);
    frame.render_widget(outer.clone(), area);
    let inner = outer.inner(area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);
    render_key_bar_center(
        frame,
        chunks[0],
        theme,
        &[("↑↓", "move"), ("Enter", "choose"), ("Esc", "cancel")],
    );

    let rows = choices.iter().map(|c| Row::new(vec![Cell::from(c.clone())]));
    let table = Table::new(rows, [Constraint::Min(10)])
        .row_highlight_style(selection_style(theme))
        .highlight_symbol(highlight_symbol(theme));
    let mut state = TableState::default();
    state.select(Some(cursor));
    frame.render_stateful_widget(table, chunks[1], &mut state);
}

fn render_overlay(frame: &mut Frame<'_>, app: &App, content: Rect, theme: &Theme) {
    match &app.overlay {
        Overlay::None => {}
        Overlay::Help => {
            let area = centered_rect(80, 85, content);
            frame.render_widget(Clear, area);
            let outer = overlay_block("Help", theme);
            frame.render_widget(outer.clone(), area);
            let inner = outer.inner(area);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(0)])
                .split(inner);
            render_key_bar_center(frame, chunks[0], theme, &[("Esc", "close")]);
            let lines = HELP_TEXT
                .lines()
                .map(|s| Line::raw(s.to_string()))
                .collect::<Vec<_>>();
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), chunks[1]);
        }
        Overlay::Dropdown(dropdown) => render_choice_list(
            frame,
            content,
            theme,
            format!("Select {}", dropdown.field.name),
            &dropdown.choices,
            dropdown.cursor,
        ),
        Overlay::AddMode(state) => render_choice_list(
            frame,
            content,
            theme,
            "Add provider".to_string(),
            &state.types,
            state.cursor,
        ),
        Overlay::FieldEdit(edit) => {
            let label = match &edit.target {
                crate::form::RowTarget::Name => "name".to_string(),
                crate::form::RowTarget::Field(field) => field.name.clone(),
                crate::form::RowTarget::Tags => "tags".to_string(),
            };
            let hint = if edit.is_secret() {
                "Input is hidden."
            } else {
                "Leave empty to remove the field."
            };
            render_text_edit(frame, content, theme, format!("Edit {label}"), hint, edit);
        }
        Overlay::TagEdit(edit) => render_text_edit(
            frame,
            content,
            theme,
            "Edit tags".to_string(),
            "Comma-separated; duplicates and blanks are dropped.",
            edit,
        ),
        Overlay::Confirm(confirm) => {
            let area = centered_rect_fixed(60, 7, content);
            frame.render_widget(Clear, area);
            let outer = overlay_block(confirm.title.clone(), theme);
            frame.render_widget(outer.clone(), area);
            let inner = outer.inner(area);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(0)])
                .split(inner);
            render_key_bar_center(
                frame,
                chunks[0],
                theme,
                &[("y/Enter", "yes"), ("n/Esc", "cancel")],
            );
            frame.render_widget(
                Paragraph::new(centered_message_lines(
                    &confirm.message,
                    chunks[1].width,
                    chunks[1].height,
                ))
                .alignment(Alignment::Center),
                chunks[1],
            );
        }
    }
}

fn centered_message_lines(message: &str, width: u16, height: u16) -> Vec<Line<'static>> {
    let lines = wrap_message_lines(message, width);
    let pad = height.saturating_sub(lines.len() as u16) / 2;
    let mut out = Vec::with_capacity(pad as usize + lines.len());
    out.extend((0..pad).map(|_| Line::raw("")));
    out.extend(lines.into_iter().map(Line::raw));
    out
}

fn wrap_message_lines(message: &str, width: u16) -> Vec<String> {
    let width = width as usize;
    if width == 0 {
        return vec![String::new()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for ch in message.chars() {
        if ch == '\n' {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
            continue;
        }
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0).max(1);
        if current_width + ch_width > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let width = width.min(r.width);
    let height = height.min(r.height);
    Rect {
        x: r.x + r.width.saturating_sub(width) / 2,
        y: r.y + r.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};
    use serde_json::json;
    use std::sync::Mutex;

    use crate::cli::tui::app::{App, Overlay, UiFlags};
    use crate::cli::tui::data::{Loadable, UiData};
    use crate::cli::tui::route::Route;
    use crate::form::{FieldEdit, RowTarget};
    use crate::probe::ProbeResult;
    use crate::schema::{FieldKind, FieldSchema, ProviderTypeSchema, SchemaSet};
    use crate::settings::ThemeMode;

    const SECRET: &str = "sk-live-abcdefghijkl-9876";

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        match ENV_LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn remove(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, prev }
        }

        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                None => std::env::remove_var(self.key),
                Some(v) => std::env::set_var(self.key, v),
            }
        }
    }

    fn render(app: &App, data: &UiData) -> Buffer {
        let backend = TestBackend::new(120, 40);
        let mut terminal = Terminal::new(backend).expect("terminal created");
        terminal
            .draw(|f| super::render(f, app, data))
            .expect("draw ok");
        terminal.backend().buffer().clone()
    }

    fn line_at(buf: &Buffer, y: u16) -> String {
        let mut out = String::new();
        for x in 0..buf.area.width {
            out.push_str(buf[(x, y)].symbol());
        }
        out
    }

    fn all_text(buf: &Buffer) -> String {
        let mut all = String::new();
        for y in 0..buf.area.height {
            all.push_str(&line_at(buf, y));
            all.push('\n');
        }
        all
    }

    fn sample_data() -> UiData {
        let mut api_key = FieldSchema::text("api_key");
        api_key.kind = FieldKind::Secret;
        api_key.required = true;
        let schemas = SchemaSet::new(vec![
            ProviderTypeSchema {
                type_name: "openai".into(),
                fields: vec![api_key, FieldSchema::text("model")],
            },
            ProviderTypeSchema {
                type_name: "ollama".into(),
                fields: vec![FieldSchema::text("host")],
            },
        ]);
        let mut data = UiData {
            schemas: Loadable::Ready(schemas),
            ..UiData::default()
        };
        let openai = data.catalog.add("openai", None);
        data.catalog
            .update(&openai, "api_key", json!(SECRET))
            .expect("api_key");
        data.catalog
            .update(&openai, "model", json!("gpt-4o-mini"))
            .expect("model");
        let ollama = data.catalog.add("ollama", None);
        data.catalog
            .set_tags(&ollama, vec!["local".into(), "fast".into()])
            .expect("tags");
        data.catalog.set_default(&openai).expect("default");
        data
    }

    fn app_at(route: Route) -> App {
        let mut app = App::new(UiFlags::default());
        app.navigate_to(Route::Providers);
        app.navigate_to(route);
        app
    }

    #[test]
    fn header_height_is_stable_across_flags_and_overlays() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let data = sample_data();

        let mut variants = Vec::new();
        let plain = app_at(Route::Providers);
        variants.push(plain.clone());
        let mut light = plain.clone();
        light.flags.theme = ThemeMode::Light;
        variants.push(light);
        let mut busy = plain.clone();
        busy.flags.animation = false;
        busy.begin_probe("p2");
        variants.push(busy);
        let mut with_help = plain.clone();
        with_help.overlay = Overlay::Help;
        variants.push(with_help);

        for app in &variants {
            let buf = render(app, &data);
            assert_eq!(buf[(0, 0)].symbol(), "┌");
            assert!(line_at(&buf, 1).contains("chi-tui"));
            assert_eq!(buf[(0, super::HEADER_HEIGHT - 1)].symbol(), "└");
            assert_eq!(buf[(0, super::HEADER_HEIGHT)].symbol(), "┌");
        }
    }

    #[test]
    fn header_shows_default_badge_and_unsaved_marker() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let data = sample_data();
        let buf = render(&app_at(Route::Providers), &data);
        let header = line_at(&buf, 1);
        assert!(header.contains("default: openai"));
        assert!(header.contains("[unsaved]"));
        assert!(header.contains("Welcome › Providers"));
    }

    #[test]
    fn providers_table_lists_rows_and_probe_outcome() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let mut data = sample_data();
        data.probe_results.insert(
            "p2".into(),
            ProbeResult {
                ok: true,
                status: Some(200),
                latency: None,
                message: "ollama: 0 tags".into(),
            },
        );
        let buf = render(&app_at(Route::Providers), &data);
        let text = all_text(&buf);
        assert!(text.contains("openai"));
        assert!(text.contains("local, fast") || text.contains("fast, local"));
        assert!(text.contains("ollama: 0 tags"));
        assert!(text.contains("★"));
    }

    #[test]
    fn secrets_are_never_rendered_in_full() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let data = sample_data();
        let mut app = app_at(Route::ProviderForm { id: "p1".into() });

        let text = all_text(&render(&app, &data));
        assert!(!text.contains(SECRET));
        assert!(!text.contains("9876"));
        assert!(text.contains("••••••••"));

        app.reveal_secrets = true;
        let text = all_text(&render(&app, &data));
        assert!(!text.contains(SECRET));
        assert!(text.contains("••••••••9876"));

        let provider = data.catalog.get("p1").cloned().expect("provider");
        let field = data
            .schema_set()
            .and_then(|s| s.get("openai"))
            .and_then(|s| s.field("api_key"))
            .cloned()
            .expect("field");
        app.reveal_secrets = false;
        app.overlay = Overlay::FieldEdit(FieldEdit::begin(&provider, 1, RowTarget::Field(field)));
        let text = all_text(&render(&app, &data));
        assert!(!text.contains(SECRET));
        assert!(!text.contains("9876"));
    }

    #[test]
    fn build_preview_masks_the_api_key() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let data = sample_data();
        let text = all_text(&render(&app_at(Route::Build), &data));
        assert!(text.contains("\"type\": \"openai\""));
        assert!(text.contains("gpt-4o-mini"));
        assert!(!text.contains(SECRET));
    }

    #[test]
    fn build_page_explains_missing_default() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let text = all_text(&render(&app_at(Route::Build), &UiData::default()));
        assert!(text.contains("no default provider selected"));
    }

    #[test]
    fn no_color_footer_uses_plain_key_pairs() {
        let _lock = lock_env();
        let _no_color = EnvGuard::set("NO_COLOR", "1");
        let buf = render(&App::new(UiFlags::default()), &UiData::default());
        let footer = line_at(&buf, buf.area.height - 1);
        assert!(footer.contains("q=quit"));
        assert!(footer.contains("?=help"));
    }

    #[test]
    fn welcome_lists_every_section() {
        let _lock = lock_env();
        let _no_color = EnvGuard::remove("NO_COLOR");
        let text = all_text(&render(&App::new(UiFlags::default()), &UiData::default()));
        for label in [
            "Configure Providers",
            "Select Default",
            "Model Browser",
            "Build Configuration",
            "Diagnostics",
            "Settings",
            "Quit",
        ] {
            assert!(text.contains(label), "missing {label}");
        }
    }

    #[test]
    fn text_window_follows_cursor() {
        let (visible, cursor) = super::visible_text_window("abcdefghij", 10, 4);
        assert_eq!(visible, "hij");
        assert_eq!(cursor, 3);
        let (visible, cursor) = super::visible_text_window("abc", 1, 10);
        assert_eq!(visible, "abc");
        assert_eq!(cursor, 1);
    }

    #[test]
    fn wrap_message_lines_breaks_on_width_and_newlines() {
        let lines = super::wrap_message_lines("abcdef\ngh", 4);
        assert_eq!(lines, vec!["abcd", "ef", "gh"]);
    }
}
