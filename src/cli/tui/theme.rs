use ratatui::style::Color;

use crate::settings::ThemeMode;

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub mode: ThemeMode,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub err: Color,
    pub dim: Color,
    pub fg: Color,
    pub no_color: bool,
}

fn no_color_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty())
}

pub fn theme_for(mode: ThemeMode) -> Theme {
    let no_color = no_color_requested();
    if no_color {
        return Theme {
            mode,
            accent: Color::Reset,
            ok: Color::Reset,
            warn: Color::Reset,
            err: Color::Reset,
            dim: Color::Reset,
            fg: Color::Reset,
            no_color,
        };
    }

    match mode {
        ThemeMode::Dark => Theme {
            mode,
            accent: Color::Rgb(255, 0, 153),
            ok: Color::Rgb(80, 250, 123),
            warn: Color::Rgb(255, 184, 108),
            err: Color::Rgb(255, 85, 85),
            dim: Color::Rgb(120, 80, 200),
            fg: Color::Rgb(220, 220, 235),
            no_color,
        },
        ThemeMode::Light => Theme {
            mode,
            accent: Color::Rgb(0, 102, 204),
            ok: Color::Rgb(0, 128, 0),
            warn: Color::Rgb(176, 96, 0),
            err: Color::Rgb(192, 0, 0),
            dim: Color::Gray,
            fg: Color::Black,
            no_color,
        },
    }
}
