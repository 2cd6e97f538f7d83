use ratatui::style::Color;

use crate::config::Settings;

#[derive(Clone, Copy, Debug)]
pub struct TuiTheme {
    pub highlight_fg: Color,
    pub highlight_bg: Color,
    pub border_fg: Color,
    pub help_fg: Color,
}

impl Default for TuiTheme {
    fn default() -> Self {
        Self {
            highlight_fg: Color::Black,
            highlight_bg: Color::Cyan,
            border_fg: Color::Gray,
            help_fg: Color::Yellow,
        }
    }
}

/// Colors from the `[tui]` section; unknown or missing values keep the default.
pub fn from_settings(settings: &Settings) -> TuiTheme {
    let mut theme = TuiTheme::default();
    let Some(tui) = &settings.tui else {
        return theme;
    };
    let pick = |v: &Option<String>, fallback: Color| v.as_deref().and_then(parse_color).unwrap_or(fallback);
    theme.highlight_fg = pick(&tui.highlight_fg, theme.highlight_fg);
    theme.highlight_bg = pick(&tui.highlight_bg, theme.highlight_bg);
    theme.border_fg = pick(&tui.border_fg, theme.border_fg);
    theme.help_fg = pick(&tui.help_fg, theme.help_fg);
    theme
}

pub fn parse_color(s: &str) -> Option<Color> {
    let k = s.trim().to_ascii_lowercase();
    match k.as_str() {
        "black" => Some(Color::Black),
        "red" => Some(Color::Red),
        "green" => Some(Color::Green),
        "yellow" => Some(Color::Yellow),
        "blue" => Some(Color::Blue),
        "magenta" => Some(Color::Magenta),
        "cyan" => Some(Color::Cyan),
        "white" => Some(Color::White),
        "gray" | "grey" => Some(Color::Gray),
        "darkgray" | "darkgrey" => Some(Color::DarkGray),
        _ => {
            if let Some(hex) = k.strip_prefix('#') {
                return parse_hex(hex);
            }
            if let Some(rest) = k.strip_prefix("rgb(") {
                return parse_rgb_tuple(rest);
            }
            None
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

fn parse_rgb_tuple(rest: &str) -> Option<Color> {
    let t = rest.strip_suffix(')')?;
    let parts: Vec<_> = t.split(',').map(|p| p.trim()).collect();
    if parts.len() != 3 {
        return None;
    }
    let r = parts[0].parse::<u8>().ok()?;
    let g = parts[1].parse::<u8>().ok()?;
    let b = parts[2].parse::<u8>().ok()?;
    Some(Color::Rgb(r, g, b))
}
