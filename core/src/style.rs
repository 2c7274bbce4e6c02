use colored::{Color, ColoredString, Colorize};

use crate::testing::Status;

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        println!("{}", $crate::style::paint(format!($($arg)*), {
            use $crate::style::SemanticColor as _;
            $crate::style::Palette.error()
        }))
    }
}

pub trait SemanticColor {
    fn level(&self, level: log::Level) -> Color {
        use log::Level::*;
        match level {
            Error => self.error(),
            Warn => self.warn(),
            Info => self.info(),
            Debug => self.debug(),
            Trace => self.trace(),
        }
    }

    fn error(&self) -> Color;
    fn warn(&self) -> Color;
    fn info(&self) -> Color;
    fn debug(&self) -> Color;
    fn trace(&self) -> Color;
    fn success(&self) -> Color;
}

pub struct Palette;

impl SemanticColor for Palette {
    fn error(&self) -> Color {
        Color::Red
    }

    fn warn(&self) -> Color {
        Color::BrightYellow
    }

    fn info(&self) -> Color {
        Color::Cyan
    }

    fn debug(&self) -> Color {
        Color::Magenta
    }

    fn trace(&self) -> Color {
        Color::Blue
    }

    fn success(&self) -> Color {
        Color::Green
    }
}

/// Returns `text` rendered in `color`. Whether escape codes are emitted is
/// left to `colored`'s own terminal detection.
pub fn paint(text: impl AsRef<str>, color: Color) -> String {
    text.as_ref().color(color).to_string()
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for log::Level {
    fn color(&self) -> Color {
        Palette.level(*self)
    }
}

impl ColorTheme for Status {
    fn color(&self) -> Color {
        use Status::*;
        if !self::is_truecolor_supported() {
            return match self {
                OK => Color::Green,
                ANS => Color::Yellow,
                TLE => Color::Red,
                RTE => Color::Magenta,
            };
        }

        match self {
            OK => Color::TrueColor {
                r: 30,
                g: 180,
                b: 40,
            },
            ANS => Color::TrueColor {
                r: 210,
                g: 138,
                b: 4,
            },
            TLE => Color::TrueColor {
                r: 220,
                g: 42,
                b: 42,
            },
            RTE => Color::TrueColor {
                r: 171,
                g: 40,
                b: 200,
            },
        }
    }
}

pub fn status_icon(status: Status) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {} ", status)
        .on_color(status.color())
        .bold()
        .color(fg)
}
