//! Console styles shared by the renderers.
//!
//! Renderers refer to these by meaning (a title, a timestamp) and never pick
//! colors themselves. `console` drops the styling when stdout is not a terminal.

use console::Style;

pub fn title() -> Style {
    Style::new().bold()
}

pub fn muted() -> Style {
    Style::new().dim()
}

pub fn id() -> Style {
    Style::new().yellow()
}

pub fn success() -> Style {
    Style::new().green()
}

pub fn warning() -> Style {
    Style::new().red().bold()
}

pub fn tag() -> Style {
    Style::new().cyan()
}
