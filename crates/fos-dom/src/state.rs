//! Live element state
//!
//! The part of an element a user can change without touching markup.

/// Text selection inside a form control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Collapsed caret at `offset`
    pub fn caret(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }
}

/// Scroll offsets of an element or the window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollOffset {
    pub top: f32,
    pub left: f32,
}

impl ScrollOffset {
    pub fn new(top: f32, left: f32) -> Self {
        Self { top, left }
    }

    /// Either axis scrolled
    pub fn is_scrolled(&self) -> bool {
        self.top != 0.0 || self.left != 0.0
    }
}

/// Properties held next to the attributes of an element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementState {
    /// Form value, `None` follows the `value` attribute
    pub value: Option<String>,
    /// Checkedness, `None` follows the `checked` attribute
    pub checked: Option<bool>,
    /// Caret / selection inside text controls
    pub selection: Option<Selection>,
    /// Selected option index of a select, `None` follows the `selected`
    /// attributes of its options
    pub selected_index: Option<usize>,
    /// Open state of details, `None` follows the `open` attribute
    pub open: Option<bool>,
    /// Media playback position in seconds
    pub current_time: f64,
    /// Media is playing
    pub playing: bool,
    /// Overflow scroll
    pub scroll: ScrollOffset,
}
