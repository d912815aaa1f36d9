mod hex_view;

pub use hex_view::{HexView, ViewMode};

use ratatui::style::Color;

/// カラーパレット
pub struct Colors;

impl Colors {
    pub const ADDR: Color = Color::DarkGray;
    pub const HEADER: Color = Color::Cyan;
    /// 0x00
    pub const HEX_ZERO: Color = Color::DarkGray;
    /// 0xFF
    pub const HEX_HIGH: Color = Color::Yellow;
    /// 印字可能 (0x20-0x7E)
    pub const HEX_PRINTABLE: Color = Color::Green;
    pub const HEX_NORMAL: Color = Color::White;
    /// 編集済みバイト
    pub const HEX_CHANGED: Color = Color::Red;
    pub const ASCII_NORMAL: Color = Color::Gray;
    pub const CURSOR: Color = Color::Black;
    pub const CURSOR_BG: Color = Color::Cyan;
    pub const SELECTION_BG: Color = Color::Blue;
}
