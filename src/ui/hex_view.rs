//! HEX/ASCII表示ウィジェット
//!
//! バッファ全体ではなく、表示に必要な窓だけを受け取って描画する。
//! `marked` は窓と同じ長さの変更フラグ列で、編集済みバイトの着色に使う。

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};

use super::Colors;
use crate::encoding::{decode_for_display, CharEncoding};

/// フォーカス中の列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Hex,
    Ascii,
}

/// HEXビューウィジェット
pub struct HexView<'a> {
    /// 表示窓のデータ
    data: &'a [u8],
    /// 窓内バイトの変更フラグ
    marked: &'a [bool],
    /// 窓先頭の論理オフセット
    window_start: u64,
    /// バッファ全体のサイズ（EOFカーソル描画用）
    total_size: u64,
    /// 1行あたりのバイト数
    bytes_per_row: usize,
    /// カーソルのバイト位置
    cursor: u64,
    /// 0=上位ニブル、1=下位ニブル
    cursor_nibble: u8,
    /// 選択範囲 `[begin, end)`
    selection: Option<(u64, u64)>,
    /// フォーカス列
    mode: ViewMode,
    /// 文字エンコーディング
    encoding: CharEncoding,
    /// オフセット桁数
    addr_width: usize,
}

impl<'a> HexView<'a> {
    pub fn new(data: &'a [u8], marked: &'a [bool]) -> Self {
        Self {
            data,
            marked,
            window_start: 0,
            total_size: data.len() as u64,
            bytes_per_row: 16,
            cursor: 0,
            cursor_nibble: 0,
            selection: None,
            mode: ViewMode::Hex,
            encoding: CharEncoding::Utf8,
            addr_width: 8,
        }
    }

    pub fn window_start(mut self, offset: u64) -> Self {
        self.window_start = offset;
        self
    }

    pub fn total_size(mut self, size: u64) -> Self {
        self.total_size = size;
        self
    }

    pub fn bytes_per_row(mut self, bytes: usize) -> Self {
        self.bytes_per_row = bytes.max(1);
        self
    }

    pub fn cursor(mut self, byte: u64, nibble: u8) -> Self {
        self.cursor = byte;
        self.cursor_nibble = nibble;
        self
    }

    pub fn selection(mut self, selection: Option<(u64, u64)>) -> Self {
        self.selection = selection;
        self
    }

    pub fn mode(mut self, mode: ViewMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn encoding(mut self, encoding: CharEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn addr_width(mut self, width: usize) -> Self {
        self.addr_width = width.clamp(4, 16);
        self
    }

    fn byte_color(byte: u8) -> ratatui::style::Color {
        match byte {
            0x00 => Colors::HEX_ZERO,
            0xFF => Colors::HEX_HIGH,
            0x20..=0x7E => Colors::HEX_PRINTABLE,
            _ => Colors::HEX_NORMAL,
        }
    }

    fn in_selection(&self, abs: u64) -> bool {
        self.selection.is_some_and(|(begin, end)| abs >= begin && abs < end)
    }

    /// 窓内インデックス `rel` のバイトの基本スタイル
    fn hex_style(&self, abs: u64, rel: usize) -> Style {
        let byte = self.data[rel];
        let mut style = Style::default().fg(if self.marked.get(rel).copied().unwrap_or(false) {
            Colors::HEX_CHANGED
        } else {
            Self::byte_color(byte)
        });
        if self.in_selection(abs) {
            style = style.bg(Colors::SELECTION_BG);
        }
        style
    }

    /// 行頭が前の行から続くマルチバイト文字の途中なら、その継続バイト数
    fn continuation_bytes(&self, row_rel: usize) -> usize {
        if row_rel == 0 {
            return 0;
        }
        let lookbehind = 4.min(row_rel);
        let slice = &self.data[row_rel - lookbehind..(row_rel + 4).min(self.data.len())];
        let decoded = decode_for_display(slice, self.encoding);
        let mut idx = 0;
        while idx < lookbehind {
            match &decoded[idx] {
                Some(dc) => idx += dc.byte_len,
                None => idx += 1,
            }
        }
        idx - lookbehind
    }

    fn render_row(&self, row: usize, area: Rect, buf: &mut Buffer) {
        let row_start = self.window_start + (row * self.bytes_per_row) as u64;
        let cursor_at_eof = self.cursor == self.total_size;
        if row_start > self.total_size {
            return;
        }
        if row_start >= self.total_size && !cursor_at_eof {
            return;
        }

        let mut x = area.x;
        let y = area.y;

        // オフセット列
        let addr = format!("{:0width$X}", row_start, width = self.addr_width);
        buf.set_string(x, y, &addr, Style::default().fg(Colors::ADDR));
        x += addr.len() as u16 + 2;

        // HEX列
        for col in 0..self.bytes_per_row {
            let abs = row_start + col as u64;
            let rel = (abs - self.window_start) as usize;
            if rel < self.data.len() {
                let hex = format!("{:02X}", self.data[rel]);
                if abs == self.cursor && self.mode == ViewMode::Hex {
                    // アクティブなニブルに下線を引く
                    let cell = Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR);
                    for (i, ch) in hex.chars().enumerate() {
                        let style = if i == self.cursor_nibble as usize {
                            cell.add_modifier(Modifier::UNDERLINED)
                        } else {
                            cell
                        };
                        buf.set_string(x + i as u16, y, ch.to_string(), style);
                    }
                } else {
                    buf.set_string(x, y, &hex, self.hex_style(abs, rel));
                }
            } else if abs == self.total_size && cursor_at_eof && self.mode == ViewMode::Hex {
                // EOF位置のカーソル
                buf.set_string(
                    x,
                    y,
                    "__",
                    Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR),
                );
            }
            x += 3;
        }

        x += 1;

        // ASCII列
        let row_rel = (row_start - self.window_start) as usize;
        if row_rel >= self.data.len() {
            if cursor_at_eof && self.mode == ViewMode::Ascii {
                buf.set_string(x, y, "_", Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR));
            }
            return;
        }
        // 前の行からはみ出した文字の継続バイトはスペースにする
        let skip = self.continuation_bytes(row_rel);
        // 行末で切れる文字のために少し先まで含めてデコードする
        let decode_end = (row_rel + self.bytes_per_row + 4).min(self.data.len());
        let decoded = decode_for_display(&self.data[row_rel..decode_end], self.encoding);

        let mut col = skip;
        x += skip as u16;
        while col < self.bytes_per_row && row_rel + col < self.data.len() {
            let abs = row_start + col as u64;
            let Some(dc) = decoded[col].as_ref() else {
                x += 1;
                col += 1;
                continue;
            };
            let mut style = Style::default().fg(Colors::ASCII_NORMAL);
            let cursor_in_char = self.cursor >= abs && self.cursor < abs + dc.byte_len as u64;
            if cursor_in_char && self.mode == ViewMode::Ascii {
                style = style.bg(Colors::CURSOR_BG).fg(Colors::CURSOR);
            } else if self.in_selection(abs) {
                style = style.bg(Colors::SELECTION_BG);
            } else if self.marked.get(row_rel + col).copied().unwrap_or(false) {
                style = style.fg(Colors::HEX_CHANGED);
            }
            buf.set_string(x, y, &dc.display, style);
            x += dc.width.max(1) as u16;
            col += dc.byte_len.max(1);
        }
        if cursor_at_eof
            && self.mode == ViewMode::Ascii
            && self.cursor >= row_start
            && self.cursor < row_start + self.bytes_per_row as u64
        {
            buf.set_string(x, y, "_", Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR));
        }
    }
}

impl Widget for HexView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }
        // ヘッダー行
        let header = format!(
            "{:width$}  {}  {}",
            "Offset",
            (0..self.bytes_per_row)
                .map(|i| format!("{i:02X}"))
                .collect::<Vec<_>>()
                .join(" "),
            "ASCII",
            width = self.addr_width,
        );
        buf.set_string(
            area.x,
            area.y,
            &header,
            Style::default().fg(Colors::HEADER).add_modifier(Modifier::BOLD),
        );

        let visible_rows = (area.height as usize).saturating_sub(1);
        for row in 0..visible_rows {
            let row_area = Rect {
                x: area.x,
                y: area.y + 1 + row as u16,
                width: area.width,
                height: 1,
            };
            self.render_row(row, row_area, buf);
        }
    }
}
