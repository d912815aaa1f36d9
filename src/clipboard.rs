//! クリップボード連携
//!
//! システムクリップボード（arboard）と OSC 52（リモートターミナル向け）の
//! 両方へコピーする。どちらか片方が使えない環境でも他方は生かす。

use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// HEXテキストの整形方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HexFormat {
    /// "DE AD BE EF"
    #[default]
    Spaced,
    /// "DEADBEEF"
    Packed,
}

/// バイト列をHEXテキストにする
pub fn format_hex(data: &[u8], format: HexFormat) -> String {
    let parts: Vec<String> = data.iter().map(|b| format!("{b:02X}")).collect();
    match format {
        HexFormat::Spaced => parts.join(" "),
        HexFormat::Packed => parts.concat(),
    }
}

/// バイト列をHEXテキストとして両方のクリップボードへコピーする
pub fn copy_hex_to_all(data: &[u8], format: HexFormat) -> Result<()> {
    copy_text_to_all(&format_hex(data, format))
}

/// テキストを両方のクリップボードへコピーする
pub fn copy_text_to_all(text: &str) -> Result<()> {
    // システムクリップボードはヘッドレス環境で失敗しうるので無視
    if let Ok(mut clipboard) = arboard::Clipboard::new() {
        let _ = clipboard.set_text(text.to_string());
    }

    // OSC 52: ターミナル経由のクリップボード設定
    let mut out = io::stdout();
    write!(out, "\x1b]52;c;{}\x07", STANDARD.encode(text))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formats() {
        assert_eq!(format_hex(&[0xDE, 0xAD], HexFormat::Spaced), "DE AD");
        assert_eq!(format_hex(&[0xDE, 0xAD], HexFormat::Packed), "DEAD");
        assert_eq!(format_hex(&[], HexFormat::Spaced), "");
    }
}
