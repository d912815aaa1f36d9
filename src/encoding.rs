//! 文字エンコーディング
//!
//! ASCII列の表示と文字入力のためのデコード/エンコード。マルチバイト文字は
//! 先頭バイト位置にだけ `Some` を返し、継続バイトは `None` にする。

use unicode_width::UnicodeWidthChar;

/// 表示・入力に使う文字エンコーディング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharEncoding {
    #[default]
    Utf8,
    Sjis,
    EucJp,
    Latin1,
}

impl CharEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            CharEncoding::Utf8 => "UTF-8",
            CharEncoding::Sjis => "Shift_JIS",
            CharEncoding::EucJp => "EUC-JP",
            CharEncoding::Latin1 => "Latin-1",
        }
    }

    /// 切替順（F2でのトグル用）
    pub fn next(&self) -> Self {
        match self {
            CharEncoding::Utf8 => CharEncoding::Sjis,
            CharEncoding::Sjis => CharEncoding::EucJp,
            CharEncoding::EucJp => CharEncoding::Latin1,
            CharEncoding::Latin1 => CharEncoding::Utf8,
        }
    }
}

/// デコードされた1文字
#[derive(Debug, Clone)]
pub struct DecodedChar {
    /// 画面に出す文字列（制御・不正バイトは "."）
    pub display: String,
    /// この文字が占めるバイト数
    pub byte_len: usize,
    /// 表示幅（全角は2）
    pub width: usize,
}

/// 文字を指定エンコーディングのバイト列へ変換する（不可能なら `None`）
pub fn encode_char(ch: char, encoding: CharEncoding) -> Option<Vec<u8>> {
    match encoding {
        CharEncoding::Utf8 => Some(ch.to_string().into_bytes()),
        CharEncoding::Latin1 => {
            let cp = ch as u32;
            (cp <= 0xFF).then(|| vec![cp as u8])
        }
        CharEncoding::Sjis => encode_with(encoding_rs::SHIFT_JIS, ch),
        CharEncoding::EucJp => encode_with(encoding_rs::EUC_JP, ch),
    }
}

fn encode_with(encoding: &'static encoding_rs::Encoding, ch: char) -> Option<Vec<u8>> {
    let s = ch.to_string();
    let (bytes, _, had_errors) = encoding.encode(&s);
    (!had_errors).then(|| bytes.into_owned())
}

/// 先頭バイトから推定した文字のバイト数
fn char_len(bytes: &[u8], encoding: CharEncoding) -> usize {
    let lead = bytes[0];
    match encoding {
        CharEncoding::Latin1 => 1,
        CharEncoding::Utf8 => match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 1,
        },
        CharEncoding::Sjis => match lead {
            0x81..=0x9F | 0xE0..=0xFC => 2,
            _ => 1,
        },
        CharEncoding::EucJp => match lead {
            0x8E => 2,
            0x8F => 3,
            0xA1..=0xFE => 2,
            _ => 1,
        },
    }
}

/// `bytes` の先頭1文字をデコードする
fn decode_one(bytes: &[u8], encoding: CharEncoding) -> Option<char> {
    match encoding {
        CharEncoding::Utf8 => std::str::from_utf8(bytes).ok()?.chars().next(),
        CharEncoding::Latin1 => char::from_u32(bytes[0] as u32),
        CharEncoding::Sjis | CharEncoding::EucJp => {
            let table = if encoding == CharEncoding::Sjis {
                encoding_rs::SHIFT_JIS
            } else {
                encoding_rs::EUC_JP
            };
            let (s, had_errors) = table.decode_without_bom_handling(bytes);
            if had_errors {
                return None;
            }
            s.chars().next()
        }
    }
}

fn placeholder() -> DecodedChar {
    DecodedChar { display: ".".to_string(), byte_len: 1, width: 1 }
}

/// バイト列を表示用にデコードする
///
/// 戻り値は入力と同じ長さで、文字の先頭バイト位置にだけ `Some` を持つ。
/// デコードできないバイト・制御文字は1バイトずつ "." になる。
pub fn decode_for_display(bytes: &[u8], encoding: CharEncoding) -> Vec<Option<DecodedChar>> {
    let mut out: Vec<Option<DecodedChar>> = vec![None; bytes.len()];
    let mut pos = 0;
    while pos < bytes.len() {
        let len = char_len(&bytes[pos..], encoding);
        if pos + len > bytes.len() {
            // 末尾で途切れたマルチバイト文字
            out[pos] = Some(placeholder());
            pos += 1;
            continue;
        }
        match decode_one(&bytes[pos..pos + len], encoding) {
            Some(ch) if !ch.is_control() && ch != '\u{FFFD}' => {
                out[pos] = Some(DecodedChar {
                    display: ch.to_string(),
                    byte_len: len,
                    width: ch.width().unwrap_or(1).max(1),
                });
                pos += len;
            }
            _ => {
                out[pos] = Some(placeholder());
                pos += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trip() {
        assert_eq!(encode_char('A', CharEncoding::Utf8), Some(vec![0x41]));
        assert_eq!(encode_char('A', CharEncoding::Sjis), Some(vec![0x41]));
        let decoded = decode_for_display(b"Hi", CharEncoding::Utf8);
        assert_eq!(decoded[0].as_ref().unwrap().display, "H");
        assert_eq!(decoded[1].as_ref().unwrap().display, "i");
    }

    #[test]
    fn utf8_multibyte_marks_lead_only() {
        let bytes = "あ!".as_bytes(); // 3バイト + 1バイト
        let decoded = decode_for_display(bytes, CharEncoding::Utf8);
        let lead = decoded[0].as_ref().unwrap();
        assert_eq!(lead.display, "あ");
        assert_eq!(lead.byte_len, 3);
        assert_eq!(lead.width, 2);
        assert!(decoded[1].is_none());
        assert!(decoded[2].is_none());
        assert_eq!(decoded[3].as_ref().unwrap().display, "!");
    }

    #[test]
    fn control_and_invalid_bytes_become_dots() {
        let decoded = decode_for_display(&[0x00, 0xFF, 0x0A], CharEncoding::Utf8);
        for entry in &decoded {
            assert_eq!(entry.as_ref().unwrap().display, ".");
        }
    }

    #[test]
    fn latin1_cannot_encode_wide_chars() {
        assert_eq!(encode_char('é', CharEncoding::Latin1), Some(vec![0xE9]));
        assert_eq!(encode_char('あ', CharEncoding::Latin1), None);
    }

    #[test]
    fn truncated_multibyte_at_end() {
        let bytes = &"あ".as_bytes()[..2]; // 先頭2バイトだけ
        let decoded = decode_for_display(bytes, CharEncoding::Utf8);
        assert_eq!(decoded[0].as_ref().unwrap().display, ".");
        assert_eq!(decoded[1].as_ref().unwrap().display, ".");
    }
}
