//! バイト列検索
//!
//! チャンク境界をまたぐマッチを拾えるよう、ブロック窓を `needle長-1` だけ
//! 重ねながら `data` 経由で走査する。バッファ全体を一度にメモリへ並べる
//! ことはない。

use super::{BufferError, ChunkedBuffer, Document, IO_BLOCK};

/// 前方・後方のバイトパターン検索
pub struct SearchEngine {
    /// 1回の走査で読む窓の基本サイズ
    block: usize,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self { block: IO_BLOCK }
    }

    /// 窓サイズを指定して作る（小さくすると境界処理を踏みやすくなる）
    pub fn with_block(block: usize) -> Self {
        Self { block: block.max(1) }
    }

    /// `from` 以降で最初に `needle` が現れるバイト位置
    pub fn index_of(
        &self,
        buffer: &ChunkedBuffer,
        needle: &[u8],
        from: u64,
    ) -> Result<Option<u64>, BufferError> {
        let size = buffer.size();
        let len = needle.len() as u64;
        if needle.is_empty() || size < len {
            return Ok(None);
        }

        let mut base = from;
        while base + len <= size {
            let window = (self.block as u64 + len - 1).min(size - base);
            let data = buffer.data(base, window)?;
            if let Some(found) = data.windows(needle.len()).position(|w| w == needle) {
                return Ok(Some(base + found as u64));
            }
            base += self.block as u64;
        }
        Ok(None)
    }

    /// `from` 以前で最後に `needle` が現れるバイト位置
    pub fn last_index_of(
        &self,
        buffer: &ChunkedBuffer,
        needle: &[u8],
        from: u64,
    ) -> Result<Option<u64>, BufferError> {
        let size = buffer.size();
        let len = needle.len() as u64;
        if needle.is_empty() || size < len {
            return Ok(None);
        }

        // マッチ開始が from 以前 ⇔ マッチ末尾が from+len 以前
        let mut block_end = (from.saturating_add(len)).min(size);
        loop {
            let block_start = block_end.saturating_sub(self.block as u64 + len - 1);
            let data = buffer.data(block_start, block_end - block_start)?;
            if let Some(found) = data.windows(needle.len()).rposition(|w| w == needle) {
                return Ok(Some(block_start + found as u64));
            }
            if block_start == 0 {
                return Ok(None);
            }
            block_end = block_start + len - 1;
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 全置換
///
/// 前回マッチの置換後位置から `index_of` を繰り返し、各マッチを1コマンドの
/// 置換としてUndoスタックへ積む。置換後バイト列が空でも最低1バイトは
/// 前進させるので必ず停止する。空の検索パターンは何もせず0を返す。
/// 戻り値は置換した件数。
pub fn replace_all(
    document: &mut Document,
    needle: &[u8],
    replacement: &[u8],
) -> Result<u64, BufferError> {
    if needle.is_empty() {
        return Ok(0);
    }
    let engine = SearchEngine::new();
    let mut from = 0u64;
    let mut count = 0u64;
    while let Some(pos) = engine.index_of(document.buffer(), needle, from)? {
        document.replace_bytes(pos, needle.len() as u64, replacement)?;
        from = pos + (replacement.len() as u64).max(1);
        count += 1;
    }
    tracing::debug!(count, "replace_all finished");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemSource;

    fn buffer(bytes: &[u8]) -> ChunkedBuffer {
        ChunkedBuffer::from_source(Box::new(MemSource::new(bytes.to_vec())))
    }

    #[test]
    fn forward_and_backward_basics() {
        // AA BB AA CC AA
        let buf = buffer(&[0xAA, 0xBB, 0xAA, 0xCC, 0xAA]);
        let engine = SearchEngine::new();
        assert_eq!(engine.index_of(&buf, &[0xAA], 0).unwrap(), Some(0));
        assert_eq!(engine.index_of(&buf, &[0xAA], 1).unwrap(), Some(2));
        assert_eq!(engine.last_index_of(&buf, &[0xAA], 4).unwrap(), Some(4));
        assert_eq!(engine.index_of(&buf, &[0xAA], 5).unwrap(), None);
        assert_eq!(engine.last_index_of(&buf, &[0xAA], 1).unwrap(), Some(0));
        assert_eq!(engine.index_of(&buf, &[0xDD], 0).unwrap(), None);
    }

    #[test]
    fn empty_needle_finds_nothing() {
        let buf = buffer(b"abc");
        let engine = SearchEngine::new();
        assert_eq!(engine.index_of(&buf, &[], 0).unwrap(), None);
        assert_eq!(engine.last_index_of(&buf, &[], 2).unwrap(), None);
    }

    #[test]
    fn needle_across_chunk_boundary() {
        // 挿入でチャンクを割ってから、境界をまたぐパターンを探す
        let mut buf = buffer(b"abcdefgh");
        buf.insert_bytes(4, b"XY").unwrap(); // abcd XY efgh（3チャンク）
        assert!(buf.chunk_count() > 1);
        let engine = SearchEngine::new();
        assert_eq!(engine.index_of(&buf, b"dXYe", 0).unwrap(), Some(3));
        assert_eq!(engine.last_index_of(&buf, b"dXYe", 9).unwrap(), Some(3));
    }

    #[test]
    fn needle_across_block_boundary() {
        // 窓サイズより小さい刻みで重なりが効いているか
        let mut bytes = vec![0u8; 20];
        bytes[9] = b'N';
        bytes[10] = b'E';
        bytes[11] = b'X';
        let buf = buffer(&bytes);
        let engine = SearchEngine::with_block(4);
        assert_eq!(engine.index_of(&buf, b"NEX", 0).unwrap(), Some(9));
        assert_eq!(engine.last_index_of(&buf, b"NEX", 19).unwrap(), Some(9));
    }

    #[test]
    fn agrees_with_naive_scan() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 7 % 5) as u8).collect();
        let buf = buffer(&data);
        let engine = SearchEngine::with_block(16);
        let needle = [4u8, 1, 3];
        let naive: Vec<usize> = data
            .windows(needle.len())
            .enumerate()
            .filter(|(_, w)| *w == needle)
            .map(|(i, _)| i)
            .collect();
        // 前方走査を連鎖させると全マッチが順に出る
        let mut found = Vec::new();
        let mut from = 0u64;
        while let Some(pos) = engine.index_of(&buf, &needle, from).unwrap() {
            found.push(pos as usize);
            from = pos + 1;
        }
        assert_eq!(found, naive);
        // 後方検索は任意の起点で直近のマッチに一致する
        for start in [0usize, 50, 120, 199] {
            let expected = naive.iter().rev().find(|&&p| p <= start).copied();
            assert_eq!(
                engine
                    .last_index_of(&buf, &needle, start as u64)
                    .unwrap()
                    .map(|p| p as usize),
                expected
            );
        }
    }

    #[test]
    fn replace_all_longer_replacement() {
        // AA BB AA CC AA → 00 00 BB 00 00 CC 00 00
        let mut doc = Document::from_bytes(vec![0xAA, 0xBB, 0xAA, 0xCC, 0xAA]);
        let count = replace_all(&mut doc, &[0xAA], &[0x00, 0x00]).unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            doc.data(0, u64::MAX).unwrap(),
            &[0x00, 0x00, 0xBB, 0x00, 0x00, 0xCC, 0x00, 0x00]
        );
        // 1件ずつ積まれているので3回のUndoで元へ戻る
        for _ in 0..3 {
            doc.undo().unwrap();
        }
        assert_eq!(doc.data(0, u64::MAX).unwrap(), &[0xAA, 0xBB, 0xAA, 0xCC, 0xAA]);
    }

    #[test]
    fn replace_all_empty_replacement_terminates() {
        let mut doc = Document::from_bytes(vec![0xAA, 0xBB, 0xAA]);
        let count = replace_all(&mut doc, &[0xAA], &[]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(doc.data(0, u64::MAX).unwrap(), &[0xBB]);
    }

    #[test]
    fn replace_all_self_embedding_replacement_terminates() {
        // 置換後の列に検索パターンが含まれても前進する
        let mut doc = Document::from_bytes(vec![0xAA]);
        let count = replace_all(&mut doc, &[0xAA], &[0xAA, 0xAA]).unwrap();
        assert_eq!(count, 1);
        assert_eq!(doc.data(0, u64::MAX).unwrap(), &[0xAA, 0xAA]);
    }

    #[test]
    fn replace_all_empty_needle_is_noop() {
        let mut doc = Document::from_bytes(b"abc".to_vec());
        assert_eq!(replace_all(&mut doc, &[], &[0x00]).unwrap(), 0);
        assert_eq!(doc.data(0, u64::MAX).unwrap(), b"abc");
    }
}
