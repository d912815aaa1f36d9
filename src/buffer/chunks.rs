//! チャンク化バイトバッファ
//!
//! 論理ストリーム `[0, size)` を隙間・重複なしのチャンク列で分割して持つ。
//! 未編集領域はソース上の範囲参照（クリーン）のままで、編集が入った領域だけ
//! メモリ上のバイト列（ダーティ）になる。挿入・削除は該当チャンクの分割と
//! 後続チャンクの開始オフセット移動だけで済み、バッファ全体の書き直しは
//! 発生しない。ソースへ触るのは読み取りと `write` によるストリーム出力のみ。

use std::io::{self, Write};

use super::{ByteSource, BufferError, MemSource, IO_BLOCK};

/// チャンクの中身
enum Payload {
    /// 未編集：バッキングソース上の `[src, src+len)` を参照する
    Clean { src: u64, len: u64 },
    /// 編集済み：メモリ上のバイト列と、バイト単位の変更フラグ
    Dirty { bytes: Vec<u8>, changed: Vec<bool> },
}

impl Payload {
    fn len(&self) -> u64 {
        match self {
            Payload::Clean { len, .. } => *len,
            Payload::Dirty { bytes, .. } => bytes.len() as u64,
        }
    }

    /// `at` 以降を新しいペイロードとして切り離す
    fn split_off(&mut self, at: u64) -> Payload {
        match self {
            Payload::Clean { src, len } => {
                let tail = Payload::Clean {
                    src: *src + at,
                    len: *len - at,
                };
                *len = at;
                tail
            }
            Payload::Dirty { bytes, changed } => Payload::Dirty {
                bytes: bytes.split_off(at as usize),
                changed: changed.split_off(at as usize),
            },
        }
    }
}

struct Chunk {
    /// 論理ストリーム上の開始オフセット
    start: u64,
    payload: Payload,
}

impl Chunk {
    fn len(&self) -> u64 {
        self.payload.len()
    }

    fn end(&self) -> u64 {
        self.start + self.len()
    }
}

/// チャンク化バッファ本体
pub struct ChunkedBuffer {
    source: Box<dyn ByteSource>,
    chunks: Vec<Chunk>,
    size: u64,
}

impl ChunkedBuffer {
    /// 空のバッファを作る
    pub fn new() -> Self {
        Self {
            source: Box::new(MemSource::new(Vec::new())),
            chunks: Vec::new(),
            size: 0,
        }
    }

    /// ソースからバッファを作る
    pub fn from_source(source: Box<dyn ByteSource>) -> Self {
        let mut buffer = Self::new();
        buffer.set_source(source);
        buffer
    }

    /// ソースを差し替え、チャンク列を作り直す
    ///
    /// Undo履歴はこのバッファの管轄外なので、呼び出し側が合わせて捨てること。
    pub fn set_source(&mut self, source: Box<dyn ByteSource>) {
        let size = source.len();
        self.source = source;
        self.size = size;
        self.chunks.clear();
        if size > 0 {
            self.chunks.push(Chunk {
                start: 0,
                payload: Payload::Clean { src: 0, len: size },
            });
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// `pos` を含むチャンクのインデックス（`pos < size` 前提）
    fn find_index(&self, pos: u64) -> usize {
        self.chunks.partition_point(|c| c.start <= pos) - 1
    }

    /// `pos` にチャンク境界を作り、そこから始まる最初のチャンクの
    /// インデックスを返す
    fn split_at(&mut self, pos: u64) -> usize {
        if pos == 0 {
            return 0;
        }
        if pos == self.size {
            return self.chunks.len();
        }
        let idx = self.find_index(pos);
        if self.chunks[idx].start == pos {
            return idx;
        }
        let rel = pos - self.chunks[idx].start;
        let tail = self.chunks[idx].payload.split_off(rel);
        self.chunks.insert(idx + 1, Chunk { start: pos, payload: tail });
        idx + 1
    }

    /// `idx-1` と `idx` が接するダーティ同士・連続クリーン同士なら結合する
    fn coalesce_at(&mut self, idx: usize) {
        if idx == 0 || idx >= self.chunks.len() {
            return;
        }
        let (left, right) = self.chunks.split_at_mut(idx);
        let (Some(prev), Some(next)) = (left.last_mut(), right.first_mut()) else {
            return;
        };
        if prev.end() != next.start {
            return;
        }
        let merged = match (&mut prev.payload, &mut next.payload) {
            (
                Payload::Dirty { bytes, changed },
                Payload::Dirty { bytes: nb, changed: nc },
            ) => {
                bytes.append(nb);
                changed.append(nc);
                true
            }
            (
                Payload::Clean { src, len },
                Payload::Clean { src: nsrc, len: nlen },
            ) if *src + *len == *nsrc => {
                *len += *nlen;
                true
            }
            _ => false,
        };
        if merged {
            self.chunks.remove(idx);
        }
    }

    /// `pos` から最大 `count` バイトを読む
    ///
    /// `pos` は `[0, size]` に、戻り値の長さは残存バイト数にクランプされる。
    /// 末尾まで読むには `u64::MAX` を渡せばよい。
    pub fn data(&self, pos: u64, count: u64) -> Result<Vec<u8>, BufferError> {
        Ok(self.data_marked(pos, count)?.0)
    }

    /// `data` と同じ読み取りに、バイトごとの変更フラグ列を添えて返す
    pub fn data_marked(&self, pos: u64, count: u64) -> Result<(Vec<u8>, Vec<bool>), BufferError> {
        let pos = pos.min(self.size);
        let count = count.min(self.size - pos);
        let mut out = Vec::with_capacity(count as usize);
        let mut marks = Vec::with_capacity(count as usize);
        if count == 0 {
            return Ok((out, marks));
        }

        let end = pos + count;
        let mut idx = self.find_index(pos);
        let mut cur = pos;
        while cur < end {
            let chunk = &self.chunks[idx];
            let rel = cur - chunk.start;
            let take = (chunk.len() - rel).min(end - cur);
            match &chunk.payload {
                Payload::Clean { src, .. } => {
                    let off = out.len();
                    out.resize(off + take as usize, 0);
                    let n = self.source.read_at(*src + rel, &mut out[off..])?;
                    if (n as u64) < take {
                        return Err(BufferError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "backing source ended early",
                        )));
                    }
                    marks.resize(marks.len() + take as usize, false);
                }
                Payload::Dirty { bytes, changed } => {
                    let rel = rel as usize;
                    let take = take as usize;
                    out.extend_from_slice(&bytes[rel..rel + take]);
                    marks.extend_from_slice(&changed[rel..rel + take]);
                }
            }
            cur += take;
            idx += 1;
        }
        Ok((out, marks))
    }

    /// 1バイト読む（範囲外は `None`）
    pub fn get(&self, pos: u64) -> Option<u8> {
        self.data(pos, 1).ok().and_then(|v| v.first().copied())
    }

    /// `pos` にバイト列を挿入する
    pub fn insert_bytes(&mut self, pos: u64, bytes: &[u8]) -> Result<(), BufferError> {
        if pos > self.size {
            debug_assert!(false, "insert past end: {pos} > {}", self.size);
            return Err(BufferError::OutOfRange { pos, len: 0, size: self.size });
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let n = bytes.len() as u64;
        let at = self.split_at(pos);

        // 直前がダーティで末尾に接しているなら追記（連続入力の定跡パス）
        let appended = at > 0 && {
            let prev = &mut self.chunks[at - 1];
            if prev.end() == pos {
                if let Payload::Dirty { bytes: pb, changed } = &mut prev.payload {
                    pb.extend_from_slice(bytes);
                    changed.resize(pb.len(), true);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };
        if !appended {
            self.chunks.insert(
                at,
                Chunk {
                    start: pos,
                    payload: Payload::Dirty {
                        bytes: bytes.to_vec(),
                        changed: vec![true; bytes.len()],
                    },
                },
            );
        }

        let shift_from = if appended { at } else { at + 1 };
        for chunk in &mut self.chunks[shift_from..] {
            chunk.start += n;
        }
        self.size += n;
        Ok(())
    }

    pub fn insert_byte(&mut self, pos: u64, value: u8) -> Result<(), BufferError> {
        self.insert_bytes(pos, &[value])
    }

    /// `[pos, pos+len)` を削除する
    pub fn remove_range(&mut self, pos: u64, len: u64) -> Result<(), BufferError> {
        if pos.checked_add(len).is_none_or(|end| end > self.size) {
            debug_assert!(false, "remove out of range: {pos}+{len} > {}", self.size);
            return Err(BufferError::OutOfRange { pos, len, size: self.size });
        }
        if len == 0 {
            return Ok(());
        }
        let first = self.split_at(pos);
        let after = self.split_at(pos + len);
        self.chunks.drain(first..after);
        for chunk in &mut self.chunks[first..] {
            chunk.start -= len;
        }
        self.size -= len;
        self.coalesce_at(first);
        Ok(())
    }

    /// `pos` からバイト列で同じ長さだけ上書きする
    ///
    /// 末尾を超える上書きは挿入に化けさせず、事前条件違反として弾く。
    pub fn overwrite_bytes(&mut self, pos: u64, bytes: &[u8]) -> Result<(), BufferError> {
        let len = bytes.len() as u64;
        if pos.checked_add(len).is_none_or(|end| end > self.size) {
            debug_assert!(false, "overwrite out of range: {pos}+{len} > {}", self.size);
            return Err(BufferError::OutOfRange { pos, len, size: self.size });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        // 単一ダーティチャンク内ならインプレース（ニブル入力の定跡パス）
        let idx = self.find_index(pos);
        {
            let chunk = &mut self.chunks[idx];
            if chunk.end() >= pos + len {
                if let Payload::Dirty { bytes: cb, changed } = &mut chunk.payload {
                    let rel = (pos - chunk.start) as usize;
                    cb[rel..rel + bytes.len()].copy_from_slice(bytes);
                    changed[rel..rel + bytes.len()].fill(true);
                    return Ok(());
                }
            }
        }

        let first = self.split_at(pos);
        let after = self.split_at(pos + len);
        let mut off = 0usize;
        for chunk in &mut self.chunks[first..after] {
            let take = chunk.len() as usize;
            match &mut chunk.payload {
                Payload::Dirty { bytes: cb, changed } => {
                    cb.copy_from_slice(&bytes[off..off + take]);
                    changed.fill(true);
                }
                Payload::Clean { .. } => {
                    chunk.payload = Payload::Dirty {
                        bytes: bytes[off..off + take].to_vec(),
                        changed: vec![true; take],
                    };
                }
            }
            off += take;
        }
        // 分割で生まれたダーティ隣接を畳む（右端から順に）
        self.coalesce_at(after);
        for i in (first..after).rev() {
            self.coalesce_at(i);
        }
        Ok(())
    }

    pub fn overwrite_byte(&mut self, pos: u64, value: u8) -> Result<(), BufferError> {
        self.overwrite_bytes(pos, &[value])
    }

    /// `pos` から `count` バイトをシンクへ書き出す
    ///
    /// クリーン領域はソースからブロック単位でストリームし、ダーティ領域は
    /// メモリから書く。範囲は `data` と同じ規則でクランプされる。
    pub fn write<W: Write>(&self, sink: &mut W, pos: u64, count: u64) -> Result<(), BufferError> {
        let pos = pos.min(self.size);
        let count = count.min(self.size - pos);
        if count == 0 {
            return Ok(());
        }

        let end = pos + count;
        let mut idx = self.find_index(pos);
        let mut cur = pos;
        let mut block = vec![0u8; IO_BLOCK];
        while cur < end {
            let chunk = &self.chunks[idx];
            let rel = cur - chunk.start;
            let take = (chunk.len() - rel).min(end - cur);
            match &chunk.payload {
                Payload::Clean { src, .. } => {
                    let mut done = 0u64;
                    while done < take {
                        let want = (take - done).min(IO_BLOCK as u64) as usize;
                        let n = self.source.read_at(*src + rel + done, &mut block[..want])?;
                        if n < want {
                            return Err(BufferError::Io(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "backing source ended early",
                            )));
                        }
                        sink.write_all(&block[..want])?;
                        done += want as u64;
                    }
                }
                Payload::Dirty { bytes, .. } => {
                    let rel = rel as usize;
                    sink.write_all(&bytes[rel..rel + take as usize])?;
                }
            }
            cur += take;
            idx += 1;
        }
        Ok(())
    }

    /// 現在のチャンク数（検査用）
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let mut expected = 0u64;
        for chunk in &self.chunks {
            assert_eq!(chunk.start, expected, "chunk boundary gap/overlap");
            assert!(chunk.len() > 0, "empty chunk left behind");
            expected = chunk.end();
        }
        assert_eq!(expected, self.size, "size out of sync with chunks");
    }
}

impl Default for ChunkedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> ChunkedBuffer {
        ChunkedBuffer::from_source(Box::new(MemSource::new(bytes.to_vec())))
    }

    fn contents(buffer: &ChunkedBuffer) -> Vec<u8> {
        buffer.data(0, u64::MAX).unwrap()
    }

    #[test]
    fn empty_buffer() {
        let buf = ChunkedBuffer::new();
        assert_eq!(buf.size(), 0);
        assert!(contents(&buf).is_empty());
        assert_eq!(buf.get(0), None);
    }

    #[test]
    fn read_clamps_out_of_range() {
        let buf = buffer(b"Hello");
        assert_eq!(buf.data(3, 100).unwrap(), b"lo");
        assert_eq!(buf.data(100, 5).unwrap(), b"");
        assert_eq!(buf.data(0, 0).unwrap(), b"");
    }

    #[test]
    fn insert_splits_clean_chunk() {
        let mut buf = buffer(b"Hello");
        buf.insert_byte(2, b'X').unwrap();
        buf.check_invariants();
        assert_eq!(contents(&buf), b"HeXllo");
        // クリーン頭 + ダーティ + クリーン尾
        assert_eq!(buf.chunk_count(), 3);
    }

    #[test]
    fn insert_at_ends() {
        let mut buf = buffer(b"bc");
        buf.insert_byte(0, b'a').unwrap();
        buf.insert_byte(3, b'd').unwrap();
        buf.check_invariants();
        assert_eq!(contents(&buf), b"abcd");
    }

    #[test]
    fn sequential_inserts_coalesce_into_one_dirty_chunk() {
        let mut buf = buffer(b"ab");
        buf.insert_byte(1, b'1').unwrap();
        buf.insert_byte(2, b'2').unwrap();
        buf.insert_byte(3, b'3').unwrap();
        buf.check_invariants();
        assert_eq!(contents(&buf), b"a123b");
        assert_eq!(buf.chunk_count(), 3);
    }

    #[test]
    fn insert_remove_inverse() {
        let mut buf = buffer(b"Hello");
        buf.insert_byte(3, 0x21).unwrap();
        buf.remove_range(3, 1).unwrap();
        buf.check_invariants();
        assert_eq!(contents(&buf), b"Hello");
    }

    #[test]
    fn remove_spanning_chunks() {
        let mut buf = buffer(b"abcdef");
        buf.insert_bytes(3, b"XY").unwrap(); // abc XY def
        buf.check_invariants();
        // クリーン尾の一部からダーティをまたいでクリーン頭まで削る
        buf.remove_range(2, 4).unwrap(); // ab ef
        buf.check_invariants();
        assert_eq!(contents(&buf), b"abef");
    }

    #[test]
    fn remove_rejects_out_of_range() {
        let mut buf = buffer(b"abc");
        assert!(matches!(
            buf.remove_range(2, 5),
            Err(BufferError::OutOfRange { .. })
        ));
        assert_eq!(contents(&buf), b"abc");
    }

    #[test]
    fn overwrite_inverse() {
        let mut buf = buffer(b"abc");
        let old = buf.get(1).unwrap();
        buf.overwrite_byte(1, 0xFF).unwrap();
        assert_eq!(contents(&buf), &[b'a', 0xFF, b'c']);
        buf.overwrite_byte(1, old).unwrap();
        buf.check_invariants();
        assert_eq!(contents(&buf), b"abc");
    }

    #[test]
    fn overwrite_is_not_append() {
        let mut buf = buffer(b"abc");
        assert!(matches!(
            buf.overwrite_bytes(2, b"XY"),
            Err(BufferError::OutOfRange { .. })
        ));
        assert_eq!(contents(&buf), b"abc");
    }

    #[test]
    fn overwrite_across_chunks() {
        let mut buf = buffer(b"abcdef");
        buf.insert_bytes(3, b"XY").unwrap(); // abcXYdef
        buf.overwrite_bytes(2, &[1, 2, 3, 4]).unwrap(); // ab 1234 ef
        buf.check_invariants();
        assert_eq!(contents(&buf), &[b'a', b'b', 1, 2, 3, 4, b'e', b'f']);
    }

    #[test]
    fn marked_flags_cover_edits_only() {
        let mut buf = buffer(b"abcd");
        buf.overwrite_byte(1, 0x00).unwrap();
        let (data, marks) = buf.data_marked(0, u64::MAX).unwrap();
        assert_eq!(data, &[b'a', 0x00, b'c', b'd']);
        assert_eq!(marks, &[false, true, false, false]);
    }

    #[test]
    fn write_streams_all_regions() {
        let mut buf = buffer(b"abcdef");
        buf.insert_bytes(3, b"XY").unwrap();
        buf.overwrite_byte(0, b'Z').unwrap();
        let mut sink = Vec::new();
        buf.write(&mut sink, 0, u64::MAX).unwrap();
        assert_eq!(sink, contents(&buf));

        let mut region = Vec::new();
        buf.write(&mut region, 2, 4).unwrap();
        assert_eq!(region, contents(&buf)[2..6].to_vec());
    }

    #[test]
    fn set_source_resets_chunks() {
        let mut buf = buffer(b"abc");
        buf.insert_byte(0, b'x').unwrap();
        buf.set_source(Box::new(MemSource::new(b"12345".to_vec())));
        buf.check_invariants();
        assert_eq!(buf.size(), 5);
        assert_eq!(contents(&buf), b"12345");
        assert_eq!(buf.chunk_count(), 1);
    }

    #[test]
    fn edit_storm_keeps_invariants() {
        let mut buf = buffer(&[0u8; 64]);
        for i in 0..16 {
            buf.insert_byte(i * 3, i as u8).unwrap();
            buf.check_invariants();
        }
        for _ in 0..10 {
            buf.remove_range(5, 2).unwrap();
            buf.check_invariants();
        }
        buf.overwrite_bytes(10, &[0xEE; 20]).unwrap();
        buf.check_invariants();
        assert_eq!(buf.size(), 64 + 16 - 20);
    }
}
