//! チャンクバッファのプロパティテスト
//!
//! ランダムな編集列を素朴な `Vec<u8>` シャドウモデルと突き合わせ、
//! バッファ内容・Undo/Redoの可逆性・検索の一致を検査する。

use proptest::prelude::*;

use chx::buffer::{Document, SearchEngine};

/// ランダム編集操作（位置はサイズに合わせて適用時に丸める）
#[derive(Debug, Clone)]
enum Op {
    InsertByte { at: u64, value: u8 },
    InsertBytes { at: u64, bytes: Vec<u8> },
    Remove { at: u64, len: u64 },
    OverwriteByte { at: u64, value: u8 },
    Replace { at: u64, len: u64, bytes: Vec<u8> },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<u64>(), any::<u8>()).prop_map(|(at, value)| Op::InsertByte { at, value }),
        2 => (any::<u64>(), prop::collection::vec(any::<u8>(), 1..24))
            .prop_map(|(at, bytes)| Op::InsertBytes { at, bytes }),
        2 => (any::<u64>(), 1u64..16).prop_map(|(at, len)| Op::Remove { at, len }),
        3 => (any::<u64>(), any::<u8>()).prop_map(|(at, value)| Op::OverwriteByte { at, value }),
        2 => (any::<u64>(), 0u64..12, prop::collection::vec(any::<u8>(), 0..12))
            .prop_map(|(at, len, bytes)| Op::Replace { at, len, bytes }),
    ]
}

/// 操作をドキュメントとシャドウモデルの両方へ適用する
fn apply(op: &Op, doc: &mut Document, shadow: &mut Vec<u8>) {
    let size = shadow.len() as u64;
    match op {
        Op::InsertByte { at, value } => {
            let pos = at % (size + 1);
            doc.insert_byte(pos, *value).unwrap();
            shadow.insert(pos as usize, *value);
        }
        Op::InsertBytes { at, bytes } => {
            let pos = at % (size + 1);
            doc.insert_bytes(pos, bytes.clone()).unwrap();
            shadow.splice(pos as usize..pos as usize, bytes.iter().copied());
        }
        Op::Remove { at, len } => {
            if size == 0 {
                return;
            }
            let pos = at % size;
            let len = 1 + len % (size - pos);
            doc.remove_range(pos, len).unwrap();
            shadow.drain(pos as usize..(pos + len) as usize);
        }
        Op::OverwriteByte { at, value } => {
            if size == 0 {
                return;
            }
            let pos = at % size;
            doc.overwrite_byte(pos, *value).unwrap();
            shadow[pos as usize] = *value;
        }
        Op::Replace { at, len, bytes } => {
            let pos = at % (size + 1);
            let len = (*len).min(size - pos);
            doc.replace_bytes(pos, len, bytes).unwrap();
            shadow.splice(pos as usize..(pos + len) as usize, bytes.iter().copied());
        }
    }
}

fn contents(doc: &Document) -> Vec<u8> {
    doc.data(0, u64::MAX).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// 任意の編集列の後でバッファ内容がシャドウモデルと一致する
    #[test]
    fn buffer_matches_shadow(
        initial in prop::collection::vec(any::<u8>(), 0..64),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let mut doc = Document::from_bytes(initial.clone());
        let mut shadow = initial;
        for op in &ops {
            apply(op, &mut doc, &mut shadow);
            prop_assert_eq!(contents(&doc), shadow.clone());
        }
    }

    /// Undoを底まで辿ると初期状態、Redoで再び最終状態へ戻る
    #[test]
    fn undo_redo_round_trip(
        initial in prop::collection::vec(any::<u8>(), 0..48),
        ops in prop::collection::vec(op_strategy(), 1..24),
        partial in 0usize..24,
    ) {
        let mut doc = Document::from_bytes(initial.clone());
        let mut shadow = initial.clone();
        for op in &ops {
            apply(op, &mut doc, &mut shadow);
        }
        let final_state = contents(&doc);

        // 部分的なUndo→同数のRedoは最終状態を復元する
        let mut undone = 0;
        for _ in 0..partial {
            if doc.undo().unwrap().is_some() {
                undone += 1;
            }
        }
        for _ in 0..undone {
            doc.redo().unwrap();
        }
        prop_assert_eq!(contents(&doc), final_state.clone());

        // 底まで戻せば初期状態
        while doc.undo().unwrap().is_some() {}
        prop_assert_eq!(contents(&doc), initial);
        prop_assert!(!doc.is_modified());

        // 先端まで進めれば最終状態
        while doc.redo().unwrap().is_some() {}
        prop_assert_eq!(contents(&doc), final_state);
    }

    /// 前方・後方検索が素朴な全走査と一致する
    #[test]
    fn search_agrees_with_naive(
        data in prop::collection::vec(0u8..4, 8..200),
        needle in prop::collection::vec(0u8..4, 1..5),
        from in 0usize..200,
    ) {
        let doc = Document::from_bytes(data.clone());
        let engine = SearchEngine::with_block(16);

        let naive_forward = data
            .windows(needle.len())
            .enumerate()
            .skip_while(|(i, _)| *i < from)
            .find(|(_, w)| *w == needle.as_slice())
            .map(|(i, _)| i as u64);
        prop_assert_eq!(
            engine.index_of(doc.buffer(), &needle, from as u64).unwrap(),
            naive_forward
        );

        let naive_backward = data
            .windows(needle.len())
            .enumerate()
            .take_while(|(i, _)| *i <= from)
            .filter(|(_, w)| *w == needle.as_slice())
            .last()
            .map(|(i, _)| i as u64);
        prop_assert_eq!(
            engine.last_index_of(doc.buffer(), &needle, from as u64).unwrap(),
            naive_backward
        );
    }

    /// 編集でチャンクが割れた後も検索は素朴な走査と一致する
    #[test]
    fn search_after_edits_agrees_with_naive(
        initial in prop::collection::vec(0u8..4, 8..64),
        ops in prop::collection::vec(op_strategy(), 1..16),
        needle in prop::collection::vec(0u8..4, 1..4),
    ) {
        let mut doc = Document::from_bytes(initial.clone());
        let mut shadow = initial;
        for op in &ops {
            apply(op, &mut doc, &mut shadow);
        }
        let engine = SearchEngine::with_block(8);

        let mut naive = shadow
            .windows(needle.len())
            .enumerate()
            .filter(|(_, w)| *w == needle.as_slice())
            .map(|(i, _)| i as u64);
        let mut from = 0u64;
        while let Some(pos) = engine.index_of(doc.buffer(), &needle, from).unwrap() {
            prop_assert_eq!(naive.next(), Some(pos));
            from = pos + 1;
        }
        prop_assert_eq!(naive.next(), None);
    }
}

/// ファイルソース越しでも編集・保存・再読込が一致する
#[test]
fn file_backed_document_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let initial: Vec<u8> = (0..255u8).cycle().take(100_000).collect();
    std::fs::write(&path, &initial).unwrap();

    let mut doc = Document::open(&path).unwrap();
    let mut shadow = initial;

    // 大きめのクリーンチャンクを割る編集をいくつか
    doc.overwrite_byte(0, 0xEE).unwrap();
    shadow[0] = 0xEE;
    doc.insert_bytes(50_000, vec![1, 2, 3, 4]).unwrap();
    shadow.splice(50_000..50_000, [1, 2, 3, 4]);
    doc.remove_range(70_000, 123).unwrap();
    shadow.drain(70_000..70_123);
    doc.replace_bytes(99_000, 10, &[0xAB; 25]).unwrap();
    shadow.splice(99_000..99_010, [0xAB; 25]);

    assert_eq!(doc.data(0, u64::MAX).unwrap(), shadow);

    doc.save().unwrap();
    assert!(!doc.is_modified());

    // 保存後もUndoが生きている
    doc.undo().unwrap();
    assert!(doc.is_modified());
    doc.redo().unwrap();
    assert!(!doc.is_modified());

    let reopened = Document::open(&path).unwrap();
    assert_eq!(reopened.data(0, u64::MAX).unwrap(), shadow);
}
