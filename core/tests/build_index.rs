//! End-to-end pipeline tests: build a real index from CSV files in a temp
//! directory and check the persisted tables against the structural
//! invariants.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use multirecall_core::{
    AffixKind, BuildConfig, IndexBuilder, IndexError, IndexStore, PinyinTable, WordKind,
};

fn temp_workspace(tag: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "multirecall_build_{tag}_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(dir.join("dict")).unwrap();
    dir
}

fn write_csv(dir: &Path, file: &str, rows: &[(&str, &str)]) {
    let mut content = String::from("name,data\n");
    for (name, data) in rows {
        content.push_str(name);
        content.push(',');
        content.push_str(data);
        content.push('\n');
    }
    std::fs::write(dir.join("dict").join(file), content).unwrap();
}

/// Twelve drug names sharing the 胶囊 suffix, enough to clear the default
/// frequency floor.
fn drug_rows() -> Vec<(String, String)> {
    let heads = [
        "奥利司他", "阿莫西林", "布洛芬酸", "维生素丸", "鱼油精华", "藿香正气",
        "感冒清热", "复方甘草", "牛黄解毒", "蛇胆川贝", "板蓝根冲", "金银花露",
    ];
    heads
        .iter()
        .map(|h| (format!("{h}胶囊"), String::new()))
        .collect()
}

fn build_catalog(tag: &str, index_name: &str) -> (PathBuf, IndexStore) {
    let workspace = temp_workspace(tag);
    write_csv(
        &workspace,
        "phones.csv",
        &[
            ("苹果手机", "sku1"),
            ("苹果手机壳", "sku2"),
            ("苹果手", "sku3"),
            ("苹果", ""),
            ("型号12345678", "sku5"),
            ("", "dropped-empty-name"),
        ],
    );
    write_csv(&workspace, "fruits.csv", &[("苹果", "jam")]);
    let drugs = drug_rows();
    let drug_refs: Vec<(&str, &str)> = drugs
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_str()))
        .collect();
    write_csv(&workspace, "drugs.csv", &drug_refs);
    // A malformed single-column row and a non-CSV file must both be ignored.
    std::fs::write(workspace.join("dict").join("broken.csv"), "name,data\nonlyonecolumn\n").unwrap();
    std::fs::write(workspace.join("dict").join("notes.txt"), "not a dictionary").unwrap();

    let config = BuildConfig {
        dict_dir: workspace.join("dict"),
        index_dir: workspace.join("index"),
        index_name: index_name.to_string(),
        mask_count: 1,
        min_freq: 10,
        ending_digits: 6,
        pinyin_table: None,
        max_mmap: 0,
    };
    let builder = IndexBuilder::with_pinyin(config, PinyinTable::builtin());
    let report = builder.build().unwrap();
    assert_eq!(report.dict_words, 18); // 5 phones + 1 fruit + 12 drugs
    assert!(report.index_words > 0);
    assert!(report.radix_nodes > 0);

    let store = IndexStore::open(&report.index_path).unwrap();
    (workspace, store)
}

#[test]
fn full_build_satisfies_invariants() {
    let (_workspace, store) = build_catalog("invariants", "catalog");

    // Every index word appears exactly once.
    let words = store.snapshot_index_words().unwrap();
    let distinct: BTreeSet<&str> = words.iter().map(|w| w.word.as_str()).collect();
    assert_eq!(distinct.len(), words.len(), "duplicate index words");

    // Every (index_id, dict_id) edge is unique and refers to existing rows.
    let links = store.snapshot_links().unwrap();
    let link_set: BTreeSet<(u64, u64)> = links.iter().copied().collect();
    assert_eq!(link_set.len(), links.len(), "duplicate edges");
    let word_ids: BTreeSet<u64> = words.iter().map(|w| w.id).collect();
    let dict_ids: BTreeSet<u64> = store
        .snapshot_dict_words()
        .unwrap()
        .iter()
        .map(|d| d.id)
        .collect();
    for (index_id, dict_id) in &links {
        assert!(word_ids.contains(index_id), "edge to missing index word");
        assert!(dict_ids.contains(dict_id), "edge to missing dict word");
    }

    // Parent links: every node of weight >= 3 has the truncated-key parent
    // one layer up, and child counts add up layer by layer.
    let nodes = store.snapshot_radix_nodes().unwrap();
    let by_key: BTreeMap<&str, &multirecall_core::RadixNode> =
        nodes.iter().map(|n| (n.hierarchy_key.as_str(), n)).collect();
    let mut children_per_weight: BTreeMap<u32, u64> = BTreeMap::new();
    for node in &nodes {
        *children_per_weight.entry(node.weight).or_default() += 1;
        if node.weight >= 3 {
            let parent_key = node.hierarchy_key
                [..node.hierarchy_key.len() - node.key.len()]
                .trim_end();
            let parent = by_key
                .get(parent_key)
                .unwrap_or_else(|| panic!("missing parent for {:?}", node.hierarchy_key));
            assert_eq!(parent.weight, node.weight - 1);
            assert_eq!(node.parent_id, parent.id, "parent_id mismatch");
        }
    }
    let mut child_count_per_weight: BTreeMap<u32, u64> = BTreeMap::new();
    for node in &nodes {
        *child_count_per_weight.entry(node.weight).or_default() += node.child_count as u64;
    }
    for (weight, total) in &child_count_per_weight {
        let expected = children_per_weight.get(&(weight + 1)).copied().unwrap_or(0);
        assert_eq!(*total, expected, "child_count sum at weight {weight}");
    }

    // Terminal nodes point at real index words; intermediates carry zero.
    for node in &nodes {
        if node.index_id != 0 {
            assert!(word_ids.contains(&node.index_id));
        }
    }
}

#[test]
fn affix_trim_and_repeats() {
    let (_workspace, store) = build_catalog("affixes", "catalog");

    // The shared suffix was mined for the drugs dictionary.
    let repeats = store.snapshot_repeats().unwrap();
    let suffix = repeats
        .iter()
        .find(|r| r.dict == "drugs" && r.kind == AffixKind::Suffix && r.word == "胶囊")
        .expect("胶囊 suffix not mined");
    assert_eq!(suffix.repeat_count, 12);
    assert_eq!(suffix.word_len, 2);
    for r in &repeats {
        assert!(r.word_len >= 2);
        assert!(r.repeat_count >= 10);
    }

    // The suffix is stripped before variant generation.
    assert!(store.find_index_word("奥利司他").unwrap().is_some());
    assert!(store.find_index_word("奥利司他胶囊").unwrap().is_none());
}

#[test]
fn trailing_digits_reduce_the_phrase() {
    let (_workspace, store) = build_catalog("digits", "catalog");

    let digits = store.find_index_word("12345678").unwrap().expect("digit run missing");
    assert_eq!(digits.word_len, 1);
    assert!(store.find_index_word("型号12345678").unwrap().is_none());
    // Weight-1 words never enter the trie.
    assert!(store.find_radix_node("12345678").unwrap().is_none());
}

#[test]
fn duplicate_variants_share_one_word_with_two_edges() {
    let (_workspace, store) = build_catalog("dedup", "catalog");

    let apple = store.find_index_word("苹果").unwrap().expect("苹果 missing");
    assert_eq!(apple.kind, WordKind::Chars);
    assert_eq!(apple.word_len, 2);
    let mut dicts: Vec<String> = store
        .dict_ids_for_index(apple.id)
        .unwrap()
        .into_iter()
        .map(|id| store.get_dict_word(id).unwrap().unwrap().dict)
        .collect();
    dicts.sort();
    // The standalone 苹果 rows from both dictionaries link here.
    assert!(dicts.contains(&"fruits".to_string()));
    assert!(dicts.contains(&"phones".to_string()));

    // The pinyin form exists as its own type-1 word with the same edges.
    let pinyin = store.find_index_word("ping guo").unwrap().expect("pinyin missing");
    assert_eq!(pinyin.kind, WordKind::Pinyin);
    assert_eq!(pinyin.word_len, 2);
    assert_eq!(
        store.dict_ids_for_index(pinyin.id).unwrap().len(),
        store.dict_ids_for_index(apple.id).unwrap().len()
    );
}

#[test]
fn radix_parents_follow_prefix_chain() {
    let (_workspace, store) = build_catalog("parents", "catalog");

    let apple = store.find_radix_node("苹果").unwrap().expect("苹果 node missing");
    let hand = store.find_radix_node("苹果手").unwrap().expect("苹果手 node missing");
    let phone = store.find_radix_node("苹果手机").unwrap().expect("苹果手机 node missing");

    assert_eq!(phone.weight, 4);
    assert_eq!(hand.weight, 3);
    assert_eq!(apple.weight, 2);
    assert_eq!(phone.parent_id, hand.id);
    assert_eq!(hand.parent_id, apple.id);

    // Both prefixes are index words themselves, so both nodes are terminals.
    assert_ne!(phone.index_id, 0);
    assert_ne!(hand.index_id, 0);
    assert_ne!(apple.index_id, 0);

    // Children are reachable through the parent index.
    let children = store.radix_children(apple.id).unwrap();
    assert!(children.contains(&hand.id));
    assert_eq!(apple.child_count as usize, children.len());

    // The pinyin trie exists alongside the character trie.
    let py = store.find_radix_node("ping guo").unwrap().expect("pinyin node missing");
    assert_eq!(py.weight, 2);
    assert_ne!(py.index_id, 0);
}

#[test]
fn rebuild_produces_identical_row_sets() {
    let workspace = temp_workspace("rebuild");
    write_csv(
        &workspace,
        "items.csv",
        &[
            ("苹果手机壳", "a"),
            ("洗发露", "b"),
            ("哆啦A梦 添乐", "c"),
            ("型号98765432", "d"),
        ],
    );

    let build = |name: &str| {
        let config = BuildConfig {
            dict_dir: workspace.join("dict"),
            index_dir: workspace.join("index"),
            index_name: name.to_string(),
            mask_count: 2,
            min_freq: 10,
            ending_digits: 6,
            pinyin_table: None,
            max_mmap: 0,
        };
        let report = IndexBuilder::with_pinyin(config, PinyinTable::builtin())
            .build()
            .unwrap();
        IndexStore::open(&report.index_path).unwrap()
    };
    let first = build("first");
    let second = build("second");

    let dict_rows = |store: &IndexStore| -> BTreeSet<(String, String, String, String)> {
        store
            .snapshot_dict_words()
            .unwrap()
            .into_iter()
            .map(|d| (d.dict, d.name, d.word_chars, d.word_pinyin))
            .collect()
    };
    assert_eq!(dict_rows(&first), dict_rows(&second));

    let word_rows = |store: &IndexStore| -> BTreeSet<(String, u32)> {
        store
            .snapshot_index_words()
            .unwrap()
            .into_iter()
            .map(|w| (w.word, w.word_len))
            .collect()
    };
    assert_eq!(word_rows(&first), word_rows(&second));

    let node_rows = |store: &IndexStore| -> BTreeSet<(String, String, u32, bool)> {
        store
            .snapshot_radix_nodes()
            .unwrap()
            .into_iter()
            .map(|n| (n.hierarchy_key, n.key, n.weight, n.index_id != 0))
            .collect()
    };
    assert_eq!(node_rows(&first), node_rows(&second));

    // Edges compared through natural keys, since ids are assignment order.
    let edge_rows = |store: &IndexStore| -> BTreeSet<(String, String)> {
        let words: BTreeMap<u64, String> = store
            .snapshot_index_words()
            .unwrap()
            .into_iter()
            .map(|w| (w.id, w.word))
            .collect();
        let dicts: BTreeMap<u64, String> = store
            .snapshot_dict_words()
            .unwrap()
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();
        store
            .snapshot_links()
            .unwrap()
            .into_iter()
            .map(|(index_id, dict_id)| (words[&index_id].clone(), dicts[&dict_id].clone()))
            .collect()
    };
    assert_eq!(edge_rows(&first), edge_rows(&second));
}

#[test]
fn existing_index_path_is_rejected() {
    let workspace = temp_workspace("exists");
    write_csv(&workspace, "items.csv", &[("苹果", "")]);
    std::fs::create_dir_all(workspace.join("index")).unwrap();
    std::fs::write(workspace.join("index").join("dup.bin"), b"occupied").unwrap();

    let config = BuildConfig {
        dict_dir: workspace.join("dict"),
        index_dir: workspace.join("index"),
        index_name: "dup".to_string(),
        ..Default::default()
    };
    let result = IndexBuilder::with_pinyin(config, PinyinTable::builtin()).build();
    assert!(matches!(result, Err(IndexError::IndexExists(_))));
}

#[test]
fn empty_dictionary_directory_builds_an_empty_index() {
    let workspace = temp_workspace("empty");
    let config = BuildConfig {
        dict_dir: workspace.join("dict"),
        index_dir: workspace.join("index"),
        index_name: "empty".to_string(),
        ..Default::default()
    };
    let report = IndexBuilder::with_pinyin(config, PinyinTable::builtin())
        .build()
        .unwrap();
    assert_eq!(report.dict_words, 0);
    assert_eq!(report.index_words, 0);
    assert_eq!(report.radix_nodes, 0);

    let store = IndexStore::open(&report.index_path).unwrap();
    let counts = store.counts().unwrap();
    assert_eq!(counts.dict_words, 0);
    assert_eq!(counts.radix_nodes, 0);
}
