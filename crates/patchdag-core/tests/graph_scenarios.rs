//! Literal graph-level scenarios: divergent branches merged through a
//! snapshot, and exclusion of specific patches from replay.

use std::rc::Rc;

use patchdag_core::diff::hunk;
use patchdag_core::diff::merge::three_way_merge;
use patchdag_core::graph::{PatchGraph, ValueQuery};
use patchdag_core::{Patch, PatchId, TextCodec};

fn pid(t: i64) -> PatchId {
    PatchId::encode(t, "c").unwrap()
}

#[test]
fn divergent_branches_merged_as_snapshot() {
    let mut g = PatchGraph::new(Rc::new(TextCodec::new()));
    g.add(vec![
        Patch::new(pid(1), hunk::make("", "A"), vec![]),
        Patch::new(pid(2), hunk::make("", "B"), vec![]),
        Patch::snapshot(pid(3), three_way_merge("", "A", "B"), vec![pid(1), pid(2)]),
    ]);

    assert_eq!(g.get_heads(), vec![pid(3)]);
    assert_eq!(g.value(&ValueQuery::default()).unwrap().as_str(), "AB");
    assert_eq!(g.version(&pid(1)).unwrap().as_str(), "A");
    assert_eq!(g.version(&pid(2)).unwrap().as_str(), "B");
}

#[test]
fn without_times_excludes_the_latest() {
    let mut g = PatchGraph::new(Rc::new(TextCodec::new()));
    g.add(vec![
        Patch::new(pid(10), hunk::make("", "A"), vec![]),
        Patch::new(pid(20), hunk::make("A", "AB"), vec![pid(10)]),
    ]);
    let doc = g
        .value(&ValueQuery {
            without_times: vec![pid(20)],
            ..ValueQuery::default()
        })
        .unwrap();
    assert_eq!(doc.as_str(), "A");
}

#[test]
fn excluding_everything_yields_the_empty_document() {
    let mut g = PatchGraph::new(Rc::new(TextCodec::new()));
    g.add(vec![Patch::new(pid(10), hunk::make("", "A"), vec![])]);
    let doc = g
        .value(&ValueQuery {
            without_times: vec![pid(10)],
            ..ValueQuery::default()
        })
        .unwrap();
    assert_eq!(doc.as_str(), "");
}

#[test]
fn merge_strategies_share_the_replay_path() {
    use patchdag_core::MergeStrategy;
    let mut g = PatchGraph::new(Rc::new(TextCodec::new()));
    g.add(vec![
        Patch::new(pid(1), hunk::make("", "x"), vec![]),
        Patch::new(pid(2), hunk::make("x", "xy"), vec![pid(1)]),
    ]);
    let apply_all = g
        .value(&ValueQuery {
            merge_strategy: MergeStrategy::ApplyAll,
            ..ValueQuery::default()
        })
        .unwrap();
    let three_way = g
        .value(&ValueQuery {
            merge_strategy: MergeStrategy::ThreeWay,
            ..ValueQuery::default()
        })
        .unwrap();
    assert_eq!(apply_all.as_str(), three_way.as_str());
}
