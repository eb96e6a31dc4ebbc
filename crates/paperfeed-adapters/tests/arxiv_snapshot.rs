// Parses the checked-in arXiv fixture and compares it with its snapshot.

use paperfeed_adapters::parse_feed;
use paperfeed_core::PaperDraft;

fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/arxiv")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

#[test]
fn arxiv_sample_feed_matches_snapshot() {
    let parsed = parse_feed(&fixture("sample_feed.xml")).unwrap();
    let expected: Vec<PaperDraft> = serde_json::from_str(&fixture("snapshot.json")).unwrap();
    assert_eq!(parsed, expected);
}
