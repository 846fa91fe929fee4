//! Staging service tests — substitution, binary passthrough, briefing doc.

use std::collections::BTreeMap;
use std::path::Path;

use aviary_cli::application::services::stage::{stage_formation, PEER_BRIEFING_FILE};
use aviary_cli::domain::identity::resolve_agent_ids;
use aviary_common::FormationManifest;

use crate::mocks::MemFs;

const MANIFEST_YAML: &str = r#"
namespace: ops
name: watchtower
version: "1.0.0"
agents:
  sentry:
    source: agents/sentry
    displayName: "Sentry"
  scribe:
    source: agents/scribe
topology:
  sentry:
    - scribe
"#;

fn manifest() -> FormationManifest {
    serde_yaml::from_str(MANIFEST_YAML).expect("fixture parses")
}

fn vars() -> BTreeMap<String, String> {
    [("REGION".to_string(), "eu".to_string())].into_iter().collect()
}

#[test]
fn test_stage_substitutes_text_and_passes_binary_through() {
    let binary: &[u8] = b"PNG\x00{{REGION}}";
    let fs = MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Region: {{REGION}}"),
        ("/src/agents/sentry/logo.png", binary),
        ("/src/agents/scribe/SOUL.md", b"Plain."),
    ]);
    let m = manifest();
    let agent_ids = resolve_agent_ids(&m, "ops").unwrap();

    let staged = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src")).unwrap();

    let soul = staged
        .files
        .iter()
        .find(|f| f.agent_id == "ops-sentry" && f.rel_path == "SOUL.md")
        .expect("staged soul");
    assert_eq!(soul.bytes, b"Region: eu");

    let logo = staged
        .files
        .iter()
        .find(|f| f.rel_path == "logo.png")
        .expect("staged logo");
    // Binary files are opaque bytes: the token survives untouched.
    assert_eq!(logo.bytes, binary);
}

#[test]
fn test_stage_generates_briefing_for_agents_with_outgoing_edges() {
    let fs = MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Watch."),
        ("/src/agents/scribe/SOUL.md", b"Write."),
    ]);
    let m = manifest();
    let agent_ids = resolve_agent_ids(&m, "ops").unwrap();

    let staged = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src")).unwrap();

    let briefing = staged
        .files
        .iter()
        .find(|f| f.agent_id == "ops-sentry" && f.rel_path == PEER_BRIEFING_FILE)
        .expect("briefing for sentry");
    let text = String::from_utf8(briefing.bytes.clone()).unwrap();
    assert!(text.contains("ops-scribe"), "briefing names the peer id: {text}");

    assert!(
        !staged
            .files
            .iter()
            .any(|f| f.agent_id == "ops-scribe" && f.rel_path == PEER_BRIEFING_FILE),
        "no briefing for agents without outgoing edges"
    );
}

#[test]
fn test_stage_keys_hashes_by_resolved_agent_id() {
    let fs = MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Watch."),
        ("/src/agents/scribe/SOUL.md", b"Write."),
    ]);
    let m = manifest();
    let agent_ids = resolve_agent_ids(&m, "ops").unwrap();

    let staged = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src")).unwrap();

    assert!(staged.file_hashes.contains_key("ops-sentry:SOUL.md"));
    assert!(staged.file_hashes.contains_key("ops-scribe:SOUL.md"));
    assert!(staged
        .file_hashes
        .keys()
        .all(|key| key.starts_with("ops-sentry:") || key.starts_with("ops-scribe:")));
}

#[test]
fn test_stage_missing_source_directory_is_an_error() {
    let fs = MemFs::with_files(&[("/src/agents/sentry/SOUL.md", b"Watch.")]);
    let m = manifest(); // scribe's source directory does not exist
    let agent_ids = resolve_agent_ids(&m, "ops").unwrap();

    let err = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src"))
        .expect_err("missing source must fail");
    assert!(err.to_string().contains("scribe"));
}

#[test]
fn test_stage_is_deterministic() {
    let fs = MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Region: {{REGION}}"),
        ("/src/agents/scribe/SOUL.md", b"Plain."),
    ]);
    let m = manifest();
    let agent_ids = resolve_agent_ids(&m, "ops").unwrap();

    let a = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src")).unwrap();
    let b = stage_formation(&fs, &m, &agent_ids, &vars(), Path::new("/src")).unwrap();
    assert_eq!(a.file_hashes, b.file_hashes);
    assert_eq!(a.source_digest, b.source_digest);
}
