//! JSON-lines audit trail tests

use std::fs::OpenOptions;
use std::io::Write;

use tempfile::tempdir;

use missionpulse_core::audit::{AuditAction, AuditEntry, AuditFilter, AuditSink, JsonlAuditSink};
use missionpulse_core::RecordId;

fn entry(action: AuditAction, table: &str, id: &str) -> AuditEntry {
    AuditEntry::new(action, table, RecordId::from(id), "exec_001")
}

#[tokio::test]
async fn test_append_and_query_newest_first() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let sink = JsonlAuditSink::open(dir.path().join("audit.jsonl"))?;

    sink.append(entry(AuditAction::Create, "opportunities", "o1")).await?;
    sink.append(entry(AuditAction::Update, "opportunities", "o1")).await?;
    sink.append(entry(AuditAction::Create, "competitors", "c1")).await?;

    let all = sink.query(&AuditFilter::new(10)).await?;
    let order: Vec<(AuditAction, &str)> = all
        .iter()
        .map(|r| (r.action, r.record_id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (AuditAction::Create, "c1"),
            (AuditAction::Update, "o1"),
            (AuditAction::Create, "o1"),
        ]
    );

    let opportunities = sink
        .query(&AuditFilter::new(10).table("opportunities").action(AuditAction::Create))
        .await?;
    assert_eq!(opportunities.len(), 1);

    let newest = sink.query(&AuditFilter::new(1)).await?;
    assert_eq!(newest[0].record_id, RecordId::from("c1"));
    Ok(())
}

#[tokio::test]
async fn test_reopen_keeps_history() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nested/trail/audit.jsonl");

    {
        let sink = JsonlAuditSink::open(&path)?;
        sink.append(entry(AuditAction::Delete, "win_themes", "w1")).await?;
    }

    let sink = JsonlAuditSink::open(&path)?;
    sink.append(entry(AuditAction::Create, "win_themes", "w2")).await?;
    let all = sink.query(&AuditFilter::new(10)).await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].action, AuditAction::Delete);
    Ok(())
}

#[tokio::test]
async fn test_torn_trailing_line_is_skipped() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("audit.jsonl");
    let sink = JsonlAuditSink::open(&path)?;
    sink.append(entry(AuditAction::Create, "opportunities", "o1")).await?;

    // Simulate a crash part-way through the next write
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"1a2b3c4d\t{\"id\":\"half")?;
    drop(file);

    let all = sink.query(&AuditFilter::new(10)).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record_id, RecordId::from("o1"));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_line_in_middle_is_skipped() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("audit.jsonl");
    let sink = JsonlAuditSink::open(&path)?;
    sink.append(entry(AuditAction::Create, "opportunities", "o1")).await?;

    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"00000000\t{\"not\":\"checksummed\"}\n")?;
    drop(file);

    sink.append(entry(AuditAction::Create, "opportunities", "o2")).await?;

    let all = sink.query(&AuditFilter::new(10)).await?;
    let ids: Vec<&str> = all.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["o2", "o1"]);
    Ok(())
}

#[tokio::test]
async fn test_reopen_after_torn_line_appends_cleanly() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("audit.jsonl");
    {
        let sink = JsonlAuditSink::open(&path)?;
        sink.append(entry(AuditAction::Create, "competitors", "c1")).await?;
    }

    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"deadbeef\t{\"id\":")?;
    drop(file);

    let sink = JsonlAuditSink::open(&path)?;
    sink.append(entry(AuditAction::Update, "competitors", "c1")).await?;

    let all = sink.query(&AuditFilter::new(10)).await?;
    let actions: Vec<AuditAction> = all.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec![AuditAction::Update, AuditAction::Create]);
    Ok(())
}

#[tokio::test]
async fn test_append_after_torn_tail_in_same_session_is_kept() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("audit.jsonl");
    let sink = JsonlAuditSink::open(&path)?;
    sink.append(entry(AuditAction::Create, "opportunities", "r1")).await?;

    // Partial line left behind without reopening the sink
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"0badc0de\t{\"id\":\"torn")?;
    drop(file);

    let appended = sink.append(entry(AuditAction::Create, "opportunities", "r2")).await?;
    assert_eq!(appended.record_id, RecordId::from("r2"));

    let all = sink.query(&AuditFilter::new(10)).await?;
    let ids: Vec<&str> = all.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["r2", "r1"]);

    let contents = std::fs::read_to_string(&path)?;
    assert!(contents.ends_with('\n'));
    assert_eq!(contents.lines().count(), 3);
    Ok(())
}
