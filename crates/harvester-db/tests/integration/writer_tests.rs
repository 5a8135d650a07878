use harvester_core::models::{RecipeRecord, TSV_HEADERS};
use harvester_core::traits::RecordSink;
use harvester_db::ResultWriter;

fn record(n: u32) -> RecipeRecord {
    let mut record = RecipeRecord::new(
        format!("Блюдо {n}"),
        "Нарезать.\nОбжарить.",
        "лук\tморковь",
        format!("https://1000.menu/cooking/{n}-dish"),
    );
    record.author = Some("Повар".into());
    record
}

#[tokio::test]
async fn flush_writes_header_and_rows_with_jsonl_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let tsv = dir.path().join("data/recipes.tsv");
    let jsonl = dir.path().join("data/recipes.jsonl");
    let writer = ResultWriter::new(&tsv, 1).with_jsonl(Some(jsonl.clone()));

    writer.append(record(1)).await.unwrap();
    writer.append(record(2)).await.unwrap();
    writer.finalize().await.unwrap();

    let content = std::fs::read_to_string(&tsv).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], TSV_HEADERS.join("\t"));
    for line in &lines[1..] {
        assert_eq!(line.split('\t').count(), TSV_HEADERS.len());
    }
    assert!(lines[1].starts_with("Блюдо 1\tНарезать. Обжарить.\tлук морковь\t"));

    let mirrored: Vec<serde_json::Value> = std::fs::read_to_string(&jsonl)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(mirrored.len(), 2);
    assert_eq!(mirrored[0]["url"], "https://1000.menu/cooking/1-dish");
    assert_eq!(mirrored[1]["url"], "https://1000.menu/cooking/2-dish");
    assert_eq!(mirrored[1]["author"], "Повар");
}

#[tokio::test]
async fn header_written_once_across_flushes_and_writers() {
    let dir = tempfile::tempdir().unwrap();
    let tsv = dir.path().join("recipes.tsv");

    let writer = ResultWriter::new(&tsv, 100);
    writer.append(record(1)).await.unwrap();
    writer.flush().await.unwrap();
    writer.append(record(2)).await.unwrap();
    writer.finalize().await.unwrap();

    // A second run appends to the existing file.
    let rerun = ResultWriter::new(&tsv, 100);
    rerun.append(record(3)).await.unwrap();
    rerun.finalize().await.unwrap();

    let content = std::fs::read_to_string(&tsv).unwrap();
    let header_lines = content.lines().filter(|l| l.starts_with("title\t")).count();
    assert_eq!(header_lines, 1);
    assert_eq!(content.lines().count(), 4);
}

#[tokio::test]
async fn threshold_triggers_flush_on_append() {
    let dir = tempfile::tempdir().unwrap();
    let tsv = dir.path().join("recipes.tsv");
    let writer = ResultWriter::new(&tsv, 3);

    for n in 0..5 {
        writer.append(record(n)).await.unwrap();
    }

    let content = std::fs::read_to_string(&tsv).unwrap();
    assert_eq!(content.lines().count(), 4);
    assert_eq!(writer.buffered(), 2);

    writer.finalize().await.unwrap();
    let content = std::fs::read_to_string(&tsv).unwrap();
    assert_eq!(content.lines().count(), 6);
    assert_eq!(writer.buffered(), 0);
}

#[tokio::test]
async fn concurrent_appends_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let tsv = dir.path().join("recipes.tsv");
    let writer = ResultWriter::new(&tsv, 4);

    let mut handles = Vec::new();
    for task in 0..8u32 {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..10 {
                writer.append(record(task * 100 + n)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    writer.finalize().await.unwrap();

    let content = std::fs::read_to_string(&tsv).unwrap();
    assert_eq!(content.lines().count(), 81);
}
