
use serde_json::json;
use sha2::{Digest, Sha256};
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn seed_one_rated_teacher(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    workspace: &std::path::Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "s2",
        "teachers.create",
        json!({ "name": "Export Prof", "department": "College", "level": "college" }),
    );
    let teacher_id = created
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let _ = request_ok(
        stdin,
        reader,
        "s3",
        "assignments.create",
        json!({
            "teacherId": teacher_id,
            "subject": "Programming",
            "level": "college",
            "strandCourse": "BSIT",
            "section": "1-1"
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s4",
        "session.open",
        json!({
            "student": {
                "id": "export-student",
                "usn": "2024-0500",
                "fullName": "Export Student",
                "strandCourse": "BSIT",
                "section": "1-1",
                "level": "college"
            }
        }),
    );
    // Teaching 4.25 exercises the one-decimal rounding.
    let _ = request_ok(
        stdin,
        reader,
        "s5",
        "session.save",
        json!({ "teacherId": teacher_id, "answers": { "q1": 4, "q2": 4, "q3": 4, "q4": 5 } }),
    );
    let _ = request_ok(stdin, reader, "s6", "session.submitAll", json!({}));
}

#[test]
fn csv_export_writes_one_decimal_ratings_and_matching_digest() {
    let workspace = temp_dir("evaldesk-export-csv");
    let out = workspace.join("ratings.csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_one_rated_teacher(&mut stdin, &mut reader, &workspace);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.exportCsv",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rows").and_then(|v| v.as_u64()), Some(1));

    let content = std::fs::read_to_string(&out).expect("read csv");
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("Teacher Name,Teaching,Content,Management,Communication,Preparedness,Average,Students")
    );
    let row = lines.next().expect("data row");
    assert_eq!(row, "Export Prof,4.2,0.0,0.0,0.0,0.0,4.2,1");

    let mut hasher = Sha256::new();
    hasher.update(std::fs::read(&out).expect("read bytes"));
    let digest = format!("{:x}", hasher.finalize());
    assert_eq!(
        exported.get("sha256").and_then(|v| v.as_str()),
        Some(digest.as_str())
    );
}

#[test]
fn document_export_is_a_well_formed_docx_container() {
    let workspace = temp_dir("evaldesk-export-docx");
    let out = workspace.join("ratings.docx");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_one_rated_teacher(&mut stdin, &mut reader, &workspace);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.exportDocument",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rows").and_then(|v| v.as_u64()), Some(1));
    assert!(exported.get("sha256").and_then(|v| v.as_str()).is_some());

    let file = std::fs::File::open(&out).expect("open docx");
    let mut archive = zip::ZipArchive::new(file).expect("read zip");
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).expect("zip entry").name().to_string())
        .collect();
    assert!(names.contains(&"[Content_Types].xml".to_string()));
    assert!(names.contains(&"_rels/.rels".to_string()));
    assert!(names.contains(&"word/document.xml".to_string()));

    use std::io::Read;
    let mut document = String::new();
    archive
        .by_name("word/document.xml")
        .expect("document part")
        .read_to_string(&mut document)
        .expect("read document part");
    assert!(document.contains("Export Prof"));
    assert!(document.contains("4.2"));
    assert!(document.contains("Generated on"));
}

#[test]
fn filtered_export_writes_only_matching_rows() {
    let workspace = temp_dir("evaldesk-export-filter");
    let out = workspace.join("filtered.csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_one_rated_teacher(&mut stdin, &mut reader, &workspace);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.exportCsv",
        json!({ "outPath": out.to_string_lossy(), "department": "Senior High School" }),
    );
    assert_eq!(exported.get("rows").and_then(|v| v.as_u64()), Some(0));

    let content = std::fs::read_to_string(&out).expect("read csv");
    assert_eq!(content.lines().count(), 1);
}
