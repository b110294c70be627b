
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, spawn_sidecar, temp_dir};

type Io<'a> = (&'a mut ChildStdin, &'a mut BufReader<ChildStdout>);

fn create_teacher(io: Io, id: &str, name: &str, department: &str) -> String {
    let (stdin, reader) = io;
    request_ok(
        stdin,
        reader,
        id,
        "teachers.create",
        json!({
            "name": name,
            "department": department,
            "level": "college",
            "subjects": []
        }),
    )
    .get("teacherId")
    .and_then(|v| v.as_str())
    .expect("teacherId")
    .to_string()
}

fn assign(io: Io, id: &str, teacher_id: &str, subject: &str) {
    let (stdin, reader) = io;
    let _ = request_ok(
        stdin,
        reader,
        id,
        "assignments.create",
        json!({
            "teacherId": teacher_id,
            "subject": subject,
            "level": "college",
            "strandCourse": "BSIT",
            "section": "1-1"
        }),
    );
}

fn student(id: &str, strand_course: &str, section: &str) -> serde_json::Value {
    json!({
        "student": {
            "id": id,
            "usn": format!("usn-{}", id),
            "fullName": format!("Student {}", id),
            "strandCourse": strand_course,
            "section": section,
            "level": "college"
        }
    })
}

#[test]
fn unknown_cohort_gets_an_empty_directory() {
    let workspace = temp_dir("evaldesk-dir-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let t1 = create_teacher((&mut stdin, &mut reader), "2", "Alpha", "College");
    assign((&mut stdin, &mut reader), "3", &t1, "Programming");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        student("s1", "HUMSS", "9-3"),
    );
    assert_eq!(opened.get("teacherCount").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        opened.get("teachers").and_then(|v| v.as_array()).map(Vec::len),
        Some(0)
    );
}

#[test]
fn assigned_and_personal_sources_merge_with_subject_union() {
    let workspace = temp_dir("evaldesk-dir-merge");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let shared = create_teacher((&mut stdin, &mut reader), "2", "Shared", "College");
    let personal_only = create_teacher((&mut stdin, &mut reader), "3", "Elective", "College");
    assign((&mut stdin, &mut reader), "4", &shared, "Programming");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.open",
        student("s1", "BSIT", "1-1"),
    );
    // Same teacher through the personal list with a second subject.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.addTeacher",
        json!({ "teacherId": shared, "subject": "Web Development" }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.addTeacher",
        json!({ "teacherId": personal_only, "subject": "Electronics" }),
    );

    let teachers = after.get("teachers").and_then(|v| v.as_array()).expect("teachers");
    assert_eq!(teachers.len(), 2);
    assert_eq!(
        teachers[0].get("teacherId").and_then(|v| v.as_str()),
        Some(shared.as_str())
    );
    let subjects: Vec<&str> = teachers[0]
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(subjects, vec!["Programming", "Web Development"]);
    assert_eq!(
        teachers[1].get("teacherId").and_then(|v| v.as_str()),
        Some(personal_only.as_str())
    );
}

#[test]
fn evaluated_teachers_drop_out_of_the_next_directory() {
    let workspace = temp_dir("evaldesk-dir-evaluated");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let t1 = create_teacher((&mut stdin, &mut reader), "2", "Alpha", "College");
    assign((&mut stdin, &mut reader), "3", &t1, "Programming");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        student("s1", "BSIT", "1-1"),
    );
    assert_eq!(opened.get("teacherCount").and_then(|v| v.as_u64()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.save",
        json!({ "teacherId": t1, "answers": { "q1": 4, "q2": 5 } }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "6", "session.submitAll", json!({}));

    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.open",
        student("s1", "BSIT", "1-1"),
    );
    assert_eq!(reopened.get("teacherCount").and_then(|v| v.as_u64()), Some(0));
}

#[test]
fn directory_entries_carry_the_teacher_profile_fields() {
    let workspace = temp_dir("evaldesk-dir-fields");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let t1 = create_teacher((&mut stdin, &mut reader), "2", "Alpha", "College");
    assign((&mut stdin, &mut reader), "3", &t1, "Programming");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        student("s1", "BSIT", "1-1"),
    );
    let entry = &opened.get("teachers").and_then(|v| v.as_array()).expect("teachers")[0];
    assert_eq!(entry.get("name").and_then(|v| v.as_str()), Some("Alpha"));
    assert_eq!(
        entry.get("department").and_then(|v| v.as_str()),
        Some("College")
    );
    assert_eq!(entry.get("level").and_then(|v| v.as_str()), Some("college"));
}
