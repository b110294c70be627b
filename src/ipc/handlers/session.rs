use crate::directory;
use crate::intake::{self, IntakeSession, PendingEvaluation, StudentIdentity};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use log::warn;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn parse_student(params: &serde_json::Value) -> Result<StudentIdentity, String> {
    let Some(s) = params.get("student") else {
        return Err("missing student".to_string());
    };
    let field = |key: &str| -> Result<String, String> {
        s.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing student.{}", key))
    };
    Ok(StudentIdentity {
        id: field("id")?,
        usn: field("usn")?,
        full_name: field("fullName")?,
        strand_course: field("strandCourse")?,
        section: field("section")?,
        level: field("level")?,
    })
}

fn teachers_json(session: &IntakeSession) -> serde_json::Value {
    serde_json::to_value(&session.teachers).unwrap_or_else(|_| json!([]))
}

fn position_json(session: &IntakeSession) -> serde_json::Value {
    json!({
        "index": session.current,
        "teacherCount": session.teacher_count(),
        "teacher": session
            .current_teacher()
            .and_then(|t| serde_json::to_value(t).ok())
    })
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student = match parse_student(&req.params) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    // A directory failure degrades to an empty list; the student still gets
    // a session and the caller gets a notice.
    let (teachers, notice) = match directory::load(conn, &student) {
        Ok(list) => (list, None),
        Err(e) => {
            warn!("directory load failed for student {}: {:?}", student.id, e);
            (Vec::new(), Some("Unable to load your teacher list. Please try again later."))
        }
    };

    let session = IntakeSession::new(student, teachers);
    let mut result = json!({
        "teachers": teachers_json(&session),
        "teacherCount": session.teacher_count()
    });
    if let Some(n) = notice {
        result["notice"] = json!(n);
    }
    state.session = Some(session);
    ok(&req.id, result)
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    ok(&req.id, position_json(session))
}

fn handle_session_next(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    session.go_next();
    ok(&req.id, position_json(session))
}

fn handle_session_previous(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    session.go_previous();
    ok(&req.id, position_json(session))
}

fn handle_session_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing teacherId", None);
    };
    if !session.contains_teacher(teacher_id) {
        return err(&req.id, "not_found", "teacher is not in your evaluation list", None);
    }
    let Some(answers) = req.params.get("answers").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "answers must be an object", None);
    };

    let teacher_name = session
        .teachers
        .iter()
        .find(|t| t.teacher_id == teacher_id)
        .map(|t| t.name.clone())
        .unwrap_or_default();
    let text = |key: &str| -> String {
        req.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    session.save(PendingEvaluation {
        teacher_id: teacher_id.to_string(),
        teacher_name,
        answers: answers.clone(),
        positive_comments: text("positiveComments"),
        suggestions: text("suggestions"),
    });

    ok(
        &req.id,
        json!({
            "bufferedCount": session.buffered_count(),
            "allEvaluated": session.all_evaluated()
        }),
    )
}

fn handle_session_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    ok(
        &req.id,
        json!({
            "bufferedCount": session.buffered_count(),
            "teacherCount": session.teacher_count(),
            "allEvaluated": session.all_evaluated()
        }),
    )
}

fn handle_session_add_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    if !session.student.is_college() {
        return err(
            &req.id,
            "bad_params",
            "only college students can add teachers to their list",
            None,
        );
    }
    let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing teacherId", None);
    };
    let Some(subject) = req
        .params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return err(&req.id, "bad_params", "subject is required", None);
    };

    let active: Option<i64> = match conn
        .query_row(
            "SELECT is_active FROM teachers WHERE id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match active {
        None => return err(&req.id, "not_found", "teacher not found", None),
        Some(0) => return err(&req.id, "bad_params", "teacher is inactive", None),
        Some(_) => {}
    }

    let student = &session.student;
    if let Err(e) = conn.execute(
        "INSERT INTO student_evaluation_lists(
            id, student_id, teacher_id, level, strand_course, section, subject
        ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &student.id,
            teacher_id,
            &student.level,
            &student.strand_course,
            &student.section,
            subject,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "student_evaluation_lists" })),
        );
    }

    // Reload so the new teacher shows up with merged subjects; buffered
    // evaluations survive the swap.
    match directory::load(conn, &session.student) {
        Ok(teachers) => session.replace_teachers(teachers),
        Err(e) => warn!(
            "directory reload failed for student {}: {:?}",
            session.student.id, e
        ),
    }

    ok(
        &req.id,
        json!({
            "teachers": teachers_json(session),
            "teacherCount": session.teacher_count()
        }),
    )
}

fn handle_session_remove_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };
    let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing teacherId", None);
    };

    if !session.remove_teacher(teacher_id) {
        return err(&req.id, "not_found", "teacher is not in your evaluation list", None);
    }
    ok(
        &req.id,
        json!({
            "teachers": teachers_json(session),
            "teacherCount": session.teacher_count(),
            "bufferedCount": session.buffered_count()
        }),
    )
}

/// Make sure a profile row backs the student before submitting. Creates a
/// minimal row when missing and reads it back; two misses abort the batch.
fn ensure_profile(conn: &rusqlite::Connection, student: &StudentIdentity) -> anyhow::Result<()> {
    let find = |conn: &rusqlite::Connection| -> rusqlite::Result<Option<i64>> {
        conn.query_row("SELECT 1 FROM profiles WHERE id = ?", [&student.id], |r| {
            r.get(0)
        })
        .optional()
    };

    if find(conn)?.is_some() {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO profiles(id, full_name, usn, strand_course, section, level)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.full_name,
            &student.usn,
            &student.strand_course,
            &student.section,
            &student.level,
        ),
    )?;
    if find(conn)?.is_none() {
        anyhow::bail!("profile for student {} could not be created", student.id);
    }
    Ok(())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn handle_session_submit_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    if session.submitted {
        return err(&req.id, "bad_params", "this session was already submitted", None);
    }
    if session.buffered_count() == 0 {
        return err(&req.id, "bad_params", "nothing buffered to submit", None);
    }
    if !session.all_evaluated() {
        return err(
            &req.id,
            "bad_params",
            "every teacher in the list must be evaluated before submitting",
            None,
        );
    }

    if let Err(e) = ensure_profile(conn, &session.student) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };

    // Insert in list order so a constraint failure is deterministic. Any
    // failure drops the transaction and rolls back the whole batch.
    let student = session.student.clone();
    let created_at = Utc::now().to_rfc3339();
    let mut inserted = 0usize;
    for teacher in &session.teachers {
        let Some(entry) = session.pending.get(&teacher.teacher_id) else {
            continue;
        };
        let answers_raw = serde_json::Value::Object(entry.answers.clone()).to_string();
        let result = tx.execute(
            "INSERT INTO evaluations(
                id, student_id, teacher_id, teacher_name, student_name, student_usn,
                level, strand_course, section, overall_rating,
                positive_feedback, suggestions, answers, created_at
            ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                student.id,
                entry.teacher_id,
                entry.teacher_name,
                student.full_name,
                student.usn,
                student.level,
                student.strand_course,
                student.section,
                intake::overall_rating(&entry.answers),
                entry.positive_comments,
                entry.suggestions,
                answers_raw,
                created_at,
            ],
        );
        match result {
            Ok(_) => inserted += 1,
            Err(e) if is_unique_violation(&e) => {
                return err(
                    &req.id,
                    "already_evaluated",
                    "an evaluation for one of these teachers already exists",
                    Some(json!({ "teacherId": entry.teacher_id })),
                );
            }
            Err(e) => {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "evaluations" })),
                );
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    session.submitted = true;
    ok(&req.id, json!({ "inserted": inserted }))
}

fn handle_session_submissions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "open a session first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.teacher_id, t.name, e.teacher_name, e.overall_rating,
                e.positive_feedback, e.suggestions, e.created_at
         FROM evaluations e
         LEFT JOIN teachers t ON t.id = e.teacher_id
         WHERE e.student_id = ?
         ORDER BY e.created_at",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&session.student.id], |r| {
            let resolved: Option<String> = r.get(2)?;
            let stored: String = r.get(3)?;
            let name = resolved.unwrap_or(stored);
            let name = if name.is_empty() {
                "Unknown Teacher".to_string()
            } else {
                name
            };
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "teacherId": r.get::<_, String>(1)?,
                "teacherName": name,
                "overallRating": r.get::<_, i64>(4)?,
                "positiveFeedback": r.get::<_, String>(5)?,
                "suggestions": r.get::<_, String>(6)?,
                "createdAt": r.get::<_, String>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(submissions) => ok(&req.id, json!({ "submissions": submissions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        "session.next" => Some(handle_session_next(state, req)),
        "session.previous" => Some(handle_session_previous(state, req)),
        "session.save" => Some(handle_session_save(state, req)),
        "session.progress" => Some(handle_session_progress(state, req)),
        "session.addTeacher" => Some(handle_session_add_teacher(state, req)),
        "session.removeTeacher" => Some(handle_session_remove_teacher(state, req)),
        "session.submitAll" => Some(handle_session_submit_all(state, req)),
        "session.submissions" => Some(handle_session_submissions(state, req)),
        _ => None,
    }
}
