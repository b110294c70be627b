use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

use crate::intake::StudentIdentity;

/// One teacher a student must evaluate, annotated with the subjects taught to
/// that student's cohort.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub teacher_id: String,
    pub name: String,
    pub department: String,
    pub level: String,
    pub subjects: Vec<String>,
}

/// A (teacher, subject) pair from one of the two backing sources.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub teacher_id: String,
    pub name: String,
    pub department: String,
    pub level: String,
    pub subject: String,
}

/// Merge the assignment-derived rows with the personal-list rows. Teachers
/// are deduped by id in first-encounter order; a teacher present in both
/// sources gets the union of its subject lists.
pub fn merge_sources(assigned: Vec<SourceRow>, personal: Vec<SourceRow>) -> Vec<DirectoryEntry> {
    let mut entries: Vec<DirectoryEntry> = Vec::new();

    for row in assigned.into_iter().chain(personal.into_iter()) {
        if let Some(existing) = entries.iter_mut().find(|e| e.teacher_id == row.teacher_id) {
            if !existing.subjects.contains(&row.subject) {
                existing.subjects.push(row.subject);
            }
        } else {
            entries.push(DirectoryEntry {
                teacher_id: row.teacher_id,
                name: row.name,
                department: row.department,
                level: row.level,
                subjects: vec![row.subject],
            });
        }
    }

    entries
}

fn assigned_rows(conn: &Connection, student: &StudentIdentity) -> anyhow::Result<Vec<SourceRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.department, t.level, a.subject
         FROM teacher_assignments a
         JOIN teachers t ON t.id = a.teacher_id
         WHERE a.level = ? AND a.strand_course = ? AND a.section = ?
           AND t.is_active = 1
         ORDER BY a.rowid",
    )?;
    let rows = stmt
        .query_map(
            (&student.level, &student.strand_course, &student.section),
            |r| {
                Ok(SourceRow {
                    teacher_id: r.get(0)?,
                    name: r.get(1)?,
                    department: r.get(2)?,
                    level: r.get(3)?,
                    subject: r.get(4)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn personal_rows(conn: &Connection, student: &StudentIdentity) -> anyhow::Result<Vec<SourceRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.department, t.level, l.subject
         FROM student_evaluation_lists l
         JOIN teachers t ON t.id = l.teacher_id
         WHERE l.student_id = ? AND t.is_active = 1
         ORDER BY l.rowid",
    )?;
    let rows = stmt
        .query_map([&student.id], |r| {
            Ok(SourceRow {
                teacher_id: r.get(0)?,
                name: r.get(1)?,
                department: r.get(2)?,
                level: r.get(3)?,
                subject: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn evaluated_teacher_ids(
    conn: &Connection,
    student: &StudentIdentity,
) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT teacher_id FROM evaluations WHERE student_id = ?")?;
    let ids = stmt
        .query_map([&student.id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

/// Build the list of teachers the student still has to evaluate: both
/// sources merged, already-evaluated teachers dropped.
pub fn load(conn: &Connection, student: &StudentIdentity) -> anyhow::Result<Vec<DirectoryEntry>> {
    let assigned = assigned_rows(conn, student)?;
    let personal = if student.is_college() {
        personal_rows(conn, student)?
    } else {
        Vec::new()
    };
    let evaluated = evaluated_teacher_ids(conn, student)?;

    let merged = merge_sources(assigned, personal)
        .into_iter()
        .filter(|e| !evaluated.contains(&e.teacher_id))
        .collect();
    Ok(merged)
}
