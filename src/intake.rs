use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::directory::DirectoryEntry;

#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub id: String,
    pub usn: String,
    pub full_name: String,
    pub strand_course: String,
    pub section: String,
    pub level: String,
}

impl StudentIdentity {
    pub fn is_college(&self) -> bool {
        self.level == "college"
    }
}

/// One teacher's answers buffered locally before the batch submit. Saving is
/// purely in-memory; re-saving the same teacher overwrites the entry.
#[derive(Debug, Clone)]
pub struct PendingEvaluation {
    pub teacher_id: String,
    pub teacher_name: String,
    pub answers: Map<String, Value>,
    pub positive_comments: String,
    pub suggestions: String,
}

/// Derived overall rating for one buffered entry: the ceiling of the mean of
/// the numeric answers, with 5 as the fallback when that expression is zero
/// or there are no numeric answers at all. Literally `ceil(mean(answers)) || 5`;
/// a policy choice carried over, not a statistic.
pub fn overall_rating(answers: &Map<String, Value>) -> i64 {
    let values: Vec<f64> = answers
        .values()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .collect();
    if values.is_empty() {
        return 5;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let rating = mean.ceil() as i64;
    if rating == 0 {
        5
    } else {
        rating
    }
}

/// Per-student intake session: the teacher list, the stepper position and the
/// buffered evaluations keyed by teacher id. Owned by the process state;
/// nothing here touches the database.
#[derive(Debug)]
pub struct IntakeSession {
    pub student: StudentIdentity,
    pub teachers: Vec<DirectoryEntry>,
    pub pending: HashMap<String, PendingEvaluation>,
    pub current: usize,
    pub submitted: bool,
}

impl IntakeSession {
    pub fn new(student: StudentIdentity, teachers: Vec<DirectoryEntry>) -> Self {
        IntakeSession {
            student,
            teachers,
            pending: HashMap::new(),
            current: 0,
            submitted: false,
        }
    }

    pub fn teacher_count(&self) -> usize {
        self.teachers.len()
    }

    pub fn buffered_count(&self) -> usize {
        self.pending.len()
    }

    /// Final submit is enabled only when every listed teacher has a buffered
    /// entry. An empty list never qualifies.
    pub fn all_evaluated(&self) -> bool {
        !self.teachers.is_empty() && self.pending.len() == self.teachers.len()
    }

    pub fn contains_teacher(&self, teacher_id: &str) -> bool {
        self.teachers.iter().any(|t| t.teacher_id == teacher_id)
    }

    pub fn current_teacher(&self) -> Option<&DirectoryEntry> {
        self.teachers.get(self.current)
    }

    pub fn go_next(&mut self) {
        if self.current + 1 < self.teachers.len() {
            self.current += 1;
        }
    }

    /// Backward navigation only re-displays; buffered answers are untouched.
    pub fn go_previous(&mut self) {
        if self.current > 0 {
            self.current -= 1;
        }
    }

    pub fn save(&mut self, entry: PendingEvaluation) {
        self.pending.insert(entry.teacher_id.clone(), entry);
    }

    /// Swap in a freshly loaded directory (after a personal-list add).
    /// Buffers survive; the stepper position is clamped to the new list.
    pub fn replace_teachers(&mut self, teachers: Vec<DirectoryEntry>) {
        self.teachers = teachers;
        if self.current >= self.teachers.len() {
            self.current = self.teachers.len().saturating_sub(1);
        }
    }

    /// In-memory removal only: drop the teacher from the list and discard any
    /// buffered evaluation for them. Other buffers are unaffected.
    pub fn remove_teacher(&mut self, teacher_id: &str) -> bool {
        let before = self.teachers.len();
        self.teachers.retain(|t| t.teacher_id != teacher_id);
        self.pending.remove(teacher_id);
        if self.current >= self.teachers.len() {
            self.current = self.teachers.len().saturating_sub(1);
        }
        self.teachers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> DirectoryEntry {
        DirectoryEntry {
            teacher_id: id.to_string(),
            name: format!("Teacher {}", id),
            department: "College".to_string(),
            level: "college".to_string(),
            subjects: vec!["Programming".to_string()],
        }
    }

    fn student() -> StudentIdentity {
        StudentIdentity {
            id: "s1".to_string(),
            usn: "2024-0001".to_string(),
            full_name: "Test Student".to_string(),
            strand_course: "BSIT".to_string(),
            section: "1-1".to_string(),
            level: "college".to_string(),
        }
    }

    fn pending(id: &str, answers: Value) -> PendingEvaluation {
        PendingEvaluation {
            teacher_id: id.to_string(),
            teacher_name: format!("Teacher {}", id),
            answers: answers.as_object().unwrap().clone(),
            positive_comments: String::new(),
            suggestions: String::new(),
        }
    }

    #[test]
    fn overall_rating_is_ceiling_of_mean() {
        let a = json!({ "q1": 4, "q2": 5 });
        assert_eq!(overall_rating(a.as_object().unwrap()), 5); // ceil(4.5)
        let b = json!({ "q1": 4, "q2": 4 });
        assert_eq!(overall_rating(b.as_object().unwrap()), 4);
        let c = json!({ "q1": "3", "q2": "4", "q3": "3", "q4": "3" });
        assert_eq!(overall_rating(c.as_object().unwrap()), 4); // ceil(3.25)
    }

    #[test]
    fn overall_rating_stays_in_band_for_valid_answers() {
        for lo in 1..=5_i64 {
            for hi in lo..=5_i64 {
                let a = json!({ "q1": lo, "q2": hi });
                let r = overall_rating(a.as_object().unwrap());
                assert!((1..=5).contains(&r), "rating {} out of band", r);
            }
        }
    }

    #[test]
    fn overall_rating_defaults_to_five_without_numeric_answers() {
        let empty = json!({});
        assert_eq!(overall_rating(empty.as_object().unwrap()), 5);
        let junk = json!({ "q1": "n/a", "note": true });
        assert_eq!(overall_rating(junk.as_object().unwrap()), 5);
        // All-zero answers are falsy in the source's formulation.
        let zeros = json!({ "q1": 0, "q2": 0 });
        assert_eq!(overall_rating(zeros.as_object().unwrap()), 5);
    }

    #[test]
    fn all_evaluated_requires_every_teacher_buffered() {
        let mut s = IntakeSession::new(student(), vec![entry("a"), entry("b")]);
        assert!(!s.all_evaluated());
        s.save(pending("a", json!({ "q1": 4 })));
        assert!(!s.all_evaluated());
        s.save(pending("b", json!({ "q1": 5 })));
        assert!(s.all_evaluated());
        // Re-saving overwrites, count stays.
        s.save(pending("a", json!({ "q1": 3 })));
        assert_eq!(s.buffered_count(), 2);
        assert!(s.all_evaluated());
    }

    #[test]
    fn empty_teacher_list_never_qualifies_for_submit() {
        let s = IntakeSession::new(student(), vec![]);
        assert!(!s.all_evaluated());
    }

    #[test]
    fn stepper_navigation_stays_in_bounds() {
        let mut s = IntakeSession::new(student(), vec![entry("a"), entry("b")]);
        assert_eq!(s.current_teacher().unwrap().teacher_id, "a");
        s.go_previous();
        assert_eq!(s.current, 0);
        s.go_next();
        assert_eq!(s.current_teacher().unwrap().teacher_id, "b");
        s.go_next();
        assert_eq!(s.current, 1);
        s.go_previous();
        assert_eq!(s.current, 0);
    }

    #[test]
    fn removing_a_teacher_discards_only_its_buffer() {
        let mut s = IntakeSession::new(student(), vec![entry("a"), entry("b")]);
        s.save(pending("a", json!({ "q1": 4 })));
        s.save(pending("b", json!({ "q1": 5 })));
        assert!(s.remove_teacher("a"));
        assert_eq!(s.teacher_count(), 1);
        assert!(!s.pending.contains_key("a"));
        assert!(s.pending.contains_key("b"));
        assert!(s.all_evaluated());
    }

    #[test]
    fn replace_teachers_keeps_buffers_and_clamps_index() {
        let mut s = IntakeSession::new(student(), vec![entry("a"), entry("b")]);
        s.save(pending("a", json!({ "q1": 4 })));
        s.go_next();
        s.replace_teachers(vec![entry("a")]);
        assert_eq!(s.current, 0);
        assert!(s.pending.contains_key("a"));
    }
}
