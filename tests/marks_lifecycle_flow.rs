mod test_support;

use serde_json::json;
use test_support::{faculty_actor, temp_dir, Session};

fn mark_for<'a>(marks: &'a serde_json::Value, student: &str) -> &'a serde_json::Value {
    marks["marks"]
        .as_array()
        .expect("marks")
        .iter()
        .find(|m| m["studentId"] == student)
        .expect("mark for student")
}

#[test]
fn score_moves_from_entry_to_student_dashboard() {
    let workspace = temp_dir("ciemark-lifecycle-flow");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let s1 = s.student("S1", "CSE", "A");
    let _s2 = s.student("S2", "CSE", "A");

    let written = s.write(&s1, &py, "round 1", json!(35));
    assert_eq!(written["affected"], 1);
    assert_eq!(written["mark"]["status"], "PENDING");
    assert_eq!(written["mark"]["score"], 35.0);
    assert_eq!(written["mark"]["round"], "CIE1");

    assert_eq!(s.transition("marks.submitRound", &py, "CIE1"), 1);
    assert_eq!(s.transition("marks.submitRound", &py, "CIE1"), 0);
    assert_eq!(s.transition("marks.approveRound", &py, "CIE1"), 1);
    assert_eq!(s.transition("marks.approveRound", &py, "CIE1"), 0);
    assert_eq!(s.transition("marks.rejectRound", &py, "CIE1"), 0);

    let dash = s.ok("students.dashboard", json!({ "regNo": "S1" }));
    assert_eq!(dash["approvedCount"], 1);
    assert_eq!(dash["average"], 35.0);
    assert_eq!(dash["subjects"][0]["name"], "Python");
    assert_eq!(dash["subjects"][0]["marks"]["CIE1"], 35.0);

    let other = s.ok("students.dashboard", json!({ "regNo": "S2" }));
    assert_eq!(other["approvedCount"], 0);

    let stats = s.ok("analytics.department", json!({ "department": "CSE" }));
    assert_eq!(stats["cieTrend"]["CIE1"], 35.0);
    assert_eq!(stats["gradeDistribution"]["data"], json!([0, 1, 0, 0, 0]));
    assert_eq!(stats["atRiskCount"], 0);

    s.shutdown();
}

#[test]
fn unlock_round_trip_restores_approval() {
    let workspace = temp_dir("ciemark-lifecycle-unlock");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let s1 = s.student("S1", "CSE", "A");
    let s2 = s.student("S2", "CSE", "A");

    s.write(&s1, &py, "CIE1", json!(35));
    s.write(&s2, &py, "CIE2", json!(20));
    s.transition("marks.submitRound", &py, "CIE1");
    s.transition("marks.approveRound", &py, "CIE1");

    let unlocked = s.ok(
        "marks.unlockRound",
        json!({ "actor": { "username": "hod1", "role": "hod" }, "subjectId": py, "round": "CIE1" }),
    );
    assert_eq!(unlocked["created"], 1);
    assert_eq!(unlocked["affected"], 2);

    let marks = s.ok("marks.listBySubject", json!({ "subjectId": py, "round": "CIE1" }));
    assert_eq!(marks["marks"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(mark_for(&marks, &s1)["status"], "PENDING");
    assert_eq!(mark_for(&marks, &s1)["score"], 35.0);
    assert!(mark_for(&marks, &s2)["score"].is_null());
    assert_eq!(mark_for(&marks, &s2)["regNo"], "S2");

    // The unscored placeholder is never submitted.
    assert_eq!(s.transition("marks.submitRound", &py, "CIE1"), 1);
    assert_eq!(s.transition("marks.approveRound", &py, "CIE1"), 1);
    let marks = s.ok("marks.listBySubject", json!({ "subjectId": py, "round": "CIE1" }));
    assert_eq!(mark_for(&marks, &s1)["status"], "APPROVED");
    assert_eq!(mark_for(&marks, &s2)["status"], "PENDING");

    let dash = s.ok("students.dashboard", json!({ "regNo": "S1" }));
    assert_eq!(dash["subjects"][0]["marks"]["CIE1"], 35.0);

    s.shutdown();
}

#[test]
fn rejected_marks_reopen_on_edit_and_approved_edits_reopen() {
    let workspace = temp_dir("ciemark-lifecycle-reject");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let s1 = s.student("S1", "CSE", "A");

    s.write(&s1, &py, "CIE2", json!(20));
    assert_eq!(s.transition("marks.submitRound", &py, "CIE2"), 1);
    assert_eq!(s.transition("marks.rejectRound", &py, "CIE2"), 1);
    assert_eq!(s.transition("marks.approveRound", &py, "CIE2"), 0);
    assert_eq!(s.transition("marks.submitRound", &py, "CIE2"), 0);

    let edited = s.write(&s1, &py, "CIE2", json!(22));
    assert_eq!(edited["reopened"], false);
    assert_eq!(edited["mark"]["status"], "PENDING");
    assert_eq!(s.transition("marks.submitRound", &py, "CIE2"), 1);
    assert_eq!(s.transition("marks.approveRound", &py, "CIE2"), 1);

    let reopened = s.write(&s1, &py, "CIE2", json!(23));
    assert_eq!(reopened["reopened"], true);
    assert_eq!(reopened["mark"]["status"], "PENDING");
    assert_eq!(reopened["mark"]["updatedBy"], "fac1");

    // With edits locked, approved marks must be unlocked first.
    s.ok("settings.update", json!({ "settings": { "lockApprovedEdits": true } }));
    s.transition("marks.submitRound", &py, "CIE2");
    s.transition("marks.approveRound", &py, "CIE2");
    let code = s.err_code(
        "marks.write",
        json!({ "actor": faculty_actor(), "studentId": s1, "subjectId": py, "round": "CIE2", "score": 10 }),
    );
    assert_eq!(code, "invalid_state");
    s.transition("marks.unlockRound", &py, "CIE2");
    let after = s.write(&s1, &py, "CIE2", json!(10));
    assert_eq!(after["mark"]["score"], 10.0);

    s.shutdown();
}

#[test]
fn write_rejects_bad_input() {
    let workspace = temp_dir("ciemark-lifecycle-errors");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let s1 = s.student("S1", "CSE", "A");

    let base = |student: &str, round: &str, score: serde_json::Value| {
        json!({ "actor": faculty_actor(), "studentId": student, "subjectId": py, "round": round, "score": score })
    };
    assert_eq!(s.err_code("marks.write", base("ghost", "CIE1", json!(10))), "not_found");
    assert_eq!(s.err_code("marks.write", base(s1.as_str(), "CIE9", json!(10))), "bad_params");
    assert_eq!(s.err_code("marks.write", base(s1.as_str(), "CIE1", json!(-2))), "bad_params");
    assert_eq!(s.err_code("marks.write", base(s1.as_str(), "CIE1", json!(60))), "bad_params");
    assert_eq!(
        s.err_code(
            "marks.write",
            json!({ "studentId": s1, "subjectId": py, "round": "CIE1", "score": 10 })
        ),
        "bad_params"
    );

    // Absent score with no prior record writes nothing.
    let noop = s.write(&s1, &py, "CIE1", serde_json::Value::Null);
    assert_eq!(noop["affected"], 0);
    let marks = s.ok("marks.listBySubject", json!({ "subjectId": py }));
    assert_eq!(marks["marks"].as_array().map(|a| a.len()), Some(0));

    // Unknown subject/round pairs are a no-op, not an error.
    assert_eq!(s.transition("marks.submitRound", "no-such-subject", "CIE1"), 0);

    s.shutdown();
}

#[test]
fn batch_write_reports_rows_and_pending_queue() {
    let workspace = temp_dir("ciemark-lifecycle-batch");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let db = s.subject("DBMS", "CS302", "CSE");
    let s1 = s.student("S1", "CSE", "A");
    let s2 = s.student("S2", "CSE", "A");

    let out = s.ok(
        "marks.writeBatch",
        json!({
            "actor": faculty_actor(),
            "entries": [
                { "studentId": s1, "subjectId": py, "round": "CIE1", "score": 30 },
                { "studentId": s2, "subjectId": py, "round": "CIE1", "score": 25 },
                { "studentId": s2, "subjectId": py, "round": "midterm", "score": 25 },
                { "studentId": "ghost", "subjectId": py, "round": "CIE1", "score": 25 },
                { "studentId": s1, "subjectId": db, "round": "2", "score": 41 }
            ]
        }),
    );
    assert_eq!(out["updated"], 3);
    assert_eq!(out["rejected"], 2);
    assert_eq!(out["errors"][0]["index"], 2);
    assert_eq!(out["errors"][0]["code"], "bad_params");
    assert_eq!(out["errors"][1]["index"], 3);
    assert_eq!(out["errors"][1]["code"], "not_found");

    s.transition("marks.submitRound", &py, "CIE1");
    s.transition("marks.submitRound", &db, "CIE2");
    let pending = s.ok("marks.pendingApprovals", json!({ "department": "CSE" }));
    let groups = pending["pending"].as_array().expect("pending groups");
    assert_eq!(groups.len(), 2);
    let py_group = groups
        .iter()
        .find(|g| g["subjectName"] == "Python")
        .expect("python group");
    assert_eq!(py_group["round"], "CIE1");
    assert_eq!(py_group["count"], 2);

    s.shutdown();
}
