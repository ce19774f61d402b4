mod test_support;

use serde_json::json;
use test_support::{temp_dir, Session};

const ROSTER: &str = "RegNo,Name,Semester,Section,Email,Phone,ParentPhone
1RV22CS001,Asha,3,A,asha@college.edu,9000000001,9000000002
,Nameless,3,A
1RV22CS002,\"Rao, Kiran\",5,B
1RV22CS001,Asha Again,3,A
orphan
1RV22CS003,Meera,3 / C,9998887777
";

fn find<'a>(list: &'a serde_json::Value, reg_no: &str) -> &'a serde_json::Value {
    list["students"]
        .as_array()
        .expect("students")
        .iter()
        .find(|s| s["regNo"] == reg_no)
        .expect("student in list")
}

#[test]
fn csv_import_adds_skips_and_reports_rows() {
    let workspace = temp_dir("ciemark-csv-import");
    let mut s = Session::open(&workspace);

    let out = s.ok(
        "students.importCsv",
        json!({ "department": "CSE", "csv": ROSTER }),
    );
    assert_eq!(out["added"], 3);
    assert_eq!(out["skipped"], 1);
    assert_eq!(out["errors"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(out["errors"][0]["row"], 3);
    assert_eq!(out["errors"][0]["message"], "Row 3: Missing RegNo or Name");

    let list = s.ok("students.list", json!({ "department": "CSE" }));
    assert_eq!(list["students"].as_array().map(|a| a.len()), Some(3));

    let asha = find(&list, "1RV22CS001");
    assert_eq!(asha["name"], "Asha");
    assert_eq!(asha["semester"], 3);
    assert_eq!(asha["section"], "A");
    assert_eq!(asha["parentPhone"], "9000000002");

    let kiran = find(&list, "1RV22CS002");
    assert_eq!(kiran["name"], "Rao, Kiran");
    assert_eq!(kiran["section"], "B");
    assert_eq!(kiran["semester"], 5);

    let meera = find(&list, "1RV22CS003");
    assert_eq!(meera["semester"], 3);
    assert_eq!(meera["section"], "C");
    assert_eq!(meera["parentPhone"], "9998887777");
    assert_eq!(meera["email"], "1rv22cs003@student.college.edu");
    assert_eq!(meera["department"], "CSE");

    let again = s.ok(
        "students.importCsv",
        json!({ "department": "CSE", "csv": ROSTER }),
    );
    assert_eq!(again["added"], 0);
    assert_eq!(again["skipped"], 3);

    s.shutdown();
}

#[test]
fn csv_import_reads_files_and_rejects_missing_input() {
    let workspace = temp_dir("ciemark-csv-path");
    let mut s = Session::open(&workspace);

    let file = workspace.join("ece.csv");
    std::fs::write(&file, "1RV22EC001,Ravi,5,A\n1RV22EC002,Divya,5,B\n").expect("write csv");

    let out = s.ok(
        "students.importCsv",
        json!({ "department": "ECE", "path": file.to_string_lossy() }),
    );
    assert_eq!(out["added"], 2);
    let list = s.ok("students.list", json!({ "department": "ECE" }));
    assert_eq!(list["students"].as_array().map(|a| a.len()), Some(2));

    assert_eq!(
        s.err_code("students.importCsv", json!({ "department": "ECE" })),
        "bad_params"
    );
    assert_eq!(
        s.err_code("students.importCsv", json!({ "csv": "1RV22EC003,Arun" })),
        "bad_params"
    );
    assert_eq!(
        s.err_code(
            "students.importCsv",
            json!({ "department": "ECE", "path": workspace.join("missing.csv").to_string_lossy() })
        ),
        "io_failed"
    );

    s.shutdown();
}

#[test]
fn deleting_students_removes_their_marks() {
    let workspace = temp_dir("ciemark-students-delete");
    let mut s = Session::open(&workspace);

    let py = s.subject("Python", "CS301", "CSE");
    let s1 = s.student("S1", "CSE", "A");
    s.student("S2", "CSE", "A");
    s.student("S3", "CSE", "B");
    s.write(&s1, &py, "CIE1", json!(30));

    assert_eq!(
        s.err_code("students.create", json!({ "regNo": "S1", "name": "Dup" })),
        "invalid_state"
    );

    let deleted = s.ok("students.delete", json!({ "regNo": "S1" }));
    assert_eq!(deleted["deleted"], "S1");
    let marks = s.ok("marks.listBySubject", json!({ "subjectId": py }));
    assert_eq!(marks["marks"].as_array().map(|a| a.len()), Some(0));

    assert_eq!(s.err_code("students.delete", json!({ "regNo": "S1" })), "not_found");
    assert_eq!(s.err_code("students.dashboard", json!({ "regNo": "S1" })), "not_found");

    let bulk = s.ok("students.deleteBulk", json!({ "regNos": ["S2", "NOPE"] }));
    assert_eq!(bulk["deleted"], 1);
    assert_eq!(bulk["missing"], json!(["NOPE"]));

    let bulk = s.ok("students.deleteBulk", json!({ "regNos": "S3" }));
    assert_eq!(bulk["deleted"], 1);

    let list = s.ok("students.list", json!({}));
    assert_eq!(list["students"].as_array().map(|a| a.len()), Some(0));

    s.shutdown();
}
