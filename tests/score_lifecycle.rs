use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct ExamFixture {
    classroom_id: String,
    exam_id: String,
    subject_id: String,
    student_a: String,
    student_b: String,
}

fn setup_exam(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> ExamFixture {
    request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let classroom_id = request_ok(
        stdin,
        reader,
        "setup-class",
        "classrooms.create",
        json!({ "name": "Class Five", "gradeLevel": "5" }),
    )["classroomId"]
        .as_str()
        .expect("classroomId")
        .to_string();
    let student_a = request_ok(
        stdin,
        reader,
        "setup-stu-a",
        "students.create",
        json!({ "classroomId": classroom_id, "lastName": "Akhtar", "firstName": "Amina", "rollNumber": "1" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();
    let student_b = request_ok(
        stdin,
        reader,
        "setup-stu-b",
        "students.create",
        json!({ "classroomId": classroom_id, "lastName": "Barua", "firstName": "Bashir", "rollNumber": "2" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();
    let subject_id = request_ok(
        stdin,
        reader,
        "setup-subj",
        "subjects.create",
        json!({ "name": "Mathematics" }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    let exam_id = request_ok(
        stdin,
        reader,
        "setup-exam",
        "exams.create",
        json!({
            "classroomId": classroom_id,
            "name": "Annual Examination",
            "examType": "annual",
            "totalMarks": 100,
            "passMarks": 33
        }),
    )["examinationId"]
        .as_str()
        .expect("examinationId")
        .to_string();
    ExamFixture {
        classroom_id,
        exam_id,
        subject_id,
        student_a,
        student_b,
    }
}

#[test]
fn scoring_grades_aggregates_and_ranks_two_students() {
    let workspace = temp_dir("resultsd-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let f = setup_exam(&mut stdin, &mut reader, &workspace);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "score-a",
        "results.scoreSubject",
        json!({
            "examinationId": f.exam_id,
            "studentId": f.student_a,
            "subjectId": f.subject_id,
            "writtenMarks": 60,
            "mcqMarks": 15,
            "practicalMarks": 0
        }),
    );
    assert_eq!(res["created"], json!(true));
    assert_eq!(res["score"]["totalObtained"], json!(75.0));
    assert_eq!(res["score"]["grade"], json!("A"));
    assert_eq!(res["score"]["gpa"], json!(4.0));
    assert_eq!(res["score"]["isPassed"], json!(true));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "score-b",
        "results.scoreSubject",
        json!({
            "examinationId": f.exam_id,
            "studentId": f.student_b,
            "subjectId": f.subject_id,
            "writtenMarks": 20,
            "mcqMarks": 5,
            "practicalMarks": 0
        }),
    );
    assert_eq!(res["score"]["grade"], json!("F"));
    assert_eq!(res["score"]["isPassed"], json!(false));

    let overall_a = request_ok(
        &mut stdin,
        &mut reader,
        "overall-a",
        "results.overall",
        json!({ "examinationId": f.exam_id, "studentId": f.student_a }),
    );
    assert_eq!(overall_a["overall"]["cgpa"], json!(4.0));
    assert_eq!(overall_a["overall"]["grade"], json!("A"));
    assert_eq!(overall_a["overall"]["isPassed"], json!(true));
    assert_eq!(overall_a["overall"]["rank"], json!(1));
    assert_eq!(overall_a["overall"]["percentage"], json!(75.0));

    let overall_b = request_ok(
        &mut stdin,
        &mut reader,
        "overall-b",
        "results.overall",
        json!({ "examinationId": f.exam_id, "studentId": f.student_b }),
    );
    assert_eq!(overall_b["overall"]["cgpa"], json!(0.0));
    assert_eq!(overall_b["overall"]["grade"], json!("F"));
    assert_eq!(overall_b["overall"]["isPassed"], json!(false));
    assert_eq!(overall_b["overall"]["rank"], json!(2));

    let _ = child.kill();
}

#[test]
fn rescoring_identical_marks_changes_nothing() {
    let workspace = temp_dir("resultsd-idempotent");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let f = setup_exam(&mut stdin, &mut reader, &workspace);

    let params = json!({
        "examinationId": f.exam_id,
        "studentId": f.student_a,
        "subjectId": f.subject_id,
        "writtenMarks": 60,
        "mcqMarks": 15,
        "practicalMarks": 0
    });
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "score-1",
        "results.scoreSubject",
        params.clone(),
    );
    assert_eq!(first["created"], json!(true));
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "overall-1",
        "results.overall",
        json!({ "examinationId": f.exam_id, "studentId": f.student_a }),
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "score-2",
        "results.scoreSubject",
        params,
    );
    assert_eq!(second["created"], json!(false));
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "overall-2",
        "results.overall",
        json!({ "examinationId": f.exam_id, "studentId": f.student_a }),
    );

    assert_eq!(before["overall"]["cgpa"], after["overall"]["cgpa"]);
    assert_eq!(before["overall"]["percentage"], after["overall"]["percentage"]);
    assert_eq!(before["overall"]["rank"], after["overall"]["rank"]);

    let scores = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "results.listScores",
        json!({ "examinationId": f.exam_id, "studentId": f.student_a }),
    );
    assert_eq!(scores["scores"].as_array().map(|a| a.len()), Some(1));

    let _ = child.kill();
}

#[test]
fn deleting_last_score_removes_overall_and_compresses_ranks() {
    let workspace = temp_dir("resultsd-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let f = setup_exam(&mut stdin, &mut reader, &workspace);

    for (id, student, written) in [
        ("score-a", &f.student_a, 75),
        ("score-b", &f.student_b, 85),
    ] {
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "results.scoreSubject",
            json!({
                "examinationId": f.exam_id,
                "studentId": student,
                "subjectId": f.subject_id,
                "writtenMarks": written
            }),
        );
    }

    request_ok(
        &mut stdin,
        &mut reader,
        "delete-b",
        "results.deleteScore",
        json!({
            "examinationId": f.exam_id,
            "studentId": f.student_b,
            "subjectId": f.subject_id
        }),
    );

    let gone = request(
        &mut stdin,
        &mut reader,
        "overall-b",
        "results.overall",
        json!({ "examinationId": f.exam_id, "studentId": f.student_b }),
    );
    assert_eq!(gone["ok"], json!(false));
    assert_eq!(gone["error"]["code"], json!("not_found"));

    // Survivor moves up to rank 1; the board has no holes.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "board",
        "results.leaderboard",
        json!({ "examinationId": f.exam_id }),
    );
    let rows = board["leaderboard"].as_array().expect("leaderboard rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentId"].as_str(), Some(f.student_a.as_str()));
    assert_eq!(rows[0]["rank"], json!(1));

    // Deleting again reports not_found, nothing to corrupt.
    let again = request(
        &mut stdin,
        &mut reader,
        "delete-again",
        "results.deleteScore",
        json!({
            "examinationId": f.exam_id,
            "studentId": f.student_b,
            "subjectId": f.subject_id
        }),
    );
    assert_eq!(again["error"]["code"], json!("not_found"));

    let _ = child.kill();
}

#[test]
fn classroom_scoping_rejects_outsiders() {
    let workspace = temp_dir("resultsd-enrollment");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let f = setup_exam(&mut stdin, &mut reader, &workspace);

    let other_class = request_ok(
        &mut stdin,
        &mut reader,
        "other-class",
        "classrooms.create",
        json!({ "name": "Class Six" }),
    )["classroomId"]
        .as_str()
        .expect("classroomId")
        .to_string();
    let outsider = request_ok(
        &mut stdin,
        &mut reader,
        "outsider",
        "students.create",
        json!({ "classroomId": other_class, "lastName": "Xiu", "firstName": "Xena" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "score-outsider",
        "results.scoreSubject",
        json!({
            "examinationId": f.exam_id,
            "studentId": outsider,
            "subjectId": f.subject_id,
            "writtenMarks": 50
        }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("not_enrolled"));

    // The classroom fixture is still usable afterwards.
    let students = request_ok(
        &mut stdin,
        &mut reader,
        "list-students",
        "students.list",
        json!({ "classroomId": f.classroom_id }),
    );
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(2));

    let _ = child.kill();
}
