use serde::Serialize;

/// Percentage bands, evaluated high to low with inclusive lower bounds.
/// The same letters are reused for overall grades, but keyed on absolute
/// CGPA thresholds instead of percentage.
const GRADE_BANDS: [(f64, &str, f64); 6] = [
    (80.0, "A+", 5.0),
    (70.0, "A", 4.0),
    (60.0, "A-", 3.5),
    (50.0, "B", 3.0),
    (40.0, "C", 2.0),
    (33.0, "D", 1.0),
];

const CGPA_BANDS: [(f64, &str); 6] = [
    (5.0, "A+"),
    (4.0, "A"),
    (3.5, "A-"),
    (3.0, "B"),
    (2.0, "C"),
    (1.0, "D"),
];

#[derive(Debug, Clone, Serialize)]
pub struct GradeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GradeError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectGrade {
    pub grade: &'static str,
    pub gpa: f64,
    pub is_passed: bool,
}

/// Grade one subject's obtained marks against the exam's per-subject
/// maximum and pass threshold. Pure: same inputs, same outputs.
///
/// The pass flag compares obtained marks against `pass_marks` directly and
/// is independent of the percentage band; exams may set a pass mark that
/// does not coincide with the 33% D boundary.
pub fn grade_subject(
    total_obtained: f64,
    total_possible: f64,
    pass_marks: f64,
) -> Result<SubjectGrade, GradeError> {
    if total_possible <= 0.0 {
        return Err(GradeError::new(
            "exam_config_invalid",
            "examination total_marks must be positive",
        ));
    }

    let percentage = total_obtained / total_possible * 100.0;
    let (grade, gpa) = GRADE_BANDS
        .iter()
        .find(|(floor, _, _)| percentage >= *floor)
        .map(|(_, g, p)| (*g, *p))
        .unwrap_or(("F", 0.0));

    Ok(SubjectGrade {
        grade,
        gpa,
        is_passed: total_obtained >= pass_marks,
    })
}

/// Map a CGPA (mean of subject grade points) to the overall letter grade.
pub fn overall_grade(cgpa: f64) -> &'static str {
    CGPA_BANDS
        .iter()
        .find(|(floor, _)| cgpa >= *floor)
        .map(|(_, g)| *g)
        .unwrap_or("F")
}
