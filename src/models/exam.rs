// src/models/exam.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// How an exam is administered. Written exams run through the token-based
/// candidate sub-flow; the other types are examiner-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    Written,
    Practical,
    Oral,
    Scenario,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::Written => "written",
            ExamType::Practical => "practical",
            ExamType::Oral => "oral",
            ExamType::Scenario => "scenario",
        }
    }

    pub fn parse(s: &str) -> Option<ExamType> {
        match s {
            "written" => Some(ExamType::Written),
            "practical" => Some(ExamType::Practical),
            "oral" => Some(ExamType::Oral),
            "scenario" => Some(ExamType::Scenario),
            _ => None,
        }
    }
}

/// Question kinds. Only multiple choice is auto-scored; the rest count
/// solely through examiner-entered overrides at finalize time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    Open,
    Scenario,
    Practical,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Open => "open",
            QuestionType::Scenario => "scenario",
            QuestionType::Practical => "practical",
        }
    }

    pub fn parse(s: &str) -> Option<QuestionType> {
        match s {
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "open" => Some(QuestionType::Open),
            "scenario" => Some(QuestionType::Scenario),
            "practical" => Some(QuestionType::Practical),
            _ => None,
        }
    }
}

/// A reusable assessment definition, department-scoped.
#[derive(Debug, Clone, Serialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub exam_type: ExamType,
    pub department: String,
    pub created_by: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One question of an exam. Order is significant and preserved exactly as
/// authored (`order_index` ascending).
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    /// Designated correct option for auto-scoring. A multiple-choice
    /// question without one is valid but always scores 0.
    pub correct_answer: Option<String>,
    pub points: i64,
    pub order_index: i64,
}

/// DTO for sending a question to a candidate (excludes the correct answer).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub points: i64,
    pub order_index: i64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            text: q.text.clone(),
            question_type: q.question_type,
            options: q.options.clone(),
            points: q.points,
            order_index: q.order_index,
        }
    }
}

/// DTO for one authored question inside a create-exam payload. Questions
/// keep the order in which they appear in the payload.
#[derive(Debug, Deserialize, Validate)]
pub struct NewQuestion {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    #[validate(range(min = 1, message = "Questions must be worth at least 1 point."))]
    pub points: i64,
}

impl NewQuestion {
    /// Cross-field checks the derive validator cannot express.
    pub fn check(&self) -> Result<(), AppError> {
        match self.question_type {
            QuestionType::MultipleChoice => {
                if self.options.iter().all(|o| o.trim().is_empty()) {
                    return Err(AppError::BadRequest(
                        "Multiple-choice questions need at least one non-empty option".to_string(),
                    ));
                }
                if let Some(answer) = &self.correct_answer {
                    if !self.options.contains(answer) {
                        return Err(AppError::BadRequest(
                            "The correct answer must be one of the options".to_string(),
                        ));
                    }
                }
            }
            _ => {
                if !self.options.is_empty() || self.correct_answer.is_some() {
                    return Err(AppError::BadRequest(
                        "Options and correct answers apply to multiple-choice questions only"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// DTO for creating a new exam together with its ordered questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 150, message = "Title must not be blank."))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub exam_type: ExamType,
    #[validate(
        length(min = 1, message = "Department must be specified."),
        custom(function = super::validate_department)
    )]
    pub department: String,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<NewQuestion>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() > 12 {
        return Err(validator::ValidationError::new("too_many_options"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
