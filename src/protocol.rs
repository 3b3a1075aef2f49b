//! Wire DTOs for every backend endpoint the client calls (serde ready, camelCase JSON).
//! Keep this small and stable so the client and backend can evolve independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, QuestionType, QuizResponse, Role, User};

//
// Authentication
//

#[derive(Serialize)]
pub struct LoginIn<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupIn<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
  pub role: Role,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub company_name: Option<&'a str>,
}

#[derive(Serialize)]
pub struct GoogleAuthIn<'a> {
  pub credential: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
}

/// Every successful auth exchange answers `{ token, ...userFields }`.
#[derive(Debug, Deserialize)]
pub struct AuthOut {
  pub token: String,
  #[serde(flatten)]
  pub user: User,
}

//
// Quiz
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
  pub question_index: usize,
  pub answer: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizIn {
  pub problem_id: String,
  /// Sparse: unanswered questions are absent.
  pub answers: Vec<AnswerIn>,
  pub time_spent: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizOut {
  pub result: QuizResponse,
}

//
// Ideas
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdeaIn {
  pub problem_id: String,
  pub idea_text: String,
  pub implementation_approach: String,
}

//
// Problem authoring (owners see correctness flags)
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionIn {
  pub text: String,
  pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionIn {
  pub question: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub options: Vec<OptionIn>,
  pub points: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizIn {
  pub enabled: bool,
  pub title: String,
  pub description: String,
  pub questions: Vec<QuestionIn>,
  pub time_limit: u32,
  pub passing_score: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemIn {
  pub title: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub video_url: Option<String>,
  pub difficulty: Difficulty,
  pub tags: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  pub is_urgent: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub quiz: Option<QuizIn>,
}

//
// Users & notifications
//

#[derive(Serialize)]
pub struct RoleIn {
  pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UnreadCountOut {
  #[serde(alias = "unreadCount")]
  pub count: u32,
}

/// Error body shapes seen from the backend: `{ message }` or `{ error }`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

/// Extract a clean error message from a backend body, if it carries one.
pub fn extract_error_message(body: &str) -> Option<String> {
  let parsed: ErrorBody = serde_json::from_str(body).ok()?;
  parsed
    .message
    .or(parsed.error)
    .map(|m| m.trim().to_string())
    .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn submit_payload_uses_camel_case_and_sparse_answers() {
    let body = SubmitQuizIn {
      problem_id: "p1".into(),
      answers: vec![AnswerIn { question_index: 1, answer: "B".into() }],
      time_spent: 42,
    };
    let v = serde_json::to_value(&body).expect("json");
    assert_eq!(
      v,
      serde_json::json!({ "problemId": "p1", "answers": [{ "questionIndex": 1, "answer": "B" }], "timeSpent": 42 })
    );
  }

  #[test]
  fn auth_out_flattens_user_fields() {
    let out: AuthOut = serde_json::from_str(
      r#"{ "token": "t", "_id": "u1", "name": "Ada", "email": "a@x.io", "role": "student", "profileImage": "default.jpg" }"#,
    )
    .expect("auth");
    assert_eq!(out.token, "t");
    assert_eq!(out.user.id, "u1");
    assert_eq!(out.user.role, Role::Student);
  }

  #[test]
  fn error_message_prefers_message_then_error() {
    assert_eq!(extract_error_message(r#"{"message":"Quiz not found"}"#).as_deref(), Some("Quiz not found"));
    assert_eq!(extract_error_message(r#"{"error":"bad"}"#).as_deref(), Some("bad"));
    assert_eq!(extract_error_message("<html>"), None);
    assert_eq!(extract_error_message(r#"{"message":""}"#), None);
  }
}
