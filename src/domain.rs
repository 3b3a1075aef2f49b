//! Domain models shared by every part of the client: problems with their embedded quiz,
//! quiz outcomes, idea submissions, users and roles.
//!
//! Field names follow the backend's camelCase JSON. Correct-option flags are never part of
//! what a student receives, so `QuizOption` only carries display text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role. Decides the landing view after authentication.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Company,
  Student,
}

impl Role {
  /// Admins and companies own problems and land on the dashboard.
  pub fn manages_problems(self) -> bool {
    matches!(self, Role::Admin | Role::Company)
  }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Role::Admin => "admin",
      Role::Company => "company",
      Role::Student => "student",
    };
    f.write_str(s)
  }
}

impl std::str::FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "admin" => Ok(Role::Admin),
      "company" => Ok(Role::Company),
      "student" => Ok(Role::Student),
      other => Err(format!("unknown role '{other}'")),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
  #[default]
  MultipleChoice,
  Boolean,
  Text,
}

/// One selectable option as a student sees it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizOption {
  pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question: String,
  #[serde(default, rename = "type")]
  pub kind: QuestionType,
  #[serde(default)]
  pub options: Vec<QuizOption>,
  #[serde(default = "default_points")]
  pub points: u32,
}

fn default_points() -> u32 { 1 }

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
  #[serde(default)] pub enabled: bool,
  #[serde(default)] pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub questions: Vec<Question>,
  /// Minutes.
  #[serde(default = "default_time_limit")]
  pub time_limit: u32,
  /// Percentage, 0..=100.
  #[serde(default = "default_passing_score")]
  pub passing_score: u32,
}

fn default_time_limit() -> u32 { 30 }
fn default_passing_score() -> u32 { 70 }

impl Quiz {
  /// A disabled quiz or one without questions gates nothing.
  pub fn is_required(&self) -> bool {
    self.enabled && !self.questions.is_empty()
  }

  /// Countdown length. A zero limit still gets one minute, the authoring minimum.
  pub fn time_limit_secs(&self) -> u32 {
    self.time_limit.max(1).saturating_mul(60)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  #[serde(default)] pub file_name: String,
  #[serde(default)] pub url: String,
  #[serde(default)] pub size: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  /// Missing on drafts and on some legacy records.
  #[serde(default, rename = "_id", alias = "id")]
  pub id: Option<String>,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub video_url: Option<String>,
  #[serde(default)] pub difficulty: Difficulty,
  #[serde(default)] pub tags: Vec<String>,
  #[serde(default)] pub quiz: Option<Quiz>,
  #[serde(default)] pub attachments: Vec<Attachment>,
  /// Display name of the posting company.
  #[serde(default)] pub company: Option<String>,
  #[serde(default)] pub branch: Option<String>,
  #[serde(default)] pub is_urgent: bool,
  #[serde(default)] pub ideas_count: u32,
  #[serde(default)] pub created_at: Option<DateTime<Utc>>,
}

impl Problem {
  /// The quiz that must be passed before an idea can be submitted, if any.
  pub fn required_quiz(&self) -> Option<&Quiz> {
    self.quiz.as_ref().filter(|q| q.is_required())
  }
}

/// Server-computed outcome of one student's attempt at one problem's quiz.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResponse {
  #[serde(default)] pub total_score: f64,
  #[serde(default)] pub max_score: f64,
  #[serde(default)] pub percentage: f64,
  pub passed: bool,
  #[serde(default)] pub time_spent: u32,
  #[serde(default)] pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSubmission {
  #[serde(default, rename = "_id", alias = "id")]
  pub id: Option<String>,
  pub problem_id: String,
  pub idea_text: String,
  #[serde(default)] pub implementation_approach: String,
  #[serde(default)] pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(rename = "_id", alias = "id")]
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub email: String,
  pub role: Role,
  #[serde(default)] pub profile_image: Option<String>,
  #[serde(default)] pub company_name: Option<String>,
  #[serde(default)] pub branch: Option<String>,
}
