//! Owner and admin management: the problem authoring form (tags, quiz authoring,
//! attachments) and the admin user list.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::domain::{Attachment, Difficulty, QuestionType, Role, User};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::protocol::{OptionIn, ProblemIn, QuestionIn, QuizIn};
use crate::util::InFlight;

#[derive(Clone, Debug, PartialEq)]
pub struct QuestionDraft {
  pub question: String,
  pub kind: QuestionType,
  pub options: Vec<OptionIn>,
  pub points: u32,
}

impl QuestionDraft {
  pub fn new(kind: QuestionType) -> Self {
    let options = match kind {
      QuestionType::Boolean => vec![
        OptionIn { text: "True".into(), is_correct: true },
        OptionIn { text: "False".into(), is_correct: false },
      ],
      _ => vec![],
    };
    Self { question: String::new(), kind, options, points: 1 }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuizDraft {
  pub title: String,
  pub description: String,
  pub questions: Vec<QuestionDraft>,
  pub time_limit: u32,
  pub passing_score: u32,
}

impl Default for QuizDraft {
  fn default() -> Self {
    Self { title: String::new(), description: String::new(), questions: vec![], time_limit: 30, passing_score: 70 }
  }
}

impl QuizDraft {
  pub fn add_question(&mut self, kind: QuestionType) -> usize {
    self.questions.push(QuestionDraft::new(kind));
    self.questions.len() - 1
  }

  pub fn remove_question(&mut self, index: usize) -> Option<QuestionDraft> {
    (index < self.questions.len()).then(|| self.questions.remove(index))
  }

  /// Free-text questions take no options.
  pub fn add_option(&mut self, question: usize, text: &str) -> bool {
    match self.questions.get_mut(question) {
      Some(q) if q.kind == QuestionType::MultipleChoice && !text.trim().is_empty() => {
        q.options.push(OptionIn { text: text.trim().to_string(), is_correct: false });
        true
      }
      _ => false,
    }
  }

  pub fn remove_option(&mut self, question: usize, option: usize) -> bool {
    match self.questions.get_mut(question) {
      Some(q) if q.kind == QuestionType::MultipleChoice && option < q.options.len() => {
        q.options.remove(option);
        true
      }
      _ => false,
    }
  }

  /// Exactly one option is correct at a time.
  pub fn mark_correct(&mut self, question: usize, option: usize) -> bool {
    match self.questions.get_mut(question) {
      Some(q) if option < q.options.len() => {
        for (i, o) in q.options.iter_mut().enumerate() {
          o.is_correct = i == option;
        }
        true
      }
      _ => false,
    }
  }

  fn validate(&self) -> Result<QuizIn, ApiError> {
    let invalid = |m: String| Err(ApiError::Validation(m));
    if self.questions.is_empty() {
      return invalid("Add at least one quiz question or disable the quiz.".into());
    }
    if self.time_limit == 0 {
      return invalid("Quiz time limit must be at least one minute.".into());
    }
    if self.passing_score > 100 {
      return invalid("Passing score must be between 0 and 100.".into());
    }
    for (i, q) in self.questions.iter().enumerate() {
      let n = i + 1;
      if q.question.trim().is_empty() {
        return invalid(format!("Question {n} has no text."));
      }
      if q.points == 0 {
        return invalid(format!("Question {n} must be worth at least one point."));
      }
      match q.kind {
        QuestionType::MultipleChoice if q.options.len() < 2 => {
          return invalid(format!("Question {n} needs at least two options."));
        }
        QuestionType::MultipleChoice | QuestionType::Boolean if !q.options.iter().any(|o| o.is_correct) => {
          return invalid(format!("Question {n} has no correct option."));
        }
        _ => {}
      }
    }
    Ok(QuizIn {
      enabled: true,
      title: self.title.trim().to_string(),
      description: self.description.trim().to_string(),
      questions: self
        .questions
        .iter()
        .map(|q| QuestionIn {
          question: q.question.trim().to_string(),
          kind: q.kind,
          options: if q.kind == QuestionType::Text { vec![] } else { q.options.clone() },
          points: q.points,
        })
        .collect(),
      time_limit: self.time_limit,
      passing_score: self.passing_score,
    })
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProblemDraft {
  pub title: String,
  pub description: String,
  pub video_url: String,
  pub difficulty: Difficulty,
  pub branch: String,
  pub is_urgent: bool,
  tags: Vec<String>,
  pub quiz: Option<QuizDraft>,
}

impl ProblemDraft {
  pub fn tags(&self) -> &[String] {
    &self.tags
  }

  /// Trimmed; duplicates (ignoring case) are refused.
  pub fn add_tag(&mut self, tag: &str) -> bool {
    let tag = tag.trim();
    if tag.is_empty() || self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
      return false;
    }
    self.tags.push(tag.to_string());
    true
  }

  pub fn remove_tag(&mut self, tag: &str) -> bool {
    let before = self.tags.len();
    self.tags.retain(|t| !t.eq_ignore_ascii_case(tag.trim()));
    before != self.tags.len()
  }

  pub fn quiz_mut(&mut self) -> &mut QuizDraft {
    self.quiz.get_or_insert_with(QuizDraft::default)
  }

  pub fn disable_quiz(&mut self) {
    self.quiz = None;
  }

  /// Build the request body, or say what is missing. Nothing is sent on failure.
  pub fn validate(&self) -> Result<ProblemIn, ApiError> {
    if self.title.trim().is_empty() {
      return Err(ApiError::Validation("Please enter a problem title.".into()));
    }
    if self.description.trim().is_empty() {
      return Err(ApiError::Validation("Please describe the problem.".into()));
    }
    let video = self.video_url.trim();
    if !video.is_empty() && !(video.starts_with("http://") || video.starts_with("https://")) {
      return Err(ApiError::Validation("Video link must be an http(s) URL.".into()));
    }
    let quiz = self.quiz.as_ref().map(QuizDraft::validate).transpose()?;
    let branch = self.branch.trim();
    Ok(ProblemIn {
      title: self.title.trim().to_string(),
      description: self.description.trim().to_string(),
      video_url: (!video.is_empty()).then(|| video.to_string()),
      difficulty: self.difficulty,
      tags: self.tags.clone(),
      branch: (!branch.is_empty()).then(|| branch.to_string()),
      is_urgent: self.is_urgent,
      quiz,
    })
  }
}

/// Guards a single in-flight attachment upload.
#[derive(Debug, Default)]
pub struct AttachmentUploader {
  in_flight: bool,
}

impl AttachmentUploader {
  #[instrument(level = "info", skip_all, fields(%problem_id, path = %path.display()))]
  pub async fn upload(&mut self, gateway: &Gateway, problem_id: &str, path: &Path) -> Result<Attachment, ApiError> {
    if self.in_flight {
      return Err(ApiError::Validation("An upload is already in progress.".into()));
    }
    let file_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ApiError::Validation("Choose a file to upload.".into()))?
      .to_string();
    let bytes = tokio::fs::read(path)
      .await
      .map_err(|e| ApiError::Validation(format!("Cannot read {file_name}: {e}")))?;

    let outcome = {
      let _busy = InFlight::raise(&mut self.in_flight);
      gateway.upload_attachment(problem_id, &file_name, bytes).await
    };
    if let Ok(a) = &outcome {
      info!(target: "hub_client", %problem_id, file = %a.file_name, "Attachment uploaded");
    }
    outcome
  }
}

/// Admin view of all accounts.
#[derive(Debug, Default)]
pub struct UserAdmin {
  users: Vec<User>,
}

impl UserAdmin {
  pub fn users(&self) -> &[User] {
    &self.users
  }

  pub async fn load(&mut self, gateway: &Gateway) -> Result<(), ApiError> {
    self.users = gateway.list_users().await?;
    Ok(())
  }

  fn check_actor(actor: &User, target_id: &str) -> Result<(), ApiError> {
    if actor.role != Role::Admin {
      return Err(ApiError::Validation("Only administrators can manage users.".into()));
    }
    if actor.id == target_id {
      return Err(ApiError::Validation("You cannot change or delete your own account here.".into()));
    }
    Ok(())
  }

  #[instrument(level = "info", skip(self, gateway, actor), fields(actor = %actor.id))]
  pub async fn change_role(&mut self, gateway: &Gateway, actor: &User, target_id: &str, role: Role) -> Result<(), ApiError> {
    Self::check_actor(actor, target_id)?;
    gateway.update_user_role(target_id, role).await?;
    match self.users.iter_mut().find(|u| u.id == target_id) {
      Some(u) => u.role = role,
      None => warn!(target: "hub_client", %target_id, "Updated user not in local list"),
    }
    Ok(())
  }

  #[instrument(level = "info", skip(self, gateway, actor), fields(actor = %actor.id))]
  pub async fn delete(&mut self, gateway: &Gateway, actor: &User, target_id: &str) -> Result<(), ApiError> {
    Self::check_actor(actor, target_id)?;
    gateway.delete_user(target_id).await?;
    self.users.retain(|u| u.id != target_id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::extract::Path as AxPath;
  use axum::routing::{get, post, put};
  use axum::{Json, Router};
  use serde_json::json;

  use crate::gateway::tests::{gateway, spawn_stub};
  use crate::session::tests::{student, temp_dir};

  fn filled() -> ProblemDraft {
    ProblemDraft { title: " Drone frame ".into(), description: "Lighter frame".into(), ..Default::default() }
  }

  #[test]
  fn tags_are_trimmed_and_deduplicated() {
    let mut d = filled();
    assert!(d.add_tag(" CAD "));
    assert!(!d.add_tag("cad"));
    assert!(!d.add_tag("  "));
    assert!(d.add_tag("FEA"));
    assert_eq!(d.tags(), ["CAD", "FEA"]);
    assert!(d.remove_tag("fea"));
    assert!(!d.remove_tag("fea"));
  }

  #[test]
  fn draft_validation_blocks_before_any_call() {
    assert!(matches!(ProblemDraft::default().validate(), Err(ApiError::Validation(_))));
    let mut d = filled();
    d.video_url = "youtube.com/x".into();
    assert!(d.validate().is_err());
    d.video_url = "https://youtube.com/x".into();
    let body = d.validate().expect("valid");
    assert_eq!(body.title, "Drone frame");
    assert_eq!(body.quiz, None);
  }

  #[test]
  fn quiz_authoring_rules() {
    let mut d = filled();
    assert!(d.validate().is_ok());
    d.quiz_mut();
    assert!(d.validate().is_err(), "enabled quiz without questions");

    let q = d.quiz_mut().add_question(QuestionType::MultipleChoice);
    d.quiz_mut().questions[q].question = "Best alloy?".into();
    assert!(d.quiz_mut().add_option(q, "Al 6061"));
    assert!(d.validate().is_err(), "one option only");
    assert!(d.quiz_mut().add_option(q, "Steel"));
    assert!(d.validate().is_err(), "no correct option");
    assert!(d.quiz_mut().mark_correct(q, 0));
    assert!(d.quiz_mut().mark_correct(q, 1));
    assert_eq!(d.quiz_mut().questions[q].options.iter().filter(|o| o.is_correct).count(), 1);

    let t = d.quiz_mut().add_question(QuestionType::Text);
    d.quiz_mut().questions[t].question = "Explain".into();
    assert!(!d.quiz_mut().add_option(t, "nope"));
    assert!(!d.quiz_mut().remove_option(t, 0), "text questions have no options");

    let scratch = d.quiz_mut().add_question(QuestionType::MultipleChoice);
    assert!(d.quiz_mut().add_option(scratch, "Carbon"));
    assert!(d.quiz_mut().remove_option(scratch, 0));
    assert!(!d.quiz_mut().remove_option(scratch, 0));
    assert_eq!(d.quiz_mut().remove_question(scratch).map(|q| q.kind), Some(QuestionType::MultipleChoice));
    assert!(d.quiz_mut().remove_question(9).is_none());
    let b = d.quiz_mut().add_question(QuestionType::Boolean);
    d.quiz_mut().questions[b].question = "Is it rigid?".into();

    d.quiz_mut().passing_score = 101;
    assert!(d.validate().is_err());
    d.quiz_mut().passing_score = 80;
    let body = d.validate().expect("valid");
    let quiz = body.quiz.expect("quiz");
    assert_eq!(quiz.questions.len(), 3);
    assert_eq!(quiz.questions[2].options.len(), 2);

    d.disable_quiz();
    assert!(d.validate().expect("valid").quiz.is_none());
  }

  #[tokio::test]
  async fn admin_cannot_target_themself_and_list_tracks_changes() {
    let app = Router::new()
      .route(
        "/api/users",
        get(|| async { Json(json!([{ "_id": "u1", "role": "student" }, { "_id": "u2", "role": "company" }])) }),
      )
      .route("/api/users/:id/role", put(|AxPath(_id): AxPath<String>| async { Json(json!({ "success": true })) }))
      .route("/api/users/:id", axum::routing::delete(|| async { Json(json!({ "success": true })) }));
    let gw = gateway(&spawn_stub(app).await);

    let mut admin = student();
    admin.id = "root".into();
    admin.role = Role::Admin;

    let mut users = UserAdmin::default();
    users.load(&gw).await.expect("load");
    assert_eq!(users.users().len(), 2);

    users.change_role(&gw, &admin, "u1", Role::Company).await.expect("role");
    assert_eq!(users.users()[0].role, Role::Company);
    users.delete(&gw, &admin, "u2").await.expect("delete");
    assert_eq!(users.users().len(), 1);

    assert!(users.delete(&gw, &admin, "root").await.is_err());
    assert!(users.change_role(&gw, &student(), "u1", Role::Admin).await.is_err());
  }

  #[tokio::test]
  async fn abandoned_upload_does_not_block_the_next_one() {
    let app = Router::new().route(
      "/api/problems/:id/attachments",
      post(|AxPath(id): AxPath<String>| async move {
        if id == "stalled" {
          std::future::pending::<()>().await;
        }
        Json(json!({ "fileName": "frame.step", "url": "/files/frame.step", "size": 5 }))
      }),
    );
    let gw = gateway(&spawn_stub(app).await);
    let dir = temp_dir();
    tokio::fs::create_dir_all(&dir).await.expect("dir");
    let file = dir.join("frame.step");
    tokio::fs::write(&file, b"solid").await.expect("write");

    let mut uploader = AttachmentUploader::default();
    let abandoned =
      tokio::time::timeout(std::time::Duration::from_millis(300), uploader.upload(&gw, "stalled", &file)).await;
    assert!(abandoned.is_err());

    let attachment = uploader.upload(&gw, "p1", &file).await.expect("upload");
    assert_eq!(attachment.file_name, "frame.step");
    assert_eq!(attachment.size, Some(5));
    let _ = tokio::fs::remove_dir_all(&dir).await;
  }
}
