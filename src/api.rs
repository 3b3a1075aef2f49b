//! Typed endpoint calls on top of the gateway, plus the backend seams the quiz and idea
//! workflows are written against.

use reqwest::Method;
use tracing::{info, instrument};

use crate::domain::{Attachment, IdeaSubmission, Problem, QuizResponse, Role, User};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::protocol::*;

/// What the quiz gate needs from the backend.
pub trait QuizBackend {
  /// `Ok(None)` when the student has not attempted this problem's quiz yet.
  async fn fetch_quiz_response(&self, problem_id: &str) -> Result<Option<QuizResponse>, ApiError>;
  async fn submit_quiz(&self, body: &SubmitQuizIn) -> Result<QuizResponse, ApiError>;
  async fn delete_quiz_response(&self, problem_id: &str) -> Result<(), ApiError>;
}

/// What the idea submission form needs from the backend.
pub trait IdeaBackend {
  async fn submit_idea(&self, body: &IdeaIn) -> Result<IdeaSubmission, ApiError>;
}

impl QuizBackend for Gateway {
  #[instrument(level = "info", skip(self))]
  async fn fetch_quiz_response(&self, problem_id: &str) -> Result<Option<QuizResponse>, ApiError> {
    match self.json::<(), QuizResponse>(Method::GET, &format!("/quiz/response/{problem_id}"), None).await {
      Ok(r) => Ok(Some(r)),
      Err(ApiError::NotFound) => Ok(None),
      Err(e) => Err(e),
    }
  }

  #[instrument(level = "info", skip_all, fields(problem_id = %body.problem_id, answered = body.answers.len(), time_spent = body.time_spent))]
  async fn submit_quiz(&self, body: &SubmitQuizIn) -> Result<QuizResponse, ApiError> {
    let out: SubmitQuizOut = self.json(Method::POST, "/quiz/submit", Some(body)).await?;
    info!(target: "quiz", passed = out.result.passed, percentage = out.result.percentage, "Quiz graded");
    Ok(out.result)
  }

  #[instrument(level = "info", skip(self))]
  async fn delete_quiz_response(&self, problem_id: &str) -> Result<(), ApiError> {
    self.send::<()>(Method::DELETE, &format!("/quiz/response/{problem_id}"), None).await
  }
}

impl IdeaBackend for Gateway {
  #[instrument(level = "info", skip_all, fields(problem_id = %body.problem_id, idea_len = body.idea_text.len()))]
  async fn submit_idea(&self, body: &IdeaIn) -> Result<IdeaSubmission, ApiError> {
    self.json(Method::POST, "/ideas", Some(body)).await
  }
}

impl Gateway {
  #[instrument(level = "info", skip(self, password))]
  pub async fn login(&self, email: &str, password: &str) -> Result<AuthOut, ApiError> {
    self.json(Method::POST, "/auth/login", Some(&LoginIn { email, password })).await
  }

  #[instrument(level = "info", skip(self, body), fields(email = %body.email, role = %body.role))]
  pub async fn signup(&self, body: &SignupIn<'_>) -> Result<AuthOut, ApiError> {
    self.json(Method::POST, "/auth/signup", Some(body)).await
  }

  /// Federated sign-in. Bounded by its own wall-clock limit.
  #[instrument(level = "info", skip(self, credential))]
  pub async fn google_auth(
    &self,
    credential: &str,
    role: Option<Role>,
    timeout: std::time::Duration,
  ) -> Result<AuthOut, ApiError> {
    self
      .json_with_timeout(Method::POST, "/auth/google", Some(&GoogleAuthIn { credential, role }), timeout)
      .await
  }

  /// Companies only see their own problems.
  #[instrument(level = "info", skip(self))]
  pub async fn list_problems(&self, role: Option<Role>) -> Result<Vec<Problem>, ApiError> {
    let path = match role {
      Some(Role::Company) => "/problems/my-problems",
      _ => "/problems",
    };
    self.json::<(), _>(Method::GET, path, None).await
  }

  #[instrument(level = "info", skip_all, fields(title = %body.title))]
  pub async fn create_problem(&self, body: &ProblemIn) -> Result<Problem, ApiError> {
    self.json(Method::POST, "/problems", Some(body)).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn delete_problem(&self, problem_id: &str) -> Result<(), ApiError> {
    self.send::<()>(Method::DELETE, &format!("/problems/{problem_id}"), None).await
  }

  pub async fn upload_attachment(&self, problem_id: &str, file_name: &str, bytes: Vec<u8>) -> Result<Attachment, ApiError> {
    self.upload(&format!("/problems/{problem_id}/attachments"), file_name, bytes).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
    self.json::<(), _>(Method::GET, "/users", None).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn update_user_role(&self, user_id: &str, role: Role) -> Result<(), ApiError> {
    self.send(Method::PUT, &format!("/users/{user_id}/role"), Some(&RoleIn { role })).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
    self.send::<()>(Method::DELETE, &format!("/users/{user_id}"), None).await
  }

  pub async fn unread_notifications(&self) -> Result<u32, ApiError> {
    let out: UnreadCountOut = self.json::<(), _>(Method::GET, "/notifications/unread-count", None).await?;
    Ok(out.count)
  }

  pub async fn mark_notifications_read(&self) -> Result<(), ApiError> {
    self.send::<()>(Method::POST, "/notifications/mark-read", None).await
  }
}
