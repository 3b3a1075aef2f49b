//! Idea Submission form: free-text idea plus an optional implementation approach, bound to
//! one problem.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use crate::api::IdeaBackend;
use crate::domain::IdeaSubmission;
use crate::error::ApiError;
use crate::protocol::IdeaIn;
use crate::util::InFlight;

#[derive(Debug, Default)]
pub struct IdeaForm {
  problem_id: Option<String>,
  pub idea_text: String,
  pub implementation_approach: String,
  submitting: bool,
  error: Option<String>,
  /// Problems this session already submitted an idea for.
  submitted: HashSet<String>,
}

impl IdeaForm {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_open(&self) -> bool {
    self.problem_id.is_some()
  }

  pub fn problem_id(&self) -> Option<&str> {
    self.problem_id.as_deref()
  }

  pub fn is_submitting(&self) -> bool {
    self.submitting
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Bind the form to a problem. Refuses to open without one.
  pub fn open(&mut self, problem_id: Option<String>) -> Result<(), ApiError> {
    let Some(id) = problem_id.filter(|id| !id.trim().is_empty()) else {
      let err = ApiError::Validation("No problem selected for this idea.".into());
      self.error = Some(err.user_message());
      return Err(err);
    };
    self.problem_id = Some(id);
    self.idea_text.clear();
    self.implementation_approach.clear();
    self.error = None;
    Ok(())
  }

  pub fn close(&mut self) {
    if self.submitting {
      return;
    }
    self.problem_id = None;
    self.idea_text.clear();
    self.implementation_approach.clear();
    self.error = None;
  }

  /// Logout: forget everything, including which problems were already answered.
  pub fn reset(&mut self) {
    *self = Self::default();
  }

  fn validate(&self) -> Result<IdeaIn, ApiError> {
    let problem_id = self
      .problem_id
      .clone()
      .ok_or_else(|| ApiError::Validation("No problem selected for this idea.".into()))?;
    if self.idea_text.trim().is_empty() {
      return Err(ApiError::Validation("Please describe your idea before submitting.".into()));
    }
    if self.submitted.contains(&problem_id) {
      return Err(ApiError::Validation("You have already submitted an idea for this problem.".into()));
    }
    if self.submitting {
      return Err(ApiError::Validation("Your idea is already being submitted.".into()));
    }
    Ok(IdeaIn {
      problem_id,
      idea_text: self.idea_text.trim().to_string(),
      implementation_approach: self.implementation_approach.trim().to_string(),
    })
  }

  /// Post the idea. Success clears and closes the form; failure keeps what was typed.
  #[instrument(level = "info", skip_all, fields(problem_id = ?self.problem_id, idea_len = self.idea_text.len()))]
  pub async fn submit<B: IdeaBackend>(&mut self, backend: &B) -> Result<IdeaSubmission, ApiError> {
    let body = match self.validate() {
      Ok(b) => b,
      Err(e) => {
        self.error = Some(e.user_message());
        return Err(e);
      }
    };

    let outcome = {
      let _busy = InFlight::raise(&mut self.submitting);
      backend.submit_idea(&body).await
    };

    match outcome {
      Ok(idea) => {
        info!(target: "hub_client", problem_id = %body.problem_id, "Idea submitted");
        self.submitted.insert(body.problem_id);
        self.close();
        Ok(idea)
      }
      Err(e) => {
        warn!(target: "hub_client", problem_id = %body.problem_id, error = %e, "Idea submission failed");
        self.error = Some(e.user_message());
        Err(e)
      }
    }
  }
}
