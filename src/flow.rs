//! Runs quiz gate effects against a backend and owns the one-second countdown.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, instrument};

use crate::api::QuizBackend;
use crate::quiz::{Effect, QuizGate};

/// Where the gate left things after an effect ran.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
  Settled,
  OpenIdea { problem_id: Option<String> },
}

/// Perform `effect` (if any) and feed the result back into the gate.
#[instrument(level = "debug", skip_all, fields(effect = ?effect.as_ref().map(effect_name)))]
pub async fn perform<B: QuizBackend>(gate: &mut QuizGate, backend: &B, effect: Option<Effect>) -> Outcome {
  let Some(effect) = effect else {
    return Outcome::Settled;
  };
  match effect {
    Effect::CheckPriorAttempt { problem_id } => {
      let r = backend.fetch_quiz_response(&problem_id).await;
      gate.prior_attempt_resolved(r);
    }
    Effect::SubmitAnswers(body) => {
      let r = backend.submit_quiz(&body).await;
      gate.submit_resolved(r);
    }
    Effect::DeletePriorAttempt { problem_id } => {
      let r = backend.delete_quiz_response(&problem_id).await;
      gate.retake_resolved(r);
    }
    Effect::OpenIdeaSubmission { problem_id } => return Outcome::OpenIdea { problem_id },
  }
  debug!(target: "quiz", state = gate.state().name(), "Effect settled");
  Outcome::Settled
}

fn effect_name(e: &Effect) -> &'static str {
  match e {
    Effect::CheckPriorAttempt { .. } => "check_prior_attempt",
    Effect::SubmitAnswers(_) => "submit_answers",
    Effect::DeletePriorAttempt { .. } => "delete_prior_attempt",
    Effect::OpenIdeaSubmission { .. } => "open_idea_submission",
  }
}

/// One tick per second, first tick one second after creation.
pub struct Countdown {
  interval: Interval,
}

impl Countdown {
  pub fn start() -> Self {
    let period = Duration::from_secs(1);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Self { interval }
  }

  pub async fn tick(&mut self) {
    self.interval.tick().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Mutex;

  use crate::domain::QuizResponse;
  use crate::error::ApiError;
  use crate::protocol::SubmitQuizIn;
  use crate::quiz::tests::two_question_problem;
  use crate::quiz::QuizState;

  /// In-memory backend: grades "A" as correct for every question.
  #[derive(Default)]
  struct FakeQuiz {
    responses: Mutex<HashMap<String, QuizResponse>>,
    submits: Mutex<Vec<SubmitQuizIn>>,
    fail_lookup: bool,
  }

  impl QuizBackend for FakeQuiz {
    async fn fetch_quiz_response(&self, problem_id: &str) -> Result<Option<QuizResponse>, ApiError> {
      if self.fail_lookup {
        return Err(ApiError::Transport("unreachable".into()));
      }
      Ok(self.responses.lock().unwrap().get(problem_id).cloned())
    }

    async fn submit_quiz(&self, body: &SubmitQuizIn) -> Result<QuizResponse, ApiError> {
      self.submits.lock().unwrap().push(body.clone());
      let correct = body.answers.iter().filter(|a| a.answer == "A").count() as f64;
      let percentage = correct / 2.0 * 100.0;
      let r = QuizResponse {
        total_score: correct,
        max_score: 2.0,
        percentage,
        passed: percentage >= 70.0,
        time_spent: body.time_spent,
        created_at: None,
      };
      self.responses.lock().unwrap().insert(body.problem_id.clone(), r.clone());
      Ok(r)
    }

    async fn delete_quiz_response(&self, problem_id: &str) -> Result<(), ApiError> {
      self.responses.lock().unwrap().remove(problem_id);
      Ok(())
    }
  }

  #[tokio::test]
  async fn two_correct_answers_pass_and_open_idea_submission() {
    let backend = FakeQuiz::default();
    let mut gate = QuizGate::new();
    let eff = gate.open(Some(two_question_problem()));
    assert_eq!(perform(&mut gate, &backend, eff).await, Outcome::Settled);

    gate.answer("A");
    gate.next();
    gate.answer("A");
    let eff = gate.submit();
    perform(&mut gate, &backend, eff).await;
    match gate.state() {
      QuizState::ShowingResult { response } => {
        assert!(response.passed);
        assert_eq!(response.percentage, 100.0);
      }
      other => panic!("unexpected {other:?}"),
    }

    let eff = gate.proceed_to_idea();
    assert_eq!(perform(&mut gate, &backend, eff).await, Outcome::OpenIdea { problem_id: Some("p1".into()) });
  }

  #[tokio::test]
  async fn retake_then_abandon_leaves_no_response() {
    let backend = FakeQuiz::default();
    let mut gate = QuizGate::new();
    let eff = gate.open(Some(two_question_problem()));
    perform(&mut gate, &backend, eff).await;
    gate.next();
    let eff = gate.submit();
    perform(&mut gate, &backend, eff).await;
    assert!(gate.close());

    // Reopen: the failing attempt is found, retake deletes it, then the student walks away.
    let eff = gate.open(Some(two_question_problem()));
    perform(&mut gate, &backend, eff).await;
    assert!(matches!(gate.state(), QuizState::ShowingPriorResult { .. }));
    let eff = gate.request_retake();
    perform(&mut gate, &backend, eff).await;
    assert!(matches!(gate.state(), QuizState::Answering(_)));
    assert!(gate.close());

    let eff = gate.open(Some(two_question_problem()));
    perform(&mut gate, &backend, eff).await;
    assert!(matches!(gate.state(), QuizState::Answering(_)));
    assert!(backend.responses.lock().unwrap().is_empty());
    assert_eq!(backend.submits.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn lookup_failure_still_lets_the_student_in() {
    let backend = FakeQuiz { fail_lookup: true, ..Default::default() };
    let mut gate = QuizGate::new();
    let eff = gate.open(Some(two_question_problem()));
    perform(&mut gate, &backend, eff).await;
    assert!(matches!(gate.state(), QuizState::Answering(_)));
  }

  #[tokio::test(start_paused = true)]
  async fn unanswered_quiz_auto_submits_once_when_time_runs_out() {
    let backend = FakeQuiz::default();
    let mut gate = QuizGate::new();
    let eff = gate.open(Some(two_question_problem()));
    perform(&mut gate, &backend, eff).await;

    let started = Instant::now();
    let mut countdown = Countdown::start();
    while matches!(gate.state(), QuizState::Answering(_)) {
      countdown.tick().await;
      let eff = gate.tick();
      perform(&mut gate, &backend, eff).await;
    }

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61), "{elapsed:?}");
    let submits = backend.submits.lock().unwrap();
    assert_eq!(submits.len(), 1);
    assert!(submits[0].answers.is_empty());
    assert_eq!(submits[0].time_spent, 60);
    assert!(matches!(gate.state(), QuizState::ShowingResult { response } if !response.passed));
  }
}
