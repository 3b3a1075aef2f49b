//! Quiz Gate: decides whether a student may submit an idea for a problem right away or must
//! first pass the problem's timed quiz, and runs that single attempt.
//!
//! The gate does no I/O. Every transition that needs the backend returns an [`Effect`]; the
//! caller performs it and feeds the outcome back through the matching `*_resolved` method.
//! While an effect is outstanding the state says so (`CheckingPriorAttempt`, `Submitting`,
//! `RetakeInFlight`) and every other input is refused, which is also what keeps a timer
//! expiry and a manual submit from both reaching the backend.
//!
//! Scores, percentages and pass/fail come from the backend verbatim.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::domain::{Problem, Question, QuizResponse};
use crate::error::ApiError;
use crate::protocol::{AnswerIn, SubmitQuizIn};

/// One in-progress attempt: position, recorded answers and the countdown.
#[derive(Clone, Debug, PartialEq)]
pub struct Attempt {
  current: usize,
  total: usize,
  answers: BTreeMap<usize, String>,
  time_limit: u32,
  time_left: u32,
  /// Message from the last failed submit, shown until the next one.
  pub error: Option<String>,
}

impl Attempt {
  fn new(total: usize, time_limit_secs: u32) -> Self {
    Self {
      current: 0,
      total,
      answers: BTreeMap::new(),
      time_limit: time_limit_secs,
      time_left: time_limit_secs,
      error: None,
    }
  }

  pub fn current(&self) -> usize { self.current }
  pub fn total(&self) -> usize { self.total }
  pub fn time_left(&self) -> u32 { self.time_left }

  /// Seconds elapsed since the attempt started.
  pub fn time_spent(&self) -> u32 {
    self.time_limit - self.time_left
  }

  pub fn answer_for(&self, index: usize) -> Option<&str> {
    self.answers.get(&index).map(String::as_str)
  }

  pub fn answered_count(&self) -> usize {
    self.answers.len()
  }

  pub fn expired(&self) -> bool {
    self.time_left == 0
  }

  pub fn can_go_previous(&self) -> bool {
    self.current > 0
  }

  pub fn can_go_next(&self) -> bool {
    self.current + 1 < self.total
  }

  /// Submit replaces Next on the last question; after expiry it is the only way forward.
  pub fn can_submit(&self) -> bool {
    !self.can_go_next() || self.expired()
  }

  fn payload(&self, problem_id: String) -> SubmitQuizIn {
    SubmitQuizIn {
      problem_id,
      answers: self
        .answers
        .iter()
        .map(|(i, a)| AnswerIn { question_index: *i, answer: a.clone() })
        .collect(),
      time_spent: self.time_spent(),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QuizState {
  Idle,
  CheckingPriorAttempt,
  ShowingPriorResult { response: QuizResponse, error: Option<String> },
  RetakeInFlight { prior: QuizResponse },
  NoQuizRequired,
  Answering(Attempt),
  Submitting(Attempt),
  ShowingResult { response: QuizResponse },
}

impl QuizState {
  pub fn name(&self) -> &'static str {
    match self {
      QuizState::Idle => "idle",
      QuizState::CheckingPriorAttempt => "checking_prior_attempt",
      QuizState::ShowingPriorResult { .. } => "showing_prior_result",
      QuizState::RetakeInFlight { .. } => "retake_in_flight",
      QuizState::NoQuizRequired => "no_quiz_required",
      QuizState::Answering(_) => "answering",
      QuizState::Submitting(_) => "submitting",
      QuizState::ShowingResult { .. } => "showing_result",
    }
  }

  /// A backend request is outstanding; the gate accepts only its outcome.
  pub fn is_busy(&self) -> bool {
    matches!(
      self,
      QuizState::CheckingPriorAttempt | QuizState::Submitting(_) | QuizState::RetakeInFlight { .. }
    )
  }
}

/// Backend work requested by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
  CheckPriorAttempt { problem_id: String },
  SubmitAnswers(SubmitQuizIn),
  DeletePriorAttempt { problem_id: String },
  /// The gate has closed; the parent should open idea submission for this problem.
  OpenIdeaSubmission { problem_id: Option<String> },
}

#[derive(Debug, Default)]
pub struct QuizGate {
  problem: Option<Problem>,
  state: QuizState,
}

impl Default for QuizState {
  fn default() -> Self { QuizState::Idle }
}

impl QuizGate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &QuizState {
    &self.state
  }

  pub fn problem(&self) -> Option<&Problem> {
    self.problem.as_ref()
  }

  fn problem_id(&self) -> Option<String> {
    self.problem.as_ref().and_then(|p| p.id.clone())
  }

  fn questions(&self) -> &[Question] {
    self
      .problem
      .as_ref()
      .and_then(|p| p.required_quiz())
      .map(|q| q.questions.as_slice())
      .unwrap_or(&[])
  }

  pub fn current_question(&self) -> Option<&Question> {
    match &self.state {
      QuizState::Answering(a) | QuizState::Submitting(a) => self.questions().get(a.current),
      _ => None,
    }
  }

  /// Start a solve action. Without a problem id there is nothing to look up, so the gate
  /// goes straight to the quiz (or to direct idea access).
  pub fn open(&mut self, problem: Option<Problem>) -> Option<Effect> {
    if !matches!(self.state, QuizState::Idle) {
      debug!(target: "quiz", state = self.state.name(), "open ignored; gate already active");
      return None;
    }
    self.problem = problem;
    match self.problem_id() {
      Some(problem_id) => {
        info!(target: "quiz", %problem_id, "Checking for a prior attempt");
        self.state = QuizState::CheckingPriorAttempt;
        Some(Effect::CheckPriorAttempt { problem_id })
      }
      None => {
        self.enter_quiz();
        None
      }
    }
  }

  /// Outcome of the prior-attempt lookup. A failed lookup counts as "no attempt".
  pub fn prior_attempt_resolved(&mut self, outcome: Result<Option<QuizResponse>, ApiError>) {
    if !matches!(self.state, QuizState::CheckingPriorAttempt) {
      debug!(target: "quiz", state = self.state.name(), "stale prior-attempt result dropped");
      return;
    }
    match outcome {
      Ok(Some(response)) => {
        info!(target: "quiz", passed = response.passed, percentage = response.percentage, "Prior attempt found");
        self.state = QuizState::ShowingPriorResult { response, error: None };
      }
      Ok(None) => self.enter_quiz(),
      Err(e) => {
        warn!(target: "quiz", error = %e, "Prior-attempt check failed; letting the student attempt the quiz");
        self.enter_quiz();
      }
    }
  }

  /// `Answering` with a fresh timer, or `NoQuizRequired` when nothing gates the problem.
  fn enter_quiz(&mut self) {
    let quiz = self.problem.as_ref().and_then(|p| p.required_quiz());
    self.state = match quiz {
      Some(q) => {
        info!(target: "quiz", questions = q.questions.len(), time_limit_secs = q.time_limit_secs(), "Quiz started");
        QuizState::Answering(Attempt::new(q.questions.len(), q.time_limit_secs()))
      }
      None => QuizState::NoQuizRequired,
    };
  }

  pub fn request_retake(&mut self) -> Option<Effect> {
    let QuizState::ShowingPriorResult { response, .. } = &self.state else {
      return None;
    };
    let problem_id = self.problem_id()?;
    self.state = QuizState::RetakeInFlight { prior: response.clone() };
    Some(Effect::DeletePriorAttempt { problem_id })
  }

  /// On failure the prior result stays on screen with the error; nothing is discarded.
  pub fn retake_resolved(&mut self, outcome: Result<(), ApiError>) {
    let QuizState::RetakeInFlight { prior } = &self.state else {
      debug!(target: "quiz", state = self.state.name(), "stale retake result dropped");
      return;
    };
    match outcome {
      Ok(()) => {
        info!(target: "quiz", "Prior attempt deleted; starting over");
        self.enter_quiz();
      }
      Err(e) => {
        warn!(target: "quiz", error = %e, "Retake failed");
        self.state = QuizState::ShowingPriorResult { response: prior.clone(), error: Some(e.user_message()) };
      }
    }
  }

  /// Record an answer for the current question, replacing any earlier one.
  pub fn answer(&mut self, answer: impl Into<String>) -> bool {
    match &mut self.state {
      QuizState::Answering(a) if !a.expired() => {
        a.answers.insert(a.current, answer.into());
        true
      }
      _ => false,
    }
  }

  pub fn next(&mut self) -> bool {
    match &mut self.state {
      QuizState::Answering(a) if a.can_go_next() => {
        a.current += 1;
        true
      }
      _ => false,
    }
  }

  pub fn previous(&mut self) -> bool {
    match &mut self.state {
      QuizState::Answering(a) if a.can_go_previous() => {
        a.current -= 1;
        true
      }
      _ => false,
    }
  }

  /// One second of countdown. Hitting zero submits exactly as the Submit action would.
  pub fn tick(&mut self) -> Option<Effect> {
    let QuizState::Answering(a) = &mut self.state else {
      return None;
    };
    if a.time_left == 0 {
      return None;
    }
    a.time_left -= 1;
    if a.time_left == 0 {
      info!(target: "quiz", answered = a.answered_count(), "Time is up; submitting automatically");
      return self.begin_submit();
    }
    None
  }

  /// Manual submit. Only offered on the last question, or after the timer ran out.
  pub fn submit(&mut self) -> Option<Effect> {
    let ready = matches!(&self.state, QuizState::Answering(a) if a.can_submit());
    if ready { self.begin_submit() } else { None }
  }

  fn begin_submit(&mut self) -> Option<Effect> {
    let problem_id = self.problem_id();
    let QuizState::Answering(a) = &mut self.state else {
      return None;
    };
    let Some(problem_id) = problem_id else {
      a.error = Some("This problem cannot accept quiz answers.".into());
      return None;
    };
    a.error = None;
    let payload = a.payload(problem_id);
    let attempt = a.clone();
    self.state = QuizState::Submitting(attempt);
    Some(Effect::SubmitAnswers(payload))
  }

  /// On failure the attempt comes back untouched, timer and answers included.
  pub fn submit_resolved(&mut self, outcome: Result<QuizResponse, ApiError>) {
    let QuizState::Submitting(a) = &self.state else {
      debug!(target: "quiz", state = self.state.name(), "stale submit result dropped");
      return;
    };
    match outcome {
      Ok(response) => {
        info!(target: "quiz", passed = response.passed, percentage = response.percentage, "Quiz result received");
        self.state = QuizState::ShowingResult { response };
      }
      Err(e) => {
        warn!(target: "quiz", error = %e, "Quiz submit failed; answers kept");
        let mut attempt = a.clone();
        attempt.error = Some(e.user_message());
        self.state = QuizState::Answering(attempt);
      }
    }
  }

  /// Whether "Submit My Idea" is on offer right now.
  pub fn can_submit_idea(&self) -> bool {
    match &self.state {
      QuizState::NoQuizRequired => true,
      QuizState::ShowingResult { response } | QuizState::ShowingPriorResult { response, .. } => response.passed,
      _ => false,
    }
  }

  /// Close the gate and hand over to idea submission.
  pub fn proceed_to_idea(&mut self) -> Option<Effect> {
    if !self.can_submit_idea() {
      return None;
    }
    let problem_id = self.problem_id();
    self.reset();
    Some(Effect::OpenIdeaSubmission { problem_id })
  }

  /// Dismiss the gate. Refused while a request is outstanding.
  pub fn close(&mut self) -> bool {
    if self.state.is_busy() {
      return false;
    }
    self.reset();
    true
  }

  fn reset(&mut self) {
    self.state = QuizState::Idle;
    self.problem = None;
  }
}
