//! App Shell: owns the session-facing state and composes the views.
//!
//! Authentication, role routing, the shared problem list, back-navigation, toasts and the
//! hand-over from the quiz gate to idea submission all live here. Components report back
//! through return values; the shell is the only place that performs network calls on their
//! behalf and the only writer of the session.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::{Problem, Role, User};
use crate::error::ApiError;
use crate::feed::{self, FeedFilter, ProblemFeed};
use crate::flow::{self, Outcome};
use crate::gateway::Gateway;
use crate::idea::IdeaForm;
use crate::manage::{AttachmentUploader, ProblemDraft, UserAdmin};
use crate::protocol::{AuthOut, SignupIn};
use crate::quiz::{Effect, QuizGate, QuizState};
use crate::session::{Session, SessionStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
  Login,
  Feed,
  Dashboard,
  Problem(String),
  Profile,
  Users,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastKind {
  Info,
  Success,
  Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
  pub kind: ToastKind,
  pub message: String,
}

/// Landing view after authentication.
pub fn route_for(role: Role) -> View {
  if role.manages_problems() { View::Dashboard } else { View::Feed }
}

pub struct AppShell {
  config: AppConfig,
  gateway: Gateway,
  auth_lost: Arc<AtomicBool>,
  history: Vec<View>,
  toasts: VecDeque<Toast>,
  unread: Option<u32>,
  creating_problem: bool,
  pub feed: ProblemFeed,
  pub filter: FeedFilter,
  pub quiz: QuizGate,
  pub idea: IdeaForm,
  pub draft: ProblemDraft,
  pub uploader: AttachmentUploader,
  pub users: UserAdmin,
}

impl AppShell {
  pub fn new(config: AppConfig) -> Result<Self, ApiError> {
    let session = Arc::new(SessionStore::new(config.session_dir.clone(), config.placeholder_images.clone()));
    let auth_lost = Arc::new(AtomicBool::new(false));
    let flag = auth_lost.clone();
    let gateway = Gateway::new(&config.base_url(), config.request_timeout(), session)?
      .with_auth_lost_hook(Arc::new(move |_status: u16| flag.store(true, Ordering::SeqCst)));
    Ok(Self {
      config,
      gateway,
      auth_lost,
      history: vec![View::Login],
      toasts: VecDeque::new(),
      unread: None,
      creating_problem: false,
      feed: ProblemFeed::default(),
      filter: FeedFilter::default(),
      quiz: QuizGate::new(),
      idea: IdeaForm::new(),
      draft: ProblemDraft::default(),
      uploader: AttachmentUploader::default(),
      users: UserAdmin::default(),
    })
  }

  pub fn gateway(&self) -> &Gateway {
    &self.gateway
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  pub async fn session(&self) -> Option<Session> {
    self.gateway.session().current().await
  }

  async fn current_user(&self) -> Result<User, ApiError> {
    self
      .gateway
      .session()
      .user()
      .await
      .ok_or_else(|| ApiError::Validation("Please log in first.".into()))
  }

  // ---- navigation & toasts ----

  pub fn view(&self) -> &View {
    self.history.last().unwrap_or(&View::Login)
  }

  pub fn navigate(&mut self, view: View) {
    if self.history.last() != Some(&view) {
      self.history.push(view);
    }
  }

  /// Pop one view; the root view is never popped.
  pub fn back(&mut self) -> bool {
    if self.history.len() > 1 {
      self.history.pop();
      true
    } else {
      false
    }
  }

  fn reset_history(&mut self, root: View) {
    self.history.clear();
    self.history.push(root);
  }

  pub fn toast(&mut self, kind: ToastKind, message: impl Into<String>) {
    self.toasts.push_back(Toast { kind, message: message.into() });
  }

  pub fn drain_toasts(&mut self) -> Vec<Toast> {
    self.toasts.drain(..).collect()
  }

  /// Central reaction to every outcome: end the session after an authorization failure
  /// and surface errors as toasts.
  fn settle<T>(&mut self, outcome: Result<T, ApiError>) -> Result<T, ApiError> {
    let lost = self.auth_lost.swap(false, Ordering::SeqCst);
    if lost || matches!(outcome, Err(ApiError::Unauthorized { .. })) {
      self.reset_forms();
      self.reset_history(View::Login);
    }
    if let Err(e) = &outcome {
      self.toast(ToastKind::Error, e.user_message());
    }
    outcome
  }

  fn reset_forms(&mut self) {
    self.quiz = QuizGate::new();
    self.idea.reset();
    self.draft = ProblemDraft::default();
    self.uploader = AttachmentUploader::default();
    self.users = UserAdmin::default();
    self.feed.clear();
    self.filter = FeedFilter::default();
    self.unread = None;
    self.creating_problem = false;
  }

  // ---- session ----

  /// Resume a persisted session, if one is still valid.
  #[instrument(level = "info", skip(self))]
  pub async fn start(&mut self) -> Option<Session> {
    let session = self.gateway.session().restore().await?;
    self.reset_history(route_for(session.user.role));
    Some(session)
  }

  pub async fn login(&mut self, email: &str, password: &str) -> Result<Session, ApiError> {
    let outcome = match require_credentials(email, password) {
      Ok(()) => self.gateway.login(email.trim(), password).await,
      Err(e) => Err(e),
    };
    self.complete_auth(outcome).await
  }

  pub async fn signup(&mut self, name: &str, email: &str, password: &str, role: Role) -> Result<Session, ApiError> {
    let outcome = if name.trim().is_empty() {
      Err(ApiError::Validation("Please enter your name.".into()))
    } else if role == Role::Admin {
      Err(ApiError::Validation("Administrator accounts cannot be self-registered.".into()))
    } else {
      match require_credentials(email, password) {
        Ok(()) => {
          let body = SignupIn { name: name.trim(), email: email.trim(), password, role, company_name: None };
          self.gateway.signup(&body).await
        }
        Err(e) => Err(e),
      }
    };
    self.complete_auth(outcome).await
  }

  pub async fn google_auth(&mut self, credential: &str, role: Option<Role>) -> Result<Session, ApiError> {
    let outcome = if credential.trim().is_empty() {
      Err(ApiError::Validation("Google sign-in did not return a credential.".into()))
    } else {
      self
        .gateway
        .google_auth(credential.trim(), role, self.config.google_auth_timeout())
        .await
        .map_err(|e| match e {
          ApiError::Timeout => ApiError::Validation("Google sign-in timed out. Please try again.".into()),
          other => other,
        })
    };
    self.complete_auth(outcome).await
  }

  /// Login, signup and Google sign-in all end here.
  async fn complete_auth(&mut self, outcome: Result<AuthOut, ApiError>) -> Result<Session, ApiError> {
    let auth = self.settle(outcome)?;
    self.reset_forms();
    let session = self.gateway.session().establish(auth.token, auth.user).await;
    info!(target: "session", user_id = %session.user.id, role = %session.user.role, "Signed in");
    self.reset_history(route_for(session.user.role));
    self.toast(ToastKind::Success, format!("Welcome, {}!", display_name(&session.user)));
    Ok(session)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn logout(&mut self) {
    self.gateway.session().clear().await;
    self.auth_lost.store(false, Ordering::SeqCst);
    self.reset_forms();
    self.reset_history(View::Login);
    self.toast(ToastKind::Info, "You have been logged out.");
  }

  // ---- feed ----

  pub async fn refresh_feed(&mut self, force: bool) -> Result<(), ApiError> {
    let outcome = match self.current_user().await {
      Ok(user) if force => self.feed.reload(&self.gateway, &user.id, user.role).await,
      Ok(user) => self.feed.ensure_loaded(&self.gateway, &user.id, user.role).await,
      Err(e) => Err(e),
    };
    self.settle(outcome)
  }

  pub fn visible_problems(&self) -> Vec<&Problem> {
    feed::apply(self.feed.problems(), &self.filter, Utc::now())
  }

  // ---- quiz gate & idea submission ----

  /// Start the solve action for a problem from the feed. Each solve gets a fresh gate; a
  /// quiz attempt or idea draft still in progress must be finished or closed first.
  #[instrument(level = "info", skip(self))]
  pub async fn solve(&mut self, problem_id: &str) -> Result<(), ApiError> {
    let outcome = match self.current_user().await {
      Ok(u) if u.role != Role::Student => Err(ApiError::Validation("Only students can submit ideas.".into())),
      Ok(_) => match self.feed.find(problem_id).cloned() {
        Some(problem) => match self.release_gate() {
          Ok(()) => {
            let eff = self.quiz.open(Some(problem));
            self.navigate(View::Problem(problem_id.to_string()));
            self.run_quiz_effect(eff).await;
            Ok(())
          }
          Err(e) => Err(e),
        },
        None => Err(ApiError::NotFound),
      },
      Err(e) => Err(e),
    };
    self.settle(outcome)
  }

  /// Bring the gate back to `Idle` so a new solve starts clean.
  fn release_gate(&mut self) -> Result<(), ApiError> {
    if self.idea.is_open() {
      return Err(ApiError::Validation("Send or close your idea for the current problem first.".into()));
    }
    match self.quiz.state() {
      QuizState::Answering(_) => return Err(ApiError::Validation("Submit the quiz you are taking first.".into())),
      state if state.is_busy() => {
        return Err(ApiError::Validation("Please wait for the current request to finish.".into()));
      }
      _ => {}
    }
    self.quiz.close();
    Ok(())
  }

  /// Perform a gate effect and follow a hand-over to idea submission.
  pub async fn run_quiz_effect(&mut self, effect: Option<Effect>) {
    if let Outcome::OpenIdea { problem_id } = flow::perform(&mut self.quiz, &self.gateway, effect).await {
      let opened = self.idea.open(problem_id);
      let _ = self.settle(opened);
    }
    // Authorization failures inside the gate still end the session.
    let _ = self.settle(Ok(()));
  }

  pub async fn quiz_tick(&mut self) {
    let eff = self.quiz.tick();
    self.run_quiz_effect(eff).await;
  }

  pub async fn quiz_submit(&mut self) {
    let eff = self.quiz.submit();
    self.run_quiz_effect(eff).await;
  }

  pub async fn quiz_retake(&mut self) {
    let eff = self.quiz.request_retake();
    self.run_quiz_effect(eff).await;
  }

  pub async fn quiz_proceed_to_idea(&mut self) {
    let eff = self.quiz.proceed_to_idea();
    self.run_quiz_effect(eff).await;
  }

  pub async fn submit_idea(&mut self) -> Result<(), ApiError> {
    let problem_id = self.idea.problem_id().map(str::to_string);
    let outcome = self.idea.submit(&self.gateway).await;
    let idea = self.settle(outcome)?;
    if let Some(p) = problem_id.as_deref().and_then(|id| self.feed.find_mut(id)) {
      p.ideas_count += 1;
    }
    info!(target: "hub_client", idea_id = ?idea.id, "Idea stored");
    self.toast(ToastKind::Success, "Your idea has been submitted!");
    Ok(())
  }

  // ---- problem management ----

  /// Validate the draft, post it and add the created problem to the shared list.
  pub async fn create_problem(&mut self) -> Result<Problem, ApiError> {
    let outcome = match self.draft.validate() {
      Ok(_) if self.creating_problem => Err(ApiError::Validation("The problem is already being submitted.".into())),
      Ok(body) => match self.current_user().await {
        Ok(u) if !u.role.manages_problems() => Err(ApiError::Validation("Only companies and admins can post problems.".into())),
        Ok(_) => {
          self.creating_problem = true;
          let r = self.gateway.create_problem(&body).await;
          self.creating_problem = false;
          r
        }
        Err(e) => Err(e),
      },
      Err(e) => Err(e),
    };
    let problem = self.settle(outcome)?;
    self.feed.insert(problem.clone());
    self.draft = ProblemDraft::default();
    self.toast(ToastKind::Success, format!("Problem \"{}\" posted.", problem.title));
    Ok(problem)
  }

  pub async fn delete_problem(&mut self, problem_id: &str) -> Result<(), ApiError> {
    let outcome = match self.current_user().await {
      Ok(u) if !u.role.manages_problems() => Err(ApiError::Validation("Only the owner or an admin can delete a problem.".into())),
      Ok(_) => self.gateway.delete_problem(problem_id).await,
      Err(e) => Err(e),
    };
    self.settle(outcome)?;
    self.feed.remove(problem_id);
    if self.view() == &View::Problem(problem_id.to_string()) {
      self.back();
    }
    self.toast(ToastKind::Success, "Problem deleted.");
    Ok(())
  }

  pub async fn upload_attachment(&mut self, problem_id: &str, path: &Path) -> Result<(), ApiError> {
    let outcome = self.uploader.upload(&self.gateway, problem_id, path).await;
    let attachment = self.settle(outcome)?;
    if let Some(p) = self.feed.find_mut(problem_id) {
      p.attachments.push(attachment);
    }
    self.toast(ToastKind::Success, "Attachment uploaded.");
    Ok(())
  }

  // ---- admin ----

  pub async fn load_users(&mut self) -> Result<(), ApiError> {
    let outcome = self.users.load(&self.gateway).await;
    self.settle(outcome)?;
    self.navigate(View::Users);
    Ok(())
  }

  pub async fn change_user_role(&mut self, user_id: &str, role: Role) -> Result<(), ApiError> {
    let outcome = match self.current_user().await {
      Ok(actor) => self.users.change_role(&self.gateway, &actor, user_id, role).await,
      Err(e) => Err(e),
    };
    self.settle(outcome)
  }

  pub async fn delete_user(&mut self, user_id: &str) -> Result<(), ApiError> {
    let outcome = match self.current_user().await {
      Ok(actor) => self.users.delete(&self.gateway, &actor, user_id).await,
      Err(e) => Err(e),
    };
    self.settle(outcome)
  }

  // ---- notifications ----

  pub fn unread(&self) -> Option<u32> {
    self.unread
  }

  /// One poll. A rise in the unread count raises a toast.
  pub async fn poll_notifications(&mut self) {
    if self.gateway.session().token().await.is_none() {
      return;
    }
    match self.gateway.unread_notifications().await {
      Ok(count) => {
        if count > self.unread.unwrap_or(0) {
          self.toast(ToastKind::Info, format!("You have {count} unread notification(s)."));
        }
        self.unread = Some(count);
      }
      Err(e) => {
        warn!(target: "hub_client", error = %e, "Notification poll failed");
        if e.is_auth() {
          let _ = self.settle(Err::<(), _>(e));
        }
      }
    }
  }

  pub async fn mark_notifications_read(&mut self) -> Result<(), ApiError> {
    let outcome = self.gateway.mark_notifications_read().await;
    self.settle(outcome)?;
    self.unread = Some(0);
    Ok(())
  }

  /// Poll interval with up to 10% jitter so many clients do not poll in lockstep.
  pub fn next_poll_delay(&self) -> Duration {
    jittered(self.config.notification_poll_interval(), &mut rand::thread_rng())
  }
}

fn jittered(base: Duration, rng: &mut impl Rng) -> Duration {
  let spread = base.as_millis() as u64 / 10;
  base + Duration::from_millis(rng.gen_range(0..=spread))
}

fn require_credentials(email: &str, password: &str) -> Result<(), ApiError> {
  if email.trim().is_empty() || !email.contains('@') {
    return Err(ApiError::Validation("Please enter a valid email address.".into()));
  }
  if password.is_empty() {
    return Err(ApiError::Validation("Please enter your password.".into()));
  }
  Ok(())
}

fn display_name(user: &User) -> &str {
  if user.name.trim().is_empty() { &user.email } else { &user.name }
}
