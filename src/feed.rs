//! Problem Feed: fetch the role-scoped problem list once, then derive what is shown from
//! three independent predicates (search text, category, branch) on every render.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::domain::{Difficulty, Problem, Role};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::util::contains_ci;

pub const NEW_WINDOW_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Category {
  #[default]
  All,
  New,
  Urgent,
  Trending,
  Beginner,
  Intermediate,
  Advanced,
}

impl std::str::FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.trim().to_ascii_lowercase().as_str() {
      "all" => Category::All,
      "new" => Category::New,
      "urgent" => Category::Urgent,
      "trending" => Category::Trending,
      "beginner" => Category::Beginner,
      "intermediate" => Category::Intermediate,
      "advanced" => Category::Advanced,
      other => return Err(format!("unknown category '{other}'")),
    })
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedFilter {
  pub search: String,
  pub category: Category,
  pub branch: Option<String>,
}

pub fn matches_search(p: &Problem, query: &str) -> bool {
  let q = query.trim();
  q.is_empty()
    || contains_ci(&p.title, q)
    || contains_ci(&p.description, q)
    || p.company.as_deref().is_some_and(|c| contains_ci(c, q))
}

pub fn matches_category(p: &Problem, category: Category, now: DateTime<Utc>) -> bool {
  match category {
    Category::All => true,
    Category::New => p
      .created_at
      .is_some_and(|t| now.signed_duration_since(t) <= Duration::days(NEW_WINDOW_DAYS)),
    Category::Urgent => p.is_urgent,
    Category::Trending => p.ideas_count >= 1,
    Category::Beginner => p.difficulty == Difficulty::Beginner,
    Category::Intermediate => p.difficulty == Difficulty::Intermediate,
    Category::Advanced => p.difficulty == Difficulty::Advanced,
  }
}

pub fn matches_branch(p: &Problem, branch: Option<&str>) -> bool {
  match branch.map(str::trim).filter(|b| !b.is_empty()) {
    None => true,
    Some(b) => p.branch.as_deref().is_some_and(|pb| pb.trim().eq_ignore_ascii_case(b)),
  }
}

/// Every predicate must hold. Input order is kept.
pub fn apply<'a>(problems: &'a [Problem], filter: &FeedFilter, now: DateTime<Utc>) -> Vec<&'a Problem> {
  problems
    .iter()
    .filter(|p| {
      matches_search(p, &filter.search)
        && matches_category(p, filter.category, now)
        && matches_branch(p, filter.branch.as_deref())
    })
    .collect()
}

/// The shared problem list plus the identity it was fetched for.
#[derive(Debug, Default)]
pub struct ProblemFeed {
  problems: Vec<Problem>,
  loaded_for: Option<(String, Role)>,
}

impl ProblemFeed {
  pub fn problems(&self) -> &[Problem] {
    &self.problems
  }

  pub fn find(&self, problem_id: &str) -> Option<&Problem> {
    self.problems.iter().find(|p| p.id.as_deref() == Some(problem_id))
  }

  pub fn find_mut(&mut self, problem_id: &str) -> Option<&mut Problem> {
    self.problems.iter_mut().find(|p| p.id.as_deref() == Some(problem_id))
  }

  /// Fetch unless the list is already loaded for this user and role.
  #[instrument(level = "info", skip(self, gateway))]
  pub async fn ensure_loaded(&mut self, gateway: &Gateway, user_id: &str, role: Role) -> Result<(), ApiError> {
    if self.loaded_for.as_ref().is_some_and(|(u, r)| u == user_id && *r == role) {
      return Ok(());
    }
    self.reload(gateway, user_id, role).await
  }

  pub async fn reload(&mut self, gateway: &Gateway, user_id: &str, role: Role) -> Result<(), ApiError> {
    let problems = gateway.list_problems(Some(role)).await?;
    info!(target: "feed", count = problems.len(), %role, "Problem list loaded");
    self.problems = problems;
    self.loaded_for = Some((user_id.to_string(), role));
    Ok(())
  }

  /// Applied only after the backend confirmed the create.
  pub fn insert(&mut self, problem: Problem) {
    self.problems.insert(0, problem);
  }

  /// Applied only after the backend confirmed the delete.
  pub fn remove(&mut self, problem_id: &str) -> Option<Problem> {
    let pos = self.problems.iter().position(|p| p.id.as_deref() == Some(problem_id))?;
    Some(self.problems.remove(pos))
  }

  pub fn clear(&mut self) {
    self.problems.clear();
    self.loaded_for = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};
  use std::collections::HashSet;

  const WORDS: [&str; 6] = ["pump", "Solar", "valve", "bridge", "sensor", "drone"];
  const BRANCHES: [&str; 3] = ["Mechanical", "Civil", "Electrical"];
  const ALL_CATEGORIES: [Category; 7] = [
    Category::All,
    Category::New,
    Category::Urgent,
    Category::Trending,
    Category::Beginner,
    Category::Intermediate,
    Category::Advanced,
  ];

  fn random_problem(rng: &mut StdRng, i: usize, now: DateTime<Utc>) -> Problem {
    let pick = |rng: &mut StdRng| WORDS[rng.gen_range(0..WORDS.len())].to_string();
    Problem {
      id: Some(format!("p{i}")),
      title: pick(rng),
      description: format!("{} and {}", pick(rng), pick(rng)),
      video_url: None,
      difficulty: [Difficulty::Beginner, Difficulty::Intermediate, Difficulty::Advanced][rng.gen_range(0..3)],
      tags: vec![],
      quiz: None,
      attachments: vec![],
      company: rng.gen_bool(0.7).then(|| pick(rng)),
      branch: rng.gen_bool(0.8).then(|| BRANCHES[rng.gen_range(0..BRANCHES.len())].to_string()),
      is_urgent: rng.gen_bool(0.3),
      ideas_count: rng.gen_range(0..3),
      created_at: rng.gen_bool(0.9).then(|| now - Duration::days(rng.gen_range(0..20))),
    }
  }

  fn ids(v: &[&Problem]) -> HashSet<String> {
    v.iter().filter_map(|p| p.id.clone()).collect()
  }

  #[test]
  fn combined_filter_is_the_intersection_of_single_filters() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let now = Utc::now();
    for round in 0..200 {
      let problems: Vec<Problem> = (0..rng.gen_range(0..25)).map(|i| random_problem(&mut rng, i, now)).collect();
      let search = if rng.gen_bool(0.3) { String::new() } else { WORDS[rng.gen_range(0..WORDS.len())][..3].to_uppercase() };
      let category = ALL_CATEGORIES[rng.gen_range(0..ALL_CATEGORIES.len())];
      let branch = rng.gen_bool(0.5).then(|| BRANCHES[rng.gen_range(0..BRANCHES.len())].to_lowercase());

      let combined = FeedFilter { search: search.clone(), category, branch: branch.clone() };
      let only_search = FeedFilter { search, ..Default::default() };
      let only_category = FeedFilter { category, ..Default::default() };
      let only_branch = FeedFilter { branch, ..Default::default() };

      let got = apply(&problems, &combined, now);
      let expected: HashSet<String> = ids(&apply(&problems, &only_search, now))
        .intersection(&ids(&apply(&problems, &only_category, now)))
        .cloned()
        .collect::<HashSet<_>>()
        .intersection(&ids(&apply(&problems, &only_branch, now)))
        .cloned()
        .collect();
      assert_eq!(ids(&got), expected, "round {round}");

      // Order is the fetch order.
      let positions: Vec<usize> = got
        .iter()
        .map(|p| problems.iter().position(|q| q.id == p.id).unwrap_or(usize::MAX))
        .collect();
      assert!(positions.windows(2).all(|w| w[0] < w[1]), "round {round}");

      assert_eq!(apply(&problems, &FeedFilter::default(), now).len(), problems.len());
    }
  }

  #[test]
  fn category_rules() {
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(7);
    let mut p = random_problem(&mut rng, 0, now);
    p.created_at = Some(now - Duration::days(6));
    assert!(matches_category(&p, Category::New, now));
    p.created_at = Some(now - Duration::days(8));
    assert!(!matches_category(&p, Category::New, now));
    p.created_at = None;
    assert!(!matches_category(&p, Category::New, now));
    p.ideas_count = 0;
    assert!(!matches_category(&p, Category::Trending, now));
    p.ideas_count = 1;
    assert!(matches_category(&p, Category::Trending, now));
    assert_eq!("Trending".parse::<Category>(), Ok(Category::Trending));
  }

  #[test]
  fn search_covers_company_and_branch_needs_a_branch() {
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(9);
    let mut p = random_problem(&mut rng, 0, now);
    p.title = "Turbine".into();
    p.description = "Blade fatigue".into();
    p.company = Some("Siemens Energy".into());
    p.branch = None;
    assert!(matches_search(&p, "siemens"));
    assert!(matches_search(&p, "FATIGUE"));
    assert!(!matches_search(&p, "pump"));
    assert!(!matches_branch(&p, Some("Mechanical")));
    assert!(matches_branch(&p, Some("  ")));
  }

  #[test]
  fn local_list_edits() {
    let now = Utc::now();
    let mut rng = StdRng::seed_from_u64(11);
    let mut feed = ProblemFeed::default();
    feed.insert(random_problem(&mut rng, 1, now));
    feed.insert(random_problem(&mut rng, 2, now));
    assert_eq!(feed.problems()[0].id.as_deref(), Some("p2"));
    assert!(feed.remove("p1").is_some());
    assert!(feed.remove("p1").is_none());
    assert!(feed.find("p2").is_some());
  }
}
