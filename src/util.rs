//! Small utility helpers used across modules.

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge response bodies. Cuts on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Case-insensitive substring test. An empty needle matches everything.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
  needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Holds an in-flight flag raised until dropped, including when the owning future is
/// cancelled mid-request.
pub struct InFlight<'a>(&'a mut bool);

impl<'a> InFlight<'a> {
  pub fn raise(flag: &'a mut bool) -> Self {
    *flag = true;
    InFlight(flag)
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    *self.0 = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let s = "ééééé";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('é'));
    assert!(out.ends_with("(10 bytes total)"));
  }

  #[test]
  fn in_flight_flag_drops_with_its_guard() {
    let mut busy = false;
    {
      let _guard = InFlight::raise(&mut busy);
    }
    assert!(!busy);
  }

  #[test]
  fn contains_ignores_case() {
    assert!(contains_ci("Heat Exchanger", "exCHAN"));
    assert!(contains_ci("anything", ""));
    assert!(!contains_ci("pump", "valve"));
  }
}
