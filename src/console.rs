//! Line-oriented console over stdin/stdout. Each line is one user action; the quiz countdown
//! and the notification poll run concurrently with input through `tokio::select!`.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::domain::{Difficulty, QuestionType, Role};
use crate::feed::Category;
use crate::flow::Countdown;
use crate::quiz::QuizState;
use crate::shell::{AppShell, ToastKind, View};

const HELP: &str = "\
Session   login <email> <password> | signup <name> <email> <password> <student|company> | google <credential> | logout
Feed      feed [category] [search text] | branch <name|-> | refresh | back
Solve     solve <problemId> | answer <text|option#> | next | prev | submit | retake | idea | close
Idea      say <idea text> | approach <text> | send
Authoring draft <title|description|video|difficulty|branch|urgent|tag|untag> <value> | quiz-add <multiple-choice|boolean|text> <question>
          quiz-option <q#> <text> | quiz-correct <q#> <option#> | quiz-rm <q#> | quiz-rmopt <q#> <option#>
          quiz-limit <minutes> | quiz-pass <percent> | quiz-off | post
Manage    rmproblem <id> | upload <problemId> <path> | users | role <userId> <role> | rmuser <userId>
Other     notifications | read | help | quit";

#[instrument(level = "info", skip_all)]
pub async fn run(shell: &mut AppShell) -> std::io::Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut countdown: Option<Countdown> = None;
  let poll = tokio::time::sleep(shell.next_poll_delay());
  tokio::pin!(poll);

  println!("{HELP}");
  render(shell);

  loop {
    let answering = matches!(shell.quiz.state(), QuizState::Answering(a) if !a.expired());
    match (answering, countdown.is_some()) {
      (true, false) => countdown = Some(Countdown::start()),
      (false, true) => countdown = None,
      _ => {}
    }

    tokio::select! {
      line = lines.next_line() => {
        let Some(line) = line? else { break };
        if !dispatch(shell, line.trim()).await {
          break;
        }
        render(shell);
      }
      _ = next_tick(&mut countdown) => {
        shell.quiz_tick().await;
        match shell.quiz.state() {
          QuizState::Answering(a) if a.time_left() % 10 == 0 || a.time_left() <= 5 => {
            println!("  ⏱ {} left", mmss(a.time_left()));
          }
          QuizState::Answering(_) => {}
          _ => render(shell),
        }
      }
      _ = &mut poll => {
        shell.poll_notifications().await;
        poll.as_mut().reset(Instant::now() + shell.next_poll_delay());
      }
    }
    print_toasts(shell);
  }
  Ok(())
}

async fn next_tick(countdown: &mut Option<Countdown>) {
  match countdown {
    Some(c) => c.tick().await,
    None => std::future::pending().await,
  }
}

/// Returns false when the user asked to quit.
async fn dispatch(shell: &mut AppShell, line: &str) -> bool {
  let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
  let rest = rest.trim();
  let args: Vec<&str> = rest.split_whitespace().collect();
  debug!(target: "hub_client", %cmd, argc = args.len(), "console command");

  // Errors are already surfaced as toasts by the shell.
  match cmd {
    "" => {}
    "help" => println!("{HELP}"),
    "quit" | "exit" => return false,

    "login" => match args.as_slice() {
      [email, password] => {
        if shell.login(email, password).await.is_ok() {
          let _ = shell.refresh_feed(false).await;
        }
      }
      _ => usage("login <email> <password>"),
    },
    "signup" => match args.as_slice() {
      [name, email, password, role] => match role.parse::<Role>() {
        Ok(role) => {
          if shell.signup(name, email, password, role).await.is_ok() {
            let _ = shell.refresh_feed(false).await;
          }
        }
        Err(e) => println!("  {e}"),
      },
      _ => usage("signup <name> <email> <password> <student|company>"),
    },
    "google" => match args.as_slice() {
      [credential] => {
        if shell.google_auth(credential, None).await.is_ok() {
          let _ = shell.refresh_feed(false).await;
        }
      }
      _ => usage("google <credential>"),
    },
    "logout" => shell.logout().await,

    "feed" => {
      let mut words = args.iter().copied().peekable();
      shell.filter.category = match words.peek().and_then(|w| w.parse::<Category>().ok()) {
        Some(c) => {
          words.next();
          c
        }
        None => Category::All,
      };
      shell.filter.search = words.collect::<Vec<_>>().join(" ");
      if shell.refresh_feed(false).await.is_ok() {
        print_feed(shell);
      }
    }
    "branch" => {
      shell.filter.branch = match rest {
        "" | "-" => None,
        b => Some(b.to_string()),
      };
      print_feed(shell);
    }
    "refresh" => {
      if shell.refresh_feed(true).await.is_ok() {
        print_feed(shell);
      }
    }
    "back" => {
      if !shell.back() {
        println!("  Already at the start.");
      }
    }

    "solve" => match args.as_slice() {
      [id] => {
        let _ = shell.solve(id).await;
      }
      _ => usage("solve <problemId>"),
    },
    "answer" => {
      let answer = resolve_option(shell, rest);
      if !shell.quiz.answer(answer) {
        println!("  You cannot answer right now.");
      }
    }
    "next" => {
      shell.quiz.next();
    }
    "prev" => {
      shell.quiz.previous();
    }
    "submit" => shell.quiz_submit().await,
    "retake" => shell.quiz_retake().await,
    "idea" => shell.quiz_proceed_to_idea().await,
    "close" => {
      if shell.idea.is_open() {
        shell.idea.close();
      } else if !shell.quiz.close() {
        println!("  Please wait for the current request to finish.");
      }
    }

    "say" => shell.idea.idea_text = rest.to_string(),
    "approach" => shell.idea.implementation_approach = rest.to_string(),
    "send" => {
      let _ = shell.submit_idea().await;
    }

    "draft" => edit_draft(shell, &args, rest),
    "quiz-add" => match rest.split_once(char::is_whitespace) {
      Some((kind, text)) => match parse_question_type(kind) {
        Some(kind) => {
          let quiz = shell.draft.quiz_mut();
          let q = quiz.add_question(kind);
          quiz.questions[q].question = text.trim().to_string();
          println!("  Added question {}.", q + 1);
        }
        None => usage("quiz-add <multiple-choice|boolean|text> <question>"),
      },
      None => usage("quiz-add <multiple-choice|boolean|text> <question>"),
    },
    "quiz-option" => match rest.split_once(char::is_whitespace) {
      Some((q, text)) => match one_based(q) {
        Some(q) if shell.draft.quiz_mut().add_option(q, text) => {}
        _ => println!("  That question does not take options."),
      },
      None => usage("quiz-option <q#> <text>"),
    },
    "quiz-correct" => match args.as_slice() {
      [q, o] => match (one_based(q), one_based(o)) {
        (Some(q), Some(o)) if shell.draft.quiz_mut().mark_correct(q, o) => {}
        _ => println!("  No such option."),
      },
      _ => usage("quiz-correct <q#> <option#>"),
    },
    "quiz-rm" => match args.as_slice() {
      [q] => match one_based(q).and_then(|q| shell.draft.quiz_mut().remove_question(q)) {
        Some(removed) => println!("  Removed \"{}\".", removed.question),
        None => println!("  No such question."),
      },
      _ => usage("quiz-rm <q#>"),
    },
    "quiz-rmopt" => match args.as_slice() {
      [q, o] => match (one_based(q), one_based(o)) {
        (Some(q), Some(o)) if shell.draft.quiz_mut().remove_option(q, o) => {}
        _ => println!("  No such option."),
      },
      _ => usage("quiz-rmopt <q#> <option#>"),
    },
    "quiz-limit" => match rest.parse::<u32>() {
      Ok(m) => shell.draft.quiz_mut().time_limit = m,
      Err(_) => usage("quiz-limit <minutes>"),
    },
    "quiz-pass" => match rest.parse::<u32>() {
      Ok(p) => shell.draft.quiz_mut().passing_score = p,
      Err(_) => usage("quiz-pass <percent>"),
    },
    "quiz-off" => shell.draft.disable_quiz(),
    "post" => {
      let _ = shell.create_problem().await;
    }

    "rmproblem" => match args.as_slice() {
      [id] => {
        let _ = shell.delete_problem(id).await;
      }
      _ => usage("rmproblem <id>"),
    },
    "upload" => match rest.split_once(char::is_whitespace) {
      Some((id, path)) => {
        let _ = shell.upload_attachment(id, Path::new(path.trim())).await;
      }
      None => usage("upload <problemId> <path>"),
    },
    "users" => {
      if shell.load_users().await.is_ok() {
        for u in shell.users.users() {
          println!("  {:<26} {:<8} {} <{}>", u.id, u.role, u.name, u.email);
        }
      }
    }
    "role" => match args.as_slice() {
      [id, role] => match role.parse::<Role>() {
        Ok(role) => {
          let _ = shell.change_user_role(id, role).await;
        }
        Err(e) => println!("  {e}"),
      },
      _ => usage("role <userId> <role>"),
    },
    "rmuser" => match args.as_slice() {
      [id] => {
        let _ = shell.delete_user(id).await;
      }
      _ => usage("rmuser <userId>"),
    },

    "notifications" => {
      shell.poll_notifications().await;
      println!("  Unread: {}", shell.unread().unwrap_or(0));
    }
    "read" => {
      let _ = shell.mark_notifications_read().await;
    }

    other => println!("  Unknown command '{other}'. Type 'help'."),
  }
  true
}

fn edit_draft(shell: &mut AppShell, args: &[&str], rest: &str) {
  let Some(field) = args.first() else {
    return usage("draft <field> <value>");
  };
  let value = rest[field.len()..].trim();
  let d = &mut shell.draft;
  match *field {
    "title" => d.title = value.to_string(),
    "description" => d.description = value.to_string(),
    "video" => d.video_url = value.to_string(),
    "branch" => d.branch = value.to_string(),
    "urgent" => d.is_urgent = matches!(value, "yes" | "true" | "1"),
    "difficulty" => match value {
      "beginner" => d.difficulty = Difficulty::Beginner,
      "intermediate" => d.difficulty = Difficulty::Intermediate,
      "advanced" => d.difficulty = Difficulty::Advanced,
      _ => usage("draft difficulty <beginner|intermediate|advanced>"),
    },
    "tag" => {
      if !d.add_tag(value) {
        println!("  Tag is empty or already present.");
      }
    }
    "untag" => {
      d.remove_tag(value);
    }
    _ => usage("draft <title|description|video|difficulty|branch|urgent|tag|untag> <value>"),
  }
}

/// "2" on a question with options means the second option's text.
fn resolve_option(shell: &AppShell, input: &str) -> String {
  let options = shell.quiz.current_question().map(|q| q.options.as_slice()).unwrap_or(&[]);
  match input.parse::<usize>() {
    Ok(n) if n >= 1 && n <= options.len() => options[n - 1].text.clone(),
    _ => input.to_string(),
  }
}

fn parse_question_type(s: &str) -> Option<QuestionType> {
  match s {
    "multiple-choice" | "mc" => Some(QuestionType::MultipleChoice),
    "boolean" | "bool" => Some(QuestionType::Boolean),
    "text" => Some(QuestionType::Text),
    _ => None,
  }
}

fn one_based(s: &str) -> Option<usize> {
  s.trim().parse::<usize>().ok().filter(|n| *n >= 1).map(|n| n - 1)
}

fn usage(text: &str) {
  println!("  usage: {text}");
}

fn mmss(secs: u32) -> String {
  format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn print_toasts(shell: &mut AppShell) {
  for t in shell.drain_toasts() {
    let mark = match t.kind {
      ToastKind::Info => "ℹ",
      ToastKind::Success => "✔",
      ToastKind::Error => "✖",
    };
    println!("{mark} {}", t.message);
  }
}

fn print_feed(shell: &AppShell) {
  let visible = shell.visible_problems();
  println!("  {} of {} problems", visible.len(), shell.feed.problems().len());
  for p in visible {
    let quiz = if p.required_quiz().is_some() { "quiz" } else { "" };
    println!(
      "  {:<26} {:<12} {:<4} {:>3} ideas  {}{}",
      p.id.as_deref().unwrap_or("-"),
      format!("{:?}", p.difficulty).to_lowercase(),
      quiz,
      p.ideas_count,
      p.title,
      p.company.as_deref().map(|c| format!(" ({c})")).unwrap_or_default(),
    );
  }
}

fn render(shell: &AppShell) {
  if shell.idea.is_open() {
    println!("── Submit your idea for {} ──", shell.idea.problem_id().unwrap_or("-"));
    println!("  idea: {}", if shell.idea.idea_text.is_empty() { "<empty>" } else { shell.idea.idea_text.as_str() });
    println!("  approach: {}", shell.idea.implementation_approach);
    println!("  (say / approach / send / close)");
    return;
  }

  match shell.quiz.state() {
    QuizState::Idle => {}
    QuizState::CheckingPriorAttempt => println!("  Checking your previous attempts…"),
    QuizState::RetakeInFlight { .. } => println!("  Resetting your attempt…"),
    QuizState::Submitting(_) => println!("  Submitting answers…"),
    QuizState::NoQuizRequired => println!("  No quiz required. Type 'idea' to submit your idea."),
    QuizState::ShowingPriorResult { response, error } => {
      println!(
        "  Previous attempt: {:.0}% ({}/{}) – {}",
        response.percentage,
        response.total_score,
        response.max_score,
        if response.passed { "passed" } else { "not passed" }
      );
      if let Some(e) = error {
        println!("  ✖ {e}");
      }
      println!("  {}", if response.passed { "Type 'idea' to submit, 'retake' or 'close'." } else { "Type 'retake' or 'close'." });
    }
    QuizState::ShowingResult { response } => {
      println!(
        "  Result: {:.0}% – {}",
        response.percentage,
        if response.passed { "passed! Type 'idea' to submit your idea." } else { "not passed. Type 'close'." }
      );
    }
    QuizState::Answering(a) => {
      if let Some(q) = shell.quiz.current_question() {
        println!("── Question {}/{} · {} left ──", a.current() + 1, a.total(), mmss(a.time_left()));
        println!("  {}", q.question);
        for (i, o) in q.options.iter().enumerate() {
          let chosen = if a.answer_for(a.current()) == Some(o.text.as_str()) { "*" } else { " " };
          println!("  {chosen}{}. {}", i + 1, o.text);
        }
        if q.options.is_empty() {
          println!("  answer: {}", a.answer_for(a.current()).unwrap_or("<none>"));
        }
        let nav = if a.can_go_next() { "next" } else { "submit" };
        println!("  (answer / prev / {nav})");
      }
      if let Some(e) = &a.error {
        println!("  ✖ {e} Type 'submit' to try again.");
      }
    }
  }

  if matches!(shell.quiz.state(), QuizState::Idle) {
    let name = match shell.view() {
      View::Login => "login",
      View::Feed => "feed",
      View::Dashboard => "dashboard",
      View::Problem(_) => "problem",
      View::Profile => "profile",
      View::Users => "users",
    };
    let unread = shell.unread().filter(|n| *n > 0).map(|n| format!(" · {n} unread")).unwrap_or_default();
    println!("[{name}{unread}]");
  }
}
