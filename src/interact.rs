//! The interactive collaborator boundary.
//!
//! The core only produces decision points (choose a candidate, confirm a
//! match, supply a free-form hint); how they are answered lives behind
//! this trait. Every decision point has a non-interactive default so the
//! whole system runs unattended.

use chrono::NaiveDate;
use regex::Regex;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::info;

use crate::catalog::Query;
use crate::config::FallbackPolicy;

/// Answers for the resolver's decision points.
pub trait Interaction: Send + Sync {
    /// Pick one of several candidate shoot IDs; None aborts, leaving the
    /// movie untagged.
    fn choose_candidate(&self, file: &Path, candidates: &[u64]) -> Option<u64>;

    /// Confirm a proposed match, shown as the formatted scene name.
    fn confirm(&self, file: &Path, formatted: &str) -> bool;

    /// Free-form query hint (an ID, a date, a title or a performer name)
    /// when nothing could be extracted; None skips the file.
    fn query_hint(&self, file: &Path) -> Option<Query>;
}

/// Unattended policy: never asks, decides per configuration.
pub struct NonInteractive {
    policy: FallbackPolicy,
}

impl NonInteractive {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }
}

impl Interaction for NonInteractive {
    fn choose_candidate(&self, file: &Path, candidates: &[u64]) -> Option<u64> {
        let choice = candidates.iter().max().copied();
        info!(
            "Non-interactively picking {:?} out of {:?} for {}",
            choice,
            candidates,
            file.display()
        );
        choice
    }

    fn confirm(&self, _file: &Path, _formatted: &str) -> bool {
        matches!(self.policy, FallbackPolicy::AcceptBest)
    }

    fn query_hint(&self, _file: &Path) -> Option<Query> {
        None
    }
}

/// Text prompts on stdin/stdout.
pub struct StdinPrompt;

impl StdinPrompt {
    fn read_line(prompt: &str) -> Option<String> {
        print!("{}", prompt);
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }
}

impl Interaction for StdinPrompt {
    fn choose_candidate(&self, file: &Path, candidates: &[u64]) -> Option<u64> {
        println!("Several plausible shoot IDs for \"{}\":", file.display());
        for (i, candidate) in candidates.iter().enumerate() {
            println!("  [{}] {}", i + 1, candidate);
        }

        loop {
            let answer = Self::read_line("Number to pick, #ID, or empty to skip: ")?;
            match parse_choice(&answer, candidates) {
                Choice::Chosen(id) => return Some(id),
                Choice::Skip => return None,
                Choice::Invalid => {
                    println!("Pick a listed number, or #<id> for a literal shoot ID.")
                }
            }
        }
    }

    fn confirm(&self, file: &Path, formatted: &str) -> bool {
        println!("Is this okay?");
        println!("{} -> {}", file.display(), formatted);
        match Self::read_line("Y, n? ") {
            Some(answer) => answer.is_empty() || answer.to_lowercase().starts_with('y'),
            None => false,
        }
    }

    fn query_hint(&self, file: &Path) -> Option<Query> {
        let answer = Self::read_line(&format!(
            "No shoot ID found for \"{}\". Enter an ID, a date, a title \
             or a performer name (empty to skip): ",
            file.display()
        ))?;
        parse_hint(&answer)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Chosen(u64),
    Skip,
    Invalid,
}

/// A bare number picks a listed candidate; a literal shoot ID needs the
/// explicit `#` prefix, so a mistyped index is never taken as an ID.
fn parse_choice(answer: &str, candidates: &[u64]) -> Choice {
    let answer = answer.trim();
    if answer.is_empty() {
        return Choice::Skip;
    }
    if let Some(literal) = answer.strip_prefix('#') {
        return match literal.trim().parse() {
            Ok(id) => Choice::Chosen(id),
            Err(_) => Choice::Invalid,
        };
    }
    match answer.parse::<usize>() {
        Ok(index) if (1..=candidates.len()).contains(&index) => {
            Choice::Chosen(candidates[index - 1])
        }
        _ => Choice::Invalid,
    }
}

/// Interpret a free-form answer: all digits is an ID, a date-shaped
/// string is a date, anything else searches titles (prefix `@` searches
/// performers).
pub fn parse_hint(answer: &str) -> Option<Query> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if answer.chars().all(|c| c.is_ascii_digit()) {
        return answer.parse().ok().map(Query::ById);
    }
    if let Some(date) = parse_date_like(answer) {
        return Some(Query::ByDate(date));
    }
    if let Some(name) = answer.strip_prefix('@') {
        return Some(Query::ByPerformer(name.trim().to_string()));
    }
    Some(Query::ByTitle(answer.to_string()))
}

/// `YYYY?MM?DD` with any single non-word separator.
pub fn parse_date_like(text: &str) -> Option<NaiveDate> {
    let re = Regex::new(r"(\d{4})\W(\d{1,2})\W(\d{1,2})").ok()?;
    let caps = re.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
