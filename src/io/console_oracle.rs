// src/io/console_oracle.rs
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use log::warn;

use crate::rl::active_learning::{Oracle, OracleResponse, PairForReview};

const CHOICES: [(&str, OracleResponse); 4] = [
    ("(y)es, these are the same", OracleResponse::Match),
    ("(n)o, these are different", OracleResponse::Distinct),
    ("(u)nsure", OracleResponse::Skip),
    ("(f)inished labeling", OracleResponse::Stop),
];

/// Asks a person at the terminal to judge each pair.
#[derive(Debug, Default)]
pub struct ConsoleOracle {
    asked: usize,
}

impl ConsoleOracle {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The side-by-side view of a pair shown before each question.
pub fn render_review(review: &PairForReview<'_>) -> String {
    let rows = review.field_values();
    let width = rows.iter().map(|(name, _, _)| name.len()).max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(&format!("Record {}  vs  record {}\n", review.pair.id_1, review.pair.id_2));
    for (name, left, right) in rows {
        out.push_str(&format!(
            "  {:<width$} : {}\n  {:<width$}   {}\n",
            name,
            left.unwrap_or("<missing>"),
            "",
            right.unwrap_or("<missing>"),
            width = width
        ));
    }
    if let Some(p) = review.predicted_probability {
        out.push_str(&format!("Current model: {:.1}% likely a match\n", p * 100.0));
    }
    out.push_str(&format!(
        "Labeled so far: {} matching, {} distinct\n",
        review.matches_so_far, review.distincts_so_far
    ));
    out
}

impl Oracle for ConsoleOracle {
    fn ask(&mut self, review: &PairForReview<'_>) -> OracleResponse {
        self.asked += 1;
        eprintln!();
        eprint!("{}", render_review(review));
        let items: Vec<&str> = CHOICES.iter().map(|(label, _)| *label).collect();
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Question {}: do these records refer to the same thing?", self.asked))
            .items(&items)
            .default(2)
            .interact_opt();
        match choice {
            Ok(Some(idx)) => CHOICES[idx].1,
            Ok(None) => OracleResponse::Stop,
            Err(e) => {
                warn!("Could not read an answer from the terminal ({}); finishing labeling", e);
                OracleResponse::Stop
            }
        }
    }
}
