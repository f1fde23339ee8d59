//! Display formatting utilities for CLI output

use anyhow::Result;
use colored::*;
use serde::Serialize;

use crate::analytics::AgentAnalytics;
use crate::processing::ProcessingReport;
use crate::recommend::Recommendation;
use crate::record::TranscriptRecord;
use crate::similarity::ScoredCall;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Score with a colour keyed to how close the match is
pub fn format_score(score: f32) -> String {
  let text = format!("{score:.3}");
  if score >= 0.8 {
    text.green().to_string()
  } else if score >= 0.5 {
    text.yellow().to_string()
  } else {
    text.dimmed().to_string()
  }
}

pub fn format_optional(value: Option<f32>) -> String {
  match value {
    Some(value) => format!("{value:.2}"),
    None => "-".to_string(),
  }
}

pub fn print_report(report: &ProcessingReport) {
  println!("{} Processed {}/{} transcripts", "✓".green(), report.processed, report.total);
  if report.skipped > 0 {
    println!("  {} skipped (empty text)", report.skipped.to_string().yellow());
  }
  if report.without_embedding > 0 {
    println!("  {} without embedding", report.without_embedding.to_string().yellow());
  }
  if report.rejected > 0 {
    println!("  {} rejected by the index", report.rejected.to_string().red());
  }
}

pub fn print_similar(call_id: &str, results: &[ScoredCall]) {
  if results.is_empty() {
    println!("No similar calls found for {}", call_id.yellow());
    return;
  }
  println!("Calls similar to {}:", call_id.cyan().bold());
  for (rank, result) in results.iter().enumerate() {
    println!("  {:>2}. {} {}", rank + 1, result.call_id.bold(), format_score(result.score));
  }
}

pub fn print_tips(tips: &[String]) {
  for tip in tips {
    println!("  {} {}", "•".cyan(), tip);
  }
}

pub fn print_recommendation(recommendation: &Recommendation) {
  print_similar(&recommendation.source_call_id, &recommendation.recommendations);
  println!();
  println!("{}", "Coaching nudges:".blue().bold());
  print_tips(&recommendation.coaching_nudges);
}

pub fn print_analytics(rows: &[AgentAnalytics]) {
  println!(
    "{:<20} {:>6} {:>10} {:>11}",
    "agent".bold(),
    "calls".bold(),
    "sentiment".bold(),
    "talk ratio".bold()
  );
  for row in rows {
    println!(
      "{:<20} {:>6} {:>10} {:>11}",
      row.agent_id,
      row.total_calls,
      format_optional(row.average_sentiment),
      format_optional(row.average_talk_ratio)
    );
  }
}

pub fn print_calls(records: &[TranscriptRecord]) {
  println!(
    "{:<38} {:<14} {:<17} {:>10} {:>11}",
    "call".bold(),
    "agent".bold(),
    "started".bold(),
    "sentiment".bold(),
    "talk ratio".bold()
  );
  for record in records {
    let started = record
      .started_at
      .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
      .unwrap_or_else(|| "-".to_string());
    println!(
      "{:<38} {:<14} {:<17} {:>10} {:>11}",
      record.id,
      record.agent_id.as_deref().unwrap_or("-"),
      started,
      format_optional(record.features.map(|f| f.sentiment)),
      format_optional(record.features.map(|f| f.talk_ratio))
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_optional() {
    assert_eq!(format_optional(Some(0.456)), "0.46");
    assert_eq!(format_optional(None), "-");
  }

  #[test]
  fn test_format_score_keeps_three_decimals() {
    colored::control::set_override(false);
    assert_eq!(format_score(0.99391), "0.994");
    assert_eq!(format_score(0.0), "0.000");
  }
}
