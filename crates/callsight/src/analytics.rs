//! Per-agent aggregates over stored calls

use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::TranscriptRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentAnalytics {
  pub agent_id: String,
  pub total_calls: usize,
  /// Mean over processed calls; `None` when none has been processed
  pub average_sentiment: Option<f32>,
  pub average_talk_ratio: Option<f32>,
}

#[derive(Default)]
struct Tally {
  calls: usize,
  processed: usize,
  sentiment: f64,
  talk_ratio: f64,
}

/// Group records by agent, busiest agents first.
///
/// Records without an agent are ignored. Ties in call count are ordered by
/// agent id.
pub fn agent_analytics<'a, I>(records: I) -> Vec<AgentAnalytics>
where
  I: IntoIterator<Item = &'a TranscriptRecord>,
{
  let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
  for record in records {
    let Some(agent_id) = record.agent_id.as_deref() else {
      continue;
    };
    let tally = tallies.entry(agent_id).or_default();
    tally.calls += 1;
    if let Some(features) = record.features {
      tally.processed += 1;
      tally.sentiment += f64::from(features.sentiment);
      tally.talk_ratio += f64::from(features.talk_ratio);
    }
  }

  let mut rows: Vec<AgentAnalytics> = tallies
    .into_iter()
    .map(|(agent_id, tally)| {
      let mean = |sum: f64| (tally.processed > 0).then(|| (sum / tally.processed as f64) as f32);
      AgentAnalytics {
        agent_id: agent_id.to_string(),
        total_calls: tally.calls,
        average_sentiment: mean(tally.sentiment),
        average_talk_ratio: mean(tally.talk_ratio),
      }
    })
    .collect();

  // BTreeMap order already sorts by id; the stable sort keeps it within equal counts
  rows.sort_by(|a, b| b.total_calls.cmp(&a.total_calls));
  rows
}
