//! Filtered, paged listing of stored calls

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use crate::record::TranscriptRecord;

pub const DEFAULT_LIMIT: usize = 100;

/// Filters for [`list_calls`]; every `None` matches everything.
///
/// A date bound only matches calls with a start time, and a sentiment bound
/// only matches processed calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallFilter {
  pub agent_id: Option<String>,
  /// First day included, from midnight UTC
  pub from_date: Option<NaiveDate>,
  /// Last day included, up to midnight UTC of the following day
  pub to_date: Option<NaiveDate>,
  pub min_sentiment: Option<f32>,
  pub max_sentiment: Option<f32>,
  pub skip: usize,
  pub limit: usize,
}

impl Default for CallFilter {
  fn default() -> Self {
    Self {
      agent_id: None,
      from_date: None,
      to_date: None,
      min_sentiment: None,
      max_sentiment: None,
      skip: 0,
      limit: DEFAULT_LIMIT,
    }
  }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
  day.and_time(chrono::NaiveTime::MIN).and_utc()
}

impl CallFilter {
  pub fn matches(&self, record: &TranscriptRecord) -> bool {
    if let Some(agent_id) = &self.agent_id {
      if record.agent_id.as_ref() != Some(agent_id) {
        return false;
      }
    }

    if self.from_date.is_some() || self.to_date.is_some() {
      let Some(started_at) = record.started_at else {
        return false;
      };
      if self.from_date.is_some_and(|from| started_at < start_of(from)) {
        return false;
      }
      if let Some(to) = self.to_date {
        // an unrepresentable next day leaves the range open-ended
        if to.checked_add_days(Days::new(1)).is_some_and(|end| started_at >= start_of(end)) {
          return false;
        }
      }
    }

    if self.min_sentiment.is_some() || self.max_sentiment.is_some() {
      let Some(sentiment) = record.features.map(|f| f.sentiment) else {
        return false;
      };
      if self.min_sentiment.is_some_and(|min| sentiment < min) {
        return false;
      }
      if self.max_sentiment.is_some_and(|max| sentiment > max) {
        return false;
      }
    }

    true
  }
}

/// Calls matching `filter`, newest first, after skipping `filter.skip` of them.
///
/// Calls without a start time come after dated ones; equal start times are
/// ordered by id.
pub fn list_calls<'a, I>(records: I, filter: &CallFilter) -> Vec<TranscriptRecord>
where
  I: IntoIterator<Item = &'a TranscriptRecord>,
{
  let mut matching: Vec<&TranscriptRecord> =
    records.into_iter().filter(|record| filter.matches(record)).collect();

  matching.sort_by(|a, b| {
    match (a.started_at, b.started_at) {
      (Some(a_start), Some(b_start)) => b_start.cmp(&a_start),
      (Some(_), None) => std::cmp::Ordering::Less,
      (None, Some(_)) => std::cmp::Ordering::Greater,
      (None, None) => std::cmp::Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
  });

  matching.into_iter().skip(filter.skip).take(filter.limit).cloned().collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::CallFeatures;

  fn call(
    id: &str,
    agent: &str,
    started: Option<&str>,
    sentiment: Option<f32>,
  ) -> TranscriptRecord {
    let mut record = TranscriptRecord::new(id, "agent: hi").with_agent(agent);
    record.started_at = started.map(|s| s.parse().unwrap());
    record.features = sentiment.map(|sentiment| CallFeatures { talk_ratio: 0.5, sentiment });
    record
  }

  fn corpus() -> Vec<TranscriptRecord> {
    vec![
      call("a", "amy", Some("2024-05-01T09:00:00Z"), Some(0.8)),
      call("b", "amy", Some("2024-05-03T23:59:59Z"), Some(-0.4)),
      call("c", "zed", Some("2024-05-04T00:00:00Z"), Some(0.1)),
      call("d", "zed", None, None),
      call("e", "amy", Some("2024-05-01T09:00:00Z"), None),
    ]
  }

  fn ids(records: Vec<TranscriptRecord>) -> Vec<String> {
    records.into_iter().map(|r| r.id).collect()
  }

  fn day(s: &str) -> Option<NaiveDate> {
    Some(s.parse().unwrap())
  }

  #[test]
  fn test_default_lists_newest_first() {
    let listed = ids(list_calls(&corpus(), &CallFilter::default()));
    assert_eq!(listed, vec!["c", "b", "a", "e", "d"]);
  }

  #[test]
  fn test_agent_filter() {
    let filter = CallFilter { agent_id: Some("zed".into()), ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["c", "d"]);
  }

  #[test]
  fn test_to_date_includes_whole_day() {
    let filter = CallFilter { to_date: day("2024-05-03"), ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["b", "a", "e"]);

    let filter = CallFilter { from_date: day("2024-05-02"), ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["c", "b"]);

    let filter = CallFilter {
      from_date: day("2024-05-04"),
      to_date: day("2024-05-04"),
      ..CallFilter::default()
    };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["c"]);
  }

  #[test]
  fn test_sentiment_bounds_are_inclusive_and_need_features() {
    let filter = CallFilter { min_sentiment: Some(0.1), ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["c", "a"]);

    let filter = CallFilter { max_sentiment: Some(0.1), ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["c", "b"]);
  }

  #[test]
  fn test_skip_and_limit_page_after_ordering() {
    let filter = CallFilter { skip: 1, limit: 2, ..CallFilter::default() };
    assert_eq!(ids(list_calls(&corpus(), &filter)), vec!["b", "a"]);

    let filter = CallFilter { skip: 10, ..CallFilter::default() };
    assert!(list_calls(&corpus(), &filter).is_empty());

    let filter = CallFilter { limit: 0, ..CallFilter::default() };
    assert!(list_calls(&corpus(), &filter).is_empty());
  }
}
