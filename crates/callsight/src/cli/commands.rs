use anyhow::{anyhow, Context as _, Result};
use colored::*;
use serde::Serialize;
use std::path::Path;

use super::display;
use super::Context;
use crate::analytics::agent_analytics;
use crate::listing::{list_calls, CallFilter};
use crate::processing::process_pending;
use crate::record::{NewCall, TranscriptRecord};
use crate::store::TranscriptStore;

#[derive(Debug, Serialize)]
struct IngestSummary {
  ingested: usize,
  ids: Vec<String>,
}

/// Parse a JSON array of calls, or one JSON call per line.
pub fn parse_calls(content: &str) -> Result<Vec<NewCall>> {
  let trimmed = content.trim_start();
  if trimmed.is_empty() {
    return Ok(Vec::new());
  }
  if trimmed.starts_with('[') {
    return serde_json::from_str(trimmed).context("Failed to parse call array");
  }

  content
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(number, line)| {
      serde_json::from_str(line)
        .with_context(|| format!("Failed to parse call on line {}", number + 1))
    })
    .collect()
}

/// Store calls read from `file`
pub async fn ingest(ctx: &Context, file: &Path) -> Result<()> {
  let content = std::fs::read_to_string(file)
    .with_context(|| format!("Failed to read {}", file.display()))?;
  let records: Vec<TranscriptRecord> =
    parse_calls(&content)?.into_iter().map(TranscriptRecord::from).collect();
  let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

  ctx.store.save_many(records).await?;
  tracing::info!(count = ids.len(), "ingested calls");

  if ctx.json {
    return display::print_json(&IngestSummary { ingested: ids.len(), ids });
  }
  println!("{} Ingested {} calls into {}", "✓".green(), ids.len(), ctx.store.path().display());
  Ok(())
}

/// Extract features for every call without an embedding
pub async fn process(ctx: &Context) -> Result<()> {
  let index = ctx.index().await?;
  let report = process_pending(ctx.store.as_ref(), &ctx.extractor(), &index).await?;

  if ctx.json {
    return display::print_json(&report);
  }
  display::print_report(&report);
  Ok(())
}

pub async fn similar(ctx: &Context, call_id: &str, k: Option<usize>) -> Result<()> {
  let recommender = ctx.recommender().await?;
  let results = recommender.similar(call_id, ctx.k_or_default(k)).await?;

  if ctx.json {
    return display::print_json(&results);
  }
  display::print_similar(call_id, &results);
  Ok(())
}

pub async fn advise(ctx: &Context, call_id: &str) -> Result<()> {
  let recommender = ctx.recommender().await?;
  let tips = recommender.advise(call_id).await?;

  if ctx.json {
    return display::print_json(&tips);
  }
  display::print_tips(&tips);
  Ok(())
}

pub async fn recommend(ctx: &Context, call_id: &str, k: Option<usize>) -> Result<()> {
  let recommender = ctx.recommender().await?;
  let recommendation = recommender.recommend(call_id, ctx.k_or_default(k)).await?;

  if ctx.json {
    return display::print_json(&recommendation);
  }
  display::print_recommendation(&recommendation);
  Ok(())
}

/// List stored calls, newest first
pub async fn calls(ctx: &Context, filter: &CallFilter) -> Result<()> {
  let records = ctx.store.list().await?;
  let listed = list_calls(&records, filter);

  if ctx.json {
    return display::print_json(&listed);
  }
  if listed.is_empty() {
    println!("No calls match the filter.");
    return Ok(());
  }
  display::print_calls(&listed);
  Ok(())
}

pub async fn analytics(ctx: &Context) -> Result<()> {
  let records = ctx.store.list().await?;
  let rows = agent_analytics(&records);

  if ctx.json {
    return display::print_json(&rows);
  }
  if rows.is_empty() {
    println!("No calls with an agent found.");
    return Ok(());
  }
  display::print_analytics(&rows);
  Ok(())
}

/// Show the effective configuration; the API key is never printed
pub fn show_config(ctx: &Context) -> Result<()> {
  let mut value = serde_json::to_value(&ctx.config)?;
  let configured = ctx.config.coaching.api_key.is_some();
  value
    .get_mut("coaching")
    .and_then(|coaching| coaching.as_object_mut())
    .ok_or_else(|| anyhow!("configuration has no coaching section"))?
    .insert("api_key_configured".to_string(), configured.into());
  display::print_json(&value)
}
