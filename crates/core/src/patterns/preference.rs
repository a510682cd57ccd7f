//! Preference scoring: per user×brand×category interaction strength over the
//! trailing 90 days, with an exponential recency boost.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::event::{InteractionEvent, InteractionType};
use crate::domain::pattern::PreferencePattern;
use crate::patterns::days_between;

/// Window the preference scorer reads.
pub const PREFERENCE_WINDOW_DAYS: i64 = 90;

/// Rows with fewer interactions than this are not materialized.
pub const MIN_TOTAL_INTERACTIONS: u32 = 3;

/// Recency decay constant in days; same-day activity roughly doubles the
/// interaction score, fading toward a 1.0 multiplier.
const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Contribution of one interaction to the raw interaction score.
pub fn interaction_weight(interaction_type: InteractionType) -> f64 {
    match interaction_type {
        InteractionType::AddToCart => 1.0,
        InteractionType::Click => 0.5,
        InteractionType::View => 0.1,
        InteractionType::RemoveFromCart | InteractionType::Purchase => 0.0,
    }
}

#[derive(Debug, Default)]
struct PreferenceAccumulator {
    total_interactions: u32,
    interaction_score: f64,
    active_days: HashSet<NaiveDate>,
    skus: HashSet<String>,
    last_interaction: Option<DateTime<Utc>>,
}

/// Compute the full preference snapshot from a 90-day interaction window.
///
/// Events without a user_id are anonymous and carry no preference signal;
/// they are ignored. Output is ordered by (user_id, brand, category).
pub fn compute_preferences(
    events: &[InteractionEvent],
    now: DateTime<Utc>,
) -> Vec<PreferencePattern> {
    let mut groups: BTreeMap<(String, String, String), PreferenceAccumulator> = BTreeMap::new();

    for event in events {
        let Some(user_id) = event.user_id.as_deref() else {
            continue;
        };

        let key = (user_id.to_string(), event.brand.clone(), event.category.clone());
        let acc = groups.entry(key).or_default();

        acc.total_interactions += 1;
        acc.interaction_score += interaction_weight(event.interaction_type);
        acc.active_days.insert(event.timestamp.date_naive());
        acc.skus.insert(event.product_sku.clone());
        acc.last_interaction = Some(match acc.last_interaction {
            Some(current) => current.max(event.timestamp),
            None => event.timestamp,
        });
    }

    groups
        .into_iter()
        .filter(|(_, acc)| acc.total_interactions >= MIN_TOTAL_INTERACTIONS)
        .filter_map(|((user_id, brand, category), acc)| {
            let last_interaction = acc.last_interaction?;
            let delta_days = days_between(last_interaction, now).max(0.0);
            let recency_boost = 1.0 + (-delta_days / RECENCY_DECAY_DAYS).exp();

            let confidence = ((f64::from(acc.total_interactions) / 10.0)
                * (acc.active_days.len() as f64 / 30.0)
                * (acc.skus.len() as f64 / 5.0))
                .min(1.0);

            Some(PreferencePattern {
                user_id,
                brand,
                category,
                total_interactions: acc.total_interactions,
                interaction_score: acc.interaction_score,
                preference_score: acc.interaction_score * recency_boost,
                confidence,
                last_interaction,
                active_days: acc.active_days.len() as u32,
                product_variety: acc.skus.len() as u32,
                last_updated: now,
            })
        })
        .collect()
}
