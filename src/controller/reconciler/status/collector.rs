//! # Status Collector
//!
//! Accumulates every status mutation of one reconcile pass and writes them in
//! a single status update at the end.
//!
//! The collector starts from the status read at the beginning of the pass.
//! Conditions are upserted by type; `lastTransitionTime` only moves when the
//! condition's status flips. [`StatusCollector::commit`] skips the write
//! entirely when the rendered status equals the original, so a pass without
//! drift performs no writes.

use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{Condition, ConditionStatus, Phase};
use crate::observability::metrics;
use crate::store::{kind_of, Object, ObjectStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Objects with a typed status subresource
pub trait HasStatus: Object {
    type Status: Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;
    fn status_mut(&mut self) -> &mut Option<Self::Status>;
}

#[derive(Debug)]
pub struct StatusCollector<T> {
    original: Option<T>,
    generation: Option<i64>,
    phase: Option<Phase>,
    message: Option<String>,
    // Upserted by type, in first-set order
    conditions: Vec<Condition>,
    fields: BTreeMap<String, Value>,
}

impl<T> StatusCollector<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + PartialEq,
{
    /// Open a collector for a status read at generation `generation`
    pub fn new(original: Option<T>, generation: Option<i64>) -> Self {
        Self {
            original,
            generation,
            phase: None,
            message: None,
            conditions: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Open a collector over the current status of `obj`
    pub fn for_object<K: HasStatus<Status = T>>(obj: &K) -> Self {
        Self::new(obj.status().cloned(), obj.meta().generation)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = Some(phase);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Upsert a condition; the last call for a type within a pass wins
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        let condition = Condition {
            r#type: condition_type.to_string(),
            status,
            reason: Some(reason.to_string()),
            message: Some(message.into()).filter(|m: &String| !m.is_empty()),
            observed_generation: self.generation,
            last_transition_time: None,
        };
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Set a kind-specific status field by its serialized (camelCase) name.
    /// `Value::Null` removes the field.
    pub fn set_field(&mut self, name: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn original(&self) -> Option<&T> {
        self.original.as_ref()
    }

    /// Condition recorded in this pass, if any
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    fn original_value(&self) -> Result<Value, ReconcilerError> {
        let original = self.original.clone().unwrap_or_default();
        serde_json::to_value(original)
            .map_err(|e| anyhow::anyhow!("serialize status: {e}").into())
    }

    /// Apply this pass's mutations on top of the original status
    ///
    /// # Errors
    ///
    /// Fails when the combined status no longer matches the typed schema.
    pub fn render(&self) -> Result<T, ReconcilerError> {
        let mut value = self.original_value()?;
        if !value.is_object() {
            value = Value::Object(Map::new());
        }
        let Value::Object(map) = &mut value else {
            return Err(anyhow::anyhow!("status is not an object").into());
        };

        if let Some(phase) = self.phase {
            map.insert("phase".to_string(), Value::String(phase.as_str().to_string()));
        }
        if let Some(message) = &self.message {
            map.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(generation) = self.generation {
            map.insert("observedGeneration".to_string(), Value::from(generation));
        }

        if !self.conditions.is_empty() {
            let mut merged: Vec<Condition> = map
                .get("conditions")
                .cloned()
                .and_then(|c| serde_json::from_value(c).ok())
                .unwrap_or_default();
            for update in &self.conditions {
                upsert_condition(&mut merged, update);
            }
            let conditions = serde_json::to_value(merged)
                .map_err(|e| anyhow::anyhow!("serialize conditions: {e}"))?;
            map.insert("conditions".to_string(), conditions);
        }

        for (name, field) in &self.fields {
            if field.is_null() {
                map.remove(name);
            } else {
                map.insert(name.clone(), field.clone());
            }
        }

        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("rendered status does not match schema: {e}").into())
    }

    /// Whether committing would write anything
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match (self.render(), self.original_value()) {
            (Ok(rendered), Ok(original)) => {
                serde_json::to_value(rendered).ok() != Some(original)
            }
            _ => true,
        }
    }

    /// Write the collected status to `obj` in one status update
    ///
    /// Returns the updated object, or `None` when nothing changed and no write
    /// was issued. Conflicts are returned as errors and never retried here.
    ///
    /// # Errors
    ///
    /// Store errors, including optimistic-concurrency conflicts.
    pub async fn commit<K, S>(self, obj: &K, store: &S) -> Result<Option<K>, ReconcilerError>
    where
        K: HasStatus<Status = T>,
        S: ObjectStore,
    {
        if !self.has_changes() {
            debug!(
                resource.kind = %kind_of::<K>(),
                resource.name = obj.meta().name.as_deref().unwrap_or_default(),
                "Skipping status update - status unchanged"
            );
            return Ok(None);
        }
        let rendered = self.render()?;
        let mut updated = obj.clone();
        *updated.status_mut() = Some(rendered);
        let written = store.update_status(&updated).await?;
        metrics::increment_status_writes(&kind_of::<K>());
        Ok(Some(written))
    }
}

fn upsert_condition(conditions: &mut Vec<Condition>, update: &Condition) {
    let now = || chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match conditions.iter_mut().find(|c| c.r#type == update.r#type) {
        Some(existing) => {
            let transition = if existing.status == update.status {
                existing.last_transition_time.clone().or_else(|| Some(now()))
            } else {
                Some(now())
            };
            *existing = Condition {
                last_transition_time: transition,
                ..update.clone()
            };
        }
        None => conditions.push(Condition {
            last_transition_time: Some(now()),
            ..update.clone()
        }),
    }
}
