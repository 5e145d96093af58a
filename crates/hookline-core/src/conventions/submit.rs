//! Per-entity-set authorization and pre-commit handlers registered by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::ApiContext;
use crate::error::ApiResult;
use crate::hooks::{ChangeSetEntryValidator, ChangeSetPreCommitHook};
use crate::submit::{
    ChangeSet, ChangeSetEntry, DataModificationEntry, EntityAction, ValidationResult,
    ValidationResults,
};

type RuleKey = (String, EntityAction);
type AuthorizeFn = dyn Fn(&ApiContext, &DataModificationEntry) -> bool + Send + Sync;
type HandleFn = dyn Fn(&ApiContext, &mut DataModificationEntry) + Send + Sync;

fn rule_key(entity_set: &str, action: EntityAction) -> RuleKey {
    (entity_set.to_lowercase(), action)
}

fn sorted_rules<V>(rules: &HashMap<RuleKey, V>) -> Vec<String> {
    let mut names: Vec<String> = rules
        .keys()
        .map(|(set, action)| format!("{action}:{set}"))
        .collect();
    names.sort();
    names
}

/// Change-set validator denying data modifications by entity set and action.
///
/// An entry with no matching rule is allowed. A denied entry records an
/// error result with id `forbidden`.
#[derive(Default, Clone)]
pub struct ConventionBasedChangeSetAuthorizer {
    rules: HashMap<RuleKey, Arc<AuthorizeFn>>,
}

impl ConventionBasedChangeSetAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_insert<F>(self, entity_set: &str, rule: F) -> Self
    where
        F: Fn(&ApiContext, &DataModificationEntry) -> bool + Send + Sync + 'static,
    {
        self.rule(entity_set, EntityAction::Insert, rule)
    }

    pub fn can_update<F>(self, entity_set: &str, rule: F) -> Self
    where
        F: Fn(&ApiContext, &DataModificationEntry) -> bool + Send + Sync + 'static,
    {
        self.rule(entity_set, EntityAction::Update, rule)
    }

    pub fn can_remove<F>(self, entity_set: &str, rule: F) -> Self
    where
        F: Fn(&ApiContext, &DataModificationEntry) -> bool + Send + Sync + 'static,
    {
        self.rule(entity_set, EntityAction::Remove, rule)
    }

    fn rule<F>(mut self, entity_set: &str, action: EntityAction, rule: F) -> Self
    where
        F: Fn(&ApiContext, &DataModificationEntry) -> bool + Send + Sync + 'static,
    {
        self.rules.insert(rule_key(entity_set, action), Arc::new(rule));
        self
    }
}

#[async_trait]
impl ChangeSetEntryValidator for ConventionBasedChangeSetAuthorizer {
    async fn validate(
        &self,
        context: &ApiContext,
        entry: &ChangeSetEntry,
        results: &mut ValidationResults,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        let Some(modification) = entry.as_data_modification() else {
            return Ok(());
        };
        let key = rule_key(&modification.entity_set, modification.action);
        if let Some(rule) = self.rules.get(&key) {
            if !rule(context, modification) {
                debug!(entity_set = %modification.entity_set, action = %modification.action, "entry denied");
                results.push(ValidationResult::error(
                    "forbidden",
                    format!(
                        "{} on {} is not allowed",
                        modification.action, modification.entity_set
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConventionBasedChangeSetAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConventionBasedChangeSetAuthorizer")
            .field("rules", &sorted_rules(&self.rules))
            .finish()
    }
}

/// Pre-commit hook running per-entity-set handlers over data modifications.
///
/// Handlers may rewrite the entry's key or values. If any entry changes, the
/// change set's `any_entity_changed` flag is set.
#[derive(Default, Clone)]
pub struct ConventionBasedChangeSetEntryFilter {
    handlers: HashMap<RuleKey, Arc<HandleFn>>,
}

impl ConventionBasedChangeSetEntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_inserting<F>(self, entity_set: &str, handler: F) -> Self
    where
        F: Fn(&ApiContext, &mut DataModificationEntry) + Send + Sync + 'static,
    {
        self.handler(entity_set, EntityAction::Insert, handler)
    }

    pub fn on_updating<F>(self, entity_set: &str, handler: F) -> Self
    where
        F: Fn(&ApiContext, &mut DataModificationEntry) + Send + Sync + 'static,
    {
        self.handler(entity_set, EntityAction::Update, handler)
    }

    pub fn on_removing<F>(self, entity_set: &str, handler: F) -> Self
    where
        F: Fn(&ApiContext, &mut DataModificationEntry) + Send + Sync + 'static,
    {
        self.handler(entity_set, EntityAction::Remove, handler)
    }

    fn handler<F>(mut self, entity_set: &str, action: EntityAction, handler: F) -> Self
    where
        F: Fn(&ApiContext, &mut DataModificationEntry) + Send + Sync + 'static,
    {
        self.handlers
            .insert(rule_key(entity_set, action), Arc::new(handler));
        self
    }
}

#[async_trait]
impl ChangeSetPreCommitHook for ConventionBasedChangeSetEntryFilter {
    async fn on_executing(
        &self,
        context: &ApiContext,
        change_set: &mut ChangeSet,
        _cancel: &CancellationToken,
    ) -> ApiResult<()> {
        let mut changed = false;
        for entry in change_set.entries_mut() {
            let Some(modification) = entry.as_data_modification_mut() else {
                continue;
            };
            let key = rule_key(&modification.entity_set, modification.action);
            let Some(handler) = self.handlers.get(&key) else {
                continue;
            };
            let before = modification.clone();
            handler(context, modification);
            changed |= *modification != before;
        }
        if changed {
            change_set.any_entity_changed = true;
        }
        Ok(())
    }
}

impl fmt::Debug for ConventionBasedChangeSetEntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConventionBasedChangeSetEntryFilter")
            .field("handlers", &sorted_rules(&self.handlers))
            .finish()
    }
}
