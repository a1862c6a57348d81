//! Journal orchestrator: one invocation is load, mutate in memory, commit.
//!
//! Owns the schema, the resolver with its adapters, the store and the loaded
//! ledger for the lifetime of a single run. Nothing here is global.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{validate_chains, ConfigError, JournalConfig};
use crate::data::SourceRegistry;
use crate::ledger::{FieldCoverage, Ledger};
use crate::reconcile::{ReconcileEngine, ReconcileMode, ReconcileReport, TargetDates};
use crate::repair::{self, GapFillOptions, OverrideOptions, RepairReport, RescaleRule};
use crate::resolver::FallbackResolver;
use crate::schema::{FieldId, ObservationSchema};
use crate::store::{CommitSummary, LedgerError, LedgerStore, PersistMode};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("no rescale rule configured for field '{0}'")]
    NoRescaleRule(String),
}

/// One repair pass and its parameters.
#[derive(Debug, Clone)]
pub enum RepairOp {
    GapFill(GapFillOptions),
    /// Empty `fields` applies every configured rule.
    Rescale { fields: Vec<FieldId>, force: bool },
    Precision(Vec<FieldId>),
    Sort,
    Override(OverrideOptions),
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub report: ReconcileReport,
    pub commit: CommitSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub report: RepairReport,
    /// `None` when the pass changed nothing and the file was left untouched.
    pub commit: Option<CommitSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatus {
    pub path: PathBuf,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub complete_rows: usize,
    pub coverage: Vec<FieldCoverage>,
}

pub struct Journal {
    schema: ObservationSchema,
    resolver: FallbackResolver,
    store: LedgerStore,
    ledger: Ledger,
    rescale_rules: Vec<RescaleRule>,
}

impl Journal {
    /// Build adapters from `config` and load the ledger.
    pub fn open(config: &JournalConfig, offline: bool) -> Result<Self, JournalError> {
        let schema = config.schema()?;
        let registry = config.build_registry(offline)?;
        let rules = config.rescale_rules(&schema)?;
        let store = LedgerStore::new(&config.ledger)
            .with_mode(config.persist)
            .with_backup(config.backup);
        Self::from_parts(schema, registry, store, rules)
    }

    /// Assemble from explicit parts; used by tests with in-memory adapters.
    pub fn from_parts(
        schema: ObservationSchema,
        registry: SourceRegistry,
        mut store: LedgerStore,
        rescale_rules: Vec<RescaleRule>,
    ) -> Result<Self, JournalError> {
        validate_chains(&schema, &registry)?;
        let ledger = store.load(&schema)?;
        Ok(Self {
            schema,
            resolver: FallbackResolver::new(registry),
            store,
            ledger,
            rescale_rules,
        })
    }

    pub fn schema(&self) -> &ObservationSchema {
        &self.schema
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Resolve field names; an empty list selects every field.
    pub fn field_ids(&self, names: &[String]) -> Result<Vec<FieldId>, JournalError> {
        if names.is_empty() {
            return Ok(self.schema.ids().collect());
        }
        names
            .iter()
            .map(|n| {
                self.schema
                    .find(n)
                    .ok_or_else(|| JournalError::UnknownField(n.clone()))
            })
            .collect()
    }

    /// Reconcile the target dates and commit exactly once.
    pub fn update(
        &mut self,
        targets: &TargetDates,
        mode: ReconcileMode,
    ) -> Result<UpdateOutcome, JournalError> {
        let dates = targets.expand(&self.ledger, &self.schema);
        tracing::info!(dates = dates.len(), %mode, "reconciling");

        let engine = ReconcileEngine::new(&self.schema, &self.resolver);
        let report = engine.reconcile(&mut self.ledger, &dates, mode);

        if self.store.mode() == PersistMode::Rewrite {
            let moved = self.ledger.sort_by_date();
            if moved > 0 {
                tracing::debug!(moved, "rows reordered before commit");
            }
        }
        let commit = self.store.commit(&self.ledger, &self.schema)?;
        Ok(UpdateOutcome { report, commit })
    }

    /// Run one repair pass. Repairs commit with a full rewrite, and only
    /// when the pass changed something.
    pub fn repair(&mut self, op: &RepairOp) -> Result<RepairOutcome, JournalError> {
        let report = match op {
            RepairOp::GapFill(opts) => {
                repair::gap_fill(&mut self.ledger, &self.schema, &self.resolver, opts)
            }
            RepairOp::Rescale { fields, force } => {
                let rules = self.select_rules(fields)?;
                repair::rescale(&mut self.ledger, &self.schema, &rules, *force)
            }
            RepairOp::Precision(fields) => {
                repair::normalize_precision(&mut self.ledger, &self.schema, fields)
            }
            RepairOp::Sort => repair::sort_by_date(&mut self.ledger),
            RepairOp::Override(opts) => {
                repair::override_from_sources(&mut self.ledger, &self.schema, &self.resolver, opts)
            }
        };

        let commit = if report.mutation_count() > 0 {
            Some(
                self.store
                    .commit_with(&self.ledger, &self.schema, PersistMode::Rewrite)?,
            )
        } else {
            tracing::info!(pass = %report.pass, "nothing to repair, ledger untouched");
            None
        };
        Ok(RepairOutcome { report, commit })
    }

    fn select_rules(&self, fields: &[FieldId]) -> Result<Vec<RescaleRule>, JournalError> {
        if fields.is_empty() {
            return Ok(self.rescale_rules.clone());
        }
        let mut out = Vec::new();
        for &f in fields {
            let matching: Vec<_> = self
                .rescale_rules
                .iter()
                .filter(|r| r.field == f)
                .copied()
                .collect();
            if matching.is_empty() {
                return Err(JournalError::NoRescaleRule(
                    self.schema.field(f).name.clone(),
                ));
            }
            out.extend(matching);
        }
        Ok(out)
    }

    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            path: self.store.path().to_path_buf(),
            rows: self.ledger.len(),
            first_date: self.ledger.first_date(),
            last_date: self.ledger.last_date(),
            complete_rows: self.ledger.rows().iter().filter(|r| r.is_complete()).count(),
            coverage: self.ledger.coverage(&self.schema),
        }
    }
}
