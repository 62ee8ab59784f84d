//! One planning cycle, end to end.
//!
//! A cycle is a batch job: load state, collect viewing state from every
//! instance (concurrently, but completely - the diff never runs against
//! partial data), snapshot protection, diff, then report or apply. The
//! engine re-derives everything from scratch each run; idempotent
//! re-planning is the recovery mechanism after interruption.

use crate::error::Result;
use crate::execute::{ExecMode, ExecutionSummary, MoveExecutor, TransferTool};
use crate::fs::FileSystem;
use crate::gateway::{HttpGateway, MediaServerApi};
use crate::plan::{build_plan, PlanInputs};
use crate::protect::SessionProtector;
use crate::state::StateStore;
use crate::workingset::WorkingSetBuilder;
use deckhand_model::{CycleConfig, MovePlan};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CycleOutcome {
    pub plan: MovePlan,
    pub summary: ExecutionSummary,
    pub warnings: Vec<String>,
}

pub struct CycleEngine {
    config: Arc<CycleConfig>,
    gateways: Vec<Arc<dyn MediaServerApi>>,
    fs: Arc<dyn FileSystem>,
    transfer: Arc<dyn TransferTool>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleEngine")
            .field("instances", &self.gateways.len())
            .finish()
    }
}

impl CycleEngine {
    pub fn new(
        config: Arc<CycleConfig>,
        gateways: Vec<Arc<dyn MediaServerApi>>,
        fs: Arc<dyn FileSystem>,
        transfer: Arc<dyn TransferTool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            gateways,
            fs,
            transfer,
            cancel,
        }
    }

    /// Build one HTTP gateway per configured instance.
    pub fn with_http_gateways(
        config: Arc<CycleConfig>,
        fs: Arc<dyn FileSystem>,
        transfer: Arc<dyn TransferTool>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut gateways: Vec<Arc<dyn MediaServerApi>> = Vec::new();
        for instance in &config.instances {
            gateways.push(Arc::new(HttpGateway::new(instance)?));
        }
        Ok(Self::new(config, gateways, fs, transfer, cancel))
    }

    pub async fn run(&self, mode: ExecMode) -> Result<CycleOutcome> {
        let store = StateStore::new(&self.config);
        // An unknown residency baseline is never guessed at.
        let mut index = store.load()?;
        let previous_sets = store.load_instance_sets()?;

        let builder = WorkingSetBuilder::new(self.config.clone(), self.fs.clone());
        let collection = builder.build(&self.gateways).await;
        let mut warnings = collection.warnings.clone();

        // Files last wanted by an instance we could not reach stay put:
        // absence of data is not "no longer needed".
        let mut hold: BTreeSet<PathBuf> = BTreeSet::new();
        for name in &collection.failed_instances {
            if let Some(previous) = previous_sets.get(name) {
                hold.extend(previous.iter().cloned());
            }
        }

        let protector = Arc::new(SessionProtector::new(&self.config, self.gateways.clone()));
        let protection = protector.snapshot().await;
        for instance in &protection.degraded {
            warnings.push(format!(
                "sessions of instance {instance:?} unknown; its last working set is held"
            ));
        }

        let plan = build_plan(&PlanInputs {
            working_set: &collection.files,
            resident: &index,
            protection: &protection,
            hold: &hold,
        });
        info!(
            evictions = plan.evictions.len(),
            fetches = plan.fetches.len(),
            protected = protection.len(),
            held = hold.len(),
            "plan computed"
        );
        for warning in &warnings {
            warn!("{warning}");
        }

        let executor = MoveExecutor::new(
            self.config.clone(),
            self.fs.clone(),
            self.transfer.clone(),
            protector,
            self.cancel.clone(),
        );
        let summary = executor.run(&plan, &mut index, &store, mode).await?;

        if mode == ExecMode::Apply {
            // Successful instances replace their recorded contribution;
            // failed ones keep the previous cycle's.
            let mut sets = previous_sets;
            for (name, files) in collection.per_instance {
                sets.insert(name, files);
            }
            store.save_instance_sets(&sets)?;
        }

        Ok(CycleOutcome {
            plan,
            summary,
            warnings,
        })
    }
}
