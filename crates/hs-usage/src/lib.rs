//! Usage tracking and budget gating
//!
//! Records token/cost usage per operation, purges records after 90 days,
//! and computes whether the orchestrator may run the AI phase. Heuristics
//! always run regardless of budget state; only the expensive phase is gated.
//!
//! Usage and budget files are written via temp file + atomic rename so
//! concurrent writers cannot tear the JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Usage records older than this are purged on every write
const RETENTION_DAYS: i64 = 90;

/// "Current month" is the trailing window of this many days
const MONTH_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Usage storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid budget limits: {0}")]
    InvalidLimits(String),
}

/// One completed operation's usage. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub scan_id: Option<String>,
}

impl UsageRecord {
    pub fn new(operation: impl Into<String>, tokens_used: u64, cost_usd: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            tokens_used,
            cost_usd,
            model: None,
            bundle_id: None,
            scan_id: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }

    pub fn with_scan_id(mut self, scan_id: impl Into<String>) -> Self {
        self.scan_id = Some(scan_id.into());
        self
    }
}

/// Monthly token allowance and the thresholds at which warning, critical,
/// and blocking behavior activate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetLimits {
    pub monthly_limit_tokens: u64,
    pub warning_threshold_pct: u8,
    pub critical_threshold_pct: u8,
    pub block_threshold_pct: u8,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            monthly_limit_tokens: 100_000,
            warning_threshold_pct: 80,
            critical_threshold_pct: 90,
            block_threshold_pct: 95,
        }
    }
}

impl BudgetLimits {
    /// Check warning < critical < block
    pub fn validate(&self) -> Result<(), UsageError> {
        if self.warning_threshold_pct < self.critical_threshold_pct
            && self.critical_threshold_pct < self.block_threshold_pct
        {
            Ok(())
        } else {
            Err(UsageError::InvalidLimits(format!(
                "thresholds must be strictly increasing (warning {} < critical {} < block {})",
                self.warning_threshold_pct, self.critical_threshold_pct, self.block_threshold_pct
            )))
        }
    }

    pub fn warning_limit(&self) -> u64 {
        self.monthly_limit_tokens * self.warning_threshold_pct as u64 / 100
    }

    pub fn critical_limit(&self) -> u64 {
        self.monthly_limit_tokens * self.critical_threshold_pct as u64 / 100
    }

    pub fn block_limit(&self) -> u64 {
        self.monthly_limit_tokens * self.block_threshold_pct as u64 / 100
    }
}

/// Aggregated usage for the trailing 30-day window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthUsage {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub remaining_tokens: u64,
    pub usage_percent: f64,
    pub record_count: usize,
}

/// Budget warning level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    Warning,
    Critical,
    Block,
}

/// A single budget warning with remediation text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetWarning {
    pub level: BudgetLevel,
    pub message: String,
    pub action: String,
}

/// Current budget position: usage, active warnings, and the block flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub current_usage: MonthUsage,
    pub warnings: Vec<BudgetWarning>,
    pub blocked: bool,
}

/// Per-operation rollup within a summary window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationUsage {
    pub tokens: u64,
    pub cost: f64,
    pub count: usize,
}

/// Usage summary over an arbitrary trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub period_days: i64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub average_daily_tokens: f64,
    pub average_daily_cost: f64,
    pub operations: HashMap<String, OperationUsage>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsageHistory {
    records: Vec<UsageRecord>,
}

/// Tracks AI usage on disk and answers the budget gate
pub struct UsageTracker {
    usage_file: PathBuf,
    budget_file: PathBuf,
    limits: RwLock<BudgetLimits>,
    history: RwLock<Vec<UsageRecord>>,
}

impl UsageTracker {
    /// Open (or initialize) the tracker in the given data directory.
    /// Defaults to `~/.hybridscan`.
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self, UsageError> {
        let dir = match data_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    UsageError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "could not determine home directory",
                    ))
                })?
                .join(".hybridscan"),
        };
        std::fs::create_dir_all(&dir)?;

        let usage_file = dir.join("usage.json");
        let budget_file = dir.join("budget.json");

        let limits = match load_json::<BudgetLimits>(&budget_file) {
            Some(limits) => match limits.validate() {
                Ok(()) => limits,
                Err(e) => {
                    warn!("Stored budget limits are invalid, using defaults: {}", e);
                    BudgetLimits::default()
                }
            },
            None => {
                warn!("No readable budget limits, using defaults");
                BudgetLimits::default()
            }
        };
        let history: UsageHistory = load_json(&usage_file).unwrap_or_default();

        Ok(Self {
            usage_file,
            budget_file,
            limits: RwLock::new(limits),
            history: RwLock::new(history.records),
        })
    }

    /// Replace the budget limits and persist them
    pub fn set_budget_limits(&self, limits: BudgetLimits) -> Result<(), UsageError> {
        limits.validate()?;
        *self.limits.write() = limits;
        write_json_atomic(&self.budget_file, &limits)
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        *self.limits.read()
    }

    /// Append a usage record (created only after a completed operation
    /// reported real cost) and purge expired records.
    pub fn record_usage(&self, record: UsageRecord) -> Result<(), UsageError> {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let snapshot = {
            let mut history = self.history.write();
            history.push(record);
            history.retain(|r| r.timestamp > cutoff);
            history.clone()
        };
        write_json_atomic(&self.usage_file, &UsageHistory { records: snapshot })
    }

    /// Usage over the trailing 30-day window
    pub fn get_current_month_usage(&self) -> MonthUsage {
        let cutoff = Utc::now() - Duration::days(MONTH_WINDOW_DAYS);
        let limits = *self.limits.read();
        let history = self.history.read();

        let recent: Vec<&UsageRecord> =
            history.iter().filter(|r| r.timestamp > cutoff).collect();
        let total_tokens: u64 = recent.iter().map(|r| r.tokens_used).sum();
        let total_cost_usd: f64 = recent.iter().map(|r| r.cost_usd).sum();
        let usage_percent = if limits.monthly_limit_tokens > 0 {
            total_tokens as f64 / limits.monthly_limit_tokens as f64 * 100.0
        } else {
            0.0
        };

        MonthUsage {
            total_tokens,
            total_cost_usd,
            remaining_tokens: limits.monthly_limit_tokens.saturating_sub(total_tokens),
            usage_percent,
            record_count: recent.len(),
        }
    }

    /// Current budget status with any active warnings
    pub fn check_budget_status(&self) -> BudgetStatus {
        let usage = self.get_current_month_usage();
        let limits = *self.limits.read();
        let mut warnings = Vec::new();
        let mut blocked = false;

        if usage.total_tokens >= limits.block_limit() {
            warnings.push(BudgetWarning {
                level: BudgetLevel::Block,
                message: format!(
                    "Monthly budget exceeded ({:.1}%). AI analysis blocked.",
                    usage.usage_percent
                ),
                action: "Raise the monthly token limit or wait for the window to roll over"
                    .to_string(),
            });
            blocked = true;
        } else if usage.total_tokens >= limits.critical_limit() {
            warnings.push(BudgetWarning {
                level: BudgetLevel::Critical,
                message: format!(
                    "Critical: {:.1}% of monthly budget used.",
                    usage.usage_percent
                ),
                action: "Raise the monthly token limit".to_string(),
            });
        } else if usage.total_tokens >= limits.warning_limit() {
            warnings.push(BudgetWarning {
                level: BudgetLevel::Warning,
                message: format!(
                    "Warning: {:.1}% of monthly budget used.",
                    usage.usage_percent
                ),
                action: "Monitor usage".to_string(),
            });
        }

        BudgetStatus {
            current_usage: usage,
            warnings,
            blocked,
        }
    }

    /// The single predicate the orchestrator consults before any AI call
    pub fn should_block_ai_analysis(&self) -> bool {
        let limits = *self.limits.read();
        self.get_current_month_usage().total_tokens >= limits.block_limit()
    }

    /// Per-operation rollup over a trailing window
    pub fn usage_summary(&self, days: i64) -> UsageSummary {
        let cutoff = Utc::now() - Duration::days(days);
        let history = self.history.read();

        let mut total_tokens = 0u64;
        let mut total_cost_usd = 0f64;
        let mut operations: HashMap<String, OperationUsage> = HashMap::new();

        for record in history.iter().filter(|r| r.timestamp > cutoff) {
            total_tokens += record.tokens_used;
            total_cost_usd += record.cost_usd;
            let entry = operations.entry(record.operation.clone()).or_default();
            entry.tokens += record.tokens_used;
            entry.cost += record.cost_usd;
            entry.count += 1;
        }

        let days_f = days.max(1) as f64;
        UsageSummary {
            period_days: days,
            total_tokens,
            total_cost_usd,
            average_daily_tokens: total_tokens as f64 / days_f,
            average_daily_cost: total_cost_usd / days_f,
            operations,
        }
    }

    /// Drop all usage history (budget limits are kept)
    pub fn clear_history(&self) -> Result<(), UsageError> {
        self.history.write().clear();
        write_json_atomic(&self.usage_file, &UsageHistory::default())
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding corrupted file '{}': {}", path.display(), e);
            None
        }
    }
}

/// Write JSON through a sibling temp file and atomic rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), UsageError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
