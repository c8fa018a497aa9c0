//! Cycle guard

use keel_protocol::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::{CycleBreakStrategy, CycleKind, DetectedCycle, Severity, StateFingerprint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleGuardConfig {
    /// Recorded iterations kept for oscillation/stagnation checks
    pub history_window: usize,
    /// Total occurrences of one fingerprint before severity turns high
    pub repetition_high: usize,
    /// Largest oscillation period checked (window sizes 2..=this)
    pub oscillation_max_window: usize,
    /// Stagnation looks at this many recent iterations...
    pub stagnation_window: usize,
    /// ...and fires when one (tool, file) pair shows up this often
    pub stagnation_min_hits: usize,
}

impl Default for CycleGuardConfig {
    fn default() -> Self {
        Self {
            history_window: 16,
            repetition_high: 4,
            oscillation_max_window: 4,
            stagnation_window: 5,
            stagnation_min_hits: 3,
        }
    }
}

struct RecordedIteration {
    iteration: u32,
    tool_names: Vec<String>,
    files: Vec<PathBuf>,
    /// One (tool, file) pair per call; file is None for path-free calls
    pairs: Vec<(String, Option<PathBuf>)>,
}

/// Run-scoped observer of agent iterations.
///
/// Written from a single control loop (the agent iteration driver), so it
/// holds plain state with no internal locking.
pub struct CycleGuard {
    config: CycleGuardConfig,
    alternatives: HashMap<String, String>,
    run_active: bool,
    iteration: u32,
    hash_history: HashMap<String, Vec<u32>>,
    recent: VecDeque<RecordedIteration>,
    detected: Vec<DetectedCycle>,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self::new(CycleGuardConfig::default())
    }
}

impl CycleGuard {
    pub fn new(config: CycleGuardConfig) -> Self {
        let mut alternatives = HashMap::new();
        alternatives.insert("readFile".to_string(), "searchFiles".to_string());
        alternatives.insert("searchFiles".to_string(), "listFiles".to_string());
        alternatives.insert("replaceInFile".to_string(), "writeFile".to_string());
        alternatives.insert("runCommand".to_string(), "readFile".to_string());
        Self {
            config,
            alternatives,
            run_active: false,
            iteration: 0,
            hash_history: HashMap::new(),
            recent: VecDeque::new(),
            detected: Vec::new(),
        }
    }

    /// Add or replace an alternative-tool suggestion.
    pub fn set_alternative(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.alternatives.insert(from.into(), to.into());
    }

    /// Reset all history and begin a run. Must be called before the first
    /// `record_state` of a session.
    pub fn start_run(&mut self) {
        self.run_active = true;
        self.iteration = 0;
        self.hash_history.clear();
        self.recent.clear();
        self.detected.clear();
        tracing::debug!("cycle guard run started");
    }

    /// Finish the run, returning every cycle detected during it.
    pub fn end_run(&mut self) -> Vec<DetectedCycle> {
        self.run_active = false;
        self.iteration = 0;
        self.hash_history.clear();
        self.recent.clear();
        let cycles = std::mem::take(&mut self.detected);
        tracing::info!(cycles = cycles.len(), "cycle guard run ended");
        cycles
    }

    pub fn get_detected_cycles(&self) -> &[DetectedCycle] {
        &self.detected
    }

    /// Whether a cycle was detected within the recent window.
    pub fn is_in_cycle(&self) -> bool {
        self.detected.last().is_some_and(|cycle| {
            let latest = cycle.iteration_numbers.iter().max().copied().unwrap_or(0);
            self.iteration.saturating_sub(latest) < self.config.stagnation_window as u32
        })
    }

    /// Record one iteration's outcome and check it for cycles, in order:
    /// exact repetition, oscillation, stagnation. The first hit wins.
    pub fn record_state(
        &mut self,
        tool_calls: &[ToolCall],
        file_paths: &[PathBuf],
        response_text: &str,
    ) -> Option<DetectedCycle> {
        if !self.run_active {
            tracing::warn!("record_state called outside a run");
            return None;
        }

        self.iteration += 1;
        let tool_names: Vec<String> = tool_calls.iter().map(|c| c.tool_name().to_string()).collect();
        let fingerprint = StateFingerprint::new(
            tool_names.clone(),
            file_paths.to_vec(),
            response_text,
            self.iteration,
        );

        self.hash_history
            .entry(fingerprint.response_hash.clone())
            .or_default()
            .push(self.iteration);
        self.recent.push_back(RecordedIteration {
            iteration: self.iteration,
            tool_names,
            files: file_paths.to_vec(),
            pairs: tool_calls
                .iter()
                .map(|c| {
                    (
                        c.tool_name().to_string(),
                        c.file_path().map(|p| p.to_path_buf()),
                    )
                })
                .collect(),
        });
        while self.recent.len() > self.config.history_window {
            self.recent.pop_front();
        }

        let cycle = self
            .check_repetition(&fingerprint)
            .or_else(|| self.check_oscillation(&fingerprint))
            .or_else(|| self.check_stagnation(&fingerprint));

        if let Some(cycle) = cycle {
            tracing::warn!(
                kind = %cycle.kind,
                severity = %cycle.severity,
                iteration = self.iteration,
                "cycle detected"
            );
            self.detected.push(cycle.clone());
            return Some(cycle);
        }
        None
    }

    /// Exact fingerprint seen at least twice before.
    fn check_repetition(&self, fingerprint: &StateFingerprint) -> Option<DetectedCycle> {
        let occurrences = self.hash_history.get(&fingerprint.response_hash)?;
        if occurrences.len() < 3 {
            return None;
        }
        let severity = if occurrences.len() >= self.config.repetition_high {
            Severity::High
        } else {
            Severity::Medium
        };

        let strategy = fingerprint
            .tool_call_names
            .iter()
            .find_map(|name| {
                self.alternatives.get(name).map(|to| CycleBreakStrategy::AlternativeTool {
                    from: name.clone(),
                    to: to.clone(),
                })
            })
            .unwrap_or(CycleBreakStrategy::IncreaseTemperature { delta: 0.2 });

        Some(DetectedCycle {
            kind: CycleKind::Repetition,
            iteration_numbers: occurrences.clone(),
            fingerprint: fingerprint.clone(),
            severity,
            suggested_strategy: strategy,
        })
    }

    /// The last k tool-call sequences equal the k before them, for any
    /// window size 2..=max.
    fn check_oscillation(&self, fingerprint: &StateFingerprint) -> Option<DetectedCycle> {
        for k in 2..=self.config.oscillation_max_window {
            if self.recent.len() < 2 * k {
                continue;
            }
            let window: Vec<&RecordedIteration> =
                self.recent.iter().rev().take(2 * k).rev().collect();
            let (earlier, later) = window.split_at(k);
            let earlier_concat: Vec<&str> = earlier
                .iter()
                .flat_map(|r| r.tool_names.iter().map(String::as_str))
                .collect();
            let later_concat: Vec<&str> = later
                .iter()
                .flat_map(|r| r.tool_names.iter().map(String::as_str))
                .collect();
            if !earlier_concat.is_empty() && earlier_concat == later_concat {
                let mut seen = std::collections::HashSet::new();
                let preserve_files: Vec<PathBuf> = window
                    .iter()
                    .flat_map(|r| r.files.iter())
                    .filter(|f| seen.insert((*f).clone()))
                    .cloned()
                    .collect();
                return Some(DetectedCycle {
                    kind: CycleKind::Oscillation,
                    iteration_numbers: window.iter().map(|r| r.iteration).collect(),
                    fingerprint: fingerprint.clone(),
                    severity: Severity::High,
                    suggested_strategy: CycleBreakStrategy::ResetContext { preserve_files },
                });
            }
        }
        None
    }

    /// One (tool, file) pair present in enough of the recent iterations.
    fn check_stagnation(&self, fingerprint: &StateFingerprint) -> Option<DetectedCycle> {
        let current = self.recent.back()?;
        let window: Vec<&RecordedIteration> = self
            .recent
            .iter()
            .rev()
            .take(self.config.stagnation_window)
            .collect();

        for pair in &current.pairs {
            let hits: Vec<u32> = window
                .iter()
                .filter(|r| r.pairs.contains(pair))
                .map(|r| r.iteration)
                .collect();
            if hits.len() < self.config.stagnation_min_hits {
                continue;
            }

            let strategy = match &pair.1 {
                Some(file) => CycleBreakStrategy::AskClarification {
                    question: format!(
                        "Repeated {} attempts on {} are not making progress; what outcome is expected?",
                        pair.0,
                        file.display()
                    ),
                },
                None => CycleBreakStrategy::Escalate {
                    reason: format!("{} keeps repeating with no file context", pair.0),
                },
            };

            let mut iterations = hits;
            iterations.sort_unstable();
            return Some(DetectedCycle {
                kind: CycleKind::Stagnation,
                iteration_numbers: iterations,
                fingerprint: fingerprint.clone(),
                severity: Severity::Medium,
                suggested_strategy: strategy,
            });
        }
        None
    }
}
